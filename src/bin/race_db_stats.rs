use anyhow::{Context, Result};
use dotenv::dotenv;
use race_reconciler::RunConfig;
use race_stats::{hit_rate, is_micro_field};
use race_store::SqliteStore;

fn main() -> Result<()> {
    dotenv().ok();
    let cfg = RunConfig::from_env()?;
    let store = SqliteStore::open(&cfg.db_path)
        .with_context(|| format!("open db at {}", cfg.db_path.display()))?;
    let summary = store.summary().context("read store summary")?;

    println!("db_path={}", cfg.db_path.display());
    println!("races: {}", summary.races);
    println!("runners: {}", summary.runners);
    println!(
        "status: upcoming={} closed={} resulted={}",
        summary.upcoming, summary.closed, summary.resulted
    );
    println!(
        "dates: {} .. {}",
        summary.first_date.as_deref().unwrap_or("<none>"),
        summary.last_date.as_deref().unwrap_or("<none>")
    );
    println!(
        "gaps: missing_distance={} missing_meeting_url={}",
        summary.missing_distance, summary.missing_meeting_url
    );

    let all: Vec<Option<bool>> = summary.resulted_flags.iter().map(|(_, flag)| *flag).collect();
    let micro: Vec<Option<bool>> = summary
        .resulted_flags
        .iter()
        .filter(|(active, _)| is_micro_field(*active))
        .map(|(_, flag)| *flag)
        .collect();

    for (label, flags) in [("all", &all), ("micro(4-5)", &micro)] {
        let evaluated = flags.iter().flatten().count();
        let not_evaluable = flags.len() - evaluated;
        match hit_rate(flags) {
            Some(rate) => println!(
                "top_2_in_top_2[{label}]: {:.1}% over {evaluated} races ({not_evaluable} not evaluable)",
                rate * 100.0
            ),
            None => println!("top_2_in_top_2[{label}]: <none> ({not_evaluable} not evaluable)"),
        }
    }

    Ok(())
}
