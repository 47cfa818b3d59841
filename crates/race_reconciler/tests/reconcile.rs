mod common;

use anyhow::Result;
use chrono::TimeZone;
use common::*;
use race_reconciler::{FieldOutcome, MatchPolicy, RaceMatch, Reconciler, ResultsApplied};
use race_store::{RaceKey, RaceStatus, RaceStore, SqliteStore};

fn applied(outcome: ResultsApplied) -> race_reconciler::ResultOutcome {
    match outcome {
        ResultsApplied::Applied(o) => o,
        other => panic!("expected applied results, got {other:?}"),
    }
}

fn key(name: &str, number: u32, day: u32) -> RaceKey {
    RaceKey {
        meeting_name: name.to_string(),
        race_number: number,
        race_date: date(day),
    }
}

#[test]
fn active_runner_count_excludes_scratched() -> Result<()> {
    let mut rec = reconciler();
    let m = meeting(
        "Angle Park",
        22,
        vec![race(1, Some("7:05PM"), vec![runner(1, "Fast Dog", false), runner(3, "Slow Dog", true)])],
    );

    rec.ingest_fields(&m, &m.races[0])?;

    let stored = &rec.store().races_for_identity(&key("Angle Park", 1, 22))?[0];
    assert_eq!(stored.active_runner_count, 1);
    assert_eq!(stored.race_time.to_rfc3339(), "2026-01-22T19:05:00+11:00");
    assert!(stored.time_known);

    let runners = rec.store().runners(stored.id)?;
    assert_eq!(runners.len(), 2);
    assert!(runners[1].is_scratched);
    assert_eq!(runners[1].scratch_reason.as_deref(), Some("css-flag"));
    Ok(())
}

#[test]
fn reingest_is_idempotent() -> Result<()> {
    let mut rec = reconciler();
    let m = meeting(
        "Sale",
        22,
        vec![race(2, Some("8:45PM"), vec![runner(1, "Fast Dog", false), runner(2, "Slow Dog", false)])],
    );

    rec.ingest_fields(&m, &m.races[0])?;
    let first: Vec<(u32, String)> = {
        let race = &rec.store().races_for_identity(&key("Sale", 2, 22))?[0];
        rec.store().runners(race.id)?.into_iter().map(|r| (r.box_number, r.dog_name)).collect()
    };

    let outcome = rec.ingest_fields(&m, &m.races[0])?;
    let FieldOutcome::Replaced { report, .. } = outcome else {
        panic!("expected replace");
    };
    assert_eq!(report.replaced, 1);

    let races = rec.store().races_for_identity(&key("Sale", 2, 22))?;
    assert_eq!(races.len(), 1);
    let second: Vec<(u32, String)> =
        rec.store().runners(races[0].id)?.into_iter().map(|r| (r.box_number, r.dog_name)).collect();
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn missing_time_keeps_the_day() -> Result<()> {
    let mut rec = reconciler();
    let m = meeting("Sale", 22, vec![race(4, None, vec![runner(1, "Fast Dog", false)])]);
    rec.ingest_fields(&m, &m.races[0])?;

    let stored = &rec.store().races_for_identity(&key("Sale", 4, 22))?[0];
    assert!(!stored.time_known);
    assert_eq!(stored.key.race_date, date(22));
    assert_eq!(stored.race_time.to_rfc3339(), "2026-01-22T00:00:00+11:00");
    Ok(())
}

#[test]
fn results_pick_the_race_containing_the_dogs() -> Result<()> {
    let mut rec = reconciler();
    let earlier = meeting(
        "Angle Park",
        21,
        vec![race(3, Some("8:00PM"), vec![runner(1, "Fast Dog", false), runner(2, "Slow Dog", false)])],
    );
    let later = meeting(
        "Angle Park",
        22,
        vec![race(3, Some("8:00PM"), vec![runner(1, "Other Dog", false), runner(2, "Another Dog", false)])],
    );
    rec.ingest_fields(&earlier, &earlier.races[0])?;
    rec.ingest_fields(&later, &later.races[0])?;

    let outcome = applied(rec.ingest_results(
        &results(
            "Angle Park",
            3,
            vec![result(1, "Fast Dog", 1, Some(2.0)), result(2, "Slow Dog", 2, Some(3.0))],
        ),
        night(22),
    )?);

    assert_eq!(outcome.race.key.race_date, date(21));
    assert!(matches!(outcome.matched, RaceMatch::Confirmed { confirmations: 2, .. }));
    assert_eq!(outcome.matched_runners, 2);

    let later_stored = &rec.store().races_for_identity(&key("Angle Park", 3, 22))?[0];
    assert_eq!(later_stored.status, RaceStatus::Upcoming);
    assert!(rec.store().runners(later_stored.id)?.iter().all(|r| r.finishing_position.is_none()));
    Ok(())
}

#[test]
fn unconfirmed_results_fall_back_to_most_recent() -> Result<()> {
    let mut rec = reconciler();
    for day in [20, 21] {
        let m = meeting("Sale", 1, vec![]);
        let m = race_scraper::MeetingFields {
            date: date(day),
            races: vec![race(1, Some("7:00PM"), vec![runner(1, &format!("Dog {day}"), false)])],
            ..m
        };
        rec.ingest_fields(&m, &m.races[0])?;
    }

    let stranger = results("Sale", 1, vec![result(1, "Stranger", 1, Some(2.0))]);
    let outcome = applied(rec.ingest_results(&stranger, night(22))?);
    assert!(outcome.matched.is_fallback());
    assert_eq!(outcome.race.key.race_date, date(21));
    assert_eq!(outcome.candidate_dates, ["2026-01-21", "2026-01-20"]);
    assert_eq!(outcome.unmatched, ["Stranger (1)"]);
    // Status se mění i bez shody běžců
    assert_eq!(rec.store().race(outcome.race.id)?.unwrap().status, RaceStatus::Resulted);
    Ok(())
}

#[test]
fn stricter_policy_requires_more_confirmations() -> Result<()> {
    let store = SqliteStore::open_in_memory()?;
    let mut rec = Reconciler::new(store, aedt(), MatchPolicy { min_confirmed_runners: 2 });
    let earlier = meeting("Sale", 20, vec![race(1, Some("7:00PM"), vec![runner(1, "Fast Dog", false)])]);
    let later = meeting("Sale", 21, vec![race(1, Some("7:00PM"), vec![runner(1, "Late Dog", false)])]);
    rec.ingest_fields(&earlier, &earlier.races[0])?;
    rec.ingest_fields(&later, &later.races[0])?;

    let outcome = applied(rec.ingest_results(
        &results(
            "Sale",
            1,
            vec![result(1, "Fast Dog", 1, Some(2.0)), result(2, "Unknown", 2, Some(4.0))],
        ),
        night(22),
    )?);
    assert!(matches!(outcome.matched, RaceMatch::Fallback { best_confirmations: 1, candidates: 2, .. }));
    assert_eq!(outcome.race.key.race_date, date(21));
    Ok(())
}

#[test]
fn unconfirmed_results_never_land_on_a_race_still_to_run() -> Result<()> {
    let mut rec = reconciler();
    for day in [22, 23] {
        let m = meeting(
            "Sale",
            day,
            vec![race(1, Some("7:00PM"), vec![runner(1, &format!("Dog {day}"), false), runner(2, "Second Dog", false)])],
        );
        rec.ingest_fields(&m, &m.races[0])?;
    }

    let stranger = results("Sale", 1, vec![result(1, "Stranger", 1, Some(2.0))]);
    let outcome = applied(rec.ingest_results(&stranger, night(22))?);
    assert!(outcome.matched.is_fallback());
    assert_eq!(outcome.race.key.race_date, date(22));
    assert_eq!(outcome.candidate_dates, ["2026-01-23", "2026-01-22"]);

    let tomorrow = &rec.store().races_for_identity(&key("Sale", 1, 23))?[0];
    assert_eq!(tomorrow.status, RaceStatus::Upcoming);

    // Pozdní scratching zítřejšího dostihu se pořád propíše
    let late = meeting(
        "Sale",
        23,
        vec![race(1, Some("7:00PM"), vec![runner(1, "Dog 23", false), runner(2, "Second Dog", true)])],
    );
    let FieldOutcome::Replaced { status, .. } = rec.ingest_fields(&late, &late.races[0])? else {
        panic!("expected replace");
    };
    assert_eq!(status, RaceStatus::Upcoming);
    let tomorrow = &rec.store().races_for_identity(&key("Sale", 1, 23))?[0];
    assert_eq!(tomorrow.active_runner_count, 1);
    Ok(())
}

#[test]
fn unconfirmed_results_wait_when_nothing_has_started() -> Result<()> {
    let mut rec = reconciler();
    let m = meeting("Sale", 23, vec![race(1, Some("7:00PM"), vec![runner(1, "Dog 23", false)])]);
    rec.ingest_fields(&m, &m.races[0])?;

    let stranger = results("Sale", 1, vec![result(1, "Stranger", 1, Some(2.0))]);
    assert_eq!(
        rec.ingest_results(&stranger, night(22))?,
        ResultsApplied::Unresolved {
            candidate_dates: vec!["2026-01-23".to_string()],
            best_confirmations: 0,
        }
    );
    let stored = &rec.store().races_for_identity(&key("Sale", 1, 23))?[0];
    assert_eq!(stored.status, RaceStatus::Upcoming);
    assert_eq!(stored.top_2_in_top_2, None);

    // Po startu platí jediný kandidát jako dřív
    let outcome = applied(rec.ingest_results(&stranger, night(23))?);
    assert!(matches!(outcome.matched, RaceMatch::Single { .. }));
    assert_eq!(rec.store().race(outcome.race.id)?.unwrap().status, RaceStatus::Resulted);
    Ok(())
}

#[test]
fn race_without_time_counts_as_started_on_its_day() -> Result<()> {
    let mut rec = reconciler();
    for day in [21, 22] {
        let m = meeting("Sale", day, vec![race(2, None, vec![runner(1, &format!("Dog {day}"), false)])]);
        rec.ingest_fields(&m, &m.races[0])?;
    }

    let morning = aedt().with_ymd_and_hms(2026, 1, 22, 9, 0, 0).unwrap();
    let stranger = results("Sale", 2, vec![result(1, "Stranger", 1, Some(2.0))]);
    let outcome = applied(rec.ingest_results(&stranger, morning)?);
    assert_eq!(outcome.race.key.race_date, date(22));
    Ok(())
}

#[test]
fn runner_match_needs_name_and_box() -> Result<()> {
    let mut rec = reconciler();
    let m = meeting("Sale", 22, vec![race(5, Some("9:00PM"), vec![runner(1, "Fast Dog", false), runner(2, "Slow Dog", false)])]);
    rec.ingest_fields(&m, &m.races[0])?;

    let outcome = applied(rec.ingest_results(
        &results(
            "Sale",
            5,
            vec![result(1, "FAST DOG", 1, Some(2.0)), result(4, "Slow Dog", 2, Some(3.0))],
        ),
        night(22),
    )?);
    assert!(matches!(outcome.matched, RaceMatch::Single { .. }));
    assert_eq!(outcome.matched_runners, 1);
    assert_eq!(outcome.unmatched, ["Slow Dog (4)"]);
    // Jen jeden běžec má umístění → statistika nejde vyhodnotit
    assert_eq!(outcome.top_2_in_top_2, None);
    Ok(())
}

#[test]
fn favourites_finishing_top_two_is_true() -> Result<()> {
    let mut rec = reconciler();
    let m = meeting(
        "Sale",
        22,
        vec![race(
            6,
            Some("9:20PM"),
            vec![runner(1, "Fast Dog", false), runner(2, "Mid Dog", false), runner(3, "Slow Dog", false)],
        )],
    );
    rec.ingest_fields(&m, &m.races[0])?;

    let outcome = applied(rec.ingest_results(
        &results(
            "Sale",
            6,
            vec![
                result(1, "Fast Dog", 1, Some(2.0)),
                result(2, "Mid Dog", 2, Some(3.0)),
                result(3, "Slow Dog", 3, Some(5.0)),
            ],
        ),
        night(22),
    )?);
    assert_eq!(outcome.top_2_in_top_2, Some(true));
    assert_eq!(rec.store().race(outcome.race.id)?.unwrap().top_2_in_top_2, Some(true));
    Ok(())
}

#[test]
fn single_valid_price_is_null_but_resulted() -> Result<()> {
    let mut rec = reconciler();
    let m = meeting(
        "Sale",
        22,
        vec![race(7, Some("9:40PM"), vec![runner(1, "Fast Dog", false), runner(2, "Slow Dog", false)])],
    );
    rec.ingest_fields(&m, &m.races[0])?;

    let outcome = applied(rec.ingest_results(
        &results(
            "Sale",
            7,
            vec![result(1, "Fast Dog", 1, Some(2.0)), result(2, "Slow Dog", 2, Some(0.0))],
        ),
        night(22),
    )?);
    assert_eq!(outcome.top_2_in_top_2, None);

    let stored = rec.store().race(outcome.race.id)?.unwrap();
    assert_eq!(stored.status, RaceStatus::Resulted);
    assert_eq!(stored.top_2_in_top_2, None);
    assert_ne!(stored.top_2_in_top_2, Some(false));
    Ok(())
}

#[test]
fn unknown_race_is_reported() -> Result<()> {
    let mut rec = reconciler();
    assert_eq!(rec.ingest_results(&results("Nowhere", 1, vec![]), night(22))?, ResultsApplied::RaceNotFound);
    Ok(())
}

#[test]
fn resulted_race_is_not_replaced_and_closed_stays_closed() -> Result<()> {
    let mut rec = reconciler();
    let m = meeting(
        "Sale",
        22,
        vec![
            race(1, Some("7:00PM"), vec![runner(1, "Fast Dog", false), runner(2, "Slow Dog", false)]),
            race(2, Some("11:00PM"), vec![runner(1, "Late Dog", false)]),
        ],
    );
    for r in &m.races {
        rec.ingest_fields(&m, r)?;
    }

    applied(rec.ingest_results(
        &results(
            "Sale",
            1,
            vec![result(1, "Fast Dog", 1, Some(2.0)), result(2, "Slow Dog", 2, Some(3.0))],
        ),
        night(22),
    )?);
    assert!(matches!(rec.ingest_fields(&m, &m.races[0])?, FieldOutcome::SkippedResulted { .. }));
    let kept = &rec.store().races_for_identity(&key("Sale", 1, 22))?[0];
    assert_eq!(rec.store().runners(kept.id)?[0].finishing_position, Some(1));

    let now = aedt().with_ymd_and_hms(2026, 1, 22, 23, 30, 0).unwrap();
    assert_eq!(rec.close_started(now)?, 1);
    let FieldOutcome::Replaced { status, .. } = rec.ingest_fields(&m, &m.races[1])? else {
        panic!("expected replace");
    };
    assert_eq!(status, RaceStatus::Closed);
    Ok(())
}

#[test]
fn close_pass_converts_now_into_venue_offset() -> Result<()> {
    let mut rec = reconciler();
    let m = meeting("Sale", 22, vec![race(1, Some("7:00PM"), vec![runner(1, "Fast Dog", false)])]);
    rec.ingest_fields(&m, &m.races[0])?;

    // 08:30 UTC = 19:30 AEDT
    let utc = chrono::FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 1, 22, 8, 30, 0).unwrap();
    assert_eq!(rec.close_started(utc)?, 1);
    Ok(())
}

#[test]
fn restat_repairs_stale_values() -> Result<()> {
    let mut rec = reconciler();
    let m = meeting(
        "Sale",
        22,
        vec![race(8, Some("10:00PM"), vec![runner(1, "Fast Dog", false), runner(2, "Slow Dog", false)])],
    );
    rec.ingest_fields(&m, &m.races[0])?;
    let outcome = applied(rec.ingest_results(
        &results(
            "Sale",
            8,
            vec![result(1, "Fast Dog", 1, Some(2.0)), result(2, "Slow Dog", 2, Some(3.0))],
        ),
        night(22),
    )?);
    assert_eq!(outcome.top_2_in_top_2, Some(true));

    let mut store = rec.into_store();
    store.set_top_2(outcome.race.id, Some(false))?;
    let mut rec = Reconciler::new(store, aedt(), MatchPolicy::default());

    let races = rec.store().races_with_status(RaceStatus::Resulted)?;
    let report = rec.recompute_stats(&races)?;
    assert_eq!(report.checked, 1);
    assert_eq!(report.rewritten, 1);
    assert_eq!(rec.store().race(outcome.race.id)?.unwrap().top_2_in_top_2, Some(true));

    let races = rec.store().races_with_status(RaceStatus::Resulted)?;
    assert_eq!(rec.recompute_stats(&races)?.rewritten, 0);
    Ok(())
}
