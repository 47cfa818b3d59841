//! Reconciler + pipeline: z vyrenderovaných stránek do úložiště
//!
//! Tok: form-guide přehled → fields každého mítinku → close pass → výsledky.
//! Úložiště se předává explicitně (žádný globální klient), zápisy jdou přes `&mut self`.

pub mod config;
pub mod pipeline;
pub mod reconcile;

pub use config::RunConfig;
pub use pipeline::{BackfillWindow, MeetingPipeline};
pub use reconcile::{
    FieldOutcome, MatchPolicy, RaceMatch, Reconciler, RestatReport, ResultOutcome, ResultsApplied,
};
