use std::time::Duration;

use thiserror::Error;

/// Expected, user-facing conditions. None of these are fatal to the process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DashboardError {
    #[error("No data loaded: the EOI table is missing or empty.")]
    NoDataLoaded,

    #[error("No records match the selected filters.")]
    EmptyFilterResult,

    #[error("Insufficient history for a forecast: {periods} period(s), at least 2 required.")]
    InsufficientHistory { periods: usize },

    #[error("Insufficient data for growth insight: {months} month(s), at least 6 required.")]
    InsufficientGrowthWindow { months: usize },

    #[error("Forecast training failed: {0}")]
    ForecastTrainingFailed(String),

    #[error("Forecast cancelled after {after:?}.")]
    ForecastCancelled { after: Duration },
}
