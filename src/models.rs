use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

/// Applicant points score, resolved once at ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Points {
    Numeric(i64),
    NonNumeric(String),
}

impl Points {
    pub fn parse(raw: &str) -> Points {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return Points::Numeric(value);
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() && value.fract() == 0.0 => {
                Points::Numeric(value as i64)
            }
            _ => Points::NonNumeric(trimmed.to_string()),
        }
    }

    pub fn numeric(&self) -> Option<i64> {
        match self {
            Points::Numeric(value) => Some(*value),
            Points::NonNumeric(_) => None,
        }
    }

    /// Label used when filtering by raw points value.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Points::Numeric(value) => write!(f, "{value}"),
            Points::NonNumeric(raw) => f.write_str(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EoiRecord {
    /// First day of the submission month.
    pub timestamp: NaiveDate,
    pub occupation: String,
    pub visa_type: String,
    pub eoi_status: String,
    pub points: Points,
    pub count_eois: u64,
}

impl EoiRecord {
    pub fn period(&self) -> String {
        period_label(self.timestamp)
    }
}

pub fn period_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub occupation: String,
    pub total_demand: u64,
    pub dominant_point: i64,
    pub lowest_point: i64,
    pub highest_point: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub timestamp: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownPoint {
    pub timestamp: NaiveDate,
    pub visa_type: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakdown {
    pub occupation: String,
    pub series: Vec<BreakdownPoint>,
    pub latest_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRow {
    pub occupation: String,
    pub prev3_avg: f64,
    pub last3_avg: f64,
    pub growth_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRow {
    pub timestamp: NaiveDate,
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub occupation: String,
    pub history: Vec<TimeSeriesPoint>,
    /// Exactly one row per horizon step, oldest first.
    pub future: Vec<ForecastRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fitted: Option<Vec<ForecastRow>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub occupations_tracked: usize,
    pub total_eois: u64,
    pub first_period: Option<NaiveDate>,
    pub last_period: Option<NaiveDate>,
    pub trend: Vec<TimeSeriesPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_resolve_numeric_and_placeholder_values() {
        assert_eq!(Points::parse("65"), Points::Numeric(65));
        assert_eq!(Points::parse(" 70 "), Points::Numeric(70));
        assert_eq!(Points::parse("95.0"), Points::Numeric(95));
        assert_eq!(
            Points::parse("<65"),
            Points::NonNumeric("<65".to_string())
        );
        assert_eq!(
            Points::parse("65.5"),
            Points::NonNumeric("65.5".to_string())
        );
        assert_eq!(Points::parse("nan").numeric(), None);
    }

    #[test]
    fn labels_match_source_text() {
        assert_eq!(Points::parse("80").label(), "80");
        assert_eq!(Points::parse("ALL").label(), "ALL");
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(period_label(date), "2024-03");
    }
}
