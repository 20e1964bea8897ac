use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::error::DashboardError;
use crate::models::{BreakdownPoint, EoiRecord, Overview, TimeSeriesPoint};

/// Sums `count_eois` per timestamp, oldest first. Missing months stay missing.
pub fn series(view: &[&EoiRecord]) -> Vec<TimeSeriesPoint> {
    let mut totals: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for record in view {
        *totals.entry(record.timestamp).or_insert(0) += record.count_eois;
    }

    totals
        .into_iter()
        .map(|(timestamp, total)| TimeSeriesPoint {
            timestamp,
            value: total as f64,
        })
        .collect()
}

/// Sums `count_eois` per `(timestamp, visa_type)` for stacked charts.
pub fn breakdown(view: &[&EoiRecord]) -> Vec<BreakdownPoint> {
    let mut totals: BTreeMap<(NaiveDate, &str), u64> = BTreeMap::new();
    for record in view {
        *totals
            .entry((record.timestamp, record.visa_type.as_str()))
            .or_insert(0) += record.count_eois;
    }

    totals
        .into_iter()
        .map(|((timestamp, visa_type), value)| BreakdownPoint {
            timestamp,
            visa_type: visa_type.to_string(),
            value,
        })
        .collect()
}

/// "Total filtered (latest)": the last element of the ordered series, so the
/// figure always agrees with the chart.
pub fn latest_total(series: &[TimeSeriesPoint]) -> f64 {
    series.last().map(|point| point.value).unwrap_or(0.0)
}

pub fn overview(view: &[&EoiRecord]) -> Result<Overview, DashboardError> {
    if view.is_empty() {
        return Err(DashboardError::NoDataLoaded);
    }

    let trend = series(view);
    let occupations: BTreeSet<&str> = view.iter().map(|r| r.occupation.as_str()).collect();

    Ok(Overview {
        occupations_tracked: occupations.len(),
        total_eois: view.iter().map(|record| record.count_eois).sum(),
        first_period: trend.first().map(|point| point.timestamp),
        last_period: trend.last().map(|point| point.timestamp),
        trend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Points;

    fn record(year: i32, month: u32, visa: &str, count: u64) -> EoiRecord {
        EoiRecord {
            timestamp: NaiveDate::from_ymd_opt(year, month, 1).unwrap(),
            occupation: "Electrician".to_string(),
            visa_type: visa.to_string(),
            eoi_status: "SUBMITTED".to_string(),
            points: Points::parse("65"),
            count_eois: count,
        }
    }

    #[test]
    fn series_is_ordered_and_keeps_gaps() {
        let records = vec![
            record(2024, 5, "189", 3),
            record(2024, 1, "189", 4),
            record(2024, 1, "190", 6),
        ];
        let view: Vec<&EoiRecord> = records.iter().collect();
        let points = series(&view);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(points[0].value, 10.0);
        assert_eq!(points[1].timestamp, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(latest_total(&points), 3.0);
    }

    #[test]
    fn breakdown_splits_by_visa_type() {
        let records = vec![
            record(2024, 2, "491", 1),
            record(2024, 2, "189", 2),
            record(2024, 2, "189", 5),
            record(2024, 1, "190", 4),
        ];
        let view: Vec<&EoiRecord> = records.iter().collect();
        let stacked = breakdown(&view);

        let flattened: Vec<(u32, &str, u64)> = stacked
            .iter()
            .map(|p| (chrono::Datelike::month(&p.timestamp), p.visa_type.as_str(), p.value))
            .collect();
        assert_eq!(flattened, vec![(1, "190", 4), (2, "189", 7), (2, "491", 1)]);
    }

    #[test]
    fn latest_total_of_empty_series_is_zero() {
        assert_eq!(latest_total(&[]), 0.0);
    }

    #[test]
    fn overview_summarizes_the_table() {
        let mut records = vec![record(2024, 1, "189", 4), record(2025, 12, "190", 6)];
        records[1].occupation = "Nurse".to_string();
        let view: Vec<&EoiRecord> = records.iter().collect();
        let summary = overview(&view).unwrap();

        assert_eq!(summary.occupations_tracked, 2);
        assert_eq!(summary.total_eois, 10);
        assert_eq!(summary.first_period, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(summary.last_period, NaiveDate::from_ymd_opt(2025, 12, 1));
        assert_eq!(overview(&[]).unwrap_err(), DashboardError::NoDataLoaded);
    }
}
