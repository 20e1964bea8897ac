use std::collections::BTreeSet;

use tracing::debug;

use crate::error::DashboardError;
use crate::filter::{self, FilterSpec};
use crate::growth;
use crate::leaderboard;
use crate::loader::Dataset;
use crate::models::{Breakdown, EoiRecord, GrowthRow, LeaderboardRow, Overview};
use crate::trend;

/// Explicit filter selections. `None` keeps the dashboard default for that
/// dimension; `Some` of an empty set selects nothing.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub visa_types: Option<BTreeSet<String>>,
    pub statuses: Option<BTreeSet<String>>,
    pub third: Option<BTreeSet<String>>,
}

impl Selection {
    fn period_spec(self, view: &[&EoiRecord]) -> FilterSpec {
        FilterSpec::period_defaults(view).with_selection(self.visa_types, self.statuses, self.third)
    }

    fn points_spec(self, view: &[&EoiRecord]) -> FilterSpec {
        FilterSpec::points_defaults(view).with_selection(self.visa_types, self.statuses, self.third)
    }
}

pub fn overview(dataset: &Dataset) -> Result<Overview, DashboardError> {
    trend::overview(&dataset.view()?)
}

pub fn leaderboard(
    dataset: &Dataset,
    selection: Selection,
) -> Result<Vec<LeaderboardRow>, DashboardError> {
    let view = dataset.view()?;
    let spec = selection.period_spec(&view);
    let filtered = filter::apply(&view, &spec);
    debug!(rows = filtered.len(), "leaderboard filter applied");
    leaderboard::build(&filtered)
}

/// Growth over the filtered rows. The month windows are fixed by the whole
/// table, so a filter never shrinks the history the windows are drawn from.
pub fn growth(dataset: &Dataset, selection: Selection) -> Result<Vec<GrowthRow>, DashboardError> {
    let view = dataset.view()?;
    let spec = selection.period_spec(&view);
    let filtered = filter::apply(&view, &spec);
    debug!(rows = filtered.len(), "growth filter applied");
    if filtered.is_empty() {
        return Err(DashboardError::EmptyFilterResult);
    }
    growth::top_growth(&view, &filtered)
}

/// Stacked per-visa series for one occupation. Defaults come from that
/// occupation's own rows.
pub fn breakdown(
    dataset: &Dataset,
    occupation: &str,
    selection: Selection,
) -> Result<Breakdown, DashboardError> {
    if dataset.is_empty() {
        return Err(DashboardError::NoDataLoaded);
    }

    let view = dataset.for_occupation(occupation);
    let spec = selection.points_spec(&view);
    let filtered = filter::apply(&view, &spec);
    debug!(occupation, rows = filtered.len(), "breakdown filter applied");
    if filtered.is_empty() {
        return Err(DashboardError::EmptyFilterResult);
    }

    Ok(Breakdown {
        occupation: occupation.to_string(),
        series: trend::breakdown(&filtered),
        latest_total: trend::latest_total(&trend::series(&filtered)),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::Points;

    fn record(month: u32, occupation: &str, visa: &str, points: &str, count: u64) -> EoiRecord {
        EoiRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, month, 1).unwrap(),
            occupation: occupation.to_string(),
            visa_type: visa.to_string(),
            eoi_status: "SUBMITTED".to_string(),
            points: Points::parse(points),
            count_eois: count,
        }
    }

    fn lodged(month: u32, occupation: &str, count: u64) -> EoiRecord {
        EoiRecord {
            eoi_status: "LODGED".to_string(),
            ..record(month, occupation, "189", "65", count)
        }
    }

    #[test]
    fn empty_visa_selection_never_falls_back_to_the_full_table() {
        let dataset = Dataset::new(vec![
            record(1, "SE", "189", "65", 10),
            record(2, "SE", "189", "70", 15),
        ]);
        let selection = Selection {
            visa_types: Some(BTreeSet::new()),
            ..Selection::default()
        };
        assert_eq!(
            leaderboard(&dataset, selection.clone()).unwrap_err(),
            DashboardError::EmptyFilterResult
        );
        assert_eq!(
            breakdown(&dataset, "SE", selection).unwrap_err(),
            DashboardError::EmptyFilterResult
        );
    }

    #[test]
    fn empty_dataset_reports_no_data_everywhere() {
        let dataset = Dataset::empty();
        assert_eq!(overview(&dataset).unwrap_err(), DashboardError::NoDataLoaded);
        assert_eq!(
            leaderboard(&dataset, Selection::default()).unwrap_err(),
            DashboardError::NoDataLoaded
        );
        assert_eq!(
            growth(&dataset, Selection::default()).unwrap_err(),
            DashboardError::NoDataLoaded
        );
        assert_eq!(
            breakdown(&dataset, "SE", Selection::default()).unwrap_err(),
            DashboardError::NoDataLoaded
        );
    }

    #[test]
    fn default_leaderboard_matches_the_two_month_scenario() {
        let dataset = Dataset::new(vec![
            record(1, "SE", "189", "65", 10),
            record(2, "SE", "189", "70", 15),
        ]);
        let rows = leaderboard(&dataset, Selection::default()).unwrap();
        assert_eq!(rows[0].total_demand, 25);
        assert_eq!(rows[0].dominant_point, 70);
    }

    #[test]
    fn breakdown_latest_total_reads_last_period() {
        let dataset = Dataset::new(vec![
            record(1, "SE", "189", "65", 10),
            record(3, "SE", "190", "70", 4),
            record(3, "SE", "491", "<65", 5),
            record(3, "Nurse", "189", "70", 100),
        ]);

        let result = breakdown(&dataset, "SE", Selection::default()).unwrap();
        assert_eq!(result.series.len(), 3);
        assert_eq!(result.latest_total, 9.0);

        let numeric_only = Selection {
            third: Some(BTreeSet::from(["65".to_string(), "70".to_string()])),
            ..Selection::default()
        };
        let result = breakdown(&dataset, "SE", numeric_only).unwrap();
        assert_eq!(result.latest_total, 4.0);
    }

    #[test]
    fn unknown_occupation_breakdown_is_empty() {
        let dataset = Dataset::new(vec![record(1, "SE", "189", "65", 10)]);
        assert_eq!(
            breakdown(&dataset, "Astronaut", Selection::default()).unwrap_err(),
            DashboardError::EmptyFilterResult
        );
    }

    #[test]
    fn growth_months_are_counted_before_the_status_filter() {
        let mut records: Vec<EoiRecord> = (1..=5)
            .map(|month| record(month, "SE", "189", "65", 10))
            .collect();
        records.push(lodged(6, "SE", 40));
        let dataset = Dataset::new(records);

        let rows = growth(&dataset, Selection::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].occupation, "SE");
        // SUBMITTED volume only: prev3 is Jan-Mar, last3 is Apr-Jun.
        assert!((rows[0].prev3_avg - 10.0).abs() < 1e-9);
        assert!((rows[0].last3_avg - 20.0 / 3.0).abs() < 1e-9);
    }
}
