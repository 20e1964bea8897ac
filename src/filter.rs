use std::collections::BTreeSet;

use crate::models::EoiRecord;

pub const DEFAULT_STATUS: &str = "SUBMITTED";

/// Third filter dimension: the leaderboard filters by period, the
/// occupation breakdown by raw points label.
#[derive(Debug, Clone, PartialEq)]
pub enum ThirdDimension {
    Periods(BTreeSet<String>),
    Points(BTreeSet<String>),
}

/// Allowed values per dimension. An empty set matches nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub visa_types: BTreeSet<String>,
    pub statuses: BTreeSet<String>,
    pub third: ThirdDimension,
}

impl FilterSpec {
    /// Dashboard defaults for the leaderboard: every visa type and period,
    /// `SUBMITTED` when present, otherwise every status.
    pub fn period_defaults(view: &[&EoiRecord]) -> Self {
        Self {
            visa_types: distinct(view, |record| record.visa_type.clone()),
            statuses: default_statuses(view),
            third: ThirdDimension::Periods(distinct(view, |record| record.period())),
        }
    }

    /// Dashboard defaults for the occupation breakdown, with every points label.
    pub fn points_defaults(view: &[&EoiRecord]) -> Self {
        Self {
            visa_types: distinct(view, |record| record.visa_type.clone()),
            statuses: default_statuses(view),
            third: ThirdDimension::Points(distinct(view, |record| record.points.label())),
        }
    }

    /// Replaces each dimension with the explicit selection, when one was made.
    pub fn with_selection(
        mut self,
        visa_types: Option<BTreeSet<String>>,
        statuses: Option<BTreeSet<String>>,
        third: Option<BTreeSet<String>>,
    ) -> Self {
        if let Some(values) = visa_types {
            self.visa_types = values;
        }
        if let Some(values) = statuses {
            self.statuses = values;
        }
        if let Some(values) = third {
            self.third = match self.third {
                ThirdDimension::Periods(_) => ThirdDimension::Periods(values),
                ThirdDimension::Points(_) => ThirdDimension::Points(values),
            };
        }
        self
    }

    pub fn matches(&self, record: &EoiRecord) -> bool {
        let third = match &self.third {
            ThirdDimension::Periods(periods) => periods.contains(&record.period()),
            ThirdDimension::Points(points) => points.contains(&record.points.label()),
        };
        third
            && self.visa_types.contains(&record.visa_type)
            && self.statuses.contains(&record.eoi_status)
    }
}

pub fn apply<'a>(view: &[&'a EoiRecord], spec: &FilterSpec) -> Vec<&'a EoiRecord> {
    view.iter()
        .copied()
        .filter(|record| spec.matches(record))
        .collect()
}

pub fn distinct<F>(view: &[&EoiRecord], key: F) -> BTreeSet<String>
where
    F: Fn(&EoiRecord) -> String,
{
    view.iter().map(|record| key(record)).collect()
}

fn default_statuses(view: &[&EoiRecord]) -> BTreeSet<String> {
    let statuses = distinct(view, |record| record.eoi_status.clone());
    if statuses.contains(DEFAULT_STATUS) {
        BTreeSet::from([DEFAULT_STATUS.to_string()])
    } else {
        statuses
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::Points;

    fn record(month: u32, visa: &str, status: &str, points: &str, count: u64) -> EoiRecord {
        EoiRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, month, 1).unwrap(),
            occupation: "Software Engineer".to_string(),
            visa_type: visa.to_string(),
            eoi_status: status.to_string(),
            points: Points::parse(points),
            count_eois: count,
        }
    }

    fn sample() -> Vec<EoiRecord> {
        vec![
            record(1, "189", "SUBMITTED", "65", 10),
            record(1, "190", "LODGED", "70", 4),
            record(2, "491", "SUBMITTED", "<65", 2),
            record(3, "189", "INVITED", "80", 7),
        ]
    }

    #[test]
    fn output_is_subset_satisfying_every_dimension() {
        let records = sample();
        let view: Vec<&EoiRecord> = records.iter().collect();
        let spec = FilterSpec {
            visa_types: BTreeSet::from(["189".to_string(), "491".to_string()]),
            statuses: BTreeSet::from(["SUBMITTED".to_string(), "INVITED".to_string()]),
            third: ThirdDimension::Periods(BTreeSet::from([
                "2024-01".to_string(),
                "2024-03".to_string(),
            ])),
        };

        let filtered = apply(&view, &spec);
        assert_eq!(filtered.len(), 2);
        for row in filtered {
            assert!(records.contains(row));
            assert!(spec.visa_types.contains(&row.visa_type));
            assert!(spec.statuses.contains(&row.eoi_status));
            assert!(["2024-01", "2024-03"].contains(&row.period().as_str()));
        }
    }

    #[test]
    fn empty_selection_matches_nothing() {
        let records = sample();
        let view: Vec<&EoiRecord> = records.iter().collect();
        let spec = FilterSpec::period_defaults(&view).with_selection(
            Some(BTreeSet::new()),
            None,
            None,
        );
        assert!(apply(&view, &spec).is_empty());
    }

    #[test]
    fn defaults_prefer_submitted_status() {
        let records = sample();
        let view: Vec<&EoiRecord> = records.iter().collect();
        let spec = FilterSpec::period_defaults(&view);
        assert_eq!(spec.statuses, BTreeSet::from(["SUBMITTED".to_string()]));
        assert_eq!(spec.visa_types.len(), 3);
        assert_eq!(apply(&view, &spec).len(), 2);

        let lodged: Vec<EoiRecord> = vec![record(1, "190", "LODGED", "70", 4)];
        let view: Vec<&EoiRecord> = lodged.iter().collect();
        let spec = FilterSpec::period_defaults(&view);
        assert_eq!(spec.statuses, BTreeSet::from(["LODGED".to_string()]));
    }

    #[test]
    fn points_dimension_filters_on_raw_labels() {
        let records = sample();
        let view: Vec<&EoiRecord> = records.iter().collect();
        let spec = FilterSpec::points_defaults(&view).with_selection(
            None,
            Some(distinct(&view, |record| record.eoi_status.clone())),
            Some(BTreeSet::from(["<65".to_string(), "80".to_string()])),
        );
        let filtered = apply(&view, &spec);
        assert_eq!(filtered.len(), 2);
        assert!(filtered
            .iter()
            .all(|row| row.points.label() == "<65" || row.points.label() == "80"));
    }

    #[test]
    fn unknown_values_are_never_matched() {
        let records = sample();
        let view: Vec<&EoiRecord> = records.iter().collect();
        let spec = FilterSpec::period_defaults(&view).with_selection(
            Some(BTreeSet::from(["999".to_string()])),
            None,
            None,
        );
        assert!(apply(&view, &spec).is_empty());
    }
}
