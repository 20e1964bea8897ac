use std::collections::{BTreeMap, BTreeSet};

use chrono::{Months, NaiveDate};

use crate::error::DashboardError;
use crate::models::{EoiRecord, GrowthRow};

pub const WINDOW_MONTHS: usize = 3;
pub const MIN_MONTHS: usize = WINDOW_MONTHS * 2;
pub const TOP_GROWTH: usize = 5;

/// Compares each occupation's mean monthly volume over the latest three
/// calendar months against the three calendar months before them.
///
/// `table` is the whole input table. It fixes the latest month and must span
/// at least six distinct months. Volumes are summed from `view`, the filtered
/// rows. A month with no rows counts as zero volume. Occupations with a zero
/// `prev3` average have no defined growth and are left out.
pub fn top_growth(
    table: &[&EoiRecord],
    view: &[&EoiRecord],
) -> Result<Vec<GrowthRow>, DashboardError> {
    let months: BTreeSet<NaiveDate> = table.iter().map(|record| record.timestamp).collect();
    let Some(latest) = months.last().copied() else {
        return Err(DashboardError::InsufficientGrowthWindow { months: 0 });
    };
    if months.len() < MIN_MONTHS {
        return Err(DashboardError::InsufficientGrowthWindow {
            months: months.len(),
        });
    }

    let last3 = window(latest, 0);
    let prev3 = window(latest, WINDOW_MONTHS as u32);

    let mut windows: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for record in view {
        let entry = windows.entry(record.occupation.as_str()).or_insert((0, 0));
        if last3.contains(&record.timestamp) {
            entry.0 += record.count_eois;
        } else if prev3.contains(&record.timestamp) {
            entry.1 += record.count_eois;
        }
    }

    let mut rows: Vec<GrowthRow> = windows
        .into_iter()
        .filter(|(_, (_, prev_total))| *prev_total > 0)
        .map(|(occupation, (last_total, prev_total))| {
            let last3_avg = last_total as f64 / WINDOW_MONTHS as f64;
            let prev3_avg = prev_total as f64 / WINDOW_MONTHS as f64;
            GrowthRow {
                occupation: occupation.to_string(),
                prev3_avg,
                last3_avg,
                growth_pct: (last3_avg - prev3_avg) / prev3_avg * 100.0,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.growth_pct
            .partial_cmp(&a.growth_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows.truncate(TOP_GROWTH);
    Ok(rows)
}

/// Three consecutive calendar months ending `offset` months before `latest`.
fn window(latest: NaiveDate, offset: u32) -> BTreeSet<NaiveDate> {
    (offset..offset + WINDOW_MONTHS as u32)
        .filter_map(|back| latest.checked_sub_months(Months::new(back)))
        .collect()
}
