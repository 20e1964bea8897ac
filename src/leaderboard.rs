use std::collections::{BTreeMap, HashMap};

use crate::error::DashboardError;
use crate::models::{EoiRecord, LeaderboardRow};

pub const LEADERBOARD_SIZE: usize = 15;

/// Ranks occupations by summed `count_eois`, highest first. Ties keep the
/// order in which occupations first appear in the view.
pub fn build(view: &[&EoiRecord]) -> Result<Vec<LeaderboardRow>, DashboardError> {
    if view.is_empty() {
        return Err(DashboardError::EmptyFilterResult);
    }

    let mut totals = rank_totals(view);
    totals.truncate(LEADERBOARD_SIZE);

    let rows = totals
        .into_iter()
        .map(|(occupation, total_demand)| {
            let (dominant_point, lowest_point, highest_point) =
                point_statistics(view, &occupation);
            LeaderboardRow {
                occupation,
                total_demand,
                dominant_point,
                lowest_point,
                highest_point,
            }
        })
        .collect();

    Ok(rows)
}

pub fn rank_totals(view: &[&EoiRecord]) -> Vec<(String, u64)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<(String, u64)> = Vec::new();

    for record in view {
        let slot = *index.entry(record.occupation.as_str()).or_insert_with(|| {
            totals.push((record.occupation.clone(), 0));
            totals.len() - 1
        });
        totals[slot].1 += record.count_eois;
    }

    // sort_by is stable, so equal totals stay in first-appearance order
    totals.sort_by(|a, b| b.1.cmp(&a.1));
    totals
}

/// Returns `(dominant, lowest, highest)` over the occupation's numeric points.
///
/// The dominant point is weighted by volume (smallest value wins a tie);
/// lowest and highest are the plain range of observed values. All three are
/// 0 when the occupation has no numeric points.
pub fn point_statistics(view: &[&EoiRecord], occupation: &str) -> (i64, i64, i64) {
    let mut distribution: BTreeMap<i64, u64> = BTreeMap::new();

    for record in view.iter().filter(|record| record.occupation == occupation) {
        if let Some(points) = record.points.numeric() {
            *distribution.entry(points).or_insert(0) += record.count_eois;
        }
    }

    let (Some(lowest), Some(highest)) = (
        distribution.keys().next().copied(),
        distribution.keys().next_back().copied(),
    ) else {
        return (0, 0, 0);
    };

    let mut dominant = lowest;
    let mut dominant_volume = 0u64;
    for (points, volume) in &distribution {
        if *volume > dominant_volume {
            dominant = *points;
            dominant_volume = *volume;
        }
    }

    (dominant, lowest, highest)
}
