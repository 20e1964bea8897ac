use std::fmt::Write;

use crate::error::DashboardError;
use crate::models::{ForecastResult, GrowthRow, LeaderboardRow, Overview};

/// Everything one report run computed. Each section keeps its own outcome so
/// an expected condition in one section never hides the others.
pub struct ReportInputs<'a> {
    pub overview: &'a Result<Overview, DashboardError>,
    pub leaderboard: &'a Result<Vec<LeaderboardRow>, DashboardError>,
    pub growth: &'a Result<Vec<GrowthRow>, DashboardError>,
    pub forecast: Option<&'a Result<ForecastResult, DashboardError>>,
}

pub fn build_report(inputs: &ReportInputs<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# SkillSelect EOI Report");

    match inputs.overview {
        Ok(overview) => {
            let range = match (overview.first_period, overview.last_period) {
                (Some(first), Some(last)) => {
                    format!("{} to {}", first.format("%b %Y"), last.format("%b %Y"))
                }
                _ => "no periods".to_string(),
            };
            let _ = writeln!(
                output,
                "Covering {} occupations and {} EOIs ({})",
                overview.occupations_tracked, overview.total_eois, range
            );
            let _ = writeln!(output);
            let _ = writeln!(output, "## Global Trend");
            for point in &overview.trend {
                let _ = writeln!(
                    output,
                    "- {}: {:.0}",
                    point.timestamp.format("%Y-%m"),
                    point.value
                );
            }
        }
        Err(err) => {
            let _ = writeln!(output, "{err}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Occupations");

    match inputs.leaderboard {
        Ok(rows) => {
            let _ = writeln!(
                output,
                "| Occupation | Total Demand | Dominant Point | Lowest Point | Highest Point |"
            );
            let _ = writeln!(output, "|---|---:|---:|---:|---:|");
            for row in rows {
                let _ = writeln!(
                    output,
                    "| {} | {} | {} | {} | {} |",
                    row.occupation,
                    row.total_demand,
                    row.dominant_point,
                    row.lowest_point,
                    row.highest_point
                );
            }
        }
        Err(err) => {
            let _ = writeln!(output, "{err}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Fastest Growing Occupations");

    match inputs.growth {
        Ok(rows) if rows.is_empty() => {
            let _ = writeln!(output, "No occupation had volume in the earlier window.");
        }
        Ok(rows) => {
            for row in rows {
                let _ = writeln!(
                    output,
                    "- {}: {:+.1}% ({:.1} to {:.1} per month)",
                    row.occupation, row.growth_pct, row.prev3_avg, row.last3_avg
                );
            }
        }
        Err(err) => {
            let _ = writeln!(output, "{err}");
        }
    }

    if let Some(forecast) = inputs.forecast {
        let _ = writeln!(output);
        match forecast {
            Ok(result) => {
                let _ = writeln!(output, "## Forecast: {}", result.occupation);
                let _ = writeln!(output, "| Month | Forecast | Lower | Upper |");
                let _ = writeln!(output, "|---|---:|---:|---:|");
                for row in &result.future {
                    let _ = writeln!(
                        output,
                        "| {} | {:.1} | {:.1} | {:.1} |",
                        row.timestamp.format("%B %Y"),
                        row.point_estimate,
                        row.lower_bound,
                        row.upper_bound
                    );
                }
            }
            Err(err) => {
                let _ = writeln!(output, "## Forecast");
                let _ = writeln!(output, "{err}");
            }
        }
    }

    output
}
