use std::any::Any;
use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{bail, ensure};
use chrono::{Datelike, Months, NaiveDate};
use tracing::{info, warn};

use crate::error::DashboardError;
use crate::loader::Dataset;
use crate::models::{ForecastResult, ForecastRow, TimeSeriesPoint};
use crate::trend;

/// Number of future months projected per request.
pub const HORIZON: usize = 6;
pub const DEFAULT_INTERVAL_WIDTH: f64 = 0.80;
pub const MIN_HISTORY: usize = 2;

/// Black-box forecasting collaborator working in month-start steps.
pub trait Forecaster {
    type Model;

    fn fit(&self, history: &[TimeSeriesPoint]) -> anyhow::Result<Self::Model>;

    /// One row per fitted history month followed by `periods` future months.
    fn predict(&self, model: &Self::Model, periods: usize) -> anyhow::Result<Vec<ForecastRow>>;
}

/// The occupation's complete history across every visa type and status.
/// Display filters never narrow what the forecaster is trained on.
pub fn training_series(dataset: &Dataset, occupation: &str) -> Vec<TimeSeriesPoint> {
    trend::series(&dataset.for_occupation(occupation))
}

pub fn run<F: Forecaster>(
    forecaster: &F,
    occupation: &str,
    history: Vec<TimeSeriesPoint>,
    with_history: bool,
) -> Result<ForecastResult, DashboardError> {
    let periods = history
        .iter()
        .map(|point| point.timestamp)
        .collect::<BTreeSet<_>>()
        .len();
    if periods < MIN_HISTORY {
        return Err(DashboardError::InsufficientHistory { periods });
    }
    if history
        .windows(2)
        .any(|pair| pair[0].timestamp >= pair[1].timestamp)
    {
        return Err(DashboardError::ForecastTrainingFailed(
            "history is not in strictly chronological order".to_string(),
        ));
    }

    info!(occupation, periods, "training forecast");
    let rows = forecaster
        .fit(&history)
        .and_then(|model| forecaster.predict(&model, HORIZON))
        .map_err(|err| {
            warn!(occupation, error = %err, "forecast training failed");
            DashboardError::ForecastTrainingFailed(format!("{err:#}"))
        })?;

    let last_observed = history[history.len() - 1].timestamp;
    let (fitted, future) = normalize(rows, last_observed)?;

    Ok(ForecastResult {
        occupation: occupation.to_string(),
        history,
        future,
        fitted: with_history.then_some(fitted),
    })
}

/// Runs the forecast on a blocking worker. Exceeding `limit` reports
/// `ForecastCancelled`; a panicking forecaster reports a training failure.
pub async fn run_with_timeout<F>(
    forecaster: F,
    occupation: String,
    history: Vec<TimeSeriesPoint>,
    with_history: bool,
    limit: Duration,
) -> Result<ForecastResult, DashboardError>
where
    F: Forecaster + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || {
        run(&forecaster, &occupation, history, with_history)
    });

    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            let message = if join_error.is_panic() {
                panic_message(join_error.into_panic())
            } else {
                join_error.to_string()
            };
            warn!(error = %message, "forecast worker aborted");
            Err(DashboardError::ForecastTrainingFailed(message))
        }
        Err(_) => {
            warn!(limit = ?limit, "forecast exceeded its time limit");
            Err(DashboardError::ForecastCancelled { after: limit })
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "forecaster panicked".to_string()
    }
}

/// Splits forecaster output into fitted history rows and exactly
/// `HORIZON` future rows continuing month by month after `last_observed`.
fn normalize(
    mut rows: Vec<ForecastRow>,
    last_observed: NaiveDate,
) -> Result<(Vec<ForecastRow>, Vec<ForecastRow>), DashboardError> {
    let failed = |message: String| DashboardError::ForecastTrainingFailed(message);

    if rows.iter().any(|row| {
        !(row.point_estimate.is_finite()
            && row.lower_bound.is_finite()
            && row.upper_bound.is_finite())
    }) {
        return Err(failed("forecaster produced non-finite values".to_string()));
    }

    rows.sort_by_key(|row| row.timestamp);
    for row in rows.iter_mut() {
        let lower = row.lower_bound.min(row.upper_bound).min(row.point_estimate);
        let upper = row.lower_bound.max(row.upper_bound).max(row.point_estimate);
        row.lower_bound = lower;
        row.upper_bound = upper;
    }

    let (fitted, future): (Vec<ForecastRow>, Vec<ForecastRow>) = rows
        .into_iter()
        .partition(|row| row.timestamp <= last_observed);

    if future.len() != HORIZON {
        return Err(failed(format!(
            "expected {HORIZON} future periods, forecaster returned {}",
            future.len()
        )));
    }
    for (step, row) in future.iter().enumerate() {
        if Some(row.timestamp) != add_months(last_observed, step as u32 + 1) {
            return Err(failed(format!(
                "unexpected future period {} at step {}",
                row.timestamp,
                step + 1
            )));
        }
    }

    Ok((fitted, future))
}

fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

fn month_index(origin: NaiveDate, date: NaiveDate) -> i32 {
    (date.year() - origin.year()) * 12 + date.month() as i32 - origin.month() as i32
}

/// Linear trend with multiplicative month-of-year seasonality.
#[derive(Debug, Clone)]
pub struct SeasonalTrendForecaster {
    /// Probability mass inside the reported bounds.
    pub interval_width: f64,
    /// Seasonal factors are only estimated from this many points onwards.
    pub min_seasonal_points: usize,
}

impl Default for SeasonalTrendForecaster {
    fn default() -> Self {
        Self {
            interval_width: DEFAULT_INTERVAL_WIDTH,
            min_seasonal_points: 24,
        }
    }
}

impl SeasonalTrendForecaster {
    pub fn with_interval_width(interval_width: f64) -> Self {
        Self {
            interval_width,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeasonalTrendModel {
    origin: NaiveDate,
    observed: Vec<NaiveDate>,
    intercept: f64,
    slope: f64,
    seasonal: [f64; 12],
    residual_se: f64,
    mean_x: f64,
    sxx: f64,
    z: f64,
}

impl SeasonalTrendModel {
    fn row(&self, timestamp: NaiveDate) -> ForecastRow {
        let x = month_index(self.origin, timestamp) as f64;
        let factor = self.seasonal[timestamp.month0() as usize];
        let n = self.observed.len() as f64;
        let point_estimate = (self.intercept + self.slope * x) * factor;
        let spread = self.z
            * self.residual_se
            * factor
            * (1.0 + 1.0 / n + (x - self.mean_x).powi(2) / self.sxx).sqrt();

        ForecastRow {
            timestamp,
            point_estimate,
            lower_bound: point_estimate - spread,
            upper_bound: point_estimate + spread,
        }
    }
}

impl Forecaster for SeasonalTrendForecaster {
    type Model = SeasonalTrendModel;

    fn fit(&self, history: &[TimeSeriesPoint]) -> anyhow::Result<SeasonalTrendModel> {
        ensure!(
            history.len() >= MIN_HISTORY,
            "need at least {MIN_HISTORY} observations, got {}",
            history.len()
        );
        ensure!(
            self.interval_width > 0.0 && self.interval_width < 1.0,
            "interval width must be between 0 and 1, got {}",
            self.interval_width
        );
        if let Some(point) = history.iter().find(|point| !point.value.is_finite()) {
            bail!("non-finite value at {}", point.timestamp);
        }

        let origin = history[0].timestamp;
        let xs: Vec<f64> = history
            .iter()
            .map(|point| month_index(origin, point.timestamp) as f64)
            .collect();
        let ys: Vec<f64> = history.iter().map(|point| point.value).collect();
        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;
        let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
        let sxy: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (x - mean_x) * (y - mean_y))
            .sum();
        ensure!(sxx > 0.0, "degenerate time axis: every observation shares one month");

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let mut seasonal = [1.0; 12];
        if history.len() >= self.min_seasonal_points {
            let mut sums = [0.0; 12];
            let mut counts = [0usize; 12];
            for (point, x) in history.iter().zip(&xs) {
                let trend = intercept + slope * x;
                if trend > 0.0 {
                    let month = point.timestamp.month0() as usize;
                    sums[month] += point.value / trend;
                    counts[month] += 1;
                }
            }
            for month in 0..12 {
                if counts[month] > 0 {
                    seasonal[month] = sums[month] / counts[month] as f64;
                }
            }
            let mean = seasonal.iter().sum::<f64>() / 12.0;
            if mean > 0.0 {
                seasonal.iter_mut().for_each(|factor| *factor /= mean);
            }
        }

        let residual_se = if history.len() > 2 {
            let sse: f64 = history
                .iter()
                .zip(&xs)
                .map(|(point, x)| {
                    let factor = seasonal[point.timestamp.month0() as usize];
                    let fitted = (intercept + slope * x) * factor;
                    (point.value - fitted).powi(2)
                })
                .sum();
            (sse / (n - 2.0)).sqrt()
        } else {
            0.0
        };

        Ok(SeasonalTrendModel {
            origin,
            observed: history.iter().map(|point| point.timestamp).collect(),
            intercept,
            slope,
            seasonal,
            residual_se,
            mean_x,
            sxx,
            z: normal_quantile(0.5 + self.interval_width / 2.0),
        })
    }

    fn predict(
        &self,
        model: &SeasonalTrendModel,
        periods: usize,
    ) -> anyhow::Result<Vec<ForecastRow>> {
        let Some(last) = model.observed.last().copied() else {
            bail!("model has no observations");
        };

        let mut rows: Vec<ForecastRow> = model.observed.iter().map(|ts| model.row(*ts)).collect();
        for step in 1..=periods {
            let Some(timestamp) = add_months(last, step as u32) else {
                bail!("future period {step} after {last} is out of range");
            };
            rows.push(model.row(timestamp));
        }
        Ok(rows)
    }
}

/// Inverse standard normal CDF (Acklam's rational approximation).
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155288572e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838,
        -2.549732539343734,
        4.374664141464968,
        2.938163982698783,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996,
        3.754408661907416,
    ];
    const P_LOW: f64 = 0.02425;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p <= 0.0 {
        f64::NEG_INFINITY
    } else if p >= 1.0 {
        f64::INFINITY
    } else if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}
