//! Recursive multi-step forecasting of one indicator series.
//!
//! The model regresses each observation on a linear trend (months since the first
//! period), optional yearly Fourier terms, and the two previous observations (`lag1`,
//! `lag2`). Multi-step predictions are recursive: after the first step, the lags are the
//! model's own earlier predictions, so errors compound across the horizon.
//!
//! ## Example
//!
//! ```rust,ignore
//! let engine = ForecastEngine::new(ForecastConfig::default().with_horizon(2))?;
//! let future = engine.project(&table.series(Indicator::CurrentLiquidity))?;
//! ```

use crate::config::ForecastConfig;
use crate::error::{AnalyticsError, Result};
use crate::metrics::{mae, mape, rmse};
use crate::period::Period;
use crate::regression::RidgeRegression;
use crate::seasonality::fourier_terms;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observations consumed as lags before the first usable row.
const LAGS: usize = 2;

/// Fewest usable rows the projection model is fitted on.
const MIN_PROJECTION_ROWS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Fraction, not percent. Infinite when any actual value is zero.
    pub mape: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestPoint {
    pub period: Period,
    pub actual: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub metrics: ForecastMetrics,
    pub points: Vec<BacktestPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: Period,
    pub predicted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FutureForecast {
    pub points: Vec<ForecastPoint>,
}

impl FutureForecast {
    pub fn to_csv(&self) -> String {
        let mut output = String::from("period,predicted\n");
        for point in &self.points {
            output.push_str(&format!("{},{:.2}\n", point.period, point.predicted));
        }
        output
    }
}

/// Backtest and projection of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub backtest: ForecastResult,
    pub future: FutureForecast,
}

impl ForecastReport {
    pub fn to_markdown(&self, title: &str) -> String {
        let mut output = format!("# Forecast: {}\n\n", title);

        output.push_str("## Backtest\n\n");
        output.push_str(&format!(
            "MAE: {:.4} | RMSE: {:.4} | MAPE: {:.2}%\n\n",
            self.backtest.metrics.mae,
            self.backtest.metrics.rmse,
            self.backtest.metrics.mape * 100.0
        ));
        output.push_str("| Period | Actual | Predicted |\n|---|---:|---:|\n");
        for point in &self.backtest.points {
            output.push_str(&format!(
                "| {} | {:.2} | {:.2} |\n",
                point.period, point.actual, point.predicted
            ));
        }

        output.push_str("\n## Projection\n\n| Period | Predicted |\n|---|---:|\n");
        for point in &self.future.points {
            output.push_str(&format!("| {} | {:.2} |\n", point.period, point.predicted));
        }
        output
    }
}

pub struct ForecastEngine {
    config: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Holds out the last `horizon` observations, fits on the rest, and predicts the
    /// holdout recursively. Requires at least `2 * horizon` usable (lagged) rows.
    pub fn backtest(&self, series: &BTreeMap<Period, f64>) -> Result<ForecastResult> {
        let horizon = self.config.horizon;
        let observations = observations(series)?;
        let usable = observations.len().saturating_sub(LAGS);
        let required = 2 * horizon;
        if usable < required {
            return Err(AnalyticsError::InsufficientHistory {
                required,
                available: usable,
            });
        }

        let split = observations.len() - horizon;
        let (train, test) = observations.split_at(split);
        let model = self.fit(train)?;

        let periods: Vec<Period> = test.iter().map(|(p, _)| *p).collect();
        let predictions = model.predict_recursive(&periods, seed(train));

        let actual: Vec<f64> = test.iter().map(|(_, v)| *v).collect();
        let metrics = ForecastMetrics {
            mae: mae(&actual, &predictions),
            rmse: rmse(&actual, &predictions),
            mape: mape(&actual, &predictions),
        };
        debug!(
            "Backtest over {} periods: MAE {:.4}, RMSE {:.4}, MAPE {:.4}",
            horizon, metrics.mae, metrics.rmse, metrics.mape
        );

        let points = test
            .iter()
            .zip(predictions)
            .map(|(&(period, actual), predicted)| BacktestPoint {
                period,
                actual,
                predicted,
            })
            .collect();

        Ok(ForecastResult { metrics, points })
    }

    /// Refits on the whole series and predicts `horizon` months past the last period.
    pub fn project(&self, series: &BTreeMap<Period, f64>) -> Result<FutureForecast> {
        let horizon = self.config.horizon;
        let observations = observations(series)?;
        let usable = observations.len().saturating_sub(LAGS);
        let required = horizon.max(MIN_PROJECTION_ROWS);
        if usable < required {
            return Err(AnalyticsError::InsufficientHistory {
                required,
                available: usable,
            });
        }

        let model = self.fit(&observations)?;
        let (last, _) = observations[observations.len() - 1];
        let periods: Vec<Period> = (1..=horizon).map(|k| last.add_months(k as i32)).collect();
        let predictions = model.predict_recursive(&periods, seed(&observations));

        info!(
            "Projected {} periods after {} from {} observations",
            horizon,
            last,
            observations.len()
        );

        Ok(FutureForecast {
            points: periods
                .into_iter()
                .zip(predictions)
                .map(|(period, predicted)| ForecastPoint { period, predicted })
                .collect(),
        })
    }

    pub fn run(&self, series: &BTreeMap<Period, f64>) -> Result<ForecastReport> {
        Ok(ForecastReport {
            backtest: self.backtest(series)?,
            future: self.project(series)?,
        })
    }

    fn fit(&self, window: &[(Period, f64)]) -> Result<FittedModel> {
        let origin = window[0].0;
        let last = window[window.len() - 1].0;
        let seasonal = self.config.yearly_seasonality.applies(origin, last);

        let model = FittedModel {
            regression: None,
            origin,
            fourier_order: if seasonal { self.config.fourier_order } else { 0 },
        };

        let mut rows = Vec::with_capacity(window.len().saturating_sub(LAGS));
        let mut targets = Vec::with_capacity(rows.capacity());
        for i in LAGS..window.len() {
            let (period, value) = window[i];
            rows.push(model.features(period, window[i - 1].1, window[i - 2].1));
            targets.push(value);
        }

        let regression = RidgeRegression::fit(&rows, &targets, self.config.ridge_penalty)?;
        debug!(
            "Fitted forecast model on {} rows ({} active regressors, seasonal: {})",
            regression.n_observations(),
            regression.active_columns(),
            seasonal
        );

        Ok(FittedModel {
            regression: Some(regression),
            ..model
        })
    }
}

fn observations(series: &BTreeMap<Period, f64>) -> Result<Vec<(Period, f64)>> {
    series
        .iter()
        .map(|(&period, &value)| {
            if value.is_finite() {
                Ok((period, value))
            } else {
                Err(AnalyticsError::NonFiniteObservation(period.to_string()))
            }
        })
        .collect()
}

/// Last two observations, oldest first.
fn seed(observations: &[(Period, f64)]) -> [f64; 2] {
    let n = observations.len();
    [observations[n - 2].1, observations[n - 1].1]
}

struct FittedModel {
    regression: Option<RidgeRegression>,
    origin: Period,
    fourier_order: usize,
}

impl FittedModel {
    fn features(&self, period: Period, lag1: f64, lag2: f64) -> Vec<f64> {
        let mut row = vec![self.origin.months_until(&period) as f64];
        if self.fourier_order > 0 {
            row.extend(fourier_terms(period, self.fourier_order));
        }
        row.push(lag1);
        row.push(lag2);
        row
    }

    /// Predicts each period in turn, appending every prediction to the lag history.
    fn predict_recursive(&self, periods: &[Period], seed: [f64; 2]) -> Vec<f64> {
        let Some(regression) = &self.regression else {
            return Vec::new();
        };

        let mut history = seed.to_vec();
        let mut predictions = Vec::with_capacity(periods.len());
        for &period in periods {
            let lag1 = history[history.len() - 1];
            let lag2 = history[history.len() - 2];
            let predicted = regression.predict(&self.features(period, lag1, lag2));
            history.push(predicted);
            predictions.push(predicted);
        }
        predictions
    }
}
