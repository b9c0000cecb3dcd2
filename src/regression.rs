//! Linear least squares on standardized regressors with an optional ridge penalty.
//!
//! Columns are centred and scaled to unit variance before fitting, so one penalty value
//! behaves the same whatever the units of the inputs. The intercept is the mean of the
//! target and is never penalized. Constant columns carry no information and are dropped.

use crate::error::{AnalyticsError, Result};
use serde::{Deserialize, Serialize};

const PIVOT_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ColumnScale {
    mean: f64,
    std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegression {
    intercept: f64,
    /// One entry per input column; `None` marks a dropped constant column.
    scales: Vec<Option<ColumnScale>>,
    /// Coefficients of the kept columns, in column order.
    coefficients: Vec<f64>,
    n_observations: usize,
}

impl RidgeRegression {
    /// Fits `y ≈ intercept + Σ βⱼ·zⱼ` where `zⱼ` is column `j` of `rows` standardized.
    pub fn fit(rows: &[Vec<f64>], y: &[f64], penalty: f64) -> Result<Self> {
        if rows.is_empty() || rows.len() != y.len() {
            return Err(AnalyticsError::InsufficientHistory {
                required: 1,
                available: rows.len().min(y.len()),
            });
        }
        let n = rows.len() as f64;
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(AnalyticsError::SingularModel(
                "feature rows have different lengths".to_string(),
            ));
        }

        let scales: Vec<Option<ColumnScale>> = (0..width)
            .map(|j| {
                let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
                let var = rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                (std > 1e-12 * mean.abs().max(1.0)).then_some(ColumnScale { mean, std })
            })
            .collect();
        let kept: Vec<(usize, ColumnScale)> = scales
            .iter()
            .enumerate()
            .filter_map(|(j, s)| s.map(|s| (j, s)))
            .collect();

        let y_mean = y.iter().sum::<f64>() / n;
        let z: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| kept.iter().map(|&(j, s)| (r[j] - s.mean) / s.std).collect())
            .collect();

        let p = kept.len();
        let mut gram = vec![vec![0.0; p]; p];
        let mut rhs = vec![0.0; p];
        for (zi, &yi) in z.iter().zip(y) {
            for a in 0..p {
                rhs[a] += zi[a] * (yi - y_mean) / n;
                for b in 0..p {
                    gram[a][b] += zi[a] * zi[b] / n;
                }
            }
        }
        for (a, row) in gram.iter_mut().enumerate() {
            row[a] += penalty;
        }

        let coefficients = solve(gram, rhs)?;

        Ok(Self {
            intercept: y_mean,
            scales,
            coefficients,
            n_observations: rows.len(),
        })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut coefficients = self.coefficients.iter();
        let mut value = self.intercept;
        for (x, scale) in row.iter().zip(&self.scales) {
            if let Some(s) = scale {
                if let Some(beta) = coefficients.next() {
                    value += beta * (x - s.mean) / s.std;
                }
            }
        }
        value
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Number of columns that entered the fit.
    pub fn active_columns(&self) -> usize {
        self.coefficients.len()
    }

    pub fn n_observations(&self) -> usize {
        self.n_observations
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot_row][col].abs() < PIVOT_EPSILON {
            return Err(AnalyticsError::SingularModel(format!(
                "pivot {} vanished; regressors are collinear",
                col
            )));
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        let pivot = a[col].clone();
        let pivot_rhs = b[col];
        for row in col + 1..n {
            let factor = a[row][col] / pivot[col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * pivot[k];
            }
            b[row] -= factor * pivot_rhs;
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
