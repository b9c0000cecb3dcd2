use crate::period::Period;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Fit windows spanning at least this many months switch `Auto` seasonality on.
pub const AUTO_SEASONALITY_MIN_MONTHS: i32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum SeasonalityMode {
    #[default]
    #[schemars(description = "Yearly terms are used when the fit window spans at least two years.")]
    Auto,
    #[schemars(description = "Always include yearly terms.")]
    Enabled,
    #[schemars(description = "Never include yearly terms.")]
    Disabled,
}

impl SeasonalityMode {
    /// Whether yearly terms apply to a fit window running from `first` to `last` inclusive.
    pub fn applies(&self, first: Period, last: Period) -> bool {
        match self {
            Self::Enabled => true,
            Self::Disabled => false,
            Self::Auto => first.months_until(&last) + 1 >= AUTO_SEASONALITY_MIN_MONTHS,
        }
    }
}

/// Yearly Fourier terms for the calendar month of `period`: `sin` then `cos` of
/// `2πk·m/12` for `k = 1..=order`, with `m` the zero-based month.
pub fn fourier_terms(period: Period, order: usize) -> Vec<f64> {
    let month = period.month0() as f64;
    let mut terms = Vec::with_capacity(order * 2);
    for k in 1..=order {
        let angle = 2.0 * PI * k as f64 * month / 12.0;
        terms.push(angle.sin());
        terms.push(angle.cos());
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    #[test]
    fn test_auto_mode_needs_two_years() {
        let mode = SeasonalityMode::Auto;
        assert!(!mode.applies(p("2022-01"), p("2023-11")));
        assert!(mode.applies(p("2022-01"), p("2023-12")));
        assert!(SeasonalityMode::Enabled.applies(p("2023-01"), p("2023-02")));
        assert!(!SeasonalityMode::Disabled.applies(p("2010-01"), p("2023-12")));
    }

    #[test]
    fn test_fourier_terms_repeat_yearly() {
        let jan = fourier_terms(p("2022-01"), 3);
        let next_jan = fourier_terms(p("2023-01"), 3);
        assert_eq!(jan.len(), 6);
        assert_eq!(jan, next_jan);
        assert!(jan[0].abs() < 1e-12);
        assert!((jan[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fourier_terms_quarter_phase() {
        let april = fourier_terms(p("2023-04"), 1);
        assert!((april[0] - 1.0).abs() < 1e-12);
        assert!(april[1].abs() < 1e-12);
    }
}
