use crate::error::{AnalyticsError, Result};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A calendar month reporting period, rendered as `YYYY-MM`.
///
/// Ordering is chronological, so a `BTreeMap<Period, _>` iterates oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

fn period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("static period pattern"))
}

fn embedded_period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})-(\d{2})").expect("static period pattern"))
}

fn br_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{2})/(\d{2})/(\d{4})").expect("static date pattern"))
}

const MAX_YEAR: i32 = 9999;

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || !(0..=MAX_YEAR).contains(&year) {
            return Err(AnalyticsError::InvalidPeriod(format!(
                "{:04}-{:02}",
                year, month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Zero-based month of the year (January = 0).
    pub fn month0(&self) -> u32 {
        self.month - 1
    }

    /// Moves the period by `months` calendar months (negative moves backwards),
    /// saturating at `0000-01` and `9999-12`.
    pub fn add_months(&self, months: i32) -> Self {
        let index = (self.year * 12 + self.month0() as i32)
            .saturating_add(months)
            .clamp(0, MAX_YEAR * 12 + 11);
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// Signed number of calendar months from `self` to `other`.
    pub fn months_until(&self, other: &Period) -> i32 {
        let year_diff = other.year - self.year;
        let month_diff = other.month as i32 - self.month as i32;
        year_diff * 12 + month_diff
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = period_re()
            .captures(s.trim())
            .ok_or_else(|| AnalyticsError::InvalidPeriod(s.to_string()))?;
        let year: i32 = caps[1]
            .parse()
            .map_err(|_| AnalyticsError::InvalidPeriod(s.to_string()))?;
        let month: u32 = caps[2]
            .parse()
            .map_err(|_| AnalyticsError::InvalidPeriod(s.to_string()))?;
        Self::new(year, month).map_err(|_| AnalyticsError::InvalidPeriod(s.to_string()))
    }
}

impl TryFrom<String> for Period {
    type Error = AnalyticsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl JsonSchema for Period {
    fn schema_name() -> String {
        "Period".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

/// Reads a human date range such as `01/01/2023 - 31/01/2023` and returns the month of
/// the later date.
pub fn period_from_date_range(text: &str) -> Option<Period> {
    br_date_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let day: u32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
        .max()
        .map(Period::from_date)
}

/// Finds the first valid `YYYY-MM` fragment inside a file name or document identifier.
pub fn period_from_identifier(identifier: &str) -> Option<Period> {
    embedded_period_re().captures_iter(identifier).find_map(|caps| {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        Period::new(year, month).ok()
    })
}

/// Canonical period derivation: a date range in `metadata` wins, then a `YYYY-MM` value in
/// `metadata`, then one in `identifier`.
pub fn derive_period(metadata: Option<&str>, identifier: Option<&str>) -> Option<Period> {
    metadata
        .and_then(|text| period_from_date_range(text).or_else(|| period_from_identifier(text)))
        .or_else(|| identifier.and_then(period_from_identifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let period: Period = "2023-01".parse().unwrap();
        assert_eq!(period.year(), 2023);
        assert_eq!(period.month(), 1);
        assert_eq!(period.to_string(), "2023-01");
    }

    #[test]
    fn test_rejects_malformed_periods() {
        assert!("2023-13".parse::<Period>().is_err());
        assert!("2023-1".parse::<Period>().is_err());
        assert!("23-01".parse::<Period>().is_err());
        assert!("2023/01".parse::<Period>().is_err());
        assert!("2023-00".parse::<Period>().is_err());
    }

    #[test]
    fn test_add_months_wraps_years() {
        let period = Period::new(2023, 11).unwrap();
        assert_eq!(period.add_months(1).to_string(), "2023-12");
        assert_eq!(period.add_months(2).to_string(), "2024-01");
        assert_eq!(period.add_months(14).to_string(), "2025-01");
        assert_eq!(period.add_months(-11).to_string(), "2022-12");
    }

    #[test]
    fn test_add_months_stays_within_four_digit_years() {
        let last = Period::new(9999, 11).unwrap();
        assert_eq!(last.add_months(5).to_string(), "9999-12");
        assert_eq!(last.add_months(i32::MAX).to_string(), "9999-12");

        let first = Period::new(0, 2).unwrap();
        assert_eq!(first.add_months(-3).to_string(), "0000-01");
        assert_eq!(first.add_months(i32::MIN).to_string(), "0000-01");

        let shifted = last.add_months(1);
        assert_eq!(shifted.to_string().parse::<Period>().unwrap(), shifted);
    }

    #[test]
    fn test_months_until() {
        let start = Period::new(2022, 11).unwrap();
        let end = Period::new(2024, 2).unwrap();
        assert_eq!(start.months_until(&end), 15);
        assert_eq!(end.months_until(&start), -15);
    }

    #[test]
    fn test_chronological_ordering() {
        let mut periods = vec![
            Period::new(2024, 1).unwrap(),
            Period::new(2023, 12).unwrap(),
            Period::new(2023, 2).unwrap(),
        ];
        periods.sort();
        let rendered: Vec<String> = periods.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["2023-02", "2023-12", "2024-01"]);
    }

    #[test]
    fn test_serde_as_string() {
        let period = Period::new(2023, 7).unwrap();
        let json = serde_json::to_string(&period).unwrap();
        assert_eq!(json, "\"2023-07\"");
        let back: Period = serde_json::from_str(&json).unwrap();
        assert_eq!(back, period);
        assert!(serde_json::from_str::<Period>("\"2023-7\"").is_err());
    }

    #[test]
    fn test_period_from_date_range_takes_later_date() {
        let period = period_from_date_range("01/12/2022 - 31/01/2023").unwrap();
        assert_eq!(period.to_string(), "2023-01");

        let reversed = period_from_date_range("31/03/2023 - 01/02/2023").unwrap();
        assert_eq!(reversed.to_string(), "2023-03");
    }

    #[test]
    fn test_derive_period_falls_back_to_identifier() {
        let period = derive_period(Some("sem data"), Some("balancete_2023-05.json")).unwrap();
        assert_eq!(period.to_string(), "2023-05");

        assert!(derive_period(None, Some("balancete_2023-15_2023-06.json"))
            .map(|p| p.to_string() == "2023-06")
            .unwrap_or(false));
        let tagged = derive_period(Some("2023-08"), Some("balancete_2023-05.json")).unwrap();
        assert_eq!(tagged.to_string(), "2023-08");
        assert!(derive_period(None, None).is_none());
    }
}
