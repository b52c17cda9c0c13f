use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::TransactionKind;

const DAYS_PER_YEAR: i64 = 365;

/// Unit of a look-back window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Days,
    Year,
}

impl PeriodUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodUnit::Days => "days",
            PeriodUnit::Year => "year",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "days" => Some(PeriodUnit::Days),
            "year" => Some(PeriodUnit::Year),
            _ => None,
        }
    }
}

/// A look-back window such as "30 days" or "1 year", ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPeriod {
    pub count: u32,
    pub unit: PeriodUnit,
}

impl TransactionPeriod {
    pub fn days(count: u32) -> Self {
        Self {
            count,
            unit: PeriodUnit::Days,
        }
    }

    pub fn years(count: u32) -> Self {
        Self {
            count,
            unit: PeriodUnit::Year,
        }
    }

    /// Parse `<digits><optional spaces><days|year>`, case-insensitive.
    pub fn parse(input: &str) -> Result<Self, PeriodParseError> {
        let input = input.trim();
        let digits_end = input
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| PeriodParseError(input.to_string()))?;
        if digits_end == 0 {
            return Err(PeriodParseError(input.to_string()));
        }

        let count: u32 = input[..digits_end]
            .parse()
            .map_err(|_| PeriodParseError(input.to_string()))?;
        let unit = PeriodUnit::from_str(input[digits_end..].trim_start())
            .ok_or_else(|| PeriodParseError(input.to_string()))?;

        Ok(Self { count, unit })
    }

    pub fn length_in_days(&self) -> i64 {
        let count = i64::from(self.count);
        match self.unit {
            PeriodUnit::Days => count,
            PeriodUnit::Year => count * DAYS_PER_YEAR,
        }
    }

    /// Inclusive `[start, now]` window. A period reaching past the earliest
    /// representable instant starts there, so it covers all history.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Duration::try_days(self.length_in_days())
            .and_then(|length| now.checked_sub_signed(length))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        (start, now)
    }
}

impl std::fmt::Display for TransactionPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.count, self.unit.as_str())
    }
}

impl std::str::FromStr for TransactionPeriod {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodParseError(pub String);

impl std::fmt::Display for PeriodParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid period '{}', expected e.g. '30 days' or '1 year'",
            self.0
        )
    }
}

impl std::error::Error for PeriodParseError {}

/// Optional filters for history listings. An empty filter returns everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub kind: Option<TransactionKind>,
    pub period: Option<TransactionPeriod>,
    /// Matched case-insensitively against the title of the funded project.
    pub keyword: Option<String>,
}

impl HistoryFilter {
    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_period(mut self, period: TransactionPeriod) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Keyword with surrounding whitespace removed; blank keywords filter nothing.
    pub fn keyword(&self) -> Option<&str> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_days() {
        assert_eq!(TransactionPeriod::parse("30days"), Ok(TransactionPeriod::days(30)));
        assert_eq!(TransactionPeriod::parse("7 days"), Ok(TransactionPeriod::days(7)));
        assert_eq!(TransactionPeriod::parse("14 DAYS"), Ok(TransactionPeriod::days(14)));
    }

    #[test]
    fn test_parse_year() {
        let period = TransactionPeriod::parse("2 year").unwrap();
        assert_eq!(period, TransactionPeriod::years(2));
        assert_eq!(period.length_in_days(), 730);
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for input in ["days", "30", "thirty days", "3 weeks", "1 years", "-5 days", ""] {
            assert!(TransactionPeriod::parse(input).is_err(), "{input} should fail");
        }
    }

    #[test]
    fn test_window_ends_now() {
        let now = Utc::now();
        let (start, end) = TransactionPeriod::days(10).window(now);
        assert_eq!(end, now);
        assert_eq!(now - start, Duration::days(10));
    }

    #[test]
    fn test_oversized_window_starts_at_earliest_instant() {
        let now = Utc::now();
        for input in ["100000000 days", "4000000000 year", "4294967295 days"] {
            let period = TransactionPeriod::parse(input).unwrap();
            let (start, end) = period.window(now);
            assert_eq!(start, DateTime::<Utc>::MIN_UTC, "{input}");
            assert_eq!(end, now);
        }

        // Still representable, so not clamped
        let (start, _) = TransactionPeriod::years(1000).window(now);
        assert!(start > DateTime::<Utc>::MIN_UTC);
        assert_eq!(now - start, Duration::days(365_000));
    }

    #[test]
    fn test_blank_keyword_is_ignored() {
        let filter = HistoryFilter::default().with_keyword("   ");
        assert_eq!(filter.keyword(), None);

        let filter = HistoryFilter::default().with_keyword(" solar ");
        assert_eq!(filter.keyword(), Some("solar"));
    }
}
