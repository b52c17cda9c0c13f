use std::fmt;

use serde::{Deserialize, Serialize};

/// Amounts are integer cents; 1 usd = 100 cents.
pub type Cents = i64;

/// Currency an account balance is held in. Only US dollars are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "usd",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "usd" => Some(Currency::Usd),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format cents as a decimal string, e.g. 15050 -> "150.50".
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a positive decimal amount into cents.
/// Accepts "50", "50.5" and "50.05"; rejects signs, more than two decimals and zero.
pub fn parse_amount(input: &str) -> Result<Cents, AmountError> {
    let input = input.trim();
    if input.is_empty() || input.starts_with('-') || input.starts_with('+') {
        return Err(AmountError::InvalidFormat(input.to_string()));
    }

    let (units, fraction) = input.split_once('.').unwrap_or((input, ""));
    if units.is_empty() && fraction.is_empty() {
        return Err(AmountError::InvalidFormat(input.to_string()));
    }
    if fraction.len() > 2 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(AmountError::InvalidFormat(input.to_string()));
    }

    let units: i64 = if units.is_empty() {
        0
    } else {
        units
            .parse()
            .map_err(|_| AmountError::InvalidFormat(input.to_string()))?
    };
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().unwrap_or(0) * 10,
        _ => fraction.parse().unwrap_or(0),
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or_else(|| AmountError::InvalidFormat(input.to_string()))?;
    ensure_positive(cents)
}

/// Reject zero and negative amounts. Every balance-affecting operation takes a
/// magnitude; the direction comes from the operation kind.
pub fn ensure_positive(amount: Cents) -> Result<Cents, AmountError> {
    if amount <= 0 {
        return Err(AmountError::NotPositive(amount));
    }
    Ok(amount)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    InvalidFormat(String),
    NotPositive(Cents),
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::InvalidFormat(input) => write!(f, "invalid amount '{}'", input),
            AmountError::NotPositive(amount) => {
                write!(f, "amount must be positive, got {}", format_cents(*amount))
            }
        }
    }
}

impl std::error::Error for AmountError {}
