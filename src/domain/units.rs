use std::fmt;

/// Token quantities moved by an operation, allowances and overdraft limits.
/// Always non-negative.
pub type Amount = u64;

/// Stored balances. Signed because an account in overdraft sits below zero,
/// and wide enough that `balance + limit` never overflows for `u64` inputs.
pub type Balance = i128;

/// Parse a whole number of token units.
/// Underscores are accepted as digit separators: "1_000" -> 1000.
pub fn parse_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let input = input.trim();
    if input.starts_with('-') {
        return Err(ParseAmountError::Negative);
    }

    let digits: String = input.chars().filter(|c| *c != '_').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseAmountError::InvalidFormat);
    }

    digits.parse().map_err(|_| ParseAmountError::OutOfRange)
}

/// Format a balance with thousands separators: -1234567 -> "-1,234,567".
pub fn format_units(value: Balance) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    InvalidFormat,
    Negative,
    OutOfRange,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::InvalidFormat => write!(f, "invalid amount format"),
            ParseAmountError::Negative => write!(f, "amount must not be negative"),
            ParseAmountError::OutOfRange => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseAmountError {}
