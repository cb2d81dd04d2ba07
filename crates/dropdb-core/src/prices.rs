//! Numeric parsing of scraped price strings.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*").expect("valid regex"));

/// Parses a currency-formatted amount such as `"$ 12.990"` or `"PEN 49,90"`.
///
/// A final separator followed by exactly three digits is a thousands
/// separator; followed by any other digit count it is the decimal point.
/// All other separators are grouping and are dropped.
#[must_use]
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let number = NUMBER_RE.find(raw)?.as_str().trim_end_matches(['.', ',']);
    let last_sep = number.rfind(['.', ',']);
    let normalized = match last_sep {
        Some(idx) if number.len() - idx - 1 != 3 => {
            let (int_part, frac_part) = number.split_at(idx);
            let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
            format!("{int_digits}.{}", &frac_part[1..])
        }
        _ => number.chars().filter(char::is_ascii_digit).collect(),
    };
    Decimal::from_str(&normalized).ok()
}
