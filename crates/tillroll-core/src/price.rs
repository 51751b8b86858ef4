//! Price string parsing
//!
//! Receipt prices arrive in several vendor formats: `16.99`, `16.99 GP`, `2.00-`,
//! `2.00-GP`, `$16.99`, `(3.00)`. A trailing minus marks a discount regardless of
//! currency symbol. Parsing never fails: OCR noise degrades to a zero amount.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::models::ParsedPrice;

fn price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?P<open>\()?\s*(?P<lead>-)?\s*[$€£]?\s*(?P<lead2>-)?\s*",
            r"(?P<num>\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?|\.\d+)",
            r"\s*(?P<close>\))?\s*(?P<trail>-)?",
        ))
        .expect("invalid price regex")
    })
}

fn price_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^\(?-?\s*[$€£]?\s*-?(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2}",
            r"\)?\s*-?\s*[A-Za-z]{0,3}$",
        ))
        .expect("invalid price line regex")
    })
}

fn inline_price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?P<name>.*?[A-Za-z].*?)\s+",
            r"(?P<price>-?[$€£]?(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2}\s*-?\s*[A-Za-z]{0,2})$",
        ))
        .expect("invalid inline price regex")
    })
}

/// Parse a price string into a signed amount with its original format
pub fn parse_price(input: &str) -> ParsedPrice {
    let original_format = input.trim().to_string();

    let Some(caps) = price_re().captures(&original_format) else {
        return zero(original_format);
    };

    let mantissa = caps["num"].replace(',', "");
    let amount = match Decimal::from_str(&mantissa) {
        Ok(amount) => amount,
        Err(_) => return zero(original_format),
    };

    let parenthesized = caps.name("open").is_some() && caps.name("close").is_some();
    let is_negative = caps.name("trail").is_some()
        || caps.name("lead").is_some()
        || caps.name("lead2").is_some()
        || parenthesized;

    ParsedPrice {
        amount,
        // "-0.00" is still zero
        is_negative: is_negative && !amount.is_zero(),
        original_format,
    }
}

fn zero(original_format: String) -> ParsedPrice {
    ParsedPrice {
        amount: Decimal::ZERO,
        is_negative: false,
        original_format,
    }
}

/// Signed amount of a price string
pub fn signed_amount(input: &str) -> Decimal {
    parse_price(input).signed()
}

/// Whether a whole line is nothing but a price (two decimal places, optional flag suffix)
pub fn is_price_line(line: &str) -> bool {
    price_line_re().is_match(line.trim())
}

/// Split `NAME 3.49` into the name and its trailing price
pub fn split_inline_price(line: &str) -> Option<(String, String)> {
    let caps = inline_price_re().captures(line.trim())?;
    let name = caps["name"].trim().to_string();
    let price = caps["price"].trim().to_string();
    Some((name, price))
}
