//! Free-text date parsing and display formatting.

use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

static NUMERIC_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[-/](\d{1,2})[-/](\d{4})\b").unwrap());
static NAMED_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\s+([a-z]+)(?:\s+(\d{4}))?\b").unwrap());

/// Example shown whenever a date does not parse.
pub const DATE_FORMAT_HINT: &str = "DD-MM-YYYY";

/// Parse a check-in/check-out answer.
///
/// Accepts `DD-MM-YYYY`, `DD/MM/YYYY`, relative words (today, tomorrow, the day
/// after tomorrow, in English or Indonesian) and `DD <month>` with an optional
/// year, defaulting to the year of `today`.
pub fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = text.trim().to_lowercase();

    if lower.contains("lusa") || lower.contains("day after") {
        return today.checked_add_days(Days::new(2));
    }
    if lower.contains("besok") || lower.contains("tomorrow") {
        return today.checked_add_days(Days::new(1));
    }
    if lower.contains("hari ini") || lower.contains("today") {
        return Some(today);
    }

    if let Some(caps) = NUMERIC_DATE.captures(&lower) {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let caps = NAMED_MONTH.captures(&lower)?;
    let day = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let year = match caps.get(3) {
        Some(y) => y.as_str().parse().ok()?,
        None => today.year(),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `16 Nov 2025`.
pub fn display_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

/// Whole-rupiah price with dot thousands separators, e.g. `Rp 1.500.000`.
pub fn format_price(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-Rp {grouped}")
    } else {
        format!("Rp {grouped}")
    }
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name {
        "januari" | "january" | "jan" => 1,
        "februari" | "february" | "feb" => 2,
        "maret" | "march" | "mar" => 3,
        "april" | "apr" => 4,
        "mei" | "may" => 5,
        "juni" | "june" | "jun" => 6,
        "juli" | "july" | "jul" => 7,
        "agustus" | "august" | "aug" | "agu" => 8,
        "september" | "sept" | "sep" => 9,
        "oktober" | "october" | "oct" | "okt" => 10,
        "november" | "nov" => 11,
        "desember" | "december" | "dec" | "des" => 12,
        _ => return None,
    };
    Some(month)
}
