//! Formatting helpers shared by the README, dashboard, and CLI.

use chrono::NaiveDate;

use crate::metrics::exact_rate;

/// Format a count with thousands separators (e.g. "421,223").
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a percentage with one decimal place (e.g. "85.5%").
pub fn format_rate(rate: f64) -> String {
    format!("{:.1}%", rate)
}

/// Format the merge rate of `merged` out of `total` with one decimal place.
///
/// Rounds the exact ratio, not the two-decimal stored rate.
pub fn format_rate_of(merged: u64, total: u64) -> String {
    format_rate(exact_rate(merged, total))
}

/// Format a percentage for CSS widths, without the sign.
pub fn format_width(rate: f64) -> String {
    format!("{:.1}", rate.clamp(0.0, 100.0))
}

/// Long date used for "last updated" labels (e.g. "June 01, 2025").
pub fn format_date_long(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

/// Escape text for inclusion in HTML element content or attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
