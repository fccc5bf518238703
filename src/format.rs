use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

const DATE_DISPLAY: &str = "%b %d, %Y";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Formats signed minor units as an en-US currency string, e.g. `-$1,234.50`.
pub fn format_amount_cents(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let whole = group_thousands(abs / 100);
    let frac = abs % 100;
    format!("{sign}{}{whole}.{frac:02}", currency_prefix(currency))
}

fn currency_prefix(currency: &str) -> String {
    let code = currency.trim().to_ascii_uppercase();
    match code.as_str() {
        "" | "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        "JPY" => "¥".to_string(),
        "INR" => "₹".to_string(),
        "CAD" => "CA$".to_string(),
        "AUD" => "A$".to_string(),
        _ => format!("{code}\u{a0}"),
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Parses the date shapes the upstream API is known to emit. Values without an offset are
/// read as UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.and_utc().fixed_offset());
        }
    }
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().fixed_offset());
        }
    }
    None
}

/// Milliseconds since the epoch, used for date ordering.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    parse_datetime(value).map(|dt| dt.timestamp_millis())
}

/// Human-readable date; unparsable input falls back to its first 10 characters.
pub fn format_date(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    match parse_datetime(value) {
        Some(dt) => dt.naive_local().date().format(DATE_DISPLAY).to_string(),
        None => value.chars().take(10).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_format_with_grouping_and_sign() {
        assert_eq!(format_amount_cents(12345, "USD"), "$123.45");
        assert_eq!(format_amount_cents(-100, "USD"), "-$1.00");
        assert_eq!(format_amount_cents(0, "USD"), "$0.00");
        assert_eq!(format_amount_cents(123_456_789, "usd"), "$1,234,567.89");
        assert_eq!(format_amount_cents(5, ""), "$0.05");
        assert_eq!(format_amount_cents(250, "EUR"), "€2.50");
        assert_eq!(format_amount_cents(-250, "XYZ"), "-XYZ\u{a0}2.50");
    }

    #[test]
    fn dates_format_without_timezone_drift() {
        assert_eq!(format_date("2023-01-02"), "Jan 02, 2023");
        assert_eq!(format_date("2023-01-02 23:59:59"), "Jan 02, 2023");
        assert_eq!(format_date("2023-01-02T23:30:00-08:00"), "Jan 02, 2023");
        assert_eq!(format_date("12/31/2022"), "Dec 31, 2022");
    }

    #[test]
    fn unparsable_dates_fall_back_to_prefix() {
        assert_eq!(format_date("NOT_A_DATE_XXXXX"), "NOT_A_DATE");
        assert_eq!(format_date("short"), "short");
        assert_eq!(format_date(""), "");
    }

    #[test]
    fn timestamps_order_dates() {
        let a = parse_timestamp("2022-12-31").unwrap();
        let b = parse_timestamp("2023-01-01").unwrap();
        let c = parse_timestamp("2023-01-01T00:00:01Z").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert_eq!(parse_timestamp("garbage"), None);
        assert_eq!(parse_timestamp("  "), None);
    }
}
