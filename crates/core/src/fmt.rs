//! Shared number/date formatting for chat output. All helpers are pure and
//! render display-ready strings; handlers never format raw floats inline.

/// Chinese-unit amount: `123456789.0` → `"1.23亿"`, `56789.0` → `"5.68万"`.
/// Values below 1万 keep two decimals unscaled.
pub fn fmt_amount(v: f64) -> String {
    let sign = if v < 0.0 { "-" } else { "" };
    let abs = v.abs();
    if abs >= 1e8 {
        format!("{}{:.2}亿", sign, abs / 1e8)
    } else if abs >= 1e4 {
        format!("{}{:.2}万", sign, abs / 1e4)
    } else {
        format!("{}{:.2}", sign, abs)
    }
}

pub fn fmt_price(v: f64) -> String {
    format!("{:.2}", v)
}

/// Signed percentage with two decimals: `0.85` → `"+0.85%"`.
pub fn fmt_pct(v: f64) -> String {
    format!("{:+.2}%", v)
}

/// Dash an 8-digit compact date (`20260821` → `2026-08-21`); anything else
/// passes through unchanged.
pub fn fmt_date(raw: &str) -> String {
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..8])
    } else {
        raw.to_string()
    }
}

/// Month-day short form for per-bar lines: `2026-08-21` or `20260821` → `08-21`.
pub fn fmt_md(raw: &str) -> String {
    let dashed = fmt_date(raw);
    if dashed.len() >= 10 && dashed.is_char_boundary(5) && dashed.is_char_boundary(10) {
        let md = &dashed[5..10];
        if md.bytes().filter(|b| b.is_ascii_digit()).count() == 4 {
            return md.to_string();
        }
    }
    dashed
}

/// Truncate to at most `max_chars` characters, never splitting a UTF-8
/// character.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
