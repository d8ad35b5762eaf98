pub mod alias;
pub mod classify;
pub mod extract;

pub use alias::alias_count;
pub use classify::{classify, rule_count};

use quotebot_core::types::ParsedRequest;

/// Turn raw query text into a structured request. Total function: an
/// unmatched query comes back as `Intent::Unknown` with the raw text kept
/// for the clarification prompt.
pub fn parse(text: &str) -> ParsedRequest {
    let intent = classify(text);
    let symbols = extract::extract_symbols(text);
    let top_n = extract::extract_top_n(text);
    let timeframe = extract::extract_timeframe(text);
    let lookback = extract::extract_lookback(text, intent);
    let date = extract::extract_date(text);
    ParsedRequest {
        intent,
        symbols,
        timeframe,
        lookback,
        top_n,
        date,
        raw: text.to_string(),
    }
}
