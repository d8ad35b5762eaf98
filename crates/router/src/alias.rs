//! Static alias table: company and index display names → instrument codes.
//! Stock aliases resolve to bare 6-digit codes; index aliases resolve to
//! full market-qualified secids that pass through secid conversion unchanged.

use once_cell::sync::Lazy;

/// Company-name aliases. Longer names precede their short forms so the
/// longest-match scan stays unambiguous.
pub static STOCK_ALIASES: &[(&str, &str)] = &[
    ("贵州茅台", "600519"),
    ("茅台", "600519"),
    ("宁德时代", "300750"),
    ("比亚迪", "002594"),
    ("五粮液", "000858"),
    ("招商银行", "600036"),
    ("中国平安", "601318"),
    ("隆基绿能", "601012"),
    ("药明康德", "603259"),
    ("美的集团", "000333"),
    ("格力电器", "000651"),
];

/// Index aliases carry the full `market.code` secid so SH/SZ inference by
/// code prefix never misfires for 000xxx index codes.
pub static INDEX_ALIASES: &[(&str, &str)] = &[
    ("上证指数", "1.000001"),
    ("上证50", "1.000016"),
    ("上证", "1.000001"),
    ("深证成指", "0.399001"),
    ("深成指", "0.399001"),
    ("创业板指", "0.399006"),
    ("创业板", "0.399006"),
    ("沪深300", "1.000300"),
    ("科创50", "1.000688"),
    ("恒生指数", "100.HSI"),
    ("恒指", "100.HSI"),
    ("纳斯达克", "100.NDX"),
    ("道琼斯", "100.DJIA"),
    ("标普500", "100.SPX"),
];

static ALIASES_BY_LENGTH: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    let mut all: Vec<(&'static str, &'static str)> = STOCK_ALIASES
        .iter()
        .chain(INDEX_ALIASES.iter())
        .copied()
        .collect();
    // Stable sort keeps the table's own precedence among equal lengths.
    all.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
    all
});

/// Scan `text` for known names, longest alias first, returning codes in
/// text order so the first-mentioned instrument stays primary. Each matched
/// span is masked (same byte length, so later positions stay comparable)
/// and a short alias never re-matches inside a longer one (上证50 must not
/// also produce 上证指数's code).
pub fn resolve_names(text: &str) -> Vec<String> {
    let mut remaining = text.to_string();
    let mut found: Vec<(usize, &'static str)> = Vec::new();
    for (name, code) in ALIASES_BY_LENGTH.iter() {
        while let Some(pos) = remaining.find(name) {
            found.push((pos, *code));
            remaining.replace_range(pos..pos + name.len(), &" ".repeat(name.len()));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, code)| code.to_string()).collect()
}

pub fn alias_count() -> usize {
    STOCK_ALIASES.len() + INDEX_ALIASES.len()
}
