//! Line-level heuristics over rendered card text.
//!
//! Every function is total: unparseable input yields `None` or an empty
//! list, never an error.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use url::Url;

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"R\$\s*(\d{1,3}(?:\.\d{3})+(?:,\d{1,2})?|\d+(?:,\d{1,2})?)").expect("valid price regex")
});
static MINUTES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)(?:\s*-\s*(\d+))?\s*min\b").expect("valid minutes regex")
});
static HOURS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*h\s*(\d+)\s*min\b").expect("valid hours regex")
});
static DISTANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*km\b").expect("valid distance regex")
});
static SERVES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)serve[s]?\s*(?:até\s*)?(\d+)\s*pessoas?").expect("valid serves regex")
});
static KCAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*kcal").expect("valid kcal regex"));
static LIST_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:[,;]|\be\b)\s*").expect("valid list regex"));

const UNAVAILABLE: &[&str] = &[
    "indisponível",
    "esgotado",
    "sold out",
    "unavailable",
    "fora de estoque",
    "fechado",
    "closed",
];

/// Card labels that are never a real name.
const NON_RECORD_LABELS: &[&str] = &[
    "menu",
    "categoria",
    "categorias",
    "seção",
    "cardápio",
    "opções",
    "ver mais",
];

/// Trimmed, non-empty lines.
pub(crate) fn lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Lines further split on the `•` separator cards use between facts.
pub(crate) fn segments(text: &str) -> Vec<&str> {
    lines(text)
        .into_iter()
        .flat_map(|line| line.split('•'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses a Brazilian decimal such as `1.234,56`, `19,90` or `25`.
pub(crate) fn parse_brl(raw: &str) -> Option<Decimal> {
    let normalized = raw.trim().replace('.', "").replace(',', ".");
    Decimal::from_str(&normalized).ok()
}

/// Every `R$` amount in `text`, in order.
pub(crate) fn prices(text: &str) -> Vec<Decimal> {
    PRICE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).and_then(|m| parse_brl(m.as_str())))
        .collect()
}

/// Current and original price.
///
/// One amount is the current price. With two or more, the first two are
/// used: the lower is current and the higher is the original, which is
/// `None` when both are equal.
pub(crate) fn price_pair(text: &str) -> Option<(Decimal, Option<Decimal>)> {
    match prices(text).as_slice() {
        [] => None,
        [only] => Some((*only, None)),
        [a, b, ..] => {
            let (low, high) = if a <= b { (*a, *b) } else { (*b, *a) };
            Some((low, (high > low).then_some(high)))
        }
    }
}

/// A short standalone number in `[0, 5]`, e.g. `4,7`.
pub(crate) fn parse_rating(segment: &str) -> Option<Decimal> {
    let segment = segment.trim().trim_start_matches('★').trim();
    if segment.is_empty() || segment.chars().count() > 4 {
        return None;
    }
    let value = Decimal::from_str(&segment.replace(',', ".")).ok()?;
    (Decimal::ZERO..=Decimal::from(5)).contains(&value).then_some(value)
}

/// `N min` or `N-M min`, normalized.
pub(crate) fn minutes(text: &str) -> Option<String> {
    let caps = MINUTES_RE.captures(text)?;
    let low = caps.get(1)?.as_str();
    Some(match caps.get(2) {
        Some(high) => format!("{low}-{} min", high.as_str()),
        None => format!("{low} min"),
    })
}

/// Delivery time: `Nh Mmin` first, then the minute forms.
pub(crate) fn delivery_time(text: &str) -> Option<String> {
    if let Some(caps) = HOURS_RE.captures(text) {
        let hours = caps.get(1)?.as_str();
        let mins = caps.get(2)?.as_str();
        return Some(format!("{hours}h {mins}min"));
    }
    minutes(text)
}

pub(crate) fn distance(text: &str) -> Option<String> {
    DISTANCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| format!("{} km", m.as_str()))
}

/// `Grátis` or the first currency amount of a segment mentioning delivery
/// or carrying a bare price.
pub(crate) fn delivery_fee(segments: &[&str]) -> Option<String> {
    for segment in segments {
        let lower = segment.to_lowercase();
        if lower.contains("grátis") || lower.contains("gratis") || lower.contains("free") {
            return Some("Grátis".to_string());
        }
    }
    segments
        .iter()
        .find_map(|s| PRICE_RE.find(s))
        .map(|m| m.as_str().to_string())
}

pub(crate) fn serves(text: &str) -> Option<i32> {
    SERVES_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub(crate) fn calories(text: &str) -> Option<i32> {
    KCAL_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Items listed after the first of `markers` (case-insensitive), up to the
/// end of that line.
pub(crate) fn list_after(text: &str, markers: &[&str]) -> Vec<String> {
    for line in lines(text) {
        let lower = line.to_lowercase();
        for marker in markers {
            if let Some(pos) = lower.find(marker) {
                // Lowercasing can change byte lengths; map back by char count.
                let chars_before = lower[..pos + marker.len()].chars().count();
                let rest: String = line.chars().skip(chars_before).collect();
                return LIST_SPLIT_RE
                    .split(rest.trim().trim_end_matches('.'))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
        }
    }
    Vec::new()
}

pub(crate) fn is_unavailable(text: &str) -> bool {
    let lower = text.to_lowercase();
    UNAVAILABLE.iter().any(|k| lower.contains(k))
}

pub(crate) fn is_non_record_label(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    NON_RECORD_LABELS.iter().any(|label| lower == *label)
}

/// A plausible free-text description line.
pub(crate) fn is_description(line: &str) -> bool {
    line.chars().count() > 20
        && !line.contains("R$")
        && line.chars().any(char::is_lowercase)
}

pub(crate) fn has_digit(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
}

/// Last non-empty path segment of `url`.
pub(crate) fn slug_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// `href` resolved against `base`; `None` for empty, `javascript:` and
/// fragment-only links.
pub(crate) fn absolute_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    base.join(href).ok().map(String::from)
}

#[cfg(test)]
#[path = "text_test.rs"]
mod tests;
