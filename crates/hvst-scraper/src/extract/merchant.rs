use hvst_core::{HarvestTarget, MerchantRecord};
use url::Url;

use super::text;
use super::RawElement;

const MAX_TAG_LEN: usize = 40;

/// A merchant card from a category listing.
///
/// Needs at least two lines: the first is the name, the rest carry rating,
/// cuisine, distance, delivery time and fee in any order, usually separated
/// by `•`.
#[must_use]
pub fn parse_merchant(
    raw: &RawElement,
    base_url: &Url,
    target: &HarvestTarget,
) -> Option<MerchantRecord> {
    let lines = text::lines(&raw.text);
    if lines.len() < 2 {
        return None;
    }
    let name = lines[0].to_string();
    if name.chars().count() < 2 || text::is_non_record_label(&name) {
        return None;
    }

    let rest = lines[1..].join("\n");
    let details = text::segments(&rest);
    let rating = details.iter().find_map(|s| text::parse_rating(s));
    let detail_text = details.join("\n");

    let mut tags: Vec<String> = details
        .iter()
        .filter(|s| is_tag(s))
        .take(1)
        .map(|s| (*s).to_string())
        .collect();
    if text::is_unavailable(&detail_text) {
        tags.push("fechado".to_string());
    }

    Some(MerchantRecord {
        name,
        category: target.display_name.clone(),
        category_id: target.parent_id,
        city: target.city.clone(),
        rating,
        delivery_time: text::delivery_time(&detail_text),
        delivery_fee: text::delivery_fee(&details),
        distance: text::distance(&detail_text),
        url: raw
            .href
            .as_deref()
            .and_then(|href| text::absolute_url(base_url, href)),
        logo_url: raw
            .image
            .as_deref()
            .and_then(|src| text::absolute_url(base_url, src)),
        address: None,
        phone: None,
        opening_hours: None,
        minimum_order: None,
        payment_methods: Vec::new(),
        tags,
    })
}

/// A cuisine-like segment: short, no digits, not a fee or status word.
fn is_tag(segment: &str) -> bool {
    let lower = segment.to_lowercase();
    segment.chars().count() <= MAX_TAG_LEN
        && !text::has_digit(segment)
        && !segment.contains("R$")
        && !lower.contains("grátis")
        && !lower.contains("gratis")
        && !text::is_unavailable(segment)
        && !text::is_non_record_label(segment)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use hvst_core::TargetKind;
    use rust_decimal::Decimal;

    use super::*;

    fn target() -> HarvestTarget {
        HarvestTarget::new(
            TargetKind::RestaurantList,
            "https://www.ifood.com.br/delivery/birigui-sp/pizza",
            "Pizza",
            "Birigui",
        )
        .with_parent(3)
    }

    fn base() -> Url {
        Url::parse("https://www.ifood.com.br").unwrap()
    }

    #[test]
    fn full_card() {
        let raw = RawElement {
            text: "Pizzaria Bella\n4,7 • Pizza • 2,5 km\n30-40 min • R$ 6,99".to_string(),
            href: Some("/delivery/birigui-sp/pizzaria-bella/abc".to_string()),
            image: Some("https://static.ifood.com.br/bella.png".to_string()),
            section: None,
        };
        let m = parse_merchant(&raw, &base(), &target()).unwrap();
        assert_eq!(m.name, "Pizzaria Bella");
        assert_eq!(m.category, "Pizza");
        assert_eq!(m.category_id, Some(3));
        assert_eq!(m.rating, Some(Decimal::from_str("4.7").unwrap()));
        assert_eq!(m.distance.as_deref(), Some("2,5 km"));
        assert_eq!(m.delivery_time.as_deref(), Some("30-40 min"));
        assert_eq!(m.delivery_fee.as_deref(), Some("R$ 6,99"));
        assert_eq!(m.tags, vec!["Pizza"]);
        assert_eq!(
            m.url.as_deref(),
            Some("https://www.ifood.com.br/delivery/birigui-sp/pizzaria-bella/abc")
        );
    }

    #[test]
    fn free_delivery_and_no_rating() {
        let raw = RawElement::from_text("Sushi Yama\nNovo\nJaponesa • 50-60 min • Grátis");
        let m = parse_merchant(&raw, &base(), &target()).unwrap();
        assert_eq!(m.rating, None);
        assert_eq!(m.delivery_fee.as_deref(), Some("Grátis"));
        assert_eq!(m.tags, vec!["Novo"]);
    }

    #[test]
    fn single_line_card_is_skipped() {
        assert!(parse_merchant(&RawElement::from_text("Pizzaria"), &base(), &target()).is_none());
    }

    #[test]
    fn closed_merchant_is_tagged() {
        let raw = RawElement::from_text("Lanchonete Z\nLanches • Fechado");
        let m = parse_merchant(&raw, &base(), &target()).unwrap();
        assert_eq!(m.tags, vec!["Lanches", "fechado"]);
    }
}
