use hvst_core::{ItemRecord, DEFAULT_ITEM_CATEGORY};
use url::Url;

use super::text;
use super::RawElement;

const INGREDIENT_MARKERS: &[&str] = &["ingredientes:", "ingrediente:", "feito com:"];
const ALLERGEN_MARKERS: &[&str] = &["contém:", "alérgenos:"];

/// A menu card. Skipped without a name of at least 3 characters or without
/// any price.
#[must_use]
pub fn parse_item(raw: &RawElement, base_url: &Url, merchant_id: i64) -> Option<ItemRecord> {
    let lines = text::lines(&raw.text);
    let name = (*lines.first()?).to_string();
    if name.chars().count() < 3 || text::is_non_record_label(&name) || name.contains("R$") {
        return None;
    }

    let (price, original_price) = text::price_pair(&raw.text)?;
    let description = lines
        .iter()
        .skip(1)
        .find(|line| text::is_description(line))
        .map(|line| (*line).to_string());

    Some(ItemRecord {
        merchant_id,
        name,
        description,
        category: raw
            .section
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ITEM_CATEGORY)
            .to_string(),
        price,
        original_price,
        image_url: raw
            .image
            .as_deref()
            .and_then(|src| text::absolute_url(base_url, src)),
        is_available: !text::is_unavailable(&raw.text),
        preparation_time: text::minutes(&raw.text),
        serves: text::serves(&raw.text),
        calories: text::calories(&raw.text),
        ingredients: text::list_after(&raw.text, INGREDIENT_MARKERS),
        allergens: text::list_after(&raw.text, ALLERGEN_MARKERS),
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;

    fn base() -> Url {
        Url::parse("https://www.ifood.com.br").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn promotional_card() {
        let raw = RawElement {
            text: "X-Bacon Duplo\nPão brioche, dois blends de 150g e bacon crocante\n\
                   Serve 1 pessoa • 20-30 min\nR$ 25,00\nR$ 19,90"
                .to_string(),
            href: None,
            image: Some("//static.ifood.com.br/xbacon.jpg".to_string()),
            section: Some("Lanches".to_string()),
        };
        let item = parse_item(&raw, &base(), 42).unwrap();
        assert_eq!(item.merchant_id, 42);
        assert_eq!(item.name, "X-Bacon Duplo");
        assert_eq!(item.price, dec("19.90"));
        assert_eq!(item.original_price, Some(dec("25.00")));
        assert_eq!(
            item.description.as_deref(),
            Some("Pão brioche, dois blends de 150g e bacon crocante")
        );
        assert_eq!(item.category, "Lanches");
        assert_eq!(item.serves, Some(1));
        assert_eq!(item.preparation_time.as_deref(), Some("20-30 min"));
        assert_eq!(
            item.image_url.as_deref(),
            Some("https://static.ifood.com.br/xbacon.jpg")
        );
        assert!(item.is_available);
    }

    #[test]
    fn single_price_and_default_category() {
        let item = parse_item(&RawElement::from_text("Açaí 500ml\nR$ 19,90"), &base(), 1).unwrap();
        assert_eq!(item.price, dec("19.90"));
        assert_eq!(item.original_price, None);
        assert_eq!(item.category, DEFAULT_ITEM_CATEGORY);
    }

    #[test]
    fn sold_out_item_is_unavailable() {
        let item =
            parse_item(&RawElement::from_text("Coxinha\nR$ 7,00\nEsgotado"), &base(), 1).unwrap();
        assert!(!item.is_available);
    }

    #[test]
    fn details_and_lists() {
        let raw = RawElement::from_text(
            "Bolo de cenoura\nFatia generosa com cobertura de chocolate\n\
             380 kcal\nIngredientes: cenoura, ovos e farinha\nContém: glúten, ovos\nR$ 12,00",
        );
        let item = parse_item(&raw, &base(), 1).unwrap();
        assert_eq!(item.calories, Some(380));
        assert_eq!(item.ingredients, vec!["cenoura", "ovos", "farinha"]);
        assert_eq!(item.allergens, vec!["glúten", "ovos"]);
    }

    #[test]
    fn cards_without_price_or_name_are_skipped() {
        assert!(parse_item(&RawElement::from_text("Água sem gás"), &base(), 1).is_none());
        assert!(parse_item(&RawElement::from_text("Cardápio\nR$ 10,00"), &base(), 1).is_none());
        assert!(parse_item(&RawElement::from_text("Xi\nR$ 10,00"), &base(), 1).is_none());
        assert!(parse_item(&RawElement::default(), &base(), 1).is_none());
    }
}
