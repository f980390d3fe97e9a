use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identity::IdentityKey;

/// Item category used when the page does not expose a section heading.
pub const DEFAULT_ITEM_CATEGORY: &str = "Geral";

/// A category tile from the marketplace's category index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub name: String,
    /// Last path segment of `url`.
    pub slug: String,
    /// Absolute URL of the category listing.
    pub url: String,
    pub icon_url: Option<String>,
    pub city: String,
}

/// A merchant card from a category listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantRecord {
    pub name: String,
    /// Display name of the category the merchant was listed under.
    pub category: String,
    pub category_id: Option<i64>,
    pub city: String,
    /// 0.0 to 5.0 inclusive.
    pub rating: Option<Decimal>,
    /// Free text as shown, e.g. `"30-40 min"`.
    pub delivery_time: Option<String>,
    /// `"Grátis"` or a currency string such as `"R$ 5,99"`.
    pub delivery_fee: Option<String>,
    pub distance: Option<String>,
    pub url: Option<String>,
    pub logo_url: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub opening_hours: Option<String>,
    pub minimum_order: Option<String>,
    pub payment_methods: Vec<String>,
    pub tags: Vec<String>,
}

/// A menu item from a merchant page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub merchant_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: Decimal,
    /// Pre-discount price, present only when the card shows two prices.
    pub original_price: Option<Decimal>,
    pub image_url: Option<String>,
    pub is_available: bool,
    pub preparation_time: Option<String>,
    pub serves: Option<i32>,
    pub calories: Option<i32>,
    pub ingredients: Vec<String>,
    pub allergens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedRecord {
    Category(CategoryRecord),
    Merchant(MerchantRecord),
    Item(ItemRecord),
}

impl ExtractedRecord {
    /// Identity of the entity this record describes.
    #[must_use]
    pub fn identity_key(&self) -> IdentityKey {
        match self {
            ExtractedRecord::Category(c) => IdentityKey::category(&c.name, &c.city),
            ExtractedRecord::Merchant(m) => IdentityKey::merchant(&m.name, &m.category, &m.city),
            ExtractedRecord::Item(i) => IdentityKey::item(i.merchant_id, &i.name, &i.category),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ExtractedRecord::Category(c) => &c.name,
            ExtractedRecord::Merchant(m) => &m.name,
            ExtractedRecord::Item(i) => &i.name,
        }
    }

    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            ExtractedRecord::Category(_) => "category",
            ExtractedRecord::Merchant(_) => "merchant",
            ExtractedRecord::Item(_) => "item",
        }
    }
}

/// Appended when a persisted item is observed at a different price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub item_id: i64,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn make_item(merchant_id: i64, name: &str, price: &str) -> ItemRecord {
        ItemRecord {
            merchant_id,
            name: name.to_string(),
            description: None,
            category: DEFAULT_ITEM_CATEGORY.to_string(),
            price: Decimal::from_str(price).unwrap(),
            original_price: None,
            image_url: None,
            is_available: true,
            preparation_time: None,
            serves: None,
            calories: None,
            ingredients: Vec::new(),
            allergens: Vec::new(),
        }
    }

    #[test]
    fn item_identity_ignores_price() {
        let a = ExtractedRecord::Item(make_item(7, "Açaí 500ml", "19.90"));
        let b = ExtractedRecord::Item(make_item(7, "açaí 500ML", "25.00"));
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn record_serializes_with_kind_tag() {
        let record = ExtractedRecord::Category(CategoryRecord {
            name: "Pizza".to_string(),
            slug: "pizza".to_string(),
            url: "https://www.ifood.com.br/delivery/birigui-sp/pizza".to_string(),
            icon_url: None,
            city: "Birigui".to_string(),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "category");
        assert_eq!(json["slug"], "pizza");
        assert_eq!(record.kind_str(), "category");
        assert_eq!(record.name(), "Pizza");
    }
}
