//! Ranked selector lists for every element the harvester looks for.
//!
//! The built-in table matches the marketplace's current markup. A YAML file
//! (`HVST_SELECTORS_PATH`) may replace any list; lists it omits keep their
//! defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;
use crate::page::Selector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorTable {
    /// Location text box on the landing page.
    pub address_input: Vec<Selector>,
    /// First location-confirmation dialog.
    pub confirm_primary: Vec<Selector>,
    /// Second confirmation (delivery address form).
    pub confirm_secondary: Vec<Selector>,
    /// Links to the category listings.
    pub category_links: Vec<Selector>,
    /// Merchant cards on a restaurant listing.
    pub merchant_cards: Vec<Selector>,
    /// Item cards on a merchant menu.
    pub item_cards: Vec<Selector>,
    /// "Load more" buttons on either listing.
    pub load_more: Vec<Selector>,
    /// Section headings used to label items on a menu.
    pub menu_sections: Vec<Selector>,
    /// URL fragments that mean the location step already happened.
    pub listing_url_markers: Vec<String>,
}

impl Default for SelectorTable {
    fn default() -> Self {
        use Selector as S;

        Self {
            address_input: vec![
                S::xpath(r#"//*[@id="__next"]/section[2]/div/form/div/input"#),
                S::css(r#"input[data-testid="address-input"]"#),
                S::css(r#"input[placeholder*="endereço" i]"#),
                S::css(r#"form input[type="text"]"#),
            ],
            confirm_primary: vec![
                S::xpath("/html/body/div[6]/div/div/div/div/div[3]/button"),
                S::text("button", "Confirmar"),
                S::text("button", "Continuar"),
                S::css(r#"[data-testid="confirm-button"]"#),
                S::css(".confirmation-button"),
            ],
            confirm_secondary: vec![
                S::xpath("/html/body/div[6]/div/div/div/div/div[2]/div[2]/form/div[4]/button"),
                S::text("button", "Salvar endereço"),
                S::text("button", "Confirmar localização"),
                S::css(r#"form button[type="submit"]"#),
            ],
            category_links: vec![
                S::xpath(
                    r#"//*[@id="__next"]/div[1]/main/div/div[2]/section/article[1]/section[1]/div/div/div[1]//div/a"#,
                ),
                S::css(r#"a[href*="/delivery/"][href*="/restaurantes"]"#),
                S::css(r#"a[href*="/restaurantes/"]"#),
                S::css(r#"[data-testid="category-card"] a"#),
            ],
            merchant_cards: vec![
                S::css(r#"[data-testid="restaurant-card"]"#),
                S::css(r#"[data-testid="restaurant"]"#),
                S::css(r#"[data-testid="store-card"]"#),
                S::css(r#"a[href*="/delivery/"]"#),
                S::css(r#"div[class*="restaurant-card"]"#),
                S::css(r#"div[class*="merchant"]"#),
                S::css(r#"[role="listitem"]"#),
                S::css("article:has(img)"),
                S::css("article"),
                S::css("li"),
            ],
            item_cards: vec![
                S::xpath(r#"//*[@id="__next"]/div[1]/main/div[1]/div/div[2]/div/div[5]/ul/li"#),
                S::css(r#"li[data-testid="dish-card"]"#),
                S::css(r#"div[data-testid="menu-item"]"#),
                S::css(r#"article[data-testid="product"]"#),
                S::css(r#"div[class*="dish-card"]"#),
                S::css(r#"li[class*="product"]"#),
                S::css(r#"div[class*="menu-item"]"#),
            ],
            load_more: vec![
                S::text("button", "Ver mais"),
                S::text("button", "Carregar mais"),
                S::text("button", "Mostrar mais"),
                S::text("button", "Mais restaurantes"),
                S::css(r#"[data-testid="load-more"]"#),
                S::css(r#"[data-testid="show-more"]"#),
                S::css(".load-more-button"),
                S::css(".show-more"),
            ],
            menu_sections: vec![
                S::css(r#"[data-testid="menu-category-title"]"#),
                S::css("main h2"),
            ],
            listing_url_markers: vec!["restaurante".to_string(), "delivery".to_string()],
        }
    }
}

impl SelectorTable {
    /// Parses a YAML override on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::SelectorTable`] on malformed YAML, unknown
    /// keys, or an empty list.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, HarvestError> {
        // Selectors are written as one-key maps (`css: ...`), not YAML tags.
        let table: SelectorTable = serde_yaml::with::singleton_map_recursive::deserialize(
            serde_yaml::Deserializer::from_str(yaml),
        )
        .map_err(|e| HarvestError::SelectorTable(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Io`] when the file cannot be read and
    /// [`HarvestError::SelectorTable`] when it does not parse.
    pub async fn load(path: Option<&Path>) -> Result<Self, HarvestError> {
        match path {
            Some(path) => {
                let yaml = tokio::fs::read_to_string(path).await?;
                let table = Self::from_yaml_str(&yaml)?;
                tracing::info!(path = %path.display(), "loaded selector overrides");
                Ok(table)
            }
            None => Ok(Self::default()),
        }
    }

    /// `true` when `url` already shows a listing page of the marketplace.
    #[must_use]
    pub fn is_listing_url(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.listing_url_markers
            .iter()
            .any(|marker| lower.contains(marker.as_str()))
    }

    fn validate(&self) -> Result<(), HarvestError> {
        let lists: [(&str, &Vec<Selector>); 8] = [
            ("address_input", &self.address_input),
            ("confirm_primary", &self.confirm_primary),
            ("confirm_secondary", &self.confirm_secondary),
            ("category_links", &self.category_links),
            ("merchant_cards", &self.merchant_cards),
            ("item_cards", &self.item_cards),
            ("load_more", &self.load_more),
            ("menu_sections", &self.menu_sections),
        ];
        if let Some((name, _)) = lists.iter().find(|(_, list)| list.is_empty()) {
            return Err(HarvestError::SelectorTable(format!("{name} must not be empty")));
        }
        Ok(())
    }
}
