//! Turns one live element into a typed record.
//!
//! The element is read once into a [`RawElement`]; parsing is synchronous and
//! tolerant. A card that does not look like a record is skipped (`Ok(None)`),
//! only page failures are errors.

mod category;
mod item;
mod merchant;
mod text;

use hvst_core::{ExtractedRecord, HarvestTarget, TargetKind};
use tracing::debug;
use url::Url;

use crate::error::HarvestError;
use crate::page::{ElementHandle, PageDriver};

pub use category::parse_category;
pub use item::parse_item;
pub use merchant::parse_merchant;

/// What the extractor reads from a card before parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawElement {
    pub text: String,
    /// Own `href`, or the first descendant link's.
    pub href: Option<String>,
    /// First descendant image's `src`.
    pub image: Option<String>,
    /// Menu section the card sits under, when the page tags it.
    pub section: Option<String>,
}

impl RawElement {
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordExtractor {
    base_url: Url,
}

impl RecordExtractor {
    /// # Errors
    ///
    /// Returns [`HarvestError::DataExtraction`] when `base_url` is not an
    /// absolute URL.
    pub fn new(base_url: &str) -> Result<Self, HarvestError> {
        let base_url = Url::parse(base_url).map_err(|e| HarvestError::DataExtraction {
            target: base_url.to_string(),
            reason: format!("invalid base url: {e}"),
        })?;
        Ok(Self { base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Reads text, link, image and section of one card.
    ///
    /// # Errors
    ///
    /// Propagates page errors. Missing attributes are `None`, not errors.
    pub async fn read(
        &self,
        page: &dyn PageDriver,
        element: &ElementHandle,
    ) -> Result<RawElement, HarvestError> {
        let text = page.read_text(element).await?;
        let href = match page.read_attribute(element, "href").await? {
            Some(href) => Some(href),
            None => page.child_attribute(element, "a[href]", "href").await?,
        };
        let image = page.child_attribute(element, "img", "src").await?;
        let section = page.read_attribute(element, "data-section").await?;
        Ok(RawElement {
            text,
            href,
            image,
            section,
        })
    }

    /// Reads and parses one card for `target`.
    ///
    /// # Errors
    ///
    /// Page errors propagate. A `product_list` target without a merchant id
    /// is a [`HarvestError::DataExtraction`].
    pub async fn extract(
        &self,
        page: &dyn PageDriver,
        element: &ElementHandle,
        target: &HarvestTarget,
    ) -> Result<Option<ExtractedRecord>, HarvestError> {
        let raw = self.read(page, element).await?;
        let record = self.parse(&raw, target)?;
        if record.is_none() {
            debug!(target = %target.display_name, text = %preview(&raw.text), "card skipped");
        }
        Ok(record)
    }

    /// # Errors
    ///
    /// See [`RecordExtractor::extract`].
    pub fn parse(
        &self,
        raw: &RawElement,
        target: &HarvestTarget,
    ) -> Result<Option<ExtractedRecord>, HarvestError> {
        Ok(match target.kind {
            TargetKind::Category => {
                parse_category(raw, &self.base_url, &target.city).map(ExtractedRecord::Category)
            }
            TargetKind::RestaurantList => {
                parse_merchant(raw, &self.base_url, target).map(ExtractedRecord::Merchant)
            }
            TargetKind::ProductList => {
                let merchant_id = target.parent_id.ok_or_else(|| HarvestError::DataExtraction {
                    target: target.display_name.clone(),
                    reason: "item list has no merchant id".to_string(),
                })?;
                parse_item(raw, &self.base_url, merchant_id).map(ExtractedRecord::Item)
            }
        })
    }
}

fn preview(text: &str) -> String {
    text.chars().take(60).collect::<String>().replace('\n', " | ")
}
