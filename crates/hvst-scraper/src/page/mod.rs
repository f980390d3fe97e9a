//! Narrow page-automation capability every harvesting component depends on.
//!
//! [`ChromiumPage`] drives a real Chrome over CDP. `ScriptedPage`, behind
//! the `test-util` feature, is a deterministic in-memory page for tests.

mod chromium;
#[cfg(any(test, feature = "test-util"))]
mod scripted;
pub mod stealth;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

pub use chromium::{resolve_ws_url, ChromiumLauncher, ChromiumPage};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::{PageEvent, ScriptedElement, ScriptedPage};

/// How to find elements on a page.
///
/// In YAML an entry is written as `css: "li[data-testid=dish-card]"`,
/// `xpath: "//main//li"`, or `text: { css: button, text: "Ver mais" }`,
/// read through `serde_yaml::with::singleton_map_recursive`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    Css(String),
    XPath(String),
    /// Elements matching `css` whose visible text contains `text`,
    /// case-insensitively.
    Text { css: String, text: String },
}

impl Selector {
    #[must_use]
    pub fn css(s: impl Into<String>) -> Self {
        Selector::Css(s.into())
    }

    #[must_use]
    pub fn xpath(s: impl Into<String>) -> Self {
        Selector::XPath(s.into())
    }

    #[must_use]
    pub fn text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::Text {
            css: css.into(),
            text: text.into(),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css={s}"),
            Selector::XPath(s) => write!(f, "xpath={s}"),
            Selector::Text { css, text } => write!(f, "{css}:has-text({text:?})"),
        }
    }
}

/// Opaque reference to one live element.
///
/// Only meaningful to the page that returned it, and invalid once that page
/// closes. Not comparable and never persisted.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    id: u64,
}

impl ElementHandle {
    /// For [`PageDriver`] implementations only.
    #[must_use]
    pub fn from_raw(id: u64) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn raw(&self) -> u64 {
        self.id
    }
}

/// One window scroll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    ToTop,
    ToBottom,
    /// Scroll down by this many viewport heights.
    ByViewport(f64),
    /// Scroll down by this fraction of the document height.
    ByFraction(f64),
    /// Jump to this fraction of the document height.
    ToFraction(f64),
    /// Jump to the bottom, fire synthetic `scroll`/`resize` events and
    /// force a reflow, to wake lazy loaders that missed the real scroll.
    ForceLoad,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), HarvestError>;

    async fn current_url(&self) -> Result<String, HarvestError>;

    async fn title(&self) -> Result<Option<String>, HarvestError>;

    /// Elements matching `selector` in document order, at most `limit`.
    async fn locate(
        &self,
        selector: &Selector,
        limit: Option<usize>,
    ) -> Result<Vec<ElementHandle>, HarvestError>;

    async fn count(&self, selector: &Selector) -> Result<usize, HarvestError>;

    async fn read_text(&self, element: &ElementHandle) -> Result<String, HarvestError>;

    async fn read_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, HarvestError>;

    /// Attribute `name` of the element itself when it matches `css`,
    /// otherwise of its first descendant matching `css`.
    async fn child_attribute(
        &self,
        element: &ElementHandle,
        css: &str,
        name: &str,
    ) -> Result<Option<String>, HarvestError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), HarvestError>;

    /// Replaces the value of an input element with `text`, typed.
    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), HarvestError>;

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), HarvestError>;

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), HarvestError>;

    async fn scroll(&self, action: ScrollAction) -> Result<(), HarvestError>;

    /// Stamps a `data-section` attribute, holding the heading's text, on
    /// every element between one `headings` match and the next. Returns the
    /// number of headings found.
    async fn label_sections(&self, headings: &Selector) -> Result<usize, HarvestError>;

    /// The page's rendered body text.
    async fn visible_text(&self) -> Result<String, HarvestError>;

    /// PNG bytes of the full page.
    async fn screenshot(&self) -> Result<Vec<u8>, HarvestError>;

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), HarvestError>;

    /// Viewport size in CSS pixels.
    fn viewport(&self) -> (u32, u32);

    /// Releases the page and anything it owns. Idempotent.
    async fn close(&self) -> Result<(), HarvestError>;
}

/// First element matched by `candidates`, tried in order.
///
/// Returns the index of the matching selector with the element.
///
/// # Errors
///
/// Returns [`HarvestError::ElementNotFound`] naming `what` when no candidate
/// matches; other page errors propagate.
pub async fn first_match(
    page: &dyn PageDriver,
    candidates: &[Selector],
    what: &str,
) -> Result<(usize, ElementHandle), HarvestError> {
    for (index, selector) in candidates.iter().enumerate() {
        match page.locate(selector, Some(1)).await {
            Ok(mut found) if !found.is_empty() => {
                tracing::debug!(%selector, what, "matched");
                return Ok((index, found.swap_remove(0)));
            }
            Ok(_) => {}
            Err(err) if err.is_transient() => {
                tracing::debug!(%selector, what, error = %err, "candidate failed");
            }
            Err(err) => return Err(err),
        }
    }
    Err(HarvestError::not_found(format!(
        "{what} (tried {} selectors)",
        candidates.len()
    )))
}
