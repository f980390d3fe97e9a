//! Ranked element discovery.
//!
//! Each strategy is scored by how many of its first `sample_limit` matches
//! pass a cheap text check. The best-scoring strategy wins and its *whole*
//! match set is returned; the check only ranks strategies.

use tracing::{debug, info};

use crate::error::HarvestError;
use crate::page::{ElementHandle, PageDriver, Selector};
use crate::selectors::SelectorTable;

const CURRENCY_MARKER: &str = "R$";

/// Text check applied to sampled matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub min_len: usize,
    pub max_len: usize,
    /// Case-insensitive substrings; a text passes when it contains any of
    /// them. Empty means no content requirement.
    pub keywords: Vec<String>,
    pub sample_limit: usize,
}

impl Validation {
    #[must_use]
    pub fn merchants() -> Self {
        Self {
            min_len: 11,
            max_len: 2000,
            keywords: ["R$", "min", "delivery", "entrega", "avaliação", "grátis"]
                .map(String::from)
                .to_vec(),
            sample_limit: 50,
        }
    }

    #[must_use]
    pub fn items() -> Self {
        Self {
            min_len: 5,
            max_len: 1000,
            keywords: ["R$", "açaí", "combo", "ml", "kg", "unid"]
                .map(String::from)
                .to_vec(),
            sample_limit: 50,
        }
    }

    #[must_use]
    pub fn categories() -> Self {
        Self {
            min_len: 2,
            max_len: 60,
            keywords: Vec::new(),
            sample_limit: 50,
        }
    }

    #[must_use]
    pub fn accepts(&self, text: &str) -> bool {
        let text = text.trim();
        let len = text.chars().count();
        if len < self.min_len || len > self.max_len {
            return false;
        }
        if self.keywords.is_empty() {
            return true;
        }
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .any(|k| lower.contains(&k.to_lowercase()))
    }
}

#[derive(Debug, Clone)]
pub struct Discovery {
    /// `None` when the last-resort scan produced the elements.
    pub strategy: Option<Selector>,
    pub validated: usize,
    pub elements: Vec<ElementHandle>,
}

impl Discovery {
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.strategy.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ElementDiscoveryCascade {
    strategies: Vec<Selector>,
    validation: Validation,
    /// A strategy whose validated count exceeds this wins immediately.
    confidence_threshold: usize,
    /// Last-resort scan and its cap, used when no strategy validates.
    fallback: Option<(Selector, usize)>,
}

impl ElementDiscoveryCascade {
    #[must_use]
    pub fn new(strategies: Vec<Selector>, validation: Validation, confidence_threshold: usize) -> Self {
        Self {
            strategies,
            validation,
            confidence_threshold,
            fallback: None,
        }
    }

    #[must_use]
    pub fn with_currency_fallback(mut self, limit: usize) -> Self {
        self.fallback = Some((Selector::text("*", CURRENCY_MARKER), limit));
        self
    }

    #[must_use]
    pub fn for_merchants(table: &SelectorTable) -> Self {
        Self::new(table.merchant_cards.clone(), Validation::merchants(), 15)
            .with_currency_fallback(20)
    }

    #[must_use]
    pub fn for_items(table: &SelectorTable) -> Self {
        Self::new(table.item_cards.clone(), Validation::items(), 30).with_currency_fallback(100)
    }

    #[must_use]
    pub fn for_categories(table: &SelectorTable) -> Self {
        Self::new(table.category_links.clone(), Validation::categories(), 10)
    }

    #[must_use]
    pub fn strategies(&self) -> &[Selector] {
        &self.strategies
    }

    /// Counting mode: the largest raw match count over all strategies.
    ///
    /// # Errors
    ///
    /// Returns the first page error only when every strategy failed.
    pub async fn count(&self, page: &dyn PageDriver) -> Result<usize, HarvestError> {
        let mut best = 0usize;
        let mut first_error = None;
        let mut failures = 0usize;

        for selector in &self.strategies {
            match page.count(selector).await {
                Ok(n) => best = best.max(n),
                Err(err) => {
                    failures += 1;
                    debug!(%selector, error = %err, "count failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) if failures == self.strategies.len() => Err(err),
            _ => Ok(best),
        }
    }

    /// Picks the strategy with the strictly greatest validated count; ties
    /// go to the earlier strategy.
    ///
    /// # Errors
    ///
    /// Returns the first page error only when every strategy failed and no
    /// fallback is configured. An empty page yields an empty
    /// [`Discovery`], not an error.
    pub async fn discover(&self, page: &dyn PageDriver) -> Result<Discovery, HarvestError> {
        let mut best: Option<(usize, usize)> = None;
        let mut first_error = None;
        let mut failures = 0usize;

        for (index, selector) in self.strategies.iter().enumerate() {
            let sample = match page.locate(selector, Some(self.validation.sample_limit)).await {
                Ok(sample) => sample,
                Err(err) => {
                    failures += 1;
                    debug!(%selector, error = %err, "strategy failed");
                    first_error.get_or_insert(err);
                    continue;
                }
            };
            if sample.is_empty() {
                continue;
            }

            let validated = self.validated_count(page, &sample).await;
            debug!(%selector, sampled = sample.len(), validated, "strategy scored");

            if validated > best.map_or(0, |(_, score)| score) {
                best = Some((index, validated));
            }
            if validated > self.confidence_threshold {
                debug!(%selector, validated, "confident match, stopping cascade");
                break;
            }
        }

        if let Some((index, validated)) = best {
            let selector = self.strategies[index].clone();
            let elements = page.locate(&selector, None).await?;
            info!(strategy = %selector, validated, count = elements.len(), "elements discovered");
            return Ok(Discovery {
                strategy: Some(selector),
                validated,
                elements,
            });
        }

        if let Some((selector, limit)) = &self.fallback {
            let elements = page.locate(selector, Some(*limit)).await?;
            info!(count = elements.len(), "no strategy validated, used currency scan");
            return Ok(Discovery {
                strategy: None,
                validated: 0,
                elements,
            });
        }

        match first_error {
            Some(err) if failures == self.strategies.len() => Err(err),
            _ => Ok(Discovery {
                strategy: None,
                validated: 0,
                elements: Vec::new(),
            }),
        }
    }

    async fn validated_count(&self, page: &dyn PageDriver, sample: &[ElementHandle]) -> usize {
        let mut validated = 0;
        for element in sample {
            match page.read_text(element).await {
                Ok(text) if self.validation.accepts(&text) => validated += 1,
                Ok(_) => {}
                Err(err) => debug!(error = %err, "sample text unreadable"),
            }
        }
        validated
    }
}
