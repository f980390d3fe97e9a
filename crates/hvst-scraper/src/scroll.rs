//! Scroll-until-stable loader for lazily rendered lists.

use std::time::Duration;

use hvst_core::AppConfig;
use rand::Rng;
use tracing::{debug, info};

use crate::cascade::ElementDiscoveryCascade;
use crate::error::HarvestError;
use crate::page::{PageDriver, ScrollAction, Selector};

/// Deterministic rotation, one action per attempt.
const ROTATION: [ScrollAction; 5] = [
    ScrollAction::ToBottom,
    ScrollAction::ByViewport(1.0),
    ScrollAction::ByViewport(2.0),
    ScrollAction::ByFraction(0.3),
    ScrollAction::ToFraction(0.5),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollSettings {
    pub max_attempts: usize,
    /// Consecutive attempts without growth that count as converged.
    pub no_growth_threshold: usize,
    /// Every this many attempts, click "load more" and force a reflow.
    pub boost_every: usize,
    pub max_load_more_clicks: usize,
    /// Wait used for the first `short_wait_attempts` attempts.
    pub short_wait: Duration,
    pub short_wait_attempts: usize,
    pub long_wait: Duration,
    /// Upper bound of the random extra added to every wait.
    pub jitter: Duration,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            no_growth_threshold: 5,
            boost_every: 10,
            max_load_more_clicks: 3,
            short_wait: Duration::from_secs(1),
            short_wait_attempts: 10,
            long_wait: Duration::from_secs(2),
            jitter: Duration::from_millis(500),
        }
    }
}

impl ScrollSettings {
    /// Menu pages: the configured threshold as is.
    #[must_use]
    pub fn items(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.scroll_max_attempts,
            no_growth_threshold: config.scroll_no_growth_threshold.max(1),
            ..Self::default()
        }
    }

    /// Listing pages load in larger pages and settle sooner, so the
    /// threshold is capped at 3.
    #[must_use]
    pub fn listings(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.scroll_max_attempts,
            no_growth_threshold: config.scroll_no_growth_threshold.clamp(1, 3),
            ..Self::default()
        }
    }

    fn wait_for(&self, attempt: usize) -> Duration {
        let base = if attempt < self.short_wait_attempts {
            self.short_wait
        } else {
            self.long_wait
        };
        if self.jitter.is_zero() {
            return base;
        }
        base + rand::rng().random_range(Duration::ZERO..=self.jitter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollReport {
    pub initial_count: usize,
    pub final_count: usize,
    pub attempts: usize,
    pub strategies_used: Vec<ScrollAction>,
    pub load_more_clicks: usize,
    /// `false` when the attempt bound ended the loop.
    pub converged: bool,
}

#[derive(Debug)]
struct ConvergenceState {
    last_count: usize,
    consecutive_no_growth: usize,
    attempts: usize,
}

#[derive(Debug, Clone)]
pub struct ConvergenceScroller {
    settings: ScrollSettings,
    load_more: Vec<Selector>,
}

impl ConvergenceScroller {
    #[must_use]
    pub fn new(settings: ScrollSettings, load_more: Vec<Selector>) -> Self {
        Self {
            settings,
            load_more,
        }
    }

    /// Scrolls until the cascade's count stops growing, then returns to
    /// the top of the page, also when scrolling failed halfway.
    ///
    /// Runs at most `max_attempts` iterations.
    ///
    /// # Errors
    ///
    /// Propagates page errors from scrolling or counting. The first error
    /// wins over one from the final return to the top.
    pub async fn run(
        &self,
        page: &dyn PageDriver,
        cascade: &ElementDiscoveryCascade,
    ) -> Result<ScrollReport, HarvestError> {
        let outcome = self.converge(page, cascade).await;
        let reset = page.scroll(ScrollAction::ToTop).await;
        let report = outcome?;
        reset?;

        info!(
            initial = report.initial_count,
            final_count = report.final_count,
            attempts = report.attempts,
            load_more_clicks = report.load_more_clicks,
            converged = report.converged,
            "scroll finished"
        );
        Ok(report)
    }

    async fn converge(
        &self,
        page: &dyn PageDriver,
        cascade: &ElementDiscoveryCascade,
    ) -> Result<ScrollReport, HarvestError> {
        let initial_count = cascade.count(page).await?;
        let mut state = ConvergenceState {
            last_count: initial_count,
            consecutive_no_growth: 0,
            attempts: 0,
        };
        let mut strategies_used = Vec::new();
        let mut load_more_clicks = 0usize;
        let mut converged = false;

        while state.attempts < self.settings.max_attempts {
            state.attempts += 1;
            let action = ROTATION[(state.attempts - 1) % ROTATION.len()];
            page.scroll(action).await?;
            strategies_used.push(action);
            tokio::time::sleep(self.settings.wait_for(state.attempts)).await;

            if self.settings.boost_every > 0 && state.attempts % self.settings.boost_every == 0 {
                if load_more_clicks < self.settings.max_load_more_clicks
                    && self.click_load_more(page).await
                {
                    load_more_clicks += 1;
                    tokio::time::sleep(self.settings.long_wait).await;
                }
                page.scroll(ScrollAction::ForceLoad).await?;
                strategies_used.push(ScrollAction::ForceLoad);
                tokio::time::sleep(self.settings.short_wait).await;
            }

            let count = cascade.count(page).await?;
            if count > state.last_count {
                debug!(attempt = state.attempts, from = state.last_count, to = count, "list grew");
                state.last_count = count;
                state.consecutive_no_growth = 0;
            } else {
                state.consecutive_no_growth += 1;
            }

            if state.consecutive_no_growth >= self.settings.no_growth_threshold {
                converged = true;
                break;
            }
        }

        Ok(ScrollReport {
            initial_count,
            final_count: state.last_count,
            attempts: state.attempts,
            strategies_used,
            load_more_clicks,
            converged,
        })
    }

    async fn click_load_more(&self, page: &dyn PageDriver) -> bool {
        for selector in &self.load_more {
            let Ok(found) = page.locate(selector, Some(1)).await else {
                continue;
            };
            let Some(button) = found.first() else {
                continue;
            };
            if page.scroll_into_view(button).await.is_err() {
                continue;
            }
            match page.click(button).await {
                Ok(()) => {
                    debug!(%selector, "clicked load-more control");
                    return true;
                }
                Err(err) => debug!(%selector, error = %err, "load-more click failed"),
            }
        }
        false
    }
}
