//! One target, end to end: session, navigation, scrolling, discovery,
//! extraction and persistence.
//!
//! [`HarvestOrchestrator::harvest`] never returns an error. Whatever goes
//! wrong is folded into the target's [`ExtractionStats`] so a caller walking
//! many targets keeps going.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::Instant as Deadline;
use tracing::{debug, info, warn};

use hvst_core::{
    AppConfig, DiagnosticSnapshot, ExtractionStats, FailureKind, HarvestTarget, IdentityStore,
    TargetFailure, TargetKind, TargetReport,
};

use crate::cascade::ElementDiscoveryCascade;
use crate::diagnostics::DiagnosticsWriter;
use crate::error::HarvestError;
use crate::extract::RecordExtractor;
use crate::navigation::NavigationStateMachine;
use crate::retry::RetryPolicy;
use crate::scroll::{ConvergenceScroller, ScrollSettings};
use crate::selectors::SelectorTable;
use crate::session::{BrowserSession, SessionFactory};

/// Bound for the work done after a target is over: the failure snapshot and
/// releasing the session.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub base_url: String,
    pub retry: RetryPolicy,
    /// Hard ceiling for one target, session launch included.
    pub target_deadline: Duration,
    pub listing_scroll: ScrollSettings,
    pub item_scroll: ScrollSettings,
    pub diagnostics_dir: PathBuf,
}

impl HarvestSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            retry: RetryPolicy::from_app_config(config),
            target_deadline: Duration::from_secs(config.target_deadline_secs),
            listing_scroll: ScrollSettings::listings(config),
            item_scroll: ScrollSettings::items(config),
            diagnostics_dir: config.diagnostics_dir.clone(),
        }
    }
}

/// A target-level failure before it is written into the stats.
#[derive(Debug)]
struct Abort {
    kind: FailureKind,
    error: HarvestError,
}

impl Abort {
    fn with(kind: FailureKind) -> impl FnOnce(HarvestError) -> Self {
        move |error| Self { kind, error }
    }
}

pub struct HarvestOrchestrator {
    sessions: Arc<SessionFactory>,
    store: Arc<dyn IdentityStore>,
    table: Arc<SelectorTable>,
    extractor: RecordExtractor,
    diagnostics: DiagnosticsWriter,
    settings: HarvestSettings,
}

impl HarvestOrchestrator {
    /// # Errors
    ///
    /// Returns [`HarvestError::DataExtraction`] when the configured base URL
    /// is not absolute.
    pub fn new(
        sessions: Arc<SessionFactory>,
        store: Arc<dyn IdentityStore>,
        table: Arc<SelectorTable>,
        settings: HarvestSettings,
    ) -> Result<Self, HarvestError> {
        Ok(Self {
            sessions,
            store,
            table,
            extractor: RecordExtractor::new(&settings.base_url)?,
            diagnostics: DiagnosticsWriter::new(settings.diagnostics_dir.clone()),
            settings,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    /// Harvests one target within `target_deadline`, launch included. The
    /// browser session is always released before this returns, including on
    /// deadline expiry.
    pub async fn harvest(&self, target: &HarvestTarget) -> TargetReport {
        let started = Instant::now();
        let mut stats = ExtractionStats::started_now();
        info!(kind = %target.kind, target = %target.display_name, url = %target.url, "harvesting target");

        if target.kind == TargetKind::ProductList && target.parent_id.is_none() {
            let error = HarvestError::DataExtraction {
                target: target.display_name.clone(),
                reason: "item list has no merchant id".to_string(),
            };
            stats.failure = Some(failure(FailureKind::Extraction, &error, None));
        } else {
            let expires = Deadline::now() + self.settings.target_deadline;
            match tokio::time::timeout_at(expires, self.sessions.open()).await {
                Ok(Ok(session)) => {
                    self.harvest_in(&session, target, expires, &mut stats).await;
                    if tokio::time::timeout(CLEANUP_TIMEOUT, session.close()).await.is_err() {
                        warn!(target = %target.display_name, "session close timed out");
                    }
                }
                Ok(Err(error)) => {
                    stats.failure = Some(failure(FailureKind::Browser, &error, None));
                }
                Err(_) => {
                    let error = self.deadline_error(target);
                    stats.failure = Some(failure(FailureKind::Deadline, &error, None));
                }
            }
        }

        stats.duration = started.elapsed();
        match &stats.failure {
            None => info!(
                target = %target.display_name,
                total = stats.total,
                success = stats.success,
                new = stats.new,
                duplicates = stats.duplicates,
                price_changes = stats.price_changes,
                skipped = stats.skipped,
                errors = stats.errors,
                elapsed_ms = stats.duration.as_millis(),
                "target harvested"
            ),
            Some(f) => warn!(
                target = %target.display_name,
                kind = %f.kind,
                error = %f.message,
                success = stats.success,
                elapsed_ms = stats.duration.as_millis(),
                "target failed"
            ),
        }
        TargetReport {
            target: target.clone(),
            stats,
        }
    }

    async fn harvest_in(
        &self,
        session: &BrowserSession,
        target: &HarvestTarget,
        expires: Deadline,
        stats: &mut ExtractionStats,
    ) {
        let outcome = tokio::time::timeout_at(expires, self.run(session, target, stats)).await;

        let abort = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(abort)) => abort,
            Err(_) => Abort {
                kind: FailureKind::Deadline,
                error: self.deadline_error(target),
            },
        };

        let snapshot = match &abort.error {
            HarvestError::NavigationFailure {
                diagnostics: Some(snapshot),
                ..
            } => Some((**snapshot).clone()),
            HarvestError::Persistence(_) => None,
            _ => {
                let label = format!("{}-{}", target.kind, abort.kind);
                let capture = self.diagnostics.capture(session.page(), &label);
                match tokio::time::timeout(CLEANUP_TIMEOUT, capture).await {
                    Ok(snapshot) => Some(snapshot),
                    Err(_) => {
                        warn!(label, "diagnostic capture timed out");
                        None
                    }
                }
            }
        };
        stats.failure = Some(failure(abort.kind, &abort.error, snapshot));
    }

    fn deadline_error(&self, target: &HarvestTarget) -> HarvestError {
        HarvestError::DeadlineExceeded {
            target: target.display_name.clone(),
            secs: self.settings.target_deadline.as_secs(),
        }
    }

    async fn run(
        &self,
        session: &BrowserSession,
        target: &HarvestTarget,
        stats: &mut ExtractionStats,
    ) -> Result<(), Abort> {
        let mut navigation = NavigationStateMachine::new(
            &self.table,
            self.settings.retry,
            &self.settings.base_url,
            &target.city,
            &self.diagnostics,
        );
        navigation
            .drive(session, target)
            .await
            .map_err(Abort::with(FailureKind::Navigation))?;

        let page = session.page();
        let (cascade, scroll) = self.plan(target.kind);

        let scrolled = ConvergenceScroller::new(scroll, self.table.load_more.clone())
            .run(page, &cascade)
            .await
            .map_err(Abort::with(FailureKind::Discovery))?;
        debug!(
            target = %target.display_name,
            initial = scrolled.initial_count,
            final_count = scrolled.final_count,
            attempts = scrolled.attempts,
            converged = scrolled.converged,
            "scrolling finished"
        );

        if target.kind == TargetKind::ProductList {
            self.label_sections(session).await;
        }

        let discovery = cascade
            .discover(page)
            .await
            .map_err(Abort::with(FailureKind::Discovery))?;
        if discovery.elements.is_empty() {
            return Err(Abort {
                kind: FailureKind::Discovery,
                error: HarvestError::not_found(format!("{} elements on {}", target.kind, target.url)),
            });
        }

        stats.total = discovery.elements.len();
        for element in &discovery.elements {
            let record = match self.extractor.extract(page, element, target).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    stats.skipped += 1;
                    continue;
                }
                Err(error) => {
                    debug!(target = %target.display_name, error = %error, "element unreadable");
                    stats.errors += 1;
                    continue;
                }
            };

            let outcome = self
                .store
                .save(&record)
                .await
                .map_err(|e| Abort {
                    kind: FailureKind::Persistence,
                    error: e.into(),
                })?;
            stats.success += 1;
            if outcome.is_new() {
                stats.new += 1;
            } else {
                stats.duplicates += 1;
            }
            if outcome.price_changed() {
                stats.price_changes += 1;
            }
        }

        if stats.success == 0 {
            return Err(Abort {
                kind: FailureKind::Extraction,
                error: HarvestError::DataExtraction {
                    target: target.display_name.clone(),
                    reason: format!("none of {} elements produced a record", stats.total),
                },
            });
        }
        Ok(())
    }

    fn plan(&self, kind: TargetKind) -> (ElementDiscoveryCascade, ScrollSettings) {
        match kind {
            TargetKind::Category => (
                ElementDiscoveryCascade::for_categories(&self.table),
                self.settings.listing_scroll.clone(),
            ),
            TargetKind::RestaurantList => (
                ElementDiscoveryCascade::for_merchants(&self.table),
                self.settings.listing_scroll.clone(),
            ),
            TargetKind::ProductList => (
                ElementDiscoveryCascade::for_items(&self.table),
                self.settings.item_scroll.clone(),
            ),
        }
    }

    async fn label_sections(&self, session: &BrowserSession) {
        for selector in &self.table.menu_sections {
            match session.page().label_sections(selector).await {
                Ok(0) => {}
                Ok(headings) => {
                    debug!(selector = %selector, headings, "menu sections labelled");
                    return;
                }
                Err(e) => debug!(selector = %selector, error = %e, "section labelling skipped"),
            }
        }
    }
}

fn failure(
    kind: FailureKind,
    error: &HarvestError,
    diagnostics: Option<DiagnosticSnapshot>,
) -> TargetFailure {
    TargetFailure {
        kind,
        message: error.to_string(),
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use hvst_core::MemoryIdentityStore;

    use super::*;
    use crate::circuit_breaker::CircuitBreaker;
    use crate::page::{PageDriver, ScriptedPage};
    use crate::session::{BrowserLauncher, BrowserProfile, Fingerprint, HumanDelay};

    struct FailingLauncher;

    #[async_trait]
    impl BrowserLauncher for FailingLauncher {
        async fn launch(
            &self,
            _fingerprint: &Fingerprint,
            _profile: &BrowserProfile,
        ) -> Result<Box<dyn PageDriver>, HarvestError> {
            Err(HarvestError::browser("no chrome"))
        }
    }

    struct BlankLauncher;

    #[async_trait]
    impl BrowserLauncher for BlankLauncher {
        async fn launch(
            &self,
            _fingerprint: &Fingerprint,
            _profile: &BrowserProfile,
        ) -> Result<Box<dyn PageDriver>, HarvestError> {
            Ok(Box::new(ScriptedPage::new("about:blank")))
        }
    }

    struct HangingLauncher;

    #[async_trait]
    impl BrowserLauncher for HangingLauncher {
        async fn launch(
            &self,
            _fingerprint: &Fingerprint,
            _profile: &BrowserProfile,
        ) -> Result<Box<dyn PageDriver>, HarvestError> {
            std::future::pending().await
        }
    }

    fn settings(deadline: Duration) -> HarvestSettings {
        HarvestSettings {
            base_url: "https://www.ifood.com.br".to_string(),
            retry: RetryPolicy::new(1, Duration::from_millis(1), 1.0),
            target_deadline: deadline,
            listing_scroll: ScrollSettings::default(),
            item_scroll: ScrollSettings::default(),
            diagnostics_dir: std::env::temp_dir()
                .join(format!("hvst-orch-{:08x}", rand::random::<u32>())),
        }
    }

    fn orchestrator(launcher: Arc<dyn BrowserLauncher>, settings: HarvestSettings) -> HarvestOrchestrator {
        let delay = HumanDelay {
            min: Duration::from_secs(5),
            max: Duration::from_secs(5),
        };
        let sessions = SessionFactory::new(launcher, BrowserProfile::default(), delay)
            .with_breaker(CircuitBreaker::with_defaults("browser"));
        HarvestOrchestrator::new(
            Arc::new(sessions),
            Arc::new(MemoryIdentityStore::new()),
            Arc::new(SelectorTable::default()),
            settings,
        )
        .unwrap()
    }

    fn pizza() -> HarvestTarget {
        HarvestTarget::new(
            TargetKind::RestaurantList,
            "https://www.ifood.com.br/delivery/birigui-sp/pizza",
            "Pizza",
            "Birigui",
        )
    }

    #[tokio::test]
    async fn launch_failure_is_reported_not_raised() {
        let orch = orchestrator(Arc::new(FailingLauncher), settings(Duration::from_secs(60)));
        let report = orch.harvest(&pizza()).await;
        let failure = report.stats.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Browser);
        assert!(failure.message.contains("no chrome"));
        assert_eq!(report.stats.total, 0);
    }

    #[tokio::test]
    async fn item_list_without_merchant_fails_before_launch() {
        let orch = orchestrator(Arc::new(FailingLauncher), settings(Duration::from_secs(60)));
        let target = HarvestTarget::new(
            TargetKind::ProductList,
            "https://www.ifood.com.br/delivery/birigui-sp/x/abc",
            "X",
            "Birigui",
        );
        let report = orch.harvest(&target).await;
        assert_eq!(report.stats.failure.unwrap().kind, FailureKind::Extraction);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_target_with_snapshot() {
        let settings = settings(Duration::from_secs(2));
        let dir = settings.diagnostics_dir.clone();
        let orch = orchestrator(Arc::new(BlankLauncher), settings);

        let report = orch.harvest(&pizza()).await;
        let failure = report.stats.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Deadline);
        assert_eq!(
            failure.diagnostics.unwrap().label,
            "restaurant_list-deadline"
        );

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_launch_is_bounded_by_the_deadline() {
        let orch = orchestrator(Arc::new(HangingLauncher), settings(Duration::from_secs(2)));

        let started = tokio::time::Instant::now();
        let report = tokio::time::timeout(Duration::from_secs(3600), orch.harvest(&pizza()))
            .await
            .expect("harvest must finish within its deadline");

        assert!(started.elapsed() < Duration::from_secs(3));
        let failure = report.stats.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Deadline);
        assert!(failure.diagnostics.is_none());
    }
}
