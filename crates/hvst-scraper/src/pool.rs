use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use hvst_core::{HarvestTarget, PoolSummary, TargetReport};

use crate::orchestrator::HarvestOrchestrator;

/// Everything a pool run produced, in completion order.
#[derive(Debug, Clone)]
pub struct PoolOutcome {
    pub summary: PoolSummary,
    pub reports: Vec<TargetReport>,
}

/// Runs targets through one orchestrator with bounded concurrency.
///
/// Every in-flight target opens its own browser session. Counters are
/// folded by the single loop draining the stream, so no counter is shared
/// between workers.
pub struct WorkerPool {
    orchestrator: Arc<HarvestOrchestrator>,
    concurrency: usize,
}

impl WorkerPool {
    #[must_use]
    pub fn new(orchestrator: Arc<HarvestOrchestrator>, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.max(1),
        }
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Harvests every target, calling `on_progress` as each one finishes.
    ///
    /// Always returns a complete summary; failed targets are counted, never
    /// raised.
    pub async fn run<F>(&self, targets: &[HarvestTarget], mut on_progress: F) -> PoolOutcome
    where
        F: FnMut(&TargetReport),
    {
        let started = Instant::now();
        info!(
            targets = targets.len(),
            concurrency = self.concurrency,
            "starting worker pool"
        );

        let mut summary = PoolSummary::default();
        let mut reports = Vec::with_capacity(targets.len());
        let mut finished = stream::iter(targets)
            .map(|target| self.orchestrator.harvest(target))
            .buffer_unordered(self.concurrency);

        while let Some(report) = finished.next().await {
            summary.record(&report);
            on_progress(&report);
            reports.push(report);
        }
        summary.duration = started.elapsed();

        if summary.failed > 0 {
            warn!(
                failed = summary.failed,
                total = summary.processed,
                "some targets failed"
            );
        }
        info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            records = summary.total_records,
            new = summary.total_new,
            duplicates = summary.total_duplicates,
            elapsed_ms = summary.duration.as_millis(),
            "worker pool finished"
        );
        PoolOutcome { summary, reports }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use hvst_core::{FailureKind, MemoryIdentityStore, TargetKind};

    use super::*;
    use crate::circuit_breaker::CircuitBreaker;
    use crate::error::HarvestError;
    use crate::orchestrator::HarvestSettings;
    use crate::page::PageDriver;
    use crate::retry::RetryPolicy;
    use crate::scroll::ScrollSettings;
    use crate::selectors::SelectorTable;
    use crate::session::{BrowserLauncher, BrowserProfile, Fingerprint, HumanDelay, SessionFactory};

    #[derive(Default)]
    struct RefusingLauncher {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl BrowserLauncher for RefusingLauncher {
        async fn launch(
            &self,
            _fingerprint: &Fingerprint,
            _profile: &BrowserProfile,
        ) -> Result<Box<dyn PageDriver>, HarvestError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(HarvestError::browser("refused"))
        }
    }

    #[tokio::test]
    async fn failed_targets_still_produce_a_full_summary() {
        let launcher = Arc::new(RefusingLauncher::default());
        let sessions = SessionFactory::new(
            launcher.clone(),
            BrowserProfile::default(),
            HumanDelay::default(),
        )
        .with_breaker(CircuitBreaker::new("browser", 100, 1, Duration::from_secs(60)));
        let settings = HarvestSettings {
            base_url: "https://www.ifood.com.br".to_string(),
            retry: RetryPolicy::default(),
            target_deadline: Duration::from_secs(60),
            listing_scroll: ScrollSettings::default(),
            item_scroll: ScrollSettings::default(),
            diagnostics_dir: std::env::temp_dir().join("hvst-pool-unused"),
        };
        let orchestrator = HarvestOrchestrator::new(
            Arc::new(sessions),
            Arc::new(MemoryIdentityStore::new()),
            Arc::new(SelectorTable::default()),
            settings,
        )
        .unwrap();
        let pool = WorkerPool::new(Arc::new(orchestrator), 3);

        let targets: Vec<HarvestTarget> = (0..4)
            .map(|i| {
                HarvestTarget::new(
                    TargetKind::RestaurantList,
                    format!("https://www.ifood.com.br/delivery/birigui-sp/c{i}"),
                    format!("C{i}"),
                    "Birigui",
                )
            })
            .collect();

        let mut seen = Vec::new();
        let outcome = pool
            .run(&targets, |report| seen.push(report.target.display_name.clone()))
            .await;

        assert_eq!(outcome.summary.processed, 4);
        assert_eq!(outcome.summary.failed, 4);
        assert_eq!(outcome.summary.succeeded, 0);
        assert_eq!(seen.len(), 4);
        assert!(outcome
            .reports
            .iter()
            .all(|r| r.stats.failure.as_ref().map(|f| f.kind) == Some(FailureKind::Browser)));
        assert_eq!(launcher.attempts.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let sessions = SessionFactory::new(
            Arc::new(RefusingLauncher::default()),
            BrowserProfile::default(),
            HumanDelay::default(),
        );
        let settings = HarvestSettings {
            base_url: "https://www.ifood.com.br".to_string(),
            retry: RetryPolicy::default(),
            target_deadline: Duration::from_secs(1),
            listing_scroll: ScrollSettings::default(),
            item_scroll: ScrollSettings::default(),
            diagnostics_dir: std::env::temp_dir(),
        };
        let orchestrator = HarvestOrchestrator::new(
            Arc::new(sessions),
            Arc::new(MemoryIdentityStore::new()),
            Arc::new(SelectorTable::default()),
            settings,
        )
        .unwrap();
        assert_eq!(WorkerPool::new(Arc::new(orchestrator), 0).concurrency(), 1);
    }
}
