//! Isolated browser sessions with a randomized fingerprint and a fixed
//! locale profile.
//!
//! Every [`BrowserSession`] owns exactly one page and is never shared between
//! targets. Closing is idempotent and must happen on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hvst_core::AppConfig;
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::HarvestError;
use crate::page::PageDriver;

pub const VIEWPORTS: &[(u32, u32)] = &[
    (1920, 1080),
    (1366, 768),
    (1440, 900),
    (1536, 864),
    (1600, 900),
];

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
];

/// Keeps simulated pointer moves away from the viewport edges.
const MOUSE_MARGIN: f64 = 100.0;

/// Per-session identity drawn from the pools above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub user_agent: &'static str,
    pub viewport: (u32, u32),
}

impl Fingerprint {
    #[must_use]
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Self {
            user_agent: USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]),
            viewport: VIEWPORTS.choose(&mut rng).copied().unwrap_or(VIEWPORTS[0]),
        }
    }
}

/// Locale, timezone and geolocation shared by every session.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserProfile {
    pub locale: String,
    pub timezone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accept_language: String,
    pub languages: Vec<String>,
}

impl Default for BrowserProfile {
    /// Brazilian Portuguese, São Paulo time, centered on Ribeirão Preto.
    fn default() -> Self {
        Self {
            locale: "pt-BR".to_string(),
            timezone: "America/Sao_Paulo".to_string(),
            latitude: -21.1767,
            longitude: -47.8208,
            accept_language: "pt-BR,pt;q=0.9,en;q=0.8".to_string(),
            languages: vec!["pt-BR".to_string(), "pt".to_string(), "en".to_string()],
        }
    }
}

/// Starts a browser and returns its single page, fully configured.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(
        &self,
        fingerprint: &Fingerprint,
        profile: &BrowserProfile,
    ) -> Result<Box<dyn PageDriver>, HarvestError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDelay {
    pub min: Duration,
    pub max: Duration,
}

impl HumanDelay {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            min: Duration::from_millis(config.human_delay_min_ms),
            max: Duration::from_millis(config.human_delay_max_ms),
        }
    }
}

impl Default for HumanDelay {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(500),
            max: Duration::from_millis(1500),
        }
    }
}

/// Opens sessions through a shared launcher guarded by a circuit breaker.
pub struct SessionFactory {
    launcher: Arc<dyn BrowserLauncher>,
    profile: BrowserProfile,
    delay: HumanDelay,
    breaker: CircuitBreaker,
}

impl SessionFactory {
    #[must_use]
    pub fn new(launcher: Arc<dyn BrowserLauncher>, profile: BrowserProfile, delay: HumanDelay) -> Self {
        Self {
            launcher,
            profile,
            delay,
            breaker: CircuitBreaker::with_defaults("browser-launch"),
        }
    }

    #[must_use]
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Launches a fresh isolated session.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::CircuitOpen`] while launches are failing
    /// repeatedly, otherwise whatever the launcher returns.
    pub async fn open(&self) -> Result<BrowserSession, HarvestError> {
        let fingerprint = Fingerprint::random();
        debug!(
            user_agent = fingerprint.user_agent,
            width = fingerprint.viewport.0,
            height = fingerprint.viewport.1,
            "opening browser session"
        );
        let page = self
            .breaker
            .call(self.launcher.launch(&fingerprint, &self.profile))
            .await?;
        Ok(BrowserSession {
            page,
            fingerprint,
            delay: self.delay,
            closed: AtomicBool::new(false),
        })
    }
}

pub struct BrowserSession {
    page: Box<dyn PageDriver>,
    fingerprint: Fingerprint,
    delay: HumanDelay,
    closed: AtomicBool,
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("fingerprint", &self.fingerprint)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl BrowserSession {
    /// Wraps an already-open page.
    #[must_use]
    pub fn from_page(page: Box<dyn PageDriver>, delay: HumanDelay) -> Self {
        let viewport = page.viewport();
        Self {
            page,
            fingerprint: Fingerprint {
                user_agent: USER_AGENTS[0],
                viewport,
            },
            delay,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Sleeps a random time within the configured bounds and makes one to
    /// three pointer moves inside the viewport.
    pub async fn human_delay(&self) {
        self.human_delay_between(self.delay.min, self.delay.max).await;
    }

    pub async fn human_delay_between(&self, min: Duration, max: Duration) {
        let (width, height) = self.page.viewport();
        let (pause, moves) = {
            let mut rng = rand::rng();
            let pause = if max > min {
                rng.random_range(min..=max)
            } else {
                min
            };
            let count = rng.random_range(1..=3);
            let moves: Vec<(f64, f64)> = (0..count)
                .map(|_| {
                    (
                        random_coordinate(&mut rng, width),
                        random_coordinate(&mut rng, height),
                    )
                })
                .collect();
            (pause, moves)
        };

        tokio::time::sleep(pause).await;
        for (x, y) in moves {
            if let Err(e) = self.page.move_mouse(x, y).await {
                debug!(error = %e, "pointer move skipped");
                break;
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Releases the page and its browser. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.page.close().await {
            warn!(error = %e, "failed to close browser session");
        }
    }
}

fn random_coordinate(rng: &mut impl Rng, extent: u32) -> f64 {
    let extent = f64::from(extent);
    if extent <= 2.0 * MOUSE_MARGIN {
        return extent / 2.0;
    }
    rng.random_range(MOUSE_MARGIN..extent - MOUSE_MARGIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ScriptedPage;
    use std::sync::atomic::AtomicU32;

    struct ScriptedLauncher {
        launches: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl BrowserLauncher for ScriptedLauncher {
        async fn launch(
            &self,
            _fingerprint: &Fingerprint,
            _profile: &BrowserProfile,
        ) -> Result<Box<dyn PageDriver>, HarvestError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HarvestError::browser("chrome crashed"));
            }
            Ok(Box::new(ScriptedPage::new("about:blank")))
        }
    }

    #[test]
    fn random_fingerprint_comes_from_pools() {
        for _ in 0..20 {
            let fp = Fingerprint::random();
            assert!(USER_AGENTS.contains(&fp.user_agent));
            assert!(VIEWPORTS.contains(&fp.viewport));
        }
    }

    #[test]
    fn default_profile_is_brazilian() {
        let profile = BrowserProfile::default();
        assert_eq!(profile.locale, "pt-BR");
        assert_eq!(profile.timezone, "America/Sao_Paulo");
        assert!(profile.latitude < 0.0 && profile.longitude < 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn human_delay_moves_pointer_inside_margins() {
        let session = BrowserSession::from_page(
            Box::new(ScriptedPage::new("about:blank")),
            HumanDelay {
                min: Duration::from_millis(10),
                max: Duration::from_millis(20),
            },
        );
        let start = tokio::time::Instant::now();
        session.human_delay().await;
        assert!(start.elapsed() >= Duration::from_millis(10));

        session.close().await;
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let launches = Arc::new(AtomicU32::new(0));
        let factory = SessionFactory::new(
            Arc::new(ScriptedLauncher {
                launches: Arc::clone(&launches),
                fail: false,
            }),
            BrowserProfile::default(),
            HumanDelay::default(),
        );
        let session = factory.open().await.unwrap();
        session.close().await;
        session.close().await;
        assert!(session.is_closed());
        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_launch_failures_open_the_breaker() {
        let launches = Arc::new(AtomicU32::new(0));
        let factory = SessionFactory::new(
            Arc::new(ScriptedLauncher {
                launches: Arc::clone(&launches),
                fail: true,
            }),
            BrowserProfile::default(),
            HumanDelay::default(),
        )
        .with_breaker(CircuitBreaker::new("test", 2, 1, Duration::from_secs(60)));

        assert!(factory.open().await.is_err());
        assert!(factory.open().await.is_err());
        let third = factory.open().await.unwrap_err();
        assert!(matches!(third, HarvestError::CircuitOpen { .. }));
        assert_eq!(launches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn coordinates_stay_inside_margins() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let x = random_coordinate(&mut rng, 1366);
            assert!((MOUSE_MARGIN..1366.0 - MOUSE_MARGIN).contains(&x));
        }
        assert!((random_coordinate(&mut rng, 150) - 75.0).abs() < f64::EPSILON);
    }
}
