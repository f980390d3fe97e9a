//! Browser-driven harvesting of a delivery marketplace.
//!
//! A [`WorkerPool`] runs [`HarvestTarget`](hvst_core::HarvestTarget)s through
//! a [`HarvestOrchestrator`]: each target gets its own [`BrowserSession`],
//! walks the [`NavigationStateMachine`], scrolls until the listing stops
//! growing, picks its cards with an [`ElementDiscoveryCascade`] and saves
//! what the [`RecordExtractor`] yields through an
//! [`IdentityStore`](hvst_core::IdentityStore).

pub mod cascade;
pub mod circuit_breaker;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod navigation;
pub mod orchestrator;
pub mod page;
pub mod pool;
pub mod retry;
pub mod scroll;
pub mod selectors;
pub mod session;

pub use cascade::{Discovery, ElementDiscoveryCascade, Validation};
pub use circuit_breaker::{BreakerPhase, CircuitBreaker};
pub use diagnostics::DiagnosticsWriter;
pub use error::HarvestError;
pub use extract::{RawElement, RecordExtractor};
pub use navigation::{NavReport, NavState, NavStep, NavigationStateMachine};
pub use orchestrator::{HarvestOrchestrator, HarvestSettings};
pub use page::{ChromiumLauncher, ElementHandle, PageDriver, ScrollAction, Selector};
#[cfg(any(test, feature = "test-util"))]
pub use page::{ScriptedElement, ScriptedPage};
pub use pool::{PoolOutcome, WorkerPool};
pub use retry::RetryPolicy;
pub use scroll::{ConvergenceScroller, ScrollReport, ScrollSettings};
pub use selectors::SelectorTable;
pub use session::{
    BrowserLauncher, BrowserProfile, BrowserSession, Fingerprint, HumanDelay, SessionFactory,
};
