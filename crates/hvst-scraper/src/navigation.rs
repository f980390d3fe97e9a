//! Drives a fresh session from the landing page to a target listing.
//!
//! ```text
//! Start -> SiteLoaded -> AddressEntered -> LocationConfirmed1
//!       -> LocationConfirmed2 -> CategoryOpen
//! ```
//!
//! Any step may be skipped when the page already satisfies it. A step that
//! exhausts its fallbacks and retries captures diagnostics and moves the
//! machine to the absorbing `Failed` state.

use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use hvst_core::HarvestTarget;

use crate::diagnostics::DiagnosticsWriter;
use crate::error::HarvestError;
use crate::page::first_match;
use crate::retry::RetryPolicy;
use crate::selectors::SelectorTable;
use crate::session::BrowserSession;

/// A transition target, named after the state it reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavStep {
    SiteLoaded,
    AddressEntered,
    LocationConfirmed1,
    LocationConfirmed2,
    CategoryOpen,
}

impl NavStep {
    pub const SEQUENCE: [NavStep; 5] = [
        NavStep::SiteLoaded,
        NavStep::AddressEntered,
        NavStep::LocationConfirmed1,
        NavStep::LocationConfirmed2,
        NavStep::CategoryOpen,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NavStep::SiteLoaded => "site_loaded",
            NavStep::AddressEntered => "address_entered",
            NavStep::LocationConfirmed1 => "location_confirmed_1",
            NavStep::LocationConfirmed2 => "location_confirmed_2",
            NavStep::CategoryOpen => "category_open",
        }
    }
}

impl std::fmt::Display for NavStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Start,
    Reached(NavStep),
    Failed(NavStep),
}

impl NavState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NavState::Reached(NavStep::CategoryOpen) | NavState::Failed(_)
        )
    }
}

/// Which steps ran and which were already satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavReport {
    pub performed: Vec<NavStep>,
    pub skipped: Vec<NavStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Performed,
    AlreadyThere,
}

/// One-shot machine; build a new one per target.
pub struct NavigationStateMachine<'a> {
    table: &'a SelectorTable,
    retry: RetryPolicy,
    base_url: &'a str,
    city: &'a str,
    diagnostics: &'a DiagnosticsWriter,
    state: NavState,
}

impl<'a> NavigationStateMachine<'a> {
    #[must_use]
    pub fn new(
        table: &'a SelectorTable,
        retry: RetryPolicy,
        base_url: &'a str,
        city: &'a str,
        diagnostics: &'a DiagnosticsWriter,
    ) -> Self {
        Self {
            table,
            retry,
            base_url,
            city,
            diagnostics,
            state: NavState::Start,
        }
    }

    #[must_use]
    pub fn state(&self) -> NavState {
        self.state
    }

    /// Runs every remaining step toward `target`.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::NavigationFailure`] naming the failed step,
    /// with a diagnostic snapshot attached. Calling again after a failure
    /// returns the same kind of error without touching the page.
    pub async fn drive(
        &mut self,
        session: &BrowserSession,
        target: &HarvestTarget,
    ) -> Result<NavReport, HarvestError> {
        if let NavState::Failed(step) = self.state {
            return Err(HarvestError::NavigationFailure {
                step,
                reason: "navigation already failed".to_string(),
                diagnostics: None,
            });
        }

        let mut report = NavReport::default();
        for step in NavStep::SEQUENCE {
            if self.has_reached(step) {
                continue;
            }

            let this = &*self;
            let outcome = this
                .retry
                .run(step.as_str(), move || this.attempt(session, step, target))
                .await;

            match outcome {
                Ok(StepOutcome::Performed) => {
                    info!(target = %target.display_name, step = %step, "navigation step done");
                    report.performed.push(step);
                }
                Ok(StepOutcome::AlreadyThere) => {
                    debug!(target = %target.display_name, step = %step, "already there, skipping");
                    report.skipped.push(step);
                }
                Err(err) => {
                    warn!(target = %target.display_name, step = %step, error = %err, "navigation failed");
                    let snapshot = self
                        .diagnostics
                        .capture(session.page(), step.as_str())
                        .await;
                    self.state = NavState::Failed(step);
                    return Err(HarvestError::NavigationFailure {
                        step,
                        reason: err.to_string(),
                        diagnostics: Some(Box::new(snapshot)),
                    });
                }
            }
            self.state = NavState::Reached(step);
        }
        Ok(report)
    }

    fn has_reached(&self, step: NavStep) -> bool {
        let NavState::Reached(current) = self.state else {
            return false;
        };
        let position = |s: NavStep| NavStep::SEQUENCE.iter().position(|x| *x == s);
        position(current) >= position(step)
    }

    async fn attempt(
        &self,
        session: &BrowserSession,
        step: NavStep,
        target: &HarvestTarget,
    ) -> Result<StepOutcome, HarvestError> {
        let page = session.page();
        let url = page.current_url().await?;

        match step {
            NavStep::SiteLoaded => {
                if self.is_on_site(&url) {
                    return Ok(StepOutcome::AlreadyThere);
                }
                page.goto(self.base_url).await?;
                session.human_delay().await;
            }
            NavStep::AddressEntered => {
                if self.table.is_listing_url(&url) {
                    return Ok(StepOutcome::AlreadyThere);
                }
                let (_, input) = first_match(page, &self.table.address_input, "address input").await?;
                page.fill(&input, self.city).await?;
                session.human_delay().await;
                page.press_enter(&input).await?;
                session.human_delay().await;
            }
            NavStep::LocationConfirmed1 => {
                if self.table.is_listing_url(&url) {
                    return Ok(StepOutcome::AlreadyThere);
                }
                let (index, button) =
                    first_match(page, &self.table.confirm_primary, "location confirmation").await?;
                debug!(fallback = index, "confirm button found");
                page.click(&button).await?;
                session.human_delay().await;
            }
            NavStep::LocationConfirmed2 => {
                if self.table.is_listing_url(&url) {
                    return Ok(StepOutcome::AlreadyThere);
                }
                match first_match(page, &self.table.confirm_secondary, "address confirmation").await {
                    Ok((_, button)) => {
                        page.click(&button).await?;
                        session.human_delay().await;
                    }
                    // The first confirmation sometimes lands on the listing on its own.
                    Err(HarvestError::ElementNotFound { .. })
                        if self.table.is_listing_url(&page.current_url().await?) =>
                    {
                        return Ok(StepOutcome::AlreadyThere);
                    }
                    Err(err) => return Err(err),
                }
            }
            NavStep::CategoryOpen => {
                if same_page(&url, &target.url) {
                    return Ok(StepOutcome::AlreadyThere);
                }
                page.goto(&target.url).await?;
                session.human_delay().await;
            }
        }
        Ok(StepOutcome::Performed)
    }

    fn is_on_site(&self, url: &str) -> bool {
        match (Url::parse(self.base_url), Url::parse(url)) {
            (Ok(base), Ok(current)) => match (base.host_str(), current.host_str()) {
                (Some(base_host), Some(host)) => {
                    host == base_host || host.ends_with(&format!(".{base_host}"))
                }
                _ => false,
            },
            _ => url.starts_with(self.base_url),
        }
    }
}

fn same_page(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hvst_core::TargetKind;

    use super::*;
    use crate::page::{ScriptedElement, ScriptedPage, Selector};
    use crate::session::HumanDelay;

    const BASE: &str = "https://www.ifood.com.br";
    const LISTING: &str = "https://www.ifood.com.br/restaurantes";
    const TARGET: &str = "https://www.ifood.com.br/delivery/birigui-sp/pizza";

    fn session(page: ScriptedPage) -> BrowserSession {
        BrowserSession::from_page(
            Box::new(page),
            HumanDelay {
                min: Duration::from_millis(1),
                max: Duration::from_millis(2),
            },
        )
    }

    fn target() -> HarvestTarget {
        HarvestTarget::new(TargetKind::RestaurantList, TARGET, "Pizza", "Birigui")
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(10), 2.0)
    }

    fn diagnostics() -> DiagnosticsWriter {
        DiagnosticsWriter::new(std::env::temp_dir().join(format!(
            "hvst-nav-{:08x}",
            rand::random::<u32>()
        )))
    }

    fn table() -> SelectorTable {
        SelectorTable {
            address_input: vec![Selector::css("#address")],
            confirm_primary: vec![Selector::css("#confirm-a"), Selector::css("#confirm-b")],
            confirm_secondary: vec![Selector::css("#save")],
            ..SelectorTable::default()
        }
    }

    fn landing_page() -> ScriptedPage {
        ScriptedPage::new("about:blank")
            .with_elements(Selector::css("#address"), vec![ScriptedElement::new("")])
            .with_elements(Selector::css("#confirm-b"), vec![ScriptedElement::new("Confirmar")])
            .with_elements(
                Selector::css("#save"),
                vec![ScriptedElement::new("Salvar endereço").navigates_to(LISTING)],
            )
    }

    #[tokio::test(start_paused = true)]
    async fn full_flow_uses_fallback_confirm_button() {
        let table = table();
        let diag = diagnostics();
        let session = session(landing_page());
        let mut machine = NavigationStateMachine::new(&table, retry(), BASE, "Birigui", &diag);

        let report = machine.drive(&session, &target()).await.unwrap();
        assert_eq!(report.performed, NavStep::SEQUENCE.to_vec());
        assert!(report.skipped.is_empty());
        assert_eq!(machine.state(), NavState::Reached(NavStep::CategoryOpen));
        assert!(machine.state().is_terminal());
        assert_eq!(session.page().current_url().await.unwrap(), TARGET);
    }

    #[tokio::test(start_paused = true)]
    async fn listing_url_skips_location_steps() {
        let table = table();
        let diag = diagnostics();
        let session = session(ScriptedPage::new(LISTING));
        let mut machine = NavigationStateMachine::new(&table, retry(), BASE, "Birigui", &diag);

        let report = machine.drive(&session, &target()).await.unwrap();
        assert_eq!(report.performed, vec![NavStep::CategoryOpen]);
        assert_eq!(
            report.skipped,
            vec![
                NavStep::SiteLoaded,
                NavStep::AddressEntered,
                NavStep::LocationConfirmed1,
                NavStep::LocationConfirmed2,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_confirmation_is_optional_once_on_listing() {
        let table = table();
        let diag = diagnostics();
        let page = ScriptedPage::new("about:blank")
            .with_elements(Selector::css("#address"), vec![ScriptedElement::new("")])
            .with_elements(
                Selector::css("#confirm-a"),
                vec![ScriptedElement::new("Confirmar").navigates_to(LISTING)],
            );
        let session = session(page);
        let mut machine = NavigationStateMachine::new(&table, retry(), BASE, "Birigui", &diag);

        let report = machine.drive(&session, &target()).await.unwrap();
        assert!(report.skipped.contains(&NavStep::LocationConfirmed2));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_goto_failure_is_retried() {
        let table = table();
        let diag = diagnostics();
        let session = session(landing_page().failing_goto(1));
        let mut machine = NavigationStateMachine::new(&table, retry(), BASE, "Birigui", &diag);

        machine.drive(&session, &target()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn missing_confirm_button_fails_with_step_and_diagnostics() {
        let table = table();
        let diag = diagnostics();
        let page = ScriptedPage::new("about:blank")
            .with_elements(Selector::css("#address"), vec![ScriptedElement::new("")]);
        let session = session(page);
        let mut machine = NavigationStateMachine::new(&table, retry(), BASE, "Birigui", &diag);

        let err = machine.drive(&session, &target()).await.unwrap_err();
        match err {
            HarvestError::NavigationFailure {
                step, diagnostics, ..
            } => {
                assert_eq!(step, NavStep::LocationConfirmed1);
                let snapshot = diagnostics.unwrap();
                assert_eq!(snapshot.label, "location_confirmed_1");
                assert_eq!(snapshot.url.as_deref(), Some(BASE));
            }
            other => panic!("expected NavigationFailure, got {other:?}"),
        }
        assert_eq!(machine.state(), NavState::Failed(NavStep::LocationConfirmed1));

        // Failed is absorbing.
        let again = machine.drive(&session, &target()).await.unwrap_err();
        assert!(matches!(
            again,
            HarvestError::NavigationFailure {
                step: NavStep::LocationConfirmed1,
                ..
            }
        ));

        let _ = std::fs::remove_dir_all(diag.dir());
    }

    #[tokio::test(start_paused = true)]
    async fn address_is_typed_into_the_input() {
        let table = table();
        let diag = diagnostics();
        let session = session(landing_page());
        let mut machine = NavigationStateMachine::new(&table, retry(), BASE, "Birigui", &diag);
        machine.drive(&session, &target()).await.unwrap();

        let input = session
            .page()
            .locate(&Selector::css("#address"), Some(1))
            .await
            .unwrap()
            .remove(0);
        assert_eq!(
            session
                .page()
                .read_attribute(&input, "value")
                .await
                .unwrap()
                .as_deref(),
            Some("Birigui")
        );
    }
}
