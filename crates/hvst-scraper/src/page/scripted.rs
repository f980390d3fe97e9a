//! In-memory [`PageDriver`] with scripted content.
//!
//! Elements are registered per selector. Growth batches are revealed one per
//! downward scroll or load-more click, which is enough to exercise the
//! convergence scroller and the cascade without a browser.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ElementHandle, PageDriver, ScrollAction, Selector};
use crate::error::HarvestError;

/// Minimal PNG signature; enough for diagnostics to write a file.
const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Default)]
pub struct ScriptedElement {
    text: String,
    attrs: HashMap<String, String>,
    child_attrs: HashMap<(String, String), String>,
    navigates_to: Option<String>,
    loads_more: bool,
}

impl ScriptedElement {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Attribute `name` of the first descendant matching `css`.
    #[must_use]
    pub fn child_attr(
        mut self,
        css: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.child_attrs.insert((css.into(), name.into()), value.into());
        self
    }

    /// Clicking or pressing Enter on this element changes the page URL.
    #[must_use]
    pub fn navigates_to(mut self, url: impl Into<String>) -> Self {
        self.navigates_to = Some(url.into());
        self
    }

    /// Clicking this element reveals the next growth batch.
    #[must_use]
    pub fn loads_more(mut self) -> Self {
        self.loads_more = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Goto(String),
    Click(u64),
    Fill { element: u64, text: String },
    PressEnter(u64),
    Scroll(ScrollAction),
    MouseMove { x: f64, y: f64 },
    Screenshot,
    Close,
}

#[derive(Debug, Default)]
struct SelectorEntry {
    visible: Vec<usize>,
    pending: VecDeque<Vec<usize>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    url: String,
    title: Option<String>,
    body_text: String,
    elements: Vec<ScriptedElement>,
    selectors: HashMap<String, SelectorEntry>,
    goto_failures: u32,
    failing_scroll: Option<ScrollAction>,
    events: Vec<PageEvent>,
    closed: bool,
    open_pages: Option<Arc<AtomicUsize>>,
}

impl ScriptState {
    fn reveal_next_batch(&mut self) {
        for entry in self.selectors.values_mut() {
            if let Some(batch) = entry.pending.pop_front() {
                entry.visible.extend(batch);
            }
        }
    }

    fn push_elements(&mut self, elements: Vec<ScriptedElement>) -> Vec<usize> {
        let start = self.elements.len();
        self.elements.extend(elements);
        (start..self.elements.len()).collect()
    }

    fn element(&self, handle: &ElementHandle) -> Result<&ScriptedElement, HarvestError> {
        usize::try_from(handle.raw())
            .ok()
            .and_then(|index| self.elements.get(index))
            .ok_or_else(|| HarvestError::browser(format!("stale element {}", handle.raw())))
    }

    fn ensure_open(&self) -> Result<(), HarvestError> {
        if self.closed {
            return Err(HarvestError::browser("page is closed"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ScriptedPage {
    state: Mutex<ScriptState>,
    viewport: (u32, u32),
}

impl ScriptedPage {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                url: url.into(),
                ..ScriptState::default()
            }),
            viewport: (1366, 768),
        }
    }

    #[must_use]
    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.lock().title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_body_text(self, text: impl Into<String>) -> Self {
        self.lock().body_text = text.into();
        self
    }

    /// Elements matched by `selector` from the start.
    #[must_use]
    pub fn with_elements(self, selector: Selector, elements: Vec<ScriptedElement>) -> Self {
        {
            let mut state = self.lock();
            let ids = state.push_elements(elements);
            state
                .selectors
                .entry(selector.to_string())
                .or_default()
                .visible
                .extend(ids);
        }
        self
    }

    /// Elements matched by `selector` only after earlier batches, revealed
    /// one batch per downward scroll or load-more click.
    #[must_use]
    pub fn with_growth(self, selector: Selector, batches: Vec<Vec<ScriptedElement>>) -> Self {
        {
            let mut state = self.lock();
            for batch in batches {
                let ids = state.push_elements(batch);
                state
                    .selectors
                    .entry(selector.to_string())
                    .or_default()
                    .pending
                    .push_back(ids);
            }
        }
        self
    }

    /// The first `count` calls to `goto` time out.
    #[must_use]
    pub fn failing_goto(self, count: u32) -> Self {
        self.lock().goto_failures = count;
        self
    }

    /// Every scroll with `action` fails.
    #[must_use]
    pub fn failing_scroll(self, action: ScrollAction) -> Self {
        self.lock().failing_scroll = Some(action);
        self
    }

    /// Decrements `open_pages` when the page closes. The launcher that
    /// hands the page out is expected to have incremented it.
    #[must_use]
    pub fn with_open_gauge(self, open_pages: Arc<AtomicUsize>) -> Self {
        self.lock().open_pages = Some(open_pages);
        self
    }

    #[must_use]
    pub fn events(&self) -> Vec<PageEvent> {
        self.lock().events.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Current value typed into `element` by [`PageDriver::fill`].
    #[must_use]
    pub fn value_of(&self, element: &ElementHandle) -> Option<String> {
        let state = self.lock();
        state
            .element(element)
            .ok()
            .and_then(|e| e.attrs.get("value").cloned())
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<(), HarvestError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.events.push(PageEvent::Goto(url.to_string()));
        if state.goto_failures > 0 {
            state.goto_failures -= 1;
            return Err(HarvestError::NavigationTimeout {
                step: "goto".to_string(),
                detail: format!("{url} did not load"),
            });
        }
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, HarvestError> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.url.clone())
    }

    async fn title(&self) -> Result<Option<String>, HarvestError> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.title.clone())
    }

    async fn locate(
        &self,
        selector: &Selector,
        limit: Option<usize>,
    ) -> Result<Vec<ElementHandle>, HarvestError> {
        let state = self.lock();
        state.ensure_open()?;
        let Some(entry) = state.selectors.get(&selector.to_string()) else {
            return Ok(Vec::new());
        };
        let take = limit.unwrap_or(usize::MAX);
        Ok(entry
            .visible
            .iter()
            .take(take)
            .map(|&index| ElementHandle::from_raw(index as u64))
            .collect())
    }

    async fn count(&self, selector: &Selector) -> Result<usize, HarvestError> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state
            .selectors
            .get(&selector.to_string())
            .map_or(0, |entry| entry.visible.len()))
    }

    async fn read_text(&self, element: &ElementHandle) -> Result<String, HarvestError> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.element(element)?.text.clone())
    }

    async fn read_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.element(element)?.attrs.get(name).cloned())
    }

    async fn child_attribute(
        &self,
        element: &ElementHandle,
        css: &str,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state
            .element(element)?
            .child_attrs
            .get(&(css.to_string(), name.to_string()))
            .cloned())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), HarvestError> {
        let mut state = self.lock();
        state.ensure_open()?;
        let target = state.element(element)?.clone();
        state.events.push(PageEvent::Click(element.raw()));
        if let Some(url) = target.navigates_to {
            state.url = url;
        }
        if target.loads_more {
            state.reveal_next_batch();
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), HarvestError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.element(element)?;
        if let Some(index) = usize::try_from(element.raw()).ok() {
            if let Some(target) = state.elements.get_mut(index) {
                target.attrs.insert("value".to_string(), text.to_string());
            }
        }
        state.events.push(PageEvent::Fill {
            element: element.raw(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), HarvestError> {
        let mut state = self.lock();
        state.ensure_open()?;
        let target = state.element(element)?.clone();
        state.events.push(PageEvent::PressEnter(element.raw()));
        if let Some(url) = target.navigates_to {
            state.url = url;
        }
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), HarvestError> {
        let state = self.lock();
        state.ensure_open()?;
        state.element(element)?;
        Ok(())
    }

    async fn scroll(&self, action: ScrollAction) -> Result<(), HarvestError> {
        let mut state = self.lock();
        state.ensure_open()?;
        if state.failing_scroll == Some(action) {
            return Err(HarvestError::browser(format!("scroll {action:?} failed")));
        }
        state.events.push(PageEvent::Scroll(action));
        if action != ScrollAction::ToTop {
            state.reveal_next_batch();
        }
        Ok(())
    }

    /// Scripted cards carry their section as a plain attribute; this only
    /// reports how many headings the selector would see.
    async fn label_sections(&self, headings: &Selector) -> Result<usize, HarvestError> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state
            .selectors
            .get(&headings.to_string())
            .map_or(0, |entry| entry.visible.len()))
    }

    async fn visible_text(&self) -> Result<String, HarvestError> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.body_text.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, HarvestError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.events.push(PageEvent::Screenshot);
        Ok(FAKE_PNG.to_vec())
    }

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), HarvestError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.events.push(PageEvent::MouseMove { x, y });
        Ok(())
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    async fn close(&self) -> Result<(), HarvestError> {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            state.events.push(PageEvent::Close);
            if let Some(open_pages) = &state.open_pages {
                open_pages.fetch_sub(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}
