//! Chrome over CDP via chromiumoxide.
//!
//! Elements are addressed by a `data-hvst-ref` attribute stamped on them when
//! they are first located, so handles stay valid across re-renders that keep
//! the node.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetGeolocationOverrideParams, SetLocaleOverrideParams,
    SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::layout::Point;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Handler, Page};
use futures::StreamExt;
use hvst_core::AppConfig;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{stealth, ElementHandle, PageDriver, ScrollAction, Selector};
use crate::error::HarvestError;
use crate::session::{BrowserLauncher, BrowserProfile, Fingerprint};

const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

const CHROME_BINARIES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-sync",
    "--disable-translate",
    "--no-sandbox",
    "--disable-gpu",
    "--lang=pt-BR",
];

/// Resolves after `DOMContentLoaded`, or after 10 s regardless.
const READY_STATE_SCRIPT: &str = r"
new Promise((resolve) => {
    if (document.readyState === 'complete' || document.readyState === 'interactive') {
        resolve(document.readyState);
    } else {
        document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
        setTimeout(() => resolve('timeout'), 10000);
    }
})
";

/// Launches a fresh Chrome per session, or opens a fresh page on a remote
/// browser when `HVST_BROWSER_WS_URL` is set.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    chrome_path: Option<PathBuf>,
    remote_endpoint: Option<String>,
    nav_timeout: Duration,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            headless: config.headless,
            chrome_path: config.chrome_path.clone(),
            remote_endpoint: config.browser_ws_url.clone(),
            nav_timeout: Duration::from_secs(config.nav_timeout_secs),
        }
    }

    fn find_chrome(&self) -> Result<PathBuf, HarvestError> {
        if let Some(path) = &self.chrome_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(HarvestError::browser(format!(
                "configured Chrome path does not exist: {}",
                path.display()
            )));
        }

        if let Some(found) = CHROME_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            return Ok(found.to_path_buf());
        }

        let search_path = std::env::var_os("PATH").unwrap_or_default();
        for dir in std::env::split_paths(&search_path) {
            for name in CHROME_BINARIES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        Err(HarvestError::browser(
            "Chrome/Chromium not found; install it or set HVST_CHROME_PATH",
        ))
    }

    async fn launch_local(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<(Browser, Handler, PathBuf), HarvestError> {
        let chrome = self.find_chrome()?;
        let profile_dir =
            std::env::temp_dir().join(format!("hvst-profile-{:016x}", rand::random::<u64>()));
        let (width, height) = fingerprint.viewport;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome)
            .user_data_dir(&profile_dir)
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            });
        if !self.headless {
            builder = builder.with_head();
        }
        for arg in LAUNCH_ARGS {
            builder = builder.arg(*arg);
        }
        let config = builder.build().map_err(HarvestError::browser)?;

        info!(headless = self.headless, width, height, "launching browser");
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::browser(format!("failed to launch browser: {e}")))?;
        Ok((browser, handler, profile_dir))
    }

    async fn connect_remote(&self, endpoint: &str) -> Result<(Browser, Handler), HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(self.nav_timeout)
            .build()
            .map_err(HarvestError::browser)?;
        let ws_url = resolve_ws_url(&client, endpoint).await?;
        info!(ws_url = %ws_url, "connecting to remote browser");
        Browser::connect(ws_url)
            .await
            .map_err(|e| HarvestError::browser(format!("failed to connect to browser: {e}")))
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        fingerprint: &Fingerprint,
        profile: &BrowserProfile,
    ) -> Result<Box<dyn PageDriver>, HarvestError> {
        let (browser, mut handler, profile_dir, owns_browser) = match &self.remote_endpoint {
            Some(endpoint) => {
                let (browser, handler) = self.connect_remote(endpoint).await?;
                (browser, handler, None, false)
            }
            None => {
                let (browser, handler, dir) = self.launch_local(fingerprint).await?;
                (browser, handler, Some(dir), true)
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(HarvestError::browser(format!("failed to open page: {e}")));
            }
        };

        let driver = ChromiumPage {
            page,
            browser: tokio::sync::Mutex::new(Some(browser)),
            handler: Mutex::new(Some(handler_task)),
            owns_browser,
            profile_dir,
            viewport: fingerprint.viewport,
            nav_timeout: self.nav_timeout,
            closed: AtomicBool::new(false),
        };

        if let Err(e) = driver.prepare(fingerprint, profile).await {
            let _ = driver.close().await;
            return Err(e);
        }
        Ok(Box::new(driver))
    }
}

/// Turns a DevTools endpoint into a browser WebSocket URL.
///
/// A `ws://…/devtools/browser/…` URL is returned unchanged. Anything else is
/// treated as the DevTools HTTP endpoint and resolved through
/// `/json/version`.
///
/// # Errors
///
/// Returns [`HarvestError::Browser`] when the endpoint is unreachable or does
/// not advertise `webSocketDebuggerUrl`.
pub async fn resolve_ws_url(
    client: &reqwest::Client,
    endpoint: &str,
) -> Result<String, HarvestError> {
    if (endpoint.starts_with("ws://") || endpoint.starts_with("wss://"))
        && endpoint.contains("/devtools/")
    {
        return Ok(endpoint.to_string());
    }

    let http = endpoint
        .replacen("wss://", "https://", 1)
        .replacen("ws://", "http://", 1);
    let version_url = format!("{}/json/version", http.trim_end_matches('/'));

    let body: serde_json::Value = client
        .get(&version_url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| HarvestError::browser(format!("remote browser unreachable: {e}")))?
        .json()
        .await
        .map_err(|e| HarvestError::browser(format!("invalid /json/version body: {e}")))?;

    body.get("webSocketDebuggerUrl")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HarvestError::browser("no webSocketDebuggerUrl in /json/version"))
}

pub struct ChromiumPage {
    page: Page,
    browser: tokio::sync::Mutex<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    owns_browser: bool,
    profile_dir: Option<PathBuf>,
    viewport: (u32, u32),
    nav_timeout: Duration,
    closed: AtomicBool,
}

impl std::fmt::Debug for ChromiumPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumPage")
            .field("owns_browser", &self.owns_browser)
            .field("viewport", &self.viewport)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ChromiumPage {
    async fn prepare(
        &self,
        fingerprint: &Fingerprint,
        profile: &BrowserProfile,
    ) -> Result<(), HarvestError> {
        let mut user_agent = SetUserAgentOverrideParams::new(fingerprint.user_agent.to_string());
        user_agent.accept_language = Some(profile.accept_language.clone());
        user_agent.platform = Some(stealth::platform_for(fingerprint.user_agent).to_string());
        self.page
            .execute(user_agent)
            .await
            .map_err(HarvestError::browser)?;

        let (width, height) = fingerprint.viewport;
        self.best_effort(
            "device metrics",
            self.page.execute(SetDeviceMetricsOverrideParams::new(
                i64::from(width),
                i64::from(height),
                1.0,
                false,
            )),
        )
        .await;
        self.best_effort(
            "timezone",
            self.page
                .execute(SetTimezoneOverrideParams::new(profile.timezone.clone())),
        )
        .await;
        self.best_effort(
            "locale",
            self.page.execute(
                SetLocaleOverrideParams::builder()
                    .locale(profile.locale.clone())
                    .build(),
            ),
        )
        .await;
        self.best_effort(
            "geolocation",
            self.page.execute(
                SetGeolocationOverrideParams::builder()
                    .latitude(profile.latitude)
                    .longitude(profile.longitude)
                    .accuracy(100.0)
                    .build(),
            ),
        )
        .await;

        let languages: Vec<&str> = profile.languages.iter().map(String::as_str).collect();
        for script in stealth::init_scripts(fingerprint.user_agent, &languages) {
            self.page
                .execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
                .await
                .map_err(HarvestError::browser)?;
        }
        Ok(())
    }

    async fn best_effort<T, E: std::fmt::Display>(
        &self,
        what: &str,
        command: impl std::future::Future<Output = Result<T, E>>,
    ) {
        if let Err(e) = command.await {
            debug!(what, error = %e, "emulation override skipped");
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, HarvestError> {
        self.page
            .evaluate(script)
            .await
            .map_err(HarvestError::browser)?
            .into_value::<T>()
            .map_err(HarvestError::browser)
    }

    /// Runs `body` with `el` bound to the referenced element; `body` must
    /// `return` a value. A detached element yields `ElementNotFound`.
    async fn eval_on<T: DeserializeOwned>(
        &self,
        element: &ElementHandle,
        body: &str,
    ) -> Result<T, HarvestError> {
        let script = format!(
            "(() => {{ const el = {}; if (!el) return {{ found: false }}; \
             return {{ found: true, value: (() => {{ {body} }})() }}; }})()",
            element_expr(element)
        );
        let reply: EvalReply<T> = self.eval(script).await?;
        match reply {
            EvalReply {
                found: true,
                value: Some(value),
            } => Ok(value),
            EvalReply { found: true, .. } => Err(HarvestError::browser(format!(
                "element {} returned no value",
                element.raw()
            ))),
            EvalReply { found: false, .. } => Err(HarvestError::not_found(format!(
                "element {} is no longer attached",
                element.raw()
            ))),
        }
    }

    async fn cdp_element(
        &self,
        element: &ElementHandle,
    ) -> Result<chromiumoxide::element::Element, HarvestError> {
        self.page
            .find_element(format!("[data-hvst-ref=\"{}\"]", element.raw()))
            .await
            .map_err(|e| HarvestError::not_found(format!("element {}: {e}", element.raw())))
    }

    fn is_closed(&self) -> Result<(), HarvestError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HarvestError::browser("page is closed"));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize)]
struct EvalReply<T> {
    found: bool,
    value: Option<T>,
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn element_expr(element: &ElementHandle) -> String {
    format!(
        "document.querySelector('[data-hvst-ref=\"{}\"]')",
        element.raw()
    )
}

/// JS expression evaluating to the array of nodes matched by `selector`.
fn nodes_expr(selector: &Selector) -> String {
    match selector {
        Selector::Css(css) => format!("Array.from(document.querySelectorAll({}))", js_string(css)),
        Selector::XPath(xpath) => format!(
            "(() => {{ const r = document.evaluate({}, document, null, \
             XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); const out = []; \
             for (let i = 0; i < r.snapshotLength; i++) {{ const n = r.snapshotItem(i); \
             if (n && n.nodeType === 1) out.push(n); }} return out; }})()",
            js_string(xpath)
        ),
        Selector::Text { css, text } => format!(
            "(() => {{ const needle = {}.toLowerCase(); \
             return Array.from(document.querySelectorAll({})).filter((e) => {{ \
             if (['HTML', 'BODY', 'SCRIPT', 'STYLE', 'HEAD'].includes(e.tagName)) return false; \
             const t = (e.innerText || '').trim(); \
             return t.length > 0 && t.length <= 2000 && t.toLowerCase().includes(needle); }}); }})()",
            js_string(text),
            js_string(css)
        ),
    }
}

/// Walks the body in document order, carrying the text of the last heading
/// seen onto every following element.
fn section_script(headings: &Selector) -> String {
    format!(
        "(() => {{ const heads = new Set({}); if (heads.size === 0) return 0; \
         let current = null; \
         for (const el of document.body.querySelectorAll('*')) {{ \
           if (heads.has(el)) {{ current = (el.innerText || '').trim().split('\\n')[0]; continue; }} \
           if (current && !el.hasAttribute('data-section')) el.setAttribute('data-section', current); \
         }} \
         return heads.size; }})()",
        nodes_expr(headings)
    )
}

fn scroll_script(action: ScrollAction) -> String {
    match action {
        ScrollAction::ToTop => "window.scrollTo(0, 0); true".to_string(),
        ScrollAction::ToBottom => {
            "window.scrollTo(0, document.body.scrollHeight); true".to_string()
        }
        ScrollAction::ByViewport(factor) => {
            format!("window.scrollBy(0, window.innerHeight * {factor}); true")
        }
        ScrollAction::ByFraction(fraction) => {
            format!("window.scrollBy(0, document.body.scrollHeight * {fraction}); true")
        }
        ScrollAction::ToFraction(fraction) => {
            format!("window.scrollTo(0, document.body.scrollHeight * {fraction}); true")
        }
        ScrollAction::ForceLoad => "(() => { \
            window.scrollTo(0, document.body.scrollHeight); \
            window.dispatchEvent(new Event('scroll')); \
            window.dispatchEvent(new Event('resize')); \
            void document.body.offsetHeight; \
            return true; })()"
            .to_string(),
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), HarvestError> {
        self.is_closed()?;
        match tokio::time::timeout(self.nav_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(HarvestError::browser(format!("goto {url}: {e}"))),
            Err(_) => {
                return Err(HarvestError::NavigationTimeout {
                    step: "goto".to_string(),
                    detail: format!("{url} not loaded after {}s", self.nav_timeout.as_secs()),
                })
            }
        }

        match tokio::time::timeout(
            self.nav_timeout,
            self.eval::<String>(READY_STATE_SCRIPT.to_string()),
        )
        .await
        {
            Ok(Ok(state)) => debug!(url, state, "page ready"),
            Ok(Err(e)) => debug!(url, error = %e, "ready state unavailable"),
            Err(_) => warn!(url, "timed out waiting for ready state"),
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, HarvestError> {
        self.is_closed()?;
        Ok(self
            .page
            .url()
            .await
            .map_err(HarvestError::browser)?
            .unwrap_or_default())
    }

    async fn title(&self) -> Result<Option<String>, HarvestError> {
        self.is_closed()?;
        self.page.get_title().await.map_err(HarvestError::browser)
    }

    async fn locate(
        &self,
        selector: &Selector,
        limit: Option<usize>,
    ) -> Result<Vec<ElementHandle>, HarvestError> {
        self.is_closed()?;
        let limit = limit.map_or_else(|| "Infinity".to_string(), |n| n.to_string());
        let script = format!(
            "(() => {{ const nodes = {}.slice(0, {limit}); \
             window.__hvstNext = window.__hvstNext || 1; \
             return nodes.map((n) => {{ \
             if (!n.dataset.hvstRef) n.dataset.hvstRef = String(window.__hvstNext++); \
             return Number(n.dataset.hvstRef); }}); }})()",
            nodes_expr(selector)
        );
        let ids: Vec<u64> = self.eval(script).await?;
        Ok(ids.into_iter().map(ElementHandle::from_raw).collect())
    }

    async fn count(&self, selector: &Selector) -> Result<usize, HarvestError> {
        self.is_closed()?;
        self.eval(format!("{}.length", nodes_expr(selector))).await
    }

    async fn read_text(&self, element: &ElementHandle) -> Result<String, HarvestError> {
        self.is_closed()?;
        self.eval_on(element, "return el.innerText || el.textContent || '';")
            .await
    }

    async fn read_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        self.is_closed()?;
        let body = format!("return [el.getAttribute({})];", js_string(name));
        let [value]: [Option<String>; 1] = self.eval_on(element, &body).await?;
        Ok(value)
    }

    async fn child_attribute(
        &self,
        element: &ElementHandle,
        css: &str,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        self.is_closed()?;
        let body = format!(
            "const t = el.matches({css}) ? el : el.querySelector({css}); \
             return [t ? t.getAttribute({name}) : null];",
            css = js_string(css),
            name = js_string(name)
        );
        let [value]: [Option<String>; 1] = self.eval_on(element, &body).await?;
        Ok(value)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), HarvestError> {
        self.is_closed()?;
        let el = self.cdp_element(element).await?;
        el.scroll_into_view().await.map_err(HarvestError::browser)?;
        el.click().await.map_err(HarvestError::browser)?;
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), HarvestError> {
        self.is_closed()?;
        let _: bool = self
            .eval_on(
                element,
                "el.focus(); el.value = ''; \
                 el.dispatchEvent(new Event('input', { bubbles: true })); return true;",
            )
            .await?;
        let el = self.cdp_element(element).await?;
        el.click().await.map_err(HarvestError::browser)?;
        el.type_str(text).await.map_err(HarvestError::browser)?;
        Ok(())
    }

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), HarvestError> {
        self.is_closed()?;
        let el = self.cdp_element(element).await?;
        el.press_key("Enter").await.map_err(HarvestError::browser)?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), HarvestError> {
        self.is_closed()?;
        let _: bool = self
            .eval_on(
                element,
                "el.scrollIntoView({ block: 'center', behavior: 'instant' }); return true;",
            )
            .await?;
        Ok(())
    }

    async fn scroll(&self, action: ScrollAction) -> Result<(), HarvestError> {
        self.is_closed()?;
        let _: bool = self.eval(scroll_script(action)).await?;
        Ok(())
    }

    async fn label_sections(&self, headings: &Selector) -> Result<usize, HarvestError> {
        self.is_closed()?;
        self.eval(section_script(headings)).await
    }

    async fn visible_text(&self) -> Result<String, HarvestError> {
        self.is_closed()?;
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, HarvestError> {
        self.is_closed()?;
        self.page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(HarvestError::browser)
    }

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), HarvestError> {
        self.is_closed()?;
        self.page
            .move_mouse(Point { x, y })
            .await
            .map_err(HarvestError::browser)?;
        Ok(())
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    async fn close(&self) -> Result<(), HarvestError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.page.clone().close().await {
            debug!(error = %e, "page close failed");
        }

        let browser = self.browser.lock().await.take();
        if let (true, Some(mut browser)) = (self.owns_browser, browser) {
            if let Err(e) = browser.close().await {
                debug!(error = %e, "browser close failed");
            }
            if let Err(e) = browser.wait().await {
                debug!(error = %e, "browser wait failed");
            }
        }

        if let Some(task) = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }

        if let Some(dir) = &self.profile_dir {
            if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                debug!(dir = %dir.display(), error = %e, "profile dir cleanup failed");
            }
        }
        Ok(())
    }
}

// Covers a cancelled harvest and a `close` cut short by its timeout.
// Dropping the owned `Browser` kills its process; whatever `close` did not
// release yet is released here.
impl Drop for ChromiumPage {
    fn drop(&mut self) {
        if let Some(task) = self
            .handler
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        if let Some(dir) = self.profile_dir.as_deref().filter(|dir| dir.exists()) {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn devtools_ws_url_is_used_as_is() {
        let client = reqwest::Client::new();
        let ws = "ws://127.0.0.1:9222/devtools/browser/abc";
        assert_eq!(resolve_ws_url(&client, ws).await.unwrap(), ws);
    }

    #[tokio::test]
    async fn http_endpoint_resolves_through_json_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Browser": "Chrome/120.0.0.0",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/xyz"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let ws = resolve_ws_url(&client, &format!("{}/", server.uri()))
            .await
            .unwrap();
        assert_eq!(ws, "ws://127.0.0.1:9222/devtools/browser/xyz");
    }

    #[tokio::test]
    async fn missing_debugger_url_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = resolve_ws_url(&client, &server.uri()).await.unwrap_err();
        assert!(matches!(err, HarvestError::Browser(_)));
    }

    #[test]
    fn text_selector_script_embeds_escaped_needle() {
        let script = nodes_expr(&Selector::text("button", "Ver \"mais\""));
        assert!(script.contains(r#""Ver \"mais\"""#));
        assert!(script.contains("querySelectorAll(\"button\")"));
    }

    #[test]
    fn explicit_chrome_path_must_exist() {
        let launcher = ChromiumLauncher {
            headless: true,
            chrome_path: Some(PathBuf::from("/definitely/not/chrome")),
            remote_endpoint: None,
            nav_timeout: Duration::from_secs(5),
        };
        assert!(matches!(
            launcher.find_chrome(),
            Err(HarvestError::Browser(_))
        ));
    }
}
