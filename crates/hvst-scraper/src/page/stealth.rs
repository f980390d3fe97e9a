//! Init scripts that hide the usual automation markers.
//!
//! Installed with `Page.addScriptToEvaluateOnNewDocument`, so they run before
//! any site script on every navigation of the page.

const HIDE_WEBDRIVER: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
";

const CHROME_RUNTIME: &str = r"
if (!window.chrome) {
    window.chrome = { runtime: {}, app: {}, csi: function() {}, loadTimes: function() {} };
}
";

const NOTIFICATION_PERMISSION: &str = r"
(() => {
    const query = window.navigator.permissions && window.navigator.permissions.query;
    if (!query) return;
    window.navigator.permissions.query = (p) => (
        p && p.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : query.call(window.navigator.permissions, p)
    );
})();
";

const PLUGINS: &str = r"
Object.defineProperty(navigator, 'plugins', {
    get: () => [
        { name: 'PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
        { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
        { name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' }
    ],
    configurable: true
});
";

const WEBGL_VENDOR: &str = r"
(() => {
    if (typeof WebGLRenderingContext === 'undefined') return;
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) return 'Google Inc. (Intel)';
        if (parameter === 37446) return 'ANGLE (Intel, Intel(R) UHD Graphics 620, OpenGL 4.1)';
        return getParameter.call(this, parameter);
    };
})();
";

const CDC_MARKERS: &str = r"
for (const key of Object.keys(window)) {
    if (key.startsWith('cdc_')) { try { delete window[key]; } catch (e) {} }
}
";

/// `navigator.platform` value consistent with `user_agent`.
#[must_use]
pub fn platform_for(user_agent: &str) -> &'static str {
    if user_agent.contains("Windows") {
        "Win32"
    } else if user_agent.contains("Macintosh") {
        "MacIntel"
    } else {
        "Linux x86_64"
    }
}

/// The full init-script set for one session.
///
/// `languages` is the `navigator.languages` list, most preferred first.
#[must_use]
pub fn init_scripts(user_agent: &str, languages: &[&str]) -> Vec<String> {
    let languages = serde_json::to_string(languages).unwrap_or_else(|_| "[]".to_string());
    let platform = platform_for(user_agent);

    vec![
        HIDE_WEBDRIVER.to_string(),
        CHROME_RUNTIME.to_string(),
        NOTIFICATION_PERMISSION.to_string(),
        PLUGINS.to_string(),
        format!(
            "Object.defineProperty(navigator, 'languages', {{ get: () => {languages}, configurable: true }});"
        ),
        format!(
            "Object.defineProperty(navigator, 'platform', {{ get: () => '{platform}', configurable: true }});"
        ),
        WEBGL_VENDOR.to_string(),
        CDC_MARKERS.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_follows_user_agent() {
        assert_eq!(
            platform_for("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0"),
            "Win32"
        );
        assert_eq!(
            platform_for("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) Chrome/120.0"),
            "MacIntel"
        );
        assert_eq!(platform_for("Mozilla/5.0 (X11; Linux x86_64)"), "Linux x86_64");
    }

    #[test]
    fn languages_are_embedded_as_json() {
        let scripts = init_scripts("Mozilla/5.0 (X11; Linux x86_64)", &["pt-BR", "pt", "en"]);
        assert!(scripts
            .iter()
            .any(|s| s.contains(r#"["pt-BR","pt","en"]"#)));
        assert!(scripts.iter().any(|s| s.contains("webdriver")));
    }
}
