use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    /// Marketplace root, e.g. `https://www.ifood.com.br`.
    pub base_url: String,
    /// City typed into the delivery-address form.
    pub city: String,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    /// DevTools endpoint of an already running browser. When set, sessions
    /// attach to it instead of launching a local Chrome.
    pub browser_ws_url: Option<String>,
    /// Optional YAML file overriding the built-in selector table.
    pub selectors_path: Option<PathBuf>,
    pub workers: usize,
    pub nav_timeout_secs: u64,
    pub target_deadline_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_backoff_multiplier: f64,
    pub scroll_max_attempts: usize,
    pub scroll_no_growth_threshold: usize,
    pub human_delay_min_ms: u64,
    pub human_delay_max_ms: u64,
    pub diagnostics_dir: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("city", &self.city)
            .field("headless", &self.headless)
            .field("chrome_path", &self.chrome_path)
            .field(
                "browser_ws_url",
                &self.browser_ws_url.as_ref().map(|_| "[redacted]"),
            )
            .field("selectors_path", &self.selectors_path)
            .field("workers", &self.workers)
            .field("nav_timeout_secs", &self.nav_timeout_secs)
            .field("target_deadline_secs", &self.target_deadline_secs)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_initial_delay_ms", &self.retry_initial_delay_ms)
            .field("retry_backoff_multiplier", &self.retry_backoff_multiplier)
            .field("scroll_max_attempts", &self.scroll_max_attempts)
            .field(
                "scroll_no_growth_threshold",
                &self.scroll_no_growth_threshold,
            )
            .field("human_delay_min_ms", &self.human_delay_min_ms)
            .field("human_delay_max_ms", &self.human_delay_max_ms)
            .field("diagnostics_dir", &self.diagnostics_dir)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}
