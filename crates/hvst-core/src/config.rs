use std::path::PathBuf;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let value = or_default(var, default)
            .parse::<f64>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(invalid(var, "must be a finite number".to_string()))
        }
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got {other:?}"))),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("HVST_ENV", "development"))?;
    let log_level = or_default("HVST_LOG_LEVEL", "info");

    let base_url = or_default("HVST_BASE_URL", "https://www.ifood.com.br")
        .trim_end_matches('/')
        .to_string();
    let city = or_default("HVST_CITY", "Birigui");
    if city.trim().is_empty() {
        return Err(invalid("HVST_CITY", "must not be empty".to_string()));
    }

    let headless = parse_bool("HVST_HEADLESS", "true")?;
    let chrome_path = lookup("HVST_CHROME_PATH").ok().map(PathBuf::from);
    let browser_ws_url = lookup("HVST_BROWSER_WS_URL").ok();
    let selectors_path = lookup("HVST_SELECTORS_PATH").ok().map(PathBuf::from);

    let workers = parse_usize("HVST_WORKERS", "3")?;
    if workers == 0 {
        return Err(invalid("HVST_WORKERS", "must be at least 1".to_string()));
    }
    let nav_timeout_secs = parse_u64("HVST_NAV_TIMEOUT_SECS", "30")?;
    let target_deadline_secs = parse_u64("HVST_TARGET_DEADLINE_SECS", "600")?;

    let retry_max_attempts = parse_u32("HVST_RETRY_MAX_ATTEMPTS", "3")?;
    if retry_max_attempts == 0 {
        return Err(invalid(
            "HVST_RETRY_MAX_ATTEMPTS",
            "must be at least 1".to_string(),
        ));
    }
    let retry_initial_delay_ms = parse_u64("HVST_RETRY_INITIAL_DELAY_MS", "2000")?;
    let retry_backoff_multiplier = parse_f64("HVST_RETRY_BACKOFF_MULTIPLIER", "2.0")?;
    if retry_backoff_multiplier <= 1.0 {
        return Err(invalid(
            "HVST_RETRY_BACKOFF_MULTIPLIER",
            format!("must be greater than 1.0, got {retry_backoff_multiplier}"),
        ));
    }

    let scroll_max_attempts = parse_usize("HVST_SCROLL_MAX_ATTEMPTS", "50")?;
    let scroll_no_growth_threshold = parse_usize("HVST_SCROLL_NO_GROWTH_THRESHOLD", "5")?;

    let human_delay_min_ms = parse_u64("HVST_HUMAN_DELAY_MIN_MS", "500")?;
    let human_delay_max_ms = parse_u64("HVST_HUMAN_DELAY_MAX_MS", "1500")?;
    if human_delay_min_ms > human_delay_max_ms {
        return Err(invalid(
            "HVST_HUMAN_DELAY_MAX_MS",
            format!("must be >= HVST_HUMAN_DELAY_MIN_MS ({human_delay_min_ms})"),
        ));
    }

    let diagnostics_dir = PathBuf::from(or_default("HVST_DIAGNOSTICS_DIR", "./diagnostics"));

    let db_max_connections = parse_u32("HVST_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("HVST_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("HVST_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        base_url,
        city,
        headless,
        chrome_path,
        browser_ws_url,
        selectors_path,
        workers,
        nav_timeout_secs,
        target_deadline_secs,
        retry_max_attempts,
        retry_initial_delay_ms,
        retry_backoff_multiplier,
        scroll_max_attempts,
        scroll_no_growth_threshold,
        human_delay_min_ms,
        human_delay_max_ms,
        diagnostics_dir,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "HVST_ENV".to_string(),
            reason: format!("unknown environment {other:?}"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
