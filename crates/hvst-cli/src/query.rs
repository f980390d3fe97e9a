//! Read-only report commands.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Format an optional timestamp for display, returning `"-"` when `None`.
fn fmt_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

/// `R$ 19,90` style, `-` when absent.
fn fmt_price(price: Option<Decimal>) -> String {
    price.map_or_else(
        || "-".to_string(),
        |p| format!("R$ {p:.2}").replace('.', ","),
    )
}

/// Prints the most recent collection runs, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = hvst_db::list_collection_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no collection runs yet");
        return Ok(());
    }

    println!(
        "{:<7}{:<12}{:<11}{:<9}{:<9}{:<18}ERROR",
        "ID", "TYPE", "STATUS", "TARGETS", "RECORDS", "STARTED"
    );
    for run in &runs {
        println!(
            "{:<7}{:<12}{:<11}{:<9}{:<9}{:<18}{}",
            run.id,
            run.run_type,
            run.status,
            run.target_count,
            run.records_processed,
            fmt_time(run.started_at),
            run.error_message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Prints the observed price changes of one item, oldest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_history(pool: &sqlx::PgPool, item_id: i64) -> anyhow::Result<()> {
    let mut history = hvst_db::list_price_history(pool, item_id).await?;
    if history.is_empty() {
        println!("no price changes recorded for item {item_id}");
        return Ok(());
    }
    // DB returns DESC; reverse for chronological display.
    history.reverse();

    println!("{:<18}{:<14}ORIGINAL", "OBSERVED", "PRICE");
    for entry in &history {
        println!(
            "{:<18}{:<14}{}",
            fmt_time(Some(entry.observed_at)),
            fmt_price(Some(entry.price)),
            fmt_price(entry.original_price)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn prices_use_brazilian_decimal_comma() {
        assert_eq!(fmt_price(Some(Decimal::from_str("19.9").unwrap())), "R$ 19,90");
        assert_eq!(fmt_price(None), "-");
    }

    #[test]
    fn missing_time_is_a_dash() {
        assert_eq!(fmt_time(None), "-");
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 0).unwrap();
        assert_eq!(fmt_time(Some(at)), "2026-10-18 09:05");
    }
}
