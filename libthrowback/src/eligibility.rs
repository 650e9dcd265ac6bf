//! Eligibility filtering
//!
//! A set is eligible when it has never been posted, or when at least
//! `threshold_days` have elapsed since its most recent post on any
//! platform. The boundary is inclusive and measured as an exact duration.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, ThrowbackError};
use crate::history::HistoryLedger;
use crate::types::ThrowbackSet;

/// Compute the sets that may be posted at `now`
///
/// When `override_name` is given, the single set with exactly that name is
/// returned regardless of history.
///
/// # Errors
///
/// - `SetNotFound` if `override_name` matches no set
/// - `NoEligibleSets` if every set was posted within the threshold
pub fn eligible<'a>(
    sets: &'a [ThrowbackSet],
    ledger: &HistoryLedger,
    threshold_days: u32,
    now: DateTime<Utc>,
    override_name: Option<&str>,
) -> Result<Vec<&'a ThrowbackSet>> {
    if let Some(name) = override_name {
        let chosen = sets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ThrowbackError::SetNotFound(name.to_string()))?;
        if ledger.most_recent_timestamp(&chosen.name).is_some() {
            tracing::info!("Override '{}' bypasses the eligibility threshold", chosen.name);
        }
        return Ok(vec![chosen]);
    }

    let threshold = Duration::days(i64::from(threshold_days));
    let eligible: Vec<&ThrowbackSet> = sets
        .iter()
        .filter(|set| match ledger.most_recent_timestamp(&set.name) {
            None => true,
            Some(last) => now.signed_duration_since(last) >= threshold,
        })
        .collect();

    tracing::debug!(
        "{} of {} sets eligible (threshold_days={})",
        eligible.len(),
        sets.len(),
        threshold_days
    );

    if eligible.is_empty() {
        return Err(ThrowbackError::NoEligibleSets { threshold_days });
    }
    Ok(eligible)
}
