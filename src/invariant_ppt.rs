//! Runtime invariants with contract-test bookkeeping.
//!
//! Rules that the installer must never break (e.g. "a comment line is never
//! handed to pip") are asserted where they are enforced. Every assertion that
//! holds is recorded, so a test can later prove the rule was actually checked
//! on the code path it exercised.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use lazy_static::lazy_static;
use log::error;

lazy_static! {
    /// Descriptions of the invariants that have held at least once in this process.
    static ref CHECKED_INVARIANTS: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

/// Asserts that an installer invariant holds.
///
/// A violation is logged at `error` level. Debug and test builds panic on it
/// so that the broken rule surfaces immediately; release builds keep going,
/// since every stage after the bootstrap is allowed to degrade.
///
/// # Arguments
/// * `condition` - The result of the check.
/// * `description` - Human-readable rule, also the key used by [`contract_test`].
/// * `component` - Optional component tag (e.g. "Manifest", "Installer").
pub fn assert_invariant(condition: bool, description: &str, component: Option<&str>) {
    if !condition {
        let msg = format!(
            "INVARIANT VIOLATION [{}]: {}",
            component.unwrap_or("General"),
            description
        );
        error!("{}", msg);

        if cfg!(debug_assertions) || cfg!(test) {
            panic!("{}", msg);
        }
    } else {
        CHECKED_INVARIANTS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(description.to_string());
    }
}

/// Verifies that each of `required_invariants` was asserted (and held) at least once.
///
/// Panics with the list of missing rules otherwise.
#[cfg(test)]
pub fn contract_test(context: &str, required_invariants: &[&str]) {
    // The guard must be released before panicking, or the registry stays poisoned.
    let missing: Vec<&str> = {
        let checked = CHECKED_INVARIANTS.lock().unwrap_or_else(PoisonError::into_inner);
        required_invariants
            .iter()
            .copied()
            .filter(|req| !checked.contains(*req))
            .collect()
    };

    if !missing.is_empty() {
        panic!(
            "Contract Test Failed for '{}'. The following invariants were NOT checked:\n{:#?}",
            context, missing
        );
    }
    log::info!("Contract Test Passed: {}", context);
}
