//! Cross-task state for one territory run.
//!
//! Holds the accepted-names set (persisted names plus every name accepted
//! so far in this run) and the qualified-results accumulator. Each is
//! mutated only under its own lock, and every check-then-insert happens
//! inside a single critical section.

use std::collections::HashSet;

use tokio::sync::Mutex;

use icpqualifier_shared::QualifiedCompany;

/// Result of offering a qualified company to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Added. `limit_reached` is true when this entry filled the limit.
    Added { limit_reached: bool },
    /// Rejected: the limit was already reached.
    Full,
}

#[derive(Debug, Default)]
pub struct RunState {
    accepted_names: Mutex<HashSet<String>>,
    qualified: Mutex<Vec<QualifiedCompany>>,
}

impl RunState {
    /// Seed the dedup set with names already in the result store.
    pub fn with_known_names(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            accepted_names: Mutex::new(names.into_iter().collect()),
            qualified: Mutex::new(Vec::new()),
        }
    }

    /// Exact, case-sensitive membership check.
    pub async fn is_known(&self, name: &str) -> bool {
        self.accepted_names.lock().await.contains(name)
    }

    /// Atomically accept `name`. Returns `false` if it was already known;
    /// the first caller for a given name wins.
    pub async fn try_accept(&self, name: &str) -> bool {
        self.accepted_names.lock().await.insert(name.to_string())
    }

    /// Append a qualified company unless `limit` entries are already held.
    pub async fn admit_qualified(&self, company: QualifiedCompany, limit: Option<usize>) -> Admission {
        let mut qualified = self.qualified.lock().await;
        if limit.is_some_and(|l| qualified.len() >= l) {
            return Admission::Full;
        }
        qualified.push(company);
        Admission::Added {
            limit_reached: limit.is_some_and(|l| qualified.len() >= l),
        }
    }

    /// Drain the accumulator, in admission order.
    pub async fn take_qualified(&self) -> Vec<QualifiedCompany> {
        std::mem::take(&mut *self.qualified.lock().await)
    }
}
