//! Phase batches: run every unit, wait for all, keep every outcome.
//!
//! A build phase is a batch of independent per-file units (import, render,
//! publish, transform). Units run on the rayon pool; the phase completes only
//! when every unit has produced either a value or an error. Nothing
//! short-circuits: one failing file never cancels its siblings.
//!
//! Units return their results instead of mutating shared state, and the
//! engine applies them serially afterwards, so phase code needs no locks
//! around the node map.

use rayon::prelude::*;
use std::fmt;

/// Run `f` over every item in parallel and collect `(key, result)` pairs in
/// input order.
pub fn run_batch<I, T, E, K, F>(items: Vec<I>, key: K, f: F) -> Vec<(String, Result<T, E>)>
where
    I: Send,
    T: Send,
    E: Send,
    K: Fn(&I) -> String + Sync,
    F: Fn(I) -> Result<T, E> + Sync,
{
    items
        .into_par_iter()
        .map(|item| {
            let k = key(&item);
            (k, f(item))
        })
        .collect()
}

/// One failed unit of a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub key: String,
    pub message: String,
}

/// Outcome counts of one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub name: &'static str,
    pub succeeded: usize,
    pub skipped: usize,
    pub failures: Vec<Failure>,
}

impl PhaseReport {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn success(&mut self) {
        self.succeeded += 1;
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn fail(&mut self, key: impl Into<String>, error: impl fmt::Display) {
        self.failures.push(Failure {
            key: key.into(),
            message: error.to_string(),
        });
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ok", self.name, self.succeeded)?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        if !self.failures.is_empty() {
            write!(f, ", {} failed", self.failures.len())?;
        }
        Ok(())
    }
}
