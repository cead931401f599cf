//! Request-unit budget for one query operation

use std::sync::Mutex;

use crate::core::{ClientError, ClientResult};
use crate::observability::Event;

/// Request units consumed by one operation, against an optional cap.
///
/// Shared by every producer of a query so that charges from all ranges
/// count against the same cap.
#[derive(Debug, Default)]
pub struct RequestBudget {
    cap: Option<f64>,
    consumed: Mutex<f64>,
}

impl RequestBudget {
    pub fn new(cap: Option<f64>) -> Self {
        Self {
            cap,
            consumed: Mutex::new(0.0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn cap(&self) -> Option<f64> {
        self.cap
    }

    pub fn consumed(&self) -> f64 {
        self.consumed.lock().map(|c| *c).unwrap_or(0.0)
    }

    /// Start a new operation against the same cap.
    pub fn reset(&self) {
        if let Ok(mut consumed) = self.consumed.lock() {
            *consumed = 0.0;
        }
    }

    pub fn charge(&self, request_units: f64) {
        if let Ok(mut consumed) = self.consumed.lock() {
            *consumed += request_units;
        }
    }

    /// Fraction of the cap still available; 1.0 when uncapped.
    pub fn remaining_fraction(&self) -> f64 {
        match self.cap {
            Some(cap) if cap > 0.0 => ((cap - self.consumed()) / cap).max(0.0),
            Some(_) => 0.0,
            None => 1.0,
        }
    }

    /// Fails once consumption has passed the cap. Checked before each fetch.
    pub fn check(&self) -> ClientResult<()> {
        let Some(cap) = self.cap else {
            return Ok(());
        };
        let consumed = self.consumed();
        if consumed > cap {
            tracing::info!(event = %Event::BudgetExceeded, consumed, cap, "request unit cap reached");
            return Err(ClientError::budget_exceeded(consumed, cap, Vec::new()));
        }
        Ok(())
    }

    pub fn exceeded_error(&self) -> ClientError {
        ClientError::budget_exceeded(self.consumed(), self.cap.unwrap_or(0.0), Vec::new())
    }
}
