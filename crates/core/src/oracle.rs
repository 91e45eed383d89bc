//! Boundary between the core and the fallible analysis oracles.
//!
//! Every oracle call goes through [`consult`], which applies the timeout and
//! turns errors into data. Callers pick their documented fallback from the
//! returned [`OracleOutcome`].

use crate::policy::OracleTimeout;
use std::future::Future;

#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome<T> {
    Success(T),
    Failure(String),
}

impl<T> OracleOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            OracleOutcome::Success(value) => Some(value),
            OracleOutcome::Failure(_) => None,
        }
    }
}

/// Awaits an oracle call with a deadline. Failures are logged here, once.
pub async fn consult<T, F>(oracle: &'static str, timeout: OracleTimeout, call: F) -> OracleOutcome<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout.0, call).await {
        Ok(Ok(value)) => OracleOutcome::Success(value),
        Ok(Err(e)) => {
            tracing::warn!(oracle, "Oracle call failed: {:#}", e);
            OracleOutcome::Failure(format!("{e:#}"))
        }
        Err(_) => {
            tracing::warn!(oracle, "Oracle call timed out after {:?}", timeout.0);
            OracleOutcome::Failure(format!("timed out after {:?}", timeout.0))
        }
    }
}
