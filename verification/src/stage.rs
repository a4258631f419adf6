//! Time-bounded pipeline stages.
//!
//! Each stage runs on the blocking pool under its own budget. A stage that
//! writes must call [`StageDeadline::check`] immediately before its write; an
//! overrun then returns [`VerificationError::StageTimeout`] without committing.

use crate::error::VerificationError;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Geofence,
    Token,
    Face,
    Fraud,
    Policy,
    Session,
    Ledger,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Geofence => "geofence",
            Stage::Token => "token",
            Stage::Face => "face",
            Stage::Fraud => "fraud",
            Stage::Policy => "policy",
            Stage::Session => "session",
            Stage::Ledger => "ledger",
        })
    }
}

/// The instant by which a stage must have committed.
#[derive(Clone, Copy, Debug)]
pub struct StageDeadline {
    stage: Stage,
    at: Instant,
}

impl StageDeadline {
    pub fn new(stage: Stage, budget: Duration) -> Self {
        Self {
            stage,
            at: Instant::now() + budget,
        }
    }

    /// Fails once the budget is spent.
    pub fn check(&self) -> Result<(), VerificationError> {
        if Instant::now() >= self.at {
            return Err(VerificationError::StageTimeout(self.stage));
        }
        Ok(())
    }
}

/// Run `f` on the blocking pool, bounded by `budget`.
pub async fn run_stage<T, F>(stage: Stage, budget: Duration, f: F) -> Result<T, VerificationError>
where
    F: FnOnce(StageDeadline) -> Result<T, VerificationError> + Send + 'static,
    T: Send + 'static,
{
    let deadline = StageDeadline::new(stage, budget);
    match tokio::time::timeout(budget, tokio::task::spawn_blocking(move || f(deadline))).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(VerificationError::StageAborted {
            stage,
            reason: join_err.to_string(),
        }),
        Err(_) => {
            warn!(%stage, budget_ms = budget.as_millis() as u64, "stage timed out");
            Err(VerificationError::StageTimeout(stage))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_types::ErrorCode;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fast_stage_returns_value() {
        let v = run_stage(Stage::Fraud, Duration::from_secs(1), |_| Ok(7))
            .await
            .unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn slow_stage_times_out() {
        let err = run_stage(Stage::Face, Duration::from_millis(20), |_| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, VerificationError::StageTimeout(Stage::Face)));
        assert_eq!(err.code(), ErrorCode::StageTimeout);
    }

    #[tokio::test]
    async fn overrun_skips_the_commit() {
        let committed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&committed);
        let result = run_stage(Stage::Ledger, Duration::from_millis(20), move |deadline| {
            std::thread::sleep(Duration::from_millis(60));
            deadline.check()?;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(result.is_err());
        // Give the detached blocking task time to reach its deadline check.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!committed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_stage_is_reported_as_aborted() {
        let err = run_stage::<(), _>(Stage::Token, Duration::from_secs(1), |_| {
            panic!("boom")
        })
        .await
        .unwrap_err();
        assert!(matches!(err, VerificationError::StageAborted { stage: Stage::Token, .. }));
    }
}
