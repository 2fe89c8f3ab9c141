use crate::types::{FloodError, FloodResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation flag and deadline for a forcing evaluation.
///
/// Clones share the cancellation flag, so a clone handed to another thread
/// can stop an evaluation in progress.
#[derive(Debug, Clone)]
pub struct EvalControl {
    cancelled: Arc<AtomicBool>,
    started: Instant,
    deadline: Option<Instant>,
}

impl Default for EvalControl {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalControl {
    /// No deadline, not cancelled
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().bounded_by(Some(timeout))
    }

    /// Copy sharing the same flag, with the deadline tightened to `timeout`
    /// from now when that is earlier
    pub fn bounded_by(&self, timeout: Option<Duration>) -> Self {
        let mut bounded = self.clone();
        if let Some(timeout) = timeout {
            let candidate = Instant::now() + timeout;
            bounded.deadline = Some(match self.deadline {
                Some(existing) => existing.min(candidate),
                None => candidate,
            });
        }
        bounded
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Cheap poll used inside pixel loops
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// `Cancelled` or `Timeout` once either condition holds
    pub fn check(&self) -> FloodResult<()> {
        if self.is_cancelled() {
            return Err(FloodError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(FloodError::Timeout {
                    elapsed: now.duration_since(self.started),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_control_passes() {
        let control = EvalControl::new();
        assert!(control.check().is_ok());
        assert!(!control.should_stop());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let control = EvalControl::new();
        let handle = control.clone();
        handle.cancel();
        assert!(matches!(control.check(), Err(FloodError::Cancelled)));
    }

    #[test]
    fn test_zero_timeout_expires() {
        let control = EvalControl::with_timeout(Duration::ZERO);
        assert!(matches!(control.check(), Err(FloodError::Timeout { .. })));
    }

    #[test]
    fn test_bounded_by_keeps_earlier_deadline() {
        let tight = EvalControl::with_timeout(Duration::ZERO);
        let relaxed = tight.bounded_by(Some(Duration::from_secs(3600)));
        assert!(relaxed.should_stop());
    }
}
