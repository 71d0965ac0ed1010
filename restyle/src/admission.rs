//! Request admission against a fixed concurrency ceiling.
//!
//! The counter and the check are a single atomic step: two racing
//! admissions can never both slip past the ceiling. Capacity is returned
//! through [`SlotPermit`], which releases exactly once: explicitly via
//! `release()`, or on drop as a backstop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Rejection from [`AdmissionController::try_admit`] when the ceiling is
/// reached. Carries enough state for the transport to synthesize a wait
/// estimate. No real queue exists; rejection is immediate.
#[derive(Debug, Clone, thiserror::Error)]
#[error("at capacity ({active}/{ceiling} slots in use)")]
pub struct CapacityExceeded {
    pub active: usize,
    pub ceiling: usize,
}

impl CapacityExceeded {
    /// Position a caller *would* hold if a queue existed. The queue is never
    /// populated, so this is always 1.
    pub fn queue_position(&self) -> usize {
        1
    }

    /// Estimated wait in minutes, at ~3 minutes per queued request.
    pub fn estimated_wait_minutes(&self) -> usize {
        self.queue_position() * 3
    }
}

/// Tracks in-flight transform requests against a fixed ceiling.
#[derive(Debug)]
pub struct AdmissionController {
    active: AtomicUsize,
    ceiling: usize,
}

impl AdmissionController {
    pub fn new(ceiling: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            ceiling,
        })
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.ceiling.saturating_sub(self.active())
    }

    /// Admit one request, or reject if the ceiling is reached.
    pub fn try_admit(self: &Arc<Self>) -> Result<SlotPermit, CapacityExceeded> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.ceiling {
                return Err(CapacityExceeded {
                    active: current,
                    ceiling: self.ceiling,
                });
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        Ok(SlotPermit {
            controller: Arc::clone(self),
            released: AtomicBool::new(false),
        })
    }
}

/// One unit of admission capacity held by an in-flight request.
#[derive(Debug)]
pub struct SlotPermit {
    controller: Arc<AdmissionController>,
    released: AtomicBool,
}

impl SlotPermit {
    /// Release the slot. Idempotent: the first call decrements the counter,
    /// any later call is a no-op.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.controller.active.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_ceiling_then_rejects() {
        let controller = AdmissionController::new(2);

        let p1 = controller.try_admit().unwrap();
        let p2 = controller.try_admit().unwrap();
        assert_eq!(controller.active(), 2);
        assert_eq!(controller.available(), 0);

        let rejected = controller.try_admit();
        assert!(rejected.is_err());
        let err = rejected.unwrap_err();
        assert_eq!(err.ceiling, 2);
        assert_eq!(err.queue_position(), 1);
        assert_eq!(err.estimated_wait_minutes(), 3);

        drop(p1);
        drop(p2);
        assert_eq!(controller.active(), 0);
    }

    #[test]
    fn release_frees_a_slot_for_the_next_caller() {
        let controller = AdmissionController::new(1);

        let permit = controller.try_admit().unwrap();
        assert!(controller.try_admit().is_err());

        permit.release();
        assert!(controller.try_admit().is_ok());
    }

    #[test]
    fn double_release_decrements_once() {
        let controller = AdmissionController::new(2);

        let _held = controller.try_admit().unwrap();
        let permit = controller.try_admit().unwrap();
        assert_eq!(controller.active(), 2);

        permit.release();
        permit.release();
        assert_eq!(controller.active(), 1);

        // Drop after explicit release must not decrement again.
        drop(permit);
        assert_eq!(controller.active(), 1);
    }

    #[test]
    fn drop_releases_without_explicit_call() {
        let controller = AdmissionController::new(1);
        {
            let _permit = controller.try_admit().unwrap();
            assert_eq!(controller.active(), 1);
        }
        assert_eq!(controller.active(), 0);
    }

    #[test]
    fn concurrent_admissions_never_exceed_ceiling() {
        let controller = AdmissionController::new(20);
        let admitted = std::sync::Mutex::new(Vec::new());

        std::thread::scope(|s| {
            for _ in 0..50 {
                s.spawn(|| {
                    if let Ok(permit) = controller.try_admit() {
                        admitted.lock().unwrap().push(permit);
                    }
                });
            }
        });

        let permits = admitted.into_inner().unwrap();
        assert_eq!(permits.len(), 20);
        assert_eq!(controller.active(), 20);

        drop(permits);
        assert_eq!(controller.active(), 0);
    }
}
