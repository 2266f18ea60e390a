/// Process-wide admission control
///
/// A fixed number of executions may be in flight. Admission is a single
/// compare-and-swap on an atomic counter; the returned slot gives the unit back
/// when dropped, so release happens exactly once on every exit path including
/// unwinding.
use crate::config::types::{EngineError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct AdmissionController {
    max: usize,
    in_flight: AtomicUsize,
}

impl AdmissionController {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            max,
            in_flight: AtomicUsize::new(0),
        })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Take one slot, or fail immediately with [`EngineError::Busy`]
    pub fn try_admit(self: &Arc<Self>) -> Result<AdmissionSlot> {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                return Err(EngineError::Busy(current));
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(AdmissionSlot {
                        controller: Arc::clone(self),
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }

    fn release(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "admission slot released twice");
    }
}

/// One unit of the concurrency budget
#[derive(Debug)]
pub struct AdmissionSlot {
    controller: Arc<AdmissionController>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.controller.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_rejects_at_ceiling() {
        let controller = AdmissionController::new(2);
        let a = controller.try_admit().unwrap();
        let _b = controller.try_admit().unwrap();
        assert_eq!(controller.in_flight(), 2);

        let err = controller.try_admit().unwrap_err();
        assert!(matches!(err, EngineError::Busy(2)));
        assert_eq!(controller.in_flight(), 2);

        drop(a);
        assert_eq!(controller.in_flight(), 1);
        assert!(controller.try_admit().is_ok());
    }

    #[test]
    fn test_release_on_panic() {
        let controller = AdmissionController::new(1);
        let c = Arc::clone(&controller);
        let result = thread::spawn(move || {
            let _slot = c.try_admit().unwrap();
            panic!("execution blew up");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(controller.in_flight(), 0);
    }

    #[test]
    fn test_never_exceeds_max_under_contention() {
        let controller = AdmissionController::new(4);
        let (tx, rx) = crossbeam_channel::unbounded();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let c = Arc::clone(&controller);
                let tx = tx.clone();
                thread::spawn(move || {
                    if let Ok(slot) = c.try_admit() {
                        tx.send(c.in_flight()).unwrap();
                        thread::sleep(std::time::Duration::from_millis(5));
                        drop(slot);
                    }
                })
            })
            .collect();
        drop(tx);

        for handle in handles {
            handle.join().unwrap();
        }
        for observed in rx.iter() {
            assert!(observed <= 4, "observed {} in flight", observed);
        }
        assert_eq!(controller.in_flight(), 0);
    }
}
