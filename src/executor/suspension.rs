//! Suspension broker
//!
//! The broker holds a one-shot watch. While armed, the first touch of an
//! unsettled pending value fires the watch with a [`Suspension`] describing
//! where evaluation stopped, and hands the evaluator a receiver to wait on.
//! The engine re-arms the broker before it resumes the evaluation, so there
//! is at most one outstanding suspension per evaluation.

use std::cell::RefCell;

use serde::Serialize;
use tokio::sync::oneshot;

use super::pending::{PendingValue, Settlement};
use crate::error::EngineError;

/// One entry of the logical call stack at the moment of a suspension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackPosition {
    pub function_name: String,
    /// 1-indexed
    pub line: usize,
    /// 1-indexed
    pub column: usize,
}

/// Payload delivered to the watch when it fires
pub struct Suspension {
    pub pending: PendingValue,
    /// Innermost activation first
    pub positions: Vec<StackPosition>,
    /// Completing this resumes the suspended evaluation
    pub resume: oneshot::Sender<Settlement>,
}

impl std::fmt::Debug for Suspension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suspension")
            .field("pending", &self.pending)
            .field("positions", &self.positions)
            .finish()
    }
}

pub type OnTouch = Box<dyn FnOnce(Suspension)>;

enum Watch {
    Disarmed,
    Armed(OnTouch),
    Triggered,
}

/// What the checkpoint should do with an unsettled pending value
pub enum Touch {
    /// Wait on the receiver; the engine completes it after settlement
    Suspended(oneshot::Receiver<Settlement>),
    /// Nobody is watching; the value passes through untouched
    Unwatched,
}

pub struct SuspensionBroker {
    watch: RefCell<Watch>,
}

impl SuspensionBroker {
    pub fn new() -> Self {
        Self {
            watch: RefCell::new(Watch::Disarmed),
        }
    }

    /// Arm a one-shot watch, replacing any previous one
    pub fn arm(&self, on_touch: OnTouch) {
        *self.watch.borrow_mut() = Watch::Armed(on_touch);
    }

    pub fn disarm(&self) {
        *self.watch.borrow_mut() = Watch::Disarmed;
    }

    pub fn is_armed(&self) -> bool {
        matches!(&*self.watch.borrow(), Watch::Armed(_))
    }

    /// Report a touch of an unsettled pending value.
    ///
    /// `positions` is only evaluated when the watch actually fires.
    pub fn touch<F>(&self, pending: &PendingValue, positions: F) -> Result<Touch, EngineError>
    where
        F: FnOnce() -> Vec<StackPosition>,
    {
        let previous = std::mem::replace(&mut *self.watch.borrow_mut(), Watch::Triggered);
        match previous {
            Watch::Armed(on_touch) => {
                let (resume, receiver) = oneshot::channel();
                on_touch(Suspension {
                    pending: pending.clone(),
                    positions: positions(),
                    resume,
                });
                Ok(Touch::Suspended(receiver))
            }
            Watch::Disarmed => {
                *self.watch.borrow_mut() = Watch::Disarmed;
                Ok(Touch::Unwatched)
            }
            Watch::Triggered => Err(EngineError::DoubleSuspension),
        }
    }
}

impl Default for SuspensionBroker {
    fn default() -> Self {
        Self::new()
    }
}
