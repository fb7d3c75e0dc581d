//! Pending values
//!
//! A [`PendingValue`] is an opaque handle on a result that does not exist yet.
//! It settles exactly once, either fulfilled or rejected. The result comes
//! from a [`Settler`] handed to an executor, or from a future that is driven
//! by whoever first waits for the settlement.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

use super::types::Value;

static NEXT_PENDING_ID: AtomicU64 = AtomicU64::new(1);

/// Final state of a pending value
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Fulfilled(Value),
    Rejected(Value),
}

impl Settlement {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settlement::Fulfilled(_))
    }
}

type SettleFuture = Pin<Box<dyn Future<Output = Result<Value, Value>>>>;

enum State {
    Pending(Option<SettleFuture>),
    Settled(Settlement),
}

struct Inner {
    id: u64,
    state: RefCell<State>,
    notify: Notify,
}

#[derive(Clone)]
pub struct PendingValue {
    inner: Rc<Inner>,
}

impl PendingValue {
    fn with_state(state: State) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: NEXT_PENDING_ID.fetch_add(1, Ordering::Relaxed),
                state: RefCell::new(state),
                notify: Notify::new(),
            }),
        }
    }

    /// Create a pending value and run `executor` with its settler right away
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Settler),
    {
        let (pending, settler) = Self::channel();
        executor(settler);
        pending
    }

    /// Unsettled pending value plus the handle that settles it
    pub fn channel() -> (Self, Settler) {
        let pending = Self::with_state(State::Pending(None));
        let settler = Settler {
            target: pending.clone(),
        };
        (pending, settler)
    }

    /// Pending value backed by a future. The future is polled only once
    /// someone waits on [`PendingValue::settled`].
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, Value>> + 'static,
    {
        Self::with_state(State::Pending(Some(Box::pin(future))))
    }

    pub fn resolved(value: Value) -> Self {
        Self::with_state(State::Settled(Settlement::Fulfilled(value)))
    }

    pub fn rejected(reason: Value) -> Self {
        Self::with_state(State::Settled(Settlement::Rejected(reason)))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.inner.state.borrow(), State::Settled(_))
    }

    pub fn settlement(&self) -> Option<Settlement> {
        match &*self.inner.state.borrow() {
            State::Settled(s) => Some(s.clone()),
            State::Pending(_) => None,
        }
    }

    /// First settlement wins; later calls are ignored
    fn settle(&self, settlement: Settlement) -> bool {
        {
            let mut state = self.inner.state.borrow_mut();
            if matches!(&*state, State::Settled(_)) {
                return false;
            }
            *state = State::Settled(settlement);
        }
        self.inner.notify.notify_waiters();
        true
    }

    fn take_future(&self) -> Option<SettleFuture> {
        match &mut *self.inner.state.borrow_mut() {
            State::Pending(fut) => fut.take(),
            State::Settled(_) => None,
        }
    }

    /// Wait for the settlement, driving the backing future if there is one
    pub async fn settled(&self) -> Settlement {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(settlement) = self.settlement() {
                return settlement;
            }
            if let Some(future) = self.take_future() {
                let settlement = match future.await {
                    Ok(v) => Settlement::Fulfilled(v),
                    Err(e) => Settlement::Rejected(e),
                };
                self.settle(settlement);
                continue;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for PendingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingValue")
            .field("id", &self.id())
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Write side of a pending value
#[derive(Clone)]
pub struct Settler {
    target: PendingValue,
}

impl Settler {
    pub fn resolve(&self, value: impl Into<Value>) -> bool {
        self.target.settle(Settlement::Fulfilled(value.into()))
    }

    pub fn reject(&self, reason: impl Into<Value>) -> bool {
        self.target.settle(Settlement::Rejected(reason.into()))
    }
}
