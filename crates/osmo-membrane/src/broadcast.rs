//! Observer broadcast for newly constructed wrappers
//!
//! Listeners run synchronously, in registration order, whenever a wrapper
//! finishes sealing. Flow control is an explicit tri-state returned by
//! each listener instead of flags on a shared message object: `Continue`
//! proceeds, `Stop` skips the remaining listeners silently, and `Fail`
//! skips them and propagates the error to the membrane caller. A panic
//! inside a listener is caught, logged, and does not stop the others.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use osmo_graph::{GraphError, GraphResult, Value};

use crate::domain::Domain;

/// Notification payload for a freshly built wrapper
#[derive(Clone, Debug)]
pub struct WrapperEvent {
    /// The wrapper as the target domain sees it
    pub wrapper: Value,
    /// The real value behind it
    pub real_value: Value,
    /// The domain the wrapper belongs to
    pub domain: Domain,
    /// Whether that domain is the value's origin domain
    pub is_origin_domain: bool,
}

/// Listener verdict
pub enum Broadcast {
    /// Proceed to the next listener
    Continue,
    /// Skip the remaining listeners, no error
    Stop,
    /// Skip the remaining listeners and propagate the error to the caller
    Fail(GraphError),
}

/// A wrapper-construction listener
pub type WrapperListener = Arc<dyn Fn(&WrapperEvent) -> Broadcast + Send + Sync>;

/// Ordered set of wrapper-construction listeners
#[derive(Default)]
pub struct ObserverSet {
    listeners: RwLock<Vec<WrapperListener>>,
}

impl ObserverSet {
    /// Create an empty observer set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; invocation order is registration order
    pub fn add_listener(&self, listener: WrapperListener) {
        self.listeners.write().push(listener);
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver an event to every listener, honoring each verdict
    pub fn broadcast(&self, event: &WrapperEvent) -> GraphResult<()> {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Broadcast::Continue) => {}
                Ok(Broadcast::Stop) => break,
                Ok(Broadcast::Fail(err)) => return Err(err),
                Err(_) => {
                    warn!(domain = %event.domain, "wrapper listener panicked; continuing");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmo_graph::GraphObject;
    use parking_lot::Mutex;

    fn event() -> WrapperEvent {
        let real = Value::object(GraphObject::ordinary());
        WrapperEvent {
            wrapper: real.clone(),
            real_value: real,
            domain: Domain::new("dry"),
            is_origin_domain: false,
        }
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let observers = ObserverSet::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            observers.add_listener(Arc::new(move |_| {
                log.lock().push(i);
                Broadcast::Continue
            }));
        }
        observers.broadcast(&event()).unwrap();
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_stop_skips_remaining() {
        let observers = ObserverSet::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = log.clone();
            observers.add_listener(Arc::new(move |_| {
                log.lock().push("first");
                Broadcast::Stop
            }));
        }
        {
            let log = log.clone();
            observers.add_listener(Arc::new(move |_| {
                log.lock().push("second");
                Broadcast::Continue
            }));
        }
        observers.broadcast(&event()).unwrap();
        assert_eq!(*log.lock(), vec!["first"]);
    }

    #[test]
    fn test_fail_propagates() {
        let observers = ObserverSet::new();
        observers.add_listener(Arc::new(|_| {
            Broadcast::Fail(GraphError::type_error("listener rejected"))
        }));
        let reached = Arc::new(Mutex::new(false));
        {
            let reached = reached.clone();
            observers.add_listener(Arc::new(move |_| {
                *reached.lock() = true;
                Broadcast::Continue
            }));
        }
        let err = observers.broadcast(&event()).unwrap_err();
        assert!(matches!(err, GraphError::TypeError(_)));
        assert!(!*reached.lock());
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let observers = ObserverSet::new();
        observers.add_listener(Arc::new(|_| panic!("listener bug")));
        let reached = Arc::new(Mutex::new(false));
        {
            let reached = reached.clone();
            observers.add_listener(Arc::new(move |_| {
                *reached.lock() = true;
                Broadcast::Continue
            }));
        }
        observers.broadcast(&event()).unwrap();
        assert!(*reached.lock());
    }
}
