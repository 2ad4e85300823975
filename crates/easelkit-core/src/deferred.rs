//! Single-settlement deferred results.
//!
//! `Deferred` is the one asynchronous primitive in the coordinator: a
//! clonable handle to a result that settles at most once. Both the engine
//! readiness broker and the surface registry hand these out so that any
//! number of interleaved callers observe the same outcome exactly once,
//! whether they subscribed before or after settlement.

use std::cell::RefCell;
use std::rc::Rc;

type Callback<T, E> = Box<dyn FnOnce(&Result<T, E>)>;

struct State<T, E> {
    outcome: Option<Result<T, E>>,
    waiters: Vec<Callback<T, E>>,
}

/// A clonable, single-threaded promise. Clones share the same settlement
/// state; settling any clone notifies every subscriber on every clone.
pub struct Deferred<T, E> {
    state: Rc<RefCell<State<T, E>>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Deferred<T, E> {
    /// Create an unsettled deferred.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                outcome: None,
                waiters: Vec::new(),
            })),
        }
    }

    /// Create a deferred that is already resolved.
    pub fn resolved(value: T) -> Self {
        let d = Self::new();
        d.resolve(value);
        d
    }

    /// Create a deferred that is already rejected.
    pub fn rejected(err: E) -> Self {
        let d = Self::new();
        d.reject(err);
        d
    }

    /// Resolve with a value. Returns false (and discards the value) if the
    /// deferred has already settled; settlement is monotonic.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject with an error. Returns false if already settled.
    pub fn reject(&self, err: E) -> bool {
        self.settle(Err(err))
    }

    fn settle(&self, outcome: Result<T, E>) -> bool {
        let waiters = {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.waiters)
        };
        // Callbacks run outside the borrow so they may subscribe, clone, or
        // inspect this deferred reentrantly.
        for waiter in waiters {
            waiter(&outcome);
        }
        true
    }

    /// Subscribe to the settlement. A subscriber attached after settlement
    /// is invoked immediately with the recorded outcome; one attached
    /// before is queued and invoked exactly once when settlement happens.
    pub fn subscribe(&self, callback: impl FnOnce(&Result<T, E>) + 'static) {
        let settled = self.state.borrow().outcome.clone();
        match settled {
            Some(outcome) => callback(&outcome),
            None => self.state.borrow_mut().waiters.push(Box::new(callback)),
        }
    }

    /// Whether the deferred has settled.
    pub fn is_settled(&self) -> bool {
        self.state.borrow().outcome.is_some()
    }

    /// A copy of the outcome, if settled.
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.state.borrow().outcome.clone()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn resolve_notifies_earlier_subscribers() {
        let d: Deferred<u32, String> = Deferred::new();
        let seen = Rc::new(Cell::new(0u32));

        for _ in 0..3 {
            let seen = seen.clone();
            d.subscribe(move |res| {
                if let Ok(v) = res {
                    seen.set(seen.get() + v);
                }
            });
        }

        assert!(d.resolve(7));
        assert_eq!(seen.get(), 21);
    }

    #[test]
    fn late_subscriber_fires_immediately() {
        let d: Deferred<u32, String> = Deferred::resolved(5);
        let seen = Rc::new(Cell::new(None));
        let seen2 = seen.clone();
        d.subscribe(move |res| seen2.set(res.clone().ok()));
        assert_eq!(seen.get(), Some(5));
    }

    #[test]
    fn second_settlement_is_discarded() {
        let d: Deferred<u32, String> = Deferred::new();
        assert!(d.resolve(1));
        assert!(!d.resolve(2));
        assert!(!d.reject("nope".to_string()));
        assert_eq!(d.peek(), Some(Ok(1)));
    }

    #[test]
    fn rejection_reaches_all_subscribers() {
        let d: Deferred<u32, String> = Deferred::new();
        let errors = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let errors = errors.clone();
            d.subscribe(move |res| {
                if res.is_err() {
                    errors.set(errors.get() + 1);
                }
            });
        }
        d.reject("boom".to_string());
        assert_eq!(errors.get(), 2);
    }

    #[test]
    fn subscriber_can_resubscribe_reentrantly() {
        let d: Deferred<u32, String> = Deferred::new();
        let hits = Rc::new(Cell::new(0));
        let d2 = d.clone();
        let hits2 = hits.clone();
        d.subscribe(move |_| {
            // Subscribing from inside a callback sees the settled state and
            // fires right away.
            let hits3 = hits2.clone();
            d2.subscribe(move |_| hits3.set(hits3.get() + 1));
        });
        d.resolve(1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn clones_share_settlement() {
        let d: Deferred<u32, String> = Deferred::new();
        let c = d.clone();
        d.resolve(9);
        assert!(c.is_settled());
        assert_eq!(c.peek(), Some(Ok(9)));
    }
}
