// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Single-threaded notifications with scoped subscriptions.
//!
//! Every host notification the bridge listens to hands back a
//! [`Subscription`]. Dropping it (or calling [`Subscription::close`])
//! disconnects the handler exactly once, so teardown is a matter of dropping
//! the handles in the right order.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::rc::Weak;

use crate::prelude::*;

type Handler<T, R> = Rc<RefCell<dyn FnMut(&T) -> R>>;

struct Slots<T, R> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T, R>)>,
}

/// A list of handlers invoked in connection order.
///
/// Handlers may connect or disconnect (themselves included) while the signal
/// is being emitted. A handler that re-enters its own emission is skipped.
pub struct Signal<T, R = ()> {
    slots: Rc<RefCell<Slots<T, R>>>,
}

impl<T: 'static, R: 'static> Signal<T, R> {
    pub fn new() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Slots {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    pub fn connect<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&T) -> R + 'static,
    {
        let id = {
            let mut slots = self.slots.borrow_mut();
            let id = slots.next_id;
            slots.next_id += 1;
            let handler: Handler<T, R> = Rc::new(RefCell::new(handler));
            slots.handlers.push((id, handler));
            id
        };

        let slots: Weak<RefCell<Slots<T, R>>> = Rc::downgrade(&self.slots);
        Subscription::new(move || {
            if let Some(slots) = slots.upgrade() {
                slots.borrow_mut().handlers.retain(|(i, _)| *i != id);
            }
        })
    }

    /// Calls every connected handler and collects their return values.
    pub fn emit(&self, arg: &T) -> Vec<R> {
        let handlers: Vec<(u64, Handler<T, R>)> = self.slots.borrow().handlers.clone();
        let mut results = Vec::with_capacity(handlers.len());
        for (id, handler) in handlers {
            // Disconnected by an earlier handler of this same emission.
            if !self.is_connected(id) {
                continue;
            }
            let Ok(mut handler) = handler.try_borrow_mut() else {
                warn!("signal handler {id} re-entered its own emission, skipping");
                continue;
            };
            results.push((&mut *handler)(arg));
        }
        results
    }

    pub fn handler_count(&self) -> usize {
        self.slots.borrow().handlers.len()
    }

    fn is_connected(&self, id: u64) -> bool {
        self.slots.borrow().handlers.iter().any(|(i, _)| *i == id)
    }
}

impl<T: 'static, R: 'static> Default for Signal<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> fmt::Debug for Signal<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.slots.borrow().handlers.len())
            .finish()
    }
}

/// Disconnects its handler when dropped.
#[must_use = "dropping a Subscription disconnects it immediately"]
pub struct Subscription {
    disconnect: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(disconnect: impl FnOnce() + 'static) -> Self {
        Self {
            disconnect: Some(Box::new(disconnect)),
        }
    }

    /// A subscription to a notification that never fires.
    pub fn detached() -> Self {
        Self { disconnect: None }
    }

    pub fn close(mut self) {
        self.disconnect_now();
    }

    fn disconnect_now(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.disconnect_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("connected", &self.disconnect.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn dropping_subscription_disconnects() {
        let signal = Signal::<u32>::new();
        let seen = Rc::new(Cell::new(0));

        let sub = {
            let seen = seen.clone();
            signal.connect(move |v| seen.set(seen.get() + v))
        };
        signal.emit(&2);
        assert_eq!(seen.get(), 2);
        assert_eq!(signal.handler_count(), 1);

        drop(sub);
        signal.emit(&2);
        assert_eq!(seen.get(), 2);
        assert_eq!(signal.handler_count(), 0);
    }

    #[test]
    fn close_is_equivalent_to_drop() {
        let signal = Signal::<()>::new();
        let sub = signal.connect(|_| {});
        sub.close();
        assert_eq!(signal.handler_count(), 0);
    }

    #[test]
    fn subscription_outliving_signal_is_harmless() {
        let signal = Signal::<()>::new();
        let sub = signal.connect(|_| {});
        drop(signal);
        drop(sub);
    }

    #[test]
    fn handler_can_disconnect_itself_during_emission() {
        let signal = Rc::new(Signal::<()>::new());
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0));

        let sub = {
            let slot = slot.clone();
            let calls = calls.clone();
            signal.connect(move |_| {
                calls.set(calls.get() + 1);
                slot.borrow_mut().take();
            })
        };
        *slot.borrow_mut() = Some(sub);

        signal.emit(&());
        signal.emit(&());
        assert_eq!(calls.get(), 1);
        assert_eq!(signal.handler_count(), 0);
    }

    #[test]
    fn handler_disconnected_mid_emission_is_not_called() {
        let signal = Signal::<()>::new();
        let second: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let second_calls = Rc::new(Cell::new(0));

        let _first = {
            let second = second.clone();
            signal.connect(move |_| {
                second.borrow_mut().take();
            })
        };
        *second.borrow_mut() = Some({
            let second_calls = second_calls.clone();
            signal.connect(move |_| second_calls.set(second_calls.get() + 1))
        });

        signal.emit(&());
        assert_eq!(second_calls.get(), 0);
    }

    #[test]
    fn emit_collects_results_in_connection_order() {
        let signal = Signal::<u32, u32>::new();
        let _a = signal.connect(|v| v + 1);
        let _b = signal.connect(|v| v * 10);
        assert_eq!(signal.emit(&3), vec![4, 30]);
    }
}
