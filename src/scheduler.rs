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

//! Deferred work on the compositor's event loop.
//!
//! The event loop does not cancel callbacks when the object that scheduled
//! them goes away, so every idle and timeout hands back a handle that cancels
//! on drop. Handles may be dropped from inside their own callback and after
//! the callback already ran.

use std::cell::Cell;
use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;
use std::time::Duration;

use calloop::LoopHandle;
use calloop::timer::TimeoutAction;
use calloop::timer::Timer;

use crate::prelude::*;

pub trait Scheduler {
    /// Runs `callback` once, on a later turn of the loop.
    fn idle_add(&self, name: &'static str, callback: Box<dyn FnOnce()>) -> IdleHandle;

    /// Runs `callback` every `interval` until it returns
    /// `ControlFlow::Break` or the handle is cancelled.
    fn timeout_add(
        &self,
        name: &'static str,
        interval: Duration,
        callback: Box<dyn FnMut() -> ControlFlow<()>>,
    ) -> Result<TimeoutHandle>;
}

#[derive(Debug, Default)]
struct CallbackState {
    running: Cell<bool>,
    done: Cell<bool>,
}

pub struct IdleHandle {
    name: &'static str,
    state: Rc<CallbackState>,
    cancel: Option<Box<dyn FnOnce()>>,
}

impl IdleHandle {
    /// Wraps `callback` so that it marks the returned handle as spent when it
    /// runs. `cancel` is what the event loop needs to drop the callback
    /// before it ran.
    pub fn wrap(
        name: &'static str,
        callback: Box<dyn FnOnce()>,
    ) -> (Self, impl FnOnce() + 'static) {
        let state = Rc::new(CallbackState::default());
        let wrapped = {
            let state = state.clone();
            move || {
                if state.done.replace(true) {
                    return;
                }
                trace!("running idle {name}");
                callback();
            }
        };
        (
            Self {
                name,
                state,
                cancel: None,
            },
            wrapped,
        )
    }

    pub fn set_canceller(&mut self, cancel: impl FnOnce() + 'static) {
        self.cancel = Some(Box::new(cancel));
    }

    pub fn is_pending(&self) -> bool {
        !self.state.done.get()
    }

    pub fn cancel(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if self.state.done.replace(true) {
            return;
        }
        trace!("cancelling idle {}", self.name);
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for IdleHandle {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for IdleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleHandle")
            .field("name", &self.name)
            .field("pending", &self.is_pending())
            .finish()
    }
}

pub struct TimeoutHandle {
    name: &'static str,
    state: Rc<CallbackState>,
    remove: Option<Box<dyn FnOnce()>>,
}

impl TimeoutHandle {
    pub fn is_pending(&self) -> bool {
        !self.state.done.get()
    }

    pub fn cancel(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if self.state.done.replace(true) {
            return;
        }
        trace!("cancelling timeout {}", self.name);
        // Removing a source from inside its own dispatch is left to the
        // callback wrapper, which sees `done` and asks the loop to drop it.
        if self.state.running.get() {
            return;
        }
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for TimeoutHandle {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for TimeoutHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutHandle")
            .field("name", &self.name)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Schedules onto a calloop event loop. The callbacks don't touch the loop's
/// shared data; bridge state is reached through the closures themselves.
pub struct LoopScheduler<D: 'static> {
    handle: LoopHandle<'static, D>,
}

impl<D: 'static> LoopScheduler<D> {
    pub fn new(handle: LoopHandle<'static, D>) -> Self {
        Self { handle }
    }
}

impl<D: 'static> Scheduler for LoopScheduler<D> {
    fn idle_add(&self, name: &'static str, callback: Box<dyn FnOnce()>) -> IdleHandle {
        let (mut handle, wrapped) = IdleHandle::wrap(name, callback);
        let idle = self.handle.insert_idle(move |_| wrapped());
        handle.set_canceller(move || idle.cancel());
        handle
    }

    fn timeout_add(
        &self,
        name: &'static str,
        interval: Duration,
        mut callback: Box<dyn FnMut() -> ControlFlow<()>>,
    ) -> Result<TimeoutHandle> {
        let state = Rc::new(CallbackState::default());
        let token = {
            let state = state.clone();
            self.handle
                .insert_source(Timer::from_duration(interval), move |_, _, _| {
                    if state.done.get() {
                        return TimeoutAction::Drop;
                    }
                    state.running.set(true);
                    let flow = callback();
                    state.running.set(false);
                    if flow.is_break() {
                        state.done.set(true);
                    }
                    if state.done.get() {
                        trace!("timeout {name} finished");
                        TimeoutAction::Drop
                    } else {
                        TimeoutAction::ToDuration(interval)
                    }
                })
                .map_err(|e| anyhow!("insert_source(timer {name}) failed: {e}"))?
        };

        let loop_handle = self.handle.clone();
        Ok(TimeoutHandle {
            name,
            state,
            remove: Some(Box::new(move || loop_handle.remove(token))),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use calloop::EventLoop;

    use super::*;

    fn dispatch(event_loop: &mut EventLoop<'static, ()>) {
        event_loop
            .dispatch(Some(Duration::ZERO), &mut ())
            .unwrap();
    }

    #[test]
    fn idle_runs_once_on_dispatch() {
        let mut event_loop = EventLoop::<()>::try_new().unwrap();
        let scheduler = LoopScheduler::new(event_loop.handle());
        let calls = Rc::new(Cell::new(0));

        let handle = {
            let calls = calls.clone();
            scheduler.idle_add("test", Box::new(move || calls.set(calls.get() + 1)))
        };
        assert!(handle.is_pending());
        assert_eq!(calls.get(), 0);

        dispatch(&mut event_loop);
        assert_eq!(calls.get(), 1);
        assert!(!handle.is_pending());

        dispatch(&mut event_loop);
        assert_eq!(calls.get(), 1);
        // Dropping a spent handle must not touch the loop.
        drop(handle);
    }

    #[test]
    fn cancelled_idle_never_runs() {
        let mut event_loop = EventLoop::<()>::try_new().unwrap();
        let scheduler = LoopScheduler::new(event_loop.handle());
        let calls = Rc::new(Cell::new(0));

        let handle = {
            let calls = calls.clone();
            scheduler.idle_add("test", Box::new(move || calls.set(calls.get() + 1)))
        };
        handle.cancel();
        dispatch(&mut event_loop);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn idle_may_drop_its_own_handle() {
        let mut event_loop = EventLoop::<()>::try_new().unwrap();
        let scheduler = LoopScheduler::new(event_loop.handle());
        let slot: Rc<RefCell<Option<IdleHandle>>> = Rc::new(RefCell::new(None));

        let handle = {
            let slot = slot.clone();
            scheduler.idle_add(
                "self-drop",
                Box::new(move || {
                    slot.borrow_mut().take();
                }),
            )
        };
        *slot.borrow_mut() = Some(handle);
        dispatch(&mut event_loop);
        assert!(slot.borrow().is_none());
    }

    #[test]
    fn timeout_repeats_until_break() {
        let mut event_loop = EventLoop::<()>::try_new().unwrap();
        let scheduler = LoopScheduler::new(event_loop.handle());
        let calls = Rc::new(Cell::new(0));

        let handle = {
            let calls = calls.clone();
            scheduler
                .timeout_add(
                    "test",
                    Duration::ZERO,
                    Box::new(move || {
                        calls.set(calls.get() + 1);
                        if calls.get() == 3 {
                            ControlFlow::Break(())
                        } else {
                            ControlFlow::Continue(())
                        }
                    }),
                )
                .unwrap()
        };

        for _ in 0..10 {
            dispatch(&mut event_loop);
        }
        assert_eq!(calls.get(), 3);
        assert!(!handle.is_pending());
    }

    #[test]
    fn cancelled_timeout_never_runs() {
        let mut event_loop = EventLoop::<()>::try_new().unwrap();
        let scheduler = LoopScheduler::new(event_loop.handle());
        let calls = Rc::new(Cell::new(0));

        let handle = {
            let calls = calls.clone();
            scheduler
                .timeout_add(
                    "test",
                    Duration::ZERO,
                    Box::new(move || {
                        calls.set(calls.get() + 1);
                        ControlFlow::Continue(())
                    }),
                )
                .unwrap()
        };
        drop(handle);
        dispatch(&mut event_loop);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn timeout_cancelled_from_its_own_callback_stops() {
        let mut event_loop = EventLoop::<()>::try_new().unwrap();
        let scheduler = LoopScheduler::new(event_loop.handle());
        let slot: Rc<RefCell<Option<TimeoutHandle>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0));

        let handle = {
            let slot = slot.clone();
            let calls = calls.clone();
            scheduler
                .timeout_add(
                    "self-cancel",
                    Duration::ZERO,
                    Box::new(move || {
                        calls.set(calls.get() + 1);
                        slot.borrow_mut().take();
                        ControlFlow::Continue(())
                    }),
                )
                .unwrap()
        };
        *slot.borrow_mut() = Some(handle);

        for _ in 0..5 {
            dispatch(&mut event_loop);
        }
        assert_eq!(calls.get(), 1);
    }
}
