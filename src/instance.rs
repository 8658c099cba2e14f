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

//! One keyboard session: the engine plus everything the bridge created for
//! it in the compositor.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::mem;
use std::ops::ControlFlow;
use std::rc::Rc;
use std::rc::Weak;
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::engine::Engine;
use crate::engine::EngineHost;
use crate::engine::LanguageSelection;
use crate::engine::RulesNames;
use crate::engine::TimerId;
use crate::engine::View;
use crate::geometry::Rectangle;
use crate::geometry::Size;
use crate::grab::GrabOverlay;
use crate::grab::GrabState;
use crate::host::HostServices;
use crate::input_sources::GroupResolver;
use crate::language_popup::LanguagePopup;
use crate::monitors::MonitorGeometry;
use crate::prelude::*;
use crate::scheduler::IdleHandle;
use crate::scheduler::TimeoutHandle;
use crate::signal::Subscription;
use crate::view_registry::ViewRegistry;
use crate::virtual_input::VirtualKeyboard;

pub struct Instance {
    me: Weak<Instance>,
    services: HostServices,
    config: BridgeConfig,
    engine: RefCell<Option<Rc<dyn Engine>>>,

    keyboard: VirtualKeyboard,
    geometry: MonitorGeometry,
    groups: GroupResolver,
    views: ViewRegistry,
    grab: RefCell<GrabOverlay>,
    popup: LanguagePopup,

    host_subs: RefCell<Vec<Subscription>>,
    timers: RefCell<BTreeMap<TimerId, TimeoutHandle>>,
    idles: RefCell<BTreeMap<u64, IdleHandle>>,
    next_callback_id: Cell<u64>,
    started: Cell<bool>,
    destroyed: Cell<bool>,
}

impl Instance {
    /// Creates the compositor-side objects and subscribes to the host. The
    /// engine isn't started until [`Instance::start`].
    pub fn new(services: HostServices, engine: Rc<dyn Engine>, config: BridgeConfig) -> Rc<Self> {
        Rc::new_cyclic(|me: &Weak<Self>| {
            let groups = GroupResolver::new(
                services.input_sources.clone(),
                services.xkb_info.clone(),
                services.input_methods.clone(),
            );

            let mut host_subs = Vec::new();
            {
                let me = me.clone();
                host_subs.extend(groups.watch(Rc::new(move || {
                    if let Some(instance) = me.upgrade() {
                        instance.notify_group_changed();
                    }
                })));
            }
            host_subs.push(
                services
                    .monitors
                    .connect_monitors_changed(Box::new(|| debug!("monitors changed"))),
            );

            Self {
                me: me.clone(),
                keyboard: VirtualKeyboard::new(services.shell.clone()),
                geometry: MonitorGeometry::new(services.monitors.clone(), services.shell.clone()),
                groups,
                views: ViewRegistry::new(services.shell.clone()),
                grab: RefCell::new(GrabOverlay::new(
                    &*services.shell,
                    config.grab_overlay_tint,
                )),
                popup: LanguagePopup::new(
                    services.shell.clone(),
                    services.scheduler.clone(),
                    config.popup_alignment,
                ),
                engine: RefCell::new(Some(engine)),
                host_subs: RefCell::new(host_subs),
                timers: RefCell::new(BTreeMap::new()),
                idles: RefCell::new(BTreeMap::new()),
                next_callback_id: Cell::new(0),
                started: Cell::new(false),
                destroyed: Cell::new(false),
                services,
                config,
            }
        })
    }

    /// Hands the engine its host and starts it. Only the first call does
    /// anything; later calls fail.
    pub fn start(&self) -> Result<()> {
        let engine = self
            .engine()
            .ok_or_else(|| anyhow!("instance already destroyed"))?;
        if self.started.replace(true) {
            bail!("instance already started");
        }
        let host: Weak<dyn EngineHost> = self.me.clone();
        engine.startup(host).context(loc!(), "engine startup failed")
    }

    pub fn engine(&self) -> Option<Rc<dyn Engine>> {
        self.engine.borrow().clone()
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn grab_state(&self) -> GrabState {
        self.grab.borrow().state()
    }

    pub fn language_popup(&self) -> &LanguagePopup {
        &self.popup
    }

    pub fn host_subscription_count(&self) -> usize {
        self.host_subs.borrow().len()
    }

    /// Engine timers and idle callbacks that haven't run or been stopped.
    pub fn pending_callback_count(&self) -> usize {
        let timers = self
            .timers
            .borrow()
            .values()
            .filter(|t| t.is_pending())
            .count();
        let idles = self
            .idles
            .borrow()
            .values()
            .filter(|i| i.is_pending())
            .count();
        timers + idles
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn notify_group_changed(&self) {
        if self.destroyed.get() {
            return;
        }
        if let Some(engine) = self.engine() {
            engine.on_group_changed();
        }
    }

    fn next_id(&self) -> u64 {
        let id = self.next_callback_id.get();
        self.next_callback_id.set(id + 1);
        id
    }

    /// Tears the session down: pending engine callbacks first, then host
    /// subscriptions, then the compositor objects, and the engine last.
    /// Calls after the first are no-ops.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        info!("destroying keyboard instance");

        let timers = mem::take(&mut *self.timers.borrow_mut());
        let idles = mem::take(&mut *self.idles.borrow_mut());
        debug!(
            "cancelling {} timers and {} idle callbacks",
            timers.len(),
            idles.len()
        );
        drop(timers);
        drop(idles);

        let host_subs = mem::take(&mut *self.host_subs.borrow_mut());
        drop(host_subs);

        self.popup.destroy();
        self.grab.borrow_mut().destroy();
        self.views.clear();

        let engine = self.engine.borrow_mut().take();
        if let Some(engine) = engine {
            engine.shutdown();
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl EngineHost for Instance {
    #[instrument(skip_all, level = "debug")]
    fn on_view_added(&self, view: Rc<dyn View>) {
        if self.destroyed.get() {
            return;
        }
        self.views.on_view_added(view);
    }

    #[instrument(skip_all, level = "debug")]
    fn on_view_removed(&self, view: &dyn View) {
        if self.destroyed.get() {
            return;
        }
        self.views.on_view_removed(view);
    }

    fn monitor_count(&self) -> usize {
        self.geometry.monitor_count()
    }

    #[instrument(skip(self), level = "trace")]
    fn monitor_geometry(&self, index: usize) -> Rectangle<f64> {
        self.geometry.monitor_geometry(index)
    }

    #[instrument(skip(self), level = "trace")]
    fn monitor_size_mm(&self, index: usize) -> Size<f64> {
        self.geometry.monitor_size_mm(index)
    }

    #[instrument(skip(self), level = "trace")]
    fn monitor_workarea(&self, index: usize) -> Rectangle<f64> {
        self.geometry.monitor_workarea(index)
    }

    fn monitor_at_active_window(&self) -> usize {
        self.geometry.monitor_at_active_window()
    }

    fn monitor_at_view(&self, view: &dyn View) -> usize {
        match self.views.get_actor_of_view(view) {
            Some(actor) => self.geometry.monitor_at_actor(&*actor),
            None => {
                debug!("monitor_at_view: no actor for view {:?}", view.name());
                0
            },
        }
    }

    fn primary_monitor(&self) -> usize {
        self.geometry.primary_monitor()
    }

    fn screen_geometry(&self) -> Rectangle<f64> {
        self.geometry.screen_geometry()
    }

    #[instrument(skip(self), level = "debug", ret)]
    fn current_group(&self) -> u32 {
        self.groups.current_group()
    }

    #[instrument(skip(self), level = "debug", ret)]
    fn current_rules_names(&self) -> RulesNames {
        self.groups.current_rules_names()
    }

    fn send_keyval_event(&self, keyval: u32, pressed: bool) {
        if self.destroyed.get() {
            return;
        }
        self.keyboard.send_keyval(keyval, pressed);
    }

    fn send_keycode_event(&self, keycode: u32, pressed: bool) {
        if self.destroyed.get() {
            return;
        }
        self.keyboard.send_keycode(keycode, pressed);
    }

    #[instrument(skip(self), level = "debug")]
    fn grab_pointer(&self) {
        self.grab.borrow().grab();
    }

    #[instrument(skip(self), level = "debug")]
    fn ungrab_pointer(&self) {
        self.grab.borrow().ungrab();
    }

    #[instrument(skip(self, view), level = "debug")]
    fn show_language_selection(
        &self,
        view: &dyn View,
        rect: Rectangle<f64>,
        selection: LanguageSelection,
    ) {
        if self.destroyed.get() {
            return;
        }
        let Some(actor) = self.views.get_actor_of_view(view) else {
            protocol_violation(
                loc!(),
                format!("language selection for unknown view {:?}", view.name()),
            );
            return;
        };
        let Some(engine) = self.engine() else {
            return;
        };
        self.popup.show(&engine, &actor, rect, &selection);
    }

    #[instrument(skip(self, callback), level = "debug")]
    fn start_timer(
        &self,
        interval: Duration,
        mut callback: Box<dyn FnMut() -> bool>,
    ) -> Option<TimerId> {
        if self.destroyed.get() {
            return None;
        }
        let id = TimerId(self.next_id());
        let me = self.me.clone();
        let handle = self
            .services
            .scheduler
            .timeout_add(
                "engine timer",
                interval,
                Box::new(move || {
                    if callback() {
                        return ControlFlow::Continue(());
                    }
                    if let Some(instance) = me.upgrade() {
                        let handle = instance.timers.borrow_mut().remove(&id);
                        drop(handle);
                    }
                    ControlFlow::Break(())
                }),
            )
            .log(loc!())
            .ok()?;
        self.timers.borrow_mut().insert(id, handle);
        Some(id)
    }

    #[instrument(skip(self), level = "debug")]
    fn stop_timer(&self, id: TimerId) {
        let handle = self.timers.borrow_mut().remove(&id);
        match handle {
            Some(handle) => handle.cancel(),
            None => debug!("timer {id:?} already finished"),
        }
    }

    fn idle_run(&self, callback: Box<dyn FnOnce()>) {
        if self.destroyed.get() {
            return;
        }
        let id = self.next_id();
        let me = self.me.clone();
        let handle = self.services.scheduler.idle_add(
            "engine idle",
            Box::new(move || {
                if let Some(instance) = me.upgrade() {
                    let handle = instance.idles.borrow_mut().remove(&id);
                    drop(handle);
                }
                callback();
            }),
        );
        self.idles.borrow_mut().insert(id, handle);
    }

    fn double_click_time(&self) -> Duration {
        self.services
            .shell
            .double_click_time()
            .map(|ms| Duration::from_millis(ms.into()))
            .unwrap_or_else(|| self.config.double_click_time())
    }

    fn drag_threshold(&self) -> f64 {
        self.services
            .shell
            .drag_threshold()
            .unwrap_or(self.config.drag_threshold)
    }

    fn is_composited(&self) -> bool {
        true
    }
}
