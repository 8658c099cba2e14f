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

//! An in-memory compositor and keyboard engine.
//!
//! Every mock records what the bridge did to it so tests and the replay tool
//! can inspect it afterwards. Notifications are plain [`Signal`]s that the
//! caller fires explicitly.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::rc::Weak;
use std::time::Duration;

use calloop::EventLoop;

use crate::engine::Engine;
use crate::engine::EngineHost;
use crate::engine::View;
use crate::geometry::Point;
use crate::geometry::Rectangle;
use crate::geometry::Size;
use crate::host::Actor;
use crate::host::ActorId;
use crate::host::ActorRole;
use crate::host::CursorType;
use crate::host::EngineDesc;
use crate::host::EventPropagation;
use crate::host::HostServices;
use crate::host::InputEvent;
use crate::host::InputMethodEngines;
use crate::host::InputSource;
use crate::host::InputSourceKind;
use crate::host::InputSourceManager;
use crate::host::KeyState;
use crate::host::LayoutInfo;
use crate::host::MenuActivateFn;
use crate::host::MenuItem;
use crate::host::MonitorInfo;
use crate::host::MonitorLayout;
use crate::host::PopupAnchor;
use crate::host::PopupAnimation;
use crate::host::PopupMenu;
use crate::host::PopupMenuManager;
use crate::host::Shell;
use crate::host::VirtualInputDevice;
use crate::host::XkbInfo;
use crate::prelude::*;
use crate::scheduler::LoopScheduler;
use crate::signal::Signal;
use crate::signal::Subscription;

pub struct MockActor {
    id: ActorId,
    role: ActorRole,
    reactive: Cell<bool>,
    visible: Cell<bool>,
    destroyed: Cell<bool>,
    background: Cell<Option<[u8; 4]>>,
    /// Translation and uniform scale.
    transform: Cell<(Point<f64>, f64)>,
    destroy_signal: Signal<()>,
    input_signal: Signal<InputEvent, EventPropagation>,
}

impl MockActor {
    /// Visible, not reactive, identity transform.
    pub fn new(id: ActorId, role: ActorRole) -> Rc<Self> {
        Rc::new(Self {
            id,
            role,
            reactive: Cell::new(false),
            visible: Cell::new(true),
            destroyed: Cell::new(false),
            background: Cell::new(None),
            transform: Cell::new((Point::new(0.0, 0.0), 1.0)),
            destroy_signal: Signal::new(),
            input_signal: Signal::new(),
        })
    }

    pub fn set_transform(&self, translation: Point<f64>, scale: f64) {
        self.transform.set((translation, scale));
    }

    /// Delivers `event` the way the stage would, returning what each
    /// handler answered. Destroyed actors get no events.
    pub fn deliver(&self, event: InputEvent) -> Vec<EventPropagation> {
        if self.destroyed.get() {
            return Vec::new();
        }
        self.input_signal.emit(&event)
    }

    pub fn background_color(&self) -> Option<[u8; 4]> {
        self.background.get()
    }

    pub fn input_handler_count(&self) -> usize {
        self.input_signal.handler_count()
    }

    pub fn destroy_handler_count(&self) -> usize {
        self.destroy_signal.handler_count()
    }
}

impl Actor for MockActor {
    fn id(&self) -> ActorId {
        self.id
    }

    fn role(&self) -> ActorRole {
        self.role
    }

    fn set_reactive(&self, reactive: bool) {
        self.reactive.set(reactive);
    }

    fn is_reactive(&self) -> bool {
        self.reactive.get()
    }

    fn show(&self) {
        if !self.destroyed.get() {
            self.visible.set(true);
        }
    }

    fn hide(&self) {
        self.visible.set(false);
    }

    fn is_visible(&self) -> bool {
        self.visible.get()
    }

    fn set_background_color(&self, rgba: [u8; 4]) {
        self.background.set(Some(rgba));
    }

    fn apply_transform_to_point(&self, point: Point<f64>) -> Point<f64> {
        let (translation, scale) = self.transform.get();
        Point::new(
            translation.x + scale * point.x,
            translation.y + scale * point.y,
        )
    }

    fn connect_destroy(&self, mut handler: Box<dyn FnMut()>) -> Subscription {
        self.destroy_signal.connect(move |_| handler())
    }

    fn connect_input_event(
        &self,
        mut handler: Box<dyn FnMut(&InputEvent) -> EventPropagation>,
    ) -> Subscription {
        self.input_signal.connect(move |event| handler(event))
    }

    fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.visible.set(false);
        self.destroy_signal.emit(&());
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum KeyEvent {
    Keyval {
        time_ms: u32,
        keyval: u32,
        state: KeyState,
    },
    Keycode {
        time_ms: u32,
        keycode: u32,
        state: KeyState,
    },
}

pub struct MockVirtualKeyboard {
    events: Rc<RefCell<Vec<KeyEvent>>>,
}

impl VirtualInputDevice for MockVirtualKeyboard {
    fn notify_keyval(&self, time_ms: u32, keyval: u32, state: KeyState) {
        self.events.borrow_mut().push(KeyEvent::Keyval {
            time_ms,
            keyval,
            state,
        });
    }

    fn notify_key(&self, time_ms: u32, keycode: u32, state: KeyState) {
        self.events.borrow_mut().push(KeyEvent::Keycode {
            time_ms,
            keycode,
            state,
        });
    }
}

pub struct MockMenu {
    anchor: PopupAnchor,
    items: Vec<MenuItem<usize>>,
    on_activate: MenuActivateFn,
    actor: Rc<MockActor>,
    open: Cell<bool>,
    last_animation: Cell<Option<PopupAnimation>>,
    destroyed: Cell<bool>,
    closed: Signal<()>,
}

impl MockMenu {
    pub fn anchor(&self) -> PopupAnchor {
        self.anchor
    }

    pub fn items(&self) -> &[MenuItem<usize>] {
        &self.items
    }

    /// The labels of all actions, submenus flattened, in menu order.
    pub fn labels(&self) -> Vec<String> {
        fn collect(items: &[MenuItem<usize>], out: &mut Vec<String>) {
            for item in items {
                match item {
                    MenuItem::Action { label, .. } => out.push(label.clone()),
                    MenuItem::Separator => {},
                    MenuItem::Submenu { items, .. } => collect(items, out),
                }
            }
        }
        let mut labels = Vec::new();
        collect(&self.items, &mut labels);
        labels
    }

    /// Picks an action the way a click does: the action runs, then the menu
    /// closes.
    pub fn activate(&self, action: usize) {
        if self.destroyed.get() {
            return;
        }
        (self.on_activate)(action);
        self.close(PopupAnimation::Full);
    }

    pub fn last_animation(&self) -> Option<PopupAnimation> {
        self.last_animation.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn closed_handler_count(&self) -> usize {
        self.closed.handler_count()
    }
}

impl PopupMenu for MockMenu {
    fn actor(&self) -> Rc<dyn Actor> {
        self.actor.clone()
    }

    fn open(&self, animation: PopupAnimation) {
        if self.destroyed.get() {
            return;
        }
        self.last_animation.set(Some(animation));
        self.open.set(true);
        self.actor.show();
    }

    fn close(&self, animation: PopupAnimation) {
        if !self.open.replace(false) {
            return;
        }
        self.last_animation.set(Some(animation));
        self.actor.hide();
        self.closed.emit(&());
    }

    fn is_open(&self) -> bool {
        self.open.get()
    }

    fn connect_closed(&self, mut handler: Box<dyn FnMut()>) -> Subscription {
        self.closed.connect(move |_| handler())
    }

    fn destroy(&self) {
        if self.destroyed.get() {
            return;
        }
        self.close(PopupAnimation::None);
        self.destroyed.set(true);
        self.actor.destroy();
    }
}

pub struct MockMenuManager {
    destroyed: Rc<Cell<bool>>,
}

impl PopupMenuManager for MockMenuManager {
    fn destroy(&self) {
        self.destroyed.set(true);
    }
}

pub struct MockShell {
    next_actor_id: Cell<ActorId>,
    actors: RefCell<Vec<Rc<MockActor>>>,
    chrome: RefCell<Vec<ActorId>>,
    stage_bound: RefCell<Vec<ActorId>>,
    stage: Cell<Rectangle<f64>>,
    cursors: RefCell<Vec<CursorType>>,
    event_time: Cell<u32>,
    key_events: Rc<RefCell<Vec<KeyEvent>>>,
    dummy_cursor: Cell<Option<Rectangle<f64>>>,
    menus: RefCell<Vec<Rc<MockMenu>>>,
    menu_managers: RefCell<Vec<Rc<Cell<bool>>>>,
    builtin_keyboard_suppressed: Cell<bool>,
    double_click_time: Cell<Option<u32>>,
    drag_threshold: Cell<Option<f64>>,
}

impl MockShell {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            next_actor_id: Cell::new(1),
            actors: RefCell::new(Vec::new()),
            chrome: RefCell::new(Vec::new()),
            stage_bound: RefCell::new(Vec::new()),
            stage: Cell::new(Rectangle::new(0.0, 0.0, 1920.0, 1080.0)),
            cursors: RefCell::new(Vec::new()),
            event_time: Cell::new(0),
            key_events: Rc::new(RefCell::new(Vec::new())),
            dummy_cursor: Cell::new(None),
            menus: RefCell::new(Vec::new()),
            menu_managers: RefCell::new(Vec::new()),
            builtin_keyboard_suppressed: Cell::new(false),
            double_click_time: Cell::new(None),
            drag_threshold: Cell::new(None),
        })
    }

    fn new_actor(&self, role: ActorRole) -> Rc<MockActor> {
        let id = self.next_actor_id.get();
        self.next_actor_id.set(id + 1);
        let actor = MockActor::new(id, role);
        self.actors.borrow_mut().push(actor.clone());
        actor
    }

    pub fn mock_actor(&self, id: ActorId) -> Option<Rc<MockActor>> {
        self.actors.borrow().iter().find(|a| a.id == id).cloned()
    }

    pub fn actors(&self) -> Vec<Rc<MockActor>> {
        self.actors.borrow().clone()
    }

    /// Actors of `role` that haven't been destroyed.
    pub fn live_actors(&self, role: ActorRole) -> Vec<Rc<MockActor>> {
        self.actors
            .borrow()
            .iter()
            .filter(|a| a.role == role && !a.is_destroyed())
            .cloned()
            .collect()
    }

    pub fn chrome_ids(&self) -> Vec<ActorId> {
        self.chrome.borrow().clone()
    }

    pub fn stage_bound_ids(&self) -> Vec<ActorId> {
        self.stage_bound.borrow().clone()
    }

    pub fn set_stage_geometry(&self, stage: Rectangle<f64>) {
        self.stage.set(stage);
    }

    pub fn cursors(&self) -> Vec<CursorType> {
        self.cursors.borrow().clone()
    }

    pub fn set_event_time(&self, time_ms: u32) {
        self.event_time.set(time_ms);
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.key_events.borrow().clone()
    }

    pub fn dummy_cursor_geometry(&self) -> Option<Rectangle<f64>> {
        self.dummy_cursor.get()
    }

    pub fn menus(&self) -> Vec<Rc<MockMenu>> {
        self.menus.borrow().clone()
    }

    pub fn last_menu(&self) -> Option<Rc<MockMenu>> {
        self.menus.borrow().last().cloned()
    }

    pub fn live_menu_managers(&self) -> usize {
        self.menu_managers
            .borrow()
            .iter()
            .filter(|destroyed| !destroyed.get())
            .count()
    }

    pub fn is_builtin_keyboard_suppressed(&self) -> bool {
        self.builtin_keyboard_suppressed.get()
    }

    pub fn set_double_click_time(&self, ms: Option<u32>) {
        self.double_click_time.set(ms);
    }

    pub fn set_drag_threshold(&self, px: Option<f64>) {
        self.drag_threshold.set(px);
    }
}

impl Shell for MockShell {
    fn create_actor(&self, role: ActorRole) -> Rc<dyn Actor> {
        self.new_actor(role)
    }

    fn add_chrome(&self, actor: &Rc<dyn Actor>) {
        self.chrome.borrow_mut().push(actor.id());
    }

    fn bind_to_stage(&self, actor: &Rc<dyn Actor>) {
        self.stage_bound.borrow_mut().push(actor.id());
    }

    fn stage_geometry(&self) -> Rectangle<f64> {
        self.stage.get()
    }

    fn set_cursor(&self, cursor: CursorType) {
        self.cursors.borrow_mut().push(cursor);
    }

    fn current_event_time(&self) -> u32 {
        self.event_time.get()
    }

    fn create_virtual_keyboard(&self) -> Box<dyn VirtualInputDevice> {
        Box::new(MockVirtualKeyboard {
            events: self.key_events.clone(),
        })
    }

    fn set_dummy_cursor_geometry(&self, rect: Rectangle<f64>) {
        self.dummy_cursor.set(Some(rect));
    }

    fn create_popup_menu(
        &self,
        anchor: PopupAnchor,
        items: Vec<MenuItem<usize>>,
        on_activate: MenuActivateFn,
    ) -> Rc<dyn PopupMenu> {
        let menu = Rc::new(MockMenu {
            anchor,
            items,
            on_activate,
            actor: self.new_actor(ActorRole::ToplevelView),
            open: Cell::new(false),
            last_animation: Cell::new(None),
            destroyed: Cell::new(false),
            closed: Signal::new(),
        });
        self.menus.borrow_mut().push(menu.clone());
        menu
    }

    fn create_menu_manager(
        &self,
        _source: &Rc<dyn Actor>,
        _menu: &Rc<dyn PopupMenu>,
    ) -> Box<dyn PopupMenuManager> {
        let destroyed = Rc::new(Cell::new(false));
        self.menu_managers.borrow_mut().push(destroyed.clone());
        Box::new(MockMenuManager { destroyed })
    }

    fn set_builtin_keyboard_suppressed(&self, suppressed: bool) {
        self.builtin_keyboard_suppressed.set(suppressed);
    }

    fn double_click_time(&self) -> Option<u32> {
        self.double_click_time.get()
    }

    fn drag_threshold(&self) -> Option<f64> {
        self.drag_threshold.get()
    }
}

pub struct MockMonitors {
    monitors: RefCell<Vec<MonitorInfo>>,
    workareas: RefCell<HashMap<usize, Rectangle<i32>>>,
    primary: Cell<Option<usize>>,
    focus: Cell<Option<usize>>,
    changed: Signal<()>,
}

impl MockMonitors {
    pub fn new(monitors: Vec<MonitorInfo>) -> Rc<Self> {
        Rc::new(Self {
            monitors: RefCell::new(monitors),
            workareas: RefCell::new(HashMap::new()),
            primary: Cell::new(Some(0)),
            focus: Cell::new(None),
            changed: Signal::new(),
        })
    }

    /// Replaces the monitor list without notifying anyone.
    pub fn set_monitors(&self, monitors: Vec<MonitorInfo>) {
        *self.monitors.borrow_mut() = monitors;
    }

    pub fn set_workarea(&self, index: usize, workarea: Rectangle<i32>) {
        self.workareas.borrow_mut().insert(index, workarea);
    }

    pub fn set_primary(&self, index: Option<usize>) {
        self.primary.set(index);
    }

    pub fn set_focus(&self, index: Option<usize>) {
        self.focus.set(index);
    }

    pub fn emit_monitors_changed(&self) {
        self.changed.emit(&());
    }

    pub fn handler_count(&self) -> usize {
        self.changed.handler_count()
    }
}

impl MonitorLayout for MockMonitors {
    fn monitors(&self) -> Vec<MonitorInfo> {
        self.monitors.borrow().clone()
    }

    fn workarea(&self, index: usize) -> Option<Rectangle<i32>> {
        self.workareas.borrow().get(&index).copied()
    }

    fn primary_index(&self) -> Option<usize> {
        self.primary.get()
    }

    fn focus_index(&self) -> Option<usize> {
        self.focus.get()
    }

    /// The monitor containing the actor's origin.
    fn find_index_for_actor(&self, actor: &dyn Actor) -> Option<usize> {
        let origin = actor.apply_transform_to_point(Point::new(0.0, 0.0));
        self.monitors
            .borrow()
            .iter()
            .position(|m| m.geometry.to_f64().contains(origin))
    }

    fn connect_monitors_changed(&self, mut handler: Box<dyn FnMut()>) -> Subscription {
        self.changed.connect(move |_| handler())
    }
}

pub struct MockInputSources {
    sources: RefCell<Vec<InputSource>>,
    current: Cell<Option<usize>>,
    max_layouts_per_group: Cell<u32>,
    current_changed: Signal<()>,
    sources_changed: Signal<()>,
}

impl MockInputSources {
    pub fn new(sources: Vec<InputSource>, max_layouts_per_group: u32) -> Rc<Self> {
        let current = (!sources.is_empty()).then_some(0);
        Rc::new(Self {
            sources: RefCell::new(sources),
            current: Cell::new(current),
            max_layouts_per_group: Cell::new(max_layouts_per_group),
            current_changed: Signal::new(),
            sources_changed: Signal::new(),
        })
    }

    /// Makes the source at `position` current without notifying.
    pub fn set_current(&self, position: Option<usize>) {
        self.current.set(position);
    }

    /// Switches to the source at `position` and notifies, like the user
    /// picking a layout.
    pub fn select(&self, position: usize) {
        self.set_current(Some(position));
        self.emit_current_source_changed();
    }

    /// Replaces the configured sources and notifies. The current position
    /// is kept if it still exists.
    pub fn replace_sources(&self, sources: Vec<InputSource>) {
        let len = sources.len();
        *self.sources.borrow_mut() = sources;
        if self.current.get().is_some_and(|current| current >= len) {
            self.current.set((len > 0).then_some(0));
        }
        self.emit_sources_changed();
    }

    pub fn set_max_layouts_per_group(&self, max: u32) {
        self.max_layouts_per_group.set(max);
    }

    pub fn emit_current_source_changed(&self) {
        self.current_changed.emit(&());
    }

    pub fn emit_sources_changed(&self) {
        self.sources_changed.emit(&());
    }

    pub fn handler_count(&self) -> usize {
        self.current_changed.handler_count() + self.sources_changed.handler_count()
    }
}

impl InputSourceManager for MockInputSources {
    fn input_sources(&self) -> Vec<InputSource> {
        self.sources.borrow().clone()
    }

    fn current_source(&self) -> Option<InputSource> {
        let current = self.current.get()?;
        self.sources.borrow().get(current).cloned()
    }

    fn max_layouts_per_group(&self) -> u32 {
        self.max_layouts_per_group.get()
    }

    fn connect_current_source_changed(&self, mut handler: Box<dyn FnMut()>) -> Subscription {
        self.current_changed.connect(move |_| handler())
    }

    fn connect_sources_changed(&self, mut handler: Box<dyn FnMut()>) -> Subscription {
        self.sources_changed.connect(move |_| handler())
    }
}

#[derive(Default)]
pub struct MockXkbInfo {
    layouts: RefCell<HashMap<String, LayoutInfo>>,
}

impl MockXkbInfo {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn insert(&self, source_id: &str, info: LayoutInfo) {
        self.layouts.borrow_mut().insert(source_id.to_string(), info);
    }
}

impl XkbInfo for MockXkbInfo {
    fn layout_info(&self, source_id: &str) -> Option<LayoutInfo> {
        self.layouts.borrow().get(source_id).cloned()
    }
}

#[derive(Default)]
pub struct MockInputMethods {
    engines: RefCell<HashMap<String, EngineDesc>>,
}

impl MockInputMethods {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn insert(&self, source_id: &str, desc: EngineDesc) {
        self.engines.borrow_mut().insert(source_id.to_string(), desc);
    }
}

impl InputMethodEngines for MockInputMethods {
    fn engine_desc(&self, source_id: &str) -> Option<EngineDesc> {
        self.engines.borrow().get(source_id).cloned()
    }
}

pub struct MockView {
    name: String,
    reactive: bool,
    cursor_requests: Signal<CursorType>,
}

impl MockView {
    pub fn new(name: &str, reactive: bool) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            reactive,
            cursor_requests: Signal::new(),
        })
    }

    pub fn request_cursor(&self, cursor: CursorType) {
        self.cursor_requests.emit(&cursor);
    }

    pub fn cursor_handler_count(&self) -> usize {
        self.cursor_requests.handler_count()
    }
}

impl View for MockView {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_reactive_type(&self) -> bool {
        self.reactive
    }

    fn connect_cursor_change_request(
        &self,
        mut handler: Box<dyn FnMut(CursorType)>,
    ) -> Subscription {
        self.cursor_requests.connect(move |cursor| handler(*cursor))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Startup,
    Shutdown,
    ToggleVisible,
    Show,
    Hide,
    /// The engine re-queries the host on every group change; this records
    /// what it saw.
    GroupChanged {
        group: u32,
        layout: String,
        variant: String,
    },
    LanguageSelectionClosed,
    SetActiveLanguage {
        lang_id: String,
        add_to_mru: bool,
    },
}

/// A keyboard engine that records the calls it receives and otherwise does
/// nothing on its own. Tests drive the host side through [`MockEngine::host`].
#[derive(Default)]
pub struct MockEngine {
    host: RefCell<Option<Weak<dyn EngineHost>>>,
    visible: Cell<bool>,
    calls: RefCell<Vec<EngineCall>>,
    fail_startup: Cell<bool>,
    views: RefCell<Vec<Rc<MockView>>>,
}

impl MockEngine {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn fail_next_startup(&self) {
        self.fail_startup.set(true);
    }

    pub fn host(&self) -> Option<Rc<dyn EngineHost>> {
        self.host.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: EngineCall) {
        self.calls.borrow_mut().push(call);
    }

    /// Creates a view and announces it to the host, as the engine does when
    /// it builds its keyboard window.
    pub fn add_view(&self, name: &str, reactive: bool) -> Rc<MockView> {
        let view = MockView::new(name, reactive);
        self.views.borrow_mut().push(view.clone());
        if let Some(host) = self.host() {
            host.on_view_added(view.clone());
        }
        view
    }

    pub fn remove_view(&self, name: &str) {
        let view = {
            let mut views = self.views.borrow_mut();
            let Some(position) = views.iter().position(|v| v.name == name) else {
                return;
            };
            views.remove(position)
        };
        if let Some(host) = self.host() {
            host.on_view_removed(&*view);
        }
    }

    pub fn view(&self, name: &str) -> Option<Rc<MockView>> {
        self.views.borrow().iter().find(|v| v.name == name).cloned()
    }
}

impl Engine for MockEngine {
    fn startup(&self, host: Weak<dyn EngineHost>) -> Result<()> {
        if self.fail_startup.replace(false) {
            bail!("mock engine startup failure");
        }
        *self.host.borrow_mut() = Some(host);
        self.record(EngineCall::Startup);
        Ok(())
    }

    fn shutdown(&self) {
        self.record(EngineCall::Shutdown);
        // Views die with the engine.
        let views: Vec<_> = self.views.borrow_mut().drain(..).collect();
        if let Some(host) = self.host() {
            for view in &views {
                host.on_view_removed(&**view);
            }
        }
        self.host.borrow_mut().take();
        self.visible.set(false);
    }

    fn toggle_visible(&self) {
        self.record(EngineCall::ToggleVisible);
        self.visible.set(!self.visible.get());
    }

    fn show(&self) {
        self.record(EngineCall::Show);
        self.visible.set(true);
    }

    fn hide(&self) {
        self.record(EngineCall::Hide);
        self.visible.set(false);
    }

    fn is_visible(&self) -> bool {
        self.visible.get()
    }

    fn on_group_changed(&self) {
        let Some(host) = self.host() else {
            return;
        };
        let group = host.current_group();
        let names = host.current_rules_names();
        self.record(EngineCall::GroupChanged {
            group,
            layout: names.layout,
            variant: names.variant,
        });
    }

    fn on_language_selection_closed(&self) {
        self.record(EngineCall::LanguageSelectionClosed);
    }

    fn language_full_name(&self, lang_id: &str) -> String {
        if lang_id.is_empty() {
            "System".to_string()
        } else {
            format!("Language {lang_id}")
        }
    }

    fn set_active_language_id(&self, lang_id: &str, add_to_mru: bool) {
        self.record(EngineCall::SetActiveLanguage {
            lang_id: lang_id.to_string(),
            add_to_mru,
        });
    }
}

pub fn xkb_source(index: usize, id: &str) -> InputSource {
    InputSource {
        index,
        id: id.to_string(),
        kind: InputSourceKind::Xkb,
    }
}

pub fn input_method_source(index: usize, id: &str) -> InputSource {
    InputSource {
        index,
        id: id.to_string(),
        kind: InputSourceKind::InputMethod,
    }
}

/// A complete mock compositor on a real calloop loop.
pub struct MockHost {
    pub shell: Rc<MockShell>,
    pub monitors: Rc<MockMonitors>,
    pub input_sources: Rc<MockInputSources>,
    pub xkb_info: Rc<MockXkbInfo>,
    pub input_methods: Rc<MockInputMethods>,
    scheduler: Rc<LoopScheduler<()>>,
    pub event_loop: EventLoop<'static, ()>,
}

impl MockHost {
    /// One 1920x1080 monitor; `us`, `anthy` (input method) and `de` sources
    /// with `us` active; three layouts per group.
    pub fn new() -> Result<Self> {
        let event_loop = EventLoop::<()>::try_new().location(loc!())?;
        let scheduler = Rc::new(LoopScheduler::new(event_loop.handle()));

        let monitors = MockMonitors::new(vec![MonitorInfo {
            geometry: Rectangle::new(0, 0, 1920, 1080),
            size_mm: Some(Size::new(510, 290)),
        }]);
        let input_sources = MockInputSources::new(
            vec![
                xkb_source(0, "us"),
                input_method_source(1, "anthy"),
                xkb_source(2, "de"),
            ],
            3,
        );
        let xkb_info = MockXkbInfo::new();
        for (id, layout, variant, name) in [
            ("us", "us", "", "English (US)"),
            ("de", "de", "", "German"),
            ("de+nodeadkeys", "de", "nodeadkeys", "German (no dead keys)"),
        ] {
            xkb_info.insert(
                id,
                LayoutInfo {
                    display_name: name.to_string(),
                    short_name: layout.to_string(),
                    layout: layout.to_string(),
                    variant: variant.to_string(),
                },
            );
        }
        let input_methods = MockInputMethods::new();
        input_methods.insert(
            "anthy",
            EngineDesc {
                layout: "jp".to_string(),
                variant: String::new(),
            },
        );

        Ok(Self {
            shell: MockShell::new(),
            monitors,
            input_sources,
            xkb_info,
            input_methods,
            scheduler,
            event_loop,
        })
    }

    pub fn services(&self) -> HostServices {
        HostServices {
            shell: self.shell.clone(),
            monitors: self.monitors.clone(),
            input_sources: self.input_sources.clone(),
            xkb_info: self.xkb_info.clone(),
            input_methods: Some(self.input_methods.clone() as Rc<dyn InputMethodEngines>),
            scheduler: self.scheduler.clone(),
        }
    }

    /// Runs one non-blocking turn of the loop.
    pub fn dispatch(&mut self) -> Result<()> {
        self.event_loop
            .dispatch(Some(Duration::ZERO), &mut ())
            .location(loc!())
    }

    /// Runs turns until `interval` has passed on the wall clock.
    pub fn run_for(&mut self, interval: Duration) -> Result<()> {
        let deadline = std::time::Instant::now() + interval;
        loop {
            let now = std::time::Instant::now();
            if now >= deadline {
                return Ok(());
            }
            self.event_loop
                .dispatch(Some(deadline - now), &mut ())
                .location(loc!())?;
        }
    }
}
