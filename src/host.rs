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

//! The compositor primitives the bridge drives.
//!
//! The compositor implements these traits and passes them in as
//! [`HostServices`]. Everything here is called on the compositor's event loop
//! thread only.

use std::rc::Rc;

use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use crate::geometry::Point;
use crate::geometry::Rectangle;
use crate::geometry::Size;
use crate::scheduler::Scheduler;
use crate::signal::Subscription;

pub type ActorId = u64;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ActorRole {
    /// Renders one of the engine's toplevel views.
    ToplevelView,
    /// The full-stage pointer grab overlay.
    GrabOverlay,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    ButtonPress { button: u32 },
    ButtonRelease { button: u32 },
    Motion { x: f64, y: f64 },
    TouchBegin,
    TouchUpdate,
    TouchEnd,
    TouchCancel,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EventPropagation {
    Propagate,
    Stop,
}

/// Pointer shapes the engine may ask for, e.g. while resizing a view.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
    Deserialize,
    Serialize,
)]
#[repr(u32)]
pub enum CursorType {
    Default = 0,
    Pointer = 1,
    Move = 2,
    ResizeN = 3,
    ResizeNe = 4,
    ResizeE = 5,
    ResizeSe = 6,
    ResizeS = 7,
    ResizeSw = 8,
    ResizeW = 9,
    ResizeNw = 10,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum KeyState {
    Released = 0,
    Pressed = 1,
}

impl From<bool> for KeyState {
    fn from(pressed: bool) -> Self {
        if pressed { Self::Pressed } else { Self::Released }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PopupSide {
    Top,
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PopupAnimation {
    None,
    Slide,
    Full,
}

/// A compositor scene-graph object. Created by the bridge through
/// [`Shell::create_actor`]; the compositor owns the scene composition.
pub trait Actor {
    fn id(&self) -> ActorId;
    fn role(&self) -> ActorRole;

    fn set_reactive(&self, reactive: bool);
    fn is_reactive(&self) -> bool;

    fn show(&self);
    fn hide(&self);
    fn is_visible(&self) -> bool;

    fn set_background_color(&self, rgba: [u8; 4]);

    /// Maps a point in actor coordinates to stage coordinates using the
    /// actor's current transform.
    fn apply_transform_to_point(&self, point: Point<f64>) -> Point<f64>;

    /// Fires once when the actor is destroyed, whoever destroyed it.
    fn connect_destroy(&self, handler: Box<dyn FnMut()>) -> Subscription;

    fn connect_input_event(
        &self,
        handler: Box<dyn FnMut(&InputEvent) -> EventPropagation>,
    ) -> Subscription;

    fn destroy(&self);
    fn is_destroyed(&self) -> bool;
}

/// One entry of a popup menu.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuItem<A> {
    Action {
        label: String,
        checked: bool,
        action: A,
    },
    Separator,
    Submenu {
        title: String,
        items: Vec<MenuItem<A>>,
    },
}

/// Where a popup menu points at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PopupAnchor {
    /// The shell's dummy cursor, positioned with
    /// [`Shell::set_dummy_cursor_geometry`] before opening.
    DummyCursor { alignment: f64, side: PopupSide },
}

pub type MenuActivateFn = Box<dyn Fn(usize)>;

/// A menu as built by the shell's menu system. Actions are reported by the
/// index the bridge assigned when building the item list.
pub trait PopupMenu {
    fn actor(&self) -> Rc<dyn Actor>;
    fn open(&self, animation: PopupAnimation);
    fn close(&self, animation: PopupAnimation);
    fn is_open(&self) -> bool;

    fn connect_closed(&self, handler: Box<dyn FnMut()>) -> Subscription;

    fn destroy(&self);
}

/// Grab/keyboard-navigation helper the shell keeps per menu source actor.
pub trait PopupMenuManager {
    fn destroy(&self);
}

pub trait Shell {
    fn create_actor(&self, role: ActorRole) -> Rc<dyn Actor>;

    /// Adds `actor` to the top-level chrome layer.
    fn add_chrome(&self, actor: &Rc<dyn Actor>);

    /// Keeps `actor` positioned and sized to the full stage across resizes.
    fn bind_to_stage(&self, actor: &Rc<dyn Actor>);

    fn stage_geometry(&self) -> Rectangle<f64>;

    fn set_cursor(&self, cursor: CursorType);

    /// Event time of the event being dispatched, in milliseconds.
    fn current_event_time(&self) -> u32;

    fn create_virtual_keyboard(&self) -> Box<dyn VirtualInputDevice>;

    fn set_dummy_cursor_geometry(&self, rect: Rectangle<f64>);

    fn create_popup_menu(
        &self,
        anchor: PopupAnchor,
        items: Vec<MenuItem<usize>>,
        on_activate: MenuActivateFn,
    ) -> Rc<dyn PopupMenu>;

    fn create_menu_manager(
        &self,
        source: &Rc<dyn Actor>,
        menu: &Rc<dyn PopupMenu>,
    ) -> Box<dyn PopupMenuManager>;

    /// Replaces runtime patching of the shell's own on-screen keyboard.
    fn set_builtin_keyboard_suppressed(&self, suppressed: bool);

    fn double_click_time(&self) -> Option<u32> {
        None
    }

    fn drag_threshold(&self) -> Option<f64> {
        None
    }
}

pub trait VirtualInputDevice {
    fn notify_keyval(&self, time_ms: u32, keyval: u32, state: KeyState);
    fn notify_key(&self, time_ms: u32, keycode: u32, state: KeyState);
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MonitorInfo {
    pub geometry: Rectangle<i32>,
    #[serde(default)]
    pub size_mm: Option<Size<i32>>,
}

pub trait MonitorLayout {
    /// The current monitor list; never cached by the bridge.
    fn monitors(&self) -> Vec<MonitorInfo>;
    fn workarea(&self, index: usize) -> Option<Rectangle<i32>>;
    fn primary_index(&self) -> Option<usize>;
    /// Monitor of the focused window.
    fn focus_index(&self) -> Option<usize>;
    fn find_index_for_actor(&self, actor: &dyn Actor) -> Option<usize>;

    fn connect_monitors_changed(&self, handler: Box<dyn FnMut()>) -> Subscription;
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum InputSourceKind {
    Xkb,
    /// An input-method engine based source (IBus and friends).
    InputMethod,
    Other(String),
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct InputSource {
    pub index: usize,
    pub id: String,
    pub kind: InputSourceKind,
}

pub trait InputSourceManager {
    /// Configured sources, ordered by `index`.
    fn input_sources(&self) -> Vec<InputSource>;
    fn current_source(&self) -> Option<InputSource>;
    /// How many XKB layouts the host packs into one keymap group set.
    fn max_layouts_per_group(&self) -> u32;

    fn connect_current_source_changed(&self, handler: Box<dyn FnMut()>) -> Subscription;
    fn connect_sources_changed(&self, handler: Box<dyn FnMut()>) -> Subscription;
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct LayoutInfo {
    pub display_name: String,
    pub short_name: String,
    pub layout: String,
    pub variant: String,
}

pub trait XkbInfo {
    fn layout_info(&self, source_id: &str) -> Option<LayoutInfo>;
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct EngineDesc {
    pub layout: String,
    pub variant: String,
}

pub trait InputMethodEngines {
    fn engine_desc(&self, source_id: &str) -> Option<EngineDesc>;
}

/// Everything the bridge needs from the compositor.
#[derive(Clone)]
pub struct HostServices {
    pub shell: Rc<dyn Shell>,
    pub monitors: Rc<dyn MonitorLayout>,
    pub input_sources: Rc<dyn InputSourceManager>,
    pub xkb_info: Rc<dyn XkbInfo>,
    pub input_methods: Option<Rc<dyn InputMethodEngines>>,
    pub scheduler: Rc<dyn Scheduler>,
}
