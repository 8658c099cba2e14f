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

//! The contract between the bridge and the keyboard engine.
//!
//! [`Engine`] is what the bridge calls; [`EngineHost`] is what the engine
//! calls. The engine receives its host as a `Weak<dyn EngineHost>` in
//! [`Engine::startup`] so that neither side keeps the other alive.

use std::rc::Rc;
use std::rc::Weak;
use std::time::Duration;

use serde_derive::Deserialize;
use serde_derive::Serialize;

use crate::geometry::Point;
use crate::geometry::Rectangle;
use crate::geometry::Size;
use crate::host::CursorType;
use crate::prelude::*;
use crate::signal::Subscription;

/// An engine-owned toplevel keyboard surface.
pub trait View {
    /// Stable for the lifetime of the view.
    fn name(&self) -> String;

    /// Whether the view takes pointer/touch input (the keyboard itself) or
    /// is purely decorative.
    fn is_reactive_type(&self) -> bool;

    fn connect_cursor_change_request(
        &self,
        handler: Box<dyn FnMut(CursorType)>,
    ) -> Subscription;
}

pub trait Engine {
    fn startup(&self, host: Weak<dyn EngineHost>) -> Result<()>;
    fn shutdown(&self);

    fn toggle_visible(&self);
    fn show(&self);
    fn hide(&self);
    fn is_visible(&self) -> bool;

    /// The keyboard layout group or rules names may have changed; the
    /// engine re-queries them.
    fn on_group_changed(&self);
    fn on_language_selection_closed(&self);

    fn language_full_name(&self, lang_id: &str) -> String;
    fn set_active_language_id(&self, lang_id: &str, add_to_mru: bool);
}

/// XKB rules names as `(model, layout, variant, options, extra)`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct RulesNames {
    pub model: String,
    pub layout: String,
    pub variant: String,
    pub options: String,
    pub extra: String,
}

impl RulesNames {
    pub fn with_layout(layout: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            layout: layout.into(),
            variant: variant.into(),
            ..Default::default()
        }
    }

    pub fn into_array(self) -> [String; 5] {
        [
            self.model,
            self.layout,
            self.variant,
            self.options,
            self.extra,
        ]
    }
}

/// The arguments of a language selection request.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct LanguageSelection {
    /// Empty when the system language is active.
    pub active_lang_id: String,
    pub system_lang_id: String,
    pub mru_lang_ids: Vec<String>,
    pub other_lang_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TimerId(pub u64);

/// Pointer position in stage coordinates plus the held modifier mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerState {
    pub position: Point<f64>,
    pub modifiers: u32,
}

/// Callbacks the engine requires from its host.
pub trait EngineHost {
    fn on_view_added(&self, view: Rc<dyn View>);
    fn on_view_removed(&self, view: &dyn View);

    fn monitor_count(&self) -> usize;
    fn monitor_geometry(&self, index: usize) -> Rectangle<f64>;
    fn monitor_size_mm(&self, index: usize) -> Size<f64>;
    fn monitor_workarea(&self, index: usize) -> Rectangle<f64>;
    fn monitor_at_active_window(&self) -> usize;
    fn monitor_at_view(&self, view: &dyn View) -> usize;
    fn primary_monitor(&self) -> usize;
    fn screen_geometry(&self) -> Rectangle<f64>;

    fn current_group(&self) -> u32;
    fn current_rules_names(&self) -> RulesNames;

    fn send_keyval_event(&self, keyval: u32, pressed: bool);
    fn send_keycode_event(&self, keycode: u32, pressed: bool);

    fn grab_pointer(&self);
    fn ungrab_pointer(&self);

    fn show_language_selection(
        &self,
        view: &dyn View,
        rect: Rectangle<f64>,
        selection: LanguageSelection,
    );

    /// `callback` keeps firing every `interval` while it returns true.
    fn start_timer(&self, interval: Duration, callback: Box<dyn FnMut() -> bool>) -> Option<TimerId>;
    fn stop_timer(&self, id: TimerId);
    fn idle_run(&self, callback: Box<dyn FnOnce()>);

    fn double_click_time(&self) -> Duration;
    fn drag_threshold(&self) -> f64;
    fn is_composited(&self) -> bool;

    /// Whether Alt-drags belong to the window manager. Compositor actors
    /// never lose them.
    fn is_alt_special(&self) -> bool {
        false
    }

    fn must_fix_configure_event(&self) -> bool {
        false
    }

    /// `None` when the host can't report the pointer.
    fn current_pointer_state(&self) -> Option<PointerState> {
        None
    }

    /// Views are already on every workspace.
    fn move_to_current_desktop(&self) {}

    /// Asks the user whether to recover a damaged word prediction model.
    /// Hosts without dialogs decline.
    fn show_prediction_recovery_dialog(
        &self,
        _markup: &str,
        _message_type: &str,
        _buttons: &str,
    ) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_names_pad_unused_fields() {
        let names = RulesNames::with_layout("de", "nodeadkeys");
        assert_eq!(
            names.into_array(),
            [
                String::new(),
                "de".to_string(),
                "nodeadkeys".to_string(),
                String::new(),
                String::new()
            ]
        );
        assert_eq!(RulesNames::default().into_array(), <[String; 5]>::default());
    }
}
