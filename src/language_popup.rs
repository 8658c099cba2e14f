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

//! The engine's language selection popup.
//!
//! The popup points at the shell's dummy cursor, which is moved onto the
//! requested rectangle just before opening. Opening is deferred to the next
//! idle turn of the loop: opening from inside the engine's input handling
//! races with the engine's own pointer grab, and the menu either closes
//! again immediately or leaves the grab stuck.

use std::cell::RefCell;
use std::rc::Rc;
use std::rc::Weak;

use crate::engine::Engine;
use crate::engine::LanguageSelection;
use crate::geometry::Rectangle;
use crate::geometry::apply_transform_to_rect;
use crate::host::Actor;
use crate::host::MenuItem;
use crate::host::PopupAnchor;
use crate::host::PopupAnimation;
use crate::host::PopupMenu;
use crate::host::PopupMenuManager;
use crate::host::PopupSide;
use crate::host::Shell;
use crate::prelude::*;
use crate::scheduler::IdleHandle;
use crate::scheduler::Scheduler;
use crate::signal::Subscription;

pub const OTHER_LANGUAGES_TITLE: &str = "Other Languages";

/// What activating a menu action does.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LanguageChoice {
    /// Empty for the system language.
    pub lang_id: String,
    pub add_to_mru: bool,
}

/// Lays out the menu for `selection`. Menu actions carry an index into the
/// returned choices.
pub fn build_menu(
    selection: &LanguageSelection,
    full_name: impl Fn(&str) -> String,
) -> (Vec<MenuItem<usize>>, Vec<LanguageChoice>) {
    let mut items = Vec::new();
    let mut choices = Vec::new();
    let mut action = |lang_id: &str, add_to_mru: bool, label: String, checked: bool| {
        choices.push(LanguageChoice {
            lang_id: lang_id.to_string(),
            add_to_mru,
        });
        MenuItem::Action {
            label,
            checked,
            action: choices.len() - 1,
        }
    };

    items.push(action(
        "",
        false,
        full_name(&selection.system_lang_id),
        selection.active_lang_id.is_empty(),
    ));
    items.push(MenuItem::Separator);

    for lang_id in &selection.mru_lang_ids {
        items.push(action(
            lang_id,
            false,
            full_name(lang_id),
            *lang_id == selection.active_lang_id,
        ));
    }
    if !selection.mru_lang_ids.is_empty() {
        items.push(MenuItem::Separator);
    }

    if !selection.other_lang_ids.is_empty() {
        let others = selection
            .other_lang_ids
            .iter()
            .map(|lang_id| action(lang_id, true, full_name(lang_id), false))
            .collect();
        items.push(MenuItem::Submenu {
            title: OTHER_LANGUAGES_TITLE.to_string(),
            items: others,
        });
    }

    (items, choices)
}

/// Everything one popup invocation holds on to.
struct LivePopup {
    menu: Rc<dyn PopupMenu>,
    manager: Box<dyn PopupMenuManager>,
    menu_closed_sub: Subscription,
    anchor_destroy_sub: Subscription,
    pending_open: Option<IdleHandle>,
}

impl LivePopup {
    fn tear_down(self) {
        let Self {
            menu,
            manager,
            menu_closed_sub,
            anchor_destroy_sub,
            pending_open,
        } = self;
        if let Some(pending_open) = pending_open {
            pending_open.cancel();
        }
        menu_closed_sub.close();
        anchor_destroy_sub.close();
        menu.destroy();
        manager.destroy();
    }
}

pub struct LanguagePopup {
    shell: Rc<dyn Shell>,
    scheduler: Rc<dyn Scheduler>,
    alignment: f64,
    live: Rc<RefCell<Option<LivePopup>>>,
}

impl LanguagePopup {
    pub fn new(shell: Rc<dyn Shell>, scheduler: Rc<dyn Scheduler>, alignment: f64) -> Self {
        Self {
            shell,
            scheduler,
            alignment,
            live: Rc::new(RefCell::new(None)),
        }
    }

    /// `rect` is in `anchor`'s coordinates.
    pub fn show(
        &self,
        engine: &Rc<dyn Engine>,
        anchor: &Rc<dyn Actor>,
        rect: Rectangle<f64>,
        selection: &LanguageSelection,
    ) {
        let rect = apply_transform_to_rect(&**anchor, rect);
        self.destroy();

        let (items, choices) = build_menu(selection, |lang_id| engine.language_full_name(lang_id));
        let on_activate = {
            let engine = Rc::downgrade(engine);
            Box::new(move |index: usize| {
                let Some(choice) = choices.get(index) else {
                    protocol_violation(loc!(), format!("unknown language menu action {index}"));
                    return;
                };
                debug!("language {:?} selected", choice.lang_id);
                if let Some(engine) = engine.upgrade() {
                    engine.set_active_language_id(&choice.lang_id, choice.add_to_mru);
                }
            })
        };
        let menu = self.shell.create_popup_menu(
            PopupAnchor::DummyCursor {
                alignment: self.alignment,
                side: PopupSide::Bottom,
            },
            items,
            on_activate,
        );
        // Stays hidden until the deferred open has positioned the dummy
        // cursor; otherwise it flashes at the stage origin.
        menu.actor().hide();
        let manager = self.shell.create_menu_manager(anchor, &menu);

        let menu_closed_sub = {
            let engine = Rc::downgrade(engine);
            menu.connect_closed(Box::new(move || {
                debug!("language menu closed");
                if let Some(engine) = engine.upgrade() {
                    engine.on_language_selection_closed();
                }
            }))
        };
        let anchor_destroy_sub = {
            let live = Rc::downgrade(&self.live);
            anchor.connect_destroy(Box::new(move || {
                debug!("language menu anchor destroyed");
                if let Some(live) = live.upgrade() {
                    Self::tear_down(&live);
                }
            }))
        };
        let pending_open = self
            .scheduler
            .idle_add("open language popup", self.open_callback(rect));

        debug!("language menu scheduled to open at {rect:?}");
        *self.live.borrow_mut() = Some(LivePopup {
            menu,
            manager,
            menu_closed_sub,
            anchor_destroy_sub,
            pending_open: Some(pending_open),
        });
    }

    fn open_callback(&self, rect: Rectangle<f64>) -> Box<dyn FnOnce()> {
        let live: Weak<RefCell<Option<LivePopup>>> = Rc::downgrade(&self.live);
        let shell = self.shell.clone();
        Box::new(move || {
            let Some(live) = live.upgrade() else {
                return;
            };
            let menu = {
                let mut live = live.borrow_mut();
                let Some(popup) = live.as_mut() else {
                    return;
                };
                // Spent; dropping it is a no-op.
                popup.pending_open = None;
                popup.menu.clone()
            };
            shell.set_dummy_cursor_geometry(rect);
            menu.open(PopupAnimation::None);
        })
    }

    fn tear_down(live: &RefCell<Option<LivePopup>>) {
        let popup = live.borrow_mut().take();
        if let Some(popup) = popup {
            debug!("tearing down language menu");
            popup.tear_down();
        }
    }

    /// Safe to call any number of times, shown or not.
    pub fn destroy(&self) {
        Self::tear_down(&self.live);
    }

    pub fn is_live(&self) -> bool {
        self.live.borrow().is_some()
    }

    pub fn has_pending_open(&self) -> bool {
        self.live
            .borrow()
            .as_ref()
            .and_then(|popup| popup.pending_open.as_ref())
            .is_some_and(IdleHandle::is_pending)
    }

    pub fn is_open(&self) -> bool {
        let menu = self.live.borrow().as_ref().map(|popup| popup.menu.clone());
        menu.is_some_and(|menu| menu.is_open())
    }
}

impl Drop for LanguagePopup {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use calloop::EventLoop;

    use super::*;
    use crate::geometry::Point;
    use crate::host::ActorRole;
    use crate::mock::EngineCall;
    use crate::mock::MockActor;
    use crate::mock::MockEngine;
    use crate::mock::MockShell;
    use crate::scheduler::LoopScheduler;

    fn selection() -> LanguageSelection {
        LanguageSelection {
            active_lang_id: "de_DE".to_string(),
            system_lang_id: "en_US".to_string(),
            mru_lang_ids: vec!["de_DE".to_string(), "fr_FR".to_string()],
            other_lang_ids: vec!["es_ES".to_string()],
        }
    }

    fn action(label: &str, checked: bool, action: usize) -> MenuItem<usize> {
        MenuItem::Action {
            label: label.to_string(),
            checked,
            action,
        }
    }

    #[test]
    fn menu_layout() {
        let (items, choices) = build_menu(&selection(), |id| format!("<{id}>"));
        assert_eq!(
            items,
            vec![
                action("<en_US>", false, 0),
                MenuItem::Separator,
                action("<de_DE>", true, 1),
                action("<fr_FR>", false, 2),
                MenuItem::Separator,
                MenuItem::Submenu {
                    title: OTHER_LANGUAGES_TITLE.to_string(),
                    items: vec![action("<es_ES>", false, 3)],
                },
            ]
        );
        let choice = |lang_id: &str, add_to_mru| LanguageChoice {
            lang_id: lang_id.to_string(),
            add_to_mru,
        };
        assert_eq!(
            choices,
            vec![
                choice("", false),
                choice("de_DE", false),
                choice("fr_FR", false),
                choice("es_ES", true),
            ]
        );
    }

    #[test]
    fn minimal_menu_checks_system_language() {
        let selection = LanguageSelection {
            system_lang_id: "en_US".to_string(),
            ..Default::default()
        };
        let (items, choices) = build_menu(&selection, str::to_string);
        assert_eq!(items, vec![action("en_US", true, 0), MenuItem::Separator]);
        assert_eq!(choices.len(), 1);
    }

    #[test]
    fn others_without_mru_have_no_second_separator() {
        let selection = LanguageSelection {
            system_lang_id: "en_US".to_string(),
            other_lang_ids: vec!["es_ES".to_string()],
            ..Default::default()
        };
        let (items, _) = build_menu(&selection, str::to_string);
        assert_eq!(items.len(), 3);
        assert!(matches!(items[2], MenuItem::Submenu { .. }));
    }

    struct Fixture {
        popup: LanguagePopup,
        shell: Rc<MockShell>,
        engine: Rc<MockEngine>,
        anchor: Rc<MockActor>,
        event_loop: EventLoop<'static, ()>,
    }

    impl Fixture {
        fn new() -> Self {
            let event_loop = EventLoop::<()>::try_new().unwrap();
            let shell = MockShell::new();
            let scheduler = Rc::new(LoopScheduler::new(event_loop.handle()));
            let popup = LanguagePopup::new(shell.clone(), scheduler, 0.5);
            let anchor = MockActor::new(100, ActorRole::ToplevelView);
            anchor.set_transform(Point::new(50.0, 60.0), 1.0);
            Self {
                popup,
                shell,
                engine: MockEngine::new(),
                anchor,
                event_loop,
            }
        }

        fn show(&self) {
            let engine: Rc<dyn Engine> = self.engine.clone();
            let anchor: Rc<dyn Actor> = self.anchor.clone();
            self.popup.show(
                &engine,
                &anchor,
                Rectangle::new(10.0, 20.0, 30.0, 40.0),
                &selection(),
            );
        }

        fn dispatch(&mut self) {
            self.event_loop
                .dispatch(Some(Duration::ZERO), &mut ())
                .unwrap();
        }
    }

    #[test]
    fn opens_on_next_idle_turn() {
        let mut f = Fixture::new();
        f.show();

        let menu = f.shell.last_menu().unwrap();
        assert!(f.popup.is_live());
        assert!(f.popup.has_pending_open());
        assert!(!menu.is_open());
        assert!(!menu.actor().is_visible());
        assert_eq!(
            menu.anchor(),
            PopupAnchor::DummyCursor {
                alignment: 0.5,
                side: PopupSide::Bottom
            }
        );
        assert_eq!(f.shell.live_menu_managers(), 1);

        f.dispatch();
        assert!(menu.is_open());
        assert!(f.popup.is_open());
        assert!(!f.popup.has_pending_open());
        assert_eq!(menu.last_animation(), Some(PopupAnimation::None));
        assert_eq!(
            f.shell.dummy_cursor_geometry(),
            Some(Rectangle::new(60.0, 80.0, 30.0, 40.0))
        );
    }

    #[test]
    fn second_show_replaces_the_first() {
        let mut f = Fixture::new();
        f.show();
        let first = f.shell.last_menu().unwrap();
        f.show();
        let second = f.shell.last_menu().unwrap();

        assert!(first.is_destroyed());
        assert_eq!(first.closed_handler_count(), 0);
        assert!(!second.is_destroyed());
        assert_eq!(f.shell.live_menu_managers(), 1);
        assert_eq!(f.anchor.destroy_handler_count(), 1);

        f.dispatch();
        assert!(!first.is_open());
        assert!(second.is_open());
        assert_eq!(f.shell.menus().len(), 2);
    }

    #[test]
    fn transform_is_reapplied_each_time() {
        let mut f = Fixture::new();
        f.show();
        f.dispatch();
        f.anchor.set_transform(Point::new(0.0, 0.0), 2.0);
        f.show();
        f.dispatch();
        assert_eq!(
            f.shell.dummy_cursor_geometry(),
            Some(Rectangle::new(20.0, 40.0, 60.0, 80.0))
        );
    }

    #[test]
    fn activation_and_close_reach_the_engine() {
        let mut f = Fixture::new();
        f.show();
        f.dispatch();
        let menu = f.shell.last_menu().unwrap();

        menu.activate(3);
        assert_eq!(
            f.engine.calls(),
            vec![
                EngineCall::SetActiveLanguage {
                    lang_id: "es_ES".to_string(),
                    add_to_mru: true
                },
                EngineCall::LanguageSelectionClosed,
            ]
        );
        assert!(!menu.is_open());
    }

    #[test]
    fn system_entry_selects_the_empty_id() {
        let mut f = Fixture::new();
        f.show();
        f.dispatch();
        f.shell.last_menu().unwrap().activate(0);
        assert_eq!(
            f.engine.calls()[0],
            EngineCall::SetActiveLanguage {
                lang_id: String::new(),
                add_to_mru: false
            }
        );
    }

    #[test]
    fn destroy_before_idle_cancels_the_open() {
        let mut f = Fixture::new();
        f.show();
        let menu = f.shell.last_menu().unwrap();

        f.popup.destroy();
        f.popup.destroy();
        assert!(!f.popup.is_live());
        assert!(menu.is_destroyed());
        assert_eq!(f.shell.live_menu_managers(), 0);
        assert_eq!(f.anchor.destroy_handler_count(), 0);

        f.dispatch();
        assert!(!menu.is_open());
        assert_eq!(f.shell.dummy_cursor_geometry(), None);
        assert!(f.engine.calls().is_empty());
    }

    #[test]
    fn anchor_destruction_tears_down() {
        let mut f = Fixture::new();
        f.show();
        let menu = f.shell.last_menu().unwrap();

        f.anchor.destroy();
        assert!(!f.popup.is_live());
        assert!(menu.is_destroyed());

        f.dispatch();
        assert!(!menu.is_open());
        assert_eq!(f.shell.dummy_cursor_geometry(), None);
    }

    #[test]
    fn destroy_without_show_is_harmless() {
        let f = Fixture::new();
        f.popup.destroy();
        assert!(!f.popup.is_live());
        assert!(!f.popup.is_open());
        assert!(!f.popup.has_pending_open());
    }
}
