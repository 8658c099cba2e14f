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

use std::cell::Cell;
use std::rc::Rc;

use crate::host::Actor;
use crate::host::ActorRole;
use crate::host::EventPropagation;
use crate::host::InputEvent;
use crate::host::Shell;
use crate::prelude::*;
use crate::signal::Subscription;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum GrabState {
    Released,
    Grabbed,
}

/// A transparent full-stage actor that swallows pointer input while the
/// engine drags or resizes a view, so the pointer can't fall through to the
/// windows underneath. The first press on it ends the grab.
pub struct GrabOverlay {
    actor: Rc<dyn Actor>,
    state: Rc<Cell<GrabState>>,
    input_sub: Option<Subscription>,
}

impl GrabOverlay {
    pub fn new(shell: &dyn Shell, tint: Option<[u8; 4]>) -> Self {
        let actor = shell.create_actor(ActorRole::GrabOverlay);
        actor.set_reactive(true);
        shell.bind_to_stage(&actor);
        if let Some(tint) = tint {
            actor.set_background_color(tint);
        }
        actor.hide();
        shell.add_chrome(&actor);

        let state = Rc::new(Cell::new(GrabState::Released));
        let input_sub = {
            let state = state.clone();
            let weak_actor = Rc::downgrade(&actor);
            actor.connect_input_event(Box::new(move |event| {
                if state.get() == GrabState::Grabbed
                    && matches!(event, InputEvent::ButtonPress { .. } | InputEvent::TouchBegin)
                {
                    debug!("press on grab overlay, releasing grab");
                    state.set(GrabState::Released);
                    if let Some(actor) = weak_actor.upgrade() {
                        actor.hide();
                    }
                }
                EventPropagation::Propagate
            }))
        };

        Self {
            actor,
            state,
            input_sub: Some(input_sub),
        }
    }

    pub fn grab(&self) {
        if self.is_destroyed() {
            return;
        }
        if self.state.replace(GrabState::Grabbed) == GrabState::Released {
            trace!("pointer grabbed");
        }
        self.actor.show();
    }

    pub fn ungrab(&self) {
        if self.is_destroyed() {
            return;
        }
        if self.state.replace(GrabState::Released) == GrabState::Grabbed {
            trace!("pointer released");
        }
        self.actor.hide();
    }

    pub fn state(&self) -> GrabState {
        self.state.get()
    }

    pub fn actor(&self) -> &Rc<dyn Actor> {
        &self.actor
    }

    fn is_destroyed(&self) -> bool {
        self.input_sub.is_none() || self.actor.is_destroyed()
    }

    pub fn destroy(&mut self) {
        let Some(input_sub) = self.input_sub.take() else {
            return;
        };
        input_sub.close();
        self.state.set(GrabState::Released);
        if !self.actor.is_destroyed() {
            self.actor.destroy();
        }
    }
}

impl Drop for GrabOverlay {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockShell;

    fn overlay() -> (Rc<MockShell>, GrabOverlay) {
        let shell = MockShell::new();
        let overlay = GrabOverlay::new(&*shell, None);
        (shell, overlay)
    }

    #[test]
    fn starts_hidden_and_bound_to_stage() {
        let (shell, overlay) = overlay();
        let actor = overlay.actor();
        assert_eq!(overlay.state(), GrabState::Released);
        assert!(!actor.is_visible());
        assert!(actor.is_reactive());
        assert_eq!(shell.stage_bound_ids(), vec![actor.id()]);
        assert_eq!(shell.chrome_ids(), vec![actor.id()]);
    }

    #[test]
    fn grab_and_ungrab_are_idempotent() {
        let (_shell, overlay) = overlay();
        overlay.grab();
        overlay.grab();
        assert_eq!(overlay.state(), GrabState::Grabbed);
        assert!(overlay.actor().is_visible());

        overlay.ungrab();
        overlay.ungrab();
        assert_eq!(overlay.state(), GrabState::Released);
        assert!(!overlay.actor().is_visible());
    }

    #[test]
    fn press_releases_and_propagates() {
        let (shell, overlay) = overlay();
        let actor = shell.mock_actor(overlay.actor().id()).unwrap();
        overlay.grab();

        assert_eq!(
            actor.deliver(InputEvent::Motion { x: 3.0, y: 4.0 }),
            vec![EventPropagation::Propagate]
        );
        assert_eq!(overlay.state(), GrabState::Grabbed);

        assert_eq!(
            actor.deliver(InputEvent::ButtonPress { button: 1 }),
            vec![EventPropagation::Propagate]
        );
        assert_eq!(overlay.state(), GrabState::Released);
        assert!(!actor.is_visible());
    }

    #[test]
    fn touch_begin_releases() {
        let (shell, overlay) = overlay();
        let actor = shell.mock_actor(overlay.actor().id()).unwrap();
        overlay.grab();
        actor.deliver(InputEvent::TouchBegin);
        assert_eq!(overlay.state(), GrabState::Released);
    }

    #[test]
    fn press_while_released_changes_nothing() {
        let (shell, overlay) = overlay();
        let actor = shell.mock_actor(overlay.actor().id()).unwrap();
        actor.deliver(InputEvent::ButtonPress { button: 1 });
        assert_eq!(overlay.state(), GrabState::Released);
    }

    #[test]
    fn tint_is_applied() {
        let shell = MockShell::new();
        let overlay = GrabOverlay::new(&*shell, Some([255, 0, 0, 64]));
        let actor = shell.mock_actor(overlay.actor().id()).unwrap();
        assert_eq!(actor.background_color(), Some([255, 0, 0, 64]));
    }

    #[test]
    fn destroy_is_final() {
        let (shell, mut overlay) = overlay();
        let actor = shell.mock_actor(overlay.actor().id()).unwrap();
        overlay.grab();
        overlay.destroy();
        overlay.destroy();
        assert!(actor.is_destroyed());
        assert_eq!(actor.input_handler_count(), 0);
        assert_eq!(overlay.state(), GrabState::Released);

        overlay.grab();
        assert_eq!(overlay.state(), GrabState::Released);
    }
}
