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

//! Compositor actors backing the engine's views, keyed by view name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::mem;
use std::rc::Rc;
use std::rc::Weak;

use crate::engine::View;
use crate::host::Actor;
use crate::host::ActorId;
use crate::host::ActorRole;
use crate::host::Shell;
use crate::prelude::*;
use crate::signal::Subscription;

struct Entry {
    view: Weak<dyn View>,
    actor: Rc<dyn Actor>,
    cursor_sub: Subscription,
    destroy_sub: Subscription,
}

impl Entry {
    /// Disconnects from the view and the actor, then destroys the actor
    /// unless somebody beat us to it.
    fn tear_down(self) {
        let Self {
            view: _,
            actor,
            cursor_sub,
            destroy_sub,
        } = self;
        destroy_sub.close();
        cursor_sub.close();
        if !actor.is_destroyed() {
            actor.destroy();
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, Entry>,
    /// Views whose actor the compositor destroyed before the engine removed
    /// the view.
    orphaned: HashSet<String>,
}

pub struct ViewRegistry {
    shell: Rc<dyn Shell>,
    state: Rc<RefCell<RegistryState>>,
}

impl ViewRegistry {
    pub fn new(shell: Rc<dyn Shell>) -> Self {
        Self {
            shell,
            state: Rc::new(RefCell::new(RegistryState::default())),
        }
    }

    pub fn on_view_added(&self, view: Rc<dyn View>) {
        let name = view.name();
        let stale = {
            let mut state = self.state.borrow_mut();
            state.orphaned.remove(&name);
            state.entries.remove(&name)
        };
        if let Some(stale) = stale {
            protocol_violation(loc!(), format!("view {name:?} added twice"));
            stale.tear_down();
        }

        let actor = self.shell.create_actor(ActorRole::ToplevelView);
        actor.set_reactive(view.is_reactive_type());
        self.shell.add_chrome(&actor);

        let cursor_sub = {
            let shell = self.shell.clone();
            view.connect_cursor_change_request(Box::new(move |cursor| shell.set_cursor(cursor)))
        };
        let destroy_sub = {
            let state = Rc::downgrade(&self.state);
            let name = name.clone();
            let actor_id = actor.id();
            actor.connect_destroy(Box::new(move || {
                let Some(state) = state.upgrade() else {
                    return;
                };
                Self::on_actor_destroyed(&state, &name, actor_id);
            }))
        };

        debug!(
            "view {name:?} added (actor {}, reactive: {})",
            actor.id(),
            actor.is_reactive()
        );
        self.state.borrow_mut().entries.insert(
            name,
            Entry {
                view: Rc::downgrade(&view),
                actor,
                cursor_sub,
                destroy_sub,
            },
        );
    }

    fn on_actor_destroyed(state: &RefCell<RegistryState>, name: &str, actor_id: ActorId) {
        let entry = {
            let mut state = state.borrow_mut();
            if state
                .entries
                .get(name)
                .is_none_or(|entry| entry.actor.id() != actor_id)
            {
                return;
            }
            state.orphaned.insert(name.to_string());
            state.entries.remove(name)
        };
        debug!("actor {actor_id} of view {name:?} destroyed by the compositor");
        // The actor is already gone; only the subscriptions need releasing.
        drop(entry);
    }

    pub fn on_view_removed(&self, view: &dyn View) {
        let name = view.name();
        let (entry, was_orphaned) = {
            let mut state = self.state.borrow_mut();
            let entry = state.entries.remove(&name);
            let was_orphaned = state.orphaned.remove(&name);
            (entry, was_orphaned)
        };
        match entry {
            Some(entry) => {
                debug!("view {name:?} removed (actor {})", entry.actor.id());
                entry.tear_down();
            },
            None if was_orphaned => {
                debug!("view {name:?} removed after its actor was destroyed");
            },
            None => protocol_violation(loc!(), format!("removal of unknown view {name:?}")),
        }
    }

    pub fn get_actor_of_view(&self, view: &dyn View) -> Option<Rc<dyn Actor>> {
        self.actor_of(&view.name())
    }

    pub fn actor_of(&self, name: &str) -> Option<Rc<dyn Actor>> {
        self.state
            .borrow()
            .entries
            .get(name)
            .map(|entry| entry.actor.clone())
    }

    /// The view most recently added under `name`, if it is still alive.
    pub fn view_of(&self, name: &str) -> Option<Rc<dyn View>> {
        self.state
            .borrow()
            .entries
            .get(name)
            .and_then(|entry| entry.view.upgrade())
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_orphaned(&self, name: &str) -> bool {
        self.state.borrow().orphaned.contains(name)
    }

    /// Destroys every remaining actor. Removals the engine sends afterwards
    /// are handled as for compositor-destroyed actors.
    pub fn clear(&self) {
        let entries = {
            let mut state = self.state.borrow_mut();
            let entries = mem::take(&mut state.entries);
            state.orphaned.extend(entries.keys().cloned());
            entries
        };
        if !entries.is_empty() {
            debug!("destroying {} remaining view actors", entries.len());
        }
        for (_, entry) in entries {
            entry.tear_down();
        }
    }
}

impl Drop for ViewRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
