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

//! Maps the host's input sources onto XKB layout groups.
//!
//! The host packs its XKB layouts into keymaps of at most
//! `max_layouts_per_group` groups, but other sources (input-method engines)
//! are interleaved in the same list and don't occupy a group. The group of
//! the active source is therefore the number of XKB sources up to and
//! including it, minus one, modulo the usable group count.

use std::rc::Rc;

use crate::engine::RulesNames;
use crate::host::InputMethodEngines;
use crate::host::InputSource;
use crate::host::InputSourceKind;
use crate::host::InputSourceManager;
use crate::host::XkbInfo;
use crate::prelude::*;
use crate::signal::Subscription;

/// Group of the source at position `active_index` in `sources`.
///
/// The modulo is Euclidean: with no XKB source at or before the active one
/// the result is the last usable group rather than a negative number.
pub fn group_index(sources: &[InputSource], active_index: usize, max_layouts_per_group: u32) -> u32 {
    let modulus = i64::from(max_layouts_per_group) - 1;
    if modulus <= 0 {
        protocol_violation(
            loc!(),
            format!("max_layouts_per_group is {max_layouts_per_group}, need at least 2"),
        );
        return 0;
    }

    let xkb_count = sources
        .iter()
        .take(active_index.saturating_add(1))
        .filter(|source| source.kind == InputSourceKind::Xkb)
        .count();
    let xkb_count = i64::try_from(xkb_count).unwrap_or(i64::MAX);

    // Lies in [0, modulus) and modulus <= u32::MAX - 1.
    (xkb_count - 1).rem_euclid(modulus) as u32
}

pub struct GroupResolver {
    input_sources: Rc<dyn InputSourceManager>,
    xkb_info: Rc<dyn XkbInfo>,
    input_methods: Option<Rc<dyn InputMethodEngines>>,
}

impl GroupResolver {
    pub fn new(
        input_sources: Rc<dyn InputSourceManager>,
        xkb_info: Rc<dyn XkbInfo>,
        input_methods: Option<Rc<dyn InputMethodEngines>>,
    ) -> Self {
        Self {
            input_sources,
            xkb_info,
            input_methods,
        }
    }

    pub fn current_group(&self) -> u32 {
        let Some(current) = self.input_sources.current_source() else {
            debug!("no active input source, using group 0");
            return 0;
        };
        let group = group_index(
            &self.input_sources.input_sources(),
            current.index,
            self.input_sources.max_layouts_per_group(),
        );
        debug!("source {:?} (index {}) is group {group}", current.id, current.index);
        group
    }

    pub fn current_rules_names(&self) -> RulesNames {
        let Some(current) = self.input_sources.current_source() else {
            return RulesNames::default();
        };
        let names = match &current.kind {
            InputSourceKind::Xkb => match self.xkb_info.layout_info(&current.id) {
                Some(info) => RulesNames::with_layout(info.layout, info.variant),
                None => {
                    debug!("no xkb layout info for {:?}", current.id);
                    RulesNames::default()
                },
            },
            InputSourceKind::InputMethod => self
                .input_methods
                .as_ref()
                .and_then(|engines| engines.engine_desc(&current.id))
                .map(|desc| RulesNames::with_layout(desc.layout, desc.variant))
                .unwrap_or_default(),
            InputSourceKind::Other(kind) => {
                trace!("source {:?} of kind {kind:?} has no layout", current.id);
                RulesNames::default()
            },
        };
        debug!("rules names for {:?}: {names:?}", current.id);
        names
    }

    /// Calls `on_changed` once per host "current source changed" or "sources
    /// changed" notification, for as long as the returned subscriptions live.
    pub fn watch(&self, on_changed: Rc<dyn Fn()>) -> [Subscription; 2] {
        let current_changed = {
            let on_changed = on_changed.clone();
            self.input_sources
                .connect_current_source_changed(Box::new(move || {
                    trace!("current input source changed");
                    on_changed();
                }))
        };
        let sources_changed = self
            .input_sources
            .connect_sources_changed(Box::new(move || {
                trace!("input sources changed");
                on_changed();
            }));
        [current_changed, sources_changed]
    }
}
