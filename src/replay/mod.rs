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

//! Scripted scenarios against the mock compositor.
//!
//! A scenario is a RON file holding the initial host setup and a list of
//! steps. Each step drives either the compositor side (input source switches,
//! monitor changes, clicks) or the engine side (views, key injection, popup
//! requests), and the run produces a line-per-event report.

pub mod config;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use itertools::Itertools;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use crate::config::BridgeConfig;
use crate::config::parse_ron;
use crate::engine::Engine;
use crate::engine::EngineHost;
use crate::engine::LanguageSelection;
use crate::extension::EngineFactory;
use crate::extension::OskExtension;
use crate::geometry::Point;
use crate::geometry::Rectangle;
use crate::host::Actor;
use crate::host::ActorRole;
use crate::host::CursorType;
use crate::host::InputEvent;
use crate::host::InputSource;
use crate::host::MonitorInfo;
use crate::host::PopupAnimation;
use crate::host::PopupMenu;
use crate::mock::MockEngine;
use crate::mock::MockHost;
use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Step {
    Enable,
    Disable,
    ToggleVisible,
    /// Destroys the current session without disabling the extension.
    DestroyInstance,

    AddView { name: String, reactive: bool },
    RemoveView { name: String },
    /// Places the view's actor on the stage.
    MoveView { name: String, x: f64, y: f64, scale: f64 },
    RequestCursor { view: String, cursor: CursorType },

    SelectSource(usize),
    ReplaceSources(Vec<InputSource>),
    SetMonitors(Vec<MonitorInfo>),
    SetFocusMonitor(Option<usize>),

    Keyval { keyval: u32, pressed: bool },
    Keycode { keycode: u32, pressed: bool },

    GrabPointer,
    UngrabPointer,
    /// A click anywhere on the stage, seen by the grab overlay.
    Click { button: u32 },

    ShowLanguageSelection {
        view: String,
        rect: Rectangle<f64>,
        selection: LanguageSelection,
    },
    ActivateMenuItem(usize),
    CloseMenu,

    /// Starts an engine timer ticking `ticks` times.
    StartTimer { interval_ms: u64, ticks: u32 },

    Dispatch,
    Wait { ms: u64 },

    ReportGroup,
    ReportMonitors { view: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Script {
    pub monitors: Option<Vec<MonitorInfo>>,
    pub input_sources: Option<Vec<InputSource>>,
    pub max_layouts_per_group: Option<u32>,
    pub steps: Vec<Step>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            monitors: None,
            input_sources: None,
            max_layouts_per_group: None,
            steps: vec![Step::Enable],
        }
    }
}

impl Script {
    pub fn read(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(loc!(), || format!("unable to read script {path:?}"))?;
        parse_ron(&s).with_context(loc!(), || format!("error parsing script {path:?}"))
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Report {
    pub lines: Vec<String>,
}

impl Report {
    fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!("{line}");
        self.lines.push(line);
    }

    pub fn render(&self) -> String {
        self.lines.iter().join("\n")
    }
}

struct Replay {
    host: MockHost,
    extension: OskExtension,
    engines: Rc<RefCell<Vec<Rc<MockEngine>>>>,
    report: Report,
}

impl Replay {
    fn new(script: &Script, config: &BridgeConfig) -> Result<Self> {
        let host = MockHost::new().location(loc!())?;
        if let Some(monitors) = &script.monitors {
            host.monitors.set_monitors(monitors.clone());
        }
        if let Some(sources) = &script.input_sources {
            host.input_sources.replace_sources(sources.clone());
        }
        if let Some(max) = script.max_layouts_per_group {
            host.input_sources.set_max_layouts_per_group(max);
        }

        let engines: Rc<RefCell<Vec<Rc<MockEngine>>>> = Rc::default();
        let factory: EngineFactory = {
            let engines = engines.clone();
            Box::new(move || {
                let engine = MockEngine::new();
                engines.borrow_mut().push(engine.clone());
                Ok(engine as Rc<dyn Engine>)
            })
        };
        let extension = OskExtension::new(host.services(), factory, config.clone());
        Ok(Self {
            host,
            extension,
            engines,
            report: Report::default(),
        })
    }

    fn engine(&self) -> Result<Rc<MockEngine>> {
        self.engines
            .borrow()
            .last()
            .cloned()
            .ok_or_else(|| anyhow!("no engine, missing Enable step?"))
    }

    fn engine_host(&self) -> Result<Rc<dyn EngineHost>> {
        self.engine()?
            .host()
            .ok_or_else(|| anyhow!("engine is not running"))
    }

    /// Reports engine calls made since the last step.
    fn drain_engine_calls(&mut self) {
        let Ok(engine) = self.engine() else {
            return;
        };
        for call in engine.calls() {
            self.report.push(format!("engine: {call:?}"));
        }
        engine.clear_calls();
    }

    #[instrument(skip(self), level = "debug")]
    fn step(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Enable => self.extension.enable()?,
            Step::Disable => self.extension.disable(),
            Step::ToggleVisible => self.extension.toggle_visible()?,
            Step::DestroyInstance => {
                if let Some(instance) = self.extension.instance() {
                    instance.destroy();
                }
            },
            Step::AddView { name, reactive } => {
                self.engine()?.add_view(name, *reactive);
            },
            Step::RemoveView { name } => self.engine()?.remove_view(name),
            Step::MoveView { name, x, y, scale } => {
                let actor_id = self
                    .extension
                    .instance()
                    .and_then(|instance| instance.views().actor_of(name))
                    .ok_or_else(|| anyhow!("view {name:?} has no actor"))?
                    .id();
                let actor = self
                    .host
                    .shell
                    .mock_actor(actor_id)
                    .ok_or_else(|| anyhow!("actor {actor_id} not found"))?;
                actor.set_transform(Point::new(*x, *y), *scale);
            },
            Step::RequestCursor { view, cursor } => {
                self.engine()?
                    .view(view)
                    .ok_or_else(|| anyhow!("unknown view {view:?}"))?
                    .request_cursor(*cursor);
                self.report
                    .push(format!("cursors: {:?}", self.host.shell.cursors()));
            },
            Step::SelectSource(position) => self.host.input_sources.select(*position),
            Step::ReplaceSources(sources) => {
                self.host.input_sources.replace_sources(sources.clone())
            },
            Step::SetMonitors(monitors) => {
                self.host.monitors.set_monitors(monitors.clone());
                self.host.monitors.emit_monitors_changed();
            },
            Step::SetFocusMonitor(index) => self.host.monitors.set_focus(*index),
            Step::Keyval { keyval, pressed } => {
                self.engine_host()?.send_keyval_event(*keyval, *pressed);
                self.report_last_key_event();
            },
            Step::Keycode { keycode, pressed } => {
                self.engine_host()?.send_keycode_event(*keycode, *pressed);
                self.report_last_key_event();
            },
            Step::GrabPointer => self.engine_host()?.grab_pointer(),
            Step::UngrabPointer => self.engine_host()?.ungrab_pointer(),
            Step::Click { button } => {
                for overlay in self.host.shell.live_actors(ActorRole::GrabOverlay) {
                    if overlay.is_visible() {
                        overlay.deliver(InputEvent::ButtonPress { button: *button });
                    }
                }
            },
            Step::ShowLanguageSelection {
                view,
                rect,
                selection,
            } => {
                let view = self
                    .engine()?
                    .view(view)
                    .ok_or_else(|| anyhow!("unknown view {view:?}"))?;
                self.engine_host()?
                    .show_language_selection(&*view, *rect, selection.clone());
            },
            Step::ActivateMenuItem(index) => {
                let menu = self
                    .host
                    .shell
                    .last_menu()
                    .ok_or_else(|| anyhow!("no menu was shown"))?;
                menu.activate(*index);
            },
            Step::CloseMenu => {
                if let Some(menu) = self.host.shell.last_menu() {
                    menu.close(PopupAnimation::Full);
                }
            },
            Step::StartTimer { interval_ms, ticks } => {
                let remaining = Rc::new(std::cell::Cell::new(*ticks));
                let id = self.engine_host()?.start_timer(
                    Duration::from_millis(*interval_ms),
                    Box::new(move || {
                        let left = remaining.get().saturating_sub(1);
                        remaining.set(left);
                        trace!("timer tick, {left} left");
                        left > 0
                    }),
                );
                self.report.push(format!("timer started: {id:?}"));
            },
            Step::Dispatch => self.host.dispatch()?,
            Step::Wait { ms } => self.host.run_for(Duration::from_millis(*ms))?,
            Step::ReportGroup => {
                let host = self.engine_host()?;
                self.report.push(format!(
                    "group: {} {:?}",
                    host.current_group(),
                    host.current_rules_names()
                ));
            },
            Step::ReportMonitors { view } => {
                let host = self.engine_host()?;
                let count = host.monitor_count();
                let geometries = (0..count)
                    .map(|i| format!("{:?}", host.monitor_geometry(i).to_array()))
                    .join(", ");
                self.report.push(format!(
                    "monitors: {count} [{geometries}] primary {} active {}",
                    host.primary_monitor(),
                    host.monitor_at_active_window()
                ));
                if let Some(name) = view {
                    let view = self
                        .engine()?
                        .view(name)
                        .ok_or_else(|| anyhow!("unknown view {name:?}"))?;
                    self.report.push(format!(
                        "view {name:?} on monitor {}",
                        host.monitor_at_view(&*view)
                    ));
                }
            },
        }
        Ok(())
    }

    fn report_last_key_event(&mut self) {
        if let Some(event) = self.host.shell.key_events().last() {
            self.report.push(format!("key: {event:?}"));
        }
    }

    fn summarize(&mut self) {
        let instance = self.extension.instance();
        let views = instance.map_or(0, |instance| instance.views().len());
        let pending = instance.map_or(0, |instance| instance.pending_callback_count());
        let live_actors = self
            .host
            .shell
            .actors()
            .iter()
            .filter(|actor| !actor.is_destroyed())
            .count();
        self.report.push(format!(
            "end: enabled {} views {views} pending callbacks {pending} live actors {live_actors} menu managers {}",
            self.extension.is_enabled(),
            self.host.shell.live_menu_managers()
        ));
    }
}

/// Runs `script` to completion. A failing step aborts the run with the step
/// number attached.
pub fn run(script: &Script, config: &BridgeConfig) -> Result<Report> {
    let mut replay = Replay::new(script, config)?;
    for (n, step) in script.steps.iter().enumerate() {
        replay.report.push(format!("step {n}: {step:?}"));
        replay
            .step(step)
            .with_context(loc!(), || format!("step {n} ({step:?}) failed"))?;
        replay.drain_engine_calls();
    }
    replay.summarize();
    Ok(replay.report)
}
