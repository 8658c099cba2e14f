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

//! Entry point for the compositor: replaces the built-in keyboard while
//! enabled and owns the current keyboard session.

use std::rc::Rc;

use crate::config::BridgeConfig;
use crate::engine::Engine;
use crate::host::HostServices;
use crate::instance::Instance;
use crate::prelude::*;

/// Builds a fresh engine for each session.
pub type EngineFactory = Box<dyn Fn() -> Result<Rc<dyn Engine>>>;

pub struct OskExtension {
    services: HostServices,
    engine_factory: EngineFactory,
    config: BridgeConfig,
    enabled: bool,
    instance: Option<Rc<Instance>>,
}

impl OskExtension {
    pub fn new(services: HostServices, engine_factory: EngineFactory, config: BridgeConfig) -> Self {
        Self {
            services,
            engine_factory,
            config,
            enabled: false,
            instance: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn instance(&self) -> Option<&Rc<Instance>> {
        self.instance.as_ref()
    }

    #[instrument(skip(self), level = "debug")]
    pub fn enable(&mut self) -> Result<()> {
        if self.enabled {
            debug!("already enabled");
            return Ok(());
        }
        self.services.shell.set_builtin_keyboard_suppressed(true);
        self.enabled = true;
        if let Err(err) = self.ensure_instance() {
            self.enabled = false;
            self.services.shell.set_builtin_keyboard_suppressed(false);
            return Err(err);
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    pub fn disable(&mut self) {
        if !self.enabled {
            debug!("already disabled");
            return;
        }
        self.enabled = false;
        self.services.shell.set_builtin_keyboard_suppressed(false);
        if let Some(instance) = self.instance.take() {
            instance.destroy();
        }
    }

    /// Shows or hides the keyboard, starting a new session if the previous
    /// one is gone.
    #[instrument(skip(self), level = "debug")]
    pub fn toggle_visible(&mut self) -> Result<()> {
        if !self.enabled {
            warn!("toggle_visible while disabled");
            return Ok(());
        }
        let instance = self.ensure_instance()?;
        if let Some(engine) = instance.engine() {
            engine.toggle_visible();
        }
        Ok(())
    }

    fn ensure_instance(&mut self) -> Result<Rc<Instance>> {
        if let Some(instance) = &self.instance
            && !instance.is_destroyed()
        {
            return Ok(instance.clone());
        }
        self.instance = None;

        let engine = (self.engine_factory)().context(loc!(), "creating keyboard engine")?;
        let instance = Instance::new(self.services.clone(), engine, self.config.clone());
        if let Err(err) = instance.start() {
            instance.destroy();
            return Err(err);
        }
        info!("keyboard instance started");
        self.instance = Some(instance.clone());
        Ok(instance)
    }
}

impl Drop for OskExtension {
    fn drop(&mut self) {
        self.disable();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::host::ActorRole;
    use crate::mock::EngineCall;
    use crate::mock::MockEngine;
    use crate::mock::MockHost;

    struct Fixture {
        extension: OskExtension,
        engines: Rc<RefCell<Vec<Rc<MockEngine>>>>,
        host: MockHost,
    }

    impl Fixture {
        fn new() -> Self {
            let host = MockHost::new().unwrap();
            let engines: Rc<RefCell<Vec<Rc<MockEngine>>>> = Rc::default();
            let factory: EngineFactory = {
                let engines = engines.clone();
                Box::new(move || {
                    let engine = MockEngine::new();
                    engines.borrow_mut().push(engine.clone());
                    Ok(engine as Rc<dyn Engine>)
                })
            };
            let extension = OskExtension::new(host.services(), factory, BridgeConfig::default());
            Self {
                extension,
                engines,
                host,
            }
        }

        fn engine(&self, n: usize) -> Rc<MockEngine> {
            self.engines.borrow()[n].clone()
        }
    }

    #[test]
    fn enable_suppresses_builtin_keyboard_and_starts() {
        let mut f = Fixture::new();
        f.extension.enable().unwrap();
        assert!(f.host.shell.is_builtin_keyboard_suppressed());
        assert!(f.extension.instance().is_some());
        assert_eq!(f.engine(0).calls(), vec![EngineCall::Startup]);

        f.extension.enable().unwrap();
        assert_eq!(f.engines.borrow().len(), 1);
    }

    #[test]
    fn disable_restores_and_destroys() {
        let mut f = Fixture::new();
        f.extension.enable().unwrap();
        f.engine(0).add_view("keyboard", true);

        f.extension.disable();
        assert!(!f.host.shell.is_builtin_keyboard_suppressed());
        assert!(f.extension.instance().is_none());
        assert!(f.host.shell.live_actors(ActorRole::ToplevelView).is_empty());
        assert!(f.engine(0).calls().contains(&EngineCall::Shutdown));

        f.extension.disable();
        assert!(!f.host.shell.is_builtin_keyboard_suppressed());
    }

    #[test]
    fn toggle_recreates_a_destroyed_instance() {
        let mut f = Fixture::new();
        f.extension.enable().unwrap();
        f.extension.toggle_visible().unwrap();
        assert!(f.engine(0).is_visible());

        f.extension.instance().unwrap().destroy();
        f.extension.toggle_visible().unwrap();
        assert_eq!(f.engines.borrow().len(), 2);
        assert_eq!(
            f.engine(1).calls(),
            vec![EngineCall::Startup, EngineCall::ToggleVisible]
        );
    }

    #[test]
    fn toggle_while_disabled_does_nothing() {
        let mut f = Fixture::new();
        f.extension.toggle_visible().unwrap();
        assert!(f.engines.borrow().is_empty());
    }

    #[test]
    fn failed_startup_leaves_no_instance() {
        let host = MockHost::new().unwrap();
        let factory: EngineFactory = Box::new(|| {
            let engine = MockEngine::new();
            engine.fail_next_startup();
            Ok(engine as Rc<dyn Engine>)
        });
        let mut extension = OskExtension::new(host.services(), factory, BridgeConfig::default());
        assert!(extension.enable().is_err());
        assert!(extension.instance().is_none());
        assert!(!extension.is_enabled());
        assert!(!host.shell.is_builtin_keyboard_suppressed());
        assert!(host.shell.live_actors(ActorRole::GrabOverlay).is_empty());
        assert_eq!(host.input_sources.handler_count(), 0);
    }

    #[test]
    fn dropping_the_extension_disables_it() {
        let f = Fixture::new();
        let Fixture {
            mut extension,
            host,
            ..
        } = f;
        extension.enable().unwrap();
        drop(extension);
        assert!(!host.shell.is_builtin_keyboard_suppressed());
        assert_eq!(host.input_sources.handler_count(), 0);
    }
}
