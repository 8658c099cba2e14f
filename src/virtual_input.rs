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

use std::rc::Rc;

use crate::host::KeyState;
use crate::host::Shell;
use crate::host::VirtualInputDevice;
use crate::prelude::*;

/// Injects the engine's synthetic key events. Values are passed through
/// unchecked; range checking is up to the engine.
pub struct VirtualKeyboard {
    shell: Rc<dyn Shell>,
    device: Box<dyn VirtualInputDevice>,
}

impl VirtualKeyboard {
    pub fn new(shell: Rc<dyn Shell>) -> Self {
        let device = shell.create_virtual_keyboard();
        Self { shell, device }
    }

    pub fn send_keyval(&self, keyval: u32, pressed: bool) {
        let state = KeyState::from(pressed);
        trace!("keyval {keyval:#x} {state:?}");
        self.device
            .notify_keyval(self.shell.current_event_time(), keyval, state);
    }

    pub fn send_keycode(&self, keycode: u32, pressed: bool) {
        let state = KeyState::from(pressed);
        trace!("keycode {keycode} {state:?}");
        self.device
            .notify_key(self.shell.current_event_time(), keycode, state);
    }
}
