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

//! Host-side bridge between a compositor and an on-screen keyboard engine.

pub mod config;
pub mod engine;
pub mod extension;
pub mod geometry;
pub mod grab;
pub mod host;
pub mod input_sources;
pub mod instance;
pub mod language_popup;
pub mod mock;
pub mod monitors;
pub mod prelude;
pub mod replay;
pub mod scheduler;
pub mod signal;
pub mod utils;
pub mod view_registry;
pub mod virtual_input;
