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

use std::path::PathBuf;

use clap::Parser;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use tracing::Level;

use crate::config;
use crate::config::BridgeConfig;
use crate::config::SerializableLevel;
use crate::prelude::*;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub log_file: Option<PathBuf>,
    pub stderr_log_level: SerializableLevel,
    pub file_log_level: SerializableLevel,
    pub bridge: BridgeConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            stderr_log_level: SerializableLevel(Level::WARN),
            file_log_level: SerializableLevel(Level::TRACE),
            bridge: BridgeConfig::default(),
        }
    }
}

/// Replays a scenario against the mock compositor and prints what the bridge
/// did.
#[derive(Parser, Debug, Clone)]
#[command(name = "oskbridge-replay")]
pub struct ReplayArgs {
    /// RON scenario file.
    #[arg(value_name = "SCRIPT")]
    pub script: Option<PathBuf>,

    #[arg(long, value_name = "BOOL", default_value_t = false, action = clap::ArgAction::Set)]
    pub print_default_config_and_exit: bool,

    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL")]
    pub stderr_log_level: Option<SerializableLevel>,

    #[arg(long, value_name = "LEVEL")]
    pub file_log_level: Option<SerializableLevel>,

    #[arg(long, value_name = "MS")]
    pub double_click_time_ms: Option<u32>,

    #[arg(long, value_name = "PX")]
    pub drag_threshold: Option<f64>,

    #[arg(long, value_name = "FRACTION")]
    pub popup_alignment: Option<f64>,
}

impl ReplayArgs {
    pub fn load_config(self) -> Result<ReplayConfig> {
        if self.print_default_config_and_exit {
            config::print_default_config_and_exit::<ReplayConfig>();
        }

        let config_file = self
            .config_file
            .clone()
            .unwrap_or_else(|| config::default_config_file("replay"));
        let mut cfg = ReplayConfig::default();
        if let Some(from_file) =
            config::maybe_read_ron_file::<ReplayConfig>(&config_file).location(loc!())?
        {
            cfg = from_file;
        }

        if let Some(v) = self.log_file {
            cfg.log_file = Some(v);
        }
        if let Some(v) = self.stderr_log_level {
            cfg.stderr_log_level = v;
        }
        if let Some(v) = self.file_log_level {
            cfg.file_log_level = v;
        }
        if let Some(v) = self.double_click_time_ms {
            cfg.bridge.double_click_time_ms = v;
        }
        if let Some(v) = self.drag_threshold {
            cfg.bridge.drag_threshold = v;
        }
        if let Some(v) = self.popup_alignment {
            cfg.bridge.popup_alignment = v;
        }

        cfg.bridge.validate().location(loc!())?;
        Ok(cfg)
    }
}
