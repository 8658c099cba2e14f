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

use std::env;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ron::Options;
use ron::extensions::Extensions;
use serde::Deserialize;
use serde::Serialize;
use serde_derive::Deserialize as DeriveDeserialize;
use serde_derive::Serialize as DeriveSerialize;
use tracing::Level;
use tracing::metadata::ParseLevelError;

use crate::prelude::*;

fn fallback_config_parent_dir() -> Result<PathBuf> {
    Ok(Path::join(
        &home::home_dir().ok_or(anyhow!("unable to determine home dir"))?,
        ".config",
    ))
}

pub fn default_config_file_dir() -> PathBuf {
    Path::join(
        &env::var("XDG_CONFIG_HOME")
            .debug(loc!())
            .ok()
            .map(Into::into)
            .or(fallback_config_parent_dir().log(loc!()).ok())
            .unwrap_or_else(|| "/etc".into()),
        "oskbridge",
    )
}

pub fn default_config_file(name: &str) -> PathBuf {
    Path::join(&default_config_file_dir(), format!("{name}.ron"))
}

pub fn parse_ron<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T> {
    Options::default()
        .with_default_extension(Extensions::IMPLICIT_SOME)
        .from_str(s)
        .map_err(|e| anyhow!("{e}"))
}

pub fn maybe_read_ron_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        debug!("config file does not exist at {path:?}");
        return Ok(None);
    }

    let config_str = std::fs::read_to_string(path)
        .with_context(loc!(), || format!("unable to read config file {path:?}"))?;
    let config: T = parse_ron(&config_str)
        .with_context(loc!(), || format!("error parsing config file {path:?}"))?;
    Ok(Some(config))
}

pub fn default_config_string<T: Serialize + Default>() -> Result<String> {
    ron::ser::to_string_pretty::<T>(&Default::default(), ron::ser::PrettyConfig::default())
        .location(loc!())
}

pub fn print_default_config_and_exit<T: Serialize + Default>() -> ! {
    match default_config_string::<T>() {
        Ok(s) => {
            println!("{s}");
            std::process::exit(0);
        },
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(1);
        },
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SerializableLevel(pub Level);

impl FromStr for SerializableLevel {
    type Err = ParseLevelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Level::from_str(s)?))
    }
}

impl Serialize for SerializableLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for SerializableLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self(Level::from_str(&s).map_err(serde::de::Error::custom)?))
    }
}

/// Settings the compositor may hand to [`crate::instance::Instance`]. Host
/// settings reported by the shell take precedence over the timing and
/// threshold defaults here.
#[derive(Clone, Debug, PartialEq, DeriveDeserialize, DeriveSerialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub double_click_time_ms: u32,
    /// Pixels.
    pub drag_threshold: f64,
    /// RGBA; the grab overlay stays transparent when unset.
    pub grab_overlay_tint: Option<[u8; 4]>,
    /// Where along the anchor rectangle the language popup points, 0 to 1.
    pub popup_alignment: f64,
}

impl BridgeConfig {
    pub fn double_click_time(&self) -> Duration {
        Duration::from_millis(self.double_click_time_ms.into())
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_config_file("bridge"));
        let config = maybe_read_ron_file::<Self>(&path)
            .location(loc!())?
            .unwrap_or_default();
        config
            .validate()
            .with_context(loc!(), || format!("invalid config file {path:?}"))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.popup_alignment) {
            bail!(
                "popup_alignment must be between 0 and 1, got {}",
                self.popup_alignment
            );
        }
        if self.drag_threshold.is_nan() || self.drag_threshold < 0.0 {
            bail!(
                "drag_threshold must not be negative, got {}",
                self.drag_threshold
            );
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            double_click_time_ms: 200,
            drag_threshold: 8.0,
            grab_overlay_tint: None,
            popup_alignment: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_config_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.double_click_time(), Duration::from_millis(200));
        assert_eq!(config.drag_threshold, 8.0);
        assert_eq!(config.grab_overlay_tint, None);
        assert_eq!(config.popup_alignment, 0.5);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: BridgeConfig =
            parse_ron("(drag_threshold: 12.5, grab_overlay_tint: (255, 0, 0, 64))").unwrap();
        assert_eq!(config.drag_threshold, 12.5);
        assert_eq!(config.grab_overlay_tint, Some([255, 0, 0, 64]));
        assert_eq!(config.double_click_time_ms, 200);
    }

    #[test]
    fn default_config_round_trips_through_ron() {
        let s = default_config_string::<BridgeConfig>().unwrap();
        let config: BridgeConfig = parse_ron(&s).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = env::temp_dir().join("oskbridge-test-does-not-exist.ron");
        assert_eq!(maybe_read_ron_file::<BridgeConfig>(&path).unwrap(), None);
        assert_eq!(
            BridgeConfig::load(Some(&path)).unwrap(),
            BridgeConfig::default()
        );
    }

    #[test]
    fn out_of_range_alignment_in_file_is_rejected() {
        let path = env::temp_dir().join(format!(
            "oskbridge-test-bad-alignment-{}.ron",
            std::process::id()
        ));
        std::fs::write(&path, "(popup_alignment: 7.5)").unwrap();
        let res = BridgeConfig::load(Some(&path));
        std::fs::remove_file(&path).unwrap();

        let msg = format!("{:#}", res.unwrap_err());
        assert!(msg.contains("popup_alignment"), "{msg}");
    }

    #[test]
    fn validate_accepts_the_edges() {
        for popup_alignment in [0.0, 1.0] {
            let config = BridgeConfig {
                popup_alignment,
                ..Default::default()
            };
            config.validate().unwrap();
        }
        let config = BridgeConfig {
            drag_threshold: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn level_parses_and_serializes() {
        let level: SerializableLevel = "warn".parse().unwrap();
        assert_eq!(level, SerializableLevel(Level::WARN));
        assert_eq!(ron::to_string(&level).unwrap(), "\"WARN\"");
        assert!("loud".parse::<SerializableLevel>().is_err());
    }
}
