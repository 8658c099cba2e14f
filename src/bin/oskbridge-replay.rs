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

use clap::Parser;
use oskbridge::prelude::*;
use oskbridge::replay;
use oskbridge::replay::Script;
use oskbridge::replay::config::ReplayArgs;
use oskbridge::utils;

pub fn main() -> Result<()> {
    let args = ReplayArgs::parse();
    let script_path = args.script.clone();
    let config = args.load_config().location(loc!())?;
    utils::configure_tracing(
        config.stderr_log_level.0,
        config.log_file.as_ref(),
        config.file_log_level.0,
    )
    .location(loc!())?;
    utils::log_panics();

    let script = match script_path {
        Some(path) => Script::read(&path).location(loc!())?,
        None => {
            warn!("no script given, running the default scenario");
            Script::default()
        },
    };
    info!("replaying {} steps", script.steps.len());

    let report = replay::run(&script, &config.bridge).location(loc!())?;
    println!("{}", report.render());
    Ok(())
}
