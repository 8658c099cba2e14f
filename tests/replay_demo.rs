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

use std::path::Path;

use oskbridge::config::BridgeConfig;
use oskbridge::replay;
use oskbridge::replay::Script;

fn demo(name: &str) -> Script {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join(name);
    Script::read(&path).unwrap()
}

#[test]
fn basic_demo_runs_clean() {
    let report = replay::run(&demo("basic.ron"), &BridgeConfig::default()).unwrap();
    let text = report.render();

    assert!(text.contains("view \"keyboard\" on monitor 1"), "{text}");
    assert!(text.contains("group: 1"), "{text}");
    assert!(text.contains("layout: \"jp\""), "{text}");
    assert!(text.contains("cursors: [ResizeSe]"), "{text}");
    // MRU entries come right after the system entry; action 2 is ja_JP.
    assert!(
        text.contains("SetActiveLanguage { lang_id: \"ja_JP\", add_to_mru: false }"),
        "{text}"
    );
    assert!(text.contains("engine: LanguageSelectionClosed"), "{text}");
    assert!(text.contains("engine: Shutdown"), "{text}");
    assert!(
        report
            .lines
            .last()
            .unwrap()
            .contains("enabled false views 0 pending callbacks 0 live actors 0 menu managers 0"),
        "{text}"
    );
}
