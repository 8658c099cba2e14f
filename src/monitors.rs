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

use crate::geometry::Rectangle;
use crate::geometry::Size;
use crate::host::Actor;
use crate::host::MonitorInfo;
use crate::host::MonitorLayout;
use crate::host::Shell;
use crate::prelude::*;

/// Monitor queries for the engine. Reads the host's monitor list on every
/// call; the list may change between any two calls.
pub struct MonitorGeometry {
    layout: Rc<dyn MonitorLayout>,
    shell: Rc<dyn Shell>,
}

impl MonitorGeometry {
    pub fn new(layout: Rc<dyn MonitorLayout>, shell: Rc<dyn Shell>) -> Self {
        Self { layout, shell }
    }

    pub fn monitor_count(&self) -> usize {
        self.layout.monitors().len()
    }

    fn monitor(&self, index: usize) -> Option<MonitorInfo> {
        let monitors = self.layout.monitors();
        let monitor = monitors.get(index).copied();
        if monitor.is_none() {
            protocol_violation(
                loc!(),
                format!("monitor index {index} out of range ({} monitors)", monitors.len()),
            );
        }
        monitor
    }

    pub fn monitor_geometry(&self, index: usize) -> Rectangle<f64> {
        self.monitor(index)
            .map(|m| m.geometry.to_f64())
            .unwrap_or_default()
    }

    /// Physical size, zero when the host doesn't know it.
    pub fn monitor_size_mm(&self, index: usize) -> Size<f64> {
        self.monitor(index)
            .and_then(|m| m.size_mm)
            .map(|s| Size::new(s.w.into(), s.h.into()))
            .unwrap_or_default()
    }

    pub fn monitor_workarea(&self, index: usize) -> Rectangle<f64> {
        if self.monitor(index).is_none() {
            return Rectangle::default();
        }
        match self.layout.workarea(index) {
            Some(workarea) => workarea.to_f64(),
            None => {
                debug!("no workarea for monitor {index}, using its geometry");
                self.monitor_geometry(index)
            },
        }
    }

    pub fn primary_monitor(&self) -> usize {
        self.valid_index(self.layout.primary_index()).unwrap_or(0)
    }

    pub fn monitor_at_active_window(&self) -> usize {
        self.valid_index(self.layout.focus_index())
            .unwrap_or_else(|| self.primary_monitor())
    }

    pub fn monitor_at_actor(&self, actor: &dyn Actor) -> usize {
        self.valid_index(self.layout.find_index_for_actor(actor))
            .unwrap_or_else(|| self.primary_monitor())
    }

    pub fn screen_geometry(&self) -> Rectangle<f64> {
        self.shell.stage_geometry()
    }

    fn valid_index(&self, index: Option<usize>) -> Option<usize> {
        index.filter(|i| *i < self.monitor_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::host::ActorRole;
    use crate::mock::MockActor;
    use crate::mock::MockMonitors;
    use crate::mock::MockShell;

    fn two_monitors() -> Rc<MockMonitors> {
        let monitors = MockMonitors::new(vec![
            MonitorInfo {
                geometry: Rectangle::new(0, 0, 1920, 1080),
                size_mm: Some(Size::new(510, 290)),
            },
            MonitorInfo {
                geometry: Rectangle::new(1920, 0, 1280, 1024),
                size_mm: None,
            },
        ]);
        monitors.set_workarea(0, Rectangle::new(0, 32, 1920, 1048));
        monitors.set_primary(Some(1));
        monitors
    }

    fn geometry(monitors: &Rc<MockMonitors>) -> MonitorGeometry {
        MonitorGeometry::new(monitors.clone(), MockShell::new())
    }

    #[test]
    fn reports_monitor_list() {
        let monitors = two_monitors();
        let geometry = geometry(&monitors);
        assert_eq!(geometry.monitor_count(), 2);
        assert_eq!(
            geometry.monitor_geometry(1),
            Rectangle::new(1920.0, 0.0, 1280.0, 1024.0)
        );
        assert_eq!(geometry.monitor_size_mm(0), Size::new(510.0, 290.0));
        assert_eq!(geometry.monitor_size_mm(1), Size::new(0.0, 0.0));
        assert_eq!(geometry.primary_monitor(), 1);
    }

    #[test]
    fn workarea_falls_back_to_geometry() {
        let monitors = two_monitors();
        let geometry = geometry(&monitors);
        assert_eq!(
            geometry.monitor_workarea(0),
            Rectangle::new(0.0, 32.0, 1920.0, 1048.0)
        );
        assert_eq!(
            geometry.monitor_workarea(1),
            Rectangle::new(1920.0, 0.0, 1280.0, 1024.0)
        );
    }

    #[test]
    fn out_of_range_index_reads_as_zero() {
        let monitors = two_monitors();
        let geometry = geometry(&monitors);
        assert_eq!(geometry.monitor_geometry(5), Rectangle::default());
        assert_eq!(geometry.monitor_workarea(5), Rectangle::default());
        assert_eq!(geometry.monitor_size_mm(5), Size::default());
    }

    #[test]
    fn rereads_monitors_after_change() {
        let monitors = two_monitors();
        let geometry = geometry(&monitors);
        assert_eq!(geometry.monitor_count(), 2);

        monitors.set_monitors(vec![MonitorInfo {
            geometry: Rectangle::new(0, 0, 800, 600),
            size_mm: None,
        }]);
        assert_eq!(geometry.monitor_count(), 1);
        assert_eq!(geometry.monitor_geometry(1), Rectangle::default());
        // The stale primary index no longer names a monitor.
        assert_eq!(geometry.primary_monitor(), 0);
    }

    #[test]
    fn focus_and_actor_fall_back_to_primary() {
        let monitors = two_monitors();
        let geometry = geometry(&monitors);
        let actor = MockActor::new(7, ActorRole::ToplevelView);

        assert_eq!(geometry.monitor_at_active_window(), 1);
        monitors.set_focus(Some(0));
        assert_eq!(geometry.monitor_at_active_window(), 0);

        actor.set_transform(Point::new(2000.0, 10.0), 1.0);
        assert_eq!(geometry.monitor_at_actor(&*actor), 1);
        actor.set_transform(Point::new(10.0, 10.0), 1.0);
        assert_eq!(geometry.monitor_at_actor(&*actor), 0);
        actor.set_transform(Point::new(-500.0, -500.0), 1.0);
        assert_eq!(geometry.monitor_at_actor(&*actor), 1);
    }
}
