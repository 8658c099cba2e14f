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

use std::ops::Add;
use std::ops::Sub;

use serde_derive::Deserialize;
use serde_derive::Serialize;

use crate::host::Actor;

#[derive(Debug, Default, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Point<N> {
    pub x: N,
    pub y: N,
}

impl<N> Point<N> {
    pub fn new(x: N, y: N) -> Self {
        Self { x, y }
    }
}

impl<N> From<(N, N)> for Point<N> {
    fn from((x, y): (N, N)) -> Self {
        Self { x, y }
    }
}

impl<N> From<Point<N>> for (N, N) {
    fn from(point: Point<N>) -> Self {
        (point.x, point.y)
    }
}

impl<N: Add<Output = N>> Add<Size<N>> for Point<N> {
    type Output = Point<N>;

    fn add(self, size: Size<N>) -> Self::Output {
        Point {
            x: self.x + size.w,
            y: self.y + size.h,
        }
    }
}

impl<N: Sub<Output = N>> Sub for Point<N> {
    type Output = Size<N>;

    fn sub(self, other: Point<N>) -> Self::Output {
        Size {
            w: self.x - other.x,
            h: self.y - other.y,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Size<N> {
    pub w: N,
    pub h: N,
}

impl<N> Size<N> {
    pub fn new(w: N, h: N) -> Self {
        Self { w, h }
    }
}

impl<N> From<(N, N)> for Size<N> {
    fn from((w, h): (N, N)) -> Self {
        Self { w, h }
    }
}

impl<N> From<Size<N>> for (N, N) {
    fn from(size: Size<N>) -> Self {
        (size.w, size.h)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Rectangle<N> {
    pub loc: Point<N>,
    pub size: Size<N>,
}

impl<N> Rectangle<N> {
    pub fn new(x: N, y: N, w: N, h: N) -> Self {
        Self {
            loc: Point { x, y },
            size: Size { w, h },
        }
    }
}

impl<N: Copy> Rectangle<N> {
    /// `[x, y, w, h]`, the layout the engine passes rectangles around in.
    pub fn to_array(&self) -> [N; 4] {
        [self.loc.x, self.loc.y, self.size.w, self.size.h]
    }
}

impl<N> From<[N; 4]> for Rectangle<N> {
    fn from([x, y, w, h]: [N; 4]) -> Self {
        Self::new(x, y, w, h)
    }
}

impl Rectangle<i32> {
    pub fn to_f64(self) -> Rectangle<f64> {
        Rectangle::new(
            self.loc.x.into(),
            self.loc.y.into(),
            self.size.w.into(),
            self.size.h.into(),
        )
    }
}

impl Rectangle<f64> {
    pub fn contains(&self, point: Point<f64>) -> bool {
        point.x >= self.loc.x
            && point.y >= self.loc.y
            && point.x < self.loc.x + self.size.w
            && point.y < self.loc.y + self.size.h
    }
}

/// Maps `rect`, given in `actor`'s local coordinates, to stage coordinates.
///
/// Both the origin and the far corner go through the actor's current
/// transform; the size is the difference of the transformed corners. The
/// transform is read on every call since the actor may have moved or been
/// scaled in the meantime.
pub fn apply_transform_to_rect(actor: &dyn Actor, rect: Rectangle<f64>) -> Rectangle<f64> {
    let begin = actor.apply_transform_to_point(rect.loc);
    let end = actor.apply_transform_to_point(rect.loc + rect.size);
    Rectangle {
        loc: begin,
        size: end - begin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ActorRole;
    use crate::mock::MockActor;

    #[test]
    fn identity_transform_keeps_rect() {
        let actor = MockActor::new(1, ActorRole::ToplevelView);
        let rect = Rectangle::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(apply_transform_to_rect(&*actor, rect), rect);
    }

    #[test]
    fn translated_and_scaled_actor() {
        let actor = MockActor::new(1, ActorRole::ToplevelView);
        actor.set_transform(Point::new(200.0, 300.0), 2.0);
        let rect = Rectangle::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(
            apply_transform_to_rect(&*actor, rect),
            Rectangle::new(220.0, 340.0, 200.0, 100.0)
        );
    }

    #[test]
    fn transform_is_reread_every_call() {
        let actor = MockActor::new(1, ActorRole::ToplevelView);
        let rect = Rectangle::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(apply_transform_to_rect(&*actor, rect), rect);

        actor.set_transform(Point::new(5.0, 5.0), 1.0);
        assert_eq!(
            apply_transform_to_rect(&*actor, rect),
            Rectangle::new(5.0, 5.0, 10.0, 10.0)
        );
    }

    #[test]
    fn rectangle_array_layout() {
        let rect: Rectangle<f64> = [1.0, 2.0, 3.0, 4.0].into();
        assert_eq!(rect.to_array(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(Rectangle::new(1, 2, 3, 4).to_f64(), rect);
    }

    #[test]
    fn contains_is_half_open() {
        let rect = Rectangle::new(0.0, 0.0, 10.0, 10.0);
        assert!(rect.contains(Point::new(0.0, 0.0)));
        assert!(rect.contains(Point::new(9.5, 9.5)));
        assert!(!rect.contains(Point::new(10.0, 5.0)));
    }
}
