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

use std::fmt;
use std::fmt::Display;

use anyhow::Context;

use crate::prelude::*;

// https://stackoverflow.com/questions/38088067/equivalent-of-func-or-function-in-rust
#[macro_export]
macro_rules! fname {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        name.strip_suffix("::f").unwrap_or(name)
    }};
}
pub use fname;

#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub fname: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at {}:{}", self.fname, self.file, self.line)
    }
}

#[macro_export]
macro_rules! loc {
    () => {
        $crate::utils::error::Location {
            fname: $crate::fname!(),
            file: file!(),
            line: line!(),
        }
    };
}
pub use loc;

pub trait LocationContextExt<R, T, E>: Context<T, E> {
    fn with_context<C, F>(self, loc: Location, context: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;

    fn context<C>(self, loc: Location, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    fn location(self, loc: Location) -> Result<T>;
}

impl<R, T, E> LocationContextExt<R, T, E> for R
where
    R: Context<T, E>,
{
    fn with_context<C, F>(self, loc: Location, context: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        Context::with_context(self, || format!("{}: {}", loc, context()))
    }

    fn context<C>(self, loc: Location, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        LocationContextExt::with_context(self, loc, || context)
    }

    fn location(self, loc: Location) -> Result<T> {
        Context::with_context(self, || loc)
    }
}

/// Log a Result and then return it. Useful in cases such as
/// `scheduler.timeout_add(..).log(loc!()).ok()`.
pub trait LogExt<T, E>: Context<T, E> {
    fn debug(self, loc: Location) -> Result<T>;
    fn error(self, loc: Location) -> Result<T>;
    fn log(self, loc: Location) -> Result<T>;
}

impl<R, T, E> LogExt<T, E> for R
where
    R: Context<T, E>,
{
    fn debug(self, loc: Location) -> Result<T> {
        let res = self.location(loc);
        if let Err(e) = &res {
            debug!("{e:?}");
        }
        res
    }

    fn error(self, loc: Location) -> Result<T> {
        let res = self.location(loc);
        if let Err(e) = &res {
            error!("{e:?}");
        }
        res
    }

    fn log(self, loc: Location) -> Result<T> {
        self.error(loc)
    }
}

/// Reports a caller that broke the engine/host contract. These are never fatal:
/// the operation degrades to a no-op or a neutral default.
pub fn protocol_violation(loc: Location, what: impl Display) {
    warn!("protocol violation: {what} ({loc})");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_context_names_the_call_site() {
        let res: Result<()> =
            LocationContextExt::context(Err::<(), _>(anyhow!("boom")), loc!(), "while testing");
        let msg = format!("{:#}", res.unwrap_err());
        assert!(msg.contains("while testing"), "{msg}");
        assert!(msg.contains("location_context_names_the_call_site"), "{msg}");
        assert!(msg.contains("boom"), "{msg}");
    }

    #[test]
    fn log_passes_ok_through() {
        let res: Result<u32, anyhow::Error> = Ok(7);
        assert_eq!(res.log(loc!()).unwrap(), 7);
    }

    #[test]
    fn debug_keeps_the_error_and_adds_the_location() {
        let res: Result<u32, anyhow::Error> = Err(anyhow!("missing"));
        let msg = format!("{:#}", res.debug(loc!()).unwrap_err());
        assert!(msg.contains("missing"), "{msg}");
        assert!(msg.contains("debug_keeps_the_error_and_adds_the_location"), "{msg}");
    }
}
