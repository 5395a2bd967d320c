// Copyright 2024 FastLabs Developers
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
use std::str::FromStr;

use crate::Error;

/// The severity levels of the Apple System Log facility.
///
/// Numeric values match the `ASL_LEVEL_*` constants: 0 is the most severe,
/// 7 the most verbose.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Severity {
    /// The system is unusable.
    Emergency = 0,
    /// Action must be taken immediately.
    Alert = 1,
    /// Critical conditions.
    Critical = 2,
    /// Error conditions.
    Error = 3,
    /// Warning conditions.
    Warning = 4,
    /// Normal but significant conditions.
    Notice = 5,
    /// Informational messages.
    Info = 6,
    /// Debug-level messages.
    Debug = 7,
}

impl Severity {
    /// Return the string representation of the `Severity`.
    ///
    /// This returns the same string as the `fmt::Display` implementation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Emergency => "EMERG",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRIT",
            Severity::Error => "ERR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }

    /// Whether a threshold set to `self` accepts a message at `level`.
    ///
    /// A threshold allows every level at least as severe as itself; it is
    /// "at least as verbose as" the levels it accepts.
    ///
    /// # Examples
    ///
    /// ```
    /// use aslog::Severity;
    ///
    /// assert!(Severity::Warning.allows(Severity::Error));
    /// assert!(Severity::Warning.allows(Severity::Warning));
    /// assert!(!Severity::Warning.allows(Severity::Info));
    /// ```
    pub fn allows(self, level: Severity) -> bool {
        self as i32 >= level as i32
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Debug
    }
}

impl fmt::Debug for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Severity, Self::Err> {
        for (name, level) in [
            ("emerg", Severity::Emergency),
            ("emergency", Severity::Emergency),
            ("alert", Severity::Alert),
            ("crit", Severity::Critical),
            ("critical", Severity::Critical),
            ("err", Severity::Error),
            ("error", Severity::Error),
            ("warning", Severity::Warning),
            ("warn", Severity::Warning),
            ("notice", Severity::Notice),
            ("info", Severity::Info),
            ("debug", Severity::Debug),
        ] {
            if s.eq_ignore_ascii_case(name) {
                return Ok(level);
            }
        }

        Err(Error::new(format!("malformed severity: {s:?}")))
    }
}

impl From<log::Level> for Severity {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Severity::Error,
            log::Level::Warn => Severity::Warning,
            log::Level::Info => Severity::Info,
            log::Level::Debug => Severity::Debug,
            log::Level::Trace => Severity::Debug,
        }
    }
}
