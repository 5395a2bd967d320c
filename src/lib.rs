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

//! Client bindings for the Apple System Log facility (`asl(3)`).
//!
//! A [`Logger`] session owns a client connection to the native logging
//! daemon and a reusable message template. It emits leveled messages gated
//! by a severity threshold, optionally mirrors them to a file descriptor,
//! and searches the historical log store with a typed [`Query`].
//!
//! Logging is best effort by design: an unreachable daemon, a closed
//! session, or a rejected native call silently degrades to a no-op rather
//! than failing the caller. The only errors surfaced are caller mistakes in
//! a query.
//!
//! The native daemon sits behind the [`backend::Backend`] trait. On macOS,
//! [`backend::Asl`] talks to the real daemon; everywhere (including tests),
//! [`backend::Testing`] is a scripted in-memory stand-in.
//!
//! # Examples
//!
//! Emit and search through a scripted backend:
//!
//! ```
//! use aslog::Query;
//! use aslog::Severity;
//! use aslog::backend::Testing;
//!
//! let backend = Testing::new().with_records([[("Sender", "bootlog"), ("Level", "5")]]);
//! let logger = aslog::builder()
//!     .facility("com.example.daemon")
//!     .ident("example")
//!     .level(Severity::Info)
//!     .build_with(backend);
//!
//! logger.notice("service started");
//! assert!(logger.info_enabled());
//! assert!(!logger.debug_enabled());
//!
//! let records = logger
//!     .search(&Query::new().with("sender", "bootlog").with("level", 5))
//!     .unwrap();
//! assert_eq!(records.len(), 1);
//!
//! logger.close();
//! ```
//!
//! Against the system daemon (macOS):
//!
//! ```no_run
//! # #[cfg(target_os = "macos")] {
//! let logger = aslog::builder()
//!     .facility("com.apple.console")
//!     .ident("my-program")
//!     .build();
//!
//! logger.warn("some warning message");
//! logger.close();
//! # }
//! ```

pub mod backend;
pub mod query;

mod bridge;
mod error;
mod level;
mod session;

pub use error::Error;
pub use error::ErrorKind;
pub use level::Severity;
pub use query::Pattern;
pub use query::Query;
pub use query::Record;
pub use query::Value;
pub use session::Logger;
pub use session::LoggerBuilder;
pub use session::builder;
