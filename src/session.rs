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
use std::os::fd::AsRawFd;
use std::os::fd::RawFd;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::Error;
use crate::Severity;
use crate::backend::Backend;
use crate::backend::ClientHandle;
use crate::backend::MessageHandle;
use crate::backend::MessageKind;
use crate::backend::OpenFlags;
use crate::backend::key;
use crate::query;
use crate::query::Query;
use crate::query::Record;

/// Create a new [`LoggerBuilder`] for configuring a session.
///
/// # Examples
///
/// ```
/// use aslog::Severity;
/// use aslog::backend::Testing;
///
/// let logger = aslog::builder()
///     .facility("com.example.daemon")
///     .ident("example")
///     .level(Severity::Info)
///     .build_with(Testing::new());
///
/// logger.info("service started");
/// assert!(!logger.debug_enabled());
/// logger.close();
/// ```
pub fn builder() -> LoggerBuilder {
    LoggerBuilder::default()
}

/// A builder for the configuration captured at session creation.
///
/// If none of facility, ident, and mirror target is configured, no client
/// connection is opened and the session operates in a degraded mode: every
/// emit is a no-op and every search returns no records.
#[must_use = "call `build_with` (or `build` on macOS) to open the session"]
#[derive(Debug, Default)]
pub struct LoggerBuilder {
    facility: Option<String>,
    ident: Option<String>,
    level: Severity,
    mirror: Option<RawFd>,
    log_to_stderr: bool,
}

impl LoggerBuilder {
    /// Set the syslog facility. The system default is `user`.
    pub fn facility(mut self, facility: impl Into<String>) -> Self {
        self.facility = Some(facility.into());
        self
    }

    /// Set the program name, which becomes the `Sender` key on emitted
    /// records.
    pub fn ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    /// Set the severity threshold. Default to [`Severity::Debug`], which
    /// accepts everything.
    pub fn level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    /// Mirror every emitted message to the given file descriptor.
    ///
    /// The descriptor must stay open for the lifetime of the session; the
    /// session does not take ownership of it.
    pub fn mirror(mut self, target: &impl AsRawFd) -> Self {
        self.mirror = Some(target.as_raw_fd());
        self
    }

    /// Mirror every emitted message to stderr.
    pub fn log_to_stderr(mut self, enabled: bool) -> Self {
        self.log_to_stderr = enabled;
        self
    }

    /// Open a session against the given backend.
    ///
    /// Daemon unavailability never fails construction: a refused client
    /// connection leaves the session degraded instead.
    pub fn build_with(self, backend: impl Into<Box<dyn Backend>>) -> Logger {
        let backend = backend.into();

        let client = if self.mirror.is_some() || self.facility.is_some() || self.ident.is_some()
        {
            let mut opts = OpenFlags::NO_DELAY | OpenFlags::NO_REMOTE;
            if self.log_to_stderr {
                opts |= OpenFlags::STDERR;
            }

            let client = backend.open(self.ident.as_deref(), self.facility.as_deref(), opts);
            if let (Some(client), Some(fd)) = (client.as_ref(), self.mirror) {
                // best effort; a rejected mirror does not degrade the session
                backend.add_log_file(client, fd);
            }
            client
        } else {
            None
        };

        let template = backend.new_message(MessageKind::Msg);
        if let (Some(template), Some(facility)) = (template.as_ref(), self.facility.as_deref())
        {
            backend.set_field(template, key::FACILITY, facility);
        }
        if let Some(client) = client.as_ref() {
            backend.set_filter(client, self.level);
        }

        Logger {
            inner: Mutex::new(Inner {
                backend,
                client,
                template,
            }),
            level: self.level,
            facility: self.facility,
            ident: self.ident,
            mirror: self.mirror,
        }
    }

    /// Open a session against the system logging daemon.
    #[cfg(target_os = "macos")]
    pub fn build(self) -> Logger {
        self.build_with(crate::backend::Asl::new())
    }
}

/// A session against the native logging daemon.
///
/// A `Logger` owns one client connection and one reusable message template.
/// Emission is gated by the severity threshold fixed at build time, and every
/// operation that touches the native handles holds the session lock for its
/// whole duration, so the session can be shared freely across threads.
///
/// Dropping the session closes it; [`close`](Logger::close) does the same
/// eagerly and is idempotent. A closed session turns every emit into a
/// no-op and every search into an empty result.
///
/// # Examples
///
/// ```no_run
/// # #[cfg(target_os = "macos")] {
/// use aslog::Severity;
///
/// let logger = aslog::builder()
///     .facility("com.apple.console")
///     .ident("my-program")
///     .build();
///
/// logger.warn("disk space low");
/// if logger.debug_enabled() {
///     logger.debug("probe details follow");
/// }
/// logger.close();
/// # }
/// ```
pub struct Logger {
    inner: Mutex<Inner>,
    level: Severity,
    facility: Option<String>,
    ident: Option<String>,
    mirror: Option<RawFd>,
}

struct Inner {
    backend: Box<dyn Backend>,
    client: Option<ClientHandle>,
    template: Option<MessageHandle>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("facility", &self.facility)
            .field("ident", &self.ident)
            .field("level", &self.level)
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Create a new [`LoggerBuilder`].
    pub fn builder() -> LoggerBuilder {
        builder()
    }

    /// The configured facility.
    pub fn facility(&self) -> Option<&str> {
        self.facility.as_deref()
    }

    /// The configured program name.
    pub fn ident(&self) -> Option<&str> {
        self.ident.as_deref()
    }

    /// The severity threshold.
    pub fn level(&self) -> Severity {
        self.level
    }

    /// Whether a message at `level` would currently be forwarded.
    pub fn enabled(&self, level: Severity) -> bool {
        self.level.allows(level)
    }

    /// Whether debug messages are forwarded.
    pub fn debug_enabled(&self) -> bool {
        self.enabled(Severity::Debug)
    }

    /// Whether info messages are forwarded.
    pub fn info_enabled(&self) -> bool {
        self.enabled(Severity::Info)
    }

    /// Whether notice messages are forwarded.
    pub fn notice_enabled(&self) -> bool {
        self.enabled(Severity::Notice)
    }

    /// Whether warning messages are forwarded.
    pub fn warn_enabled(&self) -> bool {
        self.enabled(Severity::Warning)
    }

    /// Whether error messages are forwarded.
    pub fn error_enabled(&self) -> bool {
        self.enabled(Severity::Error)
    }

    /// Whether fatal (critical) messages are forwarded.
    pub fn fatal_enabled(&self) -> bool {
        self.enabled(Severity::Critical)
    }

    /// Log a message at the given level.
    ///
    /// The message is an opaque preformatted payload; it is never
    /// interpreted as a format string. No-op when the level is above the
    /// threshold or the session is closed or degraded.
    pub fn add(&self, level: Severity, message: &str) {
        if !self.level.allows(level) {
            return;
        }
        let inner = self.lock();
        let (Some(client), Some(template)) = (inner.client.as_ref(), inner.template.as_ref())
        else {
            return;
        };
        inner.backend.log(client, template, level, message);
    }

    /// Log a message with no level mapping at the session's own threshold
    /// level.
    pub fn append(&self, message: &str) {
        self.add(self.level, message);
    }

    /// Log a debug message.
    pub fn debug(&self, message: &str) {
        self.add(Severity::Debug, message);
    }

    /// Log an info message.
    pub fn info(&self, message: &str) {
        self.add(Severity::Info, message);
    }

    /// Log a notice message.
    pub fn notice(&self, message: &str) {
        self.add(Severity::Notice, message);
    }

    /// Log a warning message.
    pub fn warn(&self, message: &str) {
        self.add(Severity::Warning, message);
    }

    /// Log an error message.
    pub fn error(&self, message: &str) {
        self.add(Severity::Error, message);
    }

    /// Log a fatal message, which maps to [`Severity::Critical`].
    pub fn fatal(&self, message: &str) {
        self.add(Severity::Critical, message);
    }

    /// Log a message of unknown severity, which maps to
    /// [`Severity::Emergency`].
    pub fn unknown(&self, message: &str) {
        self.add(Severity::Emergency, message);
    }

    /// Stop mirroring to a file descriptor previously configured with
    /// [`LoggerBuilder::mirror`]. Best effort.
    pub fn remove_mirror(&self, target: &impl AsRawFd) {
        let inner = self.lock();
        if let Some(client) = inner.client.as_ref() {
            inner.backend.remove_log_file(client, target.as_raw_fd());
        }
    }

    /// Search the log store.
    ///
    /// Each clause of `query` becomes one native query clause; the daemon
    /// ANDs them together. Records come back in cursor order. A degraded or
    /// closed session, a failed native search, and a query matching nothing
    /// all yield `Ok` with an empty vector; the only error is a caller
    /// mistake in the query itself.
    ///
    /// # Examples
    ///
    /// ```
    /// use aslog::Query;
    /// use aslog::backend::Testing;
    ///
    /// let backend = Testing::new().with_records([[
    ///     ("Sender", "bootlog"),
    ///     ("Message", "BOOT_TIME 1570858104 0"),
    /// ]]);
    /// let logger = aslog::builder().ident("example").build_with(backend);
    ///
    /// let records = logger
    ///     .search(&Query::new().with("sender", "bootlog"))
    ///     .unwrap();
    /// assert_eq!(records[0]["Sender"], "bootlog");
    /// ```
    pub fn search(&self, query: &Query) -> Result<Vec<Record>, Error> {
        let clauses = query.translate()?;
        let inner = self.lock();
        let Some(client) = inner.client.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(query::execute(inner.backend.as_ref(), client, &clauses))
    }

    /// Close the session, releasing the template and the client connection.
    ///
    /// Idempotent: closing an already closed session does nothing. Any
    /// operation still in flight on another thread finishes first; the
    /// handles are only released once no other operation holds the session
    /// lock.
    pub fn close(&self) {
        let mut inner = self.lock();
        if let Some(template) = inner.template.take() {
            inner.backend.free_message(template);
        }
        if let Some(client) = inner.client.take() {
            inner.backend.close(client);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panicked peer must not turn every caller's logging into a panic
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.close();
    }
}
