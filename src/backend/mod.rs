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

//! The low-level call contract of the native logging daemon.
//!
//! [`Backend`] mirrors, one method per entry point, the subset of `asl(3)`
//! this crate consumes. [`Asl`] is the real daemon (macOS only); [`Testing`]
//! is a scripted in-memory stand-in for tests.

use std::fmt;
use std::ops::BitOr;
use std::ops::BitOrAssign;
use std::os::fd::RawFd;
use std::sync::Arc;

use crate::Severity;

#[cfg(target_os = "macos")]
mod asl;
#[cfg(target_os = "macos")]
pub use self::asl::Asl;

mod testing;
pub use self::testing::Call;
pub use self::testing::Testing;

/// The native record keys, matching the `ASL_KEY_*` constants.
pub mod key {
    pub const TIME: &str = "Time";
    pub const HOST: &str = "Host";
    pub const SENDER: &str = "Sender";
    pub const FACILITY: &str = "Facility";
    pub const PID: &str = "PID";
    pub const UID: &str = "UID";
    pub const GID: &str = "GID";
    pub const LEVEL: &str = "Level";
    pub const MSG: &str = "Message";
}

/// The kind of a native message object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MessageKind {
    /// A reusable message template for emission.
    Msg,
    /// A query object for searching the log store.
    Query,
}

/// An opaque handle to a native client connection.
///
/// Owned exclusively by its session; deliberately neither `Clone` nor `Copy`
/// so a handle cannot outlive the close call that releases it.
#[derive(PartialEq, Eq, Hash, Debug)]
pub struct ClientHandle(pub(crate) usize);

/// An opaque handle to a native message or query object.
#[derive(PartialEq, Eq, Hash, Debug)]
pub struct MessageHandle(pub(crate) usize);

/// An opaque handle to a native search response: a lazy, forward-only,
/// finite cursor over result records.
#[derive(PartialEq, Eq, Hash, Debug)]
pub struct ResponseHandle(pub(crate) usize);

/// An opaque handle to one record yielded by a response cursor.
///
/// Valid only until its response is freed.
#[derive(PartialEq, Eq, Hash, Debug)]
pub struct RecordHandle(pub(crate) usize);

/// Option bits for opening a client, matching the `ASL_OPT_*` constants.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Mirror every emitted message to stderr.
    pub const STDERR: OpenFlags = OpenFlags(0x0000_0001);
    /// Connect to the daemon immediately rather than on first use.
    pub const NO_DELAY: OpenFlags = OpenFlags(0x0000_0002);
    /// Refuse remote control of the filter for this client.
    pub const NO_REMOTE: OpenFlags = OpenFlags(0x0000_0004);

    /// The raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether all bits of `other` are set in `self`.
    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}

/// Operator bits for one query clause, matching the `ASL_QUERY_OP_*`
/// constants.
///
/// The low four bits hold exactly one comparison operator; the high bits are
/// independent modifiers combined by bitwise OR.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct QueryOp(u32);

impl QueryOp {
    /// Exact equality.
    pub const EQUAL: QueryOp = QueryOp(0x0001);
    /// Strictly greater than.
    pub const GREATER: QueryOp = QueryOp(0x0002);
    /// Greater than or equal to.
    pub const GREATER_EQUAL: QueryOp = QueryOp(0x0003);
    /// Strictly less than.
    pub const LESS: QueryOp = QueryOp(0x0004);
    /// Less than or equal to.
    pub const LESS_EQUAL: QueryOp = QueryOp(0x0005);
    /// Inequality.
    pub const NOT_EQUAL: QueryOp = QueryOp(0x0006);
    /// Always true; matches any value for the key.
    pub const TRUE: QueryOp = QueryOp(0x0007);

    /// Modifier: fold case before comparing.
    pub const CASEFOLD: QueryOp = QueryOp(0x0010);
    /// Modifier: match a leading substring.
    pub const PREFIX: QueryOp = QueryOp(0x0020);
    /// Modifier: match a trailing substring.
    pub const SUFFIX: QueryOp = QueryOp(0x0040);
    /// Modifier: match any substring.
    pub const SUBSTRING: QueryOp = QueryOp(0x0060);
    /// Modifier: compare numerically.
    pub const NUMERIC: QueryOp = QueryOp(0x0080);
    /// Modifier: treat the value as a regular expression.
    pub const REGEX: QueryOp = QueryOp(0x0100);

    /// The raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether all bits of `other` are set in `self`.
    pub const fn contains(self, other: QueryOp) -> bool {
        self.0 & other.0 == other.0
    }

    /// The comparison operator bits, with modifiers masked off.
    pub const fn operator(self) -> QueryOp {
        QueryOp(self.0 & 0x000f)
    }
}

impl BitOr for QueryOp {
    type Output = QueryOp;

    fn bitor(self, rhs: QueryOp) -> QueryOp {
        QueryOp(self.0 | rhs.0)
    }
}

impl BitOrAssign for QueryOp {
    fn bitor_assign(&mut self, rhs: QueryOp) {
        self.0 |= rhs.0;
    }
}

/// The fixed call contract consumed by a [`Logger`](crate::Logger) session.
///
/// Failure is reported through the native conventions: absent handles and
/// `false` statuses. Implementations must tolerate daemon unavailability
/// without panicking; the session degrades instead of raising.
pub trait Backend: fmt::Debug + Send + Sync + 'static {
    /// Open a client connection. `None` means the daemon refused or is
    /// unreachable.
    fn open(
        &self,
        ident: Option<&str>,
        facility: Option<&str>,
        opts: OpenFlags,
    ) -> Option<ClientHandle>;

    /// Close a client connection, consuming the handle.
    fn close(&self, client: ClientHandle);

    /// Allocate a message object of the given kind.
    fn new_message(&self, kind: MessageKind) -> Option<MessageHandle>;

    /// Release a message object, consuming the handle.
    fn free_message(&self, message: MessageHandle);

    /// Set a field on a message object.
    fn set_field(&self, message: &MessageHandle, key: &str, value: &str) -> bool;

    /// Install the severity threshold for a client.
    fn set_filter(&self, client: &ClientHandle, threshold: Severity) -> bool;

    /// Register an additional file descriptor that receives every emitted
    /// message.
    fn add_log_file(&self, client: &ClientHandle, fd: RawFd) -> bool;

    /// Unregister a file descriptor previously added with
    /// [`add_log_file`](Backend::add_log_file).
    fn remove_log_file(&self, client: &ClientHandle, fd: RawFd) -> bool;

    /// Emit one message. `message` is a preformatted payload, never a format
    /// string.
    fn log(
        &self,
        client: &ClientHandle,
        template: &MessageHandle,
        level: Severity,
        message: &str,
    ) -> bool;

    /// Attach one clause to a query object.
    fn set_query(&self, query: &MessageHandle, key: &str, value: &str, ops: QueryOp) -> bool;

    /// Run a query, returning a response cursor. `None` means the search
    /// failed outright.
    fn search(&self, client: &ClientHandle, query: &MessageHandle) -> Option<ResponseHandle>;

    /// Fetch the next record from a response cursor; `None` terminates the
    /// cursor.
    fn next_record(&self, response: &ResponseHandle) -> Option<RecordHandle>;

    /// The key at `index` within a record. `None` or an empty string
    /// terminates the enumeration.
    fn record_key(&self, record: &RecordHandle, index: u32) -> Option<String>;

    /// The value stored under `key` within a record.
    fn record_value(&self, record: &RecordHandle, key: &str) -> Option<String>;

    /// Release a response cursor and every record it yielded, consuming the
    /// handle.
    fn free_response(&self, response: ResponseHandle);
}

impl<T: Backend> From<T> for Box<dyn Backend> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}

impl<T: Backend + ?Sized> Backend for Arc<T> {
    fn open(
        &self,
        ident: Option<&str>,
        facility: Option<&str>,
        opts: OpenFlags,
    ) -> Option<ClientHandle> {
        (**self).open(ident, facility, opts)
    }

    fn close(&self, client: ClientHandle) {
        (**self).close(client)
    }

    fn new_message(&self, kind: MessageKind) -> Option<MessageHandle> {
        (**self).new_message(kind)
    }

    fn free_message(&self, message: MessageHandle) {
        (**self).free_message(message)
    }

    fn set_field(&self, message: &MessageHandle, key: &str, value: &str) -> bool {
        (**self).set_field(message, key, value)
    }

    fn set_filter(&self, client: &ClientHandle, threshold: Severity) -> bool {
        (**self).set_filter(client, threshold)
    }

    fn add_log_file(&self, client: &ClientHandle, fd: RawFd) -> bool {
        (**self).add_log_file(client, fd)
    }

    fn remove_log_file(&self, client: &ClientHandle, fd: RawFd) -> bool {
        (**self).remove_log_file(client, fd)
    }

    fn log(
        &self,
        client: &ClientHandle,
        template: &MessageHandle,
        level: Severity,
        message: &str,
    ) -> bool {
        (**self).log(client, template, level, message)
    }

    fn set_query(&self, query: &MessageHandle, key: &str, value: &str, ops: QueryOp) -> bool {
        (**self).set_query(query, key, value, ops)
    }

    fn search(&self, client: &ClientHandle, query: &MessageHandle) -> Option<ResponseHandle> {
        (**self).search(client, query)
    }

    fn next_record(&self, response: &ResponseHandle) -> Option<RecordHandle> {
        (**self).next_record(response)
    }

    fn record_key(&self, record: &RecordHandle, index: u32) -> Option<String> {
        (**self).record_key(record, index)
    }

    fn record_value(&self, record: &RecordHandle, key: &str) -> Option<String> {
        (**self).record_value(record, key)
    }

    fn free_response(&self, response: ResponseHandle) {
        (**self).free_response(response)
    }
}
