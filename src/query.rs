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

//! Typed log-store queries and their translation into native query clauses.

use std::collections::HashMap;
use std::str::FromStr;

use jiff::Timestamp;
use regex::Regex;
use regex::RegexBuilder;

use crate::Error;
use crate::ErrorKind;
use crate::backend::Backend;
use crate::backend::ClientHandle;
use crate::backend::MessageHandle;
use crate::backend::MessageKind;
use crate::backend::QueryOp;
use crate::backend::ResponseHandle;
use crate::backend::key;

/// One decoded log record: native field names mapped to string values.
///
/// The field set is whatever the daemon returned for that record, not a
/// fixed schema.
pub type Record = HashMap<String, String>;

/// The fixed set of symbolic field names a query may filter on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Field {
    Time,
    Host,
    Sender,
    Facility,
    Pid,
    Uid,
    Gid,
    Level,
    Message,
}

impl Field {
    /// The native record key this field aliases.
    pub fn as_key(self) -> &'static str {
        match self {
            Field::Time => key::TIME,
            Field::Host => key::HOST,
            Field::Sender => key::SENDER,
            Field::Facility => key::FACILITY,
            Field::Pid => key::PID,
            Field::Uid => key::UID,
            Field::Gid => key::GID,
            Field::Level => key::LEVEL,
            Field::Message => key::MSG,
        }
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Field, Self::Err> {
        match s {
            "time" => Ok(Field::Time),
            "host" => Ok(Field::Host),
            "sender" => Ok(Field::Sender),
            "facility" => Ok(Field::Facility),
            "pid" => Ok(Field::Pid),
            "uid" => Ok(Field::Uid),
            "gid" => Ok(Field::Gid),
            "level" => Ok(Field::Level),
            "message" => Ok(Field::Message),
            _ => Err(Error::new(format!("unknown query field: {s:?}"))
                .with_kind(ErrorKind::UnknownField)),
        }
    }
}

/// A regular-expression query value.
///
/// The pattern is validated locally at construction so the daemon never sees
/// a malformed expression. Whether the daemon should fold case is carried
/// alongside the pattern.
#[derive(Clone, Debug)]
pub struct Pattern {
    regex: Regex,
    casefold: bool,
}

impl Pattern {
    /// Compile a case-sensitive pattern.
    pub fn new(pattern: &str) -> Result<Pattern, Error> {
        Regex::new(pattern)
            .map(|regex| Pattern {
                regex,
                casefold: false,
            })
            .map_err(|err| {
                Error::new(format!("malformed query pattern: {pattern:?}"))
                    .with_kind(ErrorKind::InvalidPattern)
                    .with_source(err)
            })
    }

    /// Compile a case-insensitive pattern.
    pub fn case_insensitive(pattern: &str) -> Result<Pattern, Error> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(|regex| Pattern {
                regex,
                casefold: true,
            })
            .map_err(|err| {
                Error::new(format!("malformed query pattern: {pattern:?}"))
                    .with_kind(ErrorKind::InvalidPattern)
                    .with_source(err)
            })
    }

    /// Whether the daemon should fold case when matching.
    pub fn casefold(&self) -> bool {
        self.casefold
    }

    /// The pattern source text.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern {
            regex,
            casefold: false,
        }
    }
}

/// A query clause value.
///
/// The variant determines the operator flags of the clause it produces; see
/// [`Query`].
#[derive(Clone, Debug)]
pub enum Value {
    /// Compared for exact equality.
    Str(String),
    /// Compared numerically for equality.
    Int(i64),
    /// `true` matches any record carrying the key at all.
    Bool(bool),
    /// Matches records at or after this instant.
    Timestamp(Timestamp),
    /// Matched as a regular expression.
    Pattern(Pattern),
}

impl Value {
    /// The operator flags this value selects: exactly one comparison
    /// operator (`GREATER_EQUAL` for timestamps, `EQUAL` otherwise) plus
    /// independent modifier bits.
    fn ops(&self) -> QueryOp {
        match self {
            Value::Str(_) => QueryOp::EQUAL,
            Value::Int(_) => QueryOp::EQUAL | QueryOp::NUMERIC,
            Value::Bool(true) => QueryOp::EQUAL | QueryOp::TRUE,
            Value::Bool(false) => QueryOp::EQUAL,
            Value::Timestamp(_) => QueryOp::GREATER_EQUAL,
            Value::Pattern(pattern) if pattern.casefold => {
                QueryOp::EQUAL | QueryOp::REGEX | QueryOp::CASEFOLD
            }
            Value::Pattern(_) => QueryOp::EQUAL | QueryOp::REGEX,
        }
    }

    /// The stringified form submitted to the daemon. Timestamps become whole
    /// seconds since the epoch.
    fn render(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Timestamp(ts) => ts.as_second().to_string(),
            Value::Pattern(pattern) => pattern.as_str().to_owned(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Pattern> for Value {
    fn from(pattern: Pattern) -> Self {
        Value::Pattern(pattern)
    }
}

impl From<Regex> for Value {
    fn from(regex: Regex) -> Self {
        Value::Pattern(Pattern::from(regex))
    }
}

/// An ordered set of query clauses, ANDed together by the daemon.
///
/// Field names come from the fixed symbolic set `time`, `host`, `sender`,
/// `facility`, `pid`, `uid`, `gid`, `level`, and `message`; anything else
/// fails the search with [`ErrorKind::UnknownField`] before any native call.
///
/// # Examples
///
/// ```
/// use aslog::Query;
///
/// let query = Query::new()
///     .with("sender", "bootlog")
///     .with("level", 5);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Query {
    clauses: Vec<(String, Value)>,
}

impl Query {
    /// Create an empty query, which matches every record.
    pub fn new() -> Query {
        Query::default()
    }

    /// Add one clause filtering `field` by `value`.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Query {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// The number of clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Whether the query has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Translate every clause into its native form.
    ///
    /// Pure; runs to completion before any native call, so an unknown field
    /// aborts the whole search with zero clauses submitted.
    pub(crate) fn translate(&self) -> Result<Vec<Clause>, Error> {
        self.clauses
            .iter()
            .map(|(name, value)| {
                let field = Field::from_str(name)?;
                Ok(Clause {
                    key: field.as_key(),
                    value: value.render(),
                    ops: value.ops(),
                })
            })
            .collect()
    }
}

/// One translated clause, ready for submission.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) struct Clause {
    pub(crate) key: &'static str,
    pub(crate) value: String,
    pub(crate) ops: QueryOp,
}

/// Submit translated clauses against a live client and decode the response.
///
/// Native failures (no query object, failed search) yield an empty result
/// set. The query object and the response cursor are released on every path.
pub(crate) fn execute(
    backend: &dyn Backend,
    client: &ClientHandle,
    clauses: &[Clause],
) -> Vec<Record> {
    let Some(query) = backend.new_message(MessageKind::Query) else {
        return Vec::new();
    };
    let query = MessageGuard {
        backend,
        handle: Some(query),
    };

    for clause in clauses {
        backend.set_query(query.handle(), clause.key, &clause.value, clause.ops);
    }

    let Some(response) = backend.search(client, query.handle()) else {
        return Vec::new();
    };
    let response = ResponseGuard {
        backend,
        handle: Some(response),
    };

    drain(backend, response.handle())
}

/// Walk the cursor to its terminal null, decoding each record: keys are
/// enumerated by index until the native terminator (null or empty key).
fn drain(backend: &dyn Backend, response: &ResponseHandle) -> Vec<Record> {
    let mut records = Vec::new();
    while let Some(record) = backend.next_record(response) {
        let mut fields = Record::new();
        let mut index = 0;
        while let Some(key) = backend.record_key(&record, index) {
            if key.is_empty() {
                break;
            }
            if let Some(value) = backend.record_value(&record, &key) {
                fields.insert(key, value);
            }
            index += 1;
        }
        records.push(fields);
    }
    records
}

struct MessageGuard<'a> {
    backend: &'a dyn Backend,
    handle: Option<MessageHandle>,
}

impl MessageGuard<'_> {
    fn handle(&self) -> &MessageHandle {
        self.handle.as_ref().expect("released only on drop")
    }
}

impl Drop for MessageGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.backend.free_message(handle);
        }
    }
}

struct ResponseGuard<'a> {
    backend: &'a dyn Backend,
    handle: Option<ResponseHandle>,
}

impl ResponseGuard<'_> {
    fn handle(&self) -> &ResponseHandle {
        self.handle.as_ref().expect("released only on drop")
    }
}

impl Drop for ResponseGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.backend.free_response(handle);
        }
    }
}
