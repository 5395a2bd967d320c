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

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::Severity;
use crate::backend::Backend;
use crate::backend::ClientHandle;
use crate::backend::MessageHandle;
use crate::backend::MessageKind;
use crate::backend::OpenFlags;
use crate::backend::QueryOp;
use crate::backend::RecordHandle;
use crate::backend::ResponseHandle;

/// One recorded native call.
#[derive(Clone, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum Call {
    Open {
        ident: Option<String>,
        facility: Option<String>,
        opts: OpenFlags,
    },
    Close,
    NewMessage(MessageKind),
    FreeMessage,
    SetField {
        key: String,
        value: String,
    },
    SetFilter(Severity),
    AddLogFile(RawFd),
    RemoveLogFile(RawFd),
    Log {
        level: Severity,
        message: String,
    },
    SetQuery {
        key: String,
        value: String,
        ops: QueryOp,
    },
    Search,
    NextRecord,
    RecordKey(u32),
    RecordValue(String),
    FreeResponse,
}

/// A scripted in-memory stand-in for the native daemon.
///
/// Every call is recorded for later inspection, and every handle passed in is
/// validated against the live allocation table: a stale handle is a bug in
/// the binding and panics immediately. Searches are served from canned
/// records configured up front.
///
/// Share the backend with the session through an `Arc` to keep a handle for
/// assertions:
///
/// ```
/// use std::sync::Arc;
///
/// use aslog::backend::Call;
/// use aslog::backend::Testing;
///
/// let backend = Arc::new(Testing::new());
/// let logger = aslog::builder()
///     .ident("example")
///     .build_with(backend.clone());
///
/// logger.notice("started");
/// assert!(backend.calls().iter().any(|call| matches!(
///     call,
///     Call::Log { message, .. } if message == "started"
/// )));
/// ```
#[derive(Debug, Default)]
pub struct Testing {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    clients: HashMap<usize, Client>,
    messages: HashMap<usize, Message>,
    responses: HashMap<usize, Response>,
    records: HashMap<usize, Vec<(String, String)>>,
    canned: Vec<Vec<(String, String)>>,
    fail_open: bool,
    fail_search: bool,
    calls: Vec<Call>,
}

#[derive(Debug, Default)]
struct Client {
    log_files: Vec<RawFd>,
}

#[derive(Debug)]
struct Message {
    kind: MessageKind,
}

#[derive(Debug)]
struct Response {
    // ids yet to be yielded, then ids already yielded; all freed together
    pending: Vec<usize>,
    yielded: Vec<usize>,
}

impl Testing {
    /// Create an empty scripted backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the records every search returns, in order.
    pub fn with_records<R, F, K, V>(self, records: R) -> Self
    where
        R: IntoIterator<Item = F>,
        F: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        {
            let mut state = self.lock();
            state.canned = records
                .into_iter()
                .map(|fields| {
                    fields
                        .into_iter()
                        .map(|(k, v)| (k.into(), v.into()))
                        .collect()
                })
                .collect();
        }
        self
    }

    /// Make every `open` call fail with a null handle.
    pub fn failing_open(self) -> Self {
        self.lock().fail_open = true;
        self
    }

    /// Make every `search` call fail with a null response.
    pub fn failing_search(self) -> Self {
        self.lock().fail_search = true;
        self
    }

    /// Every native call issued so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// The emitted messages, in order, as `(level, message)` pairs.
    pub fn logged(&self) -> Vec<(Severity, String)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Log { level, message } => Some((*level, message.clone())),
                _ => None,
            })
            .collect()
    }

    /// The query clauses submitted so far, in order, as
    /// `(native key, value, ops)` triples.
    pub fn clauses(&self) -> Vec<(String, String, QueryOp)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::SetQuery { key, value, ops } => {
                    Some((key.clone(), value.clone(), *ops))
                }
                _ => None,
            })
            .collect()
    }

    /// The number of native resources currently allocated: clients, message
    /// objects, and response cursors. Zero after a clean shutdown.
    pub fn live_handles(&self) -> usize {
        let state = self.lock();
        state.clients.len() + state.messages.len() + state.responses.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn allocate(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn client(&mut self, handle: &ClientHandle) -> &mut Client {
        self.clients
            .get_mut(&handle.0)
            .unwrap_or_else(|| panic!("stale client handle: {}", handle.0))
    }

    fn message(&mut self, handle: &MessageHandle) -> &mut Message {
        self.messages
            .get_mut(&handle.0)
            .unwrap_or_else(|| panic!("stale message handle: {}", handle.0))
    }

    fn response(&mut self, handle: &ResponseHandle) -> &mut Response {
        self.responses
            .get_mut(&handle.0)
            .unwrap_or_else(|| panic!("stale response handle: {}", handle.0))
    }

    fn record(&self, handle: &RecordHandle) -> &Vec<(String, String)> {
        self.records
            .get(&handle.0)
            .unwrap_or_else(|| panic!("stale record handle: {}", handle.0))
    }
}

impl Backend for Testing {
    fn open(
        &self,
        ident: Option<&str>,
        facility: Option<&str>,
        opts: OpenFlags,
    ) -> Option<ClientHandle> {
        let mut state = self.lock();
        state.calls.push(Call::Open {
            ident: ident.map(str::to_owned),
            facility: facility.map(str::to_owned),
            opts,
        });
        if state.fail_open {
            return None;
        }
        let id = state.allocate();
        state.clients.insert(id, Client::default());
        Some(ClientHandle(id))
    }

    fn close(&self, client: ClientHandle) {
        let mut state = self.lock();
        state.calls.push(Call::Close);
        state.client(&client);
        state.clients.remove(&client.0);
    }

    fn new_message(&self, kind: MessageKind) -> Option<MessageHandle> {
        let mut state = self.lock();
        state.calls.push(Call::NewMessage(kind));
        let id = state.allocate();
        state.messages.insert(id, Message { kind });
        Some(MessageHandle(id))
    }

    fn free_message(&self, message: MessageHandle) {
        let mut state = self.lock();
        state.calls.push(Call::FreeMessage);
        state.message(&message);
        state.messages.remove(&message.0);
    }

    fn set_field(&self, message: &MessageHandle, key: &str, value: &str) -> bool {
        let mut state = self.lock();
        state.calls.push(Call::SetField {
            key: key.to_owned(),
            value: value.to_owned(),
        });
        state.message(message);
        true
    }

    fn set_filter(&self, client: &ClientHandle, threshold: Severity) -> bool {
        let mut state = self.lock();
        state.calls.push(Call::SetFilter(threshold));
        state.client(client);
        true
    }

    fn add_log_file(&self, client: &ClientHandle, fd: RawFd) -> bool {
        let mut state = self.lock();
        state.calls.push(Call::AddLogFile(fd));
        state.client(client).log_files.push(fd);
        true
    }

    fn remove_log_file(&self, client: &ClientHandle, fd: RawFd) -> bool {
        let mut state = self.lock();
        state.calls.push(Call::RemoveLogFile(fd));
        let log_files = &mut state.client(client).log_files;
        match log_files.iter().position(|registered| *registered == fd) {
            Some(index) => {
                log_files.remove(index);
                true
            }
            None => false,
        }
    }

    fn log(
        &self,
        client: &ClientHandle,
        template: &MessageHandle,
        level: Severity,
        message: &str,
    ) -> bool {
        let mut state = self.lock();
        state.calls.push(Call::Log {
            level,
            message: message.to_owned(),
        });
        state.client(client);
        let template = state.message(template);
        assert_eq!(template.kind, MessageKind::Msg, "emitted with a query object");
        true
    }

    fn set_query(&self, query: &MessageHandle, key: &str, value: &str, ops: QueryOp) -> bool {
        let mut state = self.lock();
        state.calls.push(Call::SetQuery {
            key: key.to_owned(),
            value: value.to_owned(),
            ops,
        });
        let message = state.message(query);
        assert_eq!(message.kind, MessageKind::Query, "clause on a non-query object");
        true
    }

    fn search(&self, client: &ClientHandle, query: &MessageHandle) -> Option<ResponseHandle> {
        let mut state = self.lock();
        state.calls.push(Call::Search);
        state.client(client);
        assert_eq!(state.message(query).kind, MessageKind::Query);
        if state.fail_search {
            return None;
        }

        let canned = state.canned.clone();
        let pending = canned
            .into_iter()
            .map(|fields| {
                let id = state.allocate();
                state.records.insert(id, fields);
                id
            })
            .collect();

        let id = state.allocate();
        state.responses.insert(
            id,
            Response {
                pending,
                yielded: Vec::new(),
            },
        );
        Some(ResponseHandle(id))
    }

    fn next_record(&self, response: &ResponseHandle) -> Option<RecordHandle> {
        let mut state = self.lock();
        state.calls.push(Call::NextRecord);
        let response = state.response(response);
        if response.pending.is_empty() {
            return None;
        }
        let id = response.pending.remove(0);
        response.yielded.push(id);
        Some(RecordHandle(id))
    }

    fn record_key(&self, record: &RecordHandle, index: u32) -> Option<String> {
        let mut state = self.lock();
        state.calls.push(Call::RecordKey(index));
        state
            .record(record)
            .get(index as usize)
            .map(|(key, _)| key.clone())
    }

    fn record_value(&self, record: &RecordHandle, key: &str) -> Option<String> {
        let mut state = self.lock();
        state.calls.push(Call::RecordValue(key.to_owned()));
        state
            .record(record)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn free_response(&self, response: ResponseHandle) {
        let mut state = self.lock();
        state.calls.push(Call::FreeResponse);
        let Response { pending, yielded } = {
            state.response(&response);
            state
                .responses
                .remove(&response.0)
                .expect("response handle validated above")
        };
        for id in pending.into_iter().chain(yielded) {
            state.records.remove(&id);
        }
    }
}
