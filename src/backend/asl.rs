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

use std::ffi::CStr;
use std::ffi::CString;
use std::os::fd::RawFd;
use std::ptr;

use libc::c_char;
use libc::c_int;
use libc::c_void;

use crate::Severity;
use crate::backend::Backend;
use crate::backend::ClientHandle;
use crate::backend::MessageHandle;
use crate::backend::MessageKind;
use crate::backend::OpenFlags;
use crate::backend::QueryOp;
use crate::backend::RecordHandle;
use crate::backend::ResponseHandle;

const ASL_TYPE_MSG: u32 = 0;
const ASL_TYPE_QUERY: u32 = 1;

// asl(3) from libSystem. `asl_log` is variadic; the binding always passes a
// fixed "%s" format so caller text is never interpreted as directives.
unsafe extern "C" {
    fn asl_open(ident: *const c_char, facility: *const c_char, opts: u32) -> *mut c_void;
    fn asl_close(client: *mut c_void);
    fn asl_new(kind: u32) -> *mut c_void;
    fn asl_free(message: *mut c_void);
    fn asl_set(message: *mut c_void, key: *const c_char, value: *const c_char) -> c_int;
    fn asl_set_filter(client: *mut c_void, mask: c_int) -> c_int;
    fn asl_add_log_file(client: *mut c_void, fd: c_int) -> c_int;
    fn asl_remove_log_file(client: *mut c_void, fd: c_int) -> c_int;
    fn asl_log(
        client: *mut c_void,
        message: *mut c_void,
        level: c_int,
        format: *const c_char,
        ...
    ) -> c_int;
    fn asl_set_query(
        message: *mut c_void,
        key: *const c_char,
        value: *const c_char,
        ops: u32,
    ) -> c_int;
    fn asl_search(client: *mut c_void, query: *mut c_void) -> *mut c_void;
    fn aslresponse_next(response: *mut c_void) -> *mut c_void;
    fn asl_key(message: *mut c_void, index: u32) -> *const c_char;
    fn asl_get(message: *mut c_void, key: *const c_char) -> *const c_char;
    fn aslresponse_free(response: *mut c_void);
}

/// The real `asl(3)` daemon.
///
/// All failure modes of the C API (null handles, non-zero statuses) map to
/// the [`Backend`] failure sentinels; strings with interior NUL bytes are
/// treated as native failures rather than errors.
#[derive(Clone, Copy, Debug, Default)]
pub struct Asl;

impl Asl {
    /// Create a handle to the system logging facility.
    pub fn new() -> Self {
        Asl
    }
}

fn opt_cstring(s: Option<&str>) -> Result<Option<CString>, ()> {
    match s {
        Some(s) => CString::new(s).map(Some).map_err(|_| ()),
        None => Ok(None),
    }
}

fn opt_ptr(s: &Option<CString>) -> *const c_char {
    s.as_ref().map_or(ptr::null(), |s| s.as_ptr())
}

fn owned_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: the daemon returns a NUL-terminated string that lives as long
    // as the record it was read from; it is copied out immediately.
    let s = unsafe { CStr::from_ptr(ptr) };
    Some(s.to_string_lossy().into_owned())
}

impl Backend for Asl {
    fn open(
        &self,
        ident: Option<&str>,
        facility: Option<&str>,
        opts: OpenFlags,
    ) -> Option<ClientHandle> {
        let Ok(ident) = opt_cstring(ident) else {
            return None;
        };
        let Ok(facility) = opt_cstring(facility) else {
            return None;
        };
        let client = unsafe { asl_open(opt_ptr(&ident), opt_ptr(&facility), opts.bits()) };
        (!client.is_null()).then(|| ClientHandle(client as usize))
    }

    fn close(&self, client: ClientHandle) {
        unsafe { asl_close(client.0 as *mut c_void) }
    }

    fn new_message(&self, kind: MessageKind) -> Option<MessageHandle> {
        let kind = match kind {
            MessageKind::Msg => ASL_TYPE_MSG,
            MessageKind::Query => ASL_TYPE_QUERY,
        };
        let message = unsafe { asl_new(kind) };
        (!message.is_null()).then(|| MessageHandle(message as usize))
    }

    fn free_message(&self, message: MessageHandle) {
        unsafe { asl_free(message.0 as *mut c_void) }
    }

    fn set_field(&self, message: &MessageHandle, key: &str, value: &str) -> bool {
        let (Ok(key), Ok(value)) = (CString::new(key), CString::new(value)) else {
            return false;
        };
        let status =
            unsafe { asl_set(message.0 as *mut c_void, key.as_ptr(), value.as_ptr()) };
        status == 0
    }

    fn set_filter(&self, client: &ClientHandle, threshold: Severity) -> bool {
        // ASL_FILTER_MASK_UPTO: one bit per level up to the threshold
        let mask = (1 << (threshold as i32 + 1)) - 1;
        let status = unsafe { asl_set_filter(client.0 as *mut c_void, mask) };
        status == 0
    }

    fn add_log_file(&self, client: &ClientHandle, fd: RawFd) -> bool {
        let status = unsafe { asl_add_log_file(client.0 as *mut c_void, fd) };
        status == 0
    }

    fn remove_log_file(&self, client: &ClientHandle, fd: RawFd) -> bool {
        let status = unsafe { asl_remove_log_file(client.0 as *mut c_void, fd) };
        status == 0
    }

    fn log(
        &self,
        client: &ClientHandle,
        template: &MessageHandle,
        level: Severity,
        message: &str,
    ) -> bool {
        let Ok(message) = CString::new(message) else {
            return false;
        };
        let status = unsafe {
            asl_log(
                client.0 as *mut c_void,
                template.0 as *mut c_void,
                level as c_int,
                c"%s".as_ptr(),
                message.as_ptr(),
            )
        };
        status == 0
    }

    fn set_query(&self, query: &MessageHandle, key: &str, value: &str, ops: QueryOp) -> bool {
        let (Ok(key), Ok(value)) = (CString::new(key), CString::new(value)) else {
            return false;
        };
        let status = unsafe {
            asl_set_query(query.0 as *mut c_void, key.as_ptr(), value.as_ptr(), ops.bits())
        };
        status == 0
    }

    fn search(&self, client: &ClientHandle, query: &MessageHandle) -> Option<ResponseHandle> {
        let response =
            unsafe { asl_search(client.0 as *mut c_void, query.0 as *mut c_void) };
        (!response.is_null()).then(|| ResponseHandle(response as usize))
    }

    fn next_record(&self, response: &ResponseHandle) -> Option<RecordHandle> {
        let record = unsafe { aslresponse_next(response.0 as *mut c_void) };
        (!record.is_null()).then(|| RecordHandle(record as usize))
    }

    fn record_key(&self, record: &RecordHandle, index: u32) -> Option<String> {
        let key = unsafe { asl_key(record.0 as *mut c_void, index) };
        owned_string(key)
    }

    fn record_value(&self, record: &RecordHandle, key: &str) -> Option<String> {
        let Ok(key) = CString::new(key) else {
            return None;
        };
        let value = unsafe { asl_get(record.0 as *mut c_void, key.as_ptr()) };
        owned_string(value)
    }

    fn free_response(&self, response: ResponseHandle) {
        unsafe { aslresponse_free(response.0 as *mut c_void) }
    }
}
