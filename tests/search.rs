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

use std::sync::Arc;

use aslog::ErrorKind;
use aslog::Logger;
use aslog::Pattern;
use aslog::Query;
use aslog::backend::Call;
use aslog::backend::MessageKind;
use aslog::backend::QueryOp;
use aslog::backend::Testing;
use jiff::Timestamp;

fn session(backend: &Arc<Testing>) -> Logger {
    aslog::builder().ident("search-test").build_with(backend.clone())
}

#[test]
fn test_canned_records_come_back_in_order() {
    let backend = Arc::new(Testing::new().with_records([
        [("Sender", "bootlog"), ("Level", "5")],
        [("Sender", "kernel"), ("Level", "3")],
    ]));
    let logger = session(&backend);

    let records = logger
        .search(&Query::new().with("sender", "bootlog").with("level", 5))
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["Sender"], "bootlog");
    assert_eq!(records[0]["Level"], "5");
    assert_eq!(records[1]["Sender"], "kernel");
    assert_eq!(records[1]["Level"], "3");

    assert_eq!(
        backend.clauses(),
        vec![
            ("Sender".to_owned(), "bootlog".to_owned(), QueryOp::EQUAL),
            (
                "Level".to_owned(),
                "5".to_owned(),
                QueryOp::EQUAL | QueryOp::NUMERIC
            ),
        ]
    );
}

#[test]
fn test_native_supplied_fields_are_preserved() {
    let backend = Arc::new(Testing::new().with_records([[
        ("ASLMessageID", "1"),
        ("Time", "1570858104"),
        ("Sender", "bootlog"),
        ("Message", "BOOT_TIME 1570858104 0"),
        ("ut_pid", "1"),
    ]]));
    let logger = session(&backend);

    let records = logger.search(&Query::new().with("sender", "bootlog")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].len(), 5);
    assert_eq!(records[0]["ut_pid"], "1");
    assert_eq!(records[0]["Message"], "BOOT_TIME 1570858104 0");
}

#[test]
fn test_unknown_field_fails_before_any_native_call() {
    let backend = Arc::new(Testing::new());
    let logger = session(&backend);
    let before = backend.calls().len();

    let err = logger
        .search(&Query::new().with("bogus", 1))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownField);
    assert!(backend.clauses().is_empty());
    assert!(!backend
        .calls()
        .contains(&Call::NewMessage(MessageKind::Query)));
    assert_eq!(backend.calls().len(), before);
}

#[test]
fn test_timestamp_clause_uses_greater_equal() {
    let backend = Arc::new(Testing::new());
    let logger = session(&backend);

    let ts = Timestamp::from_second(1_570_858_104).unwrap();
    logger.search(&Query::new().with("time", ts)).unwrap();

    let clauses = backend.clauses();
    assert_eq!(clauses.len(), 1);
    let (key, value, ops) = &clauses[0];
    assert_eq!(key, "Time");
    assert_eq!(value, "1570858104");
    assert_eq!(ops.operator(), QueryOp::GREATER_EQUAL);
    assert_ne!(ops.operator(), QueryOp::EQUAL);
}

#[test]
fn test_pattern_clause_flags() {
    let backend = Arc::new(Testing::new());
    let logger = session(&backend);

    logger
        .search(&Query::new().with("message", Pattern::new("^BOOT_TIME").unwrap()))
        .unwrap();
    logger
        .search(&Query::new().with("message", Pattern::case_insensitive("boot_time").unwrap()))
        .unwrap();

    let clauses = backend.clauses();
    assert_eq!(clauses.len(), 2);
    assert!(clauses[0].2.contains(QueryOp::REGEX));
    assert!(!clauses[0].2.contains(QueryOp::CASEFOLD));
    assert!(clauses[1].2.contains(QueryOp::REGEX));
    assert!(clauses[1].2.contains(QueryOp::CASEFOLD));
}

#[test]
fn test_no_matches_is_an_empty_result() {
    let backend = Arc::new(Testing::new());
    let logger = session(&backend);

    let records = logger.search(&Query::new().with("sender", "nothing")).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_query_resources_are_released() {
    let backend = Arc::new(Testing::new().with_records([[("Sender", "bootlog")]]));
    let logger = session(&backend);

    logger.search(&Query::new().with("sender", "bootlog")).unwrap();

    // only the session's client and template may remain
    assert_eq!(backend.live_handles(), 2);
    let frees = backend
        .calls()
        .iter()
        .filter(|call| matches!(call, Call::FreeMessage | Call::FreeResponse))
        .count();
    assert_eq!(frees, 2);

    logger.close();
    assert_eq!(backend.live_handles(), 0);
}

#[test]
fn test_failed_native_search_degrades_to_empty() {
    let backend = Arc::new(Testing::new().failing_search());
    let logger = session(&backend);

    let records = logger.search(&Query::new().with("sender", "bootlog")).unwrap();
    assert!(records.is_empty());

    // the query object must still be released
    assert!(backend.calls().contains(&Call::Search));
    assert!(backend.calls().contains(&Call::FreeMessage));
    assert_eq!(backend.live_handles(), 2);
}

#[test]
fn test_repeated_searches_are_independent() {
    let backend = Arc::new(Testing::new().with_records([[("Sender", "bootlog")]]));
    let logger = session(&backend);

    let first = logger.search(&Query::new().with("sender", "bootlog")).unwrap();
    let second = logger.search(&Query::new().with("sender", "bootlog")).unwrap();
    assert_eq!(first, second);
    assert_eq!(backend.live_handles(), 2);
}
