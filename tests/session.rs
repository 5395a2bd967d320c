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

use std::os::fd::AsRawFd;
use std::sync::Arc;

use aslog::Severity;
use aslog::backend::Call;
use aslog::backend::MessageKind;
use aslog::backend::OpenFlags;
use aslog::backend::Testing;

#[test]
fn test_default_threshold_is_debug() {
    let logger = aslog::builder().ident("t").build_with(Testing::new());
    assert_eq!(logger.level(), Severity::Debug);
    assert!(logger.debug_enabled());
    assert!(logger.fatal_enabled());
}

#[test]
fn test_open_options() {
    let backend = Arc::new(Testing::new());
    let _logger = aslog::builder()
        .facility("com.example.daemon")
        .ident("example")
        .build_with(backend.clone());

    let open = backend
        .calls()
        .into_iter()
        .find(|call| matches!(call, Call::Open { .. }))
        .expect("a client must be opened");
    let Call::Open {
        ident,
        facility,
        opts,
    } = open
    else {
        unreachable!()
    };
    assert_eq!(ident.as_deref(), Some("example"));
    assert_eq!(facility.as_deref(), Some("com.example.daemon"));
    assert!(opts.contains(OpenFlags::NO_DELAY | OpenFlags::NO_REMOTE));
    assert!(!opts.contains(OpenFlags::STDERR));
}

#[test]
fn test_stderr_option_is_passed_through() {
    let backend = Arc::new(Testing::new());
    let _logger = aslog::builder()
        .ident("example")
        .log_to_stderr(true)
        .build_with(backend.clone());

    assert!(backend.calls().iter().any(|call| matches!(
        call,
        Call::Open { opts, .. } if opts.contains(OpenFlags::STDERR)
    )));
}

#[test]
fn test_template_carries_facility() {
    let backend = Arc::new(Testing::new());
    let _logger = aslog::builder()
        .facility("com.example.daemon")
        .build_with(backend.clone());

    let calls = backend.calls();
    assert!(calls.contains(&Call::NewMessage(MessageKind::Msg)));
    assert!(calls.contains(&Call::SetField {
        key: "Facility".to_owned(),
        value: "com.example.daemon".to_owned(),
    }));
}

#[test]
fn test_threshold_is_installed_natively() {
    let backend = Arc::new(Testing::new());
    let _logger = aslog::builder()
        .ident("t")
        .level(Severity::Notice)
        .build_with(backend.clone());

    assert!(backend.calls().contains(&Call::SetFilter(Severity::Notice)));
}

#[test]
fn test_empty_config_opens_no_client() {
    let backend = Arc::new(Testing::new());
    let logger = aslog::builder().build_with(backend.clone());

    assert!(!backend
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Open { .. })));

    // degraded: emits are no-ops, searches find nothing
    logger.error("nobody hears this");
    assert!(backend.logged().is_empty());
    let records = logger.search(&aslog::Query::new()).unwrap();
    assert!(records.is_empty());
    assert!(!backend.calls().contains(&Call::Search));
}

#[test]
fn test_failed_open_degrades_instead_of_failing() {
    let backend = Arc::new(Testing::new().failing_open());
    let logger = aslog::builder().ident("t").build_with(backend.clone());

    assert!(backend
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Open { .. })));
    logger.info("dropped");
    assert!(backend.logged().is_empty());
    // no client, so no filter to install either
    assert!(!backend
        .calls()
        .iter()
        .any(|call| matches!(call, Call::SetFilter(_))));
}

#[test]
fn test_levels_map_to_asl_severities() {
    let backend = Arc::new(Testing::new());
    let logger = aslog::builder().ident("t").build_with(backend.clone());

    logger.debug("d");
    logger.info("i");
    logger.notice("n");
    logger.warn("w");
    logger.error("e");
    logger.fatal("f");
    logger.unknown("u");

    assert_eq!(
        backend.logged(),
        vec![
            (Severity::Debug, "d".to_owned()),
            (Severity::Info, "i".to_owned()),
            (Severity::Notice, "n".to_owned()),
            (Severity::Warning, "w".to_owned()),
            (Severity::Error, "e".to_owned()),
            (Severity::Critical, "f".to_owned()),
            (Severity::Emergency, "u".to_owned()),
        ]
    );
}

#[test]
fn test_threshold_gates_emission() {
    let backend = Arc::new(Testing::new());
    let logger = aslog::builder()
        .ident("t")
        .level(Severity::Warning)
        .build_with(backend.clone());

    assert!(logger.error_enabled());
    assert!(logger.warn_enabled());
    assert!(!logger.info_enabled());
    assert!(!logger.debug_enabled());

    logger.info("too verbose");
    logger.debug("too verbose");
    logger.error("kept");

    assert_eq!(backend.logged(), vec![(Severity::Error, "kept".to_owned())]);
}

#[test]
fn test_append_uses_session_level() {
    let backend = Arc::new(Testing::new());
    let logger = aslog::builder()
        .ident("t")
        .level(Severity::Notice)
        .build_with(backend.clone());

    logger.append("raw payload");
    assert_eq!(
        backend.logged(),
        vec![(Severity::Notice, "raw payload".to_owned())]
    );
}

#[test]
fn test_message_is_submitted_verbatim() {
    let backend = Arc::new(Testing::new());
    let logger = aslog::builder().ident("t").build_with(backend.clone());

    // format directives in caller text must survive untouched
    logger.info("100%s done %n");
    assert_eq!(
        backend.logged(),
        vec![(Severity::Info, "100%s done %n".to_owned())]
    );
}

#[test]
fn test_mirror_target_is_registered() {
    let file = tempfile::tempfile().unwrap();
    let fd = file.as_raw_fd();

    let backend = Arc::new(Testing::new());
    let logger = aslog::builder().mirror(&file).build_with(backend.clone());

    // a mirror alone is enough to open a client
    assert!(backend
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Open { .. })));
    assert!(backend.calls().contains(&Call::AddLogFile(fd)));

    logger.remove_mirror(&file);
    assert!(backend.calls().contains(&Call::RemoveLogFile(fd)));
}

#[test]
fn test_close_is_idempotent() {
    let backend = Arc::new(Testing::new());
    let logger = aslog::builder().ident("t").build_with(backend.clone());

    logger.close();
    let after_first = backend.calls().len();
    logger.close();
    assert_eq!(backend.calls().len(), after_first);
    assert_eq!(backend.live_handles(), 0);
}

#[test]
fn test_emit_after_close_is_a_no_op() {
    let backend = Arc::new(Testing::new());
    let logger = aslog::builder().ident("t").build_with(backend.clone());

    logger.close();
    let quiesced = backend.calls().len();

    logger.info("after close");
    logger.append("after close");
    logger.unknown("after close");
    assert_eq!(backend.calls().len(), quiesced);
}

#[test]
fn test_search_after_close_finds_nothing() {
    let backend = Arc::new(Testing::new().with_records([[("Sender", "bootlog")]]));
    let logger = aslog::builder().ident("t").build_with(backend.clone());

    logger.close();
    let records = logger.search(&aslog::Query::new()).unwrap();
    assert!(records.is_empty());
    assert!(!backend.calls().contains(&Call::Search));
}

#[test]
fn test_drop_closes_the_session() {
    let backend = Arc::new(Testing::new());
    {
        let logger = aslog::builder().ident("t").build_with(backend.clone());
        logger.info("while alive");
    }
    assert!(backend.calls().contains(&Call::Close));
    assert!(backend.calls().contains(&Call::FreeMessage));
    assert_eq!(backend.live_handles(), 0);
}

#[test]
fn test_log_bridge_forwards_at_mapped_severity() {
    let backend = Arc::new(Testing::new());
    let logger = aslog::builder().ident("t").build_with(backend.clone());

    log::Log::log(
        &logger,
        &log::Record::builder()
            .level(log::Level::Warn)
            .args(format_args!("bridged {}", 42))
            .build(),
    );

    assert_eq!(
        backend.logged(),
        vec![(Severity::Warning, "bridged 42".to_owned())]
    );
}

#[test]
fn test_log_bridge_respects_threshold() {
    let backend = Arc::new(Testing::new());
    let logger = aslog::builder()
        .ident("t")
        .level(Severity::Error)
        .build_with(backend.clone());

    let metadata = log::Metadata::builder().level(log::Level::Debug).build();
    assert!(!log::Log::enabled(&logger, &metadata));

    log::Log::log(
        &logger,
        &log::Record::builder()
            .level(log::Level::Debug)
            .args(format_args!("too verbose"))
            .build(),
    );
    assert!(backend.logged().is_empty());
}
