use cfgctl_core::errors::{CtlError, ErrorClass, ExError, ExErrorKind};

#[test]
fn test_record_not_found_verifiable_by_kind() {
    let ex_err: ExError = CtlError::RecordNotFound {
        table: "Switch".to_string(),
        record: "sw9".to_string(),
    }
    .into();

    assert_eq!(ex_err.kind(), ExErrorKind::NotFound);
    assert_eq!(ex_err.code(), "ERR_NOT_FOUND");
    assert_eq!(ex_err.table(), Some("Switch"));
    assert_eq!(ex_err.record(), Some("sw9"));
    assert_eq!(ex_err.message(), "no row \"sw9\" in table Switch");
}

#[test]
fn test_ambiguous_distinct_from_not_found() {
    let ex_err: ExError = CtlError::AmbiguousRecord {
        table: "Switch".to_string(),
        record: "dup".to_string(),
    }
    .into();

    assert_eq!(ex_err.kind(), ExErrorKind::Ambiguous);
    assert_ne!(ex_err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_error_classes_follow_taxonomy() {
    let cases: Vec<(CtlError, ErrorClass)> = vec![
        (
            CtlError::TooFewArguments {
                command: "set".to_string(),
                min: 3,
            },
            ErrorClass::Validation,
        ),
        (
            CtlError::SymbolNeverCreated {
                name: "@x".to_string(),
            },
            ErrorClass::Handler,
        ),
        (CtlError::TransactionAborted, ErrorClass::Commit),
        (CtlError::NotLocked, ErrorClass::Commit),
        (CtlError::TimeoutExpired, ErrorClass::Timeout),
        (
            CtlError::ConnectionFailed {
                target: "memory:".to_string(),
                reason: "closed".to_string(),
            },
            ErrorClass::Environment,
        ),
    ];

    for (err, class) in cases {
        let ex: ExError = err.into();
        assert_eq!(ex.class(), class, "{}", ex);
    }
}

#[test]
fn test_connection_failure_message() {
    let ex: ExError = CtlError::ConnectionFailed {
        target: "/tmp/db".to_string(),
        reason: "database is locked".to_string(),
    }
    .into();
    assert_eq!(
        ex.message(),
        "/tmp/db: database connection failed (database is locked)"
    );
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such socket");
    let ex: ExError = io.into();
    assert_eq!(ex.kind(), ExErrorKind::Io);
    assert_eq!(ex.message(), "no such socket");
}

#[test]
fn test_source_chain() {
    let inner: ExError = CtlError::TimeoutExpired.into();
    let outer = ExError::new(ExErrorKind::Ipc)
        .with_message("daemon failed")
        .with_source(inner);
    assert_eq!(
        outer.source_error().map(|e| e.kind()),
        Some(ExErrorKind::Timeout)
    );
    assert!(std::error::Error::source(&outer).is_some());
}
