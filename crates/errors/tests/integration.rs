//! Integration tests for error types

#[cfg(test)]
mod tests {
    use osforge_errors::*;
    use std::time::Duration;

    #[test]
    fn test_error_conversion() {
        let err = StoreError::ObjectNotFound { id: "abc".into() };
        let err: Error = err.into();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(err.user_code(), Some("store.object_not_found"));
    }

    #[test]
    fn test_error_display() {
        let err = StageError::Timeout {
            stage: "org.osforge.noop".into(),
            limit: Duration::from_secs(1),
        };
        assert_eq!(
            err.to_string(),
            "stage org.osforge.noop timed out after 1s"
        );

        let err = StageError::Timeout {
            stage: "org.osforge.noop".into(),
            limit: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "stage org.osforge.noop timed out after 250ms"
        );
    }

    #[test]
    fn test_source_error_round_trip() {
        let err = SourceError::new(SourceErrorKind::Checksum, "mismatch", "fetch-curl");
        let structured = err.to_structured();
        let json = serde_json::to_string(&structured).unwrap();

        let decoded = SourceError::from_structured(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(decoded, err);
        assert_eq!(decoded.kind, SourceErrorKind::Checksum);
        assert_eq!(decoded.message, "mismatch");
        assert_eq!(decoded.source, "fetch-curl");
    }

    #[test]
    fn test_source_error_envelope_round_trip() {
        let err = SourceError::new(SourceErrorKind::CurlNetworking, "host down", "org.osforge.curl");
        let envelope = Error::from(err.clone()).envelope();
        assert_eq!(envelope.code, "source.curl_networking");
        assert_eq!(envelope.detail_str("source"), Some("org.osforge.curl"));
        assert_eq!(SourceError::from_envelope(&envelope), Some(err));
    }

    #[test]
    fn test_unknown_source_kind_rejected() {
        let value = serde_json::json!({"kind": "bogus", "message": "m", "source": "s"});
        assert!(SourceError::from_structured(value).is_err());
    }

    #[test]
    fn test_cancelled_is_distinct() {
        let err = Error::Cancelled;
        assert!(err.is_cancelled());
        assert_eq!(err.envelope().code, "error.aborted");
        assert!(!Error::internal("boom").is_cancelled());
    }

    #[test]
    fn test_io_error_envelope_keeps_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err = Error::io_with_path(&io_err, "/var/tmp/x");
        let envelope = err.envelope();
        assert_eq!(envelope.code, "error.io");
        assert_eq!(envelope.detail_str("path"), Some("/var/tmp/x"));
    }
}
