//! Source download error types

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ErrorEnvelope, UserFacingError};

/// Failure category of a source download, tagged by origin kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Unknown,
    Checksum,
    // OSTree remotes
    OstreeRemoteAdd,
    OstreeGpgImport,
    OstreePull,
    OstreeRemoteDelete,
    // Container registries
    SkopeoCopy,
    SkopeoInspect,
    // Generic URL fetches
    CurlBadInput,
    CurlInternalError,
    CurlNetworking,
    CurlCredentials,
    CurlStorage,
    CurlSecurity,
}

impl SourceErrorKind {
    /// Wire tag of the kind, identical to its serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Checksum => "checksum",
            Self::OstreeRemoteAdd => "ostree_remote_add",
            Self::OstreeGpgImport => "ostree_gpg_import",
            Self::OstreePull => "ostree_pull",
            Self::OstreeRemoteDelete => "ostree_remote_delete",
            Self::SkopeoCopy => "skopeo_copy",
            Self::SkopeoInspect => "skopeo_inspect",
            Self::CurlBadInput => "curl_bad_input",
            Self::CurlInternalError => "curl_internal_error",
            Self::CurlNetworking => "curl_networking",
            Self::CurlCredentials => "curl_credentials",
            Self::CurlStorage => "curl_storage",
            Self::CurlSecurity => "curl_security",
        }
    }

    /// Stable dotted error code for this kind.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Unknown => "source.unknown",
            Self::Checksum => "source.checksum",
            Self::OstreeRemoteAdd => "source.ostree_remote_add",
            Self::OstreeGpgImport => "source.ostree_gpg_import",
            Self::OstreePull => "source.ostree_pull",
            Self::OstreeRemoteDelete => "source.ostree_remote_delete",
            Self::SkopeoCopy => "source.skopeo_copy",
            Self::SkopeoInspect => "source.skopeo_inspect",
            Self::CurlBadInput => "source.curl_bad_input",
            Self::CurlInternalError => "source.curl_internal_error",
            Self::CurlNetworking => "source.curl_networking",
            Self::CurlCredentials => "source.curl_credentials",
            Self::CurlStorage => "source.curl_storage",
            Self::CurlSecurity => "source.curl_security",
        }
    }

    /// Parse a kind from a dotted code (`source.checksum`).
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let tag = code.strip_prefix("source.")?;
        serde_json::from_value(serde_json::Value::String(tag.to_string())).ok()
    }
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by a source worker, carrying the originating source name.
///
/// `source` names the origin (e.g. `org.osforge.curl`); it is not an error
/// cause, which is why `Error` is implemented by hand here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
    pub source: String,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

impl std::error::Error for SourceError {}

impl SourceError {
    #[must_use]
    pub fn new(kind: SourceErrorKind, message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: source.into(),
        }
    }

    /// Plain structured form used when crossing the process boundary.
    #[must_use]
    pub fn to_structured(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind,
            "message": self.message,
            "source": self.source,
        })
    }

    /// Rebuild an error from its structured form.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the value is missing a field or carries an
    /// unknown kind tag.
    pub fn from_structured(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Full error envelope, with the source name as a detail.
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self.kind.code(), self.message.clone())
            .with_detail("source", self.source.clone())
    }

    /// Recover a typed source error from an envelope produced by [`Self::envelope`].
    #[must_use]
    pub fn from_envelope(envelope: &ErrorEnvelope) -> Option<Self> {
        let kind = SourceErrorKind::from_code(&envelope.code)?;
        let source = envelope.detail_str("source").unwrap_or_default();
        Some(Self::new(kind, envelope.message.clone(), source))
    }
}

impl UserFacingError for SourceError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self.kind {
            SourceErrorKind::Checksum => {
                Some("The downloaded content does not match the manifest checksum.")
            }
            SourceErrorKind::CurlNetworking => Some("Check network connectivity and retry."),
            SourceErrorKind::CurlCredentials => {
                Some("Check the credentials configured for this source.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self.kind, SourceErrorKind::CurlNetworking)
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(self.kind.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_code_round_trip() {
        for kind in [
            SourceErrorKind::Checksum,
            SourceErrorKind::OstreePull,
            SourceErrorKind::SkopeoInspect,
            SourceErrorKind::CurlSecurity,
        ] {
            assert_eq!(SourceErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(SourceErrorKind::from_code("stage.failed"), None);
    }

    #[test]
    fn test_structured_form_uses_string_tag() {
        let err = SourceError::new(SourceErrorKind::OstreeRemoteAdd, "nope", "org.osforge.ostree");
        let value = err.to_structured();
        assert_eq!(value["kind"], "ostree_remote_add");
        assert_eq!(value["source"], "org.osforge.ostree");
    }
}
