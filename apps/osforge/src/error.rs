//! CLI error handling

use std::fmt;

use osforge_errors::{ErrorEnvelope, UserFacingError};

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration error
    Config(osforge_errors::Error),
    /// Manifest could not be read or is not a valid description
    Manifest(osforge_errors::Error),
    /// Build engine error
    Build(osforge_errors::Error),
    /// Invalid command arguments
    InvalidArguments(String),
    /// I/O error
    Io(std::io::Error),
}

impl CliError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Manifest(_) => 2,
            CliError::Build(e) if e.is_cancelled() => 130,
            _ => 1,
        }
    }

    /// Structured form of this error for machine readable output
    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            CliError::Config(e) | CliError::Manifest(e) | CliError::Build(e) => e.envelope(),
            CliError::InvalidArguments(message) => {
                ErrorEnvelope::new("cli.invalid_arguments", message.clone())
            }
            CliError::Io(e) => ErrorEnvelope::new("io.error", e.to_string()),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {e}"),
            CliError::Manifest(e) => write!(f, "Invalid manifest: {}", e.user_message()),
            CliError::Build(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) | CliError::Manifest(e) | CliError::Build(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::InvalidArguments(_) => None,
        }
    }
}

impl From<osforge_errors::Error> for CliError {
    fn from(e: osforge_errors::Error) -> Self {
        match e {
            osforge_errors::Error::Manifest(_) => CliError::Manifest(e),
            osforge_errors::Error::Config(_) => CliError::Config(e),
            _ => CliError::Build(e),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osforge_errors::{Error, ManifestError, ResolveError};

    #[test]
    fn test_exit_codes() {
        let manifest: CliError = Error::from(ManifestError::Invalid {
            message: "expected value".to_string(),
        })
        .into();
        assert_eq!(manifest.exit_code(), 2);

        let resolve: CliError = Error::from(ResolveError::MissedCheckpoints {
            names: vec!["tree".to_string()],
        })
        .into();
        assert_eq!(resolve.exit_code(), 1);

        assert_eq!(CliError::from(Error::Cancelled).exit_code(), 130);
        assert_eq!(
            CliError::InvalidArguments("--export needs --output-directory".into()).exit_code(),
            1
        );
    }

    #[test]
    fn test_envelope_keeps_code() {
        let err: CliError = Error::from(ResolveError::MissedCheckpoints {
            names: vec!["tree".to_string()],
        })
        .into();
        let envelope = err.envelope();
        assert_eq!(envelope.code, "resolve.missed_checkpoint");
        assert!(envelope.message.contains("tree"));

        let envelope = CliError::InvalidArguments("no output".into()).envelope();
        assert_eq!(envelope.code, "cli.invalid_arguments");
        assert_eq!(envelope.message, "no output");
    }

    #[test]
    fn test_build_error_shows_code() {
        let err: CliError = Error::from(ResolveError::MissedCheckpoints {
            names: vec!["tree".to_string()],
        })
        .into();
        let text = err.to_string();
        assert!(text.contains("Code: resolve."), "{text}");
    }
}
