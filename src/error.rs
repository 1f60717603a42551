use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Use of Internal is never a guarantee that the error is not, for
    /// example, caused by a corrupted data directory - merely that it cannot
    /// be confidently determined by the code.
    Internal,

    /// The caller provided invalid input or asked for something that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The wire string is not a well-formed envelope (marker, JSON shape, iv length).
    EnvelopeInvalid,
    /// Base64 decoding of the envelope or one of its fields failed.
    EnvelopeDecode,
    /// The envelope declares a version or algorithm this build does not speak.
    EnvelopeFromFuture,
    /// The ciphertext is too short to even hold the authentication tag.
    TruncatedInput,
    /// Authentication failed: wrong passphrase, wrong channel, tampering
    /// or corruption.
    AuthenticationFailed,
    /// AES-GCM refused to seal the plaintext.
    SealFailure,
    /// Passphrase could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// Encoding or decoding a persisted record failed.
    Serialization,
    /// The persisted outbox blob exists but cannot be parsed.
    StoreCorrupt,
    /// A configuration value is out of range or malformed.
    InvalidConfig,
    /// A delivery status name is not one of the known states.
    InvalidStatus,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct HushchatError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag. Any code consuming errors MUST
    /// handle the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl HushchatError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that retains the originating source error.
    pub fn with_source(
        category: ErrorCategory,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: None,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Shorthand for an I/O failure that keeps the underlying `io::Error`.
    pub(crate) fn io(msg: impl Into<String>, source: std::io::Error) -> Self {
        let category = if source.kind() == std::io::ErrorKind::NotFound {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        Self::with_kind_and_source(category, ErrorKind::Io, msg, source)
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, HushchatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_kind_and_chain() {
        let inner = HushchatError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::StoreCorrupt,
            "bad blob",
        );
        let outer = inner.with_context("failed to list outbox");

        assert_eq!(outer.kind, Some(ErrorKind::StoreCorrupt));
        assert_eq!(outer.category, ErrorCategory::Internal);
        assert_eq!(outer.to_string(), "failed to list outbox");
        assert_eq!(outer.source_error().unwrap().to_string(), "bad blob");
    }

    #[test]
    fn test_not_found_is_user_error() {
        let err = HushchatError::io(
            "failed to read",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.category, ErrorCategory::User);
        assert_eq!(err.kind, Some(ErrorKind::Io));

        let err = HushchatError::io(
            "failed to read",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(err.category, ErrorCategory::Internal);
    }
}
