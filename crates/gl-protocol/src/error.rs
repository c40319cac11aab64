//! Protocol error types

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Errors raised while framing the guider byte stream
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A line exceeded the codec's maximum length
    #[error("Line too long: exceeds maximum of {max} bytes")]
    LineTooLong { max: usize },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LinesCodecError> for ProtocolError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => ProtocolError::LineTooLong {
                max: crate::codec::MAX_LINE_LENGTH,
            },
            LinesCodecError::Io(e) => ProtocolError::Io(e),
        }
    }
}

/// Classification of an error response returned by the guider.
///
/// The kind is decided once, when the response is decoded. Everything
/// downstream branches on the kind; the guider's message text travels
/// along for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorKind {
    /// The axis argument was not recognised
    InvalidAxis,
    /// The method does not exist in this guider version
    UnsupportedMethod,
    /// The request needs a selected guide star
    NoStarSelected,
    /// No camera frame has been captured yet
    NoImageAvailable,
    /// Calibration or optics metadata is not known yet
    MetadataUnavailable,
    /// Anything else
    Other,
}

/// JSON-RPC "method not found"
const METHOD_NOT_FOUND: i64 = -32601;

impl RpcErrorKind {
    /// Classify an error response by its code and message
    pub fn classify(code: i64, message: &str) -> Self {
        if code == METHOD_NOT_FOUND {
            return RpcErrorKind::UnsupportedMethod;
        }

        let text = message.to_ascii_lowercase();
        if text.contains("invalid axis") {
            RpcErrorKind::InvalidAxis
        } else if text.contains("method not found")
            || text.contains("unknown method")
            || text.contains("not supported")
        {
            RpcErrorKind::UnsupportedMethod
        } else if text.contains("no star selected") {
            RpcErrorKind::NoStarSelected
        } else if text.contains("no image") || text.contains("no current image") {
            RpcErrorKind::NoImageAvailable
        } else if text.contains("metadata") || text.contains("not yet available") {
            RpcErrorKind::MetadataUnavailable
        } else {
            RpcErrorKind::Other
        }
    }

    /// Stable tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcErrorKind::InvalidAxis => "invalid_axis",
            RpcErrorKind::UnsupportedMethod => "unsupported_method",
            RpcErrorKind::NoStarSelected => "no_star_selected",
            RpcErrorKind::NoImageAvailable => "no_image_available",
            RpcErrorKind::MetadataUnavailable => "metadata_unavailable",
            RpcErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error response from the guider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code}, {kind})")]
pub struct RpcError {
    /// Classified kind
    pub kind: RpcErrorKind,
    /// Numeric code reported by the guider
    pub code: i64,
    /// Original message text
    pub message: String,
}

impl RpcError {
    /// Build an error from a raw code and message, classifying it
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: RpcErrorKind::classify(code, &message),
            code,
            message,
        }
    }

    /// Whether this error only means "not known yet" during guider startup
    pub fn is_transient_unavailable(&self) -> bool {
        matches!(
            self.kind,
            RpcErrorKind::MetadataUnavailable | RpcErrorKind::NoImageAvailable
        )
    }
}
