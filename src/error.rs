//! Error taxonomy shared by every crawl component.
//!
//! Each variant is fatal to the current run; nothing here is retried. The
//! `context` strings name the call and identifier that failed so the chain
//! printed by the CLI points at the offending step.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The request template violates its dialect grammar.
    #[error("malformed request template")]
    MalformedTemplate(#[from] TemplateError),

    /// Network failure, unexpected status, undecodable body, or cancellation.
    #[error("{context}")]
    Transport {
        context: String,
        #[source]
        source: TransportError,
    },

    /// The response decoded but lacks required structure.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("unsupported content type: {content_type:?}")]
    UnsupportedContentType { content_type: String },

    #[error("{context}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn transport(context: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }

    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::transport(context, TransportError::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                source: TransportError::Cancelled,
                ..
            }
        )
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,

    #[error("invalid first request line: {0:?}")]
    InvalidRequestLine(String),

    #[error("invalid http version {0:?}")]
    InvalidVersion(String),

    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("header line has no \": \" separator: {0:?}")]
    MissingSeparator(String),

    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },

    #[error("unknown pseudo-header {0:?}")]
    UnknownPseudoHeader(String),

    #[error("pseudo-header {0} given more than once")]
    DuplicatePseudoHeader(&'static str),

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("unable to parse path {path:?}")]
    InvalidPath {
        path: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("unable to assemble request uri")]
    InvalidUri(#[source] http::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("unexpected status code: {0}")]
    Status(http::StatusCode),

    #[error("invalid url {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unable to decompress gzip body")]
    Decompress(#[source] std::io::Error),

    #[error("unable to decode json body")]
    Json(#[from] serde_json::Error),
}
