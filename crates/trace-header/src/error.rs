//! Error types for building and running the injector.

use http::header::{InvalidHeaderName, InvalidHeaderValue};

/// Construction-time failures. No injector exists when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("trace header config can not be absent")]
    Missing,

    #[error("invalid trace header name {name:?}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: InvalidHeaderName,
    },

    #[error("trace id prefix {prefix:?} is not a valid header value")]
    InvalidHeaderPrefix {
        prefix: String,
        #[source]
        source: InvalidHeaderValue,
    },
}

/// The secure random source could not be read.
#[derive(Debug, thiserror::Error)]
#[error("entropy source unavailable: {0}")]
pub struct EntropyError(pub String);
