//! Tower middleware that makes sure every request carries a trace id header.
//!
//! If the configured header is absent, or its first value is empty, a fresh
//! id (`prefix` + 32 lowercase hex characters) is written before the request
//! reaches the wrapped service. Requests that already carry an id pass through
//! untouched.

pub mod config;
pub mod error;
pub mod id;
pub mod injector;
pub mod layer;

pub use config::{TraceHeaderConfig, DEFAULT_HEADER_NAME};
pub use error::{ConfigError, EntropyError};
pub use id::{EntropySource, IdGenerator, OsEntropy};
pub use injector::{Injection, TraceHeaderInjector};
pub use layer::{TraceHeader, TraceHeaderLayer};
