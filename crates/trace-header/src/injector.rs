//! Check-and-set of the trace id header.

use std::fmt::Display;
use std::sync::Arc;

use http::header::Entry;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::{TraceHeaderConfig, DEFAULT_HEADER_NAME};
use crate::error::ConfigError;
use crate::id::{EntropySource, IdGenerator, OsEntropy};

/// Instance name used in log fields unless overridden with [`TraceHeaderInjector::with_name`].
pub const DEFAULT_INSTANCE_NAME: &str = "trace-header";

/// What [`TraceHeaderInjector::apply`] did to the header map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// The header was absent; one generated value was added.
    Inserted,
    /// The first value was empty and has been overwritten.
    Replaced,
    /// The first value was already set; nothing changed.
    Preserved,
}

/// Ensures a request carries a non-empty trace id header.
///
/// Holds only immutable state, so one instance can serve any number of
/// concurrent requests behind an `Arc`.
#[derive(Debug, Clone)]
pub struct TraceHeaderInjector {
    name: Arc<str>,
    header_name: HeaderName,
    ids: IdGenerator,
    verbose: bool,
}

impl TraceHeaderInjector {
    /// Build an injector from the host supplied configuration.
    ///
    /// An empty `header_name` resolves to `X-Trace-Id`. The prefix is checked
    /// up front so every generated id is a valid header value.
    pub fn new(config: Option<&TraceHeaderConfig>) -> Result<Self, ConfigError> {
        let config = config.ok_or(ConfigError::Missing)?;

        let raw_name = if config.header_name.is_empty() {
            DEFAULT_HEADER_NAME
        } else {
            config.header_name.as_str()
        };
        let header_name =
            HeaderName::from_bytes(raw_name.as_bytes()).map_err(|source| {
                ConfigError::InvalidHeaderName {
                    name: raw_name.to_string(),
                    source,
                }
            })?;

        HeaderValue::from_bytes(config.header_prefix.as_bytes()).map_err(|source| {
            ConfigError::InvalidHeaderPrefix {
                prefix: config.header_prefix.clone(),
                source,
            }
        })?;

        Ok(Self {
            name: Arc::from(DEFAULT_INSTANCE_NAME),
            header_name,
            ids: IdGenerator::new(config.header_prefix.clone(), Arc::new(OsEntropy)),
            verbose: config.verbose,
        })
    }

    /// Replace the random source used for new ids.
    pub fn with_entropy(mut self, source: Arc<dyn EntropySource>) -> Self {
        self.ids = IdGenerator::new(self.ids.prefix().to_string(), source);
        self
    }

    /// Name this instance in log output.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Arc::from(name);
        self
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make sure `headers` carries a usable trace id.
    ///
    /// - header absent: append a generated id
    /// - first value empty: overwrite that value only
    /// - first value set: leave every value untouched
    ///
    /// Ids are only generated for the first two cases, so a request that already
    /// carries an id is forwarded even if the entropy source is broken.
    ///
    /// Aborts the process if the entropy source can not be read.
    pub fn apply(&self, headers: &mut HeaderMap) -> Injection {
        let injection = match headers.entry(self.header_name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(self.mint());
                Injection::Inserted
            }
            Entry::Occupied(mut slot) => match slot.iter_mut().next() {
                Some(first) if first.is_empty() => {
                    *first = self.mint();
                    Injection::Replaced
                }
                _ => Injection::Preserved,
            },
        };

        if self.verbose {
            let value = headers
                .get(&self.header_name)
                .map(|v| v.to_str().unwrap_or("<non-ascii>"))
                .unwrap_or_default();
            tracing::info!(
                middleware = %self.name,
                header = %self.header_name,
                trace_id = %value,
                injection = ?injection,
                "Trace id header"
            );
        }

        injection
    }

    fn mint(&self) -> HeaderValue {
        let id = match self.ids.generate() {
            Ok(id) => id,
            Err(e) => self.fatal(e),
        };
        match HeaderValue::try_from(id) {
            Ok(value) => value,
            Err(e) => self.fatal(e),
        }
    }

    /// No id can be produced; continuing would forward an untraceable request.
    fn fatal(&self, error: impl Display) -> ! {
        tracing::error!(
            middleware = %self.name,
            error = %error,
            "Failed to generate trace id, aborting"
        );
        std::process::abort()
    }
}
