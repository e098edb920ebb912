//! Tower middleware wrapping a downstream service with the injector.

use std::sync::Arc;
use std::task::{Context, Poll};

use http::Request;
use tower::{Layer, Service};

use crate::config::TraceHeaderConfig;
use crate::error::ConfigError;
use crate::injector::TraceHeaderInjector;

/// Applies [`TraceHeader`] to a service. Cheap to clone (Arc).
#[derive(Debug, Clone)]
pub struct TraceHeaderLayer {
    injector: Arc<TraceHeaderInjector>,
}

impl TraceHeaderLayer {
    pub fn new(config: Option<TraceHeaderConfig>) -> Result<Self, ConfigError> {
        let injector = TraceHeaderInjector::new(config.as_ref())?;
        Ok(Self::from_injector(injector))
    }

    pub fn from_injector(injector: TraceHeaderInjector) -> Self {
        Self {
            injector: Arc::new(injector),
        }
    }

    pub fn injector(&self) -> &TraceHeaderInjector {
        &self.injector
    }
}

impl<S> Layer<S> for TraceHeaderLayer {
    type Service = TraceHeader<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceHeader {
            inner,
            injector: self.injector.clone(),
        }
    }
}

/// Stamps the trace id header, then hands the request to `inner`.
///
/// Response, error and future are the inner service's own.
#[derive(Debug, Clone)]
pub struct TraceHeader<S> {
    inner: S,
    injector: Arc<TraceHeaderInjector>,
}

impl<S> TraceHeader<S> {
    pub fn new(inner: S, config: Option<TraceHeaderConfig>) -> Result<Self, ConfigError> {
        Ok(TraceHeaderLayer::new(config)?.layer(inner))
    }
}

impl<S, B> Service<Request<B>> for TraceHeader<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        self.injector.apply(req.headers_mut());
        self.inner.call(req)
    }
}
