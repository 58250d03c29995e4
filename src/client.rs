use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};

use crate::Result;
use crate::config::{FanoutConfig, MIN_REQUEST_TIMEOUT};
use crate::extensions::{Clock, RequestInterceptor, TokioClock};
use crate::metrics::{FanoutMetrics, FanoutMetricsSnapshot};
use crate::request::BatchBuilder;
use crate::retry::RetryPolicy;
use crate::transport::{HyperTransport, Transport};
use crate::util::{parse_header_name, parse_header_value};

pub struct FanoutClientBuilder {
    config: FanoutConfig,
    default_headers: HeaderMap,
    transport: Option<Arc<dyn Transport>>,
    clock: Arc<dyn Clock>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    metrics_enabled: bool,
}

impl FanoutClientBuilder {
    pub(crate) fn new(config: FanoutConfig) -> Self {
        Self {
            config,
            default_headers: HeaderMap::new(),
            transport: None,
            clock: Arc::new(TokioClock),
            interceptor: None,
            metrics_enabled: false,
        }
    }

    pub fn config(mut self, config: FanoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.config.request_timeout = request_timeout.max(MIN_REQUEST_TIMEOUT);
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.config.retry_policy = retry_policy;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.config.connect_timeout = connect_timeout;
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.config.pool_idle_timeout = pool_idle_timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.config.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.config.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.config.client_name = client_name.into();
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    pub fn transport<T>(self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport_arc(Arc::new(transport))
    }

    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock<C>(self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock_arc(Arc::new(clock))
    }

    pub fn clock_arc(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn interceptor<I>(self, interceptor: I) -> Self
    where
        I: RequestInterceptor + 'static,
    {
        self.interceptor_arc(Arc::new(interceptor))
    }

    pub fn interceptor_arc(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Builds the client. Without an explicit transport a pooled [`HyperTransport`] is
    /// created from the configured connect and pool settings.
    pub fn build(self) -> FanoutClient {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new(&self.config)),
        };
        let metrics = if self.metrics_enabled {
            FanoutMetrics::enabled()
        } else {
            FanoutMetrics::disabled()
        };

        FanoutClient {
            transport,
            clock: self.clock,
            interceptor: self.interceptor,
            default_headers: self.default_headers,
            request_timeout: self.config.request_timeout.max(MIN_REQUEST_TIMEOUT),
            retry_policy: self.config.retry_policy,
            max_response_body_bytes: self.config.max_response_body_bytes,
            client_name: Arc::from(self.config.client_name),
            metrics,
        }
    }
}

/// Fans one logical request out to a set of replicas.
///
/// Cheap to clone; clones share the transport, connection pool and metrics.
#[derive(Clone)]
pub struct FanoutClient {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) interceptor: Option<Arc<dyn RequestInterceptor>>,
    pub(crate) default_headers: HeaderMap,
    pub(crate) request_timeout: Duration,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) max_response_body_bytes: usize,
    pub(crate) client_name: Arc<str>,
    pub(crate) metrics: FanoutMetrics,
}

impl std::fmt::Debug for FanoutClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FanoutClient")
            .field("client_name", &self.client_name)
            .field("request_timeout", &self.request_timeout)
            .field("retry_policy", &self.retry_policy)
            .field("max_response_body_bytes", &self.max_response_body_bytes)
            .field("default_headers", &self.default_headers)
            .field("interceptor", &self.interceptor.is_some())
            .finish()
    }
}

impl FanoutClient {
    pub fn builder() -> FanoutClientBuilder {
        FanoutClientBuilder::new(FanoutConfig::default())
    }

    pub fn from_config(config: FanoutConfig) -> FanoutClientBuilder {
        FanoutClientBuilder::new(config)
    }

    pub fn request(&self, method: Method, path: impl Into<String>) -> BatchBuilder<'_> {
        BatchBuilder::new(self, method, path.into())
    }

    pub fn get(&self, path: impl Into<String>) -> BatchBuilder<'_> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: impl Into<String>) -> BatchBuilder<'_> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: impl Into<String>) -> BatchBuilder<'_> {
        self.request(Method::PUT, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> BatchBuilder<'_> {
        self.request(Method::DELETE, path)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn metrics_snapshot(&self) -> FanoutMetricsSnapshot {
        self.metrics.snapshot()
    }
}
