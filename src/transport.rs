use std::time::Duration;

use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use crate::body::{ReqBody, ResBody, box_body_error};
use crate::config::FanoutConfig;
use crate::error::BoxError;

pub type TransportFuture<'a> = BoxFuture<'a, Result<Response<ResBody>, BoxError>>;

/// Sends one HTTP request. Shared read-only by every worker of every batch.
pub trait Transport: Send + Sync {
    fn execute(&self, request: Request<ReqBody>) -> TransportFuture<'_>;
}

type HttpsClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, ReqBody>;

/// Pooled keep-alive hyper client speaking HTTP/1.1 and HTTP/2 over plain TCP or rustls.
#[derive(Clone, Debug)]
pub struct HyperTransport {
    client: HttpsClient,
}

impl HyperTransport {
    pub fn new(config: &FanoutConfig) -> Self {
        Self::with_pool(
            config.connect_timeout,
            config.pool_idle_timeout,
            config.pool_max_idle_per_host,
        )
    }

    pub fn with_pool(
        connect_timeout: Duration,
        pool_idle_timeout: Duration,
        pool_max_idle_per_host: usize,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(connector);
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(pool_idle_timeout)
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .build(https);
        Self { client }
    }
}

impl Transport for HyperTransport {
    fn execute(&self, request: Request<ReqBody>) -> TransportFuture<'_> {
        Box::pin(async move {
            let response = self.client.request(request).await.map_err(box_body_error)?;
            Ok::<_, BoxError>(response.map(|body| body.map_err(box_body_error).boxed_unsync()))
        })
    }
}
