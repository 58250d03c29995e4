use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::Result;
use crate::batch::{Batch, CancelHandle, OutcomeSlot};
use crate::body::{BodyFactory, ReqBody, RequestBody};
use crate::client::FanoutClient;
use crate::config::MIN_REQUEST_TIMEOUT;
use crate::error::Error;
use crate::execute::{ExecutionContext, execute_with_retry};
use crate::extensions::ResponseHandler;
use crate::outcome::{Outcome, RequestHead};
use crate::quorum::{QuorumThreshold, ReplicatedRequest};
use crate::retry::RetryPolicy;
use crate::target::EndpointTarget;
use crate::util::{
    deadline_after, ensure_keep_alive, merge_headers, parse_header_name, parse_header_value,
    resolve_target_uri,
};

/// Describes one logical operation to be sent to every target of a batch.
pub struct BatchBuilder<'a> {
    client: &'a FanoutClient,
    method: Method,
    path: String,
    query_pairs: Vec<(String, String)>,
    headers: HeaderMap,
    body: RequestBody,
    timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
    parent: Option<CancellationToken>,
    handler: Option<Arc<dyn ResponseHandler>>,
}

impl<'a> BatchBuilder<'a> {
    pub(crate) fn new(client: &'a FanoutClient, method: Method, path: String) -> Self {
        Self {
            client,
            method,
            path,
            query_pairs: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout: None,
            retry_policy: None,
            parent: None,
            handler: None,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in &headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn query_pair(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_pairs.push((name.into(), value.into()));
        self
    }

    pub fn query_pairs<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.query_pairs.extend(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into())),
        );
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn body_factory<F>(mut self, factory: F) -> Self
    where
        F: BodyFactory + 'static,
    {
        self.body = RequestBody::factory(factory);
        self
    }

    pub fn json<T>(self, payload: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload).map_err(|source| Error::SerializeJson { source })?;
        let with_body = self.body(Bytes::from(body));
        Ok(with_body.header(CONTENT_TYPE, HeaderValue::from_static("application/json")))
    }

    /// Deadline for the whole batch, retries and backoff included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.max(MIN_REQUEST_TIMEOUT));
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    /// Ties the batch to a caller-owned token; cancelling it cancels the batch.
    pub fn parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn then<H>(self, handler: H) -> Self
    where
        H: ResponseHandler + 'static,
    {
        self.then_arc(Arc::new(handler))
    }

    pub fn then_arc(mut self, handler: Arc<dyn ResponseHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Turns this operation into a replicated write decided by `threshold`.
    ///
    /// A replicated write judges replicas with its own [`ReplicaAcceptance`]; a handler set
    /// with [`then`](Self::then) is dropped here. Use
    /// [`ReplicatedRequest::acceptance`] to customise what counts as an acceptance.
    ///
    /// [`ReplicaAcceptance`]: crate::ReplicaAcceptance
    pub fn quorum(mut self, threshold: QuorumThreshold) -> ReplicatedRequest<'a> {
        if self.handler.take().is_some() {
            debug!("response handler dropped for replicated write");
        }
        ReplicatedRequest::new(self, threshold)
    }

    pub(crate) fn client(&self) -> &'a FanoutClient {
        self.client
    }

    /// Builds one request per target and starts a worker for each buildable one.
    ///
    /// Targets that fail to build are reported through the batch like any other failure.
    /// Must be called from within a tokio runtime.
    pub fn dispatch(self, targets: &[EndpointTarget]) -> Batch {
        let qty = targets.len();
        let client = self.client;
        let timeout = self.timeout.unwrap_or(client.request_timeout);
        let deadline = deadline_after(Instant::now(), timeout);
        let token = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let cancel = CancelHandle::new(token);
        let (sender, receiver) = mpsc::channel(qty.max(1));

        let mut headers = merge_headers(&client.default_headers, &self.headers);
        ensure_keep_alive(&mut headers);

        let context = Arc::new(ExecutionContext {
            transport: Arc::clone(&client.transport),
            clock: Arc::clone(&client.clock),
            retry_policy: self
                .retry_policy
                .clone()
                .unwrap_or_else(|| client.retry_policy.clone()),
            max_response_body_bytes: client.max_response_body_bytes,
            metrics: client.metrics.clone(),
            cancel: cancel.clone(),
            deadline,
            timeout,
        });
        client.metrics.record_batch_dispatched(qty);

        for target in targets {
            match self.build_request(target, &headers) {
                Ok((request, initial_body)) => {
                    let slot = OutcomeSlot::new(sender.clone(), target.clone(), request.clone());
                    let span = info_span!(
                        "quorum_http.target",
                        client = %client.client_name,
                        index = target.index(),
                        method = %request.method(),
                        uri = %request.redacted_uri(),
                        max_attempts = context.retry_policy.max_attempts_value(),
                    );
                    let context = Arc::clone(&context);
                    let body = self.body.clone();
                    let target = target.clone();
                    tokio::spawn(
                        async move {
                            let in_flight = context.metrics.enter_in_flight();
                            let started_at = std::time::Instant::now();
                            let outcome =
                                execute_with_retry(&context, target, request, initial_body, &body)
                                    .await;
                            context
                                .metrics
                                .record_outcome(&outcome, started_at.elapsed());
                            drop(in_flight);
                            slot.post(outcome);
                        }
                        .instrument(span),
                    );
                }
                Err((request, error)) => {
                    warn!(
                        client = %client.client_name,
                        index = target.index(),
                        base_url = %target.base_url(),
                        error = %error,
                        "failed to build request for target"
                    );
                    client.metrics.record_build_failure(&error);
                    let slot = OutcomeSlot::new(sender.clone(), target.clone(), request.clone());
                    slot.post(Outcome::failed(target.clone(), request, error));
                }
            }
        }
        drop(sender);

        Batch::new(receiver, qty, deadline, cancel, self.handler)
    }

    /// Dispatches and drains every outcome; see [`Batch::wait`].
    pub async fn wait(
        self,
        targets: &[EndpointTarget],
    ) -> std::result::Result<(), crate::AggregateError> {
        self.dispatch(targets).wait().await
    }

    /// Dispatches and returns the first accepted outcome; see [`Batch::first`].
    pub async fn first(
        self,
        targets: &[EndpointTarget],
    ) -> std::result::Result<Outcome, crate::AggregateError> {
        self.dispatch(targets).first().await
    }

    fn build_request(
        &self,
        target: &EndpointTarget,
        headers: &HeaderMap,
    ) -> std::result::Result<(RequestHead, ReqBody), (RequestHead, Error)> {
        let (uri, error) =
            match resolve_target_uri(target.base_url(), &self.path, &self.query_pairs) {
                Ok((_, uri)) => (uri, None),
                Err(error) => (Uri::default(), Some(error)),
            };
        let mut request = RequestHead::new(self.method.clone(), uri, headers.clone());
        if let Some(error) = error {
            return Err((request, error));
        }

        if let Some(interceptor) = &self.client.interceptor {
            if let Err(error) = interceptor.intercept(target, &mut request) {
                let error = Error::Intercepted {
                    index: target.index(),
                    source: Box::new(error),
                };
                return Err((request, error));
            }
        }

        match self.body.open() {
            Ok(body) => Ok((request, body)),
            Err(source) => {
                let error = Error::BodyReplay {
                    method: self.method.clone(),
                    uri: request.redacted_uri(),
                    source,
                };
                Err((request, error))
            }
        }
    }
}
