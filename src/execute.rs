use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Response};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::batch::CancelHandle;
use crate::body::{
    ReadBodyError, ReqBody, ResBody, RequestBody, build_http_request, empty_req_body,
    read_all_body_limited,
};
use crate::error::Error;
use crate::extensions::Clock;
use crate::metrics::FanoutMetrics;
use crate::outcome::{Outcome, RequestHead, ResponseHead};
use crate::retry::{RetryPolicy, is_terminal_success_status, replays_body};
use crate::target::EndpointTarget;
use crate::transport::Transport;
use crate::util::classify_transport_error;

/// Everything a worker shares with its siblings for the lifetime of one batch.
pub(crate) struct ExecutionContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) max_response_body_bytes: usize,
    pub(crate) metrics: FanoutMetrics,
    pub(crate) cancel: CancelHandle,
    pub(crate) deadline: Instant,
    pub(crate) timeout: Duration,
}

impl ExecutionContext {
    fn interruption_error(&self, method: &Method, uri: &str) -> Error {
        if Instant::now() >= self.deadline {
            return Error::DeadlineExceeded {
                timeout_ms: self.timeout.as_millis(),
                method: method.clone(),
                uri: uri.to_owned(),
            };
        }
        Error::Cancelled {
            method: method.clone(),
            uri: uri.to_owned(),
        }
    }

    fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    async fn send(
        &self,
        request: http::Request<ReqBody>,
        method: &Method,
        uri: &str,
    ) -> Result<Response<ResBody>, Error> {
        let token = self.cancel.token();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(self.interruption_error(method, uri)),
            _ = sleep_until(self.deadline) => Err(self.interruption_error(method, uri)),
            result = self.transport.execute(request) => result.map_err(|source| {
                self.metrics.record_transport_error();
                Error::Transport {
                    kind: classify_transport_error(source.as_ref()),
                    method: method.clone(),
                    uri: uri.to_owned(),
                    source,
                }
            }),
        }
    }

    async fn pause(&self, delay: Duration, method: &Method, uri: &str) -> Result<(), Error> {
        let token = self.cancel.token();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(self.interruption_error(method, uri)),
            _ = sleep_until(self.deadline) => Err(self.interruption_error(method, uri)),
            () = self.clock.sleep(delay) => Ok(()),
        }
    }

    async fn read_body(&self, body: ResBody, method: &Method, uri: &str) -> Result<Bytes, Error> {
        let token = self.cancel.token();
        let limit = self.max_response_body_bytes;
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(self.interruption_error(method, uri)),
            _ = sleep_until(self.deadline) => return Err(self.interruption_error(method, uri)),
            read = read_all_body_limited(body, limit) => read,
        };
        read.map_err(|error| match error {
            ReadBodyError::Read(source) => Error::ReadBody { source },
            ReadBodyError::TooLarge { actual_bytes } => Error::ResponseBodyTooLarge {
                limit_bytes: limit,
                actual_bytes,
                method: method.clone(),
                uri: uri.to_owned(),
            },
        })
    }
}

/// Runs every attempt for one target and drains the final response into an [`Outcome`].
///
/// `initial_body` is the copy opened while the request was built; later attempts of POST
/// and PUT open a fresh copy from `body`, other methods retry with an empty body.
pub(crate) async fn execute_with_retry(
    context: &ExecutionContext,
    target: EndpointTarget,
    request: RequestHead,
    initial_body: ReqBody,
    body: &RequestBody,
) -> Outcome {
    let method = request.method().clone();
    let uri = request.redacted_uri();
    let max_attempts = context.retry_policy.max_attempts_value();
    let replay = replays_body(&method) && !body.is_empty();
    let mut initial_body = Some(initial_body);
    let mut attempt = 0_usize;

    let result = loop {
        if context.is_interrupted() {
            break Err(context.interruption_error(&method, &uri));
        }
        attempt += 1;

        let attempt_body = match initial_body.take() {
            Some(initial) => initial,
            None if replay => match body.open() {
                Ok(fresh) => fresh,
                Err(source) => {
                    break Err(Error::BodyReplay {
                        method: method.clone(),
                        uri: uri.clone(),
                        source,
                    });
                }
            },
            None => empty_req_body(),
        };
        let http_request = match build_http_request(
            method.clone(),
            request.uri().clone(),
            request.headers(),
            attempt_body,
        ) {
            Ok(http_request) => http_request,
            Err(error) => break Err(error),
        };

        debug!(attempt, max_attempts, "sending request");
        context.metrics.record_attempt();
        let final_attempt = attempt >= max_attempts;
        match context.send(http_request, &method, &uri).await {
            Ok(response) if is_terminal_success_status(response.status()) => break Ok(response),
            Ok(response) if final_attempt => break Ok(response),
            Ok(response) => {
                let status = response.status();
                // Release the connection before the next attempt.
                drop(response);
                let backoff = context.retry_policy.backoff_after_status(status);
                warn!(
                    attempt,
                    status = status.as_u16(),
                    delay_ms = backoff.map_or(0, |delay| delay.as_millis() as u64),
                    "retrying request after unsuccessful status"
                );
                context.metrics.record_retry();
                if let Some(delay) = backoff {
                    context.metrics.record_rate_limit_backoff();
                    if let Err(error) = context.pause(delay, &method, &uri).await {
                        break Err(error);
                    }
                }
            }
            Err(error) if final_attempt => break Err(error),
            Err(error @ (Error::Cancelled { .. } | Error::DeadlineExceeded { .. })) => {
                break Err(error);
            }
            Err(error) => {
                warn!(attempt, error = %error, "retrying request after transport error");
                context.metrics.record_retry();
            }
        }
    };

    match result {
        Ok(response) => {
            let (parts, response_body) = response.into_parts();
            let head = ResponseHead::new(parts.status, parts.version, parts.headers);
            debug!(attempts = attempt, status = head.status().as_u16(), "request finished");
            match context.read_body(response_body, &method, &uri).await {
                Ok(bytes) => Outcome::new(target, request, Some(head), bytes, None, attempt),
                Err(error) => {
                    warn!(error = %error, "failed to read response body");
                    Outcome::new(target, request, Some(head), Bytes::new(), Some(error), attempt)
                }
            }
        }
        Err(error) => {
            debug!(attempts = attempt, error = %error, "request failed");
            Outcome::new(target, request, None, Bytes::new(), Some(error), attempt)
        }
    }
}
