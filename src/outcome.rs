use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::target::EndpointTarget;
use crate::util::{redact_uri_for_logs, truncate_body};

/// The owned head of an outbound request, as built for one target.
#[derive(Clone, Debug)]
pub struct RequestHead {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl RequestHead {
    pub(crate) fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn redacted_uri(&self) -> String {
        redact_uri_for_logs(&self.uri.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct ResponseHead {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
}

impl ResponseHead {
    pub(crate) fn new(status: StatusCode, version: Version, headers: HeaderMap) -> Self {
        Self {
            status,
            version,
            headers,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// The terminal result of one target in a batch.
///
/// A response may be present even when the outcome counts as a failure (for example a
/// `500` after the last retry); `error` is only set when no usable response was read.
#[derive(Debug)]
pub struct Outcome {
    target: EndpointTarget,
    request: RequestHead,
    response: Option<ResponseHead>,
    body: Bytes,
    error: Option<Error>,
    attempts: usize,
}

impl Outcome {
    pub(crate) fn new(
        target: EndpointTarget,
        request: RequestHead,
        response: Option<ResponseHead>,
        body: Bytes,
        error: Option<Error>,
        attempts: usize,
    ) -> Self {
        Self {
            target,
            request,
            response,
            body,
            error,
            attempts,
        }
    }

    pub(crate) fn failed(target: EndpointTarget, request: RequestHead, error: Error) -> Self {
        Self::new(target, request, None, Bytes::new(), Some(error), 0)
    }

    pub fn target(&self) -> &EndpointTarget {
        &self.target
    }

    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    pub fn response(&self) -> Option<&ResponseHead> {
        self.response.as_ref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(ResponseHead::status)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Number of transport attempts made; zero when the request never left the builder.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// True when no error was recorded and the status is one the executor treats as success.
    pub fn is_success_status(&self) -> bool {
        self.error.is_none()
            && self
                .status()
                .is_some_and(crate::retry::is_terminal_success_status)
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T>(&self) -> crate::Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(&self.body),
        })
    }

    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    pub fn into_error(self) -> Option<Error> {
        self.error
    }
}
