use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Uri};
use http_body_util::combinators::{BoxBody, UnsyncBoxBody};
use http_body_util::{BodyExt, Empty, Full};

use crate::error::{BoxError, Error};

pub type ReqBody = BoxBody<Bytes, BoxError>;
pub type ResBody = UnsyncBoxBody<Bytes, BoxError>;

/// Produces a fresh, independently readable copy of a request body on every call.
///
/// Every target of a batch, and every retry of a state-changing request, opens its own copy,
/// so implementations must be repeatable.
pub trait BodyFactory: Send + Sync {
    fn open(&self) -> Result<ReqBody, BoxError>;
}

impl<F> BodyFactory for F
where
    F: Fn() -> Result<ReqBody, BoxError> + Send + Sync,
{
    fn open(&self) -> Result<ReqBody, BoxError> {
        self()
    }
}

#[derive(Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Buffered(Bytes),
    Factory(Arc<dyn BodyFactory>),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => formatter.write_str("Empty"),
            Self::Buffered(bytes) => formatter
                .debug_tuple("Buffered")
                .field(&bytes.len())
                .finish(),
            Self::Factory(_) => formatter.write_str("Factory(..)"),
        }
    }
}

impl RequestBody {
    pub fn factory<F>(factory: F) -> Self
    where
        F: BodyFactory + 'static,
    {
        Self::Factory(Arc::new(factory))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Buffered(bytes) => bytes.is_empty(),
            Self::Factory(_) => false,
        }
    }

    pub(crate) fn open(&self) -> Result<ReqBody, BoxError> {
        match self {
            Self::Empty => Ok(empty_req_body()),
            Self::Buffered(bytes) => Ok(buffered_req_body(bytes.clone())),
            Self::Factory(factory) => factory.open(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(value: Bytes) -> Self {
        Self::Buffered(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Buffered(Bytes::from(value))
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        Self::Buffered(Bytes::from(value))
    }
}

impl From<&'static str> for RequestBody {
    fn from(value: &'static str) -> Self {
        Self::Buffered(Bytes::from_static(value.as_bytes()))
    }
}

fn map_infallible_to_box_error(never: Infallible) -> BoxError {
    match never {}
}

pub(crate) fn empty_req_body() -> ReqBody {
    Empty::<Bytes>::new()
        .map_err(map_infallible_to_box_error)
        .boxed()
}

pub fn buffered_req_body(body: Bytes) -> ReqBody {
    Full::new(body).map_err(map_infallible_to_box_error).boxed()
}

/// Wraps an in-memory payload as a response body, for transports that do not stream.
pub fn full_res_body(body: impl Into<Bytes>) -> ResBody {
    Full::new(body.into())
        .map_err(map_infallible_to_box_error)
        .boxed_unsync()
}

pub(crate) fn build_http_request(
    method: Method,
    uri: Uri,
    headers: &HeaderMap,
    body: ReqBody,
) -> Result<Request<ReqBody>, Error> {
    let mut request_builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request_builder = request_builder.header(name, value);
    }
    request_builder
        .body(body)
        .map_err(|source| Error::RequestBuild { source })
}

pub(crate) enum ReadBodyError {
    Read(BoxError),
    TooLarge { actual_bytes: usize },
}

pub(crate) async fn read_all_body_limited(
    mut body: ResBody,
    max_bytes: usize,
) -> Result<Bytes, ReadBodyError> {
    let mut collected = Vec::new();
    let mut total_len = 0_usize;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(ReadBodyError::Read)?;
        if let Some(data) = frame.data_ref() {
            total_len = total_len.saturating_add(data.len());
            if total_len > max_bytes {
                return Err(ReadBodyError::TooLarge {
                    actual_bytes: total_len,
                });
            }
            collected.extend_from_slice(data);
        }
    }

    Ok(Bytes::from(collected))
}

pub(crate) fn box_body_error<E>(error: E) -> BoxError
where
    E: StdError + Send + Sync + 'static,
{
    Box::new(error)
}
