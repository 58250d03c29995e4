use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::batch::CancelHandle;
use crate::error::Error;
use crate::outcome::{Outcome, RequestHead};
use crate::target::EndpointTarget;

/// Source of the rate-limit pause between attempts.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Last chance to adjust, or refuse, the request built for one target.
///
/// Returning an error fails only that target; no network I/O happens for it.
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, target: &EndpointTarget, request: &mut RequestHead) -> Result<(), Error>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(&EndpointTarget, &mut RequestHead) -> Result<(), Error> + Send + Sync,
{
    fn intercept(&self, target: &EndpointTarget, request: &mut RequestHead) -> Result<(), Error> {
        self(target, request)
    }
}

/// Decides whether one outcome counts as a success for a reducer.
///
/// The cancel handle aborts every sibling still in flight; reducers stop at the next poll.
pub trait ResponseHandler: Send + Sync {
    fn handle(&self, outcome: &Outcome, cancel: &CancelHandle) -> Result<(), Error>;
}

impl<F> ResponseHandler for F
where
    F: Fn(&Outcome, &CancelHandle) -> Result<(), Error> + Send + Sync,
{
    fn handle(&self, outcome: &Outcome, cancel: &CancelHandle) -> Result<(), Error> {
        self(outcome, cancel)
    }
}

/// Accepts outcomes whose final status is in the executor's success set.
#[derive(Debug, Default)]
pub struct SuccessStatusHandler;

impl ResponseHandler for SuccessStatusHandler {
    fn handle(&self, outcome: &Outcome, _cancel: &CancelHandle) -> Result<(), Error> {
        if outcome.is_success_status() {
            return Ok(());
        }
        match outcome.error() {
            Some(error) => Err(Error::custom(error.to_string())),
            None => Err(Error::rejected(outcome)),
        }
    }
}
