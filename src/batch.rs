use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AggregateError, Error};
use crate::extensions::ResponseHandler;
use crate::outcome::{Outcome, RequestHead};
use crate::target::EndpointTarget;

/// Releases a batch: aborts in-flight attempts and pending retries of every target.
///
/// Clones share one release; only the first `cancel` call takes effect.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug)]
struct CancelInner {
    token: CancellationToken,
    released: AtomicBool,
}

impl CancelHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(CancelInner {
                token,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Returns `true` only for the call that actually released the batch.
    pub fn cancel(&self) -> bool {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.token.cancel();
        true
    }

    /// True once the batch was released here or its parent token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }
}

/// Reserved channel slot of one target. Posting consumes it; dropping it unposted reports
/// the target as aborted so a reducer never waits on a missing outcome.
pub(crate) struct OutcomeSlot {
    sender: Option<mpsc::Sender<Outcome>>,
    target: EndpointTarget,
    request: RequestHead,
}

impl OutcomeSlot {
    pub(crate) fn new(
        sender: mpsc::Sender<Outcome>,
        target: EndpointTarget,
        request: RequestHead,
    ) -> Self {
        Self {
            sender: Some(sender),
            target,
            request,
        }
    }

    pub(crate) fn post(mut self, outcome: Outcome) {
        if let Some(sender) = self.sender.take() {
            // Capacity equals the target count and each slot posts once, so this never fills.
            let _ = sender.try_send(outcome);
        }
    }
}

impl Drop for OutcomeSlot {
    fn drop(&mut self) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        let error = Error::WorkerAborted {
            method: self.request.method().clone(),
            uri: self.request.redacted_uri(),
        };
        let outcome = Outcome::failed(self.target.clone(), self.request.clone(), error);
        let _ = sender.try_send(outcome);
    }
}

enum Next {
    Outcome(Outcome),
    Interrupted,
    Closed,
}

/// One in-flight fan-out. Reduce it with [`Batch::wait`], [`Batch::first`] or
/// [`Batch::collect`]; dropping it unreduced releases it as well.
pub struct Batch {
    receiver: mpsc::Receiver<Outcome>,
    qty: usize,
    deadline: Instant,
    cancel: CancelHandle,
    handler: Option<Arc<dyn ResponseHandler>>,
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Batch")
            .field("qty", &self.qty)
            .field("deadline", &self.deadline)
            .field("cancel", &self.cancel)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl Batch {
    pub(crate) fn new(
        receiver: mpsc::Receiver<Outcome>,
        qty: usize,
        deadline: Instant,
        cancel: CancelHandle,
        handler: Option<Arc<dyn ResponseHandler>>,
    ) -> Self {
        Self {
            receiver,
            qty,
            deadline,
            cancel,
            handler,
        }
    }

    pub fn len(&self) -> usize {
        self.qty
    }

    pub fn is_empty(&self) -> bool {
        self.qty == 0
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Drains every outcome through the handler and reports the failures.
    ///
    /// Returns early, with whatever failed so far, once the batch is cancelled or its
    /// deadline passes. An early return with no recorded failure is `Ok(())`.
    pub async fn wait(mut self) -> Result<(), AggregateError> {
        let mut errors = Vec::with_capacity(self.qty);
        let mut done = 0_usize;
        let mut interrupted = false;

        while done < self.qty {
            match self.next().await {
                Next::Outcome(outcome) => {
                    if let Err(error) = self.judge(outcome) {
                        errors.push(error);
                    }
                    done += 1;
                }
                Next::Interrupted => {
                    interrupted = true;
                    break;
                }
                Next::Closed => {
                    interrupted = true;
                    break;
                }
            }
        }

        debug!(
            received = done,
            dispatched = self.qty,
            failed = errors.len(),
            interrupted,
            "batch drained"
        );
        if errors.is_empty() {
            return Ok(());
        }
        Err(AggregateError::new(errors, self.qty, interrupted))
    }

    /// Returns the first outcome the handler accepts without waiting for the rest.
    pub async fn first(mut self) -> Result<Outcome, AggregateError> {
        let mut errors = Vec::with_capacity(self.qty);
        let mut done = 0_usize;
        let mut interrupted = false;

        while done < self.qty {
            match self.next().await {
                Next::Outcome(outcome) => {
                    match self.judge(outcome) {
                        Ok(accepted) => {
                            debug!(
                                index = accepted.target().index(),
                                received = done + 1,
                                dispatched = self.qty,
                                "first accepted outcome"
                            );
                            return Ok(accepted);
                        }
                        Err(error) => errors.push(error),
                    }
                    done += 1;
                }
                Next::Interrupted | Next::Closed => {
                    interrupted = true;
                    break;
                }
            }
        }

        Err(AggregateError::new(errors, self.qty, interrupted))
    }

    /// Joins the batch: every outcome received before cancellation or the deadline.
    ///
    /// The response handler is not consulted.
    pub async fn collect(mut self) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(self.qty);
        while outcomes.len() < self.qty {
            match self.next().await {
                Next::Outcome(outcome) => outcomes.push(outcome),
                Next::Interrupted | Next::Closed => break,
            }
        }
        outcomes
    }

    async fn next(&mut self) -> Next {
        let token = self.cancel.token().clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => Next::Interrupted,
            _ = sleep_until(self.deadline) => {
                debug!(dispatched = self.qty, "batch deadline reached");
                Next::Interrupted
            }
            received = self.receiver.recv() => match received {
                Some(outcome) => Next::Outcome(outcome),
                None => {
                    warn!(dispatched = self.qty, "result channel closed before every outcome arrived");
                    Next::Closed
                }
            },
        }
    }

    fn judge(&self, mut outcome: Outcome) -> Result<Outcome, Error> {
        match &self.handler {
            Some(handler) => {
                handler.handle(&outcome, &self.cancel)?;
                Ok(outcome)
            }
            None => match outcome.take_error() {
                Some(error) => Err(error),
                None => Ok(outcome),
            },
        }
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if self.cancel.cancel() {
            debug!(dispatched = self.qty, "batch released");
        }
    }
}
