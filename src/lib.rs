//! `quorum-http` fans one HTTP operation out to a set of replicated endpoints and reduces
//! the per-replica outcomes: wait for all, take the first success, or decide by quorum.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use quorum_http::prelude::{EndpointTarget, FanoutClient, QuorumThreshold, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FanoutClient::builder()
//!         .client_name("metadata-sync")
//!         .request_timeout(Duration::from_secs(10))
//!         .retry_policy(RetryPolicy::standard().max_attempts(3))
//!         .build();
//!
//!     let replicas = EndpointTarget::from_urls([
//!         "https://node-1.example.com",
//!         "https://node-2.example.com",
//!         "https://node-3.example.com",
//!     ]);
//!
//!     let first = client.get("/v1/objects/demo").first(&replicas).await?;
//!     println!("first replica #{} answered {:?}", first.target().index(), first.status());
//!
//!     let report = client
//!         .put("/v1/objects/demo/meta")
//!         .json(&serde_json::json!({ "owner": "demo" }))?
//!         .quorum(QuorumThreshold::Majority)
//!         .run(&replicas)
//!         .await;
//!     println!("quorum met: {} ({}/{})", report.is_met(), report.achieved(), report.required());
//!     Ok(())
//! }
//! ```
//!
//! # Recommended Defaults
//!
//! - Keep `RetryPolicy::standard()`; only `POST` and `PUT` replay their body on retry.
//! - Set a batch timeout that covers every attempt plus the `429` backoff.
//! - Install a response handler with `then(...)` when success means more than a `2xx`.

mod batch;
mod body;
mod client;
mod config;
mod error;
mod execute;
mod extensions;
mod metrics;
mod outcome;
mod quorum;
mod request;
mod retry;
mod target;
mod transport;
mod util;

pub use crate::batch::{Batch, CancelHandle};
pub use crate::body::{
    BodyFactory, ReqBody, RequestBody, ResBody, buffered_req_body, full_res_body,
};
pub use crate::client::{FanoutClient, FanoutClientBuilder};
pub use crate::config::FanoutConfig;
pub use crate::error::{AggregateError, BoxError, Error, ErrorCode, TransportErrorKind};
pub use crate::extensions::{
    Clock, RequestInterceptor, ResponseHandler, SuccessStatusHandler, TokioClock,
};
pub use crate::metrics::FanoutMetricsSnapshot;
pub use crate::outcome::{Outcome, RequestHead, ResponseHead};
pub use crate::quorum::{
    Quorum, QuorumReport, QuorumThreshold, ReplicaAcceptance, ReplicatedRequest,
    StatusAcceptance,
};
pub use crate::request::BatchBuilder;
pub use crate::retry::{RetryPolicy, is_terminal_success_status};
pub use crate::target::EndpointTarget;
pub use crate::transport::{HyperTransport, Transport, TransportFuture};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        AggregateError, Batch, CancelHandle, EndpointTarget, Error, ErrorCode, FanoutClient,
        FanoutConfig, FanoutMetricsSnapshot, Outcome, QuorumReport, QuorumThreshold,
        RequestBody, ResponseHandler, RetryPolicy, StatusAcceptance, SuccessStatusHandler,
        TransportErrorKind,
    };
}

#[cfg(test)]
mod tests;
