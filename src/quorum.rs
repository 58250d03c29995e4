use std::collections::BTreeSet;
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, info, warn};

use crate::outcome::Outcome;
use crate::request::BatchBuilder;
use crate::target::EndpointTarget;

/// How many replica acceptances a replicated operation needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QuorumThreshold {
    AtLeast(usize),
    /// More than half of the replicas: `replicas / 2 + 1`.
    #[default]
    Majority,
    All,
}

impl QuorumThreshold {
    pub fn required_for(self, replicas: usize) -> usize {
        match self {
            Self::AtLeast(required) => required,
            Self::Majority => replicas / 2 + 1,
            Self::All => replicas,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quorum {
    achieved: usize,
    required: usize,
}

impl Quorum {
    pub fn new(required: usize) -> Self {
        Self {
            achieved: 0,
            required,
        }
    }

    pub fn record(&mut self, accepted: bool) {
        if accepted {
            self.achieved += 1;
        }
    }

    pub fn achieved(&self) -> usize {
        self.achieved
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn is_met(&self) -> bool {
        self.achieved >= self.required
    }
}

/// Decides whether one replica accepted the operation.
pub trait ReplicaAcceptance: Send + Sync {
    fn accepts(&self, outcome: &Outcome) -> bool;
}

impl<F> ReplicaAcceptance for F
where
    F: Fn(&Outcome) -> bool + Send + Sync,
{
    fn accepts(&self, outcome: &Outcome) -> bool {
        self(outcome)
    }
}

/// Accepts outcomes without an error whose status is in the configured set.
#[derive(Clone, Debug)]
pub struct StatusAcceptance {
    statuses: BTreeSet<u16>,
}

impl StatusAcceptance {
    pub fn ok() -> Self {
        Self::statuses([StatusCode::OK])
    }

    pub fn statuses(statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        Self {
            statuses: statuses.into_iter().map(|status| status.as_u16()).collect(),
        }
    }
}

impl Default for StatusAcceptance {
    fn default() -> Self {
        Self::ok()
    }
}

impl ReplicaAcceptance for StatusAcceptance {
    fn accepts(&self, outcome: &Outcome) -> bool {
        outcome.error().is_none()
            && outcome
                .status()
                .is_some_and(|status| self.statuses.contains(&status.as_u16()))
    }
}

/// Verdict of a replicated operation together with every outcome that was joined.
#[derive(Debug)]
pub struct QuorumReport {
    quorum: Quorum,
    replicas: usize,
    accepted: Vec<usize>,
    outcomes: Vec<Outcome>,
}

impl QuorumReport {
    pub fn is_met(&self) -> bool {
        self.quorum.is_met()
    }

    pub fn achieved(&self) -> usize {
        self.quorum.achieved()
    }

    pub fn required(&self) -> usize {
        self.quorum.required()
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Target indices of the replicas that accepted, in target order.
    pub fn accepted(&self) -> &[usize] {
        &self.accepted
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.outcomes
    }
}

/// A write applied to every replica and decided by a [`QuorumThreshold`].
///
/// Built with [`BatchBuilder::quorum`]. Replica failures are counted as non-acceptance; a
/// missed quorum is reported through [`QuorumReport::is_met`], not as an error.
pub struct ReplicatedRequest<'a> {
    batch: BatchBuilder<'a>,
    threshold: QuorumThreshold,
    acceptance: Arc<dyn ReplicaAcceptance>,
}

impl<'a> ReplicatedRequest<'a> {
    pub(crate) fn new(batch: BatchBuilder<'a>, threshold: QuorumThreshold) -> Self {
        Self {
            batch,
            threshold,
            acceptance: Arc::new(StatusAcceptance::ok()),
        }
    }

    pub fn threshold(mut self, threshold: QuorumThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn acceptance<A>(self, acceptance: A) -> Self
    where
        A: ReplicaAcceptance + 'static,
    {
        self.acceptance_arc(Arc::new(acceptance))
    }

    pub fn acceptance_arc(mut self, acceptance: Arc<dyn ReplicaAcceptance>) -> Self {
        self.acceptance = acceptance;
        self
    }

    /// Fans out to every replica, joins all of them, then reads the quorum.
    pub async fn run(self, targets: &[EndpointTarget]) -> QuorumReport {
        let client = self.batch.client();
        let replicas = targets.len();
        let mut quorum = Quorum::new(self.threshold.required_for(replicas));

        let mut outcomes = self.batch.dispatch(targets).collect().await;
        outcomes.sort_by_key(|outcome| outcome.target().index());

        let mut accepted = Vec::with_capacity(outcomes.len());
        for outcome in &outcomes {
            let accepts = self.acceptance.accepts(outcome);
            quorum.record(accepts);
            if accepts {
                accepted.push(outcome.target().index());
                debug!(
                    index = outcome.target().index(),
                    status = outcome.status().map(|status| status.as_u16()),
                    "replica accepted"
                );
            } else {
                warn!(
                    index = outcome.target().index(),
                    base_url = %outcome.target().base_url(),
                    status = outcome.status().map(|status| status.as_u16()),
                    error = outcome.error().map(tracing::field::display),
                    "replica did not accept"
                );
            }
        }
        if outcomes.len() < replicas {
            warn!(
                received = outcomes.len(),
                replicas, "replicated operation interrupted before every replica reported"
            );
        }

        let met = quorum.is_met();
        client.metrics.record_quorum(met);
        if met {
            info!(
                achieved = quorum.achieved(),
                required = quorum.required(),
                replicas,
                "quorum met"
            );
        } else {
            warn!(
                achieved = quorum.achieved(),
                required = quorum.required(),
                replicas,
                "quorum not met"
            );
        }

        QuorumReport {
            quorum,
            replicas,
            accepted,
            outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Quorum, QuorumThreshold};

    #[test]
    fn quorum_is_met_exactly_when_acceptances_reach_threshold() {
        for replicas in 0..=7 {
            for threshold in [
                QuorumThreshold::AtLeast(3),
                QuorumThreshold::Majority,
                QuorumThreshold::All,
            ] {
                let required = threshold.required_for(replicas);
                for accepted in 0..=replicas {
                    let mut quorum = Quorum::new(required);
                    for replica in 0..replicas {
                        quorum.record(replica < accepted);
                    }
                    assert_eq!(quorum.achieved(), accepted);
                    assert_eq!(quorum.is_met(), accepted >= required);
                }
            }
        }
    }

    #[test]
    fn threshold_resolution() {
        assert_eq!(QuorumThreshold::Majority.required_for(5), 3);
        assert_eq!(QuorumThreshold::Majority.required_for(4), 3);
        assert_eq!(QuorumThreshold::Majority.required_for(0), 1);
        assert_eq!(QuorumThreshold::All.required_for(5), 5);
        assert_eq!(QuorumThreshold::AtLeast(2).required_for(5), 2);
    }

    #[test]
    fn three_of_five_meets_threshold_three() {
        let mut quorum = Quorum::new(3);
        for accepted in [true, false, true, true, false] {
            quorum.record(accepted);
        }
        assert!(quorum.is_met());
    }

    #[test]
    fn two_of_five_misses_threshold_three() {
        let mut quorum = Quorum::new(3);
        for accepted in [true, false, true, false, false] {
            quorum.record(accepted);
        }
        assert!(!quorum.is_met());
    }
}
