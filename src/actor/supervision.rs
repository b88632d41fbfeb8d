use crate::actor::ActorError;

use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a supervisor tells the runtime to do with a failed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Resume message processing, keeping the current actor instance.
    Resume,
    /// Replace the actor instance; queued user messages are preserved.
    Restart,
    /// Stop the failing actor.
    Stop,
    /// Propagate the failure to the supervisor's own parent.
    Escalate,
}

/// Whether a directive applies to the failing child alone or to every
/// sibling under the same supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    One,
    All,
}

/// Recent failure instants for one child, used to bound restart churn.
#[derive(Debug, Clone, Default)]
pub struct RestartStatistics {
    failures: Vec<Instant>,
}

impl RestartStatistics {
    pub fn new() -> RestartStatistics {
        Self::default()
    }

    pub fn record_failure(&mut self) {
        self.failures.push(Instant::now());
    }

    pub fn total_failures(&self) -> usize {
        self.failures.len()
    }

    /// Number of recorded failures younger than `within`. Older entries are
    /// dropped as a side effect - the window only ever moves forward.
    pub fn failures_within(&mut self, within: Duration) -> usize {
        let now = Instant::now();
        self.failures
            .retain(|failed_at| now.duration_since(*failed_at) < within);
        self.failures.len()
    }

    pub fn reset(&mut self) {
        self.failures.clear();
    }
}

/// Maps a failure reason to a directive. The retry window is applied on top
/// of whatever the decider returns.
pub type Decider = Arc<dyn Fn(&ActorError) -> Directive + Send + Sync>;

pub fn default_decider() -> Decider {
    Arc::new(|_| Directive::Restart)
}

/// Parent-scoped failure policy.
pub trait SupervisorStrategy: Send + Sync {
    /// Decide what to do about `reason`, recording the failure in `stats`
    /// where the strategy counts retries.
    fn decide(&self, reason: &ActorError, stats: &mut RestartStatistics) -> Directive;

    /// Which children the resulting directive is applied to.
    fn scope(&self) -> FailureScope {
        FailureScope::One
    }
}

/// Applies the decider to the failing child only. Restarts beyond
/// `max_retries` within `within` are promoted to `Stop`.
pub struct OneForOneStrategy {
    max_retries: usize,
    within: Duration,
    decider: Decider,
}

impl OneForOneStrategy {
    pub fn new(max_retries: usize, within: Duration) -> OneForOneStrategy {
        OneForOneStrategy {
            max_retries,
            within,
            decider: default_decider(),
        }
    }

    pub fn with_decider(mut self, decider: Decider) -> OneForOneStrategy {
        self.decider = decider;
        self
    }
}

fn bounded_restart(
    reason: &ActorError,
    stats: &mut RestartStatistics,
    decider: &Decider,
    max_retries: usize,
    within: Duration,
) -> Directive {
    match (decider)(reason) {
        Directive::Restart => {
            stats.record_failure();
            if stats.failures_within(within) > max_retries {
                Directive::Stop
            } else {
                Directive::Restart
            }
        }
        directive => directive,
    }
}

impl SupervisorStrategy for OneForOneStrategy {
    fn decide(&self, reason: &ActorError, stats: &mut RestartStatistics) -> Directive {
        bounded_restart(reason, stats, &self.decider, self.max_retries, self.within)
    }
}

/// Like [`OneForOneStrategy`] but the directive is applied to every sibling.
pub struct AllForOneStrategy {
    max_retries: usize,
    within: Duration,
    decider: Decider,
}

impl AllForOneStrategy {
    pub fn new(max_retries: usize, within: Duration) -> AllForOneStrategy {
        AllForOneStrategy {
            max_retries,
            within,
            decider: default_decider(),
        }
    }

    pub fn with_decider(mut self, decider: Decider) -> AllForOneStrategy {
        self.decider = decider;
        self
    }
}

impl SupervisorStrategy for AllForOneStrategy {
    fn decide(&self, reason: &ActorError, stats: &mut RestartStatistics) -> Directive {
        bounded_restart(reason, stats, &self.decider, self.max_retries, self.within)
    }

    fn scope(&self) -> FailureScope {
        FailureScope::All
    }
}

/// Restarts the failing child unconditionally - no retry accounting.
pub struct AlwaysRestartStrategy;

impl SupervisorStrategy for AlwaysRestartStrategy {
    fn decide(&self, _reason: &ActorError, stats: &mut RestartStatistics) -> Directive {
        stats.record_failure();
        Directive::Restart
    }
}

/// Stops the failing child on any failure.
pub struct StopStrategy;

impl SupervisorStrategy for StopStrategy {
    fn decide(&self, _reason: &ActorError, _stats: &mut RestartStatistics) -> Directive {
        Directive::Stop
    }
}

/// Hands every failure to the supervisor's own parent.
pub struct EscalateStrategy;

impl SupervisorStrategy for EscalateStrategy {
    fn decide(&self, _reason: &ActorError, _stats: &mut RestartStatistics) -> Directive {
        Directive::Escalate
    }
}

pub fn default_strategy() -> Arc<dyn SupervisorStrategy> {
    Arc::new(OneForOneStrategy::new(10, Duration::from_secs(10)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_for_one_promotes_to_stop_past_retry_budget() {
        let strategy = OneForOneStrategy::new(2, Duration::from_secs(60));
        let mut stats = RestartStatistics::new();
        let reason = ActorError::new("boom");

        assert_eq!(strategy.decide(&reason, &mut stats), Directive::Restart);
        assert_eq!(strategy.decide(&reason, &mut stats), Directive::Restart);
        assert_eq!(strategy.decide(&reason, &mut stats), Directive::Stop);
    }

    #[test]
    fn always_restart_never_promotes() {
        let strategy = AlwaysRestartStrategy;
        let mut stats = RestartStatistics::new();
        let reason = ActorError::new("boom");

        for _ in 0..100 {
            assert_eq!(strategy.decide(&reason, &mut stats), Directive::Restart);
        }
    }

    #[test]
    fn decider_output_bypasses_retry_accounting() {
        let strategy = OneForOneStrategy::new(1, Duration::from_secs(60))
            .with_decider(Arc::new(|_| Directive::Resume));
        let mut stats = RestartStatistics::new();

        assert_eq!(
            strategy.decide(&ActorError::new("boom"), &mut stats),
            Directive::Resume
        );
        assert_eq!(stats.total_failures(), 0);
    }
}
