//! Built-in health judges

use super::{AdaptivePolicy, JudgeRank, NodeMetric, Rank};

/// Produces one vote on a node from its metrics
pub trait Judge: Send + Sync {
    /// Judge name as used in configuration
    fn name(&self) -> &'static str;

    /// Vote on a node
    fn judge(&self, metric: &NodeMetric, policy: &AdaptivePolicy) -> JudgeRank;
}

/// Votes on the success ratio
#[derive(Debug, Default, Clone, Copy)]
pub struct AvailabilityJudge;

impl Judge for AvailabilityJudge {
    fn name(&self) -> &'static str {
        "availability"
    }

    fn judge(&self, metric: &NodeMetric, policy: &AdaptivePolicy) -> JudgeRank {
        if metric.requests < policy.min_samples {
            return JudgeRank::abstain();
        }
        let Some(availability) = metric.availability() else {
            return JudgeRank::abstain();
        };
        let t = &policy.availability;
        let rank = if availability >= t.good {
            Rank::Good
        } else if availability >= t.fair {
            Rank::Fair
        } else if availability >= t.poor {
            Rank::Poor
        } else {
            Rank::Disabled
        };
        JudgeRank::new(rank, policy.ratios.availability)
    }
}

/// Votes on tp90 latency
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseTimeJudge;

impl Judge for ResponseTimeJudge {
    fn name(&self) -> &'static str {
        "response-time"
    }

    fn judge(&self, metric: &NodeMetric, policy: &AdaptivePolicy) -> JudgeRank {
        if metric.requests < policy.min_samples {
            return JudgeRank::abstain();
        }
        let t = &policy.response_time;
        let rank = match metric.tp90_ms {
            ms if ms <= t.good_ms => Rank::Good,
            ms if ms <= t.fair_ms => Rank::Fair,
            ms if ms <= t.poor_ms => Rank::Poor,
            _ => Rank::Disabled,
        };
        JudgeRank::new(rank, policy.ratios.response_time)
    }
}

/// Votes on requests in flight
///
/// Concurrency is meaningful without history, so this judge never abstains for
/// lack of samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcurrencyJudge;

impl Judge for ConcurrencyJudge {
    fn name(&self) -> &'static str {
        "concurrency"
    }

    fn judge(&self, metric: &NodeMetric, policy: &AdaptivePolicy) -> JudgeRank {
        let t = &policy.concurrency;
        let rank = match metric.concurrency {
            c if c <= t.good => Rank::Good,
            c if c <= t.fair => Rank::Fair,
            c if c <= t.poor => Rank::Poor,
            _ => Rank::Disabled,
        };
        JudgeRank::new(rank, policy.ratios.concurrency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(requests: u64, failures: u64, tp90_ms: u64, concurrency: u64) -> NodeMetric {
        NodeMetric {
            requests,
            failures,
            tp90_ms,
            concurrency,
        }
    }

    #[test]
    fn test_availability_bands() {
        let policy = AdaptivePolicy::default();
        let judge = AvailabilityJudge;
        assert_eq!(judge.judge(&metric(1000, 0, 0, 0), &policy).rank, Rank::Good);
        assert_eq!(judge.judge(&metric(1000, 30, 0, 0), &policy).rank, Rank::Fair);
        assert_eq!(judge.judge(&metric(1000, 100, 0, 0), &policy).rank, Rank::Poor);
        assert_eq!(judge.judge(&metric(1000, 500, 0, 0), &policy).rank, Rank::Disabled);
        assert_eq!(judge.judge(&metric(1000, 0, 0, 0), &policy).ratio, 3);
    }

    #[test]
    fn test_abstains_without_samples() {
        let policy = AdaptivePolicy::default();
        assert!(!AvailabilityJudge.judge(&metric(3, 3, 0, 0), &policy).votes());
        assert!(!ResponseTimeJudge.judge(&metric(3, 0, 9_999, 0), &policy).votes());
        assert!(ConcurrencyJudge.judge(&metric(0, 0, 0, 5), &policy).votes());
    }

    #[test]
    fn test_response_time_bands() {
        let policy = AdaptivePolicy::default();
        let judge = ResponseTimeJudge;
        assert_eq!(judge.judge(&metric(50, 0, 80, 0), &policy).rank, Rank::Good);
        assert_eq!(judge.judge(&metric(50, 0, 250, 0), &policy).rank, Rank::Fair);
        assert_eq!(judge.judge(&metric(50, 0, 1_500, 0), &policy).rank, Rank::Poor);
        assert_eq!(judge.judge(&metric(50, 0, 5_000, 0), &policy).rank, Rank::Disabled);
    }

    #[test]
    fn test_concurrency_bands() {
        let policy = AdaptivePolicy::default();
        assert_eq!(ConcurrencyJudge.judge(&metric(0, 0, 0, 10), &policy).rank, Rank::Good);
        assert_eq!(ConcurrencyJudge.judge(&metric(0, 0, 0, 2_000), &policy).rank, Rank::Disabled);
    }
}
