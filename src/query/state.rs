//! Query pipeline state machine
//!
//! Deterministic finite state machine over the pipeline stages. The
//! orchestrator drives it one event per stage; transitions are strictly
//! sequential and only the cache hit may skip stages. An invalid
//! transition is a programming error surfaced as `Internal` and caught
//! at the orchestrator boundary.

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Pipeline execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryState {
    /// Query accepted for processing
    Received,

    /// Requester is within the rate window
    RateChecked,

    /// Query passed domain validation
    Validated,

    /// Semantic cache lookup completed
    CacheChecked,

    /// Answered from cache (terminal)
    CacheHit,

    /// Grounding chunks selected
    Retrieved,

    /// Answer generated (terminal)
    Responded,

    /// Validator rejected the query (terminal)
    Rejected,

    /// Rate ceiling exceeded (terminal)
    RateLimited,

    /// Internal failure, degraded answer returned (terminal)
    Failed,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// Rate limiter admitted the query
    RateOk,

    /// Rate limiter denied the query
    RateExceeded,

    /// Validator accepted the query
    Accepted,

    /// Validator rejected the query
    ValidationFailed,

    /// Cache lookup finished (hit or miss not yet known)
    LookupDone,

    /// Cache produced a complete answer
    HitFound,

    /// Retrieval stage finished (possibly with zero chunks)
    RetrievalDone,

    /// Response generation finished
    ResponseDone,

    /// Unrecoverable stage failure
    StageFailure,
}

impl QueryState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::CacheHit
                | QueryState::Responded
                | QueryState::Rejected
                | QueryState::RateLimited
                | QueryState::Failed
        )
    }

    /// Attempt state transition with validation
    ///
    /// Valid transitions:
    /// ```text
    /// 1. Received     → RateChecked  (on: RateOk)
    /// 2. Received     → RateLimited  (on: RateExceeded)
    /// 3. RateChecked  → Validated    (on: Accepted)
    /// 4. RateChecked  → Rejected     (on: ValidationFailed)
    /// 5. Validated    → CacheChecked (on: LookupDone)
    /// 6. CacheChecked → CacheHit     (on: HitFound)
    /// 7. CacheChecked → Retrieved    (on: RetrievalDone)
    /// 8. Retrieved    → Responded    (on: ResponseDone)
    /// 9. *            → Failed       (on: StageFailure)
    /// ```
    pub fn transition(&self, event: StageEvent) -> Result<QueryState> {
        use QueryState::*;
        use StageEvent::*;

        // Stage failures can occur anywhere
        if event == StageFailure {
            return Ok(Failed);
        }

        let next_state = match (self, event) {
            (Received, RateOk) => RateChecked,
            (Received, RateExceeded) => RateLimited,

            (RateChecked, Accepted) => Validated,
            (RateChecked, ValidationFailed) => Rejected,

            (Validated, LookupDone) => CacheChecked,

            (CacheChecked, HitFound) => CacheHit,
            (CacheChecked, RetrievalDone) => Retrieved,

            (Retrieved, ResponseDone) => Responded,

            (from, event) => {
                return Err(PipelineError::Internal(format!(
                    "no valid transition from {:?} on {:?}",
                    from, event
                )));
            }
        };

        Ok(next_state)
    }

    /// Human-readable state name
    pub fn display_name(&self) -> &'static str {
        match self {
            QueryState::Received => "Received",
            QueryState::RateChecked => "Rate Checked",
            QueryState::Validated => "Validated",
            QueryState::CacheChecked => "Cache Checked",
            QueryState::CacheHit => "Cache Hit",
            QueryState::Retrieved => "Retrieved",
            QueryState::Responded => "Responded",
            QueryState::Rejected => "Rejected",
            QueryState::RateLimited => "Rate Limited",
            QueryState::Failed => "Failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = QueryState::Received;

        for event in [
            StageEvent::RateOk,
            StageEvent::Accepted,
            StageEvent::LookupDone,
            StageEvent::RetrievalDone,
            StageEvent::ResponseDone,
        ] {
            state = state.transition(event).unwrap();
        }

        assert_eq!(state, QueryState::Responded);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_cache_hit_short_circuit() {
        let state = QueryState::Received
            .transition(StageEvent::RateOk)
            .and_then(|s| s.transition(StageEvent::Accepted))
            .and_then(|s| s.transition(StageEvent::LookupDone))
            .and_then(|s| s.transition(StageEvent::HitFound))
            .unwrap();

        assert_eq!(state, QueryState::CacheHit);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_early_exit_terminals() {
        let limited = QueryState::Received
            .transition(StageEvent::RateExceeded)
            .unwrap();
        assert_eq!(limited, QueryState::RateLimited);

        let rejected = QueryState::RateChecked
            .transition(StageEvent::ValidationFailed)
            .unwrap();
        assert_eq!(rejected, QueryState::Rejected);
    }

    #[test]
    fn test_stages_cannot_be_skipped() {
        // Retrieval without a cache lookup first
        assert!(QueryState::Validated
            .transition(StageEvent::RetrievalDone)
            .is_err());

        // Response without retrieval
        assert!(QueryState::CacheChecked
            .transition(StageEvent::ResponseDone)
            .is_err());

        // Validation before the rate check
        assert!(QueryState::Received
            .transition(StageEvent::Accepted)
            .is_err());
    }

    #[test]
    fn test_failure_from_any_state() {
        for state in [
            QueryState::Received,
            QueryState::RateChecked,
            QueryState::Validated,
            QueryState::CacheChecked,
            QueryState::Retrieved,
        ] {
            assert_eq!(
                state.transition(StageEvent::StageFailure).unwrap(),
                QueryState::Failed
            );
        }
    }

    #[test]
    fn test_terminal_classification() {
        assert!(QueryState::CacheHit.is_terminal());
        assert!(QueryState::Rejected.is_terminal());
        assert!(QueryState::RateLimited.is_terminal());
        assert!(QueryState::Failed.is_terminal());
        assert!(!QueryState::Received.is_terminal());
        assert!(!QueryState::CacheChecked.is_terminal());
    }

    #[test]
    fn test_determinism() {
        let a = QueryState::Received.transition(StageEvent::RateOk).unwrap();
        let b = QueryState::Received.transition(StageEvent::RateOk).unwrap();
        assert_eq!(a, b);
    }
}
