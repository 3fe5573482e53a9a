//! Saga State Definitions

use std::fmt;

/// Progress of one orchestrator invocation.
///
/// ```text
/// IDLE → DB_TX_OPEN → [BROKER_TX_OPEN] → RULES_EVALUATED → PERSISTED → [PUBLISHED] → COMMITTED
///                              ↓ (any error after DB_TX_OPEN)
///                          ABORTING → ABORTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SagaState {
    Idle = 0,
    DbTxOpen = 1,
    BrokerTxOpen = 2,
    RulesEvaluated = 3,
    Persisted = 4,
    Published = 5,
    /// Terminal: both resources committed
    Committed = 6,
    Aborting = 7,
    /// Terminal: broker aborted, relational tx rolled back
    Aborted = 8,
}

impl SagaState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Committed | SagaState::Aborted)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        match (self, next) {
            (Idle, DbTxOpen) => true,
            (DbTxOpen, BrokerTxOpen | RulesEvaluated) => true,
            (BrokerTxOpen, RulesEvaluated) => true,
            (RulesEvaluated, Persisted) => true,
            // REST sagas commit without publishing
            (Persisted, Published | Committed) => true,
            (Published, Committed) => true,
            (DbTxOpen | BrokerTxOpen | RulesEvaluated | Persisted | Published, Aborting) => true,
            (Aborting, Aborted) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Idle => "IDLE",
            SagaState::DbTxOpen => "DB_TX_OPEN",
            SagaState::BrokerTxOpen => "BROKER_TX_OPEN",
            SagaState::RulesEvaluated => "RULES_EVALUATED",
            SagaState::Persisted => "PERSISTED",
            SagaState::Published => "PUBLISHED",
            SagaState::Committed => "COMMITTED",
            SagaState::Aborting => "ABORTING",
            SagaState::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
