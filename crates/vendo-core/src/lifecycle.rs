//! # Sale State Machine
//!
//! The legal transitions of a [`Sale`](crate::Sale), as a pure table.
//!
//! ```text
//! draft ──reserve──► reserved ──confirm_payment──► paid ──confirm_pickup──► completed
//!   │                   │                           │  │
//!   └──────cancel───────┴───────────cancel──────────┘  └──expire──► expired
//!                       ▼
//!                   cancelled
//! ```
//!
//! There are no back-edges: every transition strictly increases
//! [`SaleState::progress`].
//!
//! The engine calls [`transition`] before it opens a transaction, so an
//! illegal request fails without a write. The compare-and-set statements in
//! `vendo-db` repeat each edge's source state in their `WHERE` clause; when
//! one of them matches no row, the engine re-reads the sale and reports what
//! [`transition`] says about its new state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::SaleState;

/// An operation that moves a sale between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleOperation {
    Reserve,
    ConfirmPayment,
    ConfirmPickup,
    Cancel,
    /// Driven by the sweeper, never by a user.
    Expire,
}

impl fmt::Display for SaleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaleOperation::Reserve => "reserve stock",
            SaleOperation::ConfirmPayment => "confirm payment",
            SaleOperation::ConfirmPickup => "confirm pickup",
            SaleOperation::Cancel => "cancel",
            SaleOperation::Expire => "expire",
        };
        f.write_str(s)
    }
}

impl SaleState {
    /// Target state of `op` from `self`, or `None` if illegal.
    pub fn apply(self, op: SaleOperation) -> Option<SaleState> {
        use SaleOperation as Op;
        use SaleState as S;

        match (self, op) {
            (S::Draft, Op::Reserve) => Some(S::Reserved),
            (S::Reserved, Op::ConfirmPayment) => Some(S::Paid),
            (S::Paid, Op::ConfirmPickup) => Some(S::Completed),
            (S::Draft | S::Reserved | S::Paid, Op::Cancel) => Some(S::Cancelled),
            (S::Paid, Op::Expire) => Some(S::Expired),
            _ => None,
        }
    }

    /// No operation leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, SaleState::Completed | SaleState::Cancelled | SaleState::Expired)
    }

    /// Whether the slot ledger holds units for a sale in this state.
    pub fn holds_stock(self) -> bool {
        matches!(self, SaleState::Reserved | SaleState::Paid)
    }

    /// Monotone rank along the lifecycle graph.
    pub fn progress(self) -> u8 {
        match self {
            SaleState::Draft => 0,
            SaleState::Reserved => 1,
            SaleState::Paid => 2,
            SaleState::Completed | SaleState::Cancelled | SaleState::Expired => 3,
        }
    }
}

/// Like [`SaleState::apply`], but yields the domain error for illegal moves.
pub fn transition(sale_id: &str, from: SaleState, op: SaleOperation) -> CoreResult<SaleState> {
    from.apply(op).ok_or_else(|| CoreError::InvalidStateTransition {
        sale_id: sale_id.to_string(),
        state: from,
        operation: op,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [SaleState; 6] = [
        SaleState::Draft,
        SaleState::Reserved,
        SaleState::Paid,
        SaleState::Completed,
        SaleState::Cancelled,
        SaleState::Expired,
    ];

    const ALL_OPS: [SaleOperation; 5] = [
        SaleOperation::Reserve,
        SaleOperation::ConfirmPayment,
        SaleOperation::ConfirmPickup,
        SaleOperation::Cancel,
        SaleOperation::Expire,
    ];

    #[test]
    fn test_happy_path() {
        let s = SaleState::Draft;
        let s = s.apply(SaleOperation::Reserve).unwrap();
        let s = s.apply(SaleOperation::ConfirmPayment).unwrap();
        let s = s.apply(SaleOperation::ConfirmPickup).unwrap();
        assert_eq!(s, SaleState::Completed);
    }

    #[test]
    fn test_every_transition_moves_forward() {
        for from in ALL_STATES {
            for op in ALL_OPS {
                if let Some(to) = from.apply(op) {
                    assert!(
                        to.progress() > from.progress(),
                        "{from} --{op}--> {to} goes backwards"
                    );
                }
            }
        }
    }

    #[test]
    fn test_terminal_states_are_closed() {
        for from in ALL_STATES.into_iter().filter(|s| s.is_terminal()) {
            for op in ALL_OPS {
                assert_eq!(from.apply(op), None);
            }
        }
    }

    #[test]
    fn test_cancel_sources() {
        assert_eq!(SaleState::Draft.apply(SaleOperation::Cancel), Some(SaleState::Cancelled));
        assert_eq!(SaleState::Reserved.apply(SaleOperation::Cancel), Some(SaleState::Cancelled));
        assert_eq!(SaleState::Paid.apply(SaleOperation::Cancel), Some(SaleState::Cancelled));
        assert!(!SaleState::Draft.holds_stock());
        assert!(SaleState::Paid.holds_stock());
    }

    #[test]
    fn test_only_paid_expires() {
        for from in ALL_STATES {
            let expected = if from == SaleState::Paid {
                Some(SaleState::Expired)
            } else {
                None
            };
            assert_eq!(from.apply(SaleOperation::Expire), expected);
        }
    }

    #[test]
    fn test_transition_error() {
        let err = transition("s-1", SaleState::Reserved, SaleOperation::Reserve).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidStateTransition {
                state: SaleState::Reserved,
                operation: SaleOperation::Reserve,
                ..
            }
        ));
    }
}
