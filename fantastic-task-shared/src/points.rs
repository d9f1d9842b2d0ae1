//! Points accounting rules: ledger sums, balance arithmetic and the
//! completion verification state machine.
//!
//! The ledger is the source of truth. Every balance mutation sums the
//! transaction rows tied to the specific completion being applied or
//! undone; the `points_awarded` figure stored on a completion is
//! display-only and never enters the arithmetic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::auth::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Earned,
    Spent,
    Bonus,
    Penalty,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Earned => "earned",
            TransactionType::Spent => "spent",
            TransactionType::Bonus => "bonus",
            TransactionType::Penalty => "penalty",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = PointsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earned" => Ok(TransactionType::Earned),
            "spent" => Ok(TransactionType::Spent),
            "bonus" => Ok(TransactionType::Bonus),
            "penalty" => Ok(TransactionType::Penalty),
            other => Err(PointsError::UnknownTransactionType(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PointsError {
    #[error("unknown transaction type: {0}")]
    UnknownTransactionType(String),

    #[error("unknown verification status: {0}")]
    UnknownVerificationStatus(String),

    #[error("completion is already {0}")]
    AlreadyResolved(VerificationStatus),
}

/// Value of a single ledger entry. `points` and `bonus_points` are stored
/// as nullable columns; a missing value counts as zero.
pub fn tx_total(points: Option<i32>, bonus_points: Option<i32>) -> i32 {
    points.unwrap_or(0) + bonus_points.unwrap_or(0)
}

/// Sum of a set of ledger entries, given as `(points, bonus_points)` pairs.
pub fn ledger_total<I>(entries: I) -> i32
where
    I: IntoIterator<Item = (Option<i32>, Option<i32>)>,
{
    entries
        .into_iter()
        .map(|(points, bonus)| tx_total(points, bonus))
        .sum()
}

/// Balance after subtracting `total`, floored at zero. A member balance
/// never goes negative, no matter how large the amount being reversed.
pub fn debit_clamped(balance: i32, total: i32) -> i32 {
    (balance - total).max(0)
}

/// Verification state of a completion.
///
/// `Pending` is the only non-terminal state; `resolve` is the only way out
/// of it. `Approved` is the only point-affecting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Approved,
    Pending,
    Rejected,
}

impl VerificationStatus {
    /// Initial state for a new completion: a child's completion is held
    /// pending while the family requires verification, everything else is
    /// approved immediately.
    pub fn initial_for(role: Role, verification_required: bool) -> Self {
        if verification_required && role == Role::Child {
            VerificationStatus::Pending
        } else {
            VerificationStatus::Approved
        }
    }

    /// Resolve a pending completion. Resolving an already-terminal state
    /// is an error, never a silent overwrite.
    pub fn resolve(self, approved: bool) -> Result<Self, PointsError> {
        match self {
            VerificationStatus::Pending => Ok(if approved {
                VerificationStatus::Approved
            } else {
                VerificationStatus::Rejected
            }),
            resolved => Err(PointsError::AlreadyResolved(resolved)),
        }
    }

    pub fn affects_points(&self) -> bool {
        matches!(self, VerificationStatus::Approved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Approved => "approved",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = PointsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(VerificationStatus::Approved),
            "pending" => Ok(VerificationStatus::Pending),
            "rejected" => Ok(VerificationStatus::Rejected),
            other => Err(PointsError::UnknownVerificationStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_fields_coalesce_to_zero() {
        let entries = [(None, Some(1)), (Some(2), None), (Some(0), Some(0))];
        assert_eq!(ledger_total(entries), 3);
    }

    #[test]
    fn undo_subtracts_ledger_sum_not_points_awarded() {
        // Completion recorded 1 base + 1 bonus point; the completion row
        // may claim points_awarded = 1. Undo must remove 2.
        let total = ledger_total([(Some(1), Some(1))]);
        assert_eq!(debit_clamped(2, total), 0);
    }

    #[test]
    fn sequential_undos_apply_in_order() {
        let total_a = ledger_total([(Some(1), None)]);
        let total_b = ledger_total([(Some(2), None)]);
        let after_a = debit_clamped(3, total_a);
        assert_eq!(after_a, 2);
        assert_eq!(debit_clamped(after_a, total_b), 0);
    }

    #[test]
    fn balance_is_floored_at_zero() {
        assert_eq!(debit_clamped(3, 10), 0);
        assert_eq!(debit_clamped(0, 1), 0);
    }

    #[test]
    fn empty_ledger_undo_is_noop() {
        assert_eq!(debit_clamped(5, ledger_total([])), 5);
    }

    #[test]
    fn child_completion_held_when_verification_required() {
        assert_eq!(
            VerificationStatus::initial_for(Role::Child, true),
            VerificationStatus::Pending
        );
        assert_eq!(
            VerificationStatus::initial_for(Role::Child, false),
            VerificationStatus::Approved
        );
        assert_eq!(
            VerificationStatus::initial_for(Role::Member, true),
            VerificationStatus::Approved
        );
        assert_eq!(
            VerificationStatus::initial_for(Role::Admin, true),
            VerificationStatus::Approved
        );
    }

    #[test]
    fn pending_resolves_once() {
        let approved = VerificationStatus::Pending.resolve(true).unwrap();
        assert_eq!(approved, VerificationStatus::Approved);
        assert!(approved.affects_points());

        let rejected = VerificationStatus::Pending.resolve(false).unwrap();
        assert_eq!(rejected, VerificationStatus::Rejected);
        assert!(!rejected.affects_points());

        assert!(approved.resolve(false).is_err());
        assert!(rejected.resolve(true).is_err());
    }

    #[test]
    fn transaction_type_round_trips() {
        for ty in [
            TransactionType::Earned,
            TransactionType::Spent,
            TransactionType::Bonus,
            TransactionType::Penalty,
        ] {
            assert_eq!(ty.as_str().parse::<TransactionType>().unwrap(), ty);
        }
        assert!("refund".parse::<TransactionType>().is_err());
    }
}
