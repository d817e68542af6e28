// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for ledger and settlement operations.

use crate::base::{CustomerId, DomainId, ProjectId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Broad classification of a [`LedgerError`], used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any write; the caller can fix the request.
    Validation,
    /// Unknown customer, project or domain.
    NotFound,
    /// A collaborator record with the same id already exists.
    Conflict,
    /// The per-customer lock could not be acquired in time; safe to retry.
    ConcurrencyConflict,
    /// Cached and recomputed balances disagree. Fatal for the customer.
    InvariantViolation,
}

/// Ledger and settlement errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Amount would push a balance or total outside the decimal range
    #[error("amount overflows the representable range")]
    AmountOverflow,

    /// A required input field was absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// AMC payment against a project without an AMC amount
    #[error("project {0} has no AMC amount")]
    AmcNotConfigured(ProjectId),

    /// AMC payment against a project that has no completion date yet
    #[error("project {0} has no AMC schedule (end date not set)")]
    AmcNotStarted(ProjectId),

    /// End date may only be set once
    #[error("project {0} is already completed")]
    ProjectAlreadyCompleted(ProjectId),

    /// Renewal would not move the validity date past today
    #[error("domain {domain_id}: new validity date {validity_date} is not after {today}")]
    ValidityNotInFuture {
        domain_id: DomainId,
        validity_date: NaiveDate,
        today: NaiveDate,
    },

    /// Page size of zero
    #[error("invalid page (size must be positive)")]
    InvalidPage,

    /// Referenced project or domain belongs to another customer
    #[error("customer does not own the referenced record")]
    CustomerMismatch,

    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    #[error("domain {0} not found")]
    DomainNotFound(DomainId),

    #[error("customer {0} already exists")]
    DuplicateCustomer(CustomerId),

    #[error("project {0} already exists")]
    DuplicateProject(ProjectId),

    #[error("domain {0} already exists")]
    DuplicateDomain(DomainId),

    /// Per-customer lock wait exceeded
    #[error("customer {0} is busy, retry the operation")]
    ConcurrencyConflict(CustomerId),

    /// Reconciled balance differs from the cached balance
    #[error("balance invariant violated for customer {customer_id}: cached {cached}, recomputed {recomputed}")]
    InvariantViolation {
        customer_id: CustomerId,
        cached: Decimal,
        recomputed: Decimal,
    },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount
            | Self::AmountOverflow
            | Self::MissingField(_)
            | Self::AmcNotConfigured(_)
            | Self::AmcNotStarted(_)
            | Self::ProjectAlreadyCompleted(_)
            | Self::ValidityNotInFuture { .. }
            | Self::InvalidPage
            | Self::CustomerMismatch => ErrorKind::Validation,
            Self::CustomerNotFound(_) | Self::ProjectNotFound(_) | Self::DomainNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::DuplicateCustomer(_) | Self::DuplicateProject(_) | Self::DuplicateDomain(_) => {
                ErrorKind::Conflict
            }
            Self::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
        }
    }

    /// Only lock timeouts are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ConcurrencyConflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            LedgerError::InvalidAmount.to_string(),
            "invalid amount (must be positive)"
        );
        assert_eq!(
            LedgerError::MissingField("amount").to_string(),
            "missing required field: amount"
        );
        assert_eq!(
            LedgerError::ProjectNotFound(ProjectId(7)).to_string(),
            "project 7 not found"
        );
        assert_eq!(
            LedgerError::ConcurrencyConflict(CustomerId(3)).to_string(),
            "customer 3 is busy, retry the operation"
        );
        assert_eq!(
            LedgerError::InvariantViolation {
                customer_id: CustomerId(1),
                cached: dec!(10),
                recomputed: dec!(12),
            }
            .to_string(),
            "balance invariant violated for customer 1: cached 10, recomputed 12"
        );
    }

    #[test]
    fn errors_map_to_kinds() {
        assert_eq!(LedgerError::InvalidAmount.kind(), ErrorKind::Validation);
        assert_eq!(LedgerError::CustomerMismatch.kind(), ErrorKind::Validation);
        assert_eq!(LedgerError::AmountOverflow.kind(), ErrorKind::Validation);
        assert_eq!(
            LedgerError::DomainNotFound(DomainId(1)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LedgerError::DuplicateProject(ProjectId(1)).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            LedgerError::ConcurrencyConflict(CustomerId(1)).kind(),
            ErrorKind::ConcurrencyConflict
        );
    }

    #[test]
    fn only_lock_timeouts_are_retryable() {
        assert!(LedgerError::ConcurrencyConflict(CustomerId(1)).is_retryable());
        assert!(!LedgerError::InvalidAmount.is_retryable());
        assert!(!LedgerError::CustomerNotFound(CustomerId(1)).is_retryable());
    }

    #[test]
    fn errors_are_cloneable() {
        let error = LedgerError::AmcNotConfigured(ProjectId(4));
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
