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

//! Independent recomputation of customer balances.
//!
//! The reconciler only uses the store's read path. It folds the sign rule
//! over a customer's entries from zero and compares the result with both the
//! cached balance and every stored `balance_after`. Any disagreement is an
//! [`LedgerError::InvariantViolation`]; it is reported, never repaired.

use crate::LedgerError;
use crate::base::CustomerId;
use crate::entry::LedgerEntry;
use crate::store::LedgerStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::error;

/// Folds the sign rule over `entries` starting from zero.
///
/// # Errors
///
/// Returns [`LedgerError::AmountOverflow`] if a partial sum leaves the decimal range.
pub fn recompute_balance<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> Result<Decimal, LedgerError> {
    entries
        .into_iter()
        .try_fold(Decimal::ZERO, |balance, entry| {
            entry.kind.apply(balance, entry.amount)
        })
}

/// Verifies the whole chain and the cached balance, returning the recomputed balance.
///
/// # Errors
///
/// Returns [`LedgerError::InvariantViolation`] at the first disagreement, or
/// [`LedgerError::AmountOverflow`] if the history cannot be summed.
pub fn check_chain(
    customer_id: CustomerId,
    entries: &[LedgerEntry],
    cached: Decimal,
) -> Result<Decimal, LedgerError> {
    let mut running = Decimal::ZERO;
    for entry in entries {
        running = entry.kind.apply(running, entry.amount)?;
        if entry.balance_after != running {
            return Err(LedgerError::InvariantViolation {
                customer_id,
                cached: entry.balance_after,
                recomputed: running,
            });
        }
    }
    if cached != running {
        return Err(LedgerError::InvariantViolation {
            customer_id,
            cached,
            recomputed: running,
        });
    }
    Ok(running)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub checked: usize,
    pub violations: Vec<LedgerError>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct BalanceReconciler {
    store: Arc<LedgerStore>,
}

impl BalanceReconciler {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Recomputes a customer's balance from the full entry history.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CustomerNotFound`] for unknown customers.
    pub fn recompute(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError> {
        self.store
            .read(customer_id, |book| recompute_balance(book.ledger().entries()))?
    }

    /// Checks `recompute(c) == last_entry(c).balance_after == cached(c)`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CustomerNotFound`] - Unknown customer.
    /// - [`LedgerError::InvariantViolation`] - Balances disagree; also logged at error level.
    pub fn verify(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError> {
        let result = self.store.read(customer_id, |book| {
            check_chain(customer_id, book.ledger().entries(), book.ledger().balance())
        })?;
        if let Err(LedgerError::InvariantViolation {
            cached, recomputed, ..
        }) = &result
        {
            error!(
                customer = %customer_id,
                cached = %cached,
                recomputed = %recomputed,
                "ledger balance invariant violated"
            );
        }
        result
    }

    /// Verifies every customer.
    pub fn audit(&self) -> AuditReport {
        let mut report = AuditReport::default();
        for customer_id in self.store.customer_ids() {
            report.checked += 1;
            match self.verify(customer_id) {
                Ok(_) => {}
                Err(violation) => report.violations.push(violation),
            }
        }
        report
    }
}
