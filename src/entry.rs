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

//! Ledger entry types.
//!
//! Entries are immutable once written. The sign rule is the only place that
//! turns an entry into a balance movement:
//! - [`EntryKind::Debit`] increases what the customer owes.
//! - [`EntryKind::Credit`] decreases it.

use crate::LedgerError;
use crate::base::{CustomerId, EntryId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Debit,
    Credit,
}

impl EntryKind {
    /// Applies the sign rule to `balance`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AmountOverflow`] if the result leaves the decimal range.
    pub fn apply(self, balance: Decimal, amount: Decimal) -> Result<Decimal, LedgerError> {
        match self {
            Self::Debit => balance.checked_add(amount),
            Self::Credit => balance.checked_sub(amount),
        }
        .ok_or(LedgerError::AmountOverflow)
    }
}

/// What kind of obligation or settlement an entry refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Project,
    DomainRenewal,
    Amc,
    Advance,
}

/// An entry that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub kind: EntryKind,
    pub amount: Decimal,
    pub description: String,
    pub reference_type: ReferenceType,
    pub reference_id: u32,
}

impl Posting {
    pub fn debit(
        amount: Decimal,
        description: impl Into<String>,
        reference_type: ReferenceType,
        reference_id: u32,
    ) -> Self {
        Self {
            kind: EntryKind::Debit,
            amount,
            description: description.into(),
            reference_type,
            reference_id,
        }
    }

    pub fn credit(
        amount: Decimal,
        description: impl Into<String>,
        reference_type: ReferenceType,
        reference_id: u32,
    ) -> Self {
        Self {
            kind: EntryKind::Credit,
            amount,
            description: description.into(),
            reference_type,
            reference_id,
        }
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] unless the amount is strictly positive.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(())
    }
}

/// A written ledger entry carrying the customer's balance right after it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub customer_id: CustomerId,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub description: String,
    pub reference_type: ReferenceType,
    pub reference_id: u32,
    pub balance_after: Decimal,
}

impl LedgerEntry {
    /// Balance movement of this entry: positive for debits, negative for credits.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryKind::Debit => self.amount,
            EntryKind::Credit => -self.amount,
        }
    }
}
