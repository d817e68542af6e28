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

//! Per-customer append-only ledger.
//!
//! A [`Ledger`] is the chain of entries for one customer plus a cached
//! running balance. The chain invariant holds after every append:
//!
//! ```text
//! entry[i].balance_after = entry[i-1].balance_after (or 0) ± entry[i].amount
//! balance                = entry[n-1].balance_after (or 0)
//! ```
//!
//! The ledger has no locking of its own; [`LedgerStore`](crate::LedgerStore)
//! serializes writers per customer and publishes appends atomically.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use agency_ledger::{CustomerId, Ledger};
//!
//! let ledger = Ledger::new(CustomerId(1));
//! assert_eq!(ledger.balance(), dec!(0));
//! assert!(ledger.is_empty());
//! ```

use crate::LedgerError;
use crate::base::{CustomerId, EntryId};
use crate::entry::{LedgerEntry, Posting};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Listing order for ledger pages.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Zero-based page of a listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub size: usize,
}

impl Page {
    pub fn new(index: usize, size: usize) -> Self {
        Self { index, size }
    }

    /// A single page large enough to hold every entry.
    pub fn all() -> Self {
        Self {
            index: 0,
            size: usize::MAX,
        }
    }

    fn offset(&self) -> usize {
        self.index.saturating_mul(self.size)
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    customer_id: CustomerId,
    entries: Vec<LedgerEntry>,
    /// Denormalized running balance; always equals the last entry's `balance_after`.
    balance: Decimal,
}

impl Ledger {
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            entries: Vec::new(),
            balance: Decimal::ZERO,
        }
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    /// Cached balance: positive while the customer owes money, negative when in credit.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the entry that would follow a chain ending at `previous_balance`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] if the posting amount is not positive.
    pub fn chain_entry(
        customer_id: CustomerId,
        previous_balance: Decimal,
        posting: Posting,
        id: EntryId,
        timestamp: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        posting.validate()?;
        let balance_after = posting.kind.apply(previous_balance, posting.amount)?;
        Ok(LedgerEntry {
            id,
            customer_id,
            timestamp,
            kind: posting.kind,
            amount: posting.amount,
            description: posting.description,
            reference_type: posting.reference_type,
            reference_id: posting.reference_id,
            balance_after,
        })
    }

    /// Appends a posting, computing `balance_after` from the current balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] if the posting amount is not positive.
    pub fn append(
        &mut self,
        posting: Posting,
        id: EntryId,
        timestamp: DateTime<Utc>,
    ) -> Result<&LedgerEntry, LedgerError> {
        let entry = Self::chain_entry(self.customer_id, self.balance, posting, id, timestamp)?;
        self.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Pushes an entry already chained onto this ledger's balance.
    pub(crate) fn push(&mut self, entry: LedgerEntry) {
        debug_assert_eq!(
            entry.customer_id, self.customer_id,
            "Invariant violated: entry for customer {} pushed onto ledger of {}",
            entry.customer_id, self.customer_id
        );
        debug_assert_eq!(
            entry.kind.apply(self.balance, entry.amount),
            Ok(entry.balance_after),
            "Invariant violated: entry {} breaks the balance chain",
            entry.id
        );
        self.balance = entry.balance_after;
        self.entries.push(entry);
    }

    /// Returns one page of entries in the requested order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidPage`] for a zero page size.
    pub fn page(&self, order: Order, page: Page) -> Result<Vec<LedgerEntry>, LedgerError> {
        if page.size == 0 {
            return Err(LedgerError::InvalidPage);
        }
        let entries: Vec<LedgerEntry> = match order {
            Order::OldestFirst => self
                .entries
                .iter()
                .skip(page.offset())
                .take(page.size)
                .cloned()
                .collect(),
            Order::NewestFirst => self
                .entries
                .iter()
                .rev()
                .skip(page.offset())
                .take(page.size)
                .cloned()
                .collect(),
        };
        Ok(entries)
    }

    #[cfg(test)]
    pub(crate) fn corrupt_cached_balance(&mut self, balance: Decimal) {
        self.balance = balance;
    }
}
