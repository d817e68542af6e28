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

//! Post-commit event queue.
//!
//! Units of work push events only after their writes are visible. The push
//! happens before the customer's writer lock is released, so consumers
//! (notifications, audit trails) drain the queue in commit order per
//! customer. Nothing here blocks or performs I/O.

use crate::base::{CustomerId, DomainId};
use crate::entry::LedgerEntry;
use crate::records::Payment;
use chrono::NaiveDate;
use crossbeam::queue::SegQueue;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    EntryAppended(LedgerEntry),
    PaymentRecorded(Payment),
    DomainRenewed {
        customer_id: CustomerId,
        domain_id: DomainId,
        validity_date: NaiveDate,
    },
}

/// A lock-free FIFO of committed [`LedgerEvent`]s.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: SegQueue<LedgerEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: SegQueue::new(),
        }
    }

    pub fn push(&self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn publish(&self, events: impl IntoIterator<Item = LedgerEvent>) {
        for event in events {
            self.events.push(event);
        }
    }

    /// Removes and returns every queued event.
    pub fn drain(&self) -> Vec<LedgerEvent> {
        let mut drained = Vec::with_capacity(self.events.len());
        while let Some(event) = self.events.pop() {
            drained.push(event);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
