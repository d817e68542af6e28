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

//! Read-only obligation queries and the derivation rules they share with
//! the write path.
//!
//! - Payment status: `pending` until something is paid, `partial` while
//!   `paid < amount`, `paid` from then on.
//! - AMC schedule: due one calendar year after `end_date`, rolled forward one
//!   year per AMC payment. Projects without an end date have no schedule.
//! - Renewal window: a domain is due when its validity date falls within the
//!   configured horizon, including domains that already expired.

use crate::base::{CustomerId, DomainId, ProjectId};
use crate::records::{PaymentStatus, RenewalStatus};
use crate::store::LedgerStore;
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

pub fn derive_payment_status(paid_amount: Decimal, amount: Decimal) -> PaymentStatus {
    if paid_amount <= Decimal::ZERO {
        PaymentStatus::Pending
    } else if paid_amount < amount {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Paid
    }
}

/// Same day one calendar year later; 29 February maps to 28 February.
pub fn one_year_after(date: NaiveDate) -> NaiveDate {
    date.checked_add_months(Months::new(12))
        .unwrap_or(NaiveDate::MAX)
}

/// A project's AMC position on a given day.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AmcDue {
    pub project_id: ProjectId,
    pub customer_id: CustomerId,
    pub project_name: String,
    pub amc_amount: Option<Decimal>,
    pub end_date: NaiveDate,
    pub amc_due_date: NaiveDate,
    pub days_until_amc: i64,
    pub is_overdue: bool,
}

/// A domain inside the renewal window.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DomainDue {
    pub domain_id: DomainId,
    pub project_id: ProjectId,
    pub customer_id: CustomerId,
    pub domain_name: String,
    pub validity_date: NaiveDate,
    pub renewal_amount: Decimal,
    pub renewal_status: RenewalStatus,
    pub days_remaining: i64,
    pub is_expired: bool,
}

/// Pure queries over committed state. Safe to call concurrently with any mutation.
pub struct ObligationTracker {
    store: Arc<LedgerStore>,
    renewal_horizon_days: i64,
    amc_horizon_days: i64,
}

impl ObligationTracker {
    pub fn new(store: Arc<LedgerStore>, renewal_horizon_days: i64, amc_horizon_days: i64) -> Self {
        Self {
            store,
            renewal_horizon_days,
            amc_horizon_days,
        }
    }

    /// Completed projects whose AMC falls due within the AMC horizon (or is
    /// already overdue), most urgent first.
    pub fn amc_due_projects(&self, today: NaiveDate) -> Vec<AmcDue> {
        let mut due = Vec::new();
        self.store.for_each_book(|book| {
            for project in book.projects() {
                let Some(end_date) = project.end_date else {
                    continue;
                };
                let amc_due_date = project
                    .amc_due_date
                    .unwrap_or_else(|| one_year_after(end_date));
                let days_until_amc = (amc_due_date - today).num_days();
                if days_until_amc > self.amc_horizon_days {
                    continue;
                }
                due.push(AmcDue {
                    project_id: project.id,
                    customer_id: project.customer_id,
                    project_name: project.name.clone(),
                    amc_amount: project.amc_amount,
                    end_date,
                    amc_due_date,
                    days_until_amc,
                    is_overdue: days_until_amc < 0,
                });
            }
        });
        due.sort_by_key(|d| (d.days_until_amc, d.project_id));
        due
    }

    /// Domains whose validity ends within the renewal horizon (or already ended),
    /// most urgent first.
    pub fn domains_due_renewal(&self, today: NaiveDate) -> Vec<DomainDue> {
        let mut due = Vec::new();
        self.store.for_each_book(|book| {
            for domain in book.domains() {
                let days_remaining = (domain.validity_date - today).num_days();
                if days_remaining > self.renewal_horizon_days {
                    continue;
                }
                due.push(DomainDue {
                    domain_id: domain.id,
                    project_id: domain.project_id,
                    customer_id: book.customer().id,
                    domain_name: domain.name.clone(),
                    validity_date: domain.validity_date,
                    renewal_amount: domain.renewal_amount,
                    renewal_status: domain.renewal_status,
                    days_remaining,
                    is_expired: domain.validity_date < today,
                });
            }
        });
        due.sort_by_key(|d| (d.days_remaining, d.domain_id));
        due
    }

    pub fn renewal_horizon_days(&self) -> i64 {
        self.renewal_horizon_days
    }

    pub fn amc_horizon_days(&self) -> i64 {
        self.amc_horizon_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn payment_status_boundaries() {
        assert_eq!(derive_payment_status(dec!(0), dec!(100)), PaymentStatus::Pending);
        assert_eq!(derive_payment_status(dec!(0.01), dec!(100)), PaymentStatus::Partial);
        assert_eq!(derive_payment_status(dec!(99.99), dec!(100)), PaymentStatus::Partial);
        assert_eq!(derive_payment_status(dec!(100), dec!(100)), PaymentStatus::Paid);
        assert_eq!(derive_payment_status(dec!(150), dec!(100)), PaymentStatus::Paid);
    }

    #[test]
    fn one_year_is_calendar_based() {
        assert_eq!(one_year_after(date(2024, 3, 15)), date(2025, 3, 15));
        // Crosses 2024-02-29; adding 365 days would land on 2024-03-14.
        assert_eq!(one_year_after(date(2023, 3, 15)), date(2024, 3, 15));
        assert_eq!(one_year_after(date(2024, 2, 29)), date(2025, 2, 28));
        assert_eq!(one_year_after(date(2023, 12, 31)), date(2024, 12, 31));
    }
}
