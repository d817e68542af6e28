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

//! Records owned by the CRUD collaborators: customers, projects, domains, payments.
//!
//! The settlement core only mutates the fields listed here as mutable
//! (`paid_amount`, `payment_status`, `amc_due_date` on projects and
//! `validity_date`, `renewal_amount`, `renewal_status` on domains), and only
//! inside a [`UnitOfWork`](crate::UnitOfWork).

use crate::LedgerError;
use crate::base::{CustomerId, DomainId, PaymentId, ProjectId};
use crate::obligations::{derive_payment_status, one_year_after};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
}

impl Customer {
    pub fn new(id: CustomerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Settlement state of a project, derived from `paid_amount` and `amount`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub customer_id: CustomerId,
    pub name: String,
    pub amount: Decimal,
    pub amc_amount: Option<Decimal>,
    pub end_date: Option<NaiveDate>,
    pub amc_due_date: Option<NaiveDate>,
    pub paid_amount: Decimal,
    pub payment_status: PaymentStatus,
}

impl Project {
    /// Adds `amount` to `paid_amount` and re-derives the payment status.
    /// Overpayment is not capped.
    pub(crate) fn apply_payment(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        self.paid_amount = self
            .paid_amount
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        self.payment_status = derive_payment_status(self.paid_amount, self.amount);
        Ok(())
    }

    /// Sets the completion date and starts the AMC schedule one year later.
    pub(crate) fn complete(&mut self, end_date: NaiveDate) {
        self.end_date = Some(end_date);
        self.amc_due_date = Some(one_year_after(end_date));
    }

    /// Amount still owed on this project, never negative.
    pub fn outstanding(&self) -> Decimal {
        (self.amount - self.paid_amount).max(Decimal::ZERO)
    }
}

/// Input for project onboarding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewProject {
    pub id: ProjectId,
    pub customer_id: CustomerId,
    pub name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub amc_amount: Option<Decimal>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl NewProject {
    pub(crate) fn into_project(self) -> Project {
        let mut project = Project {
            id: self.id,
            customer_id: self.customer_id,
            name: self.name,
            amount: self.amount,
            amc_amount: self.amc_amount,
            end_date: None,
            amc_due_date: None,
            paid_amount: Decimal::ZERO,
            payment_status: PaymentStatus::Pending,
        };
        if let Some(end_date) = self.end_date {
            project.complete(end_date);
        }
        project
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RenewalStatus {
    Active,
    Due,
    Renewed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Domain {
    pub id: DomainId,
    pub project_id: ProjectId,
    pub name: String,
    pub validity_date: NaiveDate,
    pub renewal_amount: Decimal,
    pub renewal_status: RenewalStatus,
}

/// Input for registering a domain or hosting record. Creates no ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewDomain {
    pub id: DomainId,
    pub project_id: ProjectId,
    pub name: String,
    pub validity_date: NaiveDate,
    #[serde(default)]
    pub renewal_amount: Decimal,
}

impl NewDomain {
    pub(crate) fn into_domain(self) -> Domain {
        Domain {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            validity_date: self.validity_date,
            renewal_amount: self.renewal_amount,
            renewal_status: RenewalStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    ProjectAdvance,
    Amc,
    DomainRenewal,
}

/// Status of a payment record. Records are written once in their final state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub id: PaymentId,
    pub customer_id: CustomerId,
    pub purpose: PaymentPurpose,
    pub reference_id: u32,
    pub amount: Decimal,
    pub status: PaymentState,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
