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

//! Applying incoming payments to obligations.
//!
//! | Target | Ledger effect | Record effect |
//! |--------|---------------|---------------|
//! | Project advance | credit `amount` | `paid_amount += amount`, status re-derived |
//! | AMC | credit `amount` | `amc_due_date` rolled forward one year |
//! | Domain renewal | credit `amount` | none (repays agency-fronted renewal) |
//!
//! Every payment is recorded as `completed`, in the same unit of work as
//! the ledger entry and record update.

use crate::LedgerError;
use crate::base::{CustomerId, DomainId, ProjectId};
use crate::entry::{Posting, ReferenceType};
use crate::obligations::one_year_after;
use crate::records::{Payment, PaymentPurpose, PaymentState};
use crate::store::{LedgerStore, UnitOfWork};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// The obligation a payment settles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "purpose", content = "reference_id", rename_all = "snake_case")]
pub enum PaymentTarget {
    ProjectAdvance(ProjectId),
    Amc(ProjectId),
    DomainRenewal(DomainId),
}

impl PaymentTarget {
    pub fn purpose(&self) -> PaymentPurpose {
        match self {
            Self::ProjectAdvance(_) => PaymentPurpose::ProjectAdvance,
            Self::Amc(_) => PaymentPurpose::Amc,
            Self::DomainRenewal(_) => PaymentPurpose::DomainRenewal,
        }
    }

    pub fn reference_id(&self) -> u32 {
        match self {
            Self::ProjectAdvance(id) | Self::Amc(id) => id.0,
            Self::DomainRenewal(id) => id.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentRequest {
    pub customer_id: CustomerId,
    pub target: PaymentTarget,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl PaymentRequest {
    pub fn new(customer_id: CustomerId, target: PaymentTarget, amount: Decimal) -> Self {
        Self {
            customer_id,
            target,
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub struct PaymentProcessor {
    store: Arc<LedgerStore>,
}

impl PaymentProcessor {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Records a payment against a project advance, an AMC or a renewal debt.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Amount is not positive.
    /// - [`LedgerError::CustomerNotFound`] / [`LedgerError::ProjectNotFound`] /
    ///   [`LedgerError::DomainNotFound`] - Unknown ids.
    /// - [`LedgerError::CustomerMismatch`] - The target belongs to another customer.
    /// - [`LedgerError::AmcNotConfigured`] - AMC payment on a project without AMC amount.
    /// - [`LedgerError::AmcNotStarted`] - AMC payment on a project without end date.
    /// - [`LedgerError::AmountOverflow`] - Balance or paid amount would overflow.
    /// - [`LedgerError::ConcurrencyConflict`] - Customer lock wait exceeded.
    pub fn record(&self, request: PaymentRequest) -> Result<Payment, LedgerError> {
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let customer_id = request.customer_id;
        self.store.lookup_customer(customer_id)?;
        let owner = match request.target {
            PaymentTarget::ProjectAdvance(id) | PaymentTarget::Amc(id) => {
                self.store.project_owner(id)?
            }
            PaymentTarget::DomainRenewal(id) => self.store.domain_owner(id)?,
        };
        if owner != customer_id {
            return Err(LedgerError::CustomerMismatch);
        }

        let payment = self
            .store
            .transact(customer_id, |unit| settle(unit, &request))?;

        info!(
            customer = %customer_id,
            payment = %payment.id,
            purpose = ?payment.purpose,
            amount = %payment.amount,
            "payment recorded"
        );
        Ok(payment)
    }
}

fn settle(unit: &mut UnitOfWork<'_>, request: &PaymentRequest) -> Result<Payment, LedgerError> {
    let amount = request.amount;
    match request.target {
        PaymentTarget::ProjectAdvance(project_id) => {
            let mut project = unit.project(project_id)?;
            let description = request
                .description
                .clone()
                .unwrap_or_else(|| format!("Advance payment for {}", project.name));

            project.apply_payment(amount)?;
            unit.append(Posting::credit(
                amount,
                description.clone(),
                ReferenceType::Advance,
                project_id.0,
            ))?;
            unit.put_project(project);
            Ok(unit.record_payment(
                PaymentPurpose::ProjectAdvance,
                project_id.0,
                amount,
                PaymentState::Completed,
                description,
            ))
        }
        PaymentTarget::Amc(project_id) => {
            let mut project = unit.project(project_id)?;
            if !project.amc_amount.is_some_and(|amc| amc > Decimal::ZERO) {
                return Err(LedgerError::AmcNotConfigured(project_id));
            }
            let due = project
                .amc_due_date
                .ok_or(LedgerError::AmcNotStarted(project_id))?;
            let description = request
                .description
                .clone()
                .unwrap_or_else(|| format!("AMC payment for {} (due {due})", project.name));

            // Roll from the previous due date, not the payment date.
            project.amc_due_date = Some(one_year_after(due));
            unit.append(Posting::credit(
                amount,
                description.clone(),
                ReferenceType::Amc,
                project_id.0,
            ))?;
            unit.put_project(project);
            Ok(unit.record_payment(
                PaymentPurpose::Amc,
                project_id.0,
                amount,
                PaymentState::Completed,
                description,
            ))
        }
        PaymentTarget::DomainRenewal(domain_id) => {
            let domain = unit.domain(domain_id)?;
            let description = request
                .description
                .clone()
                .unwrap_or_else(|| format!("Renewal repayment for {}", domain.name));

            unit.append(Posting::credit(
                amount,
                description.clone(),
                ReferenceType::DomainRenewal,
                domain_id.0,
            ))?;
            Ok(unit.record_payment(
                PaymentPurpose::DomainRenewal,
                domain_id.0,
                amount,
                PaymentState::Completed,
                description,
            ))
        }
    }
}
