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

//! Domain and hosting renewals.
//!
//! Who paid the registrar decides the ledger effect:
//!
//! ```text
//!                 ┌── ClientPaid ──► no entry,            payment completed
//! renew(domain) ──┤
//!                 └── AgencyPaid ──► debit renewal amount, payment pending
//! ```
//!
//! Both branches set the new validity date and renewal amount and mark the
//! domain `renewed`, in the same unit of work as the entry and payment.

use crate::LedgerError;
use crate::base::DomainId;
use crate::entry::{LedgerEntry, Posting, ReferenceType};
use crate::events::LedgerEvent;
use crate::records::{Domain, Payment, PaymentPurpose, PaymentState, RenewalStatus};
use crate::store::LedgerStore;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RenewalPayer {
    /// The client paid the registrar or host directly. Creates no debt.
    #[serde(rename = "client")]
    ClientPaid,
    /// The agency fronted the cost. The customer now owes it.
    #[serde(rename = "agency")]
    AgencyPaid,
}

impl RenewalPayer {
    pub fn payment_state(self) -> PaymentState {
        match self {
            Self::ClientPaid => PaymentState::Completed,
            Self::AgencyPaid => PaymentState::Pending,
        }
    }

    pub fn ledger_effect(self, domain: &Domain, amount: Decimal) -> Option<Posting> {
        match self {
            Self::ClientPaid => None,
            Self::AgencyPaid => Some(Posting::debit(
                amount,
                format!("Domain renewal for {}", domain.name),
                ReferenceType::DomainRenewal,
                domain.id.0,
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenewalRequest {
    pub domain_id: DomainId,
    pub new_validity_date: NaiveDate,
    pub amount: Decimal,
    #[serde(rename = "payment_type")]
    pub payer: RenewalPayer,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RenewalOutcome {
    pub validity_date: NaiveDate,
    pub payment: Payment,
    /// The debit written for agency-paid renewals.
    pub entry: Option<LedgerEntry>,
}

pub struct DomainRenewalCoordinator {
    store: Arc<LedgerStore>,
    require_future_validity: bool,
}

impl DomainRenewalCoordinator {
    pub fn new(store: Arc<LedgerStore>, require_future_validity: bool) -> Self {
        Self {
            store,
            require_future_validity,
        }
    }

    /// Renews a domain and applies the payer-specific ledger effect.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Amount is not positive.
    /// - [`LedgerError::DomainNotFound`] - Unknown domain.
    /// - [`LedgerError::ValidityNotInFuture`] - New validity is not after today while
    ///   backdating is disallowed.
    /// - [`LedgerError::AmountOverflow`] - The renewal debit would overflow the balance.
    /// - [`LedgerError::ConcurrencyConflict`] - Customer lock wait exceeded.
    pub fn renew(&self, request: RenewalRequest) -> Result<RenewalOutcome, LedgerError> {
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let customer_id = self.store.domain_owner(request.domain_id)?;
        let today = self.store.clock().today();
        if self.require_future_validity && request.new_validity_date <= today {
            return Err(LedgerError::ValidityNotInFuture {
                domain_id: request.domain_id,
                validity_date: request.new_validity_date,
                today,
            });
        }

        let outcome = self.store.transact(customer_id, |unit| {
            let mut domain = unit.domain(request.domain_id)?;
            let entry = match request.payer.ledger_effect(&domain, request.amount) {
                Some(posting) => Some(unit.append(posting)?),
                None => None,
            };

            domain.validity_date = request.new_validity_date;
            domain.renewal_amount = request.amount;
            domain.renewal_status = RenewalStatus::Renewed;
            let description = format!("Domain renewal for {}", domain.name);
            unit.put_domain(domain);

            let payment = unit.record_payment(
                PaymentPurpose::DomainRenewal,
                request.domain_id.0,
                request.amount,
                request.payer.payment_state(),
                description,
            );
            unit.publish(LedgerEvent::DomainRenewed {
                customer_id,
                domain_id: request.domain_id,
                validity_date: request.new_validity_date,
            });

            Ok(RenewalOutcome {
                validity_date: request.new_validity_date,
                payment,
                entry,
            })
        })?;

        info!(
            customer = %customer_id,
            domain = %request.domain_id,
            payer = ?request.payer,
            validity_date = %outcome.validity_date,
            "domain renewed"
        );
        Ok(outcome)
    }
}
