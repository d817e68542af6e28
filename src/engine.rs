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

//! Customer ledger and payment-settlement engine.
//!
//! The [`Engine`] is the application-layer entry point. It wires the
//! settlement components to one shared [`LedgerStore`] and exposes every
//! operation the surrounding application uses.
//!
//! # Operations
//!
//! - **Onboarding**: register customers, create projects (one `debit` for the
//!   full amount), complete projects (starts the AMC schedule), register domains.
//! - **Payments**: project advances, AMC payments and renewal repayments via
//!   [`PaymentProcessor`].
//! - **Renewals**: client-paid or agency-paid via [`DomainRenewalCoordinator`].
//! - **Queries**: ledger pages, payment summaries, balances, AMC and renewal due lists.
//! - **Audit**: balance recomputation via [`BalanceReconciler`].
//!
//! # Thread Safety
//!
//! All ledger-affecting operations for one customer are serialized by the
//! store's per-customer writer lock; different customers proceed in parallel.
//! Queries read committed snapshots and never wait on writers.

use crate::base::{CustomerId, DomainId, ProjectId};
use crate::clock::{Clock, SystemClock};
use crate::settings::EngineConfig;
use crate::entry::{LedgerEntry, Posting, ReferenceType};
use crate::events::LedgerEvent;
use crate::ledger::{Order, Page};
use crate::obligations::{AmcDue, DomainDue, ObligationTracker};
use crate::payment::{PaymentProcessor, PaymentRequest};
use crate::reconcile::{AuditReport, BalanceReconciler};
use crate::records::{Customer, Domain, NewDomain, NewProject, Payment, Project};
use crate::renewal::{DomainRenewalCoordinator, RenewalOutcome, RenewalRequest};
use crate::store::LedgerStore;
use crate::LedgerError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Per-customer settlement overview.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PaymentSummary {
    pub customer_id: CustomerId,
    pub total_projects: usize,
    pub total_project_amount: Decimal,
    pub total_paid_amount: Decimal,
    /// Sum of `max(amount - paid_amount, 0)` over projects.
    pub outstanding_amount: Decimal,
    /// Credits minus debits: negative while the customer owes money.
    pub credit_balance: Decimal,
    /// Ledger balance: debits minus credits.
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CustomerBalance {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub balance: Decimal,
}

pub struct Engine {
    store: Arc<LedgerStore>,
    payments: PaymentProcessor,
    renewals: DomainRenewalCoordinator,
    obligations: ObligationTracker,
    reconciler: BalanceReconciler,
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine with default configuration and the system clock.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(LedgerStore::new(clock, config.lock_timeout()));
        Engine {
            payments: PaymentProcessor::new(Arc::clone(&store)),
            renewals: DomainRenewalCoordinator::new(
                Arc::clone(&store),
                config.require_future_validity,
            ),
            obligations: ObligationTracker::new(
                Arc::clone(&store),
                config.renewal_horizon_days,
                config.amc_horizon_days,
            ),
            reconciler: BalanceReconciler::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Today according to the injected clock.
    pub fn today(&self) -> NaiveDate {
        self.store.clock().today()
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateCustomer`] if the id is taken.
    pub fn register_customer(&self, customer: Customer) -> Result<(), LedgerError> {
        self.store.register_customer(customer)
    }

    /// Onboards a project and writes its one-time obligation entry.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Amount is not positive or AMC amount is negative.
    /// - [`LedgerError::CustomerNotFound`] - Unknown customer.
    /// - [`LedgerError::DuplicateProject`] - Project id already exists.
    /// - [`LedgerError::AmountOverflow`] - The obligation would overflow the balance.
    /// - [`LedgerError::ConcurrencyConflict`] - Customer lock wait exceeded.
    pub fn create_project(&self, project: NewProject) -> Result<Project, LedgerError> {
        if project.amount <= Decimal::ZERO
            || project.amc_amount.is_some_and(|amc| amc < Decimal::ZERO)
        {
            return Err(LedgerError::InvalidAmount);
        }
        let customer_id = project.customer_id;
        let project_id = project.id;
        self.store.lookup_customer(customer_id)?;
        self.store.claim_project(project_id, customer_id)?;

        let result = self.store.transact(customer_id, |unit| {
            let project = project.into_project();
            unit.append(Posting::debit(
                project.amount,
                format!("Project {}", project.name),
                ReferenceType::Project,
                project.id.0,
            ))?;
            unit.put_project(project.clone());
            Ok(project)
        });

        match &result {
            Ok(project) => info!(
                customer = %customer_id,
                project = %project_id,
                amount = %project.amount,
                "project created"
            ),
            Err(_) => self.store.release_project(project_id),
        }
        result
    }

    /// Records a project's completion date and starts its AMC schedule.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ProjectNotFound`] - Unknown project.
    /// - [`LedgerError::ProjectAlreadyCompleted`] - End date already set.
    /// - [`LedgerError::ConcurrencyConflict`] - Customer lock wait exceeded.
    pub fn complete_project(
        &self,
        project_id: ProjectId,
        end_date: NaiveDate,
    ) -> Result<Project, LedgerError> {
        let customer_id = self.store.project_owner(project_id)?;
        self.store.transact(customer_id, |unit| {
            let mut project = unit.project(project_id)?;
            if project.end_date.is_some() {
                return Err(LedgerError::ProjectAlreadyCompleted(project_id));
            }
            project.complete(end_date);
            unit.put_project(project.clone());
            Ok(project)
        })
    }

    /// Registers a domain under a project. Creates no ledger entry.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Negative renewal amount.
    /// - [`LedgerError::ProjectNotFound`] - Unknown project.
    /// - [`LedgerError::DuplicateDomain`] - Domain id already exists.
    /// - [`LedgerError::ConcurrencyConflict`] - Customer lock wait exceeded.
    pub fn register_domain(&self, domain: NewDomain) -> Result<Domain, LedgerError> {
        if domain.renewal_amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let domain_id = domain.id;
        let customer_id = self.store.project_owner(domain.project_id)?;
        self.store.claim_domain(domain_id, customer_id)?;

        let result = self.store.transact(customer_id, |unit| {
            unit.project(domain.project_id)?;
            let domain = domain.into_domain();
            unit.put_domain(domain.clone());
            Ok(domain)
        });
        if result.is_err() {
            self.store.release_domain(domain_id);
        }
        result
    }

    /// See [`PaymentProcessor::record`].
    ///
    /// # Errors
    ///
    /// See [`PaymentProcessor::record`].
    pub fn record_payment(&self, request: PaymentRequest) -> Result<Payment, LedgerError> {
        self.payments.record(request)
    }

    /// See [`DomainRenewalCoordinator::renew`].
    ///
    /// # Errors
    ///
    /// See [`DomainRenewalCoordinator::renew`].
    pub fn renew_domain(&self, request: RenewalRequest) -> Result<RenewalOutcome, LedgerError> {
        self.renewals.renew(request)
    }

    /// One page of a customer's ledger with running balances.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CustomerNotFound`] - Unknown customer.
    /// - [`LedgerError::InvalidPage`] - Zero page size.
    pub fn customer_ledger(
        &self,
        customer_id: CustomerId,
        order: Order,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.list(customer_id, order, page)
    }

    /// Newest-first page `index` using the configured default page size.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CustomerNotFound`] for unknown customers.
    pub fn customer_ledger_page(
        &self,
        customer_id: CustomerId,
        index: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.list(
            customer_id,
            Order::NewestFirst,
            Page::new(index, self.config.default_page_size),
        )
    }

    /// # Errors
    ///
    /// - [`LedgerError::CustomerNotFound`] - Unknown customer.
    /// - [`LedgerError::AmountOverflow`] - A total leaves the decimal range.
    pub fn payment_summary(&self, customer_id: CustomerId) -> Result<PaymentSummary, LedgerError> {
        let total = |sum: Decimal, amount: Decimal| {
            sum.checked_add(amount).ok_or(LedgerError::AmountOverflow)
        };
        self.store.read(customer_id, |book| {
            let mut summary = PaymentSummary {
                customer_id,
                total_projects: 0,
                total_project_amount: Decimal::ZERO,
                total_paid_amount: Decimal::ZERO,
                outstanding_amount: Decimal::ZERO,
                credit_balance: Decimal::ZERO - book.ledger().balance(),
                balance: book.ledger().balance(),
            };
            for project in book.projects() {
                summary.total_projects += 1;
                summary.total_project_amount = total(summary.total_project_amount, project.amount)?;
                summary.total_paid_amount = total(summary.total_paid_amount, project.paid_amount)?;
                summary.outstanding_amount =
                    total(summary.outstanding_amount, project.outstanding())?;
            }
            Ok::<_, LedgerError>(summary)
        })?
    }

    /// Every payment recorded for the customer, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CustomerNotFound`] for unknown customers.
    pub fn customer_payments(&self, customer_id: CustomerId) -> Result<Vec<Payment>, LedgerError> {
        self.store.read(customer_id, |book| book.payments().to_vec())
    }

    /// Current balance of every customer, by customer id.
    pub fn customer_balances(&self) -> Vec<CustomerBalance> {
        let mut balances = Vec::new();
        self.store.for_each_book(|book| {
            balances.push(CustomerBalance {
                customer_id: book.customer().id,
                customer_name: book.customer().name.clone(),
                balance: book.ledger().balance(),
            });
        });
        balances
    }

    pub fn amc_due_projects(&self, today: NaiveDate) -> Vec<AmcDue> {
        self.obligations.amc_due_projects(today)
    }

    pub fn domains_due_renewal(&self, today: NaiveDate) -> Vec<DomainDue> {
        self.obligations.domains_due_renewal(today)
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::CustomerNotFound`] for unknown customers.
    pub fn recompute_balance(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError> {
        self.reconciler.recompute(customer_id)
    }

    /// # Errors
    ///
    /// See [`BalanceReconciler::verify`].
    pub fn verify_balance(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError> {
        self.reconciler.verify(customer_id)
    }

    pub fn audit(&self) -> AuditReport {
        self.reconciler.audit()
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::CustomerNotFound`] for unknown customers.
    pub fn lookup_customer(&self, customer_id: CustomerId) -> Result<Customer, LedgerError> {
        self.store.lookup_customer(customer_id)
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::ProjectNotFound`] for unknown projects.
    pub fn lookup_project(&self, project_id: ProjectId) -> Result<Project, LedgerError> {
        self.store.lookup_project(project_id)
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::DomainNotFound`] for unknown domains.
    pub fn lookup_domain(&self, domain_id: DomainId) -> Result<Domain, LedgerError> {
        self.store.lookup_domain(domain_id)
    }

    /// Takes every event committed since the last drain.
    pub fn drain_events(&self) -> Vec<LedgerEvent> {
        self.store.events().drain()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
