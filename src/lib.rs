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

//! # Agency Ledger
//!
//! This library provides the customer ledger and payment-settlement engine of
//! an agency management system: project onboarding, advance payments, annual
//! maintenance contract (AMC) billing and domain renewals all settle against a
//! single append-only ledger per customer.
//!
//! ## Core Components
//!
//! - [`Engine`]: Application-layer facade over all components
//! - [`LedgerStore`]: Per-customer books with serialized, atomic units of work
//! - [`PaymentProcessor`]: Applies payments to project advances, AMCs and renewal debts
//! - [`DomainRenewalCoordinator`]: Client-paid and agency-paid renewals
//! - [`ObligationTracker`]: AMC due list, renewal due list, payment-status rules
//! - [`BalanceReconciler`]: Recomputes balances from the entry history
//! - [`LedgerError`]: Error types for settlement failures
//!
//! ## Example
//!
//! ```
//! use agency_ledger::{
//!     Customer, CustomerId, Engine, NewProject, PaymentRequest, PaymentStatus, PaymentTarget,
//!     ProjectId,
//! };
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! engine.register_customer(Customer::new(CustomerId(1), "Acme")).unwrap();
//!
//! // Onboarding a project creates the obligation
//! engine
//!     .create_project(NewProject {
//!         id: ProjectId(1),
//!         customer_id: CustomerId(1),
//!         name: "Online store".into(),
//!         amount: dec!(10000),
//!         amc_amount: None,
//!         end_date: None,
//!     })
//!     .unwrap();
//!
//! // An advance payment settles part of it
//! let advance = PaymentRequest::new(
//!     CustomerId(1),
//!     PaymentTarget::ProjectAdvance(ProjectId(1)),
//!     dec!(4000),
//! );
//! engine.record_payment(advance).unwrap();
//!
//! let project = engine.lookup_project(ProjectId(1)).unwrap();
//! assert_eq!(project.payment_status, PaymentStatus::Partial);
//! assert_eq!(engine.payment_summary(CustomerId(1)).unwrap().balance, dec!(6000));
//! ```
//!
//! ## Thread Safety
//!
//! Mutations for the same customer are serialized with a bounded wait;
//! mutations for different customers run in parallel. Readers always observe
//! whole units of work.

pub mod base;
pub mod clock;
mod engine;
pub mod entry;
pub mod error;
pub mod events;
pub mod ledger;
pub mod obligations;
pub mod payment;
pub mod reconcile;
pub mod records;
pub mod renewal;
pub mod settings;
pub mod store;

pub use base::{CustomerId, DomainId, EntryId, PaymentId, ProjectId};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{CustomerBalance, Engine, PaymentSummary};
pub use entry::{EntryKind, LedgerEntry, Posting, ReferenceType};
pub use error::{ErrorKind, LedgerError};
pub use events::{EventQueue, LedgerEvent};
pub use ledger::{Ledger, Order, Page};
pub use obligations::{AmcDue, DomainDue, ObligationTracker};
pub use payment::{PaymentProcessor, PaymentRequest, PaymentTarget};
pub use reconcile::{AuditReport, BalanceReconciler};
pub use records::{
    Customer, Domain, NewDomain, NewProject, Payment, PaymentPurpose, PaymentState, PaymentStatus,
    Project, RenewalStatus,
};
pub use renewal::{DomainRenewalCoordinator, RenewalOutcome, RenewalPayer, RenewalRequest};
pub use settings::EngineConfig;
pub use store::{Book, LedgerStore, UnitOfWork};
