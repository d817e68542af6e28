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

//! Engine public API integration tests.

use agency_ledger::{
    Customer, CustomerId, DomainId, Engine, EngineConfig, EntryKind, ErrorKind, FixedClock,
    LedgerError, LedgerEvent, NewDomain, NewProject, Order, Page, PaymentPurpose,
    PaymentRequest, PaymentState, PaymentStatus, PaymentTarget, ProjectId, ReferenceType,
    RenewalPayer, RenewalRequest, RenewalStatus,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    date(2025, 1, 15)
}

fn make_engine() -> Engine {
    make_engine_with(EngineConfig::default())
}

fn make_engine_with(config: EngineConfig) -> Engine {
    Engine::with_config(config, Arc::new(FixedClock::at_date(today())))
}

fn make_project(customer_id: u32, project_id: u32, amount: Decimal) -> NewProject {
    NewProject {
        id: ProjectId(project_id),
        customer_id: CustomerId(customer_id),
        name: format!("Project {project_id}"),
        amount,
        amc_amount: None,
        end_date: None,
    }
}

fn make_domain(project_id: u32, domain_id: u32, validity_date: NaiveDate) -> NewDomain {
    NewDomain {
        id: DomainId(domain_id),
        project_id: ProjectId(project_id),
        name: format!("site{domain_id}.example"),
        validity_date,
        renewal_amount: dec!(15),
    }
}

fn advance(customer_id: u32, project_id: u32, amount: Decimal) -> PaymentRequest {
    PaymentRequest::new(
        CustomerId(customer_id),
        PaymentTarget::ProjectAdvance(ProjectId(project_id)),
        amount,
    )
}

fn amc(customer_id: u32, project_id: u32, amount: Decimal) -> PaymentRequest {
    PaymentRequest::new(
        CustomerId(customer_id),
        PaymentTarget::Amc(ProjectId(project_id)),
        amount,
    )
}

fn renew(domain_id: u32, validity: NaiveDate, amount: Decimal, payer: RenewalPayer) -> RenewalRequest {
    RenewalRequest {
        domain_id: DomainId(domain_id),
        new_validity_date: validity,
        amount,
        payer,
    }
}

/// Customer 1 with a 10000 project (id 10).
fn onboarded() -> Engine {
    let engine = make_engine();
    engine
        .register_customer(Customer::new(CustomerId(1), "Acme"))
        .unwrap();
    engine
        .create_project(make_project(1, 10, dec!(10000)))
        .unwrap();
    engine
}

fn entries(engine: &Engine, customer_id: u32) -> Vec<agency_ledger::LedgerEntry> {
    engine
        .customer_ledger(CustomerId(customer_id), Order::OldestFirst, Page::all())
        .unwrap()
}

// =============================================================================
// Project obligations and advances
// =============================================================================

#[test]
fn project_creation_debits_customer() {
    let engine = onboarded();

    let entries = entries(&engine, 1);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::Debit);
    assert_eq!(entries[0].amount, dec!(10000));
    assert_eq!(entries[0].reference_type, ReferenceType::Project);
    assert_eq!(entries[0].reference_id, 10);
    assert_eq!(entries[0].balance_after, dec!(10000));

    let project = engine.lookup_project(ProjectId(10)).unwrap();
    assert_eq!(project.payment_status, PaymentStatus::Pending);
    assert_eq!(project.paid_amount, Decimal::ZERO);
}

#[test]
fn partial_advance_leaves_net_obligation() {
    let engine = onboarded();
    let payment = engine.record_payment(advance(1, 10, dec!(4000))).unwrap();

    assert_eq!(payment.purpose, PaymentPurpose::ProjectAdvance);
    assert_eq!(payment.status, PaymentState::Completed);
    assert_eq!(payment.reference_id, 10);

    let project = engine.lookup_project(ProjectId(10)).unwrap();
    assert_eq!(project.paid_amount, dec!(4000));
    assert_eq!(project.payment_status, PaymentStatus::Partial);

    let entries = entries(&engine, 1);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].kind, EntryKind::Credit);
    assert_eq!(entries[1].reference_type, ReferenceType::Advance);
    assert_eq!(entries[1].balance_after, dec!(6000));
    assert_eq!(engine.verify_balance(CustomerId(1)).unwrap(), dec!(6000));
}

#[test]
fn full_settlement_marks_project_paid() {
    let engine = onboarded();
    engine.record_payment(advance(1, 10, dec!(4000))).unwrap();
    engine.record_payment(advance(1, 10, dec!(6000))).unwrap();

    let project = engine.lookup_project(ProjectId(10)).unwrap();
    assert_eq!(project.payment_status, PaymentStatus::Paid);
    assert_eq!(project.outstanding(), Decimal::ZERO);
    assert_eq!(engine.recompute_balance(CustomerId(1)).unwrap(), Decimal::ZERO);
}

#[test]
fn overpayment_becomes_credit() {
    let engine = onboarded();
    engine.record_payment(advance(1, 10, dec!(12000))).unwrap();

    let project = engine.lookup_project(ProjectId(10)).unwrap();
    assert_eq!(project.payment_status, PaymentStatus::Paid);
    assert_eq!(project.paid_amount, dec!(12000));

    let summary = engine.payment_summary(CustomerId(1)).unwrap();
    assert_eq!(summary.balance, dec!(-2000));
    assert_eq!(summary.credit_balance, dec!(2000));
    assert_eq!(summary.outstanding_amount, Decimal::ZERO);
}

#[test]
fn custom_description_is_kept() {
    let engine = onboarded();
    let payment = engine
        .record_payment(advance(1, 10, dec!(100)).with_description("Cheque 0042"))
        .unwrap();

    assert_eq!(payment.description, "Cheque 0042");
    assert_eq!(entries(&engine, 1)[1].description, "Cheque 0042");
}

#[test]
fn create_project_rejects_bad_amounts() {
    let engine = make_engine();
    engine.register_customer(Customer::new(CustomerId(1), "Acme")).unwrap();

    assert_eq!(
        engine.create_project(make_project(1, 10, Decimal::ZERO)),
        Err(LedgerError::InvalidAmount)
    );
    let mut negative_amc = make_project(1, 10, dec!(100));
    negative_amc.amc_amount = Some(dec!(-1));
    assert_eq!(engine.create_project(negative_amc), Err(LedgerError::InvalidAmount));

    // Rejected ids stay available
    engine.create_project(make_project(1, 10, dec!(100))).unwrap();
    assert!(engine.store().project_owner(ProjectId(10)).is_ok());
}

#[test]
fn create_project_for_unknown_customer() {
    let engine = make_engine();
    assert_eq!(
        engine.create_project(make_project(9, 10, dec!(100))),
        Err(LedgerError::CustomerNotFound(CustomerId(9)))
    );
    assert!(engine.lookup_project(ProjectId(10)).is_err());
}

#[test]
fn duplicate_ids_are_conflicts() {
    let engine = onboarded();

    let err = engine
        .register_customer(Customer::new(CustomerId(1), "Again"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = engine
        .create_project(make_project(1, 10, dec!(5)))
        .unwrap_err();
    assert_eq!(err, LedgerError::DuplicateProject(ProjectId(10)));

    engine.register_domain(make_domain(10, 100, date(2026, 1, 1))).unwrap();
    assert_eq!(
        engine.register_domain(make_domain(10, 100, date(2026, 1, 1))),
        Err(LedgerError::DuplicateDomain(DomainId(100)))
    );
    assert_eq!(entries(&engine, 1).len(), 1);
}

#[test]
fn overflowing_obligation_is_rejected_and_id_released() {
    let engine = make_engine();
    engine.register_customer(Customer::new(CustomerId(1), "Acme")).unwrap();
    engine.register_customer(Customer::new(CustomerId(2), "Globex")).unwrap();
    engine.create_project(make_project(1, 1, Decimal::MAX)).unwrap();

    let err = engine
        .create_project(make_project(1, 2, Decimal::MAX))
        .unwrap_err();
    assert_eq!(err, LedgerError::AmountOverflow);
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        engine.lookup_project(ProjectId(2)),
        Err(LedgerError::ProjectNotFound(ProjectId(2)))
    );
    assert_eq!(entries(&engine, 1).len(), 1);
    assert_eq!(engine.verify_balance(CustomerId(1)).unwrap(), Decimal::MAX);

    // The failed id can still be used
    engine.create_project(make_project(2, 2, dec!(1))).unwrap();
}

#[test]
fn overflowing_paid_amount_is_rejected() {
    let engine = make_engine();
    engine.register_customer(Customer::new(CustomerId(1), "Acme")).unwrap();
    engine.create_project(make_project(1, 10, Decimal::MAX)).unwrap();
    engine.record_payment(advance(1, 10, Decimal::MAX)).unwrap();

    assert_eq!(
        engine.record_payment(advance(1, 10, dec!(1))),
        Err(LedgerError::AmountOverflow)
    );
    assert_eq!(engine.lookup_project(ProjectId(10)).unwrap().paid_amount, Decimal::MAX);
    assert_eq!(engine.customer_payments(CustomerId(1)).unwrap().len(), 1);
    assert_eq!(entries(&engine, 1).len(), 2);
    assert!(engine.audit().is_clean());
}

#[test]
fn summary_totals_report_overflow() {
    let engine = make_engine();
    engine.register_customer(Customer::new(CustomerId(1), "Acme")).unwrap();
    engine.create_project(make_project(1, 10, Decimal::MAX)).unwrap();
    engine.record_payment(advance(1, 10, Decimal::MAX)).unwrap();
    engine.create_project(make_project(1, 11, Decimal::MAX)).unwrap();

    assert_eq!(
        engine.payment_summary(CustomerId(1)),
        Err(LedgerError::AmountOverflow)
    );
}

// =============================================================================
// Payment validation
// =============================================================================

#[test]
fn non_positive_payment_has_no_side_effects() {
    let engine = onboarded();

    for amount in [Decimal::ZERO, dec!(-5)] {
        let err = engine.record_payment(advance(1, 10, amount)).unwrap_err();
        assert_eq!(err, LedgerError::InvalidAmount);
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert_eq!(entries(&engine, 1).len(), 1);
    assert!(engine.customer_payments(CustomerId(1)).unwrap().is_empty());
}

#[test]
fn payment_against_unknown_records() {
    let engine = onboarded();

    assert_eq!(
        engine.record_payment(advance(2, 10, dec!(5))),
        Err(LedgerError::CustomerNotFound(CustomerId(2)))
    );
    assert_eq!(
        engine.record_payment(advance(1, 99, dec!(5))),
        Err(LedgerError::ProjectNotFound(ProjectId(99)))
    );
    let err = engine
        .record_payment(PaymentRequest::new(
            CustomerId(1),
            PaymentTarget::DomainRenewal(DomainId(99)),
            dec!(5),
        ))
        .unwrap_err();
    assert_eq!(err, LedgerError::DomainNotFound(DomainId(99)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(entries(&engine, 1).len(), 1);
}

#[test]
fn payment_for_another_customers_project() {
    let engine = onboarded();
    engine.register_customer(Customer::new(CustomerId(2), "Globex")).unwrap();

    assert_eq!(
        engine.record_payment(advance(2, 10, dec!(100))),
        Err(LedgerError::CustomerMismatch)
    );
    assert!(entries(&engine, 2).is_empty());
    assert_eq!(engine.lookup_project(ProjectId(10)).unwrap().paid_amount, Decimal::ZERO);
}

// =============================================================================
// AMC schedule
// =============================================================================

fn with_amc_project() -> Engine {
    let engine = make_engine();
    engine.register_customer(Customer::new(CustomerId(1), "Acme")).unwrap();
    let mut project = make_project(1, 10, dec!(10000));
    project.amc_amount = Some(dec!(1200));
    engine.create_project(project).unwrap();
    engine
}

#[test]
fn completing_project_schedules_amc() {
    let engine = with_amc_project();
    let project = engine.complete_project(ProjectId(10), date(2024, 3, 1)).unwrap();

    assert_eq!(project.end_date, Some(date(2024, 3, 1)));
    assert_eq!(project.amc_due_date, Some(date(2025, 3, 1)));
    assert_eq!(
        engine.complete_project(ProjectId(10), date(2024, 4, 1)),
        Err(LedgerError::ProjectAlreadyCompleted(ProjectId(10)))
    );
}

#[test]
fn amc_payment_rolls_due_date_from_previous_due() {
    let engine = with_amc_project();
    engine.complete_project(ProjectId(10), date(2023, 6, 30)).unwrap();
    assert_eq!(
        engine.lookup_project(ProjectId(10)).unwrap().amc_due_date,
        Some(date(2024, 6, 30))
    );

    // Paid late (today is 2025-01-15); the schedule still advances from the due date.
    let payment = engine.record_payment(amc(1, 10, dec!(1200))).unwrap();
    assert_eq!(payment.purpose, PaymentPurpose::Amc);

    let project = engine.lookup_project(ProjectId(10)).unwrap();
    assert_eq!(project.amc_due_date, Some(date(2025, 6, 30)));
    // AMC payments do not count toward the project amount
    assert_eq!(project.paid_amount, Decimal::ZERO);

    let last = entries(&engine, 1).pop().unwrap();
    assert_eq!(last.kind, EntryKind::Credit);
    assert_eq!(last.reference_type, ReferenceType::Amc);
    assert_eq!(last.balance_after, dec!(8800));
}

#[test]
fn amc_due_date_on_leap_day() {
    let engine = with_amc_project();
    engine.complete_project(ProjectId(10), date(2024, 2, 29)).unwrap();

    assert_eq!(
        engine.lookup_project(ProjectId(10)).unwrap().amc_due_date,
        Some(date(2025, 2, 28))
    );
}

#[test]
fn amc_payment_requires_schedule() {
    let engine = with_amc_project();
    assert_eq!(
        engine.record_payment(amc(1, 10, dec!(1200))),
        Err(LedgerError::AmcNotStarted(ProjectId(10)))
    );

    engine.create_project(make_project(1, 11, dec!(500))).unwrap();
    engine.complete_project(ProjectId(11), date(2024, 1, 1)).unwrap();
    assert_eq!(
        engine.record_payment(amc(1, 11, dec!(100))),
        Err(LedgerError::AmcNotConfigured(ProjectId(11)))
    );
    assert_eq!(entries(&engine, 1).len(), 2);
}

#[test]
fn amc_due_list() {
    let engine = with_amc_project();
    engine.complete_project(ProjectId(10), date(2024, 1, 5)).unwrap();

    // Due 2025-06-01, 137 days out: beyond the 30-day horizon
    let mut distant = make_project(1, 11, dec!(500));
    distant.amc_amount = Some(dec!(50));
    engine.create_project(distant).unwrap();
    engine.complete_project(ProjectId(11), date(2024, 6, 1)).unwrap();

    // Not completed, not listed
    engine.create_project(make_project(1, 12, dec!(500))).unwrap();

    // Due exactly 30 days out, and 31 days out
    engine.create_project(make_project(1, 13, dec!(500))).unwrap();
    engine.complete_project(ProjectId(13), date(2024, 2, 14)).unwrap();
    engine.create_project(make_project(1, 14, dec!(500))).unwrap();
    engine.complete_project(ProjectId(14), date(2024, 2, 15)).unwrap();

    let due = engine.amc_due_projects(today());
    let ids: Vec<_> = due.iter().map(|d| d.project_id).collect();
    assert_eq!(ids, vec![ProjectId(10), ProjectId(13)]);

    assert_eq!(due[0].amc_due_date, date(2025, 1, 5));
    assert_eq!(due[0].days_until_amc, -10);
    assert!(due[0].is_overdue);
    assert_eq!(due[1].days_until_amc, 30);
    assert!(!due[1].is_overdue);
}

#[test]
fn amc_horizon_is_configurable() {
    let engine = make_engine_with(EngineConfig {
        amc_horizon_days: 365,
        ..EngineConfig::default()
    });
    engine.register_customer(Customer::new(CustomerId(1), "Acme")).unwrap();
    engine.create_project(make_project(1, 11, dec!(500))).unwrap();
    engine.complete_project(ProjectId(11), date(2024, 6, 1)).unwrap();

    let due = engine.amc_due_projects(today());
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].days_until_amc, 137);
}

#[test]
fn amc_payment_clears_overdue_in_due_list() {
    let engine = make_engine_with(EngineConfig {
        amc_horizon_days: 365,
        ..EngineConfig::default()
    });
    engine.register_customer(Customer::new(CustomerId(1), "Acme")).unwrap();
    let mut project = make_project(1, 10, dec!(10000));
    project.amc_amount = Some(dec!(1200));
    engine.create_project(project).unwrap();
    engine.complete_project(ProjectId(10), date(2023, 12, 20)).unwrap();

    let due = engine.amc_due_projects(today());
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].amc_due_date, date(2024, 12, 20));
    assert_eq!(due[0].days_until_amc, -26);
    assert!(due[0].is_overdue);

    engine.record_payment(amc(1, 10, dec!(1200))).unwrap();

    let due = engine.amc_due_projects(today());
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].end_date, date(2023, 12, 20));
    assert_eq!(due[0].amc_due_date, date(2025, 12, 20));
    assert_eq!(due[0].days_until_amc, 339);
    assert!(!due[0].is_overdue);
}

#[test]
fn paid_amc_leaves_default_due_list() {
    let engine = with_amc_project();
    engine.complete_project(ProjectId(10), date(2023, 12, 20)).unwrap();
    assert_eq!(engine.amc_due_projects(today()).len(), 1);

    engine.record_payment(amc(1, 10, dec!(1200))).unwrap();
    assert!(engine.amc_due_projects(today()).is_empty());
}

// =============================================================================
// Domain renewals
// =============================================================================

fn with_domain(validity: NaiveDate) -> Engine {
    let engine = onboarded();
    engine.register_domain(make_domain(10, 100, validity)).unwrap();
    engine
}

#[test]
fn register_domain_creates_no_entry() {
    let engine = with_domain(date(2025, 6, 1));

    let domain = engine.lookup_domain(DomainId(100)).unwrap();
    assert_eq!(domain.renewal_status, RenewalStatus::Active);
    assert_eq!(entries(&engine, 1).len(), 1);
    assert_eq!(
        engine.register_domain(make_domain(99, 101, date(2025, 6, 1))),
        Err(LedgerError::ProjectNotFound(ProjectId(99)))
    );
}

#[test]
fn agency_paid_renewal_debits_customer() {
    let engine = with_domain(date(2025, 1, 31));
    let outcome = engine
        .renew_domain(renew(100, date(2026, 1, 31), dec!(20), RenewalPayer::AgencyPaid))
        .unwrap();

    let entry = outcome.entry.unwrap();
    assert_eq!(entry.kind, EntryKind::Debit);
    assert_eq!(entry.reference_type, ReferenceType::DomainRenewal);
    assert_eq!(entry.balance_after, dec!(10020));
    assert_eq!(outcome.payment.status, PaymentState::Pending);
    assert_eq!(outcome.payment.purpose, PaymentPurpose::DomainRenewal);

    let domain = engine.lookup_domain(DomainId(100)).unwrap();
    assert_eq!(domain.validity_date, date(2026, 1, 31));
    assert_eq!(domain.renewal_amount, dec!(20));
    assert_eq!(domain.renewal_status, RenewalStatus::Renewed);

    // The customer repays the agency later
    engine
        .record_payment(PaymentRequest::new(
            CustomerId(1),
            PaymentTarget::DomainRenewal(DomainId(100)),
            dec!(20),
        ))
        .unwrap();
    assert_eq!(engine.verify_balance(CustomerId(1)).unwrap(), dec!(10000));
}

#[test]
fn client_paid_renewal_leaves_balance() {
    let engine = with_domain(date(2025, 1, 31));
    let outcome = engine
        .renew_domain(renew(100, date(2026, 1, 31), dec!(20), RenewalPayer::ClientPaid))
        .unwrap();

    assert!(outcome.entry.is_none());
    assert_eq!(outcome.payment.status, PaymentState::Completed);
    assert_eq!(entries(&engine, 1).len(), 1);
    assert_eq!(engine.verify_balance(CustomerId(1)).unwrap(), dec!(10000));
    assert_eq!(
        engine.lookup_domain(DomainId(100)).unwrap().renewal_status,
        RenewalStatus::Renewed
    );
}

#[test]
fn renewal_rejects_past_validity_by_default() {
    let engine = with_domain(date(2025, 1, 31));

    for validity in [today(), date(2024, 12, 31)] {
        let err = engine
            .renew_domain(renew(100, validity, dec!(20), RenewalPayer::AgencyPaid))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::ValidityNotInFuture {
                domain_id: DomainId(100),
                validity_date: validity,
                today: today(),
            }
        );
    }

    assert_eq!(entries(&engine, 1).len(), 1);
    assert_eq!(
        engine.lookup_domain(DomainId(100)).unwrap().validity_date,
        date(2025, 1, 31)
    );
}

#[test]
fn renewal_backdating_can_be_allowed() {
    let engine = make_engine_with(EngineConfig {
        require_future_validity: false,
        ..EngineConfig::default()
    });
    engine.register_customer(Customer::new(CustomerId(1), "Acme")).unwrap();
    engine.create_project(make_project(1, 10, dec!(100))).unwrap();
    engine.register_domain(make_domain(10, 100, date(2024, 1, 1))).unwrap();

    let outcome = engine
        .renew_domain(renew(100, date(2024, 12, 1), dec!(20), RenewalPayer::ClientPaid))
        .unwrap();
    assert_eq!(outcome.validity_date, date(2024, 12, 1));
}

#[test]
fn renewal_validation() {
    let engine = with_domain(date(2025, 1, 31));

    assert_eq!(
        engine.renew_domain(renew(100, date(2026, 1, 31), Decimal::ZERO, RenewalPayer::ClientPaid)),
        Err(LedgerError::InvalidAmount)
    );
    assert_eq!(
        engine.renew_domain(renew(7, date(2026, 1, 31), dec!(20), RenewalPayer::ClientPaid)),
        Err(LedgerError::DomainNotFound(DomainId(7)))
    );
    assert!(engine.customer_payments(CustomerId(1)).unwrap().is_empty());
}

#[test]
fn renewal_due_window() {
    let engine = onboarded();
    engine.register_domain(make_domain(10, 100, date(2025, 1, 25))).unwrap(); // +10
    engine.register_domain(make_domain(10, 101, date(2025, 1, 10))).unwrap(); // -5
    engine.register_domain(make_domain(10, 102, date(2025, 3, 16))).unwrap(); // +60
    engine.register_domain(make_domain(10, 103, date(2025, 2, 14))).unwrap(); // +30

    let due = engine.domains_due_renewal(today());
    let ids: Vec<_> = due.iter().map(|d| d.domain_id).collect();
    assert_eq!(ids, vec![DomainId(101), DomainId(100), DomainId(103)]);

    assert_eq!(due[0].days_remaining, -5);
    assert!(due[0].is_expired);
    assert_eq!(due[1].days_remaining, 10);
    assert!(!due[1].is_expired);
    assert_eq!(due[1].customer_id, CustomerId(1));
    assert_eq!(due[2].days_remaining, 30);
}

#[test]
fn domain_expiring_today_is_not_expired() {
    let engine = with_domain(today());
    let due = engine.domains_due_renewal(today());
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].days_remaining, 0);
    assert!(!due[0].is_expired);
}

// =============================================================================
// Summaries, history and events
// =============================================================================

#[test]
fn payment_summary_aggregates_projects() {
    let engine = onboarded();
    engine.create_project(make_project(1, 11, dec!(2000))).unwrap();
    engine.record_payment(advance(1, 10, dec!(4000))).unwrap();
    engine.record_payment(advance(1, 11, dec!(2500))).unwrap();

    let summary = engine.payment_summary(CustomerId(1)).unwrap();
    assert_eq!(summary.total_projects, 2);
    assert_eq!(summary.total_project_amount, dec!(12000));
    assert_eq!(summary.total_paid_amount, dec!(6500));
    // The 500 overpayment on project 11 does not offset project 10
    assert_eq!(summary.outstanding_amount, dec!(6000));
    assert_eq!(summary.balance, dec!(5500));
    assert_eq!(summary.credit_balance, dec!(-5500));

    assert_eq!(
        engine.payment_summary(CustomerId(5)),
        Err(LedgerError::CustomerNotFound(CustomerId(5)))
    );
}

#[test]
fn customer_balances_sorted_by_id() {
    let engine = onboarded();
    engine.register_customer(Customer::new(CustomerId(0), "Initech")).unwrap();

    let balances = engine.customer_balances();
    assert_eq!(balances.len(), 2);
    assert_eq!(balances[0].customer_id, CustomerId(0));
    assert_eq!(balances[0].balance, Decimal::ZERO);
    assert_eq!(balances[1].customer_name, "Acme");
    assert_eq!(balances[1].balance, dec!(10000));
}

#[test]
fn ledger_history_is_paged_newest_first() {
    let engine = onboarded();
    for amount in [dec!(1), dec!(2), dec!(3)] {
        engine.record_payment(advance(1, 10, amount)).unwrap();
    }

    let page = engine
        .customer_ledger(CustomerId(1), Order::NewestFirst, Page::new(0, 2))
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].amount, dec!(3));
    assert_eq!(page[0].balance_after, dec!(9994));

    let page = engine
        .customer_ledger(CustomerId(1), Order::NewestFirst, Page::new(1, 2))
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[1].amount, dec!(10000));

    assert!(
        engine
            .customer_ledger(CustomerId(1), Order::NewestFirst, Page::new(5, 2))
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        engine.customer_ledger(CustomerId(1), Order::NewestFirst, Page::new(0, 0)),
        Err(LedgerError::InvalidPage)
    );
    assert_eq!(engine.customer_ledger_page(CustomerId(1), 0).unwrap().len(), 4);
}

#[test]
fn entry_ids_are_unique_across_customers() {
    let engine = onboarded();
    engine.register_customer(Customer::new(CustomerId(2), "Globex")).unwrap();
    engine.create_project(make_project(2, 20, dec!(10))).unwrap();
    engine.record_payment(advance(1, 10, dec!(10))).unwrap();

    let mut ids: Vec<_> = entries(&engine, 1)
        .into_iter()
        .chain(entries(&engine, 2))
        .map(|e| e.id)
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[test]
fn committed_work_publishes_events() {
    let engine = onboarded();
    engine.register_domain(make_domain(10, 100, date(2025, 1, 31))).unwrap();
    engine.drain_events();

    engine
        .renew_domain(renew(100, date(2026, 1, 31), dec!(20), RenewalPayer::AgencyPaid))
        .unwrap();
    let events = engine.drain_events();

    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], LedgerEvent::EntryAppended(e) if e.amount == dec!(20)));
    assert!(matches!(&events[1], LedgerEvent::PaymentRecorded(p) if p.status == PaymentState::Pending));
    assert!(matches!(
        &events[2],
        LedgerEvent::DomainRenewed { domain_id: DomainId(100), .. }
    ));

    // Failed work publishes nothing
    let _ = engine.record_payment(advance(1, 10, dec!(-1)));
    assert!(engine.drain_events().is_empty());
}

#[test]
fn audit_is_clean_after_mixed_activity() {
    let engine = with_domain(date(2025, 1, 31));
    engine.record_payment(advance(1, 10, dec!(2500.50))).unwrap();
    engine
        .renew_domain(renew(100, date(2026, 1, 31), dec!(19.99), RenewalPayer::AgencyPaid))
        .unwrap();

    let report = engine.audit();
    assert_eq!(report.checked, 1);
    assert!(report.is_clean());
    assert_eq!(engine.verify_balance(CustomerId(1)).unwrap(), dec!(7519.49));
}
