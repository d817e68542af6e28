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

//! Concurrent per-customer storage.
//!
//! Each customer owns a [`Book`]: the append-only [`Ledger`] together with the
//! customer's projects, domains and payment records. Every mutation goes
//! through [`LedgerStore::transact`], which
//!
//! 1. acquires the customer's writer lock with a bounded wait
//!    ([`LedgerError::ConcurrencyConflict`] on timeout),
//! 2. runs the caller's work against a [`UnitOfWork`] that stages entries,
//!    record updates and payments on top of the committed snapshot,
//! 3. publishes all staged changes under one short write lock, or nothing at
//!    all if the work returned an error,
//! 4. pushes the resulting [`LedgerEvent`]s onto the lock-free queue and
//!    releases the writer lock.
//!
//! Readers take the book's read lock and therefore always see either all or
//! none of a unit of work. Different customers never contend.

use crate::LedgerError;
use crate::base::{CustomerId, DomainId, EntryId, PaymentId, ProjectId};
use crate::clock::Clock;
use crate::entry::{LedgerEntry, Posting};
use crate::events::{EventQueue, LedgerEvent};
use crate::ledger::{Ledger, Order, Page};
use crate::records::{
    Customer, Domain, Payment, PaymentPurpose, PaymentState, Project,
};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Committed state of one customer.
#[derive(Debug)]
pub struct Book {
    customer: Customer,
    ledger: Ledger,
    projects: BTreeMap<ProjectId, Project>,
    domains: BTreeMap<DomainId, Domain>,
    payments: Vec<Payment>,
}

impl Book {
    fn new(customer: Customer) -> Self {
        Self {
            ledger: Ledger::new(customer.id),
            customer,
            projects: BTreeMap::new(),
            domains: BTreeMap::new(),
            payments: Vec::new(),
        }
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn domain(&self, id: DomainId) -> Option<&Domain> {
        self.domains.get(&id)
    }

    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.domains.values()
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// Publishes staged changes. Cannot fail: everything was validated while staging.
    fn apply(&mut self, staged: Staged) -> Vec<LedgerEvent> {
        for entry in staged.entries {
            self.ledger.push(entry);
        }
        self.projects.extend(staged.projects);
        self.domains.extend(staged.domains);
        self.payments.extend(staged.payments);
        staged.events
    }

    #[cfg(test)]
    pub(crate) fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }
}

#[derive(Debug)]
struct CustomerBook {
    /// Serializes writers. Held for the whole unit of work.
    writer: Mutex<()>,
    state: RwLock<Book>,
}

#[derive(Debug, Default)]
struct Staged {
    entries: Vec<LedgerEntry>,
    projects: BTreeMap<ProjectId, Project>,
    domains: BTreeMap<DomainId, Domain>,
    payments: Vec<Payment>,
    events: Vec<LedgerEvent>,
}

/// Staged changes for one customer, committed atomically by [`LedgerStore::transact`].
///
/// Reads see the committed snapshot overlaid with this unit's own staged writes.
pub struct UnitOfWork<'a> {
    store: &'a LedgerStore,
    book: &'a Book,
    balance: Decimal,
    now: DateTime<Utc>,
    staged: Staged,
}

impl<'a> UnitOfWork<'a> {
    pub fn customer_id(&self) -> CustomerId {
        self.book.customer.id
    }

    /// Time of the unit of work, fixed when it started.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Balance including entries staged so far.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Stages an entry chained onto the current balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Posting amount is not positive.
    /// - [`LedgerError::AmountOverflow`] - The new balance leaves the decimal range.
    pub fn append(&mut self, posting: Posting) -> Result<LedgerEntry, LedgerError> {
        posting.validate()?;
        let id = EntryId(self.store.entry_sequence.fetch_add(1, Ordering::Relaxed));
        let entry = Ledger::chain_entry(self.customer_id(), self.balance, posting, id, self.now)?;
        self.balance = entry.balance_after;
        self.staged.entries.push(entry.clone());
        self.staged
            .events
            .push(LedgerEvent::EntryAppended(entry.clone()));
        Ok(entry)
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::ProjectNotFound`] if the project is not in this customer's book.
    pub fn project(&self, id: ProjectId) -> Result<Project, LedgerError> {
        self.staged
            .projects
            .get(&id)
            .or_else(|| self.book.projects.get(&id))
            .cloned()
            .ok_or(LedgerError::ProjectNotFound(id))
    }

    pub fn contains_project(&self, id: ProjectId) -> bool {
        self.staged.projects.contains_key(&id) || self.book.projects.contains_key(&id)
    }

    /// Stages a new or updated project.
    pub fn put_project(&mut self, project: Project) {
        debug_assert_eq!(project.customer_id, self.customer_id());
        self.staged.projects.insert(project.id, project);
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::DomainNotFound`] if the domain is not in this customer's book.
    pub fn domain(&self, id: DomainId) -> Result<Domain, LedgerError> {
        self.staged
            .domains
            .get(&id)
            .or_else(|| self.book.domains.get(&id))
            .cloned()
            .ok_or(LedgerError::DomainNotFound(id))
    }

    pub fn contains_domain(&self, id: DomainId) -> bool {
        self.staged.domains.contains_key(&id) || self.book.domains.contains_key(&id)
    }

    /// Stages a new or updated domain.
    pub fn put_domain(&mut self, domain: Domain) {
        self.staged.domains.insert(domain.id, domain);
    }

    /// Stages a payment record and returns it with its assigned id.
    pub fn record_payment(
        &mut self,
        purpose: PaymentPurpose,
        reference_id: u32,
        amount: Decimal,
        status: PaymentState,
        description: impl Into<String>,
    ) -> Payment {
        let payment = Payment {
            id: PaymentId(self.store.payment_sequence.fetch_add(1, Ordering::Relaxed)),
            customer_id: self.customer_id(),
            purpose,
            reference_id,
            amount,
            status,
            description: description.into(),
            created_at: self.now,
        };
        self.staged.payments.push(payment.clone());
        self.staged
            .events
            .push(LedgerEvent::PaymentRecorded(payment.clone()));
        payment
    }

    /// Queues an event for publication after commit.
    pub fn publish(&mut self, event: LedgerEvent) {
        self.staged.events.push(event);
    }
}

/// Thread-safe store of customer books.
///
/// Lookups by project or domain id go through owner indexes, so a caller
/// holding only a domain id can find (and lock) the owning customer.
pub struct LedgerStore {
    books: DashMap<CustomerId, Arc<CustomerBook>>,
    project_owners: DashMap<ProjectId, CustomerId>,
    domain_owners: DashMap<DomainId, CustomerId>,
    entry_sequence: AtomicU64,
    payment_sequence: AtomicU64,
    clock: Arc<dyn Clock>,
    events: EventQueue,
    lock_timeout: Duration,
}

impl LedgerStore {
    pub fn new(clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
        Self {
            books: DashMap::new(),
            project_owners: DashMap::new(),
            domain_owners: DashMap::new(),
            entry_sequence: AtomicU64::new(1),
            payment_sequence: AtomicU64::new(1),
            clock,
            events: EventQueue::new(),
            lock_timeout,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Registers a customer with an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateCustomer`] if the id is taken.
    pub fn register_customer(&self, customer: Customer) -> Result<(), LedgerError> {
        match self.books.entry(customer.id) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateCustomer(customer.id)),
            Entry::Vacant(entry) => {
                debug!(customer = %customer.id, "customer registered");
                entry.insert(Arc::new(CustomerBook {
                    writer: Mutex::new(()),
                    state: RwLock::new(Book::new(customer)),
                }));
                Ok(())
            }
        }
    }

    /// Claims a project id for `owner` so it cannot be created twice.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateProject`] if the id is already claimed.
    pub fn claim_project(&self, id: ProjectId, owner: CustomerId) -> Result<(), LedgerError> {
        match self.project_owners.entry(id) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateProject(id)),
            Entry::Vacant(entry) => {
                entry.insert(owner);
                Ok(())
            }
        }
    }

    /// Gives back a claim whose unit of work failed.
    pub fn release_project(&self, id: ProjectId) {
        self.project_owners.remove(&id);
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateDomain`] if the id is already claimed.
    pub fn claim_domain(&self, id: DomainId, owner: CustomerId) -> Result<(), LedgerError> {
        match self.domain_owners.entry(id) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateDomain(id)),
            Entry::Vacant(entry) => {
                entry.insert(owner);
                Ok(())
            }
        }
    }

    pub fn release_domain(&self, id: DomainId) {
        self.domain_owners.remove(&id);
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::ProjectNotFound`] for unknown ids.
    pub fn project_owner(&self, id: ProjectId) -> Result<CustomerId, LedgerError> {
        self.project_owners
            .get(&id)
            .map(|owner| *owner)
            .ok_or(LedgerError::ProjectNotFound(id))
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::DomainNotFound`] for unknown ids.
    pub fn domain_owner(&self, id: DomainId) -> Result<CustomerId, LedgerError> {
        self.domain_owners
            .get(&id)
            .map(|owner| *owner)
            .ok_or(LedgerError::DomainNotFound(id))
    }

    fn book(&self, customer_id: CustomerId) -> Result<Arc<CustomerBook>, LedgerError> {
        // Clone the Arc out so no shard guard is held while locking the book.
        self.books
            .get(&customer_id)
            .map(|book| Arc::clone(&book))
            .ok_or(LedgerError::CustomerNotFound(customer_id))
    }

    /// Runs `work` as one atomic unit for `customer_id`.
    ///
    /// Either every entry, record update and payment staged by `work` becomes
    /// visible at once, or (when `work` fails) none of it does.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CustomerNotFound`] - Unknown customer.
    /// - [`LedgerError::ConcurrencyConflict`] - Writer lock not acquired within the timeout.
    /// - Any error returned by `work`.
    pub fn transact<T, F>(&self, customer_id: CustomerId, work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, LedgerError>,
    {
        let book = self.book(customer_id)?;
        let Some(writer) = book.writer.try_lock_for(self.lock_timeout) else {
            warn!(
                customer = %customer_id,
                timeout_ms = self.lock_timeout.as_millis() as u64,
                "customer lock wait exceeded"
            );
            return Err(LedgerError::ConcurrencyConflict(customer_id));
        };

        let (value, staged) = {
            let snapshot = book.state.read();
            let mut unit = UnitOfWork {
                store: self,
                book: &snapshot,
                balance: snapshot.ledger.balance(),
                now: self.clock.now(),
                staged: Staged::default(),
            };
            let value = work(&mut unit)?;
            (value, unit.staged)
        };

        let entries = staged.entries.len();
        let events = book.state.write().apply(staged);
        // Still under the writer lock so the queue follows commit order.
        self.events.publish(events);
        drop(writer);
        debug!(customer = %customer_id, entries, "unit of work committed");

        Ok(value)
    }

    /// Runs `read` against a consistent snapshot of one customer's book.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CustomerNotFound`] for unknown customers.
    pub fn read<T>(
        &self,
        customer_id: CustomerId,
        read: impl FnOnce(&Book) -> T,
    ) -> Result<T, LedgerError> {
        let book = self.book(customer_id)?;
        let snapshot = book.state.read();
        Ok(read(&*snapshot))
    }

    /// Visits every book in customer id order, each under its own read lock.
    pub fn for_each_book(&self, mut visit: impl FnMut(&Book)) {
        let mut books: Vec<(CustomerId, Arc<CustomerBook>)> = self
            .books
            .iter()
            .map(|book| (*book.key(), Arc::clone(book.value())))
            .collect();
        books.sort_by_key(|(id, _)| *id);
        for (_, book) in books {
            visit(&*book.state.read());
        }
    }

    pub fn customer_ids(&self) -> Vec<CustomerId> {
        let mut ids: Vec<CustomerId> = self.books.iter().map(|book| *book.key()).collect();
        ids.sort();
        ids
    }

    /// Appends a single entry for a customer.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Amount is not positive (checked before locking).
    /// - [`LedgerError::CustomerNotFound`] - Unknown customer.
    /// - [`LedgerError::ConcurrencyConflict`] - Writer lock wait exceeded.
    pub fn append(
        &self,
        customer_id: CustomerId,
        posting: Posting,
    ) -> Result<LedgerEntry, LedgerError> {
        posting.validate()?;
        self.transact(customer_id, |unit| unit.append(posting))
    }

    /// Lists a customer's entries in insertion order or its reverse.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CustomerNotFound`] - Unknown customer.
    /// - [`LedgerError::InvalidPage`] - Zero page size.
    pub fn list(
        &self,
        customer_id: CustomerId,
        order: Order,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.read(customer_id, |book| book.ledger.page(order, page))?
    }

    /// The cached running balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CustomerNotFound`] for unknown customers.
    pub fn cached_balance(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError> {
        self.read(customer_id, |book| book.ledger.balance())
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::CustomerNotFound`] for unknown customers.
    pub fn lookup_customer(&self, customer_id: CustomerId) -> Result<Customer, LedgerError> {
        self.read(customer_id, |book| book.customer.clone())
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::ProjectNotFound`] for unknown projects.
    pub fn lookup_project(&self, id: ProjectId) -> Result<Project, LedgerError> {
        let owner = self.project_owner(id)?;
        self.read(owner, |book| book.project(id).cloned())?
            .ok_or(LedgerError::ProjectNotFound(id))
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::DomainNotFound`] for unknown domains.
    pub fn lookup_domain(&self, id: DomainId) -> Result<Domain, LedgerError> {
        let owner = self.domain_owner(id)?;
        self.read(owner, |book| book.domain(id).cloned())?
            .ok_or(LedgerError::DomainNotFound(id))
    }

    #[cfg(test)]
    pub(crate) fn with_book_mut(&self, customer_id: CustomerId, mutate: impl FnOnce(&mut Book)) {
        if let Ok(book) = self.book(customer_id) {
            mutate(&mut *book.state.write());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::entry::{EntryKind, ReferenceType};
    use rust_decimal_macros::dec;

    fn store() -> LedgerStore {
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        let store = LedgerStore::new(Arc::new(clock), Duration::from_millis(50));
        store
            .register_customer(Customer::new(CustomerId(1), "Acme"))
            .unwrap();
        store
    }

    #[test]
    fn append_chains_and_lists() {
        let store = store();
        store
            .append(
                CustomerId(1),
                Posting::debit(dec!(500), "Website", ReferenceType::Project, 1),
            )
            .unwrap();
        let entry = store
            .append(
                CustomerId(1),
                Posting::credit(dec!(200), "Advance", ReferenceType::Advance, 1),
            )
            .unwrap();

        assert_eq!(entry.balance_after, dec!(300));
        assert_eq!(store.cached_balance(CustomerId(1)).unwrap(), dec!(300));

        let newest = store
            .list(CustomerId(1), Order::NewestFirst, Page::new(0, 10))
            .unwrap();
        assert_eq!(newest[0].kind, EntryKind::Credit);
        assert_eq!(newest[1].kind, EntryKind::Debit);
    }

    #[test]
    fn append_to_unknown_customer_fails() {
        let store = store();
        let result = store.append(
            CustomerId(9),
            Posting::debit(dec!(1), "x", ReferenceType::Project, 1),
        );
        assert_eq!(result, Err(LedgerError::CustomerNotFound(CustomerId(9))));
    }

    #[test]
    fn failed_unit_of_work_leaves_no_trace() {
        let store = store();
        let result: Result<(), LedgerError> = store.transact(CustomerId(1), |unit| {
            unit.append(Posting::debit(dec!(100), "a", ReferenceType::Project, 1))?;
            unit.record_payment(
                PaymentPurpose::ProjectAdvance,
                1,
                dec!(100),
                PaymentState::Completed,
                "p",
            );
            Err(LedgerError::InvalidAmount)
        });

        assert_eq!(result, Err(LedgerError::InvalidAmount));
        store
            .read(CustomerId(1), |book| {
                assert!(book.ledger().is_empty());
                assert!(book.payments().is_empty());
            })
            .unwrap();
        assert!(store.events().is_empty());
    }

    #[test]
    fn unit_of_work_sees_its_own_staged_balance() {
        let store = store();
        store
            .transact(CustomerId(1), |unit| {
                unit.append(Posting::debit(dec!(100), "a", ReferenceType::Project, 1))?;
                assert_eq!(unit.balance(), dec!(100));
                let second =
                    unit.append(Posting::credit(dec!(40), "b", ReferenceType::Advance, 1))?;
                assert_eq!(second.balance_after, dec!(60));
                Ok(())
            })
            .unwrap();

        assert_eq!(store.cached_balance(CustomerId(1)).unwrap(), dec!(60));
        assert_eq!(store.events().drain().len(), 2);
    }

    #[test]
    fn duplicate_registrations_conflict() {
        let store = store();
        assert_eq!(
            store.register_customer(Customer::new(CustomerId(1), "Again")),
            Err(LedgerError::DuplicateCustomer(CustomerId(1)))
        );

        store.claim_project(ProjectId(5), CustomerId(1)).unwrap();
        assert_eq!(
            store.claim_project(ProjectId(5), CustomerId(1)),
            Err(LedgerError::DuplicateProject(ProjectId(5)))
        );
        store.release_project(ProjectId(5));
        assert!(store.claim_project(ProjectId(5), CustomerId(1)).is_ok());
    }

    #[test]
    fn held_writer_lock_times_out_as_conflict() {
        let store = store();
        let book = store.book(CustomerId(1)).unwrap();
        let _held = book.writer.lock();

        let result = store.append(
            CustomerId(1),
            Posting::debit(dec!(1), "x", ReferenceType::Project, 1),
        );
        assert_eq!(result, Err(LedgerError::ConcurrencyConflict(CustomerId(1))));
        assert!(result.unwrap_err().is_retryable());
    }

    #[test]
    fn reads_do_not_need_the_writer_lock() {
        let store = store();
        let book = store.book(CustomerId(1)).unwrap();
        let _held = book.writer.lock();

        assert_eq!(store.cached_balance(CustomerId(1)).unwrap(), Decimal::ZERO);
    }
}
