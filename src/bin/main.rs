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

use agency_ledger::{
    Clock, Customer, CustomerId, DomainId, Engine, EngineConfig, FixedClock, LedgerError,
    NewDomain, NewProject, PaymentRequest, PaymentTarget, ProjectId, RenewalPayer,
    RenewalRequest, SystemClock,
};
use chrono::NaiveDate;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Agency Ledger - Replay settlement operations from a CSV file
///
/// Reads onboarding, payment and renewal operations from a CSV file and
/// writes each customer's payment summary to stdout.
#[derive(Parser, Debug)]
#[command(name = "agency-ledger")]
#[command(about = "Replays ledger operations and prints customer payment summaries", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,customer,project,domain,amount,amc,date,payer,name
    /// Example: cargo run -- operations.csv > summaries.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Treat this date as today (YYYY-MM-DD) instead of the system date
    #[arg(long, value_name = "DATE")]
    today: Option<NaiveDate>,

    /// Reconcile every customer's balance before writing output
    #[arg(long)]
    audit: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "agency_ledger=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = EngineConfig::load().unwrap_or_else(|e| {
        warn!("Ignoring invalid configuration: {}", e);
        EngineConfig::default()
    });
    let clock: Arc<dyn Clock> = match args.today {
        Some(today) => Arc::new(FixedClock::at_date(today)),
        None => Arc::new(SystemClock),
    };
    let engine = Engine::with_config(config, clock);

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    if let Err(e) = process_operations(&engine, BufReader::new(file)) {
        error!("Error processing operations: {}", e);
        process::exit(1);
    }

    if args.audit {
        let report = engine.audit();
        if !report.is_clean() {
            error!(
                "Audit found {} violation(s) across {} customer(s)",
                report.violations.len(),
                report.checked
            );
            process::exit(2);
        }
    }

    if let Err(e) = write_summaries(&engine, std::io::stdout()) {
        error!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, customer, project, domain, amount, amc, date, payer, name`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    customer: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    project: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    domain: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amc: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    payer: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    name: Option<String>,
}

#[derive(Debug)]
enum Operation {
    Customer(Customer),
    Project(NewProject),
    Complete(ProjectId, NaiveDate),
    Domain(NewDomain),
    Payment(PaymentRequest),
    Renew(RenewalRequest),
}

impl CsvRecord {
    /// Converts a CSV record into an operation.
    ///
    /// Returns `Ok(None)` for unknown operation names.
    fn into_operation(self) -> Result<Option<Operation>, LedgerError> {
        let customer = || self.customer.map(CustomerId).ok_or(LedgerError::MissingField("customer"));
        let project = || self.project.map(ProjectId).ok_or(LedgerError::MissingField("project"));
        let domain = || self.domain.map(DomainId).ok_or(LedgerError::MissingField("domain"));
        let amount = || self.amount.ok_or(LedgerError::MissingField("amount"));
        let date = || self.date.ok_or(LedgerError::MissingField("date"));

        let operation = match self.op.to_lowercase().as_str() {
            "customer" => {
                let id = customer()?;
                let name = self.name.clone().unwrap_or_else(|| format!("Customer {id}"));
                Operation::Customer(Customer::new(id, name))
            }
            "project" => {
                let id = project()?;
                Operation::Project(NewProject {
                    id,
                    customer_id: customer()?,
                    name: self.name.clone().unwrap_or_else(|| format!("Project {id}")),
                    amount: amount()?,
                    amc_amount: self.amc,
                    end_date: self.date,
                })
            }
            "complete" => Operation::Complete(project()?, date()?),
            "domain" => {
                let id = domain()?;
                Operation::Domain(NewDomain {
                    id,
                    project_id: project()?,
                    name: self.name.clone().unwrap_or_else(|| format!("domain-{id}")),
                    validity_date: date()?,
                    renewal_amount: self.amount.unwrap_or(Decimal::ZERO),
                })
            }
            "advance" => Operation::Payment(PaymentRequest::new(
                customer()?,
                PaymentTarget::ProjectAdvance(project()?),
                amount()?,
            )),
            "amc" => Operation::Payment(PaymentRequest::new(
                customer()?,
                PaymentTarget::Amc(project()?),
                amount()?,
            )),
            "repay_renewal" => Operation::Payment(PaymentRequest::new(
                customer()?,
                PaymentTarget::DomainRenewal(domain()?),
                amount()?,
            )),
            "renew" => {
                let payer = match self.payer.as_deref().map(str::to_lowercase).as_deref() {
                    Some("client") => RenewalPayer::ClientPaid,
                    Some("agency") => RenewalPayer::AgencyPaid,
                    _ => return Err(LedgerError::MissingField("payer")),
                };
                Operation::Renew(RenewalRequest {
                    domain_id: domain()?,
                    new_validity_date: date()?,
                    amount: amount()?,
                    payer,
                })
            }
            _ => return Ok(None),
        };
        Ok(Some(operation))
    }
}

fn apply(engine: &Engine, operation: Operation) -> Result<(), LedgerError> {
    match operation {
        Operation::Customer(customer) => engine.register_customer(customer),
        Operation::Project(project) => engine.create_project(project).map(|_| ()),
        Operation::Complete(project_id, end_date) => {
            engine.complete_project(project_id, end_date).map(|_| ())
        }
        Operation::Domain(domain) => engine.register_domain(domain).map(|_| ()),
        Operation::Payment(request) => engine.record_payment(request).map(|_| ()),
        Operation::Renew(request) => engine.renew_domain(request).map(|_| ()),
    }
}

/// Replays operations from a CSV reader into `engine`.
///
/// Rows are streamed. Malformed rows, unknown operations and rejected
/// operations are logged and skipped.
///
/// # CSV Format
///
/// ```csv
/// op,customer,project,domain,amount,amc,date,payer,name
/// customer,1,,,,,,,Acme
/// project,1,10,,10000,2000,2024-03-15,,Online store
/// advance,1,10,,4000,,,,
/// domain,,10,100,15,,2025-01-31,,acme.com
/// renew,,,100,15,,2026-01-31,agency,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
pub fn process_operations<R: Read>(engine: &Engine, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let row = line + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row, "Skipping malformed row: {}", e);
                continue;
            }
        };

        let op = record.op.clone();
        match record.into_operation() {
            Ok(Some(operation)) => {
                if let Err(e) = apply(engine, operation) {
                    warn!(row, op = %op, "Skipping rejected operation: {}", e);
                }
            }
            Ok(None) => warn!(row, op = %op, "Skipping unknown operation"),
            Err(e) => warn!(row, op = %op, "Skipping incomplete row: {}", e),
        }
    }

    Ok(())
}

/// Writes every customer's payment summary as CSV.
///
/// # CSV Format
///
/// ```csv
/// customer_id,total_projects,total_project_amount,total_paid_amount,outstanding_amount,credit_balance,balance
/// 1,1,10000,4000,6000,-6000,6000
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails or a summary cannot be computed.
pub fn write_summaries<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for balance in engine.customer_balances() {
        let summary = engine
            .payment_summary(balance.customer_id)
            .map_err(|e| csv::Error::from(io::Error::other(e)))?;
        wtr.serialize(&summary)?;
    }

    wtr.flush()?;
    Ok(())
}
