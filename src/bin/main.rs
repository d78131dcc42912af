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

use chrono::{DateTime, TimeDelta, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use loyalty_ledger::code::DEFAULT_CODE_LENGTH;
use loyalty_ledger::{
    CampaignId, Code, CompanyId, ConfigError, Engine, LedgerConfig, LedgerError, NewCampaign,
    RewardId, Role,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Loyalty Ledger - Replay loyalty operations from a CSV file
///
/// Reads catalog, voucher and claim operations from a CSV file and outputs
/// shopper balances to stdout.
#[derive(Parser, Debug)]
#[command(name = "loyalty-ledger")]
#[command(about = "A loyalty points ledger that replays operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,ref,target,phone,name,amount,points,start,end
    /// Example: cargo run -- operations.csv > shoppers.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Also write the credit/debit journal as CSV to this path
    #[arg(long, value_name = "OUT")]
    journal: Option<PathBuf>,

    /// Dashboard role performing staff operations
    #[arg(long, default_value = "owner")]
    role: Role,

    /// Characters per generated code
    #[arg(long, env = "LEDGER_CODE_LENGTH", default_value_t = DEFAULT_CODE_LENGTH)]
    code_length: usize,

    /// Collisions tolerated while minting one code, 0 for no limit
    #[arg(long, env = "LEDGER_MAX_MINT_ATTEMPTS", default_value_t = LedgerConfig::DEFAULT_MAX_MINT_ATTEMPTS)]
    max_mint_attempts: u32,

    /// Longest wait for the store lock, in milliseconds
    #[arg(long, env = "LEDGER_LOCK_TIMEOUT_MS", default_value_t = LedgerConfig::DEFAULT_LOCK_TIMEOUT_MS)]
    lock_timeout_ms: u64,

    /// Chat bot number used in voucher claim links
    #[arg(long, env = "LEDGER_BOT_NUMBER")]
    bot_number: Option<String>,
}

impl Args {
    fn config(&self) -> Result<LedgerConfig, ConfigError> {
        LedgerConfig {
            code_length: self.code_length,
            max_mint_attempts: (self.max_mint_attempts > 0).then_some(self.max_mint_attempts),
            lock_timeout_ms: self.lock_timeout_ms,
            bot_number: self.bot_number.clone(),
        }
        .validate()
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LEDGER_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), error = %e, "cannot open input");
            process::exit(1);
        }
    };

    let config = match args.config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            process::exit(2);
        }
    };

    let engine = Engine::with_config(config);
    let applied = match process_operations(&engine, args.role, BufReader::new(file)) {
        Ok(applied) => applied,
        Err(e) => {
            error!(error = %e, "cannot process operations");
            process::exit(1);
        }
    };
    info!(applied, "operations replayed");

    if let Err(e) = write_shoppers(&engine, std::io::stdout()) {
        error!(error = %e, "cannot write shoppers");
        process::exit(1);
    }

    if let Some(path) = &args.journal {
        if let Err(e) = write_journal(&engine, path) {
            error!(path = %path.display(), error = %e, "cannot write journal");
            process::exit(1);
        }
    }
}

/// Raw CSV record matching the input format.
///
/// Only `type` is required; which other columns matter depends on it.
#[derive(Debug, Default, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op: String,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    points: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    start: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    end: Option<DateTime<Utc>>,
}

impl CsvRecord {
    fn reference(&self) -> Result<&str, RowError> {
        self.reference.as_deref().ok_or(RowError::Missing("ref"))
    }

    fn target(&self) -> Result<&str, RowError> {
        self.target.as_deref().ok_or(RowError::Missing("target"))
    }

    fn phone(&self) -> Result<&str, RowError> {
        self.phone.as_deref().ok_or(RowError::Missing("phone"))
    }

    fn name(&self) -> Result<&str, RowError> {
        self.name.as_deref().ok_or(RowError::Missing("name"))
    }
}

#[derive(Debug, Error)]
enum RowError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("unknown reference: {0}")]
    UnknownRef(String),
    #[error("missing field: {0}")]
    Missing(&'static str),
    #[error("role {0} may not perform this operation")]
    Forbidden(Role),
}

/// Row labels bound to the records they created.
#[derive(Debug, Default)]
struct Labels {
    companies: HashMap<String, CompanyId>,
    campaigns: HashMap<String, CampaignId>,
    rewards: HashMap<String, RewardId>,
    vouchers: HashMap<String, Code>,
    claims: HashMap<String, Code>,
}

fn lookup<T: Clone>(labels: &HashMap<String, T>, key: &str) -> Result<T, RowError> {
    labels
        .get(key)
        .cloned()
        .ok_or_else(|| RowError::UnknownRef(key.to_owned()))
}

/// Resolves a label to a code, treating unknown labels as literal codes.
fn code_for(labels: &HashMap<String, Code>, key: &str) -> Code {
    labels.get(key).cloned().unwrap_or_else(|| Code::from(key))
}

struct Driver<'a> {
    engine: &'a Engine,
    role: Role,
    labels: Labels,
}

impl Driver<'_> {
    /// Applies one row. Every field a row needs is read before the engine is
    /// called, so a rejected row leaves no trace in the ledger.
    fn apply(&mut self, record: &CsvRecord) -> Result<(), RowError> {
        let engine = self.engine;
        match record.op.to_lowercase().as_str() {
            "company" => {
                let label = record.reference()?;
                let company = engine.register_company(record.name()?, None)?;
                self.labels.companies.insert(label.to_owned(), company.id);
            }
            "campaign" => {
                let owner = self.role.owner().ok_or(RowError::Forbidden(self.role))?;
                let label = record.reference()?;
                let now = Utc::now();
                let campaign = NewCampaign {
                    company_id: lookup(&self.labels.companies, record.target()?)?,
                    title: record.name()?.to_owned(),
                    start_date: record.start.unwrap_or(now - TimeDelta::days(1)),
                    end_date: record.end.unwrap_or(now + TimeDelta::days(365)),
                    min_points: record.points,
                    spend_per_point: record.amount.ok_or(RowError::Missing("amount"))?,
                    description: None,
                };
                let campaign = engine.create_campaign(&owner, campaign)?;
                self.labels.campaigns.insert(label.to_owned(), campaign.id);
            }
            "reward" => {
                let staff = self.role.staff().ok_or(RowError::Forbidden(self.role))?;
                let label = record.reference()?;
                let campaign = lookup(&self.labels.campaigns, record.target()?)?;
                let title = record.name()?;
                let cost = record.points.ok_or(RowError::Missing("points"))?;
                let reward = engine.create_reward(&staff, campaign, title, cost)?;
                self.labels.rewards.insert(label.to_owned(), reward.id);
            }
            "shopper" => {
                let (phone, name) = (record.phone()?, record.name()?);
                engine.register_shopper(phone, name)?;
            }
            "voucher" => {
                let staff = self.role.staff().ok_or(RowError::Forbidden(self.role))?;
                let label = record.reference()?;
                let campaign = lookup(&self.labels.campaigns, record.target()?)?;
                let spend = record.amount.ok_or(RowError::Missing("amount"))?;
                let issued = engine.issue_voucher(&staff, campaign, spend)?;
                debug!(code = %issued.voucher.code, "{}", issued.notice.message);
                self.labels.vouchers.insert(label.to_owned(), issued.voucher.code);
            }
            "redeem" => {
                let code = code_for(&self.labels.vouchers, record.target()?);
                let phone = record.phone()?;
                engine.claim_voucher_by_phone(&code, phone)?;
            }
            "claim" => {
                let label = record.reference()?;
                let reward = lookup(&self.labels.rewards, record.target()?)?;
                let phone = record.phone()?;
                let generated = engine.generate_claim_by_phone(phone, reward)?;
                self.labels.claims.insert(label.to_owned(), generated.claim.code);
            }
            "issue" => {
                let staff = self.role.staff().ok_or(RowError::Forbidden(self.role))?;
                let code = code_for(&self.labels.claims, record.target()?);
                engine.issue_claim(&staff, &code)?;
            }
            other => return Err(RowError::UnknownOperation(other.to_owned())),
        }
        Ok(())
    }
}

/// Replays operations from a CSV reader against `engine`.
///
/// Rows stream through one at a time. Malformed rows and operations the
/// ledger rejects are logged and skipped; later rows may still refer to
/// anything created earlier through its `ref` label.
///
/// # CSV Format
///
/// Expected columns: `type, ref, target, phone, name, amount, points, start, end`
///
/// ```csv
/// type,ref,target,phone,name,amount,points,start,end
/// company,kopi,,,Kopi Kita,,,,
/// campaign,club,kopi,,Coffee Club,10,5,,
/// reward,latte,club,,Free latte,,10,,
/// shopper,,,0811,Ayu,,,,
/// voucher,v1,club,,,120,,,
/// redeem,,v1,0811,,,,,
/// claim,c1,latte,0811,,,,,
/// issue,,c1,,,,,,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails. Returns the number of rows applied.
fn process_operations<R: Read>(engine: &Engine, role: Role, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut driver = Driver {
        engine,
        role,
        labels: Labels::default(),
    };
    let mut applied = 0;
    for (index, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let row = index + 1;
        match result {
            Ok(record) => match driver.apply(&record) {
                Ok(()) => applied += 1,
                Err(e) => warn!(row, op = %record.op, error = %e, "skipping operation"),
            },
            Err(e) => warn!(row, error = %e, "skipping malformed row"),
        }
    }

    Ok(applied)
}

/// Writes shopper balances as CSV.
///
/// Columns: `shopper, phone, name, points`
fn write_shoppers<W: Write>(engine: &Engine, writer: W) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_writer(writer);
    for shopper in engine.shoppers()? {
        wtr.serialize(&shopper)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Drains the journal into a CSV file.
///
/// Columns: `shopper, kind, reference, points, at`
fn write_journal(engine: &Engine, path: &Path) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_path(path)?;
    for entry in engine.journal().drain() {
        wtr.serialize(&entry)?;
    }
    wtr.flush()?;
    Ok(())
}
