//! Transaction commands

use anyhow::{bail, Result};
use clap::Subcommand;
use clusterlens_metadata::{OffsetTimeSeries, TransactionProjection};
use serde::Serialize;
use tabled::Tabled;

use super::Lens;
use crate::format::{opt, print_key_value, rate, timestamp, Formatter};

#[derive(Subcommand)]
pub enum TransactionCommands {
    /// List transactional ids
    List {
        /// Only ids whose retained history touches this topic
        #[arg(short, long)]
        topic: Option<String>,
    },
    /// Show one transactional id with its retained history
    Get {
        /// Transactional ID
        transactional_id: String,
    },
    /// Show cumulative commit and abort counts over time
    Rates {
        /// Transactional ID
        transactional_id: String,
    },
}

#[derive(Debug, Serialize, Tabled)]
pub struct TransactionRow {
    #[tabled(rename = "Transactional ID")]
    pub transactional_id: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Producer")]
    pub producer_id: String,
    #[tabled(rename = "Commits")]
    pub commits: u64,
    #[tabled(rename = "Aborts")]
    pub aborts: u64,
    #[tabled(rename = "Avg ms")]
    pub mean_execution_ms: String,
    #[tabled(rename = "Topics")]
    pub topics: String,
}

impl From<&TransactionProjection> for TransactionRow {
    fn from(txn: &TransactionProjection) -> Self {
        let current = txn.current();
        Self {
            transactional_id: txn.transactional_id().to_string(),
            state: opt(current.map(|c| c.state)),
            producer_id: opt(current.map(|c| c.producer_id)),
            commits: txn.commit_count(),
            aborts: txn.abort_count(),
            mean_execution_ms: rate(txn.execution_time().mean()),
            topics: txn.topics().iter().cloned().collect::<Vec<_>>().join(", "),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct HistoryRow {
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Epoch")]
    pub producer_epoch: i16,
    #[tabled(rename = "Started")]
    pub started: String,
    #[tabled(rename = "Updated")]
    pub updated: String,
    #[tabled(rename = "Partitions")]
    pub partitions: usize,
}

#[derive(Debug, Serialize, Tabled)]
pub struct SampleRow {
    #[tabled(rename = "Series")]
    pub series: String,
    #[tabled(rename = "Bucket")]
    pub bucket: String,
    #[tabled(rename = "Count")]
    pub count: i64,
}

fn sample_rows(series: &OffsetTimeSeries) -> impl Iterator<Item = SampleRow> + '_ {
    series.samples().map(|(bucket, count)| SampleRow {
        series: series.id().to_string(),
        bucket: timestamp(bucket),
        count,
    })
}

pub fn list_rows(lens: &Lens, topic: Option<&str>) -> Vec<TransactionRow> {
    let transactions = match topic {
        Some(topic) => lens.transactions.transactions_for_topic(topic),
        None => lens.transactions.transactions(),
    };
    transactions.iter().map(TransactionRow::from).collect()
}

/// Handle transaction commands
pub fn handle_transaction_command(
    command: TransactionCommands,
    lens: &Lens,
    out: &Formatter,
) -> Result<()> {
    match command {
        TransactionCommands::List { topic } => {
            out.print_list(list_rows(lens, topic.as_deref()))
        }
        TransactionCommands::Get { transactional_id } => {
            let Some(txn) = lens.transactions.transaction(&transactional_id) else {
                bail!("Transactional id '{}' not found", transactional_id);
            };
            if !out.is_human() {
                return out.print_document(&txn);
            }
            print_transaction(&txn, out)
        }
        TransactionCommands::Rates { transactional_id } => {
            let commits = lens.transactions.commit_time_series(&transactional_id);
            let aborts = lens.transactions.abort_time_series(&transactional_id);
            if commits.is_none() && aborts.is_none() {
                bail!("Transactional id '{}' not found", transactional_id);
            }

            let mut rows = Vec::new();
            for series in commits.iter().chain(aborts.iter()) {
                rows.extend(sample_rows(series));
            }
            if let Some(commits) = &commits {
                out.print_info(&format!(
                    "Commits per minute: {}",
                    rate(commits.current_rate_per_minute())
                ));
            }
            out.print_list(rows)
        }
    }
}

fn print_transaction(txn: &TransactionProjection, out: &Formatter) -> Result<()> {
    let stats = txn.execution_time();
    out.print_heading(&format!("Transactional id {}", txn.transactional_id()));
    print_key_value(
        vec![
            ("Commits".to_string(), txn.commit_count().to_string()),
            ("Aborts".to_string(), txn.abort_count().to_string()),
            ("Min ms".to_string(), rate(stats.min())),
            ("Mean ms".to_string(), rate(stats.mean())),
            ("Max ms".to_string(), rate(stats.max())),
            ("Std dev ms".to_string(), rate(stats.std_dev())),
        ],
        out.colored(),
    );
    println!();

    out.print_heading("History");
    out.print_list(
        txn.history()
            .map(|snapshot| HistoryRow {
                state: snapshot.state.to_string(),
                producer_epoch: snapshot.producer_epoch,
                started: timestamp(snapshot.start_timestamp),
                updated: timestamp(snapshot.last_update_timestamp),
                partitions: snapshot.partitions.len(),
            })
            .collect(),
    )
}
