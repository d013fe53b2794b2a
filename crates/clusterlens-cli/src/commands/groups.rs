//! Consumer group commands

use anyhow::{bail, Result};
use clap::Subcommand;
use clusterlens_metadata::{GroupProjection, OffsetTimeSeries};
use serde::Serialize;
use tabled::Tabled;

use super::Lens;
use crate::format::{opt, print_key_value, rate, timestamp, Formatter};

#[derive(Subcommand)]
pub enum GroupCommands {
    /// List consumer groups
    List {
        /// Only groups with committed offsets on this topic
        #[arg(short, long)]
        topic: Option<String>,
    },
    /// Show one consumer group with its members and offsets
    Get {
        /// Consumer group ID
        group_id: String,
    },
    /// Show per-partition commit rates
    Rates {
        /// Consumer group ID
        group_id: String,
    },
}

#[derive(Debug, Serialize, Tabled)]
pub struct GroupRow {
    #[tabled(rename = "Group")]
    pub group_id: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Coordinator")]
    pub coordinator: String,
    #[tabled(rename = "Members")]
    pub members: usize,
    #[tabled(rename = "Partitions")]
    pub partitions: usize,
    #[tabled(rename = "Source")]
    pub source: String,
}

impl From<&GroupProjection> for GroupRow {
    fn from(group: &GroupProjection) -> Self {
        Self {
            group_id: group.group_id.clone(),
            state: group.state.to_string(),
            coordinator: opt(group.coordinator),
            members: group.members.len(),
            partitions: group.offsets.len(),
            source: opt(group.metadata_source.map(|s| s.as_str())),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct MemberRow {
    #[tabled(rename = "Member")]
    pub member_id: String,
    #[tabled(rename = "Client")]
    pub client_id: String,
    #[tabled(rename = "Host")]
    pub host: String,
    #[tabled(rename = "Assignment")]
    pub assignment: String,
}

#[derive(Debug, Serialize, Tabled)]
pub struct OffsetRow {
    #[tabled(rename = "Partition")]
    pub partition: String,
    #[tabled(rename = "Offset")]
    pub offset: i64,
    #[tabled(rename = "Committed")]
    pub committed: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

#[derive(Debug, Serialize, Tabled)]
pub struct RateRow {
    #[tabled(rename = "Partition")]
    pub partition: String,
    #[tabled(rename = "Last Commit")]
    pub last_commit: String,
    #[tabled(rename = "Offset")]
    pub offset: String,
    #[tabled(rename = "Delta")]
    pub delta: String,
    #[tabled(rename = "Per Sec")]
    pub per_sec: String,
    #[tabled(rename = "Per Min")]
    pub per_minute: String,
}

impl From<&OffsetTimeSeries> for RateRow {
    fn from(series: &OffsetTimeSeries) -> Self {
        let latest = series.latest();
        Self {
            partition: series.id().to_string(),
            last_commit: opt(latest.map(|(bucket, _)| timestamp(bucket))),
            offset: opt(latest.map(|(_, value)| value)),
            delta: opt(series.current_delta()),
            per_sec: rate(series.current_rate_per_sec()),
            per_minute: rate(series.current_rate_per_minute()),
        }
    }
}

pub fn list_rows(lens: &Lens, topic: Option<&str>) -> Vec<GroupRow> {
    let groups = match topic {
        Some(topic) => lens.groups.groups_for_topic(topic),
        None => lens.groups.groups(),
    };
    groups.iter().map(GroupRow::from).collect()
}

pub fn rate_rows(lens: &Lens, group_id: &str) -> Vec<RateRow> {
    lens.groups
        .offset_time_series(group_id)
        .values()
        .map(RateRow::from)
        .collect()
}

/// Handle consumer group commands
pub fn handle_group_command(command: GroupCommands, lens: &Lens, out: &Formatter) -> Result<()> {
    match command {
        GroupCommands::List { topic } => out.print_list(list_rows(lens, topic.as_deref())),
        GroupCommands::Get { group_id } => {
            let Some(group) = lens.groups.group(&group_id) else {
                bail!("Consumer group '{}' not found", group_id);
            };
            if !out.is_human() {
                return out.print_document(&group);
            }
            print_group(&group, out)
        }
        GroupCommands::Rates { group_id } => {
            if !lens.groups.cache().contains(group_id.as_str()) {
                bail!("Consumer group '{}' not found", group_id);
            }
            let rows = rate_rows(lens, &group_id);
            if rows.is_empty() {
                out.print_info("No log commits observed; rates need timestamped commits");
            }
            out.print_list(rows)
        }
    }
}

fn print_group(group: &GroupProjection, out: &Formatter) -> Result<()> {
    out.print_heading(&format!("Consumer group {}", group.group_id));
    print_key_value(
        vec![
            ("State".to_string(), group.state.to_string()),
            ("Coordinator".to_string(), opt(group.coordinator)),
            ("Protocol".to_string(), opt(group.protocol_type.as_deref())),
            (
                "Assignor".to_string(),
                opt(group.partition_assignor.as_deref()),
            ),
            (
                "Metadata source".to_string(),
                opt(group.metadata_source.map(|s| s.as_str())),
            ),
        ],
        out.colored(),
    );
    println!();

    out.print_heading("Members");
    out.print_list(
        group
            .members
            .iter()
            .map(|m| MemberRow {
                member_id: m.member_id.clone(),
                client_id: m.client_id.clone(),
                host: m.client_host.clone(),
                assignment: m
                    .assignment
                    .iter()
                    .map(|tp| tp.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect(),
    )?;
    println!();

    out.print_heading("Offsets");
    out.print_list(
        group
            .offsets
            .iter()
            .map(|(tp, offset)| OffsetRow {
                partition: tp.to_string(),
                offset: offset.offset,
                committed: opt(offset.commit_timestamp.map(timestamp)),
                source: offset.source.as_str().to_string(),
            })
            .collect(),
    )
}
