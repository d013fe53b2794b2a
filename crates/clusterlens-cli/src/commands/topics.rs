//! Topic commands

use anyhow::{bail, Result};
use clap::Subcommand;
use clusterlens_metadata::{PartitionInfo, TopicProjection};
use serde::Serialize;
use tabled::Tabled;

use super::Lens;
use crate::format::{opt, print_key_value, Formatter};

#[derive(Subcommand)]
pub enum TopicCommands {
    /// List topics
    List,
    /// Show one topic with its configuration
    Get {
        /// Topic name
        name: String,
    },
    /// Show replicas, leader and ISR for every partition of a topic
    Partitions {
        /// Topic name
        name: String,
    },
}

#[derive(Debug, Serialize, Tabled)]
pub struct TopicRow {
    #[tabled(rename = "Topic")]
    pub name: String,
    #[tabled(rename = "Partitions")]
    pub partitions: usize,
    #[tabled(rename = "RF")]
    pub replication_factor: String,
    #[tabled(rename = "Under Replicated")]
    pub under_replicated: usize,
    #[tabled(rename = "Offline")]
    pub offline: usize,
    #[tabled(rename = "Config Entries")]
    pub config_entries: usize,
}

impl From<&TopicProjection> for TopicRow {
    fn from(topic: &TopicProjection) -> Self {
        Self {
            name: topic.name.clone(),
            partitions: topic.partition_count(),
            replication_factor: opt(topic.replication_factor()),
            under_replicated: topic.under_replicated_partitions().len(),
            offline: topic.offline_partitions().len(),
            config_entries: topic.config.as_ref().map_or(0, |c| c.len()),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct PartitionRow {
    #[tabled(rename = "Partition")]
    pub partition: i32,
    #[tabled(rename = "Leader")]
    pub leader: String,
    #[tabled(rename = "Replicas")]
    pub replicas: String,
    #[tabled(rename = "ISR")]
    pub isr: String,
}

fn brokers(ids: &[i32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl From<&PartitionInfo> for PartitionRow {
    fn from(info: &PartitionInfo) -> Self {
        Self {
            partition: info.partition,
            leader: opt(info.leader),
            replicas: brokers(&info.replicas),
            isr: opt(info.isr.as_deref().map(brokers)),
        }
    }
}

pub fn list_rows(lens: &Lens) -> Vec<TopicRow> {
    lens.topics.topics().iter().map(TopicRow::from).collect()
}

fn find(lens: &Lens, name: &str) -> Result<TopicProjection> {
    match lens.topics.topic(name) {
        Some(topic) => Ok(topic),
        None => bail!("Topic '{}' not found", name),
    }
}

/// Handle topic commands
pub fn handle_topic_command(command: TopicCommands, lens: &Lens, out: &Formatter) -> Result<()> {
    match command {
        TopicCommands::List => out.print_list(list_rows(lens)),
        TopicCommands::Get { name } => {
            let topic = find(lens, &name)?;
            if !out.is_human() {
                return out.print_document(&topic);
            }

            let offline = topic.offline_partitions();
            if !offline.is_empty() {
                out.print_warning(&format!("{} partition(s) have no leader", offline.len()));
            }

            out.print_heading(&format!("Topic {}", topic.name));
            let row = TopicRow::from(&topic);
            print_key_value(
                vec![
                    ("Partitions".to_string(), row.partitions.to_string()),
                    ("Replication factor".to_string(), row.replication_factor),
                    (
                        "Under replicated".to_string(),
                        format!("{:?}", topic.under_replicated_partitions()),
                    ),
                    ("Offline".to_string(), format!("{:?}", offline)),
                ],
                out.colored(),
            );
            println!();

            out.print_heading("Config");
            match &topic.config {
                Some(config) if !config.is_empty() => print_key_value(
                    config.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    out.colored(),
                ),
                _ => println!("  (defaults)"),
            }
            Ok(())
        }
        TopicCommands::Partitions { name } => {
            let topic = find(lens, &name)?;
            out.print_list(topic.partitions().iter().map(PartitionRow::from).collect())
        }
    }
}
