//! Metadata captures
//!
//! A capture is a JSON-lines file holding everything the caches consume: raw
//! group-log and transaction-log records, coordination-tree events and the
//! admin snapshot. One object per line, tagged by `source`:
//!
//! ```text
//! {"source":"group_log","key":"<base64>","value":"<base64>","coordinator":1}
//! {"source":"transaction_log","key":"<base64>","value":null,"live":true}
//! {"source":"coordination","kind":"node_added","path":"/brokers/topics/orders","data":"<base64>"}
//! {"source":"admin_group","group_id":"analytics","coordinator":1,"state":"Stable",...}
//! {"source":"admin_offset","group_id":"analytics","topic":"orders","partition":0,"offset":42}
//! ```
//!
//! Log records are part of the bootstrap replay unless marked `live`, in which
//! case each is delivered as its own batch after bootstrap. Blank lines and
//! lines starting with `#` are ignored.

use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use clusterlens_core::TopicPartition;
use clusterlens_metadata::{
    FeedRecord, GroupDescription, ReplayFeed, ReplayWatchSource, SnapshotOffset, StaticSnapshot,
    WatchEvent, WatchEventKind,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CaptureLine {
    GroupLog(LogLine),
    TransactionLog(LogLine),
    Coordination(WatchLine),
    AdminGroup(GroupDescription),
    AdminOffset(AdminOffsetLine),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    /// Base64 record key
    pub key: String,
    /// Base64 record value; absent for a tombstone
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub coordinator: Option<i32>,
    #[serde(default)]
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchLine {
    pub kind: WatchEventKind,
    #[serde(default)]
    pub path: String,
    /// Base64 node data
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminOffsetLine {
    pub group_id: String,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    #[serde(default)]
    pub metadata: Option<String>,
}

#[derive(Debug, Default)]
struct LogCapture {
    bootstrap: Vec<FeedRecord>,
    live: Vec<FeedRecord>,
}

impl LogCapture {
    fn push(&mut self, line: LogLine) -> Result<()> {
        let key = STANDARD.decode(&line.key).context("Invalid base64 key")?;
        let value = line
            .value
            .map(|v| STANDARD.decode(v).context("Invalid base64 value"))
            .transpose()?
            .map(Bytes::from);

        let mut record = FeedRecord::new(key, value);
        if let Some(coordinator) = line.coordinator {
            record = record.with_coordinator(coordinator);
        }

        if line.live {
            self.live.push(record);
        } else {
            self.bootstrap.push(record);
        }
        Ok(())
    }

    fn feed(&self) -> ReplayFeed {
        let mut feed = ReplayFeed::new(self.bootstrap.clone());
        for record in &self.live {
            feed.queue(vec![record.clone()]);
        }
        feed
    }

    fn len(&self) -> usize {
        self.bootstrap.len() + self.live.len()
    }
}

/// A parsed capture
#[derive(Debug, Default)]
pub struct Capture {
    groups: LogCapture,
    transactions: LogCapture,
    watch_events: Vec<WatchEvent>,
    snapshot: StaticSnapshot,
}

impl Capture {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid capture {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut capture = Capture::default();

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed: CaptureLine = serde_json::from_str(line)
                .with_context(|| format!("Line {}: not a capture entry", index + 1))?;
            capture
                .push(parsed)
                .with_context(|| format!("Line {}", index + 1))?;
        }

        debug!(
            group_records = capture.groups.len(),
            transaction_records = capture.transactions.len(),
            watch_events = capture.watch_events.len(),
            admin_groups = capture.snapshot.groups.len(),
            "Parsed capture"
        );
        Ok(capture)
    }

    fn push(&mut self, line: CaptureLine) -> Result<()> {
        match line {
            CaptureLine::GroupLog(line) => self.groups.push(line)?,
            CaptureLine::TransactionLog(line) => self.transactions.push(line)?,
            CaptureLine::Coordination(line) => {
                let data = line
                    .data
                    .map(|d| STANDARD.decode(d).context("Invalid base64 node data"))
                    .transpose()?
                    .map(Bytes::from);
                self.watch_events.push(WatchEvent {
                    kind: line.kind,
                    path: line.path,
                    data,
                });
            }
            CaptureLine::AdminGroup(group) => self.snapshot.groups.push(group),
            CaptureLine::AdminOffset(line) => {
                self.snapshot.offsets.entry(line.group_id).or_default().insert(
                    TopicPartition::new(line.topic, line.partition),
                    SnapshotOffset {
                        offset: line.offset,
                        metadata: line.metadata,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn group_feed(&self) -> ReplayFeed {
        self.groups.feed()
    }

    pub fn transaction_feed(&self) -> ReplayFeed {
        self.transactions.feed()
    }

    /// Watch source over the captured events. A capture taken without the
    /// end-of-listing marker is treated as complete.
    pub fn watch_source(&self) -> ReplayWatchSource {
        ReplayWatchSource::new(self.watch_events())
    }

    fn watch_events(&self) -> Vec<WatchEvent> {
        let mut events = self.watch_events.clone();
        if !events
            .iter()
            .any(|event| event.kind == WatchEventKind::Initialized)
        {
            events.push(WatchEvent::initialized());
        }
        events
    }

    /// The admin snapshot, if the capture holds any admin entries
    pub fn snapshot(&self) -> Option<&StaticSnapshot> {
        if self.snapshot.groups.is_empty() && self.snapshot.offsets.is_empty() {
            None
        } else {
            Some(&self.snapshot)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterlens_core::GroupState;

    fn b64(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_parse_every_source() {
        let contents = format!(
            r#"
# captured from a test cluster
{{"source":"group_log","key":"{key}","value":"{value}","coordinator":2}}
{{"source":"group_log","key":"{key}","live":true}}
{{"source":"transaction_log","key":"{key}","value":null}}
{{"source":"coordination","kind":"node_added","path":"/brokers/topics/orders","data":"{value}"}}
{{"source":"admin_group","group_id":"analytics","coordinator":1,"state":"Stable","partition_assignor":"range","members":[]}}
{{"source":"admin_offset","group_id":"analytics","topic":"orders","partition":0,"offset":42}}
"#,
            key = b64(b"key"),
            value = b64(b"value"),
        );

        let capture = Capture::parse(&contents).unwrap();
        assert_eq!(capture.groups.bootstrap.len(), 1);
        assert_eq!(capture.groups.bootstrap[0].coordinator, Some(2));
        assert_eq!(
            capture.groups.bootstrap[0].value.as_deref(),
            Some(&b"value"[..])
        );
        assert_eq!(capture.groups.live.len(), 1);
        assert!(capture.groups.live[0].value.is_none());
        assert_eq!(capture.transactions.bootstrap.len(), 1);
        assert_eq!(capture.watch_events.len(), 1);

        let snapshot = capture.snapshot().unwrap();
        assert_eq!(snapshot.groups[0].state, GroupState::Stable);
        assert_eq!(
            snapshot.offsets["analytics"][&TopicPartition::new("orders", 0)].offset,
            42
        );
    }

    #[test]
    fn test_empty_capture() {
        let capture = Capture::parse("\n# nothing here\n").unwrap();
        assert!(capture.snapshot().is_none());
        assert_eq!(capture.groups.len(), 0);
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let err = Capture::parse("\n{\"source\":\"unknown\"}\n").unwrap_err();
        assert!(format!("{:#}", err).contains("Line 2"));

        let err = Capture::parse("{\"source\":\"group_log\",\"key\":\"***\"}").unwrap_err();
        assert!(format!("{:#}", err).contains("base64"));
    }

    #[test]
    fn test_initialized_marker_appended_only_when_missing() {
        let capture = Capture::parse(
            r#"{"source":"coordination","kind":"initialized"}
{"source":"coordination","kind":"node_removed","path":"/brokers/topics/orders"}"#,
        )
        .unwrap();
        let events = capture.watch_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, WatchEventKind::NodeRemoved);

        let events = Capture::parse("").unwrap().watch_events();
        assert_eq!(events, vec![WatchEvent::initialized()]);
    }
}
