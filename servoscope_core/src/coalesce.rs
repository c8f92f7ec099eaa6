//! Coalescing window buffer.
//!
//! Bursts of samples arriving faster than the coalescing threshold are
//! folded into the most recent entry with a duration-weighted average, so a
//! channel holds at most `retention / threshold` entries no matter how fast
//! the device publishes. Entries older than the retention horizon are
//! evicted.
//!
//! ```text
//!   last entry            new sample
//!   |<-- duration -->|        |
//! --+----------------+--------+-----> time
//!   ^ leading edge   ^ last.time
//!   |<------- gap ----------->|   gap <= threshold  => merge
//! ```

use crate::config::StreamConfig;
use crate::error::SampleError;
use crate::sample::Coalesce;

/// What `append` did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// Stored as a new entry
    Inserted,
    /// Folded into the previous entry
    Merged,
}

/// Time-ordered, bounded window of coalesced samples for one channel.
#[derive(Debug, Clone)]
pub struct CoalescingBuffer<S: Coalesce> {
    entries: Vec<S>,

    /// Maximum gap (seconds) from the last entry's leading edge that still merges
    threshold_secs: f64,

    /// Entries with `time <= now - retention_secs` are evicted
    retention_secs: f64,
}

impl<S: Coalesce> CoalescingBuffer<S> {
    /// Creates an empty buffer.
    pub fn new(threshold_secs: f64, retention_secs: f64) -> Self {
        Self {
            entries: Vec::new(),
            threshold_secs,
            retention_secs,
        }
    }

    /// Creates an empty buffer using the configured threshold and retention.
    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.coalesce_threshold_secs, config.retention_secs)
    }

    /// Appends a sample, merging it into the last entry when it is close enough.
    ///
    /// Malformed samples are rejected and leave the buffer untouched.
    pub fn append(&mut self, sample: S) -> Result<Appended, SampleError> {
        sample.validate()?;

        let Some(last) = self.entries.last_mut() else {
            self.entries.push(sample);
            return Ok(Appended::Inserted);
        };

        let leading_edge = last.time() - last.duration();
        let gap = sample.time() - leading_edge;
        let total = last.duration() + sample.duration();

        // A zero total weight cannot be averaged; keep both entries instead.
        if gap > self.threshold_secs || !(total > 0.0) {
            self.entries.push(sample);
            Ok(Appended::Inserted)
        } else {
            last.absorb(&sample);
            Ok(Appended::Merged)
        }
    }

    /// Drops every entry with `time <= now - retention`, preserving order.
    ///
    /// Returns the number of evicted entries.
    pub fn evict(&mut self, now: f64) -> usize {
        let horizon = now - self.retention_secs;
        let before = self.entries.len();
        self.entries.retain(|entry| entry.time() > horizon);
        before - self.entries.len()
    }

    /// Appends then evicts relative to the sample's own timestamp.
    pub fn ingest(&mut self, sample: S) -> Result<Appended, SampleError> {
        let now = sample.time();
        let outcome = self.append(sample)?;
        self.evict(now);
        Ok(outcome)
    }

    /// The retained entries, oldest first.
    pub fn as_sequence(&self) -> &[S] {
        &self.entries
    }

    pub fn last(&self) -> Option<&S> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn threshold_secs(&self) -> f64 {
        self.threshold_secs
    }

    pub fn retention_secs(&self) -> f64 {
        self.retention_secs
    }
}
