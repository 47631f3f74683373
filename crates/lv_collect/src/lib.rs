//! lv_collect - libvirt domain statistics collection for lvstat
//!
//! This crate provides:
//! - The Collector trait for scheduled collection cycles
//! - The libvirt collector (domain listing + per-domain stats parsing)
//! - Command execution through virsh, locally or over SSH
//! - Metric records and sinks

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

pub mod collectors;
pub mod executor;
pub mod metric;

pub use collectors::libvirt::{LibvirtCollector, parse_domain_list, parse_domain_stats};
pub use executor::{Executor, VirshCommand, VirshRunner};
pub use metric::{MEASUREMENT, MemorySink, Metric, MetricRecord, MetricSink};

/// Collection errors
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Command execution failed: {0}")]
    ExecutionError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Tool not available: {0}")]
    ToolNotFound(String),

    #[error("Failed to read domain list line: {line}")]
    MalformedListLine { line: String },

    #[error("Failed to read domain stats for domain: {domain}, line: {line:?}")]
    MalformedStatLine { domain: String, line: String },

    #[error("Invalid value for {key} in domain {domain}: {value:?}")]
    InvalidFieldValue {
        domain: String,
        key: String,
        value: String,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CollectError {
    /// Whether the error came from running the external tool rather than parsing its output
    pub fn is_executor_failure(&self) -> bool {
        matches!(
            self,
            Self::ExecutionError(_) | Self::Timeout(_) | Self::ToolNotFound(_) | Self::IoError(_)
        )
    }
}

/// A domain whose stats could not be fetched or parsed during a cycle
#[derive(Debug)]
pub struct DomainFailure {
    pub domain: String,
    pub error: CollectError,
}

/// Outcome of one collection cycle
#[derive(Debug)]
pub struct CycleReport {
    /// When the cycle started
    pub collected_at: DateTime<Utc>,

    /// Number of domains returned by the listing
    pub domains: usize,

    /// Records handed to the sink
    pub emitted: usize,

    /// Per-domain failures; the remaining domains were still collected
    pub failures: Vec<DomainFailure>,

    /// Cycle duration
    pub duration: Duration,
}

impl CycleReport {
    /// Create a report with nothing emitted yet
    pub fn new(collected_at: DateTime<Utc>, domains: usize) -> Self {
        Self {
            collected_at,
            domains,
            emitted: 0,
            failures: vec![],
            duration: Duration::ZERO,
        }
    }

    /// Whether every listed domain produced a record
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The core Collector trait
#[async_trait]
pub trait Collector: Send + Sync {
    /// Unique name for this collector
    fn name(&self) -> &'static str;

    /// Run one collection cycle, handing every record to `sink`
    async fn collect(&self, sink: &dyn MetricSink) -> Result<CycleReport, CollectError>;

    /// Check if the underlying tool can be invoked
    async fn check_availability(&self) -> bool {
        true
    }
}
