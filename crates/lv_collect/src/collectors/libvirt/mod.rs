//! libvirt collector
//!
//! Lists domains with `virsh list`, then fetches and parses each domain's
//! stats dump. Listing failures abort the cycle; a failing domain is logged
//! and reported while the others are still collected.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use lv_config::LvConfig;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::executor::{VirshCommand, VirshRunner};
use crate::metric::{MetricRecord, MetricSink};
use crate::{CollectError, Collector, CycleReport, DomainFailure};

mod list;
mod stats;

pub use list::parse_domain_list;
pub use stats::{parse_domain_stats, parse_uint_literal};

const DEFAULT_STATS_COMMAND: &str = "domstats";
const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Collects per-domain statistics from one libvirt connection
pub struct LibvirtCollector {
    uri: String,
    stats_command: String,
    max_concurrency: usize,
    runner: Arc<dyn VirshRunner>,
}

impl LibvirtCollector {
    pub fn new(uri: impl Into<String>, runner: Arc<dyn VirshRunner>) -> Self {
        Self {
            uri: uri.into(),
            stats_command: DEFAULT_STATS_COMMAND.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            runner,
        }
    }

    /// Collector backed by the real virsh binary
    pub fn from_config(config: &LvConfig) -> Self {
        Self::new(
            config.libvirt.uri.clone(),
            Arc::new(VirshCommand::from_config(config)),
        )
        .with_stats_command(config.libvirt.stats_command.clone())
        .with_max_concurrency(config.libvirt.max_concurrency)
    }

    #[must_use]
    pub fn with_stats_command(mut self, command: impl Into<String>) -> Self {
        self.stats_command = command.into();
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Run `virsh list` and parse the table
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub async fn list_domains(&self) -> Result<Vec<String>, CollectError> {
        let output = self.runner.execute(&self.uri, &["list".to_string()]).await?;
        parse_domain_list(&output)
    }

    /// Fetch and parse one domain's stats
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub async fn fetch_domain(&self, domain: &str) -> Result<MetricRecord, CollectError> {
        let args = [self.stats_command.clone(), domain.to_string()];
        let output = self.runner.execute(&self.uri, &args).await?;
        let record = parse_domain_stats(domain, &output)?;
        debug!(domain, fields = record.fields.len(), "Parsed domain stats");
        Ok(record)
    }

    /// Run one collection cycle into `sink`.
    ///
    /// Only a failed listing is returned as an error. Records are emitted in
    /// listing order even though up to `max_concurrency` domains are fetched
    /// at once.
    #[instrument(skip(self, sink), fields(uri = %self.uri))]
    pub async fn collect_into(&self, sink: &dyn MetricSink) -> Result<CycleReport, CollectError> {
        let started = Instant::now();
        let mut report = CycleReport::new(Utc::now(), 0);

        let domains = self.list_domains().await?;
        report.domains = domains.len();
        debug!(count = domains.len(), "Listed domains");

        // Each future owns its name; borrowed names make `collect` non-Send
        let mut results = stream::iter(domains)
            .map(|domain| async move {
                let result = self.fetch_domain(&domain).await;
                (domain, result)
            })
            .buffered(self.max_concurrency);

        while let Some((domain, result)) = results.next().await {
            match result {
                Ok(record) => {
                    record.emit(sink);
                    report.emitted += 1;
                }
                Err(error) => {
                    warn!(domain = %domain, error = %error, "Failed to collect domain stats");
                    report.failures.push(DomainFailure { domain, error });
                }
            }
        }

        report.duration = started.elapsed();
        info!(
            collected_at = %report.collected_at.to_rfc3339(),
            domains = report.domains,
            emitted = report.emitted,
            failed = report.failures.len(),
            duration_ms = report.duration.as_millis(),
            "libvirt collection cycle finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl Collector for LibvirtCollector {
    fn name(&self) -> &'static str {
        "libvirt"
    }

    async fn collect(&self, sink: &dyn MetricSink) -> Result<CycleReport, CollectError> {
        self.collect_into(sink).await
    }

    async fn check_availability(&self) -> bool {
        self.runner.is_available().await
    }
}
