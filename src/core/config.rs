//! Configuration parsing and validation.
//!
//! Stratus configuration is loaded from TOML files with programmatic
//! overrides. Worker counts default to the CPU count when unset.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level Stratus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Job scheduler sizing.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Rebuild protocol policy.
    #[serde(default)]
    pub rebuild: RebuildConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Job scheduler sizing.
///
/// Three independent pools: the per-unit entity queue, the general message
/// pool, and the commit-callback pool. Each has its own worker count and the
/// two bounded queues have their own depth limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker threads draining per-unit queues. Defaults to CPU count.
    #[serde(default)]
    pub entity_workers: Option<usize>,

    /// Worker threads for the general message pool. Defaults to CPU count.
    #[serde(default)]
    pub message_workers: Option<usize>,

    /// Worker threads for the commit-callback pool.
    #[serde(default = "default_callback_workers")]
    pub callback_workers: usize,

    /// Maximum total jobs queued across all per-unit queues.
    #[serde(default = "default_entity_queue_depth")]
    pub max_entity_queue_depth: usize,

    /// Maximum jobs queued on the general message pool.
    #[serde(default = "default_message_queue_depth")]
    pub max_message_queue_depth: usize,
}

impl SchedulerConfig {
    /// Resolved entity worker count.
    pub fn entity_worker_count(&self) -> usize {
        self.entity_workers.unwrap_or_else(cpu_count)
    }

    /// Resolved message worker count.
    pub fn message_worker_count(&self) -> usize {
        self.message_workers.unwrap_or_else(cpu_count)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            entity_workers: None,
            message_workers: None,
            callback_workers: default_callback_workers(),
            max_entity_queue_depth: default_entity_queue_depth(),
            max_message_queue_depth: default_message_queue_depth(),
        }
    }
}

/// Rebuild protocol policy.
///
/// The quorum policy is configuration-driven: either every known node must
/// answer the generation proposal, or the coordinator proceeds with whoever
/// answered once the caller's proposal timer fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildConfig {
    /// Wait for all known nodes before moving to inventory upload.
    #[serde(default = "default_wait_for_all_nodes")]
    pub wait_for_all_nodes: bool,

    /// Deadline for the proposal reply phase, in milliseconds.
    #[serde(default = "default_proposal_timeout_ms")]
    pub proposal_timeout_ms: u64,

    /// Interval for re-contacting nodes that missed the reply phase.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            wait_for_all_nodes: default_wait_for_all_nodes(),
            proposal_timeout_ms: default_proposal_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_callback_workers() -> usize {
    1
}

fn default_entity_queue_depth() -> usize {
    10_000
}

fn default_message_queue_depth() -> usize {
    10_000
}

fn default_wait_for_all_nodes() -> bool {
    true
}

fn default_proposal_timeout_ms() -> u64 {
    30_000
}

fn default_retry_interval_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            rebuild: RebuildConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply programmatic overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(entity_workers) = overrides.entity_workers {
            self.scheduler.entity_workers = Some(entity_workers);
        }
        if let Some(message_workers) = overrides.message_workers {
            self.scheduler.message_workers = Some(message_workers);
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_scheduler()?;
        self.validate_rebuild()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_scheduler(&self) -> Result<()> {
        if let Some(workers) = self.scheduler.entity_workers {
            if workers == 0 {
                anyhow::bail!("scheduler.entity_workers must be > 0");
            }
        }
        if let Some(workers) = self.scheduler.message_workers {
            if workers == 0 {
                anyhow::bail!("scheduler.message_workers must be > 0");
            }
        }
        if self.scheduler.callback_workers == 0 {
            anyhow::bail!("scheduler.callback_workers must be > 0");
        }
        if self.scheduler.max_entity_queue_depth == 0 {
            anyhow::bail!("scheduler.max_entity_queue_depth must be > 0");
        }
        if self.scheduler.max_message_queue_depth == 0 {
            anyhow::bail!("scheduler.max_message_queue_depth must be > 0");
        }
        Ok(())
    }

    fn validate_rebuild(&self) -> Result<()> {
        if self.rebuild.proposal_timeout_ms == 0 {
            anyhow::bail!("rebuild.proposal_timeout_ms must be > 0");
        }
        if self.rebuild.retry_interval_ms == 0 {
            anyhow::bail!("rebuild.retry_interval_ms must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// Programmatic override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override entity worker count.
    pub entity_workers: Option<usize>,
    /// Override message worker count.
    pub message_workers: Option<usize>,
}
