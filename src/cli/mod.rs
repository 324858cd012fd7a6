//! CLI argument parsing types.
//!
//! This module provides the command-line interface structure for the
//! `fsreport` binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{FetchOptions, DEFAULT_PAGE_SIZE};
use crate::fanout::{FailurePolicy, DEFAULT_CONCURRENCY};
use crate::retry::RetryPolicy;

/// Finite State reporting command-line interface.
#[derive(Parser, Debug)]
#[command(name = "fsreport", about = "Finite State platform reports", version)]
pub struct Cli {
    /// Output results as JSON instead of a table.
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Dotenv file with CLIENT_ID, CLIENT_SECRET and ORGANIZATION_CONTEXT.
    #[arg(long, global = true, value_name = "PATH")]
    pub secrets_file: Option<PathBuf>,

    /// Reuse the session token across runs, cached in this directory.
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        env = "FINITE_STATE_TOKEN_CACHE",
        num_args = 0..=1,
        default_missing_value = crate::token_cache::DEFAULT_CACHE_DIR
    )]
    pub token_cache: Option<PathBuf>,

    #[command(flatten)]
    pub fetch: FetchArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Paging, retry and fan-out knobs shared by every command.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct FetchArgs {
    /// Records requested per page (1-1000).
    #[arg(long, global = true, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Attempts per request before giving up.
    #[arg(long, global = true, default_value_t = 5)]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[arg(long, global = true, default_value_t = 500)]
    pub backoff_ms: u64,

    /// Growth factor between retries.
    #[arg(long, global = true, default_value_t = 2.0)]
    pub backoff_multiplier: f64,

    /// Parallel fetches when fanning out per asset version.
    #[arg(long, global = true, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Give up on unfinished work after this many seconds.
    #[arg(long, global = true, value_name = "SECONDS")]
    pub deadline: Option<u64>,
}

impl FetchArgs {
    /// Build fetch options under the given failure policy.
    pub fn to_options(&self, policy: FailurePolicy) -> FetchOptions {
        let retry = RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_backoff(Duration::from_millis(self.backoff_ms), self.backoff_multiplier);

        let mut options = FetchOptions::default()
            .with_page_size(self.page_size)
            .with_concurrency(self.concurrency);
        options.retry = retry;
        options.fan_out.policy = policy;
        if let Some(secs) = self.deadline {
            options = options.with_deadline(Duration::from_secs(secs));
        }
        options
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List asset versions.
    AssetVersions {
        /// Only versions of this asset.
        #[arg(long)]
        asset: Option<String>,

        /// Only versions in this business unit.
        #[arg(long)]
        business_unit: Option<String>,
    },

    /// List findings of one asset version.
    Findings {
        /// Asset version id.
        #[arg(long)]
        asset_version: String,

        /// Only this severity (CRITICAL, HIGH, MEDIUM, LOW, INFO, UNKNOWN).
        #[arg(long)]
        severity: Option<String>,

        /// Only this category (CVE, CREDENTIALS, ...).
        #[arg(long)]
        category: Option<String>,

        /// Stop after this many findings.
        #[arg(long)]
        limit: Option<usize>,

        /// Print only the count.
        #[arg(long)]
        count: bool,
    },

    /// Asset versions ranked by relative risk score.
    RiskScores {
        /// Only versions in this business unit.
        #[arg(long)]
        business_unit: Option<String>,

        /// Show at most this many rows.
        #[arg(long)]
        top: Option<usize>,
    },

    /// Finding counts and severity breakdown for every asset version.
    FindingsOverTime {
        /// Only versions of this asset.
        #[arg(long)]
        asset: Option<String>,

        /// Only this category.
        #[arg(long)]
        category: Option<String>,

        /// Abort on the first failed asset version.
        #[arg(long)]
        fail_fast: bool,
    },

    /// List software components of one asset version.
    Components {
        /// Asset version id.
        #[arg(long)]
        asset_version: String,

        /// Only this component type.
        #[arg(long = "type")]
        component_type: Option<String>,
    },

    /// Search SBOMs for a component by name.
    SearchSbom {
        /// Component name.
        #[arg(long)]
        name: String,

        /// Only this version.
        #[arg(long)]
        version: Option<String>,

        /// Search one asset version instead of the whole organization.
        #[arg(long)]
        asset_version: Option<String>,

        /// Match substrings instead of whole names.
        #[arg(long)]
        contains: bool,

        /// Respect case on exact matches.
        #[arg(long)]
        case_sensitive: bool,
    },

    /// List assets.
    Assets {
        /// Only assets in this business unit.
        #[arg(long)]
        business_unit: Option<String>,
    },

    /// List business units.
    BusinessUnits,

    /// List users.
    Users,

    /// List projects from the REST API.
    Projects,
}
