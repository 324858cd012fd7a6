//! Finite State platform client library.
//!
//! A Rust library for pulling data out of the Finite State platform: assets,
//! asset versions, findings, components, products and the organization
//! directory. The core is a paginated,
//! rate-limit aware, retrying fetch engine with bounded per-parent fan-out
//! and a de-duplicating result assembler.
//!
//! # Quick Start
//!
//! ```no_run
//! use finite_state_sdk::{
//!     fetch_findings_per_asset_version, AssetVersion, FetchOptions, FindingListQuery,
//!     FiniteStateClient, List,
//! };
//!
//! #[tokio::main]
//! async fn main() -> finite_state_sdk::Result<()> {
//!     // Reads CLIENT_ID, CLIENT_SECRET and ORGANIZATION_CONTEXT
//!     let client = FiniteStateClient::from_env()?;
//!
//!     let versions = AssetVersion::list_all(&client, &Default::default()).await?;
//!     println!("Found {} asset versions", versions.len());
//!
//!     // Findings for every version, four at a time, tolerating failures
//!     let results = fetch_findings_per_asset_version(
//!         &client,
//!         versions.into_iter().map(|v| v.id),
//!         FindingListQuery::default().with_category("CVE"),
//!         &FetchOptions::best_effort(),
//!     )
//!     .await?;
//!
//!     if results.is_partial() {
//!         eprintln!("incomplete: {:?}", results.failed_ids());
//!     }
//!     println!("{} findings", results.records.len());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`AuthProvider`] exchanges client credentials for a session token and
//!   refreshes it single-flight. [`FileTokenCache`] optionally persists the
//!   token between runs.
//! - [`Transport`] performs exactly one HTTP call and classifies the outcome.
//! - [`call_with_retry`] applies a [`RetryPolicy`] around each call.
//! - [`Paginator`] walks cursor (GraphQL) or offset (REST) pages in order.
//! - [`FanOut`] runs one [`FetchTask`] per parent entity with bounded
//!   concurrency.
//! - [`Assembler`] normalizes raw records into [`Record`] rows and
//!   de-duplicates them.
//!
//! Entity types implement [`Get`] and [`List`] on top of this engine.
//!
//! # Configuration
//!
//! - `CLIENT_ID`, `CLIENT_SECRET`, `ORGANIZATION_CONTEXT` (required)
//! - `FINITE_STATE_API_URL`, `FINITE_STATE_TOKEN_URL`,
//!   `FINITE_STATE_AUDIENCE`, `FINITE_STATE_REST_URL` (optional overrides)
//! - `FINITE_STATE_TOKEN_CACHE` (optional token cache directory, used by
//!   `fsreport`)

pub mod assemble;
pub mod auth;
pub mod cli;
mod client;
pub mod config;
mod error;
pub mod fanout;
mod models;
pub mod output;
pub mod pagination;
pub mod queries;
pub mod retry;
pub mod token_cache;
mod traits;
pub mod transport;

#[cfg(feature = "test-server")]
pub mod mock_server;

// Re-export core types
pub use assemble::{Assembled, Assembler, Column, ColumnKind, Conflict, FieldValue, Record, Schema};
pub use auth::{AuthProvider, HttpTokenExchange, IssuedToken, SessionToken, TokenExchange};
pub use client::FiniteStateClient;
pub use config::{ApiEndpoints, Credentials, FetchOptions, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use error::{FiniteStateError, Result};
pub use fanout::{FailurePolicy, FanOut, FanOutOptions, FetchResultSet, FetchTask, TaskFailure};
pub use pagination::{Cursor, Interrupted, ListEndpoint, Page, PageState, Paginator};
pub use retry::{call_with_retry, RetryDecision, RetryPolicy};
pub use token_cache::FileTokenCache;
pub use transport::{HttpTransport, RequestDescriptor, Transport, TransportError};

// Re-export traits
pub use traits::{Get, List};

// Re-export models
pub use models::{
    // Shared references
    NamedRef,
    UserRef,
    // Assets
    Asset,
    AssetContext,
    AssetListQuery,
    AssetVersionSummary,
    // Asset versions
    AssetRef,
    AssetVersion,
    AssetVersionListQuery,
    // Findings
    AffectedComponent,
    Cve,
    Cwe,
    Epss,
    ExploitsInfo,
    Finding,
    FindingListQuery,
    FindingStatus,
    FINDING_CATEGORIES,
    SEVERITIES,
    // Components
    Hash,
    License,
    SbomSearch,
    SearchMethod,
    SoftwareComponent,
    SoftwareComponentListQuery,
    SoftwareIdentifiers,
    // Organization directory
    BusinessUnit,
    User,
    // Products
    Product,
    ProductAssetVersion,
    ProductListQuery,
    // REST projects
    Branch,
    Project,
    ProjectListQuery,
    ProjectVersion,
};

// Re-export convenience functions
pub use models::{
    fetch_findings_per_asset_version, find_project_by_name, get_all_business_units,
    get_all_users, get_asset_versions, get_assets, get_findings, get_findings_count,
    get_product_asset_versions, get_software_components, search_sbom,
};
