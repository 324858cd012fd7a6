//! Finding model and trait implementations.
//!
//! Findings are the risks detected in an asset version: CVEs, exposed
//! credentials, crypto material, configuration issues and static analysis
//! results.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{fetch_one, null_default, NamedRef, UserRef};
use crate::assemble::{Assembler, Record, Schema};
use crate::client::FiniteStateClient;
use crate::config::FetchOptions;
use crate::error::{FiniteStateError, Result};
use crate::fanout::{FanOut, FetchResultSet, FetchTask};
use crate::pagination::ListEndpoint;
use crate::queries;
use crate::traits::{Get, List};

/// Known finding categories.
pub const FINDING_CATEGORIES: [&str; 5] = [
    "CONFIG_ISSUES",
    "CREDENTIALS",
    "CRYPTO_MATERIAL",
    "CVE",
    "SAST_ANALYSIS",
];

/// Known severities, most severe first.
pub const SEVERITIES: [&str; 6] = ["CRITICAL", "HIGH", "MEDIUM", "LOW", "INFO", "UNKNOWN"];

/// A finding in an asset version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Finding id.
    pub id: String,

    /// Short title.
    #[serde(default)]
    pub title: Option<String>,

    /// Detection date.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,

    /// When the finding was created.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// When the finding last changed.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// Identifier reported by the detecting tool.
    #[serde(default)]
    pub vuln_id_from_tool: Option<String>,

    /// Long description.
    #[serde(default)]
    pub description: Option<String>,

    /// Severity, one of [`SEVERITIES`].
    #[serde(default)]
    pub severity: Option<String>,

    /// Platform risk score.
    #[serde(default)]
    pub risk_score: Option<f64>,

    /// Components this finding affects.
    #[serde(default, deserialize_with = "null_default")]
    pub affects: Vec<AffectedComponent>,

    /// Scan sources that reported this finding.
    #[serde(default, deserialize_with = "null_default")]
    pub source_types: Vec<String>,

    /// Category, one of [`FINDING_CATEGORIES`].
    #[serde(default)]
    pub category: Option<String>,

    /// Subcategory.
    #[serde(default)]
    pub subcategory: Option<String>,

    /// Whether this finding reappeared after being fixed.
    #[serde(default)]
    pub regression: Option<bool>,

    /// Triage status.
    #[serde(default)]
    pub current_status: Option<FindingStatus>,

    /// CWE entries.
    #[serde(default, deserialize_with = "null_default")]
    pub cwes: Vec<Cwe>,

    /// CVE entries.
    #[serde(default, deserialize_with = "null_default")]
    pub cves: Vec<Cve>,

    /// Origin of the finding.
    #[serde(default)]
    pub origin: Option<String>,

    /// Findings merged into this one.
    #[serde(default, deserialize_with = "null_default")]
    pub original_findings_sources: Vec<NamedRef>,
}

/// A component affected by a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedComponent {
    /// Component id.
    pub id: String,
    /// Component name.
    #[serde(default)]
    pub name: Option<String>,
    /// Component version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Triage status of a finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingStatus {
    /// Status id.
    #[serde(default)]
    pub id: Option<String>,
    /// Status value, e.g. `AFFECTED` or `NOT_AFFECTED`.
    #[serde(default)]
    pub status: Option<String>,
    /// Justification for the status.
    #[serde(default)]
    pub justification: Option<String>,
    /// Free-form comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// When the status was set.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Who set it.
    #[serde(default)]
    pub created_by: Option<UserRef>,
}

/// A CWE reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cwe {
    /// Entry id.
    pub id: String,
    /// CWE identifier, e.g. `CWE-79`.
    #[serde(default)]
    pub cwe_id: Option<String>,
    /// CWE name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A CVE reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cve {
    /// Entry id.
    pub id: String,
    /// CVE identifier.
    #[serde(default)]
    pub cve_id: Option<String>,
    /// Exploit prediction scores.
    #[serde(default)]
    pub epss: Option<Epss>,
    /// Known exploitation.
    #[serde(default)]
    pub exploits_info: Option<ExploitsInfo>,
}

/// EPSS scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Epss {
    /// Percentile among all CVEs.
    #[serde(default)]
    pub epss_percentile: Option<f64>,
    /// Probability of exploitation.
    #[serde(default)]
    pub epss_score: Option<f64>,
}

/// Known exploitation flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExploitsInfo {
    /// A proof of concept exists.
    pub exploit_proof_of_concept: Option<bool>,
    /// Exploited in the wild.
    pub reported_in_the_wild: Option<bool>,
    /// Weaponized exploit available.
    pub weaponized: Option<bool>,
    /// Used by named threat actors.
    pub exploited_by_named_threat_actors: Option<bool>,
    /// Used by botnets.
    pub exploited_by_botnets: Option<bool>,
    /// Used by ransomware.
    pub exploited_by_ransomware: Option<bool>,
}

impl Finding {
    /// Triage status value, if any.
    pub fn status(&self) -> Option<&str> {
        self.current_status.as_ref().and_then(|s| s.status.as_deref())
    }

    /// CVE identifiers.
    pub fn cve_ids(&self) -> Vec<&str> {
        self.cves.iter().filter_map(|c| c.cve_id.as_deref()).collect()
    }

    /// Whether this is a CVE finding.
    pub fn is_cve(&self) -> bool {
        self.category.as_deref() == Some("CVE")
    }

    /// Whether any CVE on this finding is known to be exploited.
    pub fn is_exploited(&self) -> bool {
        self.cves.iter().filter_map(|c| c.exploits_info.as_ref()).any(|e| {
            e.reported_in_the_wild == Some(true)
                || e.exploited_by_botnets == Some(true)
                || e.exploited_by_ransomware == Some(true)
                || e.exploited_by_named_threat_actors == Some(true)
        })
    }
}

/// Query parameters for listing findings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindingListQuery {
    /// Findings of one asset version.
    pub asset_version_id: Option<String>,
    /// A single finding.
    pub finding_id: Option<String>,
    /// Restrict to these categories.
    pub categories: Vec<String>,
    /// Triage status.
    pub status: Option<String>,
    /// Severity.
    pub severity: Option<String>,
    /// Findings referencing this CVE.
    pub cve_id: Option<String>,
}

impl FindingListQuery {
    /// Findings of one asset version.
    pub fn for_asset_version(asset_version_id: impl Into<String>) -> Self {
        Self {
            asset_version_id: Some(asset_version_id.into()),
            ..Default::default()
        }
    }

    /// Restrict to a category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Restrict to a severity.
    #[must_use]
    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    /// The GraphQL `FindingFilter` for this query.
    pub fn filter(&self) -> Value {
        let mut filter = Map::new();
        filter.insert("mergedFindingRefId".into(), Value::Null);
        filter.insert("deletedAt".into(), Value::Null);

        if let Some(id) = &self.finding_id {
            filter.insert("id".into(), json!(id));
        }
        if let Some(av) = &self.asset_version_id {
            filter.insert("assetVersionRefId".into(), json!(av));
        }
        if let Some(severity) = &self.severity {
            filter.insert("severity".into(), json!(severity));
        }
        if let Some(status) = &self.status {
            filter.insert("currentStatus".into(), json!({ "status_in": [status] }));
        }

        let mut and = Vec::new();
        if !self.categories.is_empty() {
            and.push(json!({ "OR": [{ "category_in": self.categories }] }));
        }
        if let Some(cve) = &self.cve_id {
            and.push(json!({ "OR": [{ "cves_every": { "cveId": cve } }] }));
        }
        if !and.is_empty() {
            filter.insert("AND".into(), Value::Array(and));
        }

        Value::Object(filter)
    }

    /// GraphQL variables for this query, without paging fields.
    pub fn variables(&self) -> Value {
        json!({ "filter": self.filter(), "orderBy": ["title_ASC"] })
    }
}

#[async_trait]
impl Get for Finding {
    type Id = String;

    #[tracing::instrument(skip(client))]
    async fn get(client: &FiniteStateClient, id: Self::Id) -> Result<Self> {
        let query = FindingListQuery {
            finding_id: Some(id.clone()),
            ..Default::default()
        };
        fetch_one(client, Self::endpoint(&query), "finding", &id).await
    }
}

impl List for Finding {
    type Query = FindingListQuery;

    fn endpoint(query: &Self::Query) -> ListEndpoint {
        ListEndpoint::graphql(queries::ALL_FINDINGS, query.variables(), "allFindings")
    }
}

/// Fetch all findings matching a query.
///
/// # Example
///
/// ```ignore
/// use finite_state_sdk::{FiniteStateClient, get_findings, FindingListQuery};
///
/// let client = FiniteStateClient::from_env()?;
/// let findings = get_findings(
///     &client,
///     FindingListQuery::for_asset_version("av-1").with_category("CVE"),
/// ).await?;
/// ```
pub async fn get_findings(
    client: &FiniteStateClient,
    query: FindingListQuery,
) -> Result<Vec<Finding>> {
    Finding::list_all(client, &query).await
}

/// Count findings matching a query without fetching them.
///
/// # Errors
///
/// Returns [`FiniteStateError::UnexpectedShape`] if the response carries
/// no count.
#[tracing::instrument(skip(client))]
pub async fn get_findings_count(client: &FiniteStateClient, query: &FindingListQuery) -> Result<u64> {
    let data = client
        .graphql(queries::FINDINGS_COUNT, json!({ "filter": query.filter() }))
        .await?;
    data.get("_allFindingsMeta")
        .and_then(|meta| meta.get("count"))
        .and_then(Value::as_u64)
        .ok_or_else(|| FiniteStateError::UnexpectedShape("_allFindingsMeta.count missing".to_string()))
}

/// Fetch findings for many asset versions concurrently.
///
/// One [`FetchTask`] runs per asset version, bounded and merged according
/// to `options.fan_out`. A finding shared by several asset versions appears
/// once in `records`; [`FetchResultSet::membership`] lists it under each
/// version that returned it.
///
/// # Errors
///
/// Under fail-fast, the first task error. Best-effort runs return a
/// possibly partial [`FetchResultSet`].
pub async fn fetch_findings_per_asset_version<I>(
    client: &FiniteStateClient,
    asset_version_ids: I,
    query: FindingListQuery,
    options: &FetchOptions,
) -> Result<FetchResultSet>
where
    I: IntoIterator<Item = String>,
{
    options.validate()?;

    let client = client.clone();
    let options = Arc::new(options.clone());
    let query = Arc::new(query);
    let tasks = asset_version_ids.into_iter().map(FetchTask::new);

    FanOut::new(options.fan_out.clone())
        .run(tasks, move |task| {
            let client = client.clone();
            let options = options.clone();
            let query = query.clone();
            async move { findings_task(&client, &task, &query, &options).await }
        })
        .await
}

async fn findings_task(
    client: &FiniteStateClient,
    task: &FetchTask,
    query: &FindingListQuery,
    options: &FetchOptions,
) -> Result<Vec<Record>> {
    let scoped = FindingListQuery {
        asset_version_id: Some(task.parent.clone()),
        ..query.clone()
    };
    let raw = client
        .paginate_with(Finding::endpoint(&scoped), options)
        .collect_all()
        .await?;

    Ok(Assembler::normalize(&Schema::findings(), [raw]).records)
}
