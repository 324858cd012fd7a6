//! Asset version model and trait implementations.
//!
//! An asset version is one scanned build of an asset (for example a
//! firmware release). Findings and components hang off asset versions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{fetch_one, null_default, NamedRef, UserRef};
use crate::client::FiniteStateClient;
use crate::error::Result;
use crate::pagination::ListEndpoint;
use crate::queries;
use crate::traits::{Get, List};

/// A version of an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetVersion {
    /// Asset version id.
    pub id: String,

    /// Version name (e.g. "1.4.2").
    #[serde(default)]
    pub name: Option<String>,

    /// When the version was uploaded.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Uploader.
    #[serde(default)]
    pub created_by: Option<UserRef>,

    /// Risk score relative to the rest of the organization.
    #[serde(default)]
    pub relative_risk_score: Option<f64>,

    /// Test types that ran against this version.
    #[serde(default, deserialize_with = "null_default")]
    pub unique_test_types: Vec<NamedRef>,

    /// Status of each test.
    #[serde(default, deserialize_with = "null_default")]
    pub test_statuses: Vec<String>,

    /// Owning asset.
    #[serde(default)]
    pub asset: Option<AssetRef>,
}

/// The asset an [`AssetVersion`] belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Asset id.
    pub id: String,
    /// Asset name.
    #[serde(default)]
    pub name: Option<String>,
    /// Business unit.
    #[serde(default)]
    pub group: Option<NamedRef>,
}

impl AssetVersion {
    /// Name of the owning asset.
    pub fn asset_name(&self) -> Option<&str> {
        self.asset.as_ref().and_then(|a| a.name.as_deref())
    }

    /// Name of the owning business unit.
    pub fn business_unit(&self) -> Option<&str> {
        self.asset
            .as_ref()
            .and_then(|a| a.group.as_ref())
            .and_then(|g| g.name.as_deref())
    }

    /// Display label: `asset name / version name`.
    pub fn label(&self) -> String {
        format!(
            "{} / {}",
            self.asset_name().unwrap_or("?"),
            self.name.as_deref().unwrap_or(&self.id)
        )
    }
}

/// Query parameters for listing asset versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetVersionListQuery {
    /// A single asset version.
    pub id: Option<String>,
    /// Versions of one asset.
    pub asset_id: Option<String>,
    /// Versions in one business unit.
    pub business_unit_id: Option<String>,
}

impl AssetVersionListQuery {
    /// GraphQL variables for this query, without paging fields.
    pub fn variables(&self) -> Value {
        let mut filter = Map::new();
        if let Some(id) = &self.id {
            filter.insert("id".into(), json!(id));
        }
        if let Some(asset_id) = &self.asset_id {
            filter.insert("asset".into(), json!({ "id": asset_id }));
        }
        if let Some(group) = &self.business_unit_id {
            filter.insert("group".into(), json!({ "id": group }));
        }
        json!({ "filter": filter })
    }
}

#[async_trait]
impl Get for AssetVersion {
    type Id = String;

    #[tracing::instrument(skip(client))]
    async fn get(client: &FiniteStateClient, id: Self::Id) -> Result<Self> {
        let query = AssetVersionListQuery {
            id: Some(id.clone()),
            ..Default::default()
        };
        fetch_one(client, Self::endpoint(&query), "asset version", &id).await
    }
}

impl List for AssetVersion {
    type Query = AssetVersionListQuery;

    fn endpoint(query: &Self::Query) -> ListEndpoint {
        ListEndpoint::graphql(queries::ALL_ASSET_VERSIONS, query.variables(), "allAssetVersions")
    }
}

/// Fetch all asset versions matching a query.
///
/// # Example
///
/// ```ignore
/// use finite_state_sdk::{FiniteStateClient, get_asset_versions, AssetVersionListQuery};
///
/// let client = FiniteStateClient::from_env()?;
/// let query = AssetVersionListQuery {
///     asset_id: Some("asset-1".to_string()),
///     ..Default::default()
/// };
/// let versions = get_asset_versions(&client, query).await?;
/// ```
pub async fn get_asset_versions(
    client: &FiniteStateClient,
    query: AssetVersionListQuery,
) -> Result<Vec<AssetVersion>> {
    AssetVersion::list_all(client, &query).await
}
