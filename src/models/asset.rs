//! Asset model.
//!
//! An asset is a device or software project; each upload of it is an
//! [`super::AssetVersion`].

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

/// An asset and a summary of its versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Asset id.
    pub id: String,

    /// Asset name.
    #[serde(default)]
    pub name: Option<String>,

    /// When the asset was created.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Creator.
    #[serde(default)]
    pub created_by: Option<UserRef>,

    /// Owning business unit.
    #[serde(default)]
    pub group: Option<NamedRef>,

    /// Access-control context.
    #[serde(default)]
    pub ctx: Option<AssetContext>,

    /// Versions uploaded for this asset.
    #[serde(default, deserialize_with = "null_default")]
    pub versions: Vec<AssetVersionSummary>,
}

/// Ids the platform uses for role based access control on an asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetContext {
    /// The asset's own id.
    #[serde(default)]
    pub asset: Option<String>,
    /// Business units with access.
    #[serde(default, deserialize_with = "null_default")]
    pub business_units: Vec<String>,
    /// Products containing the asset.
    #[serde(default, deserialize_with = "null_default")]
    pub products: Vec<String>,
}

/// An asset version as listed under its asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetVersionSummary {
    /// Asset version id.
    pub id: String,
    /// Version name.
    #[serde(default)]
    pub name: Option<String>,
    /// Relative risk score.
    #[serde(default)]
    pub relative_risk_score: Option<f64>,
    /// Status of each test.
    #[serde(default, deserialize_with = "null_default")]
    pub test_statuses: Vec<String>,
}

impl Asset {
    /// Business unit name.
    pub fn business_unit(&self) -> Option<&str> {
        self.group.as_ref().and_then(|g| g.name.as_deref())
    }

    /// The most recently listed version.
    pub fn latest_version(&self) -> Option<&AssetVersionSummary> {
        self.versions.last()
    }
}

/// Query parameters for listing assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetListQuery {
    /// A single asset.
    pub id: Option<String>,
    /// Assets in one business unit.
    pub business_unit_id: Option<String>,
}

impl AssetListQuery {
    /// GraphQL variables for this query, without paging fields.
    pub fn variables(&self) -> Value {
        let mut filter = Map::new();
        if let Some(id) = &self.id {
            filter.insert("id".into(), json!(id));
        }
        if let Some(group) = &self.business_unit_id {
            filter.insert("group".into(), json!({ "id": group }));
        }
        json!({ "filter": filter })
    }
}

#[async_trait]
impl Get for Asset {
    type Id = String;

    #[tracing::instrument(skip(client))]
    async fn get(client: &FiniteStateClient, id: Self::Id) -> Result<Self> {
        let query = AssetListQuery {
            id: Some(id.clone()),
            ..Default::default()
        };
        fetch_one(client, Self::endpoint(&query), "asset", &id).await
    }
}

impl List for Asset {
    type Query = AssetListQuery;

    fn endpoint(query: &Self::Query) -> ListEndpoint {
        ListEndpoint::graphql(queries::ALL_ASSETS, query.variables(), "allAssets")
    }
}

/// Fetch all assets matching a query; the default query returns every asset.
pub async fn get_assets(client: &FiniteStateClient, query: AssetListQuery) -> Result<Vec<Asset>> {
    Asset::list_all(client, &query).await
}
