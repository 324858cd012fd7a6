//! Product model.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{fetch_one, not_found, null_default, NamedRef};
use crate::client::FiniteStateClient;
use crate::error::{FiniteStateError, Result};
use crate::pagination::ListEndpoint;
use crate::queries;
use crate::traits::{Get, List};

/// A product groups asset versions shipped together.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product id.
    pub id: String,
    /// Product name.
    #[serde(default)]
    pub name: Option<String>,
    /// When the product was created.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Query parameters for listing products.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductListQuery {
    /// A single product.
    pub id: Option<String>,
    /// Products in one business unit.
    pub business_unit_id: Option<String>,
}

impl ProductListQuery {
    /// GraphQL variables for this query, without paging fields.
    pub fn variables(&self) -> Value {
        let mut filter = serde_json::Map::new();
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
impl Get for Product {
    type Id = String;

    #[tracing::instrument(skip(client))]
    async fn get(client: &FiniteStateClient, id: Self::Id) -> Result<Self> {
        let query = ProductListQuery {
            id: Some(id.clone()),
            ..Default::default()
        };
        fetch_one(client, Self::endpoint(&query), "product", &id).await
    }
}

impl List for Product {
    type Query = ProductListQuery;

    fn endpoint(query: &Self::Query) -> ListEndpoint {
        ListEndpoint::graphql(queries::ALL_PRODUCTS, query.variables(), "allProducts")
    }
}

/// An asset version shipped in a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAssetVersion {
    /// Asset version id.
    pub id: String,
    /// Version name.
    #[serde(default)]
    pub name: Option<String>,
    /// Relative risk score.
    #[serde(default)]
    pub relative_risk_score: Option<f64>,
    /// The asset this version belongs to.
    #[serde(default)]
    pub asset: Option<NamedRef>,
}

#[derive(Deserialize)]
struct ProductVersions {
    #[serde(default, deserialize_with = "null_default")]
    assets: Vec<ProductAssetVersion>,
}

/// Fetch the asset versions of one product.
///
/// # Errors
///
/// Returns [`FiniteStateError::InvalidArgument`] for an empty id and a 404
/// [`FiniteStateError::Client`] if the product does not exist.
#[tracing::instrument(skip(client))]
pub async fn get_product_asset_versions(
    client: &FiniteStateClient,
    product_id: &str,
) -> Result<Vec<ProductAssetVersion>> {
    if product_id.is_empty() {
        return Err(FiniteStateError::InvalidArgument(
            "product id is required".to_string(),
        ));
    }
    let query = ProductListQuery {
        id: Some(product_id.to_string()),
        ..Default::default()
    };
    let endpoint = ListEndpoint::graphql(
        queries::PRODUCT_ASSET_VERSIONS,
        query.variables(),
        "allProducts",
    );
    let raw = client.paginate(endpoint).collect_all().await?;
    if raw.is_empty() {
        return Err(not_found("product", product_id));
    }

    let mut versions = Vec::new();
    for value in raw {
        let product: ProductVersions = serde_json::from_value(value)?;
        versions.extend(product.assets);
    }
    Ok(versions)
}
