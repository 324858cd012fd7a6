//! Software component model.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{null_default, AffectedComponent, AssetVersion};
use crate::client::FiniteStateClient;
use crate::error::{FiniteStateError, Result};
use crate::pagination::ListEndpoint;
use crate::queries;
use crate::traits::List;

/// A component instance found in an asset version's SBOM.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareComponent {
    /// Instance id.
    pub id: String,

    /// Component name.
    #[serde(default)]
    pub name: Option<String>,

    /// Component type, e.g. `LIBRARY` or `OPERATING_SYSTEM`.
    #[serde(rename = "type", default)]
    pub component_type: Option<String>,

    /// Version string.
    #[serde(default)]
    pub version: Option<String>,

    /// File hashes.
    #[serde(default, deserialize_with = "null_default")]
    pub hashes: Vec<Hash>,

    /// Declared licenses.
    #[serde(default, deserialize_with = "null_default")]
    pub licenses: Vec<License>,

    /// CPEs and purl.
    #[serde(default)]
    pub software_identifiers: Option<SoftwareIdentifiers>,

    /// Platform risk score.
    #[serde(default)]
    pub absolute_risk_score: Option<f64>,

    /// Owning asset version; populated by organization-wide SBOM searches.
    #[serde(default)]
    pub asset_version: Option<AssetVersion>,

    /// Components merged into this instance; populated by asset version
    /// SBOM searches.
    #[serde(default, deserialize_with = "null_default")]
    pub original_components: Vec<AffectedComponent>,
}

/// A file hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hash {
    /// Algorithm, e.g. `SHA256`.
    pub alg: String,
    /// Hex digest.
    pub content: String,
}

/// A license.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// License id.
    pub id: String,
    /// SPDX name.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the license is copyleft.
    #[serde(default)]
    pub copy_left: Option<String>,
    /// Reference URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// Package identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoftwareIdentifiers {
    /// CPE strings.
    #[serde(default, deserialize_with = "null_default")]
    pub cpes: Vec<String>,
    /// Package URL.
    #[serde(default)]
    pub purl: Option<String>,
}

impl SoftwareComponent {
    /// License names, sorted and de-duplicated.
    pub fn license_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.licenses.iter().filter_map(|l| l.name.as_deref()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Package URL, if known.
    pub fn purl(&self) -> Option<&str> {
        self.software_identifiers.as_ref().and_then(|s| s.purl.as_deref())
    }
}

/// Query parameters for listing components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftwareComponentListQuery {
    /// Components of one asset version.
    pub asset_version_id: Option<String>,
    /// Restrict to a component type.
    pub component_type: Option<String>,
}

impl SoftwareComponentListQuery {
    /// GraphQL variables for this query, without paging fields.
    pub fn variables(&self) -> Value {
        let mut filter = Map::new();
        filter.insert("mergedComponentRefId".into(), Value::Null);
        filter.insert("deletedAt".into(), Value::Null);
        if let Some(av) = &self.asset_version_id {
            filter.insert("assetVersionRefId".into(), json!(av));
        }
        if let Some(kind) = &self.component_type {
            filter.insert("type_in".into(), json!([kind]));
        }
        json!({ "filter": filter, "orderBy": ["absoluteRiskScore_DESC"] })
    }
}

impl List for SoftwareComponent {
    type Query = SoftwareComponentListQuery;

    fn endpoint(query: &Self::Query) -> ListEndpoint {
        ListEndpoint::graphql(
            queries::ALL_SOFTWARE_COMPONENTS,
            query.variables(),
            "allSoftwareComponentInstances",
        )
    }
}

/// How [`SbomSearch`] matches component names and versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMethod {
    /// Whole-string match.
    #[default]
    Exact,
    /// Substring match.
    Contains,
}

/// A search for components by name across SBOMs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SbomSearch {
    /// Component name to look for. Required.
    pub name: String,
    /// Only this version.
    pub version: Option<String>,
    /// Search one asset version instead of the whole organization.
    pub asset_version_id: Option<String>,
    /// Matching method.
    pub method: SearchMethod,
    /// Exact name matches respect case. Substring matches never do.
    pub case_sensitive: bool,
}

impl SbomSearch {
    /// Exact, case-insensitive search for `name` across the organization.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check that a name was given.
    ///
    /// # Errors
    ///
    /// Returns [`FiniteStateError::InvalidArgument`] if the name is blank.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FiniteStateError::InvalidArgument(
                "component name is required".to_string(),
            ));
        }
        Ok(())
    }

    /// GraphQL variables for this search, without paging fields.
    pub fn variables(&self) -> Value {
        let mut filter = Map::new();
        filter.insert("mergedComponentRefId".into(), Value::Null);
        if let Some(av) = &self.asset_version_id {
            filter.insert("assetVersionRefId".into(), json!(av));
        }
        let name_key = match (self.method, self.case_sensitive) {
            (SearchMethod::Exact, true) => "name",
            (SearchMethod::Exact, false) => "name_like",
            (SearchMethod::Contains, _) => "name_contains",
        };
        filter.insert(name_key.into(), json!(self.name));
        if let Some(version) = &self.version {
            let version_key = match self.method {
                SearchMethod::Exact => "version",
                SearchMethod::Contains => "version_contains",
            };
            filter.insert(version_key.into(), json!(version));
        }
        json!({ "filter": filter })
    }

    /// The paginated endpoint for this search.
    pub fn endpoint(&self) -> ListEndpoint {
        let document = if self.asset_version_id.is_some() {
            queries::SEARCH_SBOM_IN_ASSET_VERSION
        } else {
            queries::SEARCH_SBOM
        };
        ListEndpoint::graphql(document, self.variables(), "allSoftwareComponentInstances")
    }
}

/// Find component instances by name.
///
/// # Example
///
/// ```ignore
/// use finite_state_sdk::{search_sbom, FiniteStateClient, SbomSearch, SearchMethod};
///
/// let client = FiniteStateClient::from_env()?;
/// let hits = search_sbom(&client, &SbomSearch {
///     method: SearchMethod::Contains,
///     ..SbomSearch::new("openssl")
/// }).await?;
/// ```
///
/// # Errors
///
/// Returns [`FiniteStateError::InvalidArgument`] if the name is empty.
#[tracing::instrument(skip(client))]
pub async fn search_sbom(
    client: &FiniteStateClient,
    search: &SbomSearch,
) -> Result<Vec<SoftwareComponent>> {
    search.validate()?;
    let raw = client.paginate(search.endpoint()).collect_all().await?;
    raw.into_iter()
        .map(|value| serde_json::from_value(value).map_err(Into::into))
        .collect()
}

/// Fetch all components of an asset version.
pub async fn get_software_components(
    client: &FiniteStateClient,
    asset_version_id: &str,
    component_type: Option<String>,
) -> Result<Vec<SoftwareComponent>> {
    let query = SoftwareComponentListQuery {
        asset_version_id: Some(asset_version_id.to_string()),
        component_type,
    };
    SoftwareComponent::list_all(client, &query).await
}
