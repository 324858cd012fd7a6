//! Project model from the public REST API.
//!
//! Projects are listed with `limit`/`offset` paging rather than GraphQL
//! cursors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::FiniteStateClient;
use crate::error::{FiniteStateError, Result};
use crate::pagination::ListEndpoint;
use crate::traits::{Get, List};
use crate::transport::RequestDescriptor;

/// A project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project id.
    pub id: String,

    /// Project name.
    pub name: String,

    /// Project type.
    #[serde(rename = "type", default)]
    pub project_type: Option<String>,

    /// When the project was created.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    /// Default branch with its latest version.
    #[serde(default)]
    pub default_branch: Option<Branch>,
}

/// A project branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    /// Branch id.
    #[serde(default)]
    pub id: Option<String>,
    /// Branch name.
    #[serde(default)]
    pub name: Option<String>,
    /// Most recent version on the branch.
    #[serde(default)]
    pub latest_version: Option<ProjectVersion>,
}

/// A version of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectVersion {
    /// Version id.
    pub id: String,
    /// Version name.
    #[serde(default)]
    pub name: Option<String>,
    /// When the version was created.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl Project {
    /// Latest version on the default branch.
    pub fn latest_version(&self) -> Option<&ProjectVersion> {
        self.default_branch
            .as_ref()
            .and_then(|b| b.latest_version.as_ref())
    }
}

/// Query parameters for listing projects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectListQuery {
    /// Extra query parameters passed through to the API.
    pub params: Vec<(String, String)>,
}

#[async_trait]
impl Get for Project {
    type Id = String;

    #[tracing::instrument(skip(client))]
    async fn get(client: &FiniteStateClient, id: Self::Id) -> Result<Self> {
        let path = format!("projects/{id}");
        let payload = client
            .send(&RequestDescriptor::rest(path, Vec::new()))
            .await?;
        Ok(serde_json::from_value(payload)?)
    }
}

impl List for Project {
    type Query = ProjectListQuery;

    fn endpoint(query: &Self::Query) -> ListEndpoint {
        ListEndpoint::rest("projects", query.params.clone())
    }
}

/// Find a project by exact name.
///
/// # Errors
///
/// Returns a 404 [`FiniteStateError::Client`] if no project has this name.
pub async fn find_project_by_name(client: &FiniteStateClient, name: &str) -> Result<Project> {
    Project::list_all(client, &ProjectListQuery::default())
        .await?
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| FiniteStateError::client(Some(404), format!("project '{name}' not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_deserialize() {
        let json = r#"{
            "id": "p-1",
            "name": "gateway-fw",
            "type": "firmware",
            "defaultBranch": {
                "id": "b-1",
                "name": "main",
                "latestVersion": {"id": "v-9", "name": "3.2.0", "created": "2025-04-01T10:00:00Z"}
            }
        }"#;

        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.project_type.as_deref(), Some("firmware"));
        assert_eq!(project.latest_version().map(|v| v.id.as_str()), Some("v-9"));
    }

    #[test]
    fn test_project_without_branch() {
        let project: Project = serde_json::from_str(r#"{"id": "p-2", "name": "bare"}"#).unwrap();
        assert!(project.latest_version().is_none());
    }
}
