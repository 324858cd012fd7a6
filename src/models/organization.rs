//! Organization directory: business units and users.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::FiniteStateClient;
use crate::error::Result;
use crate::pagination::ListEndpoint;
use crate::queries;
use crate::traits::List;

/// A business unit. The API returns these as `Group` records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessUnit {
    /// Group id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A user of the organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: String,
    /// Login email.
    #[serde(default)]
    pub email: Option<String>,
}

impl List for BusinessUnit {
    type Query = ();

    fn endpoint(_query: &Self::Query) -> ListEndpoint {
        ListEndpoint::graphql(queries::ALL_BUSINESS_UNITS, json!({}), "allGroups")
    }
}

impl List for User {
    type Query = ();

    fn endpoint(_query: &Self::Query) -> ListEndpoint {
        ListEndpoint::graphql(queries::ALL_USERS, json!({}), "allUsers")
    }
}

/// Fetch every business unit.
pub async fn get_all_business_units(client: &FiniteStateClient) -> Result<Vec<BusinessUnit>> {
    BusinessUnit::list_all(client, &()).await
}

/// Fetch every user.
pub async fn get_all_users(client: &FiniteStateClient) -> Result<Vec<User>> {
    User::list_all(client, &()).await
}
