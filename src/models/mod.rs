//! Finite State entity types.

mod asset;
mod asset_version;
mod finding;
mod organization;
mod product;
mod project;
mod software_component;

pub use asset::*;
pub use asset_version::*;
pub use finding::*;
pub use organization::*;
pub use product::*;
pub use project::*;
pub use software_component::*;

use serde::{Deserialize, Deserializer, Serialize};

use crate::client::FiniteStateClient;
use crate::error::{FiniteStateError, Result};
use crate::pagination::ListEndpoint;
use crate::traits::List;

/// A reference to another entity by id and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    /// Entity id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// The user who created an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User id.
    pub id: String,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
}

/// Treat an explicit `null` like a missing field.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> core::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Fetch the first record of `endpoint`, or a 404 client error.
pub(crate) async fn fetch_one<T: List>(
    client: &FiniteStateClient,
    endpoint: ListEndpoint,
    kind: &str,
    id: &str,
) -> Result<T> {
    let mut paginator = client.paginate(endpoint).with_max_records(1);
    match T::next_page(&mut paginator).await? {
        Some(page) => page.into_iter().next().ok_or_else(|| not_found(kind, id)),
        None => Err(not_found(kind, id)),
    }
}

fn not_found(kind: &str, id: &str) -> FiniteStateError {
    FiniteStateError::client(Some(404), format!("{kind} '{id}' not found"))
}
