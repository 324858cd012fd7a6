//! Get trait for fetching single entities.

use async_trait::async_trait;

use crate::client::FiniteStateClient;
use crate::error::Result;

/// Fetch a single entity by ID.
///
/// # Example
///
/// ```ignore
/// use finite_state_sdk::{FiniteStateClient, AssetVersion, Get};
///
/// let client = FiniteStateClient::from_env()?;
/// let version = AssetVersion::get(&client, "av-123".to_string()).await?;
/// ```
#[async_trait]
pub trait Get: Sized {
    /// The ID type for this entity.
    type Id;

    /// Fetch the entity by ID.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FiniteStateError::Client`] with status 404 if no
    /// entity has this id, or the request error.
    async fn get(client: &FiniteStateClient, id: Self::Id) -> Result<Self>;
}
