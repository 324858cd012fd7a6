//! List trait for fetching collections of entities.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::FiniteStateClient;
use crate::error::Result;
use crate::pagination::{ListEndpoint, Page, Paginator};

/// List/filter entities with pagination support.
///
/// Implementors only describe the endpoint; paging, retries and
/// deserialization are shared.
///
/// # Example
///
/// ```ignore
/// use finite_state_sdk::{FiniteStateClient, Finding, FindingListQuery, List};
///
/// let client = FiniteStateClient::from_env()?;
///
/// // Page by page
/// let mut pages = Finding::paginator(&client, &FindingListQuery::for_asset_version("av-1"));
/// while let Some(page) = Finding::next_page(&mut pages).await? {
///     println!("{} findings", page.len());
/// }
///
/// // Everything
/// let all = Finding::list_all(&client, &Default::default()).await?;
/// ```
#[async_trait]
pub trait List: DeserializeOwned + Send {
    /// Query parameters for filtering.
    type Query: Default + Send + Sync;

    /// The paginated endpoint for `query`.
    fn endpoint(query: &Self::Query) -> ListEndpoint;

    /// A paginator over `query` using the client's default options.
    fn paginator(client: &FiniteStateClient, query: &Self::Query) -> Paginator {
        client.paginate(Self::endpoint(query))
    }

    /// Fetch and deserialize the next page of `paginator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or a record does not match
    /// the entity type.
    async fn next_page(paginator: &mut Paginator) -> Result<Option<Page<Self>>> {
        match paginator.next_page().await? {
            Some(page) => Ok(Some(deserialize_page(page)?)),
            None => Ok(None),
        }
    }

    /// List all entities matching the query (fetches all pages).
    ///
    /// # Errors
    ///
    /// Returns [`crate::FiniteStateError::Interrupted`] if a page fails
    /// after earlier pages were fetched.
    async fn list_all(client: &FiniteStateClient, query: &Self::Query) -> Result<Vec<Self>> {
        let raw = Self::paginator(client, query).collect_all().await?;
        deserialize_all(raw)
    }

    /// List at most `limit` entities.
    ///
    /// # Errors
    ///
    /// See [`List::list_all`].
    async fn list_limited(
        client: &FiniteStateClient,
        query: &Self::Query,
        limit: usize,
    ) -> Result<Vec<Self>> {
        let raw = Self::paginator(client, query)
            .with_max_records(limit)
            .collect_all()
            .await?;
        deserialize_all(raw)
    }
}

fn deserialize_page<T: DeserializeOwned>(page: Page<Value>) -> Result<Page<T>> {
    let items = deserialize_all(page.items)?;
    Ok(Page {
        items,
        page: page.page,
        count: page.count,
        has_more: page.has_more,
    })
}

fn deserialize_all<T: DeserializeOwned>(raw: Vec<Value>) -> Result<Vec<T>> {
    raw.into_iter()
        .map(|value| serde_json::from_value(value).map_err(Into::into))
        .collect()
}
