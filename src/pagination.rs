//! Pagination over cursor (GraphQL) and offset (REST) list endpoints.
//!
//! [`Paginator`] is an explicit state machine: a cursor, a page size, an
//! exhaustion flag and the set of cursors already consumed. Pages are fetched
//! strictly in sequence; page N+1 is never requested before page N returns.

use std::collections::HashSet;

use futures::stream::{self, Stream, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::client::FiniteStateClient;
use crate::config::{validate_page_size, FetchOptions};
use crate::error::{FiniteStateError, Result};
use crate::retry::RetryPolicy;
use crate::transport::RequestDescriptor;

/// Default ceiling on requests per paginated listing.
pub const MAX_PAGES: u32 = 10_000;

/// One page of records as fetched by a [`Paginator`].
#[derive(Debug, Clone, Serialize)]
#[serde(bound = "T: Serialize")]
pub struct Page<T> {
    /// The items on this page.
    pub items: Vec<T>,
    /// Page number (1-indexed).
    pub page: u32,
    /// Number of items requested per page.
    pub count: u32,
    /// Whether the paginator will request another page.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Returns true if this page has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns an iterator over the items in this page.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Page<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Position in a paginated result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Cursor {
    /// Before the first page.
    #[default]
    Start,
    /// GraphQL `_cursor` of the last record on the previous page.
    After(String),
    /// REST offset.
    Offset(u64),
}

/// A paginated list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ListEndpoint {
    /// GraphQL list field paginated with `after` / `first`.
    GraphQl {
        /// Query document declaring `$after` and `$first`.
        query: String,
        /// Base variables; `after` and `first` are overwritten per page.
        variables: Value,
        /// Field under `data` holding the records.
        field: String,
    },
    /// REST collection paginated with `limit` / `offset`.
    Rest {
        /// Path relative to the REST base URL.
        path: String,
        /// Extra query parameters.
        params: Vec<(String, String)>,
    },
}

impl ListEndpoint {
    /// Build a GraphQL list endpoint.
    pub fn graphql(query: impl Into<String>, variables: Value, field: impl Into<String>) -> Self {
        Self::GraphQl {
            query: query.into(),
            variables,
            field: field.into(),
        }
    }

    /// Build a REST list endpoint.
    pub fn rest(path: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self::Rest {
            path: path.into(),
            params,
        }
    }

    /// The request for the page at `cursor`.
    pub fn request(&self, cursor: &Cursor, page_size: u32) -> RequestDescriptor {
        match self {
            Self::GraphQl {
                query, variables, ..
            } => {
                let mut variables = match variables {
                    Value::Object(map) => map.clone(),
                    _ => serde_json::Map::new(),
                };
                let after = match cursor {
                    Cursor::After(c) => Value::String(c.clone()),
                    _ => Value::Null,
                };
                variables.insert("after".to_string(), after);
                variables.insert("first".to_string(), Value::from(page_size));
                RequestDescriptor::graphql(query.clone(), Value::Object(variables))
            }
            Self::Rest { path, params } => {
                let offset = match cursor {
                    Cursor::Offset(o) => *o,
                    _ => 0,
                };
                let mut params = params.clone();
                params.push(("limit".to_string(), page_size.to_string()));
                params.push(("offset".to_string(), offset.to_string()));
                RequestDescriptor::rest(path.clone(), params)
            }
        }
    }

    /// Pull the record array out of a response payload.
    ///
    /// # Errors
    ///
    /// Returns [`FiniteStateError::UnexpectedShape`] if the records are missing.
    pub fn extract(&self, payload: Value) -> Result<Vec<Value>> {
        let records = match self {
            Self::GraphQl { field, .. } => {
                let data = payload.get("data").ok_or_else(|| {
                    FiniteStateError::UnexpectedShape("response has no data".to_string())
                })?;
                match data.get(field.as_str()) {
                    Some(Value::Array(items)) => items.clone(),
                    Some(Value::Null) => Vec::new(),
                    Some(_) => {
                        return Err(FiniteStateError::UnexpectedShape(format!(
                            "{field} is not a list"
                        )))
                    }
                    None => {
                        return Err(FiniteStateError::UnexpectedShape(format!(
                            "{field} not in response"
                        )))
                    }
                }
            }
            Self::Rest { path, .. } => match payload {
                Value::Array(items) => items,
                Value::Object(mut map) => match map.remove("items").or_else(|| map.remove("data")) {
                    Some(Value::Array(items)) => items,
                    _ => {
                        return Err(FiniteStateError::UnexpectedShape(format!(
                            "{path} did not return a list"
                        )))
                    }
                },
                Value::Null => Vec::new(),
                _ => {
                    return Err(FiniteStateError::UnexpectedShape(format!(
                        "{path} did not return a list"
                    )))
                }
            },
        };
        Ok(records)
    }

    /// Where the page after `records` starts, or `None` if the server
    /// declared no continuation.
    pub fn next_cursor(&self, records: &[Value], current: &Cursor, page_size: u32) -> Option<Cursor> {
        match self {
            Self::GraphQl { .. } => records
                .last()
                .and_then(|r| r.get("_cursor"))
                .and_then(Value::as_str)
                .map(|c| Cursor::After(c.to_string())),
            Self::Rest { .. } => {
                let offset = match current {
                    Cursor::Offset(o) => *o,
                    _ => 0,
                };
                Some(Cursor::Offset(offset + u64::from(page_size)))
            }
        }
    }
}

/// Pagination state: where we are and what has been consumed.
#[derive(Debug, Clone, Default)]
pub struct PageState {
    /// Cursor for the next request.
    pub cursor: Cursor,
    /// No further pages will be requested.
    pub exhausted: bool,
    /// Requests issued so far.
    pub pages_fetched: u32,
    /// Records handed to the caller so far.
    pub yielded: usize,
    consumed: HashSet<String>,
}

/// Records fetched before a page failed, plus the failure.
#[derive(Debug, Error)]
#[error("pagination interrupted after {} records: {error}", .records.len())]
pub struct Interrupted {
    /// Everything yielded before the failure, in page order.
    pub records: Vec<Value>,
    /// The error that stopped pagination.
    #[source]
    pub error: FiniteStateError,
}

impl From<Interrupted> for FiniteStateError {
    fn from(interrupted: Interrupted) -> Self {
        FiniteStateError::Interrupted {
            fetched: interrupted.records.len(),
            source: Box::new(interrupted.error),
        }
    }
}

/// Drives a [`ListEndpoint`] page by page.
///
/// Finite and restartable: [`Paginator::restart`] rewinds to the first page.
#[derive(Debug)]
pub struct Paginator {
    client: FiniteStateClient,
    endpoint: ListEndpoint,
    retry: RetryPolicy,
    page_size: u32,
    max_records: Option<usize>,
    max_pages: u32,
    state: PageState,
}

impl Paginator {
    /// Create a paginator. Page size is validated on the first fetch.
    pub fn new(client: FiniteStateClient, endpoint: ListEndpoint, options: &FetchOptions) -> Self {
        Self {
            client,
            endpoint,
            retry: options.retry.clone(),
            page_size: options.page_size,
            max_records: options.max_records,
            max_pages: MAX_PAGES,
            state: PageState::default(),
        }
    }

    /// Cap the total number of records yielded.
    #[must_use]
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Fail with [`FiniteStateError::PageLimit`] instead of requesting
    /// more than `max_pages` pages.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// The current state.
    pub fn state(&self) -> &PageState {
        &self.state
    }

    /// The endpoint being paginated.
    pub fn endpoint(&self) -> &ListEndpoint {
        &self.endpoint
    }

    /// Rewind to the first page.
    pub fn restart(&mut self) {
        self.state = PageState::default();
    }

    /// Fetch the next page, or `None` once exhausted.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error from the retry policy, a shape error,
    /// [`FiniteStateError::CursorReused`], or [`FiniteStateError::PageLimit`]
    /// when more pages remain after the page ceiling. The paginator is
    /// exhausted afterwards.
    #[tracing::instrument(skip(self), fields(page = self.state.pages_fetched + 1))]
    pub async fn next_page(&mut self) -> Result<Option<Page<Value>>> {
        validate_page_size(self.page_size)?;

        if self.state.exhausted {
            return Ok(None);
        }
        let remaining = match self.max_records {
            Some(max) if self.state.yielded >= max => {
                self.state.exhausted = true;
                return Ok(None);
            }
            Some(max) => Some(max - self.state.yielded),
            None => None,
        };
        if self.state.pages_fetched >= self.max_pages {
            tracing::warn!(
                pages = self.state.pages_fetched,
                yielded = self.state.yielded,
                "page limit reached with more pages pending"
            );
            self.state.exhausted = true;
            return Err(FiniteStateError::PageLimit {
                pages: self.state.pages_fetched,
            });
        }

        let request = self.endpoint.request(&self.state.cursor, self.page_size);
        if let Cursor::After(c) = &self.state.cursor {
            self.state.consumed.insert(c.clone());
        }

        let result = self.fetch(&request).await;
        let mut records = match result {
            Ok(records) => records,
            Err(e) => {
                self.state.exhausted = true;
                return Err(e);
            }
        };
        self.state.pages_fetched += 1;

        let received = records.len();
        let next = self
            .endpoint
            .next_cursor(&records, &self.state.cursor, self.page_size);

        if let Some(Cursor::After(c)) = &next {
            if self.state.consumed.contains(c) {
                self.state.exhausted = true;
                return Err(FiniteStateError::CursorReused(c.clone()));
            }
        }

        let mut done = received < self.page_size as usize || next.is_none();
        if let Some(remaining) = remaining {
            if received >= remaining {
                records.truncate(remaining);
                done = true;
            }
        }

        tracing::debug!(received, done, "fetched page");

        self.state.yielded += records.len();
        self.state.exhausted = done;
        if let Some(next) = next {
            self.state.cursor = next;
        }

        if records.is_empty() {
            return Ok(None);
        }

        Ok(Some(Page {
            items: records,
            page: self.state.pages_fetched,
            count: self.page_size,
            has_more: !done,
        }))
    }

    async fn fetch(&self, request: &RequestDescriptor) -> Result<Vec<Value>> {
        let payload = self.client.send_with(request, &self.retry).await?;
        self.endpoint.extract(payload)
    }

    /// Fetch every remaining page.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] carrying the records fetched before the
    /// failing page.
    pub async fn collect_all(&mut self) -> core::result::Result<Vec<Value>, Interrupted> {
        let mut records = Vec::new();
        loop {
            match self.next_page().await {
                Ok(Some(page)) => records.extend(page.items),
                Ok(None) => return Ok(records),
                Err(error) => return Err(Interrupted { records, error }),
            }
        }
    }

    /// Lazily yield records one at a time.
    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> + Send {
        stream::try_unfold(self, |mut paginator| async move {
            let page = paginator.next_page().await?;
            Ok::<_, FiniteStateError>(page.map(|page| {
                let records = stream::iter(page.items.into_iter().map(Ok::<Value, FiniteStateError>));
                (records, paginator)
            }))
        })
        .try_flatten()
    }
}
