//! Resource Fetcher
//!
//! Cursor pagination over NSX-T list endpoints and display-name lookups.

use super::client::NsxtClient;
use super::http::NsxtError;
use crate::error::ResourceError;
use serde::Serialize;
use serde_json::{json, Value};

/// Pass-through list query parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, clap::Args)]
pub struct ListParams {
    /// Opaque cursor from a previous page
    #[arg(long)]
    pub cursor: Option<String>,

    /// Maximum number of results per page
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Field to sort on
    #[arg(long)]
    pub sort_by: Option<String>,

    #[arg(long)]
    pub sort_ascending: Option<bool>,

    /// Comma separated list of fields to include in each result
    #[arg(long)]
    pub included_fields: Option<String>,

    #[arg(long)]
    pub include_mark_for_delete_objects: Option<bool>,

    /// Resource specific parameters such as `include_system_owned`
    #[arg(skip)]
    pub extra: Vec<(String, String)>,
}

impl ListParams {
    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extra.push((key.to_string(), value.to_string()));
        self
    }

    fn with_cursor(&self, cursor: Option<&str>) -> Self {
        let mut params = self.clone();
        params.cursor = cursor.map(str::to_string);
        params
    }

    /// Build the query string pairs, skipping unset values
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                query.push((key.to_string(), value));
            }
        };
        push("cursor", self.cursor.clone());
        push("page_size", self.page_size.map(|v| v.to_string()));
        push("sort_by", self.sort_by.clone());
        push("sort_ascending", self.sort_ascending.map(|v| v.to_string()));
        push("included_fields", self.included_fields.clone());
        push(
            "include_mark_for_delete_objects",
            self.include_mark_for_delete_objects.map(|v| v.to_string()),
        );
        query.extend(self.extra.iter().cloned());
        query
    }
}

/// Result of paginated fetch
pub struct PaginatedResult {
    pub items: Vec<Value>,
    pub next_cursor: Option<String>,
}

/// Fetch one raw page
pub async fn list_page(
    client: &NsxtClient,
    url: &str,
    params: &ListParams,
) -> Result<Value, NsxtError> {
    let page = client.get(url, &params.to_query()).await?;
    Ok(page.unwrap_or_else(|| json!({ "results": [] })))
}

/// Fetch one page and split out results and cursor
pub async fn list_paginated(
    client: &NsxtClient,
    url: &str,
    params: &ListParams,
) -> Result<PaginatedResult, NsxtError> {
    let page = list_page(client, url, params).await?;

    let items = page
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let next_cursor = page
        .get("cursor")
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string);

    Ok(PaginatedResult { items, next_cursor })
}

/// Fetch all results (auto-paginate)
pub async fn list_all(
    client: &NsxtClient,
    url: &str,
    params: &ListParams,
) -> Result<Vec<Value>, NsxtError> {
    let mut all_items = Vec::new();
    let mut cursor = params.cursor.clone();

    loop {
        let result = list_paginated(client, url, &params.with_cursor(cursor.as_deref())).await?;
        all_items.extend(result.items);

        if result.next_cursor.is_none() || result.next_cursor == cursor {
            break;
        }
        cursor = result.next_cursor;
    }

    Ok(all_items)
}

/// All objects whose `display_name` matches, across every page
pub async fn find_all_by_display_name(
    client: &NsxtClient,
    url: &str,
    display_name: &str,
    params: &ListParams,
) -> Result<Vec<Value>, NsxtError> {
    let items = list_all(client, url, params).await?;
    Ok(items
        .into_iter()
        .filter(|item| item.get("display_name").and_then(Value::as_str) == Some(display_name))
        .collect())
}

/// `{"results": [...]}` of objects with the given display name
pub async fn find_by_display_name(
    client: &NsxtClient,
    url: &str,
    display_name: &str,
    params: &ListParams,
) -> Result<Value, NsxtError> {
    let matches = find_all_by_display_name(client, url, display_name, params).await?;
    Ok(json!({ "result_count": matches.len(), "results": matches }))
}

/// Resolve a display name to the id of the single matching object
pub async fn resolve_id(
    client: &NsxtClient,
    url: &str,
    display_name: &str,
    resource_type: &str,
) -> Result<String, ResourceError> {
    let matches = find_all_by_display_name(client, url, display_name, &ListParams::default())
        .await
        .map_err(|e| ResourceError::from_nsxt(resource_type, &e))?;

    match matches.as_slice() {
        [] => Err(ResourceError::new(
            resource_type,
            format!(
                "No object found with display name {} at path {}",
                display_name, url
            ),
        )),
        [only] => only
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ResourceError::new(
                    resource_type,
                    format!("Object with display name {} at path {} has no id", display_name, url),
                )
            }),
        _ => Err(ResourceError::new(
            resource_type,
            format!(
                "Multiple objects found with display name {} at path {}, please provide id",
                display_name, url
            ),
        )),
    }
}
