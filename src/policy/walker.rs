//! Hierarchy walker
//!
//! Turns a nested spec into ordered Policy API calls. Parents are saved
//! before their children, children are deleted before their parents, and
//! siblings are visited by descending priority.

use super::flatten::flatten;
use super::log::ExecutionLog;
use crate::diff::{fill_missing, has_changes};
use crate::error::ResourceError;
use crate::nsxt::fetcher::{list_all, ListParams};
use crate::nsxt::urls::{item_path, PathVars};
use crate::nsxt::{NsxtClient, NsxtError};
use crate::resource::NodeDef;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};

const DUPLICATE_NAME_MESSAGE: &str = "More then one resource exist with same name";

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Save sub-resources before their parent
    pub children_first: bool,
}

fn wants_absent(item: &Value) -> bool {
    item.get("state").and_then(Value::as_str) == Some("absent")
}

fn object_id(object: &Value) -> Option<&str> {
    object.get("id").and_then(Value::as_str)
}

fn query_failure(node: &NodeDef, error: &NsxtError) -> ResourceError {
    ResourceError::new(
        &node.identifier,
        format!("Failure while querying {}: {}", node.identifier, error),
    )
}

/// Ids of the objects of one child kind under a bound parent
async fn list_child_ids(
    client: &NsxtClient,
    child: &NodeDef,
    ids: &PathVars,
) -> Result<Vec<String>, NsxtError> {
    if let Some(fixed) = &child.fixed_id {
        return Ok(vec![fixed.clone()]);
    }
    let collection = match child.collection_path(ids) {
        Ok(path) => client.policy_url(&path),
        Err(err) => return Err(NsxtError::InvalidInput(err.message)),
    };
    let items = list_all(client, &collection, &ListParams::default()).await?;
    Ok(items
        .iter()
        .filter_map(object_id)
        .map(str::to_string)
        .collect())
}

/// Stateful walk over one tree; consumed by the operation it runs
pub struct Walker<'a> {
    client: &'a NsxtClient,
    options: WalkOptions,
    log: ExecutionLog,
}

impl<'a> Walker<'a> {
    pub fn new(client: &'a NsxtClient, options: WalkOptions) -> Self {
        Self {
            client,
            options,
            log: ExecutionLog::new(),
        }
    }

    /// Create or update the whole tree described by `spec`
    pub async fn create_or_update(mut self, root: &NodeDef, spec: &Value) -> ExecutionLog {
        if let Err(err) = self.save(root, vec![spec], PathVars::new()).await {
            tracing::error!("{} walk failed: {}", err.resource_type, err.message);
            self.log.push_error(&err.resource_type, err.message);
        }
        self.log
    }

    /// Delete the object `id` of the root kind and everything under it
    pub async fn delete(mut self, root: &NodeDef, id: &str) -> ExecutionLog {
        if let Err(err) = self.delete_node(root, id.to_string(), PathVars::new()).await {
            tracing::error!("{} delete failed: {}", err.resource_type, err.message);
            self.log.push_error(&err.resource_type, err.message);
        }
        self.log
    }

    fn save<'s>(
        &'s mut self,
        node: &'s NodeDef,
        items: Vec<&'s Value>,
        ids: PathVars,
    ) -> BoxFuture<'s, Result<(), ResourceError>> {
        async move {
            for item in items {
                self.save_item(node, item, &ids).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn save_children(
        &mut self,
        node: &NodeDef,
        item: &Value,
        ids: &PathVars,
    ) -> Result<(), ResourceError> {
        for child in node.ordered_children() {
            let items = child.items(item);
            if items.is_empty() {
                continue;
            }
            self.save(child, items, ids.clone()).await?;
        }
        Ok(())
    }

    async fn save_item(
        &mut self,
        node: &NodeDef,
        item: &Value,
        ids: &PathVars,
    ) -> Result<(), ResourceError> {
        if wants_absent(item) {
            return self.remove_absent(node, item, ids).await;
        }

        let mut body = flatten(self.client, node, item, ids).await?;
        let collection = self.client.policy_url(&node.collection_path(ids)?);
        let existing = self.find_existing(node, &collection, &body).await?;

        if let Some(id) = existing.as_ref().and_then(object_id) {
            body.insert("id".to_string(), Value::String(id.to_string()));
        }
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut child_ids = ids.clone();
        child_ids.insert(node.id_key(), id.clone());

        if self.options.children_first {
            self.save_children(node, item, &child_ids).await?;
        }

        let mut target = Value::Object(body);
        let changed = match &existing {
            Some(existing) => {
                fill_missing(&mut target, existing);
                has_changes(existing, &target)
            }
            None => true,
        };

        if changed {
            let url = item_path(&collection, &id);
            self.client
                .patch(&url, &target)
                .await
                .map_err(|e| ResourceError::from_nsxt(&node.identifier, &e))?;
            let saved = self
                .client
                .get(&url, &[])
                .await
                .map_err(|e| ResourceError::from_nsxt(&node.identifier, &e))?
                .unwrap_or(Value::Null);
            tracing::info!("{} {} saved", node.identifier, id);
            self.log.push_results(&node.identifier, saved);
        } else {
            tracing::debug!("{} {} is up to date", node.identifier, id);
        }

        if !self.options.children_first {
            self.save_children(node, item, &child_ids).await?;
        }
        Ok(())
    }

    /// Delete the object an item marked `state: absent` names, if it exists
    async fn remove_absent(
        &mut self,
        node: &NodeDef,
        item: &Value,
        ids: &PathVars,
    ) -> Result<(), ResourceError> {
        let mut lookup = Map::new();
        for key in ["display_name", "id"] {
            match item.get(key) {
                Some(Value::String(s)) if !s.is_empty() => {
                    lookup.insert(key.to_string(), Value::String(s.clone()));
                }
                Some(Value::Number(n)) => {
                    lookup.insert(key.to_string(), Value::String(n.to_string()));
                }
                _ => {}
            }
        }
        if lookup.is_empty() && node.fixed_id.is_none() {
            return Err(ResourceError::new(
                &node.identifier,
                "display_name or id is required",
            ));
        }

        let collection = self.client.policy_url(&node.collection_path(ids)?);
        let existing = self.find_existing(node, &collection, &lookup).await?;
        match existing.as_ref().and_then(object_id) {
            Some(id) => {
                tracing::info!("{} {} marked absent, deleting", node.identifier, id);
                self.delete_node(node, id.to_string(), ids.clone()).await
            }
            None => {
                tracing::debug!("{} marked absent and not present", node.identifier);
                Ok(())
            }
        }
    }

    /// Existing object matching the body by display name, or by id when unnamed
    async fn find_existing(
        &self,
        node: &NodeDef,
        collection: &str,
        body: &Map<String, Value>,
    ) -> Result<Option<Value>, ResourceError> {
        if let Some(fixed) = &node.fixed_id {
            return match self.client.get(&item_path(collection, fixed), &[]).await {
                Ok(found) => Ok(found.filter(|v| !v.is_null())),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(ResourceError::from_nsxt(&node.identifier, &e)),
            };
        }

        let objects = match list_all(self.client, collection, &ListParams::default()).await {
            Ok(objects) => objects,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(ResourceError::from_nsxt(&node.identifier, &e)),
        };

        let (key, wanted) = match body.get("display_name").and_then(Value::as_str) {
            Some(name) => ("display_name", Some(name)),
            None => ("id", body.get("id").and_then(Value::as_str)),
        };
        let mut matches: Vec<Value> = objects
            .into_iter()
            .filter(|object| object.get(key).and_then(Value::as_str) == wanted)
            .collect();

        if matches.len() > 1 {
            return Err(ResourceError::new(&node.identifier, DUPLICATE_NAME_MESSAGE));
        }
        Ok(matches.pop())
    }

    fn delete_node<'s>(
        &'s mut self,
        node: &'s NodeDef,
        id: String,
        ids: PathVars,
    ) -> BoxFuture<'s, Result<(), ResourceError>> {
        async move {
            let mut child_ids = ids.clone();
            child_ids.insert(node.id_key(), id.clone());

            for child in node.ordered_children() {
                let children = list_child_ids(self.client, child, &child_ids)
                    .await
                    .map_err(|e| ResourceError::from_nsxt(&child.identifier, &e))?;
                for child_id in children {
                    self.delete_node(child, child_id, child_ids.clone()).await?;
                }
            }

            if node.deletable {
                let collection = self.client.policy_url(&node.collection_path(&ids)?);
                self.client
                    .delete(&item_path(&collection, &id))
                    .await
                    .map_err(|e| ResourceError::from_nsxt(&node.identifier, &e))?;
                tracing::info!("{} {} deleted", node.identifier, id);
                self.log.push_results(
                    &node.identifier,
                    Value::String(format!("{} deleted successfully", id)),
                );
            }
            Ok(())
        }
        .boxed()
    }
}

/// Nested view of the object `id` and all of its sub-resources,
/// wrapped as `{<root identifier>: {...}}`
pub async fn get_hierarchy(
    client: &NsxtClient,
    root: &NodeDef,
    id: &str,
) -> Result<Value, ResourceError> {
    let object = fetch_node(client, root, id.to_string(), PathVars::new(), true)
        .await?
        .unwrap_or_else(|| Value::Object(Map::new()));
    let mut wrapped = Map::new();
    wrapped.insert(root.identifier.clone(), object);
    Ok(Value::Object(wrapped))
}

fn fetch_node<'s>(
    client: &'s NsxtClient,
    node: &'s NodeDef,
    id: String,
    ids: PathVars,
    is_root: bool,
) -> BoxFuture<'s, Result<Option<Value>, ResourceError>> {
    async move {
        let fail = |e: &NsxtError| {
            if is_root {
                ResourceError::from_nsxt(&node.identifier, e)
            } else {
                query_failure(node, e)
            }
        };

        let url = item_path(&client.policy_url(&node.collection_path(&ids)?), &id);
        let mut object = match client.get(&url, &[]).await {
            Ok(found) => found.unwrap_or_else(|| Value::Object(Map::new())),
            Err(e) if e.is_not_found() && node.fixed_id.is_some() => return Ok(None),
            Err(e) => return Err(fail(&e)),
        };

        let mut child_ids = ids.clone();
        child_ids.insert(node.id_key(), id.clone());

        for child in node.ordered_children() {
            let children = list_child_ids(client, child, &child_ids)
                .await
                .map_err(|e| query_failure(child, &e))?;

            let mut values = Vec::with_capacity(children.len());
            for child_id in children {
                if let Some(value) =
                    fetch_node(client, child, child_id, child_ids.clone(), false).await?
                {
                    values.push(value);
                }
            }

            if let Value::Object(map) = &mut object {
                match values.len() {
                    0 => {}
                    1 => {
                        map.insert(child.identifier.clone(), values.remove(0));
                    }
                    _ => {
                        map.insert(child.identifier.clone(), Value::Array(values));
                    }
                }
            }
        }

        Ok(Some(object))
    }
    .boxed()
}
