//! Turn one spec item into the request body for its tree node

use super::transforms::{apply_transform, TransformContext};
use crate::diff::{is_truthy, project};
use crate::error::ResourceError;
use crate::nsxt::fetcher::resolve_id;
use crate::nsxt::urls::PathVars;
use crate::nsxt::NsxtClient;
use crate::resource::{LookupApi, NodeDef, ReferenceDef, ReferenceMode};
use serde_json::{Map, Value};

/// Build the body for `item`: allow-listed fields, wire type, id,
/// resolved references and transforms
pub async fn flatten(
    client: &NsxtClient,
    node: &NodeDef,
    item: &Value,
    ids: &PathVars,
) -> Result<Map<String, Value>, ResourceError> {
    let mut body = project(&node.fields, item);

    if let Some(resource_type) = &node.resource_type {
        body.insert("resource_type".to_string(), Value::String(resource_type.clone()));
    }

    let id = node
        .fixed_id
        .clone()
        .or_else(|| scalar_id(item.get("id")))
        .or_else(|| scalar_id(item.get("display_name")));
    let Some(id) = id else {
        return Err(ResourceError::new(
            &node.identifier,
            "display_name or id is required",
        ));
    };
    body.insert("id".to_string(), Value::String(id));

    for reference in &node.references {
        apply_reference(client, node, reference, item, &mut body).await?;
    }

    let ctx = TransformContext {
        client,
        node,
        item,
        ids,
    };
    for transform in &node.transforms {
        apply_transform(transform, &ctx, &mut body).await?;
    }

    Ok(body)
}

/// Ids may be given as numbers in YAML input
fn scalar_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn apply_reference(
    client: &NsxtClient,
    node: &NodeDef,
    reference: &ReferenceDef,
    item: &Value,
    body: &mut Map<String, Value>,
) -> Result<(), ResourceError> {
    let mut id = scalar_id(item.get(&reference.id_key));

    if id.is_none() {
        let name = reference
            .name_key
            .as_ref()
            .and_then(|key| item.get(key))
            .filter(|v| is_truthy(v))
            .and_then(Value::as_str);
        if let Some(name) = name {
            let lookup_path = reference.lookup_path.as_deref().unwrap_or(&reference.path);
            let url = match reference.lookup {
                LookupApi::Policy => client.policy_url(lookup_path),
                LookupApi::Manager => client.manager_url(lookup_path),
            };
            id = Some(resolve_id(client, &url, name, &node.identifier).await?);
        }
    }

    let Some(id) = id else {
        if reference.required {
            return Err(ResourceError::new(
                &node.identifier,
                format!("required attribute {} not found", reference.id_key),
            ));
        }
        return Ok(());
    };

    let path = Value::String(format!("{}/{}", reference.path, id));
    match reference.mode {
        ReferenceMode::Set => {
            body.insert(reference.target.clone(), path);
        }
        ReferenceMode::List => {
            body.insert(reference.target.clone(), Value::Array(vec![path]));
        }
        ReferenceMode::Push => {
            let entry = body
                .entry(reference.target.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(paths) => paths.push(path),
                other => *other = Value::Array(vec![path]),
            }
        }
    }
    Ok(())
}
