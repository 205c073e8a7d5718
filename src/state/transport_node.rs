//! present / absent for transport nodes

use super::{display_name, unique_result, with_display_name, StateContext, StateResult};
use crate::manager::revision_of;
use crate::manager::transport_node::{prepare_body, TransportNodes};
use crate::nsxt::NsxtClient;
use serde_json::{json, Value};

async fn find_existing(
    client: &NsxtClient,
    nodes: &TransportNodes,
    display_name: &str,
) -> Result<Option<Value>, String> {
    let page = nodes
        .get_by_display_name(client, display_name)
        .await
        .map_err(|e| format!("Failed to get transport nodes from NSX-T Manager : {}", e))?;
    unique_result(&page).map_err(|count| {
        format!(
            "Found multiple results(result_count={}) for transport node with display_name {}",
            count, display_name
        )
    })
}

pub async fn present(
    client: &NsxtClient,
    ctx: StateContext,
    name: &str,
    spec: &Value,
) -> StateResult {
    let state = StateResult::new(name);
    let nodes = match TransportNodes::new() {
        Ok(nodes) => nodes,
        Err(e) => return state.fail(e.to_string()),
    };
    let display_name = display_name(spec, name);
    let spec = with_display_name(spec, display_name);

    let existing = match find_existing(client, &nodes, display_name).await {
        Ok(existing) => existing,
        Err(comment) => return state.fail(comment),
    };

    let body = match prepare_body(client, &spec).await {
        Ok(body) => body,
        Err(e) => return state.fail(e.message),
    };

    let Some(existing) = existing else {
        if ctx.test {
            return state.pending(format!(
                "Transport node {} will be created in NSX-T Manager",
                display_name
            ));
        }
        return match nodes.create(client, &body).await {
            Ok(created) => state
                .succeed(format!("Created transport node {}", display_name))
                .with_changes(json!({}), created),
            Err(e) => state.fail(format!(
                "Failed to create transport node {} : {}",
                display_name, e
            )),
        };
    };

    if !nodes.resource().needs_update(&existing, &body) {
        return state.succeed(format!(
            "Transport node {} is already in the desired state",
            display_name
        ));
    }

    if ctx.test {
        return state.pending(format!(
            "Transport node {} would be updated in NSX-T Manager",
            display_name
        ));
    }

    let Some(id) = existing.get("id").and_then(Value::as_str) else {
        return state.fail(format!("Transport node {} has no id", display_name));
    };
    let deployment_revision = existing
        .pointer("/node_deployment_info/_revision")
        .and_then(Value::as_i64);

    match nodes
        .update(client, id, revision_of(&existing), deployment_revision, &body)
        .await
    {
        Ok(updated) => state
            .succeed(format!("Updated transport node {}", display_name))
            .with_changes(existing.clone(), updated),
        Err(e) => state.fail(format!(
            "Failed to update transport node {} : {}",
            display_name, e
        )),
    }
}

pub async fn absent(
    client: &NsxtClient,
    ctx: StateContext,
    name: &str,
    display_name: Option<&str>,
) -> StateResult {
    let state = StateResult::new(name);
    let nodes = match TransportNodes::new() {
        Ok(nodes) => nodes,
        Err(e) => return state.fail(e.to_string()),
    };
    let display_name = display_name.unwrap_or(name);

    let existing = match find_existing(client, &nodes, display_name).await {
        Ok(existing) => existing,
        Err(comment) => return state.fail(comment),
    };

    let Some(existing) = existing else {
        return state.succeed(format!(
            "No transport node with display_name: {} found in NSX-T Manager",
            display_name
        ));
    };
    let Some(id) = existing.get("id").and_then(Value::as_str) else {
        return state.fail(format!("Transport node {} has no id", display_name));
    };

    if ctx.test {
        return state.pending(format!(
            "Transport node {} will be deleted from NSX-T Manager",
            display_name
        ));
    }

    match nodes.delete(client, id).await {
        Ok(message) => {
            let comment = message
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Deleted transport node {}", display_name));
            state.succeed(comment).with_changes(existing.clone(), json!({}))
        }
        Err(e) => state.fail(format!(
            "Failed to delete transport node {} : {}",
            display_name, e
        )),
    }
}
