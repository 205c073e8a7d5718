//! present / absent for Policy API trees (Tier-0, Tier-1, segments)

use super::{display_name, unique_result, with_display_name, StateContext, StateResult};
use crate::nsxt::NsxtClient;
use crate::policy::{ExecutionLog, PolicyResource, WalkOptions};
use serde_json::{json, Value};

fn lookup_failure(resource: &PolicyResource, error: impl std::fmt::Display) -> String {
    format!(
        "Failed to get {}s from NSX-T Manager : {}",
        resource.label(),
        error
    )
}

fn multiple_results(resource: &PolicyResource, count: usize, display_name: &str) -> String {
    format!(
        "Found multiple results(result_count={}) for {} with display_name {}",
        count,
        resource.label(),
        display_name
    )
}

fn log_text(log: &ExecutionLog) -> String {
    serde_json::to_string(log).unwrap_or_default()
}

/// Ensure the tree described by `spec` exists and matches
pub async fn present(
    client: &NsxtClient,
    ctx: StateContext,
    resource: PolicyResource,
    name: &str,
    spec: &Value,
    options: WalkOptions,
) -> StateResult {
    let state = StateResult::new(name);
    let key = resource.key();

    if spec.get("state").and_then(Value::as_str) == Some("absent") {
        return state.fail(format!(
            "Use absent method to delete {} resource. Only {} sub-resources are allowed to be deleted here.",
            key, key
        ));
    }

    let display_name = display_name(spec, name);
    let spec = with_display_name(spec, display_name);

    let page = match resource.get_by_display_name(client, display_name).await {
        Ok(page) => page,
        Err(e) => return state.fail(lookup_failure(&resource, e)),
    };
    let existing = match unique_result(&page) {
        Ok(existing) => existing,
        Err(count) => return state.fail(multiple_results(&resource, count, display_name)),
    };

    if ctx.test {
        let comment = match existing {
            Some(_) => format!(
                "{} {} would be updated in NSX-T Manager",
                resource.label(),
                display_name
            ),
            None => format!(
                "{} {} will be created in NSX-T Manager",
                resource.label(),
                display_name
            ),
        };
        return state.pending(comment);
    }

    match existing {
        None => create(client, state, resource, display_name, &spec, options).await,
        Some(existing) => update(client, state, resource, display_name, &spec, &existing, options).await,
    }
}

async fn create(
    client: &NsxtClient,
    state: StateResult,
    resource: PolicyResource,
    display_name: &str,
    spec: &Value,
    options: WalkOptions,
) -> StateResult {
    tracing::info!("Creating {} {}", resource.label(), display_name);
    let log = resource.create_or_update(client, spec, options).await;

    if let Some(err) = log.last_error() {
        return state.fail(format!(
            "Failed while creating {} and sub-resources: {}\n Execution logs: {}",
            resource.label(),
            err,
            log_text(&log)
        ));
    }

    let Some(id) = log
        .find(resource.key())
        .and_then(|root| root.get("id"))
        .and_then(Value::as_str)
    else {
        return state.fail(format!(
            "Could not find the id of the created {} in execution logs: {}",
            resource.label(),
            log_text(&log)
        ));
    };

    match resource.get_hierarchy(client, id).await {
        Ok(hierarchy) => state
            .succeed(format!(
                "Created {} {} successfully",
                resource.label(),
                display_name
            ))
            .with_changes(json!({}), hierarchy),
        Err(e) => state.fail(e.message),
    }
}

async fn update(
    client: &NsxtClient,
    state: StateResult,
    resource: PolicyResource,
    display_name: &str,
    spec: &Value,
    existing: &Value,
    options: WalkOptions,
) -> StateResult {
    let Some(id) = existing.get("id").and_then(Value::as_str) else {
        return state.fail(format!("{} {} has no id", resource.label(), display_name));
    };

    let before = match resource.get_hierarchy(client, id).await {
        Ok(hierarchy) => hierarchy,
        Err(e) => return state.fail(e.message),
    };

    tracing::info!("Updating {} {}", resource.label(), display_name);
    let log = resource.create_or_update(client, spec, options).await;

    if let Some(err) = log.last_error() {
        return state.fail(format!(
            "Failed while updating {} and sub-resources: {}\n Execution logs: {}",
            resource.label(),
            err,
            log_text(&log)
        ));
    }

    if log.is_empty() {
        return state.succeed(format!(
            "{} {} is already in the desired state",
            resource.label(),
            display_name
        ));
    }

    let after = match resource.get_hierarchy(client, id).await {
        Ok(hierarchy) => hierarchy,
        Err(e) => return state.fail(e.message),
    };

    if before == after {
        return state.succeed(format!(
            "{} {} is already in the desired state",
            resource.label(),
            display_name
        ));
    }

    state
        .succeed(format!(
            "Updated {} {} successfully",
            resource.label(),
            display_name
        ))
        .with_changes(before, after)
}

/// Ensure no root object named `display_name` exists, removing its sub-resources too
pub async fn absent(
    client: &NsxtClient,
    ctx: StateContext,
    resource: PolicyResource,
    name: &str,
    display_name: Option<&str>,
) -> StateResult {
    let state = StateResult::new(name);
    let display_name = display_name.unwrap_or(name);

    let page = match resource.get_by_display_name(client, display_name).await {
        Ok(page) => page,
        Err(e) => return state.fail(lookup_failure(&resource, e)),
    };
    let existing = match unique_result(&page) {
        Ok(existing) => existing,
        Err(count) => return state.fail(multiple_results(&resource, count, display_name)),
    };

    let Some(id) = existing
        .as_ref()
        .and_then(|e| e.get("id"))
        .and_then(Value::as_str)
    else {
        return state.succeed(format!(
            "No {} with display_name: {} found in NSX-T Manager",
            resource.label(),
            display_name
        ));
    };

    if ctx.test {
        return state.pending(format!(
            "{} with display_name: {} and its sub-resources will be deleted in NSX-T Manager",
            resource.label(),
            display_name
        ));
    }

    let hierarchy = match resource.get_hierarchy(client, id).await {
        Ok(hierarchy) => hierarchy,
        Err(e) => return state.fail(e.message),
    };

    let log = resource.delete(client, id).await;
    if let Some(err) = log.last_error() {
        return state.fail(format!(
            "Failed to delete {} with display_name: {}: {}\n Execution logs: {}",
            resource.label(),
            display_name,
            err,
            log_text(&log)
        ));
    }

    state
        .succeed(format!(
            "{} with display_name: {} and its sub-resources deleted successfully",
            resource.label(),
            display_name
        ))
        .with_changes(hierarchy, json!({}))
}
