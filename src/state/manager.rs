//! present / absent for flat Manager API resources

use super::{display_name, unique_result, with_display_name, StateContext, StateResult};
use crate::manager::{revision_of, ManagerResource};
use crate::nsxt::fetcher::ListParams;
use crate::nsxt::NsxtClient;
use serde_json::{json, Value};

async fn find_existing(
    client: &NsxtClient,
    resource: &ManagerResource,
    display_name: &str,
) -> Result<Option<Value>, String> {
    let page = resource
        .get_by_display_name(client, display_name, &ListParams::default())
        .await
        .map_err(|e| {
            format!(
                "Failed to get {}s from NSX-T Manager : {}",
                resource.label(),
                e
            )
        })?;
    unique_result(&page).map_err(|_| {
        format!(
            "Multiple {}s found for the provided display name {}",
            resource.label(),
            display_name
        )
    })
}

pub async fn present(
    client: &NsxtClient,
    ctx: StateContext,
    resource: ManagerResource,
    name: &str,
    spec: &Value,
) -> StateResult {
    let state = StateResult::new(name);
    let display_name = display_name(spec, name);
    let spec = with_display_name(spec, display_name);

    let existing = match find_existing(client, &resource, display_name).await {
        Ok(existing) => existing,
        Err(comment) => return state.fail(comment),
    };

    let Some(existing) = existing else {
        if let Err(e) = resource.create_body(&spec) {
            return state.fail(e.to_string());
        }
        if ctx.test {
            return state.pending(format!(
                "State present will create {} with name {}",
                resource.label(),
                display_name
            ));
        }
        return match resource.create(client, &spec).await {
            Ok(created) => state
                .succeed(format!("Created {} {}", resource.label(), display_name))
                .with_changes(json!({}), created),
            Err(e) => state.fail(format!(
                "Failed to create {} {} : {}",
                resource.label(),
                display_name,
                e
            )),
        };
    };

    if !resource.needs_update(&existing, &spec) {
        return state.succeed(format!(
            "{} exists already, no action to perform",
            resource.label()
        ));
    }

    if ctx.test {
        return state.pending(format!(
            "State present will update {} with name {}",
            resource.label(),
            display_name
        ));
    }

    let Some(id) = existing.get("id").and_then(Value::as_str) else {
        return state.fail(format!("{} {} has no id", resource.label(), display_name));
    };
    let body = resource.merged_update(&existing, &spec);
    match resource
        .update(client, id, revision_of(&existing), &body)
        .await
    {
        Ok(updated) => state
            .succeed(format!("Updated {} {}", resource.label(), display_name))
            .with_changes(existing.clone(), updated),
        Err(e) => state.fail(format!(
            "Failed to update {} {} : {}",
            resource.label(),
            display_name,
            e
        )),
    }
}

pub async fn absent(
    client: &NsxtClient,
    ctx: StateContext,
    resource: ManagerResource,
    name: &str,
    display_name: Option<&str>,
) -> StateResult {
    let state = StateResult::new(name);
    let display_name = display_name.unwrap_or(name);

    let existing = match find_existing(client, &resource, display_name).await {
        Ok(existing) => existing,
        Err(comment) => return state.fail(comment),
    };

    let Some(existing) = existing else {
        return state.succeed(format!(
            "No {} found with name {}",
            resource.label(),
            display_name
        ));
    };
    let Some(id) = existing.get("id").and_then(Value::as_str) else {
        return state.fail(format!("{} {} has no id", resource.label(), display_name));
    };

    if ctx.test {
        return state.pending(format!(
            "State absent will delete {} with name {}",
            resource.label(),
            display_name
        ));
    }

    match resource.delete(client, id).await {
        Ok(_) => state
            .succeed(format!("Deleted {} {}", resource.label(), display_name))
            .with_changes(existing.clone(), json!({})),
        Err(e) => state.fail(format!(
            "Failed to delete {} {} : {}",
            resource.label(),
            display_name,
            e
        )),
    }
}
