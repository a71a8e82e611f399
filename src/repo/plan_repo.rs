//! Plan repository (C4): CRUD over plans, retrieval with ordered tasks and
//! per-task dependency summaries, and cascade delete of orphan tasks.

use tracing::debug;

use crate::domain::{NewPlan, Plan, PlanPatch, PlanStatus, TaskInPlan};
use crate::helpers::{
    ensure_relationship_to_domain_id, find_by_id, metadata_to_property, tags_to_property,
    vertex_to_plan, vertex_to_task,
};
use crate::model::{Direction, PropertyMap, Value};
use crate::storage::StorageBackend;
use crate::{Error, Result};

const LABEL: &str = "Plan";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub async fn add<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    input: NewPlan,
) -> Result<Plan> {
    if input.name.trim().is_empty() {
        return Err(Error::InvalidInput("plan name must not be empty".into()));
    }

    let id = input.id.unwrap_or_else(new_id);
    let status = input.status.unwrap_or_default();
    let description = input.description.unwrap_or_default();
    let timestamp = now();

    let mut props = PropertyMap::new();
    props.insert("id".into(), Value::from(id.clone()));
    props.insert("node_type".into(), Value::from(LABEL));
    props.insert("name".into(), Value::from(input.name.clone()));
    props.insert("description".into(), Value::from(description.clone()));
    props.insert("status".into(), Value::from(status.as_str()));
    props.insert("tags".into(), tags_to_property(&input.tags));
    props.insert("metadata".into(), metadata_to_property(&input.metadata));
    props.insert("created_at".into(), Value::from(timestamp.clone()));
    props.insert("updated_at".into(), Value::from(timestamp.clone()));

    let node_id = backend.create_node(tx, &[LABEL], props).await?;

    for rel in &input.relationships {
        ensure_relationship_to_domain_id(backend, tx, node_id, &rel.to_id, &rel.rel_type).await?;
    }

    Ok(Plan {
        id,
        node_type: LABEL.to_string(),
        name: input.name,
        description,
        status,
        tags: input.tags,
        metadata: input.metadata,
        created_at: timestamp.clone(),
        updated_at: timestamp,
    })
}

pub async fn get_by_id<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: &str,
) -> Result<Option<Plan>> {
    Ok(find_by_id(backend, tx, LABEL, id).await?.map(|n| vertex_to_plan(&n)))
}

pub async fn update<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    id: &str,
    patch: PlanPatch,
) -> Result<Plan> {
    let node = find_by_id(backend, tx, LABEL, id).await?
        .ok_or_else(|| Error::NotFound(format!("plan {id}")))?;

    if let Some(name) = &patch.name {
        backend.set_node_property(tx, node.id, "name", Value::from(name.clone())).await?;
    }
    if let Some(description) = &patch.description {
        backend.set_node_property(tx, node.id, "description", Value::from(description.clone())).await?;
    }
    if let Some(status) = &patch.status {
        backend.set_node_property(tx, node.id, "status", Value::from(status.as_str())).await?;
    }
    if let Some(tags) = &patch.tags {
        backend.set_node_property(tx, node.id, "tags", tags_to_property(tags)).await?;
    }
    if let Some(metadata) = &patch.metadata {
        backend.set_node_property(tx, node.id, "metadata", metadata_to_property(metadata)).await?;
    }
    backend.set_node_property(tx, node.id, "updated_at", Value::from(now())).await?;

    for rel in &patch.relationships {
        ensure_relationship_to_domain_id(backend, tx, node.id, &rel.to_id, &rel.rel_type).await?;
    }

    let updated = backend.get_node(tx, node.id).await?
        .ok_or_else(|| Error::NotFound(format!("plan {id}")))?;
    Ok(vertex_to_plan(&updated))
}

/// Filters by exact status and "any tag in the requested set", ordered by
/// `updated_at` descending. Default limit 50.
pub async fn list<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    status: Option<PlanStatus>,
    tags: Option<&[String]>,
    limit: Option<usize>,
) -> Result<Vec<Plan>> {
    let limit = limit.unwrap_or(50);
    let mut nodes = backend.nodes_by_label(tx, LABEL).await?;

    if let Some(status) = status {
        nodes.retain(|n| n.get("status").and_then(Value::as_str) == Some(status.as_str()));
    }
    if let Some(tags) = tags {
        if !tags.is_empty() {
            nodes.retain(|n| match n.get("tags") {
                Some(Value::List(node_tags)) => node_tags.iter()
                    .filter_map(Value::as_str)
                    .any(|t| tags.iter().any(|want| want == t)),
                _ => false,
            });
        }
    }

    nodes.sort_by(|a, b| {
        let ua = a.get("updated_at").and_then(Value::as_str).unwrap_or("");
        let ub = b.get("updated_at").and_then(Value::as_str).unwrap_or("");
        ub.cmp(ua)
    });
    nodes.truncate(limit);

    Ok(nodes.iter().map(vertex_to_plan).collect())
}

/// The plan and an ordered list of `TaskInPlan` entries, each with its
/// `position` within this plan and its `depends_on`/`blocks` ids restricted
/// to tasks in the same plan. Ordered strictly ascending by position.
pub async fn get_with_tasks<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    plan_id: &str,
) -> Result<Option<(Plan, Vec<TaskInPlan>)>> {
    let Some(plan_node) = find_by_id(backend, tx, LABEL, plan_id).await? else {
        return Ok(None);
    };

    let incoming = backend.get_relationships(tx, plan_node.id, Direction::Incoming, Some("PART_OF")).await?;

    let mut entries = Vec::with_capacity(incoming.len());
    let mut plan_task_ids = std::collections::HashSet::new();

    for rel in &incoming {
        let Some(task_node) = backend.get_node(tx, rel.src).await? else { continue };
        if let Some(tid) = task_node.get("id").and_then(Value::as_str) {
            plan_task_ids.insert(tid.to_string());
        }
    }

    for rel in incoming {
        let Some(task_node) = backend.get_node(tx, rel.src).await? else { continue };
        let position = rel.properties.get("position").and_then(Value::as_float).unwrap_or(0.0);

        let dep_rels = backend.get_relationships(tx, task_node.id, Direction::Outgoing, Some("DEPENDS_ON")).await?;
        let blocks_rels = backend.get_relationships(tx, task_node.id, Direction::Outgoing, Some("BLOCKS")).await?;

        let depends_on = resolve_ids_in_plan(backend, tx, &dep_rels, &plan_task_ids).await?;
        let blocks = resolve_ids_in_plan(backend, tx, &blocks_rels, &plan_task_ids).await?;

        entries.push(TaskInPlan {
            task: vertex_to_task(&task_node),
            position,
            depends_on,
            blocks,
        });
    }

    entries.sort_by(|a, b| a.position.partial_cmp(&b.position).unwrap_or(std::cmp::Ordering::Equal));

    Ok(Some((vertex_to_plan(&plan_node), entries)))
}

async fn resolve_ids_in_plan<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    rels: &[crate::model::Relationship],
    plan_task_ids: &std::collections::HashSet<String>,
) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for rel in rels {
        let Some(node) = backend.get_node(tx, rel.dst).await? else { continue };
        let Some(id) = node.get("id").and_then(Value::as_str) else { continue };
        if plan_task_ids.contains(id) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

/// Cascade delete, single transaction:
/// 1. collect all task ids reachable by `task -[:PART_OF]-> plan`;
/// 2. for each, check whether it has a PART_OF edge to some other plan;
/// 3. detach-delete every orphan task;
/// 4. detach-delete the plan node.
/// Returns the number of deleted tasks. Deleting a missing plan is a soft
/// no-op returning `None`.
pub async fn delete<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    plan_id: &str,
) -> Result<Option<u64>> {
    let Some(plan_node) = find_by_id(backend, tx, LABEL, plan_id).await? else {
        debug!(plan_id, "delete_plan: id not found, soft no-op");
        return Ok(None);
    };

    let incoming = backend.get_relationships(tx, plan_node.id, Direction::Incoming, Some("PART_OF")).await?;
    let task_ids: Vec<_> = incoming.iter().map(|r| r.src).collect();

    let mut orphans = Vec::new();
    for task_id in task_ids {
        let part_of = backend.get_relationships(tx, task_id, Direction::Outgoing, Some("PART_OF")).await?;
        let has_other_plan = part_of.iter().any(|r| r.dst != plan_node.id);
        if !has_other_plan {
            orphans.push(task_id);
        }
    }

    for task_id in &orphans {
        backend.detach_delete_node(tx, *task_id).await?;
    }

    backend.detach_delete_node(tx, plan_node.id).await?;

    Ok(Some(orphans.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TraversalDirection};
    use crate::repo::task_repo;
    use crate::storage::MemoryBackend;
    use crate::tx::TxMode;

    async fn setup() -> (MemoryBackend, <MemoryBackend as StorageBackend>::Tx) {
        let backend = MemoryBackend::new();
        let tx = backend.begin_tx(TxMode::ReadWrite).await.unwrap();
        (backend, tx)
    }

    #[tokio::test]
    async fn add_and_get_round_trip() {
        let (backend, mut tx) = setup().await;
        let plan = add(&backend, &mut tx, NewPlan { name: "P".into(), ..Default::default() }).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Active);
        let fetched = get_by_id(&backend, &tx, &plan.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "P");
    }

    #[tokio::test]
    async fn cascade_delete_removes_only_orphan_tasks() {
        let (backend, mut tx) = setup().await;
        let x = add(&backend, &mut tx, NewPlan { name: "X".into(), ..Default::default() }).await.unwrap();
        let y = add(&backend, &mut tx, NewPlan { name: "Y".into(), ..Default::default() }).await.unwrap();

        let a = task_repo::add(&backend, &mut tx, NewTask {
            content: "only-X".into(), plan_ids: vec![x.id.clone()], ..Default::default()
        }).await.unwrap();
        let b = task_repo::add(&backend, &mut tx, NewTask {
            content: "shared".into(), plan_ids: vec![x.id.clone(), y.id.clone()], ..Default::default()
        }).await.unwrap();

        let deleted = delete(&backend, &mut tx, &x.id).await.unwrap().unwrap();
        assert_eq!(deleted, 1);

        assert!(task_repo::get_by_id(&backend, &tx, &a.id).await.unwrap().is_none());
        let b_plans = task_repo::get_with_plans(&backend, &tx, &b.id).await.unwrap().unwrap().1;
        assert_eq!(b_plans, vec![y.id.clone()]);

        let _ = TraversalDirection::Both;
    }
}
