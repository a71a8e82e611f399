//! Task repository (C5): CRUD, the "task belongs to ≥1 plan" invariant,
//! fractional-position insertion and batch reorder, and dependency edges.

use tracing::{debug, warn};

use crate::domain::{NewTask, Task, TaskPatch, TaskStatus};
use crate::helpers::{
    ensure_relationship_to_domain_id, find_by_id, metadata_to_property, tags_to_property,
    vertex_to_task,
};
use crate::model::{Direction, Node, NodeId, PropertyMap, Value};
use crate::position::{append_position, insert_positions};
use crate::storage::StorageBackend;
use crate::{Error, Result};

const LABEL: &str = "Task";
const PLAN_LABEL: &str = "Plan";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Positions of every task currently in `plan_node_id`'s PART_OF edges,
/// ascending.
async fn plan_positions<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    plan_node_id: NodeId,
) -> Result<Vec<(NodeId, f64)>> {
    let incoming = backend.get_relationships(tx, plan_node_id, Direction::Incoming, Some("PART_OF")).await?;
    let mut positions: Vec<(NodeId, f64)> = incoming.iter()
        .map(|r| (r.src, r.properties.get("position").and_then(Value::as_float).unwrap_or(0.0)))
        .collect();
    positions.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(positions)
}

/// Computes the position a new task should take within a plan, honoring
/// `after`/`before` neighbor hints when they resolve to a position already
/// present in that plan; falls back to a plain append otherwise.
async fn compute_position<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    plan_node_id: NodeId,
    after_id: Option<NodeId>,
    before_id: Option<NodeId>,
) -> Result<f64> {
    let positions = plan_positions(backend, tx, plan_node_id).await?;
    let max_pos = positions.last().map(|(_, p)| *p).unwrap_or(0.0);

    let after_pos = after_id.and_then(|id| positions.iter().find(|(nid, _)| *nid == id).map(|(_, p)| *p));
    let before_pos = before_id.and_then(|id| positions.iter().find(|(nid, _)| *nid == id).map(|(_, p)| *p));

    match (after_pos, before_pos) {
        (None, None) => Ok(append_position(max_pos)),
        (Some(a), None) => {
            let next_higher = positions.iter().map(|(_, p)| *p).filter(|p| *p > a).fold(0.0_f64, |acc, p| if acc == 0.0 { p } else { acc.min(p) });
            Ok(insert_positions(a, next_higher, 1)[0])
        }
        (None, Some(b)) => {
            let prev_lower = positions.iter().map(|(_, p)| *p).filter(|p| *p < b).fold(0.0_f64, |acc, p| p.max(acc));
            Ok(insert_positions(prev_lower, b, 1)[0])
        }
        (Some(a), Some(b)) => Ok(insert_positions(a, b, 1)[0]),
    }
}

async fn resolve_plan_node<B: StorageBackend>(backend: &B, tx: &B::Tx, plan_id: &str) -> Result<Node> {
    find_by_id(backend, tx, PLAN_LABEL, plan_id).await?
        .ok_or_else(|| Error::InvalidReference(format!("plan {plan_id} does not exist")))
}

/// Requires a non-empty `plan_ids` list; each plan's existence is verified
/// before any node is written. On any failure after the task node is
/// created, the node is deleted to restore the plan-membership invariant.
pub async fn add<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    input: NewTask,
) -> Result<Task> {
    if input.content.trim().is_empty() {
        return Err(Error::InvalidInput("task content must not be empty".into()));
    }
    if input.plan_ids.is_empty() {
        return Err(Error::InvalidInput("task requires at least one plan id".into()));
    }

    let mut plan_nodes = Vec::with_capacity(input.plan_ids.len());
    for plan_id in &input.plan_ids {
        plan_nodes.push(resolve_plan_node(backend, tx, plan_id).await?);
    }

    let after_id = match &input.after_task_id {
        Some(id) => Some(find_by_id(backend, tx, LABEL, id).await?
            .ok_or_else(|| Error::InvalidReference(format!("task {id} does not exist")))?.id),
        None => None,
    };
    let before_id = match &input.before_task_id {
        Some(id) => Some(find_by_id(backend, tx, LABEL, id).await?
            .ok_or_else(|| Error::InvalidReference(format!("task {id} does not exist")))?.id),
        None => None,
    };

    let id = input.id.unwrap_or_else(new_id);
    let status = input.status.unwrap_or_default();
    let timestamp = now();

    let mut props = PropertyMap::new();
    props.insert("id".into(), Value::from(id.clone()));
    props.insert("node_type".into(), Value::from(LABEL));
    props.insert("content".into(), Value::from(input.content.clone()));
    props.insert("status".into(), Value::from(status.as_str()));
    props.insert("tags".into(), tags_to_property(&input.tags));
    props.insert("metadata".into(), metadata_to_property(&input.metadata));
    props.insert("created_at".into(), Value::from(timestamp.clone()));
    props.insert("updated_at".into(), Value::from(timestamp.clone()));

    let node_id = backend.create_node(tx, &[LABEL], props).await?;

    if let Err(e) = link_task_to_plans(backend, tx, node_id, &plan_nodes, after_id, before_id).await {
        warn!(id, error = %e, "create_task: linking to plans failed, rolling back node");
        let _ = backend.delete_node(tx, node_id).await;
        return Err(e);
    }

    for rel in &input.relationships {
        ensure_relationship_to_domain_id(backend, tx, node_id, &rel.to_id, &rel.rel_type).await?;
    }

    Ok(Task {
        id,
        node_type: LABEL.to_string(),
        content: input.content,
        status,
        tags: input.tags,
        metadata: input.metadata,
        created_at: timestamp.clone(),
        updated_at: timestamp,
    })
}

async fn link_task_to_plans<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    task_node_id: NodeId,
    plan_nodes: &[Node],
    after_id: Option<NodeId>,
    before_id: Option<NodeId>,
) -> Result<()> {
    for plan_node in plan_nodes {
        let position = compute_position(backend, tx, plan_node.id, after_id, before_id).await?;
        let mut props = PropertyMap::new();
        props.insert("position".into(), Value::from(position));
        backend.create_relationship(tx, task_node_id, plan_node.id, "PART_OF", props).await?;
    }
    Ok(())
}

pub async fn get_by_id<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: &str,
) -> Result<Option<Task>> {
    Ok(find_by_id(backend, tx, LABEL, id).await?.map(|n| vertex_to_task(&n)))
}

/// The task plus the domain ids of every plan it currently belongs to.
pub async fn get_with_plans<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: &str,
) -> Result<Option<(Task, Vec<String>)>> {
    let Some(node) = find_by_id(backend, tx, LABEL, id).await? else {
        return Ok(None);
    };

    let part_of = backend.get_relationships(tx, node.id, Direction::Outgoing, Some("PART_OF")).await?;
    let mut plan_ids = Vec::with_capacity(part_of.len());
    for rel in part_of {
        if let Some(plan_node) = backend.get_node(tx, rel.dst).await? {
            if let Some(pid) = plan_node.get("id").and_then(Value::as_str) {
                plan_ids.push(pid.to_string());
            }
        }
    }

    Ok(Some((vertex_to_task(&node), plan_ids)))
}

/// Accepts an optional `add_plan_ids` list; each referenced plan's
/// existence is verified first; new links are appended. Never removes the
/// last plan link implicitly.
pub async fn update<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    id: &str,
    patch: TaskPatch,
) -> Result<Task> {
    let node = find_by_id(backend, tx, LABEL, id).await?
        .ok_or_else(|| Error::NotFound(format!("task {id}")))?;

    if let Some(content) = &patch.content {
        backend.set_node_property(tx, node.id, "content", Value::from(content.clone())).await?;
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

    for plan_id in &patch.add_plan_ids {
        let plan_node = resolve_plan_node(backend, tx, plan_id).await?;
        let already_linked = backend.get_relationships(tx, node.id, Direction::Outgoing, Some("PART_OF")).await?
            .iter().any(|r| r.dst == plan_node.id);
        if already_linked {
            continue;
        }
        let position = compute_position(backend, tx, plan_node.id, None, None).await?;
        let mut props = PropertyMap::new();
        props.insert("position".into(), Value::from(position));
        backend.create_relationship(tx, node.id, plan_node.id, "PART_OF", props).await?;
    }

    for rel in &patch.relationships {
        ensure_relationship_to_domain_id(backend, tx, node.id, &rel.to_id, &rel.rel_type).await?;
    }

    let updated = backend.get_node(tx, node.id).await?
        .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
    Ok(vertex_to_task(&updated))
}

pub async fn delete<B: StorageBackend>(backend: &B, tx: &mut B::Tx, id: &str) -> Result<bool> {
    let Some(node) = find_by_id(backend, tx, LABEL, id).await? else {
        debug!(id, "delete_task: id not found, soft no-op");
        return Ok(false);
    };
    backend.detach_delete_node(tx, node.id).await
}

/// When `plan_id` is supplied, results are tasks with a PART_OF edge to
/// that plan, each with its `position`, ordered strictly ascending.
/// Without `plan_id`, `position` is `None` and results are ordered by
/// `updated_at` descending.
pub async fn list<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    plan_id: Option<&str>,
    status: Option<TaskStatus>,
    tags: Option<&[String]>,
    limit: Option<usize>,
) -> Result<Vec<(Task, Option<f64>)>> {
    let limit = limit.unwrap_or(50);

    let mut results: Vec<(Task, Option<f64>)> = if let Some(plan_id) = plan_id {
        let plan_node = resolve_plan_node(backend, tx, plan_id).await?;
        let incoming = backend.get_relationships(tx, plan_node.id, Direction::Incoming, Some("PART_OF")).await?;
        let mut rows = Vec::with_capacity(incoming.len());
        for rel in incoming {
            let Some(task_node) = backend.get_node(tx, rel.src).await? else { continue };
            let position = rel.properties.get("position").and_then(Value::as_float).unwrap_or(0.0);
            rows.push((vertex_to_task(&task_node), Some(position)));
        }
        rows
    } else {
        backend.nodes_by_label(tx, LABEL).await?.iter()
            .map(|n| (vertex_to_task(n), None))
            .collect()
    };

    if let Some(status) = status {
        results.retain(|(t, _)| t.status == status);
    }
    if let Some(tags) = tags {
        if !tags.is_empty() {
            results.retain(|(t, _)| t.tags.iter().any(|tag| tags.iter().any(|want| want == tag)));
        }
    }

    if plan_id.is_some() {
        results.sort_by(|a, b| a.1.unwrap_or(0.0).partial_cmp(&b.1.unwrap_or(0.0)).unwrap_or(std::cmp::Ordering::Equal));
    } else {
        results.sort_by(|a, b| b.0.updated_at.cmp(&a.0.updated_at));
    }
    results.truncate(limit);

    Ok(results)
}

/// Batch-writes the supplied positions onto existing PART_OF edges within
/// one transaction. Returns the `(id, position)` pairs actually written.
pub async fn update_positions<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    plan_id: &str,
    positions: &[(String, f64)],
) -> Result<Vec<(String, f64)>> {
    let plan_node = resolve_plan_node(backend, tx, plan_id).await?;
    let incoming = backend.get_relationships(tx, plan_node.id, Direction::Incoming, Some("PART_OF")).await?;

    let mut written = Vec::with_capacity(positions.len());
    for (task_id, position) in positions {
        let Some(task_node) = find_by_id(backend, tx, LABEL, task_id).await? else {
            return Err(Error::InvalidReference(format!("task {task_id} does not exist")));
        };
        let Some(rel) = incoming.iter().find(|r| r.src == task_node.id) else {
            return Err(Error::InvalidReference(format!("task {task_id} is not part of plan {plan_id}")));
        };
        backend.set_relationship_property(tx, rel.id, "position", Value::from(*position)).await?;
        written.push((task_id.clone(), *position));
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::plan_repo;
    use crate::storage::MemoryBackend;
    use crate::tx::TxMode;

    async fn setup() -> (MemoryBackend, <MemoryBackend as StorageBackend>::Tx) {
        let backend = MemoryBackend::new();
        let tx = backend.begin_tx(TxMode::ReadWrite).await.unwrap();
        (backend, tx)
    }

    async fn make_plan(backend: &MemoryBackend, tx: &mut <MemoryBackend as StorageBackend>::Tx, name: &str) -> String {
        plan_repo::add(backend, tx, crate::domain::NewPlan { name: name.into(), ..Default::default() }).await.unwrap().id
    }

    #[tokio::test]
    async fn create_task_requires_plan_ids() {
        let (backend, mut tx) = setup().await;
        let err = add(&backend, &mut tx, NewTask { content: "x".into(), ..Default::default() }).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_task_unknown_plan_fails_with_invalid_reference() {
        let (backend, mut tx) = setup().await;
        let err = add(&backend, &mut tx, NewTask {
            content: "x".into(), plan_ids: vec!["nope".into()], ..Default::default()
        }).await.unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));
    }

    #[tokio::test]
    async fn append_ordering_is_strictly_increasing() {
        let (backend, mut tx) = setup().await;
        let plan = make_plan(&backend, &mut tx, "P").await;

        let t1 = add(&backend, &mut tx, NewTask { content: "a".into(), plan_ids: vec![plan.clone()], ..Default::default() }).await.unwrap();
        let t2 = add(&backend, &mut tx, NewTask { content: "b".into(), plan_ids: vec![plan.clone()], ..Default::default() }).await.unwrap();
        let t3 = add(&backend, &mut tx, NewTask { content: "c".into(), plan_ids: vec![plan.clone()], ..Default::default() }).await.unwrap();

        let listed = list(&backend, &tx, Some(&plan), None, None, None).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|(t, _)| t.id.clone()).collect();
        assert_eq!(ids, vec![t1.id, t2.id, t3.id]);

        let positions: Vec<f64> = listed.iter().map(|(_, p)| p.unwrap()).collect();
        for w in positions.windows(2) {
            assert!(w[1] - w[0] >= 1000.0 - 1e-3);
        }
    }

    #[tokio::test]
    async fn insert_between_places_task_strictly_between() {
        let (backend, mut tx) = setup().await;
        let plan = make_plan(&backend, &mut tx, "P").await;

        let t1 = add(&backend, &mut tx, NewTask { content: "a".into(), plan_ids: vec![plan.clone()], ..Default::default() }).await.unwrap();
        let t2 = add(&backend, &mut tx, NewTask { content: "b".into(), plan_ids: vec![plan.clone()], ..Default::default() }).await.unwrap();

        let t4 = add(&backend, &mut tx, NewTask {
            content: "d".into(), plan_ids: vec![plan.clone()],
            after_task_id: Some(t1.id.clone()), before_task_id: Some(t2.id.clone()),
            ..Default::default()
        }).await.unwrap();

        let listed = list(&backend, &tx, Some(&plan), None, None, None).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|(t, _)| t.id.clone()).collect();
        assert_eq!(ids, vec![t1.id, t4.id, t2.id]);
    }

    #[tokio::test]
    async fn reorder_rewrites_positions_strictly_ascending() {
        let (backend, mut tx) = setup().await;
        let plan = make_plan(&backend, &mut tx, "P").await;

        let t1 = add(&backend, &mut tx, NewTask { content: "a".into(), plan_ids: vec![plan.clone()], ..Default::default() }).await.unwrap();
        let t2 = add(&backend, &mut tx, NewTask { content: "b".into(), plan_ids: vec![plan.clone()], ..Default::default() }).await.unwrap();
        let t3 = add(&backend, &mut tx, NewTask { content: "c".into(), plan_ids: vec![plan.clone()], ..Default::default() }).await.unwrap();

        let new_positions = crate::position::insert_positions(0.0, 0.0, 3);
        let written = update_positions(&backend, &mut tx, &plan, &[
            (t3.id.clone(), new_positions[0]),
            (t1.id.clone(), new_positions[1]),
            (t2.id.clone(), new_positions[2]),
        ]).await.unwrap();
        assert_eq!(written.len(), 3);

        let listed = list(&backend, &tx, Some(&plan), None, None, None).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|(t, _)| t.id.clone()).collect();
        assert_eq!(ids, vec![t3.id, t1.id, t2.id]);
    }
}
