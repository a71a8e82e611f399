//! Memory repository (C3): CRUD, lexical/trigram search, and bounded-depth
//! traversal over memory nodes and their typed edges.

use std::collections::HashMap;
use tracing::debug;

use crate::domain::{Memory, MemoryPatch, NewMemory, RelatedEntry, SearchHit, TraversalDirection};
use crate::helpers::{
    ensure_relationship_to_domain_id, find_by_id, metadata_to_property, tags_to_property,
    validate_relation_type, vertex_to_memory,
};
use crate::model::{Direction, PropertyMap, Value};
use crate::storage::{ExpandDepth, StorageBackend};
use crate::{Error, Result};

const LABEL: &str = "Memory";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Assigns an id if absent, stamps both timestamps, defaults `type`, writes
/// the node plus each requested outgoing edge (idempotent). Returns the
/// created record.
pub async fn add<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    input: NewMemory,
) -> Result<Memory> {
    if input.content.trim().is_empty() {
        return Err(Error::InvalidInput("memory content must not be empty".into()));
    }

    let id = input.id.unwrap_or_else(new_id);
    let memory_type = input.memory_type.unwrap_or_else(|| "Memory".to_string());
    let timestamp = now();

    let mut props = PropertyMap::new();
    props.insert("id".into(), Value::from(id.clone()));
    props.insert("node_type".into(), Value::from(LABEL));
    props.insert("type".into(), Value::from(memory_type.clone()));
    props.insert("content".into(), Value::from(input.content.clone()));
    props.insert("tags".into(), tags_to_property(&input.tags));
    props.insert("metadata".into(), metadata_to_property(&input.metadata));
    props.insert("created_at".into(), Value::from(timestamp.clone()));
    props.insert("updated_at".into(), Value::from(timestamp.clone()));

    let node_id = backend.create_node(tx, &[LABEL], props).await?;

    for rel in &input.relationships {
        ensure_relationship_to_domain_id(backend, tx, node_id, &rel.to_id, &rel.rel_type).await?;
    }

    Ok(Memory {
        id,
        node_type: LABEL.to_string(),
        memory_type,
        content: input.content,
        tags: input.tags,
        metadata: input.metadata,
        created_at: timestamp.clone(),
        updated_at: timestamp,
    })
}

/// Returns the record, or `None` if absent. Never errors on a missing id.
pub async fn get_by_id<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: &str,
) -> Result<Option<Memory>> {
    Ok(find_by_id(backend, tx, LABEL, id).await?.map(|n| vertex_to_memory(&n)))
}

/// The memory plus a deduplicated flat list of direct relationships.
pub async fn get_by_id_with_related<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: &str,
) -> Result<Option<(Memory, Vec<RelatedEntry>)>> {
    let Some(node) = find_by_id(backend, tx, LABEL, id).await? else {
        return Ok(None);
    };

    let rels = backend.get_relationships(tx, node.id, Direction::Both, None).await?;
    let mut seen = std::collections::HashSet::new();
    let mut related = Vec::new();

    for rel in rels {
        let (neighbor_id, direction) = if rel.src == node.id {
            (rel.dst, TraversalDirection::Outgoing)
        } else {
            (rel.src, TraversalDirection::Incoming)
        };

        let Some(neighbor) = backend.get_node(tx, neighbor_id).await? else { continue };
        let neighbor_domain_id = neighbor.get("id").and_then(Value::as_str).unwrap_or("").to_string();
        let neighbor_type = neighbor.get("node_type").and_then(Value::as_str).unwrap_or("").to_string();

        let key = (neighbor_domain_id.clone(), rel.rel_type.clone(), direction);
        if !seen.insert(key) {
            continue;
        }

        related.push(RelatedEntry {
            id: neighbor_domain_id,
            node_type: neighbor_type,
            edge_type: rel.rel_type,
            direction,
            depth: 1,
        });
    }

    Ok(Some((vertex_to_memory(&node), related)))
}

/// SET-style partial update: only non-`None` fields mutate; `updated_at` is
/// always bumped. New relationships go through check-then-create.
pub async fn update<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    id: &str,
    patch: MemoryPatch,
) -> Result<Memory> {
    let node = find_by_id(backend, tx, LABEL, id).await?
        .ok_or_else(|| Error::NotFound(format!("memory {id}")))?;

    if let Some(content) = &patch.content {
        backend.set_node_property(tx, node.id, "content", Value::from(content.clone())).await?;
    }
    if let Some(tags) = &patch.tags {
        backend.set_node_property(tx, node.id, "tags", tags_to_property(tags)).await?;
    }
    if let Some(metadata) = &patch.metadata {
        backend.set_node_property(tx, node.id, "metadata", metadata_to_property(metadata)).await?;
    }
    let timestamp = now();
    backend.set_node_property(tx, node.id, "updated_at", Value::from(timestamp)).await?;

    for rel in &patch.relationships {
        ensure_relationship_to_domain_id(backend, tx, node.id, &rel.to_id, &rel.rel_type).await?;
    }

    let updated = backend.get_node(tx, node.id).await?
        .ok_or_else(|| Error::NotFound(format!("memory {id}")))?;
    Ok(vertex_to_memory(&updated))
}

/// Detach-deletes the node. A delete of an absent id is a soft no-op.
pub async fn delete<B: StorageBackend>(backend: &B, tx: &mut B::Tx, id: &str) -> Result<bool> {
    let Some(node) = find_by_id(backend, tx, LABEL, id).await? else {
        debug!(id, "delete_memory: id not found, soft no-op");
        return Ok(false);
    };
    backend.detach_delete_node(tx, node.id).await
}

/// Two-phase lexical/trigram search: Phase 1 ranks by trigram similarity
/// over `content`/`id`; Phase 2 fetches each hit's related memory ids.
pub async fn search<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<SearchHit>> {
    let limit = limit.unwrap_or(10);

    let mut params = PropertyMap::new();
    params.insert("text".into(), Value::from(query.to_string()));
    params.insert("limit".into(), Value::from(limit as i64));

    let result = backend.execute_raw(tx, "trigram_search:Memory", params).await?;

    let mut hits = Vec::with_capacity(result.rows.len());
    for row in result.rows {
        let Some(id) = row.get("id").and_then(Value::as_str) else { continue };
        let score = row.get("score").and_then(Value::as_float).unwrap_or(0.0);

        let Some(node) = find_by_id(backend, tx, LABEL, id).await? else { continue };
        let related_ids = direct_related_ids(backend, tx, node.id).await?;

        hits.push(SearchHit { memory: vertex_to_memory(&node), score, related_ids });
    }

    Ok(hits)
}

async fn direct_related_ids<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    node_id: crate::model::NodeId,
) -> Result<Vec<String>> {
    let rels = backend.get_relationships(tx, node_id, Direction::Both, None).await?;
    let mut ids = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for rel in rels {
        let neighbor_id = if rel.src == node_id { rel.dst } else { rel.src };
        let Some(neighbor) = backend.get_node(tx, neighbor_id).await? else { continue };
        let Some(domain_id) = neighbor.get("id").and_then(Value::as_str) else { continue };
        if seen.insert(domain_id.to_string()) {
            ids.push(domain_id.to_string());
        }
    }

    Ok(ids)
}

/// All nodes reachable in `1..=depth` hops via the edge allowlist,
/// optionally filtered by `edge_type` and `direction`. Deduplicated by
/// neighbor id, earliest-depth wins; ordered ascending by depth.
pub async fn get_related<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: &str,
    edge_type: Option<&str>,
    direction: TraversalDirection,
    depth: usize,
) -> Result<Vec<RelatedEntry>> {
    let node = find_by_id(backend, tx, LABEL, id).await?
        .ok_or_else(|| Error::NotFound(format!("memory {id}")))?;

    if let Some(t) = edge_type {
        validate_relation_type(t)?;
    }
    let rel_types: Vec<&str> = edge_type.into_iter().collect();

    let model_dir = match direction {
        TraversalDirection::Outgoing => Direction::Outgoing,
        TraversalDirection::Incoming => Direction::Incoming,
        TraversalDirection::Both => Direction::Both,
    };

    let depth = depth.max(1);
    let paths = backend.expand(tx, node.id, model_dir, &rel_types, ExpandDepth::Range { min: 1, max: depth }).await?;

    let mut by_id: HashMap<String, RelatedEntry> = HashMap::new();

    for path in paths {
        let hop_count = path.relationships.len();
        let Some(last_rel) = path.relationships.last() else { continue };
        let neighbor = path.end();
        let Some(neighbor_domain_id) = neighbor.get("id").and_then(Value::as_str) else { continue };

        let prev_node = &path.nodes[path.nodes.len() - 2];
        let hop_direction = if last_rel.src == prev_node.id {
            TraversalDirection::Outgoing
        } else {
            TraversalDirection::Incoming
        };

        let entry = RelatedEntry {
            id: neighbor_domain_id.to_string(),
            node_type: neighbor.get("node_type").and_then(Value::as_str).unwrap_or("").to_string(),
            edge_type: last_rel.rel_type.clone(),
            direction: hop_direction,
            depth: hop_count,
        };

        by_id.entry(entry.id.clone())
            .and_modify(|existing| if entry.depth < existing.depth { *existing = entry.clone(); })
            .or_insert(entry);
    }

    let mut results: Vec<RelatedEntry> = by_id.into_values().collect();
    results.sort_by_key(|e| e.depth);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RelationshipInput;
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
        let created = add(&backend, &mut tx, NewMemory { content: "hello world".into(), ..Default::default() }).await.unwrap();
        let fetched = get_by_id(&backend, &tx, &created.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello world");
        assert_eq!(fetched.memory_type, "Memory");
    }

    #[tokio::test]
    async fn get_by_id_missing_returns_none() {
        let (backend, tx) = setup().await;
        assert!(get_by_id(&backend, &tx, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_missing_is_soft_noop() {
        let (backend, mut tx) = setup().await;
        assert!(!delete(&backend, &mut tx, "nope").await.unwrap());
    }

    #[tokio::test]
    async fn idempotent_relationship_creates_exactly_one_edge() {
        let (backend, mut tx) = setup().await;
        let m1 = add(&backend, &mut tx, NewMemory { content: "m1".into(), ..Default::default() }).await.unwrap();
        let m2 = add(&backend, &mut tx, NewMemory { content: "m2".into(), ..Default::default() }).await.unwrap();

        let patch = MemoryPatch {
            relationships: vec![RelationshipInput { to_id: m2.id.clone(), rel_type: "RELATES_TO".into() }],
            ..Default::default()
        };
        update(&backend, &mut tx, &m1.id, patch.clone()).await.unwrap();
        update(&backend, &mut tx, &m1.id, patch).await.unwrap();

        let related = get_related(&backend, &tx, &m1.id, Some("RELATES_TO"), TraversalDirection::Outgoing, 1).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, m2.id);
    }

    #[tokio::test]
    async fn search_ranks_by_trigram_similarity() {
        let (backend, mut tx) = setup().await;
        add(&backend, &mut tx, NewMemory { content: "fractional position ordering".into(), ..Default::default() }).await.unwrap();
        add(&backend, &mut tx, NewMemory { content: "completely unrelated text".into(), ..Default::default() }).await.unwrap();

        let hits = search(&backend, &tx, "position", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].memory.content.contains("position"));
    }
}
