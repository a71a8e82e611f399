//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`. It backs
//! embedding and tests; a production deployment swaps in a backend that
//! talks to an external property-graph store over the same trait.
//!
//! ## Limitations
//!
//! - **No real transactions**: `commit_tx()` and `rollback_tx()` are no-ops.
//!   Writes are applied immediately. Rollback does NOT undo mutations —
//!   repositories that need rollback-on-failure semantics compensate
//!   explicitly rather than relying on the backend (see `task_repo::add`).
//! - **Single-writer only**: Per-collection locks mean multi-step mutations
//!   are NOT atomic across collections.
//! - **No real indexes**: `create_index()` is a no-op. All property lookups
//!   do a full scan; `execute_raw` emulates trigram search with the same
//!   scan-and-score approach described for the search tool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use async_trait::async_trait;

use crate::model::*;
use crate::tx::{Transaction, TxMode, TxId};
use crate::index::IndexType;
use crate::text::trigram_similarity;
use crate::{Error, Result};
use super::{StorageBackend, ExpandDepth, ProcedureResult};

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory property graph storage. Cheaply `Clone`: every clone shares the
/// same underlying `Arc<MemoryInner>`.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    nodes: RwLock<HashMap<NodeId, Node>>,
    relationships: RwLock<HashMap<RelId, Relationship>>,
    /// node_id → list of relationship IDs
    adjacency: RwLock<HashMap<NodeId, Vec<RelId>>>,
    /// label → set of node IDs (poor man's label index)
    label_index: RwLock<HashMap<String, Vec<NodeId>>>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                nodes: RwLock::new(HashMap::new()),
                relationships: RwLock::new(HashMap::new()),
                adjacency: RwLock::new(HashMap::new()),
                label_index: RwLock::new(HashMap::new()),
                next_node_id: AtomicU64::new(1),
                next_rel_id: AtomicU64::new(1),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction (currently just a marker — no real MVCC).
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn shutdown(&self) -> Result<()> { Ok(()) }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTx { id, mode })
    }

    /// No-op: memory backend applies writes immediately, not on commit.
    async fn commit_tx(&self, _tx: MemoryTx) -> Result<()> { Ok(()) }

    /// WARNING: No-op. Memory backend has no write-ahead log.
    /// Mutations applied during this transaction are NOT reverted.
    async fn rollback_tx(&self, _tx: MemoryTx) -> Result<()> { Ok(()) }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_node(
        &self,
        _tx: &mut MemoryTx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId> {
        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        let node = Node {
            id,
            element_id: None,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: props,
        };

        {
            let mut idx = self.inner.label_index.write();
            for label in &node.labels {
                idx.entry(label.clone()).or_default().push(id);
            }
        }

        self.inner.nodes.write().insert(id, node);
        self.inner.adjacency.write().insert(id, Vec::new());

        Ok(id)
    }

    async fn get_node(&self, _tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        Ok(self.inner.nodes.read().get(&id).cloned())
    }

    async fn delete_node(&self, _tx: &mut MemoryTx, id: NodeId) -> Result<bool> {
        {
            let adj = self.inner.adjacency.read();
            if let Some(rels) = adj.get(&id) {
                if !rels.is_empty() {
                    return Err(Error::ConstraintViolation(
                        format!("cannot delete node {id} with {} relationships; detach-delete first", rels.len())
                    ));
                }
            }
        }

        let removed = self.inner.nodes.write().remove(&id);
        self.inner.adjacency.write().remove(&id);

        if let Some(node) = &removed {
            let mut idx = self.inner.label_index.write();
            for label in &node.labels {
                if let Some(ids) = idx.get_mut(label) {
                    ids.retain(|nid| *nid != id);
                }
            }
        }

        Ok(removed.is_some())
    }

    async fn set_node_property(
        &self,
        _tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.properties.insert(key.to_string(), val);
        Ok(())
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    async fn create_relationship(
        &self,
        _tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        {
            let nodes = self.inner.nodes.read();
            if !nodes.contains_key(&src) {
                return Err(Error::NotFound(format!("source node {src}")));
            }
            if !nodes.contains_key(&dst) {
                return Err(Error::NotFound(format!("target node {dst}")));
            }
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        let rel = Relationship {
            id,
            element_id: None,
            src,
            dst,
            rel_type: rel_type.to_string(),
            properties: props,
        };

        self.inner.relationships.write().insert(id, rel);

        let mut adj = self.inner.adjacency.write();
        adj.entry(src).or_default().push(id);
        if src != dst {
            adj.entry(dst).or_default().push(id);
        }

        Ok(id)
    }

    async fn get_relationship(&self, _tx: &MemoryTx, id: RelId) -> Result<Option<Relationship>> {
        Ok(self.inner.relationships.read().get(&id).cloned())
    }

    async fn set_relationship_property(
        &self,
        _tx: &mut MemoryTx,
        id: RelId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        let mut rels = self.inner.relationships.write();
        let rel = rels.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("relationship {id}")))?;
        rel.properties.insert(key.to_string(), val);
        Ok(())
    }

    async fn delete_relationship(&self, _tx: &mut MemoryTx, id: RelId) -> Result<bool> {
        let removed = self.inner.relationships.write().remove(&id);
        if let Some(rel) = &removed {
            let mut adj = self.inner.adjacency.write();
            if let Some(rels) = adj.get_mut(&rel.src) {
                rels.retain(|rid| *rid != id);
            }
            if rel.src != rel.dst {
                if let Some(rels) = adj.get_mut(&rel.dst) {
                    rels.retain(|rid| *rid != id);
                }
            }
        }
        Ok(removed.is_some())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn get_relationships(
        &self,
        _tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let adj = self.inner.adjacency.read();
        let rels = self.inner.relationships.read();

        let rel_ids = adj.get(&node).cloned().unwrap_or_default();
        let mut result = Vec::new();

        for rid in rel_ids {
            if let Some(rel) = rels.get(&rid) {
                let matches_dir = match dir {
                    Direction::Outgoing => rel.src == node,
                    Direction::Incoming => rel.dst == node,
                    Direction::Both => true,
                };
                let matches_type = rel_type.map_or(true, |t| rel.rel_type == t);

                if matches_dir && matches_type {
                    result.push(rel.clone());
                }
            }
        }

        Ok(result)
    }

    async fn expand(
        &self,
        tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        depth: ExpandDepth,
    ) -> Result<Vec<Path>> {
        let ExpandDepth::Range { min: min_depth, max: max_depth } = depth;

        let mut results = Vec::new();
        let start_node = self.get_node(tx, node).await?
            .ok_or_else(|| Error::NotFound(format!("node {node}")))?;

        let mut queue: Vec<Path> = vec![Path::single(start_node)];

        for current_depth in 0..max_depth {
            let mut next_queue = Vec::new();

            for path in &queue {
                let tip = path.end();
                let rels = self.get_relationships(tx, tip.id, dir, None).await?;

                for rel in rels {
                    if !rel_types.is_empty() && !rel_types.contains(&rel.rel_type.as_str()) {
                        continue;
                    }

                    let next_id = rel.other_node(tip.id).unwrap_or(rel.dst);

                    if path.nodes.iter().any(|n| n.id == next_id) {
                        continue;
                    }

                    if let Some(next_node) = self.get_node(tx, next_id).await? {
                        let mut new_path = path.clone();
                        new_path.append(rel, next_node);

                        if current_depth + 1 >= min_depth {
                            results.push(new_path.clone());
                        }
                        if current_depth + 1 < max_depth {
                            next_queue.push(new_path);
                        }
                    }
                }
            }

            queue = next_queue;
            if queue.is_empty() { break; }
        }

        Ok(results)
    }

    // ========================================================================
    // Index (stub for memory — label index is always maintained)
    // ========================================================================

    async fn create_index(&self, _label: &str, _property: &str, _index_type: IndexType) -> Result<()> {
        Ok(())
    }

    // ========================================================================
    // Scan
    // ========================================================================

    async fn nodes_by_label(&self, _tx: &MemoryTx, label: &str) -> Result<Vec<Node>> {
        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();

        let ids = idx.get(label).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|id| nodes.get(id).cloned()).collect())
    }

    async fn nodes_by_property(
        &self,
        _tx: &MemoryTx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>> {
        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();

        let ids = idx.get(label).cloned().unwrap_or_default();
        Ok(ids.iter()
            .filter_map(|id| nodes.get(id))
            .filter(|n| n.get(key) == Some(value))
            .cloned()
            .collect())
    }

    // ========================================================================
    // Raw query escape hatch — emulates the trigram-ranked substring search
    // used by memory search. `query` is not parsed as Cypher: the memory
    // repository passes a fixed marker ("trigram_search:Memory") and the
    // search text/limit through `params`.
    // ========================================================================

    async fn execute_raw(
        &self,
        _tx: &MemoryTx,
        query: &str,
        params: PropertyMap,
    ) -> Result<ProcedureResult> {
        if query != "trigram_search:Memory" {
            return Err(Error::StorageError(format!("unsupported raw query: {query}")));
        }

        let text = params.get("text").and_then(Value::as_str).unwrap_or("").to_string();
        let limit = params.get("limit").and_then(Value::as_int).unwrap_or(10).max(0) as usize;

        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();
        let ids = idx.get("Memory").cloned().unwrap_or_default();

        let mut scored: Vec<(String, f64)> = Vec::new();
        for id in ids {
            let Some(node) = nodes.get(&id) else { continue };
            let content = node.get("content").and_then(Value::as_str).unwrap_or("");
            let node_id = node.get("id").and_then(Value::as_str).unwrap_or("");

            let content_hit = crate::text::contains_ci(content, &text);
            let id_hit = crate::text::contains_ci(node_id, &text);
            if !content_hit && !id_hit && !text.is_empty() {
                continue;
            }

            let score = trigram_similarity(content, &text).max(trigram_similarity(node_id, &text));
            scored.push((node_id.to_string(), score));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        let rows = scored.into_iter().map(|(id, score)| {
            let mut row = std::collections::HashMap::new();
            row.insert("id".to_string(), Value::String(id));
            row.insert("score".to_string(), Value::Float(score));
            row
        }).collect();

        Ok(ProcedureResult {
            columns: vec!["id".to_string(), "score".to_string()],
            rows,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let mut props = PropertyMap::new();
        props.insert("name".into(), Value::from("Ada"));

        let id = db.create_node(&mut tx, &["Person"], props).await.unwrap();
        let node = db.get_node(&tx, id).await.unwrap().unwrap();

        assert_eq!(node.labels, vec!["Person"]);
        assert_eq!(node.get("name"), Some(&Value::from("Ada")));
    }

    #[tokio::test]
    async fn test_create_relationship() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();

        let rel_id = db.create_relationship(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();
        let rel = db.get_relationship(&tx, rel_id).await.unwrap().unwrap();

        assert_eq!(rel.src, a);
        assert_eq!(rel.dst, b);
        assert_eq!(rel.rel_type, "KNOWS");
    }

    #[tokio::test]
    async fn test_cannot_delete_connected_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();

        let result = db.delete_node(&mut tx, a).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_detach_delete_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();

        assert!(db.delete_node(&mut tx, a).await.is_err());
        assert!(db.detach_delete_node(&mut tx, a).await.unwrap());
        assert!(db.get_node(&tx, a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_traversal() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let c = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();

        db.create_relationship(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, b, c, "KNOWS", PropertyMap::new()).await.unwrap();

        let paths = db.expand(&tx, a, Direction::Outgoing, &["KNOWS"], ExpandDepth::Range { min: 1, max: 2 }).await.unwrap();

        assert_eq!(paths.len(), 2);
    }

    #[tokio::test]
    async fn test_raw_trigram_search() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let mut props = PropertyMap::new();
        props.insert("id".into(), Value::from("m1"));
        props.insert("content".into(), Value::from("fractional position ordering"));
        db.create_node(&mut tx, &["Memory"], props).await.unwrap();

        let mut params = PropertyMap::new();
        params.insert("text".into(), Value::from("position"));
        params.insert("limit".into(), Value::from(10));

        let result = db.execute_raw(&tx, "trigram_search:Memory", params).await.unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("id"), Some(&Value::String("m1".into())));
    }
}
