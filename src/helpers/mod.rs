//! Conversion and safety helpers (C2): turn graph nodes into domain records,
//! validate relationship-type names, and apply the idempotent check-then-
//! create discipline shared by every repository.

use std::collections::HashMap;
use tracing::warn;

use crate::domain::{Memory, Plan, PlanStatus, Task, TaskStatus};
use crate::model::{Direction, Node, NodeId, PropertyMap, Value};
use crate::storage::StorageBackend;
use crate::tx::Transaction;
use crate::{Error, Result};

/// The closed allowlist of relationship types (I1). Every call that
/// interpolates a relationship type name MUST pass through
/// [`validate_relation_type`] first.
pub const ALLOWED_RELATION_TYPES: &[&str] = &[
    "RELATES_TO", "PART_OF", "REFERENCES", "DEPENDS_ON", "BLOCKS", "FOLLOWS", "IMPLEMENTS",
];

/// Node labels that may appear as the target of a cross-type relationship
/// (§4.6 "match guard permits target labels in {Memory, Plan, Task}").
pub const TARGET_LABELS: &[&str] = &["Memory", "Plan", "Task"];

pub fn validate_relation_type(t: &str) -> Result<()> {
    if ALLOWED_RELATION_TYPES.contains(&t) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("unknown relationship type: {t}")))
    }
}

/// Neutralizes backslash, single/double quote, newline, carriage-return,
/// tab, and null bytes. Applied to any user-supplied string that must be
/// concatenated into identifier position (labels, edge-type names); value
/// position always prefers positional parameters over this.
pub fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Renders `tags` as the graph-language list literal form, e.g.
/// `["a", "b"]`, so the native `IN` operator works against a stored array.
pub fn tags_to_list_literal(tags: &[String]) -> String {
    let items: Vec<String> = tags.iter()
        .map(|t| format!("\"{}\"", escape_literal(t)))
        .collect();
    format!("[{}]", items.join(", "))
}

// ============================================================================
// Property read helpers
// ============================================================================

fn get_string(node: &Node, key: &str) -> String {
    node.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

fn get_string_list(node: &Node, key: &str) -> Vec<String> {
    match node.get(key) {
        Some(Value::List(items)) => items.iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn get_metadata(node: &Node, key: &str) -> HashMap<String, String> {
    match node.get(key).and_then(Value::as_str) {
        Some(raw) => serde_json::from_str(raw).unwrap_or_default(),
        None => HashMap::new(),
    }
}

pub fn metadata_to_property(metadata: &HashMap<String, String>) -> Value {
    Value::String(serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string()))
}

pub fn tags_to_property(tags: &[String]) -> Value {
    Value::List(tags.iter().map(|t| Value::String(t.clone())).collect())
}

// ============================================================================
// vertex_to_<Record>
// ============================================================================

/// Rebuilds a [`Memory`] from a graph node. Missing properties yield empty
/// strings / nil slices; nothing panics on unexpected shape.
pub fn vertex_to_memory(node: &Node) -> Memory {
    let memory_type = get_string(node, "type");
    Memory {
        id: get_string(node, "id"),
        node_type: get_string(node, "node_type"),
        memory_type: if memory_type.is_empty() { "Memory".to_string() } else { memory_type },
        content: get_string(node, "content"),
        tags: get_string_list(node, "tags"),
        metadata: get_metadata(node, "metadata"),
        created_at: get_string(node, "created_at"),
        updated_at: get_string(node, "updated_at"),
    }
}

pub fn vertex_to_plan(node: &Node) -> Plan {
    let status = PlanStatus::parse(&get_string(node, "status")).unwrap_or_default();
    Plan {
        id: get_string(node, "id"),
        node_type: get_string(node, "node_type"),
        name: get_string(node, "name"),
        description: get_string(node, "description"),
        status,
        tags: get_string_list(node, "tags"),
        metadata: get_metadata(node, "metadata"),
        created_at: get_string(node, "created_at"),
        updated_at: get_string(node, "updated_at"),
    }
}

pub fn vertex_to_task(node: &Node) -> Task {
    let status = TaskStatus::parse(&get_string(node, "status")).unwrap_or_default();
    Task {
        id: get_string(node, "id"),
        node_type: get_string(node, "node_type"),
        content: get_string(node, "content"),
        status,
        tags: get_string_list(node, "tags"),
        metadata: get_metadata(node, "metadata"),
        created_at: get_string(node, "created_at"),
        updated_at: get_string(node, "updated_at"),
    }
}

// ============================================================================
// Idempotent relationship discipline (§4.6)
// ============================================================================

/// Ensures exactly one `rel_type` edge exists from `src` to `dst`: (1)
/// validates the type against the allowlist, (2) looks for an existing
/// edge of that exact triple, (3) creates it only if none was found. Runs
/// inside the caller's transaction, so a later rollback undoes it.
pub async fn ensure_relationship<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    src: NodeId,
    dst: NodeId,
    rel_type: &str,
    props: PropertyMap,
) -> Result<()> {
    validate_relation_type(rel_type)?;

    let existing = backend.get_relationships(tx, src, Direction::Outgoing, Some(rel_type)).await?;
    if existing.iter().any(|r| r.dst == dst) {
        return Ok(());
    }

    backend.create_relationship(tx, src, dst, rel_type, props).await?;
    Ok(())
}

/// Like [`ensure_relationship`] but resolves `to_id` (a domain string id)
/// against {Memory, Plan, Task} first and logs, rather than fails, if the
/// target cannot be found — matching §4.3's lenient "relationship-creation
/// failures ... are logged but do not fail the overall operation".
pub async fn ensure_relationship_to_domain_id<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    src: NodeId,
    to_id: &str,
    rel_type: &str,
) -> Result<()> {
    if let Err(e) = validate_relation_type(rel_type) {
        warn!(to_id, rel_type, error = %e, "rejected relationship: invalid type");
        return Ok(());
    }

    let dst = match resolve_domain_id(backend, tx, to_id).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!(to_id, rel_type, "relationship target not found, skipping");
            return Ok(());
        }
        Err(e) => {
            warn!(to_id, rel_type, error = %e, "relationship lookup failed, skipping");
            return Ok(());
        }
    };

    if let Err(e) = ensure_relationship(backend, tx, src, dst, rel_type, PropertyMap::new()).await {
        warn!(to_id, rel_type, error = %e, "relationship creation failed, skipping");
    }
    Ok(())
}

/// Finds the internal `NodeId` for a domain string `id` across the three
/// target labels (Memory, Plan, Task).
pub async fn resolve_domain_id<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: &str,
) -> Result<Option<NodeId>> {
    for label in TARGET_LABELS {
        let matches = backend.nodes_by_property(tx, label, "id", &Value::String(id.to_string())).await?;
        if let Some(node) = matches.into_iter().next() {
            return Ok(Some(node.id));
        }
    }
    Ok(None)
}

/// Finds the full node for a domain string `id`, restricted to `label`.
pub async fn find_by_id<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    label: &str,
    id: &str,
) -> Result<Option<Node>> {
    let matches = backend.nodes_by_property(tx, label, "id", &Value::String(id.to_string())).await?;
    Ok(matches.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlisted_types_pass() {
        for t in ALLOWED_RELATION_TYPES {
            assert!(validate_relation_type(t).is_ok());
        }
    }

    #[test]
    fn unknown_type_rejected() {
        assert!(validate_relation_type("DESTROYS").is_err());
    }

    #[test]
    fn escape_literal_neutralizes_special_chars() {
        let input = "a\\b'c\"d\ne\rf\tg\0h";
        let out = escape_literal(input);
        assert!(!out.contains('\0'));
        assert!(out.contains("\\\\"));
        assert!(out.contains("\\'"));
        assert!(out.contains("\\n"));
    }

    #[test]
    fn tags_list_literal_shape() {
        let tags = vec!["rust".to_string(), "graph".to_string()];
        assert_eq!(tags_to_list_literal(&tags), "[\"rust\", \"graph\"]");
    }

    #[test]
    fn vertex_to_memory_defaults_type_when_absent() {
        let node = Node::new(NodeId(1))
            .with_labels(["Memory"])
            .with_property("id", "m1");
        let memory = vertex_to_memory(&node);
        assert_eq!(memory.memory_type, "Memory");
        assert_eq!(memory.content, "");
    }
}
