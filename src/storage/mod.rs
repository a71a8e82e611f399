//! # Storage Backend Trait
//!
//! This is the contract between the repositories and the actual graph
//! storage. A production deployment points this trait at an external
//! property-graph store (administration, auth, and indexing internals of
//! that store are a collaborator concern, out of scope here); the
//! in-memory backend implements the same contract for embedding and tests.

pub mod memory;

use async_trait::async_trait;
use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::index::IndexType;
use crate::Result;

pub use memory::MemoryBackend;

// ============================================================================
// Expand depth specification
// ============================================================================

/// Depth specification for graph expansion.
#[derive(Debug, Clone, Copy)]
pub enum ExpandDepth {
    /// Range: min..max (inclusive)
    Range { min: usize, max: usize },
}

// ============================================================================
// Raw query escape hatch
// ============================================================================

/// Result of a raw query executed through [`StorageBackend::execute_raw`].
///
/// This lightweight type lives in the storage layer so the raw-query path
/// can return structured rows without depending on a query execution
/// engine — there isn't one here; the backend itself interprets the query
/// text (a real external graph store's driver forwards it unchanged).
#[derive(Debug, Clone, Default)]
pub struct ProcedureResult {
    pub columns: Vec<String>,
    pub rows: Vec<std::collections::HashMap<String, Value>>,
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The storage contract every backend implements.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    /// Establish (or verify) the connection. Called by the graph client's
    /// retry loop; a backend with no handshake (e.g. in-memory) returns
    /// immediately.
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    /// Shut down the backend, flushing any pending writes.
    async fn shutdown(&self) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node with the given labels and properties.
    async fn create_node(
        &self,
        tx: &mut Self::Tx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId>;

    /// Get a node by ID. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Delete a node. Returns true if it existed.
    /// Fails if the node still has relationships.
    async fn delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool>;

    /// Set a property on a node (upsert).
    async fn set_node_property(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()>;

    /// Delete a node and all its relationships in one operation.
    ///
    /// Default: get all relationships, delete each, then delete the node.
    async fn detach_delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool> {
        let rels = self.get_relationships(tx, id, Direction::Both, None).await?;
        for rel in &rels {
            self.delete_relationship(tx, rel.id).await?;
        }
        self.delete_node(tx, id).await
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    /// Create a relationship between two nodes.
    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Get a relationship by ID.
    async fn get_relationship(&self, tx: &Self::Tx, id: RelId) -> Result<Option<Relationship>>;

    /// Delete a relationship. Returns true if it existed.
    async fn delete_relationship(&self, tx: &mut Self::Tx, id: RelId) -> Result<bool>;

    /// Set a property on a relationship (upsert). Used for the PART_OF
    /// `position` property.
    async fn set_relationship_property(
        &self,
        tx: &mut Self::Tx,
        id: RelId,
        key: &str,
        val: Value,
    ) -> Result<()>;

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Get all relationships of a node, optionally filtered by direction and type.
    async fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    /// Expand from a node: BFS traversal to the given depth range.
    async fn expand(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        depth: ExpandDepth,
    ) -> Result<Vec<Path>>;

    // ========================================================================
    // Index
    // ========================================================================

    /// Create an index on a label+property combination. Idempotent.
    async fn create_index(
        &self,
        label: &str,
        property: &str,
        index_type: IndexType,
    ) -> Result<()>;

    // ========================================================================
    // Scan
    // ========================================================================

    /// Return all nodes with a given label.
    async fn nodes_by_label(&self, tx: &Self::Tx, label: &str) -> Result<Vec<Node>>;

    /// Find nodes by label + property value (index-backed if available).
    async fn nodes_by_property(
        &self,
        tx: &Self::Tx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>>;

    // ========================================================================
    // Escape hatch
    // ========================================================================

    /// Pass-through for backend-native queries — used by lexical/trigram
    /// search, which cannot be expressed through the typed CRUD surface
    /// above. A real external graph store's driver forwards `query`
    /// unchanged; the in-memory backend interprets a small fixed set of
    /// query shapes (see `memory::execute_raw`).
    async fn execute_raw(
        &self,
        tx: &Self::Tx,
        query: &str,
        params: PropertyMap,
    ) -> Result<ProcedureResult>;
}
