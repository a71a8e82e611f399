//! # assoc-memory-graph — Persistent Associative-Memory Graph for AI Agents
//!
//! A property-graph service that gives an AI coding agent durable memory:
//! freeform notes, structured plans, and ordered tasks, all connected by
//! typed relationships, exposed as MCP tools over JSON-RPC.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the
//!    repositories and the actual graph storage.
//! 2. **Clean DTOs**: `Node`, `Relationship`, `Value` cross every boundary.
//! 3. **Repositories own domain semantics**: the storage layer knows nothing
//!    about memories, plans, or tasks — only nodes, relationships, and
//!    properties.
//! 4. **The façade is thin**: MCP tool handlers validate input and delegate;
//!    they contain no business logic of their own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use assoc_memory_graph::{GraphClient, TxMode, storage::MemoryBackend};
//! use assoc_memory_graph::domain::NewMemory;
//! use assoc_memory_graph::repo::memory_repo;
//!
//! # async fn example() -> assoc_memory_graph::Result<()> {
//! let client = GraphClient::new(MemoryBackend::new());
//! client.bootstrap_schema().await?;
//!
//! let mut tx = client.begin_tx(TxMode::ReadWrite).await?;
//! let memory = memory_repo::add(client.backend(), &mut tx, NewMemory {
//!     content: "hello world".into(),
//!     ..Default::default()
//! }).await?;
//! client.commit(tx).await?;
//! # let _ = memory;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod tx;
pub mod index;
pub mod text;
pub mod domain;
pub mod client;
pub mod helpers;
pub mod position;
pub mod repo;
pub mod mcp;
pub mod config;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, Relationship, Path, Value, PropertyMap,
    NodeId, RelId, Direction,
};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{StorageBackend, ProcedureResult};

// ============================================================================
// Re-exports: Transactions
// ============================================================================

pub use tx::{Transaction, TxMode, TxId};

// ============================================================================
// Re-exports: Client
// ============================================================================

pub use client::GraphClient;

// ============================================================================
// Error Types
// ============================================================================

/// The error taxonomy shared by every layer. The MCP façade maps each
/// variant to a JSON-RPC error code (see `mcp::to_mcp_error`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller supplied a malformed or out-of-range argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller referenced an entity that exists but is the wrong kind,
    /// or a reference that would violate a graph invariant (e.g. a task
    /// pointing at a plan it does not belong to).
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// The storage backend failed in a way the caller cannot repair by
    /// changing their request (connection drop, backend-side error).
    #[error("storage error: {0}")]
    StorageError(String),

    /// An internal query/execution step failed (e.g. the in-memory
    /// backend's raw-query emulation rejected an unrecognized shape).
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// The operation was cancelled before it completed (e.g. during
    /// connect-retry shutdown).
    #[error("cancelled")]
    Cancelled,

    /// A write would violate a graph invariant (duplicate edge, node
    /// still has relationships, etc).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
