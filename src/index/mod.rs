//! Index management.

use serde::{Deserialize, Serialize};

/// Type of index to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    /// B-tree index for equality and range queries.
    BTree,
    /// Trigram index, backing substring/similarity search on text properties.
    Trigram,
}
