//! Domain records: the shapes repositories read and write, independent of
//! how they are stored in the graph. Conversion to/from `Node`/`Relationship`
//! lives in [`crate::helpers`].

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub node_type: String,
    #[serde(rename = "type")]
    pub memory_type: String,
    pub content: String,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input to `memory_repo::add`.
#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    pub id: Option<String>,
    pub memory_type: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub relationships: Vec<RelationshipInput>,
}

/// Partial update to a memory. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, String>>,
    pub relationships: Vec<RelationshipInput>,
}

// ============================================================================
// Plan
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Completed,
    Archived,
}

impl Default for PlanStatus {
    fn default() -> Self { PlanStatus::Active }
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Active => "active",
            PlanStatus::Completed => "completed",
            PlanStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PlanStatus::Draft),
            "active" => Some(PlanStatus::Active),
            "completed" => Some(PlanStatus::Completed),
            "archived" => Some(PlanStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub node_type: String,
    pub name: String,
    pub description: String,
    pub status: PlanStatus,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewPlan {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub status: Option<PlanStatus>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub relationships: Vec<RelationshipInput>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<PlanStatus>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, String>>,
    pub relationships: Vec<RelationshipInput>,
}

// ============================================================================
// Task
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Blocked,
}

impl Default for TaskStatus {
    fn default() -> Self { TaskStatus::Pending }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "cancelled" => Some(TaskStatus::Cancelled),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub node_type: String,
    pub content: String,
    pub status: TaskStatus,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub id: Option<String>,
    pub content: String,
    pub plan_ids: Vec<String>,
    pub status: Option<TaskStatus>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub relationships: Vec<RelationshipInput>,
    pub after_task_id: Option<String>,
    pub before_task_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub content: Option<String>,
    pub status: Option<TaskStatus>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, String>>,
    pub add_plan_ids: Vec<String>,
    pub relationships: Vec<RelationshipInput>,
}

// ============================================================================
// Shared result/input shapes
// ============================================================================

/// A caller-requested outgoing relationship, e.g. `{to_id, type}`.
#[derive(Debug, Clone)]
pub struct RelationshipInput {
    pub to_id: String,
    pub rel_type: String,
}

/// Direction of traversal, in domain terms (distinct from the storage
/// layer's `model::Direction` — this one also appears in serialized API
/// responses, so it is spelled out rather than reused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalDirection {
    Outgoing,
    Incoming,
    Both,
}

impl Default for TraversalDirection {
    fn default() -> Self { TraversalDirection::Both }
}

/// One entry in a `get_related`/`get_by_id_with_related` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntry {
    pub id: String,
    pub node_type: String,
    pub edge_type: String,
    pub direction: TraversalDirection,
    pub depth: usize,
}

/// One hit in a `search_memories` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub memory: Memory,
    pub score: f64,
    pub related_ids: Vec<String>,
}

/// One task entry in a `get_plan` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInPlan {
    pub task: Task,
    pub position: f64,
    pub depends_on: Vec<String>,
    pub blocks: Vec<String>,
}
