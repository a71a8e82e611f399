//! JSON-Schema parameter structs for every MCP tool (§6). One struct per
//! tool, `JsonSchema`-derived so `rmcp` can publish the tool's input schema
//! to the calling agent.

use std::collections::HashMap;
use schemars::JsonSchema;
use serde::Deserialize;

fn default_limit() -> Option<usize> { None }
fn default_depth() -> usize { 2 }
fn default_direction() -> Option<String> { None }

/// One entry of a tool's `relationships` argument: `{to_id, type}`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RelationshipParam {
    pub to_id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
}

// ============================================================================
// Memory tools
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddMemoryParams {
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipParam>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetMemoryParams {
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchMemoriesParams {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateMemoryParams {
    pub id: String,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub relationships: Vec<RelationshipParam>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteMemoryParams {
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetRelatedParams {
    pub id: String,
    pub relationship_type: Option<String>,
    #[serde(default = "default_direction")]
    pub direction: Option<String>,
    #[serde(default = "default_depth")]
    pub depth: usize,
}

// ============================================================================
// Plan tools
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePlanParams {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipParam>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPlanParams {
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListPlansParams {
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdatePlanParams {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub relationships: Vec<RelationshipParam>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeletePlanParams {
    pub id: String,
}

// ============================================================================
// Task tools
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTaskParams {
    pub content: String,
    pub plan_ids: Vec<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipParam>,
    pub after_task_id: Option<String>,
    pub before_task_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTaskParams {
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTasksParams {
    pub plan_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateTaskParams {
    pub id: String,
    pub content: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub add_plan_ids: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipParam>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteTaskParams {
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReorderTasksParams {
    pub plan_id: String,
    pub task_ids: Vec<String>,
    pub before_task_id: Option<String>,
    pub after_task_id: Option<String>,
}
