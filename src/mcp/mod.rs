//! MCP (Model Context Protocol) server (C6): exposes every repository
//! operation as a JSON-RPC tool over stdio (and, behind `--http`, streamable
//! HTTP) so that AI coding agents can call them directly.
//!
//! Every tool call runs on its own spawned task and opens exactly one
//! transaction through the [`GraphClient`], committing on success or
//! rolling back on error; see `MemoryGraphMcp::write`/`read`.

pub mod schema;

use rmcp::{
    handler::server::tool::{ToolCallContext, ToolRouter},
    handler::server::wrapper::Parameters,
    model::*,
    service::RequestContext,
    tool, tool_router, ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use tracing::warn;

use crate::client::GraphClient;
use crate::domain::{
    MemoryPatch, NewMemory, NewPlan, NewTask, PlanPatch, PlanStatus, RelationshipInput, TaskPatch,
    TaskStatus, TraversalDirection,
};
use crate::position::insert_positions;
use crate::repo::{memory_repo, plan_repo, task_repo};
use crate::storage::MemoryBackend;
use crate::tx::TxMode;
use crate::Error;

use schema::*;

fn json_text(v: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| "null".to_string())
}

/// Maps this crate's [`Error`] onto an MCP JSON-RPC error, per the table in
/// SPEC_FULL.md §7: `NotFound`/`InvalidInput`/`InvalidReference` are caller
/// mistakes (`invalid_params`); `StorageError`/`ExecutionError`/`Cancelled`/
/// `ConstraintViolation`/`Io` are server-side (`internal_error`).
fn to_mcp_error(e: Error) -> McpError {
    match e {
        Error::NotFound(_) | Error::InvalidInput(_) | Error::InvalidReference(_) => {
            McpError::invalid_params(e.to_string(), None)
        }
        Error::StorageError(_)
        | Error::ExecutionError(_)
        | Error::Cancelled
        | Error::ConstraintViolation(_)
        | Error::Io(_) => McpError::internal_error(e.to_string(), None),
    }
}

fn parse_status<T>(raw: &Option<String>, parse: impl Fn(&str) -> Option<T>, field: &str) -> Result<Option<T>, McpError> {
    raw.as_deref()
        .map(|s| parse(s).ok_or_else(|| McpError::invalid_params(format!("invalid {field}: {s}"), None)))
        .transpose()
}

fn relationships(params: Vec<RelationshipParam>) -> Vec<RelationshipInput> {
    params.into_iter().map(|r| RelationshipInput { to_id: r.to_id, rel_type: r.rel_type }).collect()
}

fn direction(raw: &Option<String>) -> Result<TraversalDirection, McpError> {
    match raw.as_deref() {
        None | Some("both") => Ok(TraversalDirection::Both),
        Some("outgoing") => Ok(TraversalDirection::Outgoing),
        Some("incoming") => Ok(TraversalDirection::Incoming),
        Some(other) => Err(McpError::invalid_params(format!("invalid direction: {other}"), None)),
    }
}

/// The MCP server struct. Holds the auto-generated tool router and the
/// graph client every handler delegates through.
#[derive(Clone)]
pub struct MemoryGraphMcp {
    #[allow(dead_code)]
    tool_router: ToolRouter<Self>,
    client: std::sync::Arc<GraphClient<MemoryBackend>>,
}

impl MemoryGraphMcp {
    pub fn new(client: std::sync::Arc<GraphClient<MemoryBackend>>) -> Self {
        Self { tool_router: Self::tool_router(), client }
    }

    /// Opens a read-write transaction, runs `f`, and commits on `Ok` or
    /// rolls back on `Err`. Runs on its own spawned task, per the one
    /// task per `tools/call` model.
    async fn write<T, F, Fut>(&self, f: F) -> Result<T, McpError>
    where
        T: Send + 'static,
        F: FnOnce(<MemoryBackend as crate::storage::StorageBackend>::Tx) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = (Result<T, Error>, <MemoryBackend as crate::storage::StorageBackend>::Tx)> + Send,
    {
        let client = self.client.clone();
        tokio::spawn(async move {
            let tx = client.begin_tx(TxMode::ReadWrite).await?;
            let (result, tx) = f(tx).await;
            match &result {
                Ok(_) => { let _ = client.commit(tx).await; }
                Err(_) => { let _ = client.rollback(tx).await; }
            }
            result
        })
        .await
        .map_err(|e| McpError::internal_error(format!("task join error: {e}"), None))?
        .map_err(to_mcp_error)
    }

    /// Opens a read-only transaction and runs `f`, rolling back afterward
    /// (reads never have anything to commit). Runs on its own spawned task.
    async fn read<T, F, Fut>(&self, f: F) -> Result<T, McpError>
    where
        T: Send + 'static,
        F: FnOnce(<MemoryBackend as crate::storage::StorageBackend>::Tx) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = (Result<T, Error>, <MemoryBackend as crate::storage::StorageBackend>::Tx)> + Send,
    {
        let client = self.client.clone();
        tokio::spawn(async move {
            let tx = client.begin_tx(TxMode::ReadOnly).await?;
            let (result, tx) = f(tx).await;
            let _ = client.rollback(tx).await;
            result
        })
        .await
        .map_err(|e| McpError::internal_error(format!("task join error: {e}"), None))?
        .map_err(to_mcp_error)
    }
}

#[tool_router]
impl MemoryGraphMcp {
    // ------------------------------------------------------------------
    // Memory tools
    // ------------------------------------------------------------------

    #[tool(name = "add_memory", description = "Create a new memory node with free-text content, optional type/tags/metadata, and optional outgoing relationships to existing nodes by id.")]
    async fn add_memory(&self, params: Parameters<AddMemoryParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let backend = self.client.backend().clone();
        let memory = self
            .write(|mut tx| async move {
                let r = memory_repo::add(&backend, &mut tx, NewMemory {
                    memory_type: p.memory_type,
                    content: p.content,
                    tags: p.tags,
                    metadata: p.metadata,
                    relationships: relationships(p.relationships),
                    ..Default::default()
                }).await;
                (r, tx)
            })
            .await?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&memory))]))
    }

    #[tool(name = "get_memory", description = "Fetch a memory by id together with its directly related entries, or null if it does not exist.")]
    async fn get_memory(&self, params: Parameters<GetMemoryParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let backend = self.client.backend().clone();
        let result = self
            .read(|tx| async move {
                let r = memory_repo::get_by_id_with_related(&backend, &tx, &p.id).await;
                (r, tx)
            })
            .await?;
        let body = result.map(|(memory, related)| serde_json::json!({ "memory": memory, "related": related }));
        Ok(CallToolResult::success(vec![Content::text(json_text(&body))]))
    }

    #[tool(name = "search_memories", description = "Lexical/trigram search over memory content and id, ranked by similarity score, each hit including its directly related memory ids. Default limit 10.")]
    async fn search_memories(&self, params: Parameters<SearchMemoriesParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let backend = self.client.backend().clone();
        let hits = self
            .read(|tx| async move {
                let r = memory_repo::search(&backend, &tx, &p.query, p.limit).await;
                (r, tx)
            })
            .await?;
        let results: Vec<_> = hits.into_iter()
            .map(|hit| serde_json::json!({ "memory": hit.memory, "score": hit.score, "related": hit.related_ids }))
            .collect();
        let body = serde_json::json!({ "count": results.len(), "results": results });
        Ok(CallToolResult::success(vec![Content::text(json_text(&body))]))
    }

    #[tool(name = "update_memory", description = "Partially update a memory (SET semantics: only supplied fields change) and/or add new outgoing relationships (idempotent).")]
    async fn update_memory(&self, params: Parameters<UpdateMemoryParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let backend = self.client.backend().clone();
        let memory = self
            .write(|mut tx| async move {
                let r = memory_repo::update(&backend, &mut tx, &p.id, MemoryPatch {
                    content: p.content,
                    tags: p.tags,
                    metadata: p.metadata,
                    relationships: relationships(p.relationships),
                }).await;
                (r, tx)
            })
            .await?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&memory))]))
    }

    #[tool(name = "delete_memory", description = "Detach-delete a memory by id. Deleting a missing id is a soft no-op returning `deleted: false`.")]
    async fn delete_memory(&self, params: Parameters<DeleteMemoryParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let id = p.id.clone();
        let backend = self.client.backend().clone();
        let deleted = self
            .write(|mut tx| async move {
                let r = memory_repo::delete(&backend, &mut tx, &p.id).await;
                (r, tx)
            })
            .await?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&serde_json::json!({ "deleted": deleted, "id": id })))]))
    }

    #[tool(name = "get_related", description = "Bounded-depth traversal from a memory over its typed edges, optionally filtered by relationship type and direction (outgoing/incoming/both, default both). Default depth 2.")]
    async fn get_related(&self, params: Parameters<GetRelatedParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let dir = direction(&p.direction)?;
        let backend = self.client.backend().clone();
        let related = self
            .read(|tx| async move {
                let r = memory_repo::get_related(&backend, &tx, &p.id, p.relationship_type.as_deref(), dir, p.depth).await;
                (r, tx)
            })
            .await?;
        let body = serde_json::json!({ "count": related.len(), "nodes": related });
        Ok(CallToolResult::success(vec![Content::text(json_text(&body))]))
    }

    // ------------------------------------------------------------------
    // Plan tools
    // ------------------------------------------------------------------

    #[tool(name = "create_plan", description = "Create a new plan with a name, optional description/status (draft/active/completed/archived, default active)/tags/metadata, and optional outgoing relationships.")]
    async fn create_plan(&self, params: Parameters<CreatePlanParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let status = parse_status(&p.status, PlanStatus::parse, "status")?;
        let backend = self.client.backend().clone();
        let plan = self
            .write(|mut tx| async move {
                let r = plan_repo::add(&backend, &mut tx, NewPlan {
                    name: p.name,
                    description: p.description,
                    status,
                    tags: p.tags,
                    metadata: p.metadata,
                    relationships: relationships(p.relationships),
                    ..Default::default()
                }).await;
                (r, tx)
            })
            .await?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&plan))]))
    }

    #[tool(name = "get_plan", description = "Fetch a plan by id together with its tasks ordered by position, each task annotated with its same-plan depends_on/blocks ids. Null if the plan does not exist.")]
    async fn get_plan(&self, params: Parameters<GetPlanParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let backend = self.client.backend().clone();
        let result = self
            .read(|tx| async move {
                let r = plan_repo::get_with_tasks(&backend, &tx, &p.id).await;
                (r, tx)
            })
            .await?;
        let body = result.map(|(plan, tasks)| serde_json::json!({ "plan": plan, "tasks": tasks }));
        Ok(CallToolResult::success(vec![Content::text(json_text(&body))]))
    }

    #[tool(name = "list_plans", description = "List plans, optionally filtered by exact status and/or any-of tags, ordered by most recently updated. Default limit 50.")]
    async fn list_plans(&self, params: Parameters<ListPlansParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let status = parse_status(&p.status, PlanStatus::parse, "status")?;
        let backend = self.client.backend().clone();
        let plans = self
            .read(|tx| async move {
                let tags = if p.tags.is_empty() { None } else { Some(p.tags.as_slice()) };
                let r = plan_repo::list(&backend, &tx, status, tags, p.limit).await;
                (r, tx)
            })
            .await?;
        let body = serde_json::json!({ "count": plans.len(), "plans": plans });
        Ok(CallToolResult::success(vec![Content::text(json_text(&body))]))
    }

    #[tool(name = "update_plan", description = "Partially update a plan (SET semantics) and/or add new outgoing relationships.")]
    async fn update_plan(&self, params: Parameters<UpdatePlanParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let status = parse_status(&p.status, PlanStatus::parse, "status")?;
        let backend = self.client.backend().clone();
        let plan = self
            .write(|mut tx| async move {
                let r = plan_repo::update(&backend, &mut tx, &p.id, PlanPatch {
                    name: p.name,
                    description: p.description,
                    status,
                    tags: p.tags,
                    metadata: p.metadata,
                    relationships: relationships(p.relationships),
                }).await;
                (r, tx)
            })
            .await?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&plan))]))
    }

    #[tool(name = "delete_plan", description = "Delete a plan, cascading to every task that would otherwise be orphaned (tasks that also belong to another plan are kept). Deleting a missing id is a soft no-op returning `deleted: false`.")]
    async fn delete_plan(&self, params: Parameters<DeletePlanParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let backend = self.client.backend().clone();
        let deleted_tasks = self
            .write(|mut tx| async move {
                let r = plan_repo::delete(&backend, &mut tx, &p.id).await;
                (r, tx)
            })
            .await?;
        let body = match deleted_tasks {
            Some(tasks_deleted) => serde_json::json!({ "deleted": true, "tasks_deleted": tasks_deleted }),
            None => serde_json::json!({ "deleted": false }),
        };
        Ok(CallToolResult::success(vec![Content::text(json_text(&body))]))
    }

    // ------------------------------------------------------------------
    // Task tools
    // ------------------------------------------------------------------

    #[tool(name = "create_task", description = "Create a task belonging to one or more existing plans (plan_ids must be non-empty and every id must resolve). Optional after_task_id/before_task_id place it at a fractional position within each plan; omitting both appends it.")]
    async fn create_task(&self, params: Parameters<CreateTaskParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let status = parse_status(&p.status, TaskStatus::parse, "status")?;
        let backend = self.client.backend().clone();
        let task = self
            .write(|mut tx| async move {
                let r = task_repo::add(&backend, &mut tx, NewTask {
                    content: p.content,
                    plan_ids: p.plan_ids,
                    status,
                    tags: p.tags,
                    metadata: p.metadata,
                    relationships: relationships(p.relationships),
                    after_task_id: p.after_task_id,
                    before_task_id: p.before_task_id,
                    ..Default::default()
                }).await;
                (r, tx)
            })
            .await?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&task))]))
    }

    #[tool(name = "get_task", description = "Fetch a task by id together with the ids of every plan it belongs to. Null if the task does not exist.")]
    async fn get_task(&self, params: Parameters<GetTaskParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let backend = self.client.backend().clone();
        let result = self
            .read(|tx| async move {
                let r = task_repo::get_with_plans(&backend, &tx, &p.id).await;
                (r, tx)
            })
            .await?;
        let body = result.map(|(task, plan_ids)| serde_json::json!({ "task": task, "plan_ids": plan_ids }));
        Ok(CallToolResult::success(vec![Content::text(json_text(&body))]))
    }

    #[tool(name = "list_tasks", description = "List tasks, optionally scoped to one plan (ordered by position) or across all plans (ordered by most recently updated), with optional exact status and any-of tags filters. Default limit 50.")]
    async fn list_tasks(&self, params: Parameters<ListTasksParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let status = parse_status(&p.status, TaskStatus::parse, "status")?;
        let backend = self.client.backend().clone();
        let rows = self
            .read(|tx| async move {
                let tags = if p.tags.is_empty() { None } else { Some(p.tags.as_slice()) };
                let r = task_repo::list(&backend, &tx, p.plan_id.as_deref(), status, tags, p.limit).await;
                (r, tx)
            })
            .await?;
        let tasks: Vec<_> = rows.into_iter()
            .map(|(task, position)| serde_json::json!({ "task": task, "position": position }))
            .collect();
        let body = serde_json::json!({ "count": tasks.len(), "tasks": tasks });
        Ok(CallToolResult::success(vec![Content::text(json_text(&body))]))
    }

    #[tool(name = "update_task", description = "Partially update a task (SET semantics), optionally link it into additional plans via add_plan_ids (append-only, never removes an existing link), and/or add new outgoing relationships.")]
    async fn update_task(&self, params: Parameters<UpdateTaskParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let status = parse_status(&p.status, TaskStatus::parse, "status")?;
        let backend = self.client.backend().clone();
        let task = self
            .write(|mut tx| async move {
                let r = task_repo::update(&backend, &mut tx, &p.id, TaskPatch {
                    content: p.content,
                    status,
                    tags: p.tags,
                    metadata: p.metadata,
                    add_plan_ids: p.add_plan_ids,
                    relationships: relationships(p.relationships),
                }).await;
                (r, tx)
            })
            .await?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&task))]))
    }

    #[tool(name = "delete_task", description = "Detach-delete a task by id. Deleting a missing id is a soft no-op returning `deleted: false`.")]
    async fn delete_task(&self, params: Parameters<DeleteTaskParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let id = p.id.clone();
        let backend = self.client.backend().clone();
        let deleted = self
            .write(|mut tx| async move {
                let r = task_repo::delete(&backend, &mut tx, &p.id).await;
                (r, tx)
            })
            .await?;
        Ok(CallToolResult::success(vec![Content::text(json_text(&serde_json::json!({ "deleted": deleted, "id": id })))]))
    }

    #[tool(name = "reorder_tasks", description = "Rewrite the fractional positions of the given task_ids (in the given order) within one plan, restoring INCREMENT-scale spacing. Optional before_task_id/after_task_id bound the new block between two existing tasks; otherwise the whole plan is renumbered from scratch.")]
    async fn reorder_tasks(&self, params: Parameters<ReorderTasksParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let backend = self.client.backend().clone();
        let written = self
            .write(|mut tx| async move {
                let r = reorder(&backend, &mut tx, &p).await;
                (r, tx)
            })
            .await?;
        let body: Vec<_> = written.into_iter()
            .map(|(id, position)| serde_json::json!({ "id": id, "position": position }))
            .collect();
        Ok(CallToolResult::success(vec![Content::text(json_text(&body))]))
    }
}

async fn reorder(
    backend: &MemoryBackend,
    tx: &mut <MemoryBackend as crate::storage::StorageBackend>::Tx,
    p: &ReorderTasksParams,
) -> Result<Vec<(String, f64)>, Error> {
    if p.task_ids.is_empty() {
        return Ok(Vec::new());
    }

    let after = resolve_bound_position(backend, tx, &p.plan_id, p.after_task_id.as_deref()).await?;
    let before = resolve_bound_position(backend, tx, &p.plan_id, p.before_task_id.as_deref()).await?;

    let positions = insert_positions(after.unwrap_or(0.0), before.unwrap_or(0.0), p.task_ids.len());
    let pairs: Vec<(String, f64)> = p.task_ids.iter().cloned().zip(positions).collect();

    task_repo::update_positions(backend, tx, &p.plan_id, &pairs).await
}

/// Resolves a task id's current position within `plan_id`, if it has one.
async fn resolve_bound_position(
    backend: &MemoryBackend,
    tx: &<MemoryBackend as crate::storage::StorageBackend>::Tx,
    plan_id: &str,
    task_id: Option<&str>,
) -> Result<Option<f64>, Error> {
    let Some(task_id) = task_id else { return Ok(None) };
    let rows = task_repo::list(backend, tx, Some(plan_id), None, None, None).await?;
    Ok(rows.into_iter().find(|(t, _)| t.id == task_id).and_then(|(_, pos)| pos))
}

impl ServerHandler for MemoryGraphMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Persistent associative-memory graph for AI coding agents. Tools: \
                 add_memory, get_memory, search_memories, update_memory, delete_memory, \
                 get_related, create_plan, get_plan, list_plans, update_plan, delete_plan, \
                 create_task, get_task, list_tasks, update_task, delete_task, reorder_tasks. \
                 Memories, plans, and tasks are graph nodes linked by typed relationships; \
                 use get_related/get_plan to traverse them."
                    .into(),
            ),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "assoc-memory-graph".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("Associative Memory Graph".into()),
                description: Some(
                    "Persistent associative-memory graph service exposed over MCP".into(),
                ),
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: Default::default(),
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let tool_context = ToolCallContext::new(self, request, context);
        async move { self.tool_router.call(tool_context).await }
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tool_router.get(name).cloned()
    }
}

/// Starts the MCP server on stdio. Runs until the client disconnects.
pub async fn serve_stdio(client: std::sync::Arc<GraphClient<MemoryBackend>>) -> Result<(), Box<dyn std::error::Error>> {
    let server = MemoryGraphMcp::new(client);
    let transport = rmcp::transport::io::stdio();
    let service = server.serve(transport).await.inspect_err(|e| {
        warn!(error = %e, "mcp serve error");
    })?;
    service.waiting().await?;
    Ok(())
}

/// Starts the MCP server on streamable HTTP at `addr`. Used behind `--http`.
pub async fn serve_http(
    client: std::sync::Arc<GraphClient<MemoryBackend>>,
    addr: std::net::SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    };

    let service = StreamableHttpService::new(
        move || Ok(MemoryGraphMcp::new(client.clone())),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    warn!(%addr, "mcp http transport listening");
    axum::serve(listener, router).await?;
    Ok(())
}
