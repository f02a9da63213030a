// Things 3 connector: tool surface over ThingsService.
// Reads and in-place edits go through AppleScript; creation and "show"
// go through the things:/// URL scheme.

pub mod location;
mod moves;
pub mod scripts;
mod service;
pub mod types;
pub mod url_scheme;

pub use moves::{BulkMoveReport, MoveFailure, MoveOutcome};
pub use service::{
    validate_limit, CreatedItem, HealthReport, TagCreation, TagResolution, ThingsService,
    UpdateOutcome, DEFAULT_LIMIT, MAX_LIMIT,
};

use async_trait::async_trait;
use rmcp::model::*;
use serde_json::{json, Value as JsonValue};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

use crate::connectors::apple_common::apple_connector_capabilities;
use crate::error::ThingsError;
use crate::utils::{
    error_result, flag, item_list, limit, line_list, optional_str, optional_text, optional_usize,
    required_str, string_list, structured_result_with_text, Args,
};
use types::{AddProjectRequest, AddTodoRequest, BuiltinList, UpdateRequest, When};

#[derive(Clone)]
pub struct ThingsConnector {
    service: ThingsService,
}

impl ThingsConnector {
    pub fn new(service: ThingsService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ThingsService {
        &self.service
    }

    async fn dispatch(&self, name: &str, args: &Args) -> Result<CallToolResult, ThingsError> {
        let service = &self.service;
        match name {
            // ---- reads
            "get_todos" => {
                let project_id = optional_str(args, "project_id");
                let todos = service.get_todos(project_id).await?;
                structured_result_with_text(&json!({
                    "project_id": project_id,
                    "count": todos.len(),
                    "todos": todos,
                }))
            }
            "get_todo" => {
                let todo = service.get_todo(required_str(args, "id")?).await?;
                structured_result_with_text(&json!({ "todo": todo }))
            }
            "get_list" => {
                let list = builtin_list(required_str(args, "list")?)?;
                let todos = service.get_list(list, limit(args)?).await?;
                structured_result_with_text(&json!({
                    "list": list,
                    "count": todos.len(),
                    "todos": todos,
                }))
            }
            "search_todos" => {
                let query = required_str(args, "query")?;
                let todos = service.search_todos(query, limit(args)?).await?;
                structured_result_with_text(&json!({
                    "query": query,
                    "count": todos.len(),
                    "todos": todos,
                }))
            }
            "get_tagged_items" => {
                let tag = required_str(args, "tag")?;
                let todos = service.get_tagged(tag, limit(args)?).await?;
                structured_result_with_text(&json!({
                    "tag": tag,
                    "count": todos.len(),
                    "todos": todos,
                }))
            }
            "get_projects" => {
                let projects = service.get_projects(optional_str(args, "area_id")).await?;
                structured_result_with_text(&json!({
                    "count": projects.len(),
                    "projects": projects,
                }))
            }
            "get_areas" => {
                let areas = service.get_areas().await?;
                structured_result_with_text(&json!({ "count": areas.len(), "areas": areas }))
            }
            "get_tags" => {
                let tags = service.get_tags().await?;
                structured_result_with_text(&json!({ "count": tags.len(), "tags": tags }))
            }
            "get_todo_location" => {
                let id = required_str(args, "id")?;
                let location = service.todo_location(id).await?;
                structured_result_with_text(&json!({
                    "id": id,
                    "location": location.to_string(),
                    "details": location,
                }))
            }

            // ---- writes
            "add_todo" => {
                let created = service.add_todo(add_todo_request(args)?).await?;
                structured_result_with_text(&created)
            }
            "add_project" => {
                let created = service.add_project(add_project_request(args)?).await?;
                structured_result_with_text(&created)
            }
            "update_todo" => {
                let outcome = service.update_todo(update_request(args)?).await?;
                structured_result_with_text(&outcome)
            }
            "update_project" => {
                let outcome = service.update_project(update_request(args)?).await?;
                structured_result_with_text(&outcome)
            }
            "delete_todo" => {
                let id = required_str(args, "id")?;
                service.delete_todo(id).await?;
                structured_result_with_text(&json!({
                    "id": id,
                    "message": "Todo moved to Trash",
                }))
            }
            "create_tag" => {
                let tag = service.create_tag(required_str(args, "name")?).await?;
                structured_result_with_text(&tag)
            }

            // ---- moves
            "move_record" => {
                let outcome = service
                    .move_todo(
                        required_str(args, "todo_id")?,
                        required_str(args, "destination")?,
                        flag(args, "preserve_scheduling")?.unwrap_or(true),
                    )
                    .await?;
                structured_result_with_text(&outcome)
            }
            "bulk_move" => {
                let ids = item_list(args, "todo_ids").unwrap_or_default();
                let report = service
                    .bulk_move(
                        &ids,
                        required_str(args, "destination")?,
                        flag(args, "preserve_scheduling")?.unwrap_or(true),
                        optional_usize(args, "max_concurrent")?,
                    )
                    .await?;
                structured_result_with_text(&report)
            }

            // ---- misc
            "show_item" => {
                let url = service.show(required_str(args, "id")?).await?;
                structured_result_with_text(&json!({ "url": url }))
            }
            "health_check" => {
                let report = service.health().await;
                structured_result_with_text(&report)
            }
            _ => Err(ThingsError::ToolNotFound),
        }
    }
}

fn builtin_list(name: &str) -> Result<BuiltinList, ThingsError> {
    BuiltinList::from_name(name).ok_or_else(|| {
        ThingsError::validation(
            crate::error::ErrorCode::InvalidParameter,
            format!(
                "Unknown list '{}': expected one of inbox, today, upcoming, anytime, someday, logbook, trash",
                name
            ),
        )
    })
}

fn when_arg(args: &Args) -> Result<Option<When>, ThingsError> {
    optional_str(args, "when").map(When::parse).transpose()
}

fn deadline_arg(args: &Args) -> Result<Option<chrono::NaiveDate>, ThingsError> {
    optional_str(args, "deadline")
        .map(|d| types::parse_iso_date("deadline", d))
        .transpose()
}

fn add_todo_request(args: &Args) -> Result<AddTodoRequest, ThingsError> {
    Ok(AddTodoRequest {
        title: required_str(args, "title")?.to_string(),
        notes: optional_str(args, "notes").map(str::to_string),
        tags: string_list(args, "tags").unwrap_or_default(),
        when: when_arg(args)?,
        deadline: deadline_arg(args)?,
        list_id: optional_str(args, "list_id").map(str::to_string),
        list_title: optional_str(args, "list_title").map(str::to_string),
        heading: optional_str(args, "heading").map(str::to_string),
        checklist_items: line_list(args, "checklist_items"),
    })
}

fn add_project_request(args: &Args) -> Result<AddProjectRequest, ThingsError> {
    Ok(AddProjectRequest {
        title: required_str(args, "title")?.to_string(),
        notes: optional_str(args, "notes").map(str::to_string),
        tags: string_list(args, "tags").unwrap_or_default(),
        area_id: optional_str(args, "area_id").map(str::to_string),
        area_title: optional_str(args, "area_title").map(str::to_string),
        when: when_arg(args)?,
        deadline: deadline_arg(args)?,
        todos: line_list(args, "todos"),
    })
}

fn update_request(args: &Args) -> Result<UpdateRequest, ThingsError> {
    Ok(UpdateRequest {
        id: required_str(args, "id")?.to_string(),
        title: optional_str(args, "title").map(str::to_string),
        notes: optional_text(args, "notes"),
        tags: string_list(args, "tags"),
        when: when_arg(args)?,
        deadline: deadline_arg(args)?,
        completed: flag(args, "completed")?,
        canceled: flag(args, "canceled")?,
    })
}

fn tool(name: &'static str, title: &str, description: &'static str, schema: JsonValue) -> Tool {
    Tool {
        name: Cow::Borrowed(name),
        title: Some(title.to_string()),
        description: Some(Cow::Borrowed(description)),
        input_schema: Arc::new(schema.as_object().cloned().unwrap_or_default()),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

fn no_args() -> JsonValue {
    json!({"type": "object", "properties": {}})
}

fn update_schema(entity: &str) -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "id": {"type": "string", "description": format!("ID of the {} to update. Required.", entity)},
            "title": {"type": "string", "description": "New title."},
            "notes": {"type": "string", "description": "New notes. Pass an empty string to clear."},
            "tags": {"type": "array", "items": {"type": "string"}, "description": "Replaces all tags. Array or comma-separated string."},
            "when": {"type": "string", "description": "today, tomorrow, evening, anytime, someday or YYYY-MM-DD."},
            "deadline": {"type": "string", "description": "Deadline as YYYY-MM-DD."},
            "completed": {"type": "boolean", "description": "Mark completed (true) or reopen (false)."},
            "canceled": {"type": "boolean", "description": "Mark canceled (true) or reopen (false)."}
        },
        "required": ["id"]
    })
}

fn limit_schema() -> JsonValue {
    json!({"type": "integer", "minimum": 1, "maximum": 500, "description": "Maximum results (default 50)."})
}

#[async_trait]
impl crate::Connector for ThingsConnector {
    fn name(&self) -> &'static str {
        "things"
    }

    fn description(&self) -> &'static str {
        "Things 3 task manager for macOS. Read, create, update and move todos and projects, browse areas and tags."
    }

    async fn capabilities(&self) -> ServerCapabilities {
        apple_connector_capabilities()
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
    ) -> Result<InitializeResult, ThingsError> {
        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.capabilities().await,
            server_info: Implementation {
                name: "things-mcp".to_string(),
                title: Some("Things 3".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Things 3 integration over AppleScript. Destinations for moves are a list name (inbox, today, upcoming, anytime, someday, logbook, trash), 'project:<id>' or 'area:<id>'. First use may trigger an Automation permission prompt."
                    .to_string(),
            ),
        })
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ThingsError> {
        let tools = vec![
            // Reads
            tool(
                "get_todos",
                "Get Todos",
                "Open todos, optionally limited to one project.",
                json!({
                    "type": "object",
                    "properties": {
                        "project_id": {"type": "string", "description": "Only todos in this project."}
                    }
                }),
            ),
            tool(
                "get_todo",
                "Get Todo",
                "One todo by ID.",
                json!({
                    "type": "object",
                    "properties": {"id": {"type": "string", "description": "Todo ID. Required."}},
                    "required": ["id"]
                }),
            ),
            tool(
                "get_list",
                "Get List",
                "Todos in a built-in list: inbox, today, upcoming, anytime, someday, logbook or trash.",
                json!({
                    "type": "object",
                    "properties": {
                        "list": {"type": "string", "enum": ["inbox", "today", "upcoming", "anytime", "someday", "logbook", "trash"]},
                        "limit": limit_schema()
                    },
                    "required": ["list"]
                }),
            ),
            tool(
                "search_todos",
                "Search Todos",
                "Todos whose title or notes contain the query.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Text to search for. Required."},
                        "limit": limit_schema()
                    },
                    "required": ["query"]
                }),
            ),
            tool(
                "get_tagged_items",
                "Get Tagged Items",
                "Todos carrying a tag.",
                json!({
                    "type": "object",
                    "properties": {
                        "tag": {"type": "string", "description": "Tag name. Required."},
                        "limit": limit_schema()
                    },
                    "required": ["tag"]
                }),
            ),
            tool(
                "get_projects",
                "Get Projects",
                "Projects, optionally limited to one area.",
                json!({
                    "type": "object",
                    "properties": {"area_id": {"type": "string", "description": "Only projects in this area."}}
                }),
            ),
            tool("get_areas", "Get Areas", "All areas.", no_args()),
            tool("get_tags", "Get Tags", "All tags with parent and shortcut.", no_args()),
            tool(
                "get_todo_location",
                "Get Todo Location",
                "Which list, project or area a todo currently sits in.",
                json!({
                    "type": "object",
                    "properties": {"id": {"type": "string", "description": "Todo ID. Required."}},
                    "required": ["id"]
                }),
            ),
            // Writes
            tool(
                "add_todo",
                "Add Todo",
                "Create a todo. Unknown tags follow the server's tag creation policy. Returns the new ID when Things reports it.",
                json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string", "description": "Title. Required."},
                        "notes": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string"}, "description": "Array or comma-separated string."},
                        "when": {"type": "string", "description": "today, tomorrow, evening, anytime, someday or YYYY-MM-DD."},
                        "deadline": {"type": "string", "description": "YYYY-MM-DD."},
                        "list_id": {"type": "string", "description": "Project or area ID to file the todo under."},
                        "list_title": {"type": "string", "description": "Project or area title, used when list_id is not given."},
                        "heading": {"type": "string", "description": "Heading inside the target project."},
                        "checklist_items": {"type": "array", "items": {"type": "string"}, "description": "Checklist items, array or newline-separated."}
                    },
                    "required": ["title"]
                }),
            ),
            tool(
                "update_todo",
                "Update Todo",
                "Change fields of an existing todo. Only given fields are touched.",
                update_schema("todo"),
            ),
            tool(
                "delete_todo",
                "Delete Todo",
                "Move a todo to the Trash.",
                json!({
                    "type": "object",
                    "properties": {"id": {"type": "string", "description": "Todo ID. Required."}},
                    "required": ["id"]
                }),
            ),
            tool(
                "add_project",
                "Add Project",
                "Create a project, optionally in an area and with initial todos.",
                json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string", "description": "Title. Required."},
                        "notes": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string"}},
                        "area_id": {"type": "string"},
                        "area_title": {"type": "string", "description": "Area title, used when area_id is not given."},
                        "when": {"type": "string"},
                        "deadline": {"type": "string", "description": "YYYY-MM-DD."},
                        "todos": {"type": "array", "items": {"type": "string"}, "description": "Titles of todos to create inside the project."}
                    },
                    "required": ["title"]
                }),
            ),
            tool(
                "update_project",
                "Update Project",
                "Change fields of an existing project. Only given fields are touched.",
                update_schema("project"),
            ),
            tool(
                "create_tag",
                "Create Tag",
                "Create a tag unless one with the same name exists.",
                json!({
                    "type": "object",
                    "properties": {"name": {"type": "string", "description": "Tag name. Required."}},
                    "required": ["name"]
                }),
            ),
            // Moves
            tool(
                "move_record",
                "Move Todo",
                "Move a todo to a built-in list, 'project:<id>' or 'area:<id>'. Logbook completes it, Trash deletes it.",
                json!({
                    "type": "object",
                    "properties": {
                        "todo_id": {"type": "string", "description": "Todo ID. Required."},
                        "destination": {"type": "string", "description": "inbox, today, upcoming, anytime, someday, logbook, trash, project:<id> or area:<id>. Required."},
                        "preserve_scheduling": {"type": "boolean", "description": "Keep the current scheduled date (default true). When false, moving to Today schedules for today."}
                    },
                    "required": ["todo_id", "destination"]
                }),
            ),
            tool(
                "bulk_move",
                "Bulk Move Todos",
                "Move several todos to one destination. Failures are reported per todo and do not stop the batch.",
                json!({
                    "type": "object",
                    "properties": {
                        "todo_ids": {"type": "array", "items": {"type": "string"}, "description": "Todo IDs, array or comma-separated. Required."},
                        "destination": {"type": "string", "description": "Same format as move_record. Required."},
                        "preserve_scheduling": {"type": "boolean"},
                        "max_concurrent": {"type": "integer", "minimum": 1, "description": "Concurrency limit (defaults to the server setting)."}
                    },
                    "required": ["todo_ids", "destination"]
                }),
            ),
            // Misc
            tool(
                "show_item",
                "Show in Things",
                "Open a todo, project, area or built-in list in the Things window.",
                json!({
                    "type": "object",
                    "properties": {"id": {"type": "string", "description": "Item ID or list name. Required."}},
                    "required": ["id"]
                }),
            ),
            tool(
                "health_check",
                "Health Check",
                "Whether Things is running, plus the effective server settings.",
                no_args(),
            ),
        ];

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    /// Domain failures come back as `{success:false, error, message}` tool
    /// results; only an unknown tool name is an `Err`.
    async fn call_tool(&self, request: CallToolRequestParam) -> Result<CallToolResult, ThingsError> {
        let name = request.name.as_ref();
        let args = request.arguments.unwrap_or_default();

        match self.dispatch(name, &args).await {
            Ok(result) => Ok(result),
            Err(ThingsError::ToolNotFound) => Err(ThingsError::ToolNotFound),
            Err(e) => {
                debug!(
                    target: "things::mcp",
                    tool = name,
                    code = %e.code(),
                    kind = ?e.kind(),
                    error = %e,
                    "tool failed"
                );
                Ok(error_result(&e))
            }
        }
    }
}
