use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::location::{self, ListProbe};
use super::scripts::{ItemKind, Scripts, NOT_FOUND};
use super::types::{
    AddProjectRequest, AddTodoRequest, Area, BuiltinList, Location, Project, Tag, Todo,
    UpdateRequest,
};
use super::url_scheme;
use crate::cache::{InvalidationScope, ResultCache};
use crate::config::{Config, TagCreationPolicy};
use crate::connectors::apple_common::parse::{parse_record_list, Record};
use crate::connectors::apple_common::AppleScriptExecutor;
use crate::error::{ErrorCode, ThingsError};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;

pub fn validate_limit(limit: usize) -> Result<usize, ThingsError> {
    if (1..=MAX_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(ThingsError::validation(
            ErrorCode::InvalidLimit,
            format!("limit must be between 1 and {}, got {}", MAX_LIMIT, limit),
        ))
    }
}

/// Tags after the creation policy has been applied.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TagResolution {
    pub tags: Vec<String>,
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedItem {
    pub title: String,
    pub url: String,
    /// Looked up after the URL is dispatched; `None` if Things has not
    /// surfaced the new item yet.
    pub id: Option<String>,
    pub tags_created: Vec<String>,
    pub tags_skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub id: String,
    pub updated_fields: Vec<&'static str>,
    pub tags_created: Vec<String>,
    pub tags_skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagCreation {
    pub name: String,
    pub id: Option<String>,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub things_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub app_name: String,
    pub mock_mode: bool,
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub cache_entries: usize,
    pub cache_ttl_secs: u64,
    pub tag_creation_policy: TagCreationPolicy,
    pub max_concurrent_operations: usize,
}

/// The operation surface over Things: renders scripts and URLs, runs them
/// through the shared executor, caches reads and parses results.
///
/// Clones share the executor lock and the cache.
#[derive(Clone)]
pub struct ThingsService {
    executor: AppleScriptExecutor,
    cache: ResultCache,
    scripts: Scripts,
    app_name: String,
    cache_ttl: Duration,
    tag_policy: TagCreationPolicy,
    max_concurrent: usize,
    mock_mode: bool,
}

impl ThingsService {
    pub fn new(executor: AppleScriptExecutor, cache: ResultCache, config: &Config) -> Self {
        Self {
            executor,
            cache,
            scripts: Scripts::new(&config.things_app_name),
            app_name: config.things_app_name.clone(),
            cache_ttl: config.cache_ttl(),
            tag_policy: config.tag_creation_policy,
            max_concurrent: config.max_concurrent_operations.max(1),
            mock_mode: config.mock_mode,
        }
    }

    pub fn executor(&self) -> &AppleScriptExecutor {
        &self.executor
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub(crate) async fn run_script(&self, script: &str) -> Result<String, ThingsError> {
        self.executor.execute(script).await.into_output()
    }

    /// Serve from the cache or run and store. Only successes are stored.
    async fn cached_output(&self, key: &str, script: &str) -> Result<String, ThingsError> {
        if let Some(hit) = self.cache.get(key).await {
            debug!(target: "things::service", key, "cache hit");
            return Ok(hit.output_text().to_string());
        }
        let result = self.executor.execute(script).await;
        if result.success {
            self.cache.set(key, result.clone(), self.cache_ttl).await;
        }
        result.into_output()
    }

    /// Unparseable output is logged and read as empty.
    fn records(&self, context: &str, text: &str) -> Vec<Record> {
        match parse_record_list(text) {
            Ok(records) => records,
            Err(e) => {
                let e = ThingsError::from(e);
                warn!(
                    target: "things::service",
                    context,
                    code = %e.code(),
                    kind = ?e.kind(),
                    error = %e,
                    "could not parse AppleScript output"
                );
                Vec::new()
            }
        }
    }

    fn collect<T>(&self, context: &str, text: &str, build: fn(&Record) -> Option<T>) -> Vec<T> {
        self.records(context, text).iter().filter_map(build).collect()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_todos(&self, project_id: Option<&str>) -> Result<Vec<Todo>, ThingsError> {
        let project_id = project_id.map(str::trim).filter(|id| !id.is_empty());
        let key = format!("todos_{}", project_id.unwrap_or("all"));
        let output = self
            .cached_output(&key, &self.scripts.list_todos(project_id))
            .await?;
        if output.trim() == NOT_FOUND {
            return Err(ThingsError::project_not_found(project_id.unwrap_or_default()));
        }
        Ok(self.collect("get_todos", &output, Todo::from_record))
    }

    /// Always fresh; moves and updates depend on current state.
    pub async fn get_todo(&self, id: &str) -> Result<Todo, ThingsError> {
        let id = require_id(id, "id")?;
        let output = self.run_script(&self.scripts.get_todo(id)).await?;
        if output.trim() == NOT_FOUND {
            return Err(ThingsError::todo_not_found(id));
        }
        self.records("get_todo", &output)
            .first()
            .and_then(Todo::from_record)
            .ok_or_else(|| ThingsError::todo_not_found(id))
    }

    pub async fn get_list(&self, list: BuiltinList, limit: usize) -> Result<Vec<Todo>, ThingsError> {
        let limit = validate_limit(limit)?;
        let key = format!("list_{}_{}", list, limit);
        let output = self
            .cached_output(&key, &self.scripts.list_builtin(list, limit))
            .await?;
        Ok(self.collect("get_list", &output, Todo::from_record))
    }

    pub async fn search_todos(&self, query: &str, limit: usize) -> Result<Vec<Todo>, ThingsError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ThingsError::validation(
                ErrorCode::InvalidParameter,
                "query must not be empty",
            ));
        }
        let limit = validate_limit(limit)?;
        let key = format!("search_{}_{}", query.to_lowercase(), limit);
        let output = self
            .cached_output(&key, &self.scripts.search_todos(query, limit))
            .await?;
        Ok(self.collect("search_todos", &output, Todo::from_record))
    }

    pub async fn get_tagged(&self, tag: &str, limit: usize) -> Result<Vec<Todo>, ThingsError> {
        let tag = require_id(tag, "tag")?;
        let limit = validate_limit(limit)?;
        let key = format!("tagged_{}_{}", tag, limit);
        let output = self
            .cached_output(&key, &self.scripts.tagged_todos(tag, limit))
            .await?;
        Ok(self.collect("get_tagged", &output, Todo::from_record))
    }

    pub async fn get_projects(&self, area_id: Option<&str>) -> Result<Vec<Project>, ThingsError> {
        let area_id = area_id.map(str::trim).filter(|id| !id.is_empty());
        let key = format!("projects_{}", area_id.unwrap_or("all"));
        let output = self
            .cached_output(&key, &self.scripts.list_projects(area_id))
            .await?;
        if output.trim() == NOT_FOUND {
            return Err(ThingsError::area_not_found(area_id.unwrap_or_default()));
        }
        Ok(self.collect("get_projects", &output, Project::from_record))
    }

    pub async fn get_areas(&self) -> Result<Vec<Area>, ThingsError> {
        let output = self
            .cached_output("areas_all", &self.scripts.list_areas())
            .await?;
        Ok(self.collect("get_areas", &output, Area::from_record))
    }

    pub async fn get_tags(&self) -> Result<Vec<Tag>, ThingsError> {
        let output = self
            .cached_output("tags_all", &self.scripts.list_tags())
            .await?;
        Ok(self.collect("get_tags", &output, Tag::from_record))
    }

    /// `class` is `project` or `area`.
    pub async fn exists(&self, class: &str, id: &str) -> Result<bool, ThingsError> {
        let output = self.run_script(&self.scripts.exists(class, id)).await?;
        Ok(output.trim() == "true")
    }

    pub async fn todo_location(&self, id: &str) -> Result<Location, ThingsError> {
        let todo = self.get_todo(id).await?;
        Ok(location::classify(&todo, today(), self).await)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Apply the tag creation policy to `requested`.
    pub async fn resolve_tags(&self, requested: &[String]) -> Result<TagResolution, ThingsError> {
        let mut requested_clean: Vec<String> = Vec::new();
        for tag in requested.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !requested_clean.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                requested_clean.push(tag.to_string());
            }
        }
        if requested_clean.is_empty() {
            return Ok(TagResolution::default());
        }

        let existing = self.get_tags().await?;
        let mut resolution = TagResolution::default();
        let applied = self
            .apply_tag_policy(requested_clean, &existing, &mut resolution)
            .await;
        // Tags created before a later failure exist in Things all the same.
        if !resolution.created.is_empty() {
            self.cache.invalidate(InvalidationScope::Tags).await;
        }
        applied?;
        Ok(resolution)
    }

    async fn apply_tag_policy(
        &self,
        requested: Vec<String>,
        existing: &[Tag],
        resolution: &mut TagResolution,
    ) -> Result<(), ThingsError> {
        for tag in requested {
            let known = existing.iter().any(|t| t.title.eq_ignore_ascii_case(&tag));
            if known {
                resolution.tags.push(tag);
                continue;
            }
            match self.tag_policy {
                TagCreationPolicy::Create => {
                    self.run_script(&self.scripts.create_tag(&tag)).await?;
                    info!(target: "things::service", tag = %tag, "created tag");
                    resolution.created.push(tag.clone());
                    resolution.tags.push(tag);
                }
                TagCreationPolicy::Skip => {
                    debug!(target: "things::service", tag = %tag, "skipping unknown tag");
                    resolution.skipped.push(tag);
                }
                TagCreationPolicy::Fail => {
                    return Err(ThingsError::validation(
                        ErrorCode::TagNotFound,
                        format!("Tag '{}' does not exist", tag),
                    ));
                }
            }
        }
        Ok(())
    }

    pub async fn add_todo(&self, mut request: AddTodoRequest) -> Result<CreatedItem, ThingsError> {
        request.title = require_title(&request.title)?;
        let tags = self.resolve_tags(&request.tags).await?;
        request.tags = tags.tags.clone();

        let url = url_scheme::add_todo_url(&request);
        self.executor.open_url(&url).await.into_output()?;
        self.cache.invalidate(InvalidationScope::Todos).await;

        let id = self.find_newest(ItemKind::Todo, &request.title).await;
        info!(target: "things::service", title = %request.title, id = ?id, "added todo");
        Ok(CreatedItem {
            title: request.title,
            url,
            id,
            tags_created: tags.created,
            tags_skipped: tags.skipped,
        })
    }

    pub async fn add_project(
        &self,
        mut request: AddProjectRequest,
    ) -> Result<CreatedItem, ThingsError> {
        request.title = require_title(&request.title)?;
        let tags = self.resolve_tags(&request.tags).await?;
        request.tags = tags.tags.clone();

        let url = url_scheme::add_project_url(&request);
        self.executor.open_url(&url).await.into_output()?;
        self.cache.invalidate(InvalidationScope::Projects).await;

        let id = self.find_newest(ItemKind::Project, &request.title).await;
        info!(target: "things::service", title = %request.title, id = ?id, "added project");
        Ok(CreatedItem {
            title: request.title,
            url,
            id,
            tags_created: tags.created,
            tags_skipped: tags.skipped,
        })
    }

    async fn find_newest(&self, kind: ItemKind, title: &str) -> Option<String> {
        match self
            .run_script(&self.scripts.find_newest_by_title(kind, title))
            .await
        {
            Ok(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                debug!(target: "things::service", title, error = %e, "id lookup failed");
                None
            }
        }
    }

    pub async fn update_todo(&self, request: UpdateRequest) -> Result<UpdateOutcome, ThingsError> {
        self.update(ItemKind::Todo, request).await
    }

    pub async fn update_project(
        &self,
        request: UpdateRequest,
    ) -> Result<UpdateOutcome, ThingsError> {
        self.update(ItemKind::Project, request).await
    }

    async fn update(
        &self,
        kind: ItemKind,
        mut request: UpdateRequest,
    ) -> Result<UpdateOutcome, ThingsError> {
        request.id = require_id(&request.id, "id")?.to_string();
        if !request.has_changes() {
            return Err(ThingsError::validation(
                ErrorCode::InvalidParameter,
                "Nothing to update: pass at least one field",
            ));
        }
        if let Some(title) = &request.title {
            request.title = Some(require_title(title)?);
        }
        if request.completed == Some(true) && request.canceled == Some(true) {
            return Err(ThingsError::validation(
                ErrorCode::InvalidParameter,
                "completed and canceled are mutually exclusive",
            ));
        }

        let mut tags = TagResolution::default();
        if let Some(requested) = request.tags.take() {
            tags = self.resolve_tags(&requested).await?;
            request.tags = Some(tags.tags.clone());
        }

        let output = self.run_script(&self.scripts.update(kind, &request)).await?;
        if output.trim() == NOT_FOUND {
            return Err(match kind {
                ItemKind::Todo => ThingsError::todo_not_found(&request.id),
                ItemKind::Project => ThingsError::project_not_found(&request.id),
            });
        }

        let scope = match kind {
            ItemKind::Todo => InvalidationScope::Todos,
            ItemKind::Project => InvalidationScope::Projects,
        };
        self.cache.invalidate(scope).await;
        info!(target: "things::service", id = %request.id, ?kind, "updated");

        Ok(UpdateOutcome {
            updated_fields: changed_fields(&request),
            id: request.id,
            tags_created: tags.created,
            tags_skipped: tags.skipped,
        })
    }

    pub async fn delete_todo(&self, id: &str) -> Result<(), ThingsError> {
        let id = require_id(id, "id")?;
        let output = self
            .run_script(&self.scripts.delete(ItemKind::Todo, id))
            .await?;
        if output.trim() == NOT_FOUND {
            return Err(ThingsError::todo_not_found(id));
        }
        self.cache.invalidate(InvalidationScope::Todos).await;
        info!(target: "things::service", id, "deleted todo");
        Ok(())
    }

    /// Creates `name` unless a tag with that name already exists.
    pub async fn create_tag(&self, name: &str) -> Result<TagCreation, ThingsError> {
        let name = require_title(name)?;
        let existing = self.get_tags().await?;
        if let Some(tag) = existing.iter().find(|t| t.title.eq_ignore_ascii_case(&name)) {
            return Ok(TagCreation {
                name: tag.title.clone(),
                id: Some(tag.id.clone()),
                created: false,
            });
        }

        let id = self.run_script(&self.scripts.create_tag(&name)).await?;
        self.cache.invalidate(InvalidationScope::Tags).await;
        info!(target: "things::service", tag = %name, "created tag");
        Ok(TagCreation {
            name,
            id: Some(id.trim().to_string()).filter(|id| !id.is_empty()),
            created: true,
        })
    }

    /// Opens an item or built-in list in the Things UI.
    pub async fn show(&self, target: &str) -> Result<String, ThingsError> {
        let target = require_id(target, "id")?;
        let url = url_scheme::show_url(target);
        self.executor.open_url(&url).await.into_output()?;
        Ok(url)
    }

    pub async fn health(&self) -> HealthReport {
        let (things_running, error) = match self.executor.is_app_running(&self.app_name).await {
            Ok(running) => (running, None),
            Err(e) => (false, Some(e.to_string())),
        };
        HealthReport {
            things_running,
            error,
            app_name: self.app_name.clone(),
            mock_mode: self.mock_mode,
            timeout_secs: self.executor.timeout().as_secs(),
            retry_count: self.executor.retry_count(),
            cache_entries: self.cache.len().await,
            cache_ttl_secs: self.cache_ttl.as_secs(),
            tag_creation_policy: self.tag_policy,
            max_concurrent_operations: self.max_concurrent,
        }
    }
}

#[async_trait]
impl ListProbe for ThingsService {
    async fn contains(&self, list: BuiltinList, todo_id: &str) -> Result<bool, ThingsError> {
        let output = self
            .run_script(&self.scripts.todo_in_list(todo_id, list))
            .await?;
        Ok(output.trim() == "true")
    }
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn require_id<'a>(value: &'a str, field: &str) -> Result<&'a str, ThingsError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ThingsError::validation(
            ErrorCode::InvalidParameter,
            format!("'{}' must not be empty", field),
        ))
    } else {
        Ok(trimmed)
    }
}

fn require_title(title: &str) -> Result<String, ThingsError> {
    require_id(title, "title").map(str::to_string)
}

fn changed_fields(request: &UpdateRequest) -> Vec<&'static str> {
    [
        ("title", request.title.is_some()),
        ("notes", request.notes.is_some()),
        ("tags", request.tags.is_some()),
        ("when", request.when.is_some()),
        ("deadline", request.deadline.is_some()),
        ("completed", request.completed.is_some()),
        ("canceled", request.canceled.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect()
}
