// Things URL scheme builder: things:///<action>?<percent-encoded params>

use super::types::{AddProjectRequest, AddTodoRequest};

const SCHEME: &str = "things:///";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThingsUrl {
    action: &'static str,
    params: Vec<(&'static str, String)>,
}

impl ThingsUrl {
    pub fn new(action: &'static str) -> Self {
        Self {
            action,
            params: Vec::new(),
        }
    }

    /// Empty values are skipped.
    pub fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.params.push((key, value));
        }
        self
    }

    pub fn param_opt(self, key: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    pub fn build(&self) -> String {
        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        if query.is_empty() {
            format!("{}{}", SCHEME, self.action)
        } else {
            format!("{}{}?{}", SCHEME, self.action, query)
        }
    }
}

pub fn add_todo_url(request: &AddTodoRequest) -> String {
    ThingsUrl::new("add")
        .param("title", request.title.as_str())
        .param_opt("notes", request.notes.as_deref())
        .param("tags", request.tags.join(","))
        .param_opt("when", request.when.map(|w| w.as_url_value()).as_deref())
        .param_opt(
            "deadline",
            request
                .deadline
                .map(|d| d.format("%Y-%m-%d").to_string())
                .as_deref(),
        )
        .param_opt("list-id", request.list_id.as_deref())
        .param_opt("list", request.list_title.as_deref())
        .param_opt("heading", request.heading.as_deref())
        .param("checklist-items", request.checklist_items.join("\n"))
        .build()
}

pub fn add_project_url(request: &AddProjectRequest) -> String {
    ThingsUrl::new("add-project")
        .param("title", request.title.as_str())
        .param_opt("notes", request.notes.as_deref())
        .param("tags", request.tags.join(","))
        .param_opt("area-id", request.area_id.as_deref())
        .param_opt("area", request.area_title.as_deref())
        .param_opt("when", request.when.map(|w| w.as_url_value()).as_deref())
        .param_opt(
            "deadline",
            request
                .deadline
                .map(|d| d.format("%Y-%m-%d").to_string())
                .as_deref(),
        )
        .param("to-dos", request.todos.join("\n"))
        .build()
}

/// `target` is an item id or a built-in list name.
pub fn show_url(target: &str) -> String {
    ThingsUrl::new("show").param("id", target).build()
}
