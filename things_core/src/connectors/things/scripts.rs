// AppleScript generators for Things 3.
//
// Every entity-returning script emits the wire format read by
// `apple_common::parse`: records joined by ASCII 30, `KEY:value` fields
// joined by ASCII 31, dates as ISO strings.

use chrono::{Datelike, NaiveDate};

use super::types::{BuiltinList, Location, UpdateRequest, When};
use crate::connectors::apple_common::escape_applescript_string;

/// Returned by scripts when the addressed item does not exist.
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const OK: &str = "OK";

const HANDLERS: &str = r#"
on pad(n)
	return text -2 thru -1 of ("0" & (n as integer as text))
end pad

on isoDate(d)
	if d is missing value then return ""
	return ((year of d) as integer as text) & "-" & my pad(month of d as integer) & "-" & my pad(day of d)
end isoDate

on isoDateTime(d)
	if d is missing value then return ""
	return my isoDate(d) & "T" & my pad(hours of d) & ":" & my pad(minutes of d) & ":" & my pad(seconds of d)
end isoDateTime

on textOf(v)
	if v is missing value then return ""
	return v as text
end textOf

on makeDate(y, m, d)
	set dt to current date
	set day of dt to 1
	set year of dt to y
	set month of dt to m
	set day of dt to d
	set time of dt to 0
	return dt
end makeDate

on joinRecords(recs)
	set saved to AppleScript's text item delimiters
	set AppleScript's text item delimiters to (character id 30)
	set out to recs as text
	set AppleScript's text item delimiters to saved
	return out
end joinRecords

on containerIds(t)
	set projectId to ""
	set areaId to ""
	tell application "__APP__"
		try
			set p to project of t
			if p is not missing value then set projectId to id of p
		end try
		try
			set a to area of t
			if a is not missing value then set areaId to id of a
		end try
	end tell
	return {projectId, areaId}
end containerIds

on todoRecord(t)
	set FS to character id 31
	set {projectId, areaId} to my containerIds(t)
	tell application "__APP__"
		return "ID:" & (id of t) & FS & "TITLE:" & my textOf(name of t) & FS & "NOTES:" & my textOf(notes of t) & FS & "STATUS:" & ((status of t) as text) & FS & "TAGS:{" & my textOf(tag names of t) & "}" & FS & "DUE:" & my isoDate(due date of t) & FS & "ACTIVATION:" & my isoDate(activation date of t) & FS & "CREATED:" & my isoDateTime(creation date of t) & FS & "MODIFIED:" & my isoDateTime(modification date of t) & FS & "PROJECT:" & projectId & FS & "AREA:" & areaId
	end tell
end todoRecord

on projectRecord(p)
	set FS to character id 31
	set {ignored, areaId} to my containerIds(p)
	tell application "__APP__"
		return "ID:" & (id of p) & FS & "TITLE:" & my textOf(name of p) & FS & "NOTES:" & my textOf(notes of p) & FS & "STATUS:" & ((status of p) as text) & FS & "TAGS:{" & my textOf(tag names of p) & "}" & FS & "DUE:" & my isoDate(due date of p) & FS & "ACTIVATION:" & my isoDate(activation date of p) & FS & "CREATED:" & my isoDateTime(creation date of p) & FS & "MODIFIED:" & my isoDateTime(modification date of p) & FS & "AREA:" & areaId
	end tell
end projectRecord
"#;

/// Which kind of Things object an update or lookup addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Todo,
    Project,
}

impl ItemKind {
    fn class(&self) -> &'static str {
        match self {
            ItemKind::Todo => "to do",
            ItemKind::Project => "project",
        }
    }
}

/// Renders scripts against a configurable application name.
#[derive(Debug, Clone)]
pub struct Scripts {
    app: String,
}

impl Scripts {
    pub fn new(app_name: &str) -> Self {
        Self {
            app: escape_applescript_string(app_name),
        }
    }

    fn with_handlers(&self, body: &str) -> String {
        format!("{}\n{}", HANDLERS.replace("__APP__", &self.app), body)
    }

    fn collect(&self, collection: &str, handler: &str, limit: Option<usize>, guard: &str) -> String {
        let cap = match limit {
            Some(limit) => format!("\n\tif maxCount > {limit} then set maxCount to {limit}"),
            None => String::new(),
        };
        self.with_handlers(&format!(
            r#"
tell application "{app}"
{guard}	set source to ({collection})
	set maxCount to count of source{cap}
end tell
set recs to {{}}
repeat with i from 1 to maxCount
	set end of recs to my {handler}(item i of source)
end repeat
return my joinRecords(recs)
"#,
            app = self.app,
        ))
    }

    /// Open todos, optionally within one project.
    pub fn list_todos(&self, project_id: Option<&str>) -> String {
        match project_id {
            Some(id) => {
                let id = escape_applescript_string(id);
                self.collect(
                    &format!(r#"to dos of project id "{id}" whose status is open"#),
                    "todoRecord",
                    None,
                    &format!("\tif not (exists project id \"{id}\") then return \"{NOT_FOUND}\"\n"),
                )
            }
            None => self.collect("to dos whose status is open", "todoRecord", None, ""),
        }
    }

    pub fn list_builtin(&self, list: BuiltinList, limit: usize) -> String {
        self.collect(
            &format!(r#"to dos of list "{}""#, list.things_name()),
            "todoRecord",
            Some(limit),
            "",
        )
    }

    pub fn search_todos(&self, query: &str, limit: usize) -> String {
        let q = escape_applescript_string(query);
        self.collect(
            &format!(r#"to dos whose name contains "{q}" or notes contains "{q}""#),
            "todoRecord",
            Some(limit),
            "",
        )
    }

    pub fn tagged_todos(&self, tag: &str, limit: usize) -> String {
        let tag = escape_applescript_string(tag);
        self.collect(
            &format!(r#"to dos of tag "{tag}""#),
            "todoRecord",
            Some(limit),
            &format!("\tif not (exists tag \"{tag}\") then return \"\"\n"),
        )
    }

    pub fn get_todo(&self, id: &str) -> String {
        let id = escape_applescript_string(id);
        self.with_handlers(&format!(
            r#"
tell application "{app}"
	if not (exists to do id "{id}") then return "{NOT_FOUND}"
	set t to to do id "{id}"
end tell
return my todoRecord(t)
"#,
            app = self.app,
        ))
    }

    pub fn list_projects(&self, area_id: Option<&str>) -> String {
        match area_id {
            Some(id) => {
                let id = escape_applescript_string(id);
                self.collect(
                    &format!(r#"projects of area id "{id}""#),
                    "projectRecord",
                    None,
                    &format!("\tif not (exists area id \"{id}\") then return \"{NOT_FOUND}\"\n"),
                )
            }
            None => self.collect("projects", "projectRecord", None, ""),
        }
    }

    pub fn list_areas(&self) -> String {
        self.with_handlers(&format!(
            r#"
tell application "{app}"
	set FS to character id 31
	set recs to {{}}
	repeat with a in areas
		set tagText to ""
		try
			set tagText to my textOf(tag names of a)
		end try
		set end of recs to "ID:" & (id of a) & FS & "TITLE:" & my textOf(name of a) & FS & "TAGS:{{" & tagText & "}}"
	end repeat
end tell
return my joinRecords(recs)
"#,
            app = self.app,
        ))
    }

    pub fn list_tags(&self) -> String {
        self.with_handlers(&format!(
            r#"
tell application "{app}"
	set FS to character id 31
	set recs to {{}}
	repeat with g in tags
		set parentName to ""
		try
			set parentName to name of (parent tag of g)
		end try
		set shortcut to ""
		try
			set shortcut to my textOf(keyboard shortcut of g)
		end try
		set end of recs to "ID:" & (id of g) & FS & "TITLE:" & my textOf(name of g) & FS & "PARENT:" & parentName & FS & "SHORTCUT:" & shortcut
	end repeat
end tell
return my joinRecords(recs)
"#,
            app = self.app,
        ))
    }

    /// `true`/`false` for a project or area.
    pub fn exists(&self, class: &str, id: &str) -> String {
        format!(
            r#"tell application "{}" to return (exists {} id "{}")"#,
            self.app,
            class,
            escape_applescript_string(id)
        )
    }

    /// Scoped membership check that never materializes the whole list.
    pub fn todo_in_list(&self, id: &str, list: BuiltinList) -> String {
        format!(
            r#"tell application "{}" to return ((count of (to dos of list "{}" whose id is "{}")) > 0)"#,
            self.app,
            list.things_name(),
            escape_applescript_string(id)
        )
    }

    /// Id of the most recently created item with this exact title, or "".
    pub fn find_newest_by_title(&self, kind: ItemKind, title: &str) -> String {
        let plural = match kind {
            ItemKind::Todo => "to dos",
            ItemKind::Project => "projects",
        };
        format!(
            r#"
tell application "{app}"
	set matches to ({plural} whose name is "{title}")
	if (count of matches) is 0 then return ""
	set newest to item 1 of matches
	repeat with candidate in matches
		if creation date of candidate > creation date of newest then set newest to contents of candidate
	end repeat
	return id of newest
end tell
"#,
            app = self.app,
            title = escape_applescript_string(title),
        )
    }

    pub fn create_tag(&self, name: &str) -> String {
        format!(
            r#"
tell application "{}"
	set newTag to make new tag with properties {{name:"{}"}}
	return id of newTag
end tell
"#,
            self.app,
            escape_applescript_string(name)
        )
    }

    pub fn update(&self, kind: ItemKind, request: &UpdateRequest) -> String {
        let class = kind.class();
        let id = escape_applescript_string(&request.id);
        let mut statements: Vec<String> = Vec::new();

        if let Some(title) = &request.title {
            statements.push(format!(
                r#"set name of t to "{}""#,
                escape_applescript_string(title)
            ));
        }
        if let Some(notes) = &request.notes {
            statements.push(format!(
                r#"set notes of t to "{}""#,
                escape_applescript_string(notes)
            ));
        }
        if let Some(tags) = &request.tags {
            statements.push(format!(
                r#"set tag names of t to "{}""#,
                escape_applescript_string(&tags.join(", "))
            ));
        }
        if let Some(deadline) = request.deadline {
            statements.push(format!("set due date of t to {}", date_expr(deadline)));
        }
        if let Some(when) = request.when {
            statements.push(schedule_statement(when));
        }
        match (request.completed, request.canceled) {
            (Some(true), _) => statements.push("set status of t to completed".to_string()),
            (_, Some(true)) => statements.push("set status of t to canceled".to_string()),
            (Some(false), _) | (_, Some(false)) => {
                statements.push("set status of t to open".to_string())
            }
            (None, None) => {}
        }

        let body = statements
            .iter()
            .map(|s| format!("\t{}", s))
            .collect::<Vec<_>>()
            .join("\n");

        self.with_handlers(&format!(
            r#"
tell application "{app}"
	if not (exists {class} id "{id}") then return "{NOT_FOUND}"
	set t to {class} id "{id}"
{body}
	return "{OK}"
end tell
"#,
            app = self.app,
        ))
    }

    /// Things moves deleted items to its Trash.
    pub fn delete(&self, kind: ItemKind, id: &str) -> String {
        let class = kind.class();
        let id = escape_applescript_string(id);
        format!(
            r#"
tell application "{app}"
	if not (exists {class} id "{id}") then return "{NOT_FOUND}"
	delete {class} id "{id}"
	return "{OK}"
end tell
"#,
            app = self.app,
        )
    }

    pub fn move_todo(&self, id: &str, destination: &Location) -> String {
        let id = escape_applescript_string(id);
        let action = match destination {
            Location::List { name } => match name {
                BuiltinList::Logbook => "set status of t to completed".to_string(),
                BuiltinList::Trash => "delete t".to_string(),
                BuiltinList::Upcoming => concat!(
                    "if (activation date of t is missing value) or (activation date of t < (current date)) then\n",
                    "\t\tschedule t for (current date) + 1 * days\n",
                    "\tend if"
                )
                .to_string(),
                list => format!(r#"move t to list "{}""#, list.things_name()),
            },
            Location::Project { id } => format!(
                r#"set project of t to project id "{}""#,
                escape_applescript_string(id)
            ),
            Location::Area { id } => format!(
                r#"set area of t to area id "{}""#,
                escape_applescript_string(id)
            ),
        };

        format!(
            r#"
tell application "{app}"
	if not (exists to do id "{id}") then return "{NOT_FOUND}"
	set t to to do id "{id}"
	{action}
	return "{OK}"
end tell
"#,
            app = self.app,
        )
    }

    /// Scheduling side effect for list moves when scheduling is not preserved.
    pub fn reschedule_for_list(&self, id: &str, list: BuiltinList) -> Option<String> {
        match list {
            BuiltinList::Today => Some(format!(
                r#"tell application "{}" to schedule (to do id "{}") for (current date)"#,
                self.app,
                escape_applescript_string(id)
            )),
            _ => None,
        }
    }
}

fn date_expr(date: NaiveDate) -> String {
    format!(
        "(my makeDate({}, {}, {}))",
        date.year(),
        date.month(),
        date.day()
    )
}

fn schedule_statement(when: When) -> String {
    match when {
        When::Today | When::Evening => r#"move t to list "Today""#.to_string(),
        When::Anytime => r#"move t to list "Anytime""#.to_string(),
        When::Someday => r#"move t to list "Someday""#.to_string(),
        When::Tomorrow => "schedule t for (current date) + 1 * days".to_string(),
        When::Date(date) => format!("schedule t for {}", date_expr(date)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripts() -> Scripts {
        Scripts::new("Things3")
    }

    #[test]
    fn get_todo_escapes_id_and_guards_existence() {
        let script = scripts().get_todo(r#"a"b"#);
        assert!(script.contains(r#"exists to do id "a\"b""#));
        assert!(script.contains("return \"NOT_FOUND\""));
        assert!(script.contains("on todoRecord(t)"));
        assert!(!script.contains("__APP__"));
    }

    #[test]
    fn list_builtin_caps_count() {
        let script = scripts().list_builtin(BuiltinList::Today, 25);
        assert!(script.contains(r#"to dos of list "Today""#));
        assert!(script.contains("if maxCount > 25 then set maxCount to 25"));
    }

    #[test]
    fn membership_check_is_scoped() {
        let script = scripts().todo_in_list("T1", BuiltinList::Someday);
        assert!(script.contains(r#"to dos of list "Someday" whose id is "T1""#));
    }

    #[test]
    fn move_variants() {
        let s = scripts();
        assert!(s
            .move_todo("T1", &Location::list(BuiltinList::Anytime))
            .contains(r#"move t to list "Anytime""#));
        assert!(s
            .move_todo("T1", &Location::Project { id: "P1".into() })
            .contains(r#"set project of t to project id "P1""#));
        assert!(s
            .move_todo("T1", &Location::Area { id: "A1".into() })
            .contains(r#"set area of t to area id "A1""#));
        assert!(s
            .move_todo("T1", &Location::list(BuiltinList::Logbook))
            .contains("set status of t to completed"));
    }

    #[test]
    fn update_renders_only_given_fields() {
        let script = scripts().update(
            ItemKind::Project,
            &UpdateRequest {
                id: "P1".into(),
                title: Some("Renamed \"x\"".into()),
                deadline: NaiveDate::from_ymd_opt(2026, 2, 28),
                completed: Some(true),
                ..Default::default()
            },
        );
        assert!(script.contains(r#"set t to project id "P1""#));
        assert!(script.contains(r#"set name of t to "Renamed \"x\"""#));
        assert!(script.contains("set due date of t to (my makeDate(2026, 2, 28))"));
        assert!(script.contains("set status of t to completed"));
        assert!(!script.contains("set notes of t"));
    }

    #[test]
    fn today_reschedule_only() {
        assert!(scripts()
            .reschedule_for_list("T1", BuiltinList::Today)
            .is_some());
        assert!(scripts()
            .reschedule_for_list("T1", BuiltinList::Someday)
            .is_none());
    }

    #[test]
    fn area_and_tag_listings_share_the_record_joiner() {
        for script in [scripts().list_areas(), scripts().list_tags()] {
            assert!(script.contains("on joinRecords(recs)"));
            assert!(script.contains("return my joinRecords(recs)"));
            assert_eq!(script.matches("text item delimiters to (character id 30)").count(), 1);
            assert!(!script.contains("__APP__"));
        }
    }

    #[test]
    fn custom_app_name() {
        let script = Scripts::new("Things3 Beta").exists("project", "P1");
        assert_eq!(
            script,
            r#"tell application "Things3 Beta" to return (exists project id "P1")"#
        );
    }
}
