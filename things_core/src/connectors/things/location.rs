//! Working out which list a todo currently sits in.
//!
//! Things' dictionary has no "containing list" property for open todos, so
//! the answer is derived from status, container and scheduled date, with a
//! handful of scoped membership probes as the last resort.

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::types::{BuiltinList, Location, Status, Todo};
use crate::error::ThingsError;

/// Lists probed, in priority order, when nothing else decides.
pub const PROBE_ORDER: [BuiltinList; 3] =
    [BuiltinList::Someday, BuiltinList::Anytime, BuiltinList::Inbox];

/// Answers "is this todo in list X" without fetching list X.
#[async_trait]
pub trait ListProbe: Send + Sync {
    async fn contains(&self, list: BuiltinList, todo_id: &str) -> Result<bool, ThingsError>;
}

/// The decision rules that need no subprocess. `None` means the todo is open,
/// uncontained and unscheduled, so only a membership probe can tell.
pub fn classify_static(
    status: Status,
    scheduled: Option<NaiveDate>,
    project_id: Option<&str>,
    area_id: Option<&str>,
    today: NaiveDate,
) -> Option<Location> {
    match status {
        Status::Completed => return Some(Location::list(BuiltinList::Logbook)),
        Status::Canceled => return Some(Location::list(BuiltinList::Trash)),
        Status::Open => {}
    }

    if let Some(id) = project_id.filter(|id| !id.is_empty()) {
        return Some(Location::Project { id: id.to_string() });
    }
    if let Some(id) = area_id.filter(|id| !id.is_empty()) {
        return Some(Location::Area { id: id.to_string() });
    }

    let date = scheduled?;
    let list = if date == today {
        BuiltinList::Today
    } else if date > today {
        BuiltinList::Upcoming
    } else {
        BuiltinList::Anytime
    };
    Some(Location::list(list))
}

/// Always yields a location; falls back to Inbox when every probe is
/// inconclusive.
pub async fn classify(todo: &Todo, today: NaiveDate, probe: &dyn ListProbe) -> Location {
    if let Some(location) = classify_static(
        todo.status,
        todo.activation_date,
        todo.project_id.as_deref(),
        todo.area_id.as_deref(),
        today,
    ) {
        return location;
    }

    for list in PROBE_ORDER {
        match probe.contains(list, &todo.id).await {
            Ok(true) => return Location::list(list),
            Ok(false) => {}
            Err(e) => {
                debug!(target: "things::moves", todo_id = %todo.id, %list, error = %e, "membership probe inconclusive");
            }
        }
    }
    Location::list(BuiltinList::Inbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Mutex;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn open_todo(scheduled: Option<NaiveDate>) -> Todo {
        Todo {
            id: "T1".into(),
            title: "Water plants".into(),
            notes: String::new(),
            status: Status::Open,
            tags: vec![],
            deadline: None,
            activation_date: scheduled,
            project_id: None,
            area_id: None,
            creation_date: None,
            modification_date: None,
        }
    }

    struct FixedProbe {
        member_of: Option<BuiltinList>,
        failing: bool,
        asked: Mutex<Vec<BuiltinList>>,
    }

    impl FixedProbe {
        fn new(member_of: Option<BuiltinList>) -> Self {
            Self {
                member_of,
                failing: false,
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ListProbe for FixedProbe {
        async fn contains(&self, list: BuiltinList, _todo_id: &str) -> Result<bool, ThingsError> {
            self.asked.lock().unwrap().push(list);
            if self.failing {
                return Err(ThingsError::Timeout("probe".into()));
            }
            Ok(self.member_of == Some(list))
        }
    }

    #[test]
    fn scheduled_dates() {
        let t = today();
        assert_eq!(
            classify_static(Status::Open, Some(t), None, None, t),
            Some(Location::list(BuiltinList::Today))
        );
        assert_eq!(
            classify_static(Status::Open, Some(t + Duration::days(5)), None, None, t),
            Some(Location::list(BuiltinList::Upcoming))
        );
        assert_eq!(
            classify_static(Status::Open, Some(t - Duration::days(1)), None, None, t),
            Some(Location::list(BuiltinList::Anytime))
        );
    }

    #[test]
    fn status_wins_over_everything() {
        let t = today();
        assert_eq!(
            classify_static(Status::Completed, Some(t), Some("P1"), Some("A1"), t),
            Some(Location::list(BuiltinList::Logbook))
        );
        assert_eq!(
            classify_static(Status::Canceled, None, Some("P1"), None, t),
            Some(Location::list(BuiltinList::Trash))
        );
    }

    #[test]
    fn project_before_area_before_date() {
        let t = today();
        assert_eq!(
            classify_static(Status::Open, Some(t), Some("P1"), Some("A1"), t),
            Some(Location::Project { id: "P1".into() })
        );
        assert_eq!(
            classify_static(Status::Open, Some(t), None, Some("A1"), t),
            Some(Location::Area { id: "A1".into() })
        );
        assert_eq!(classify_static(Status::Open, None, Some(""), None, t), None);
    }

    #[tokio::test]
    async fn probes_in_priority_order() {
        let probe = FixedProbe::new(Some(BuiltinList::Anytime));
        let location = classify(&open_todo(None), today(), &probe).await;
        assert_eq!(location, Location::list(BuiltinList::Anytime));
        assert_eq!(
            *probe.asked.lock().unwrap(),
            vec![BuiltinList::Someday, BuiltinList::Anytime]
        );
    }

    #[tokio::test]
    async fn inconclusive_probes_default_to_inbox() {
        let mut probe = FixedProbe::new(None);
        probe.failing = true;
        let location = classify(&open_todo(None), today(), &probe).await;
        assert_eq!(location, Location::list(BuiltinList::Inbox));
        assert_eq!(probe.asked.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn scheduled_todo_skips_probes() {
        let probe = FixedProbe::new(Some(BuiltinList::Someday));
        let location = classify(&open_todo(Some(today())), today(), &probe).await;
        assert_eq!(location, Location::list(BuiltinList::Today));
        assert!(probe.asked.lock().unwrap().is_empty());
    }
}
