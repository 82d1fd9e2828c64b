//! Farm tasks as assigned by managers and owners.
//!
//! A task's own `status` is owned by the server. Submission outcomes never
//! write it directly; see [`crate::workflow`] for how submissions gate the
//! worker's actions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "urgent" => Some(TaskPriority::Urgent),
            _ => None,
        }
    }
}

/// Lifecycle of a task.
///
/// ```text
/// Pending -> InProgress -> Completed
///        \-------------\-> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Assignee user id
    #[serde(default)]
    pub assigned_to: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_assigned_to(&self, user_id: i64) -> bool {
        self.assigned_to == Some(user_id)
    }

    /// Past its due date and not yet finished.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.due_date.is_some_and(|due| due < today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names_match_api() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("done"), None);
    }

    #[test]
    fn overdue_ignores_finished_tasks() {
        let mut task = Task {
            id: 1,
            title: "Mend fence".to_string(),
            description: None,
            priority: TaskPriority::High,
            due_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            status: TaskStatus::Pending,
            assigned_to: Some(7),
            assigned_to_name: None,
            location: Some("North paddock".to_string()),
            estimated_hours: Some(3.5),
            created_by: 1,
            created_at: Utc::now(),
        };
        let today = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert!(task.is_overdue(today));
        task.status = TaskStatus::Completed;
        assert!(!task.is_overdue(today));
    }

    #[test]
    fn task_decodes_with_missing_optional_fields() {
        let task: Task = serde_json::from_str(
            r#"{"id":3,"title":"Feed calves","created_by":2,"created_at":"2024-05-01T06:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(task.assigned_to.is_none());
    }
}
