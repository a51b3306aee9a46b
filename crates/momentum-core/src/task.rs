use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::due::{DueLabel, label_due};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Self::Low),
            "medium" | "m" => Ok(Self::Medium),
            "high" | "h" => Ok(Self::High),
            other => Err(anyhow!("unknown priority: {other}")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
}

impl FromStr for Recurrence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(anyhow!("unknown recurrence: {other}")),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub is_recurring: bool,

    #[serde(default)]
    pub recurrence: Option<Recurrence>,

    #[serde(default)]
    pub is_public: bool,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub position: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub category_ids: Vec<Uuid>,
}

impl Task {
    pub fn new(title: String, now: DateTime<Utc>, position: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            description: None,
            due_date: None,
            priority: Priority::default(),
            status: Status::Todo,
            is_recurring: false,
            recurrence: None,
            is_public: false,
            completed_at: None,
            position,
            created_at: now,
            updated_at: now,
            category_ids: vec![],
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == Status::Done
    }

    pub fn set_recurrence(&mut self, recurrence: Option<Recurrence>) {
        self.is_recurring = recurrence.is_some();
        self.recurrence = recurrence;
    }

    /// Done goes back to todo; anything else becomes done.
    pub fn toggle_status(&mut self, now: DateTime<Utc>) {
        if self.is_done() {
            self.status = Status::Todo;
            self.completed_at = None;
        } else {
            self.status = Status::Done;
            self.completed_at = Some(now);
        }
        self.updated_at = now;
    }

    /// Title and description are trimmed. A blank description clears it; a
    /// blank title is rejected and leaves the task untouched.
    pub fn apply_edit(
        &mut self,
        title: Option<&str>,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if title.is_none() && description.is_none() {
            return Err(anyhow!("nothing to edit: pass --title or --description"));
        }
        let title = match title.map(str::trim) {
            Some("") => return Err(anyhow!("task title cannot be empty")),
            other => other,
        };

        if let Some(title) = title {
            self.title = title.to_string();
        }
        if let Some(description) = description {
            self.description = match description.trim() {
                "" => None,
                text => Some(text.to_string()),
            };
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn due_label(&self, now: DateTime<Utc>, tz: &Tz) -> DueLabel {
        label_due(self.due_date, now, self.is_done(), tz)
    }

    pub fn matches_search(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle)
            || self
                .description
                .as_ref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: Uuid,

    pub task_id: Uuid,

    pub title: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub position: u32,

    pub created_at: DateTime<Utc>,
}

impl Subtask {
    pub fn new(task_id: Uuid, title: &str, position: u32, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(anyhow!("subtask title cannot be empty"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            task_id,
            title: title.to_string(),
            completed: false,
            position,
            created_at: now,
        })
    }

    pub fn toggle(&mut self) {
        self.completed = !self.completed;
    }
}

/// Checked-off subtasks out of all of a task's subtasks, shown as `1/3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubtaskProgress {
    pub completed: usize,
    pub total: usize,
}

impl SubtaskProgress {
    pub fn tally(subtasks: &[Subtask]) -> Self {
        Self {
            completed: subtasks.iter().filter(|s| s.completed).count(),
            total: subtasks.len(),
        }
    }
}

impl fmt::Display for SubtaskProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(Status),
}

impl StatusFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Only(status) => task.status == *status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "todo" => Ok(Self::Only(Status::Todo)),
            "in_progress" | "in-progress" => Ok(Self::Only(Status::InProgress)),
            "done" => Ok(Self::Only(Status::Done)),
            other => Err(anyhow!("unknown status filter: {other}")),
        }
    }
}

pub fn filter_tasks<'a>(tasks: &'a [Task], status: StatusFilter, query: &str) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|task| status.matches(task) && task.matches_search(query))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub all: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
}

impl StatusCounts {
    pub fn tally(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut counts, task| {
            counts.all += 1;
            match task.status {
                Status::Todo => counts.todo += 1,
                Status::InProgress => counts.in_progress += 1,
                Status::Done => counts.done += 1,
            }
            counts
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use uuid::Uuid;

    use super::{
        Priority, Recurrence, Status, StatusCounts, StatusFilter, Subtask, SubtaskProgress, Task,
        filter_tasks,
    };
    use crate::due::DateClassification;

    fn sample() -> Vec<Task> {
        let now = Utc::now();
        let mut write = Task::new("Write report".to_string(), now, 0);
        write.description = Some("Quarterly numbers".to_string());
        let mut gym = Task::new("Gym".to_string(), now, 1);
        gym.status = Status::InProgress;
        let mut call = Task::new("Call the bank".to_string(), now, 2);
        call.toggle_status(now);
        vec![write, gym, call]
    }

    #[test]
    fn toggle_sets_and_clears_completion() {
        let now = Utc
            .with_ymd_and_hms(2025, 6, 15, 12, 0, 0)
            .single()
            .expect("valid now");
        let mut task = Task::new("Ship".to_string(), now, 0);

        let later = now + Duration::minutes(5);
        task.toggle_status(later);
        assert_eq!(task.status, Status::Done);
        assert_eq!(task.completed_at, Some(later));
        assert_eq!(task.updated_at, later);

        task.toggle_status(later);
        assert_eq!(task.status, Status::Todo);
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn filters_by_status_and_search() {
        let tasks = sample();
        assert_eq!(filter_tasks(&tasks, StatusFilter::All, "").len(), 3);
        let done = filter_tasks(&tasks, "done".parse().expect("filter"), "");
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].title, "Call the bank");

        let by_description = filter_tasks(&tasks, StatusFilter::All, "QUARTERLY");
        assert_eq!(by_description.len(), 1);
        assert_eq!(by_description[0].title, "Write report");

        assert!("someday".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn edit_trims_and_clears_blank_description() {
        let now = Utc
            .with_ymd_and_hms(2025, 6, 15, 12, 0, 0)
            .single()
            .expect("valid now");
        let mut task = Task::new("Draft".to_string(), now, 0);
        task.description = Some("old notes".to_string());

        let later = now + Duration::minutes(1);
        task.apply_edit(Some("  Final draft  "), Some("   "), later)
            .expect("edit");
        assert_eq!(task.title, "Final draft");
        assert_eq!(task.description, None);
        assert_eq!(task.updated_at, later);

        task.apply_edit(None, Some(" send Friday "), later).expect("edit");
        assert_eq!(task.title, "Final draft");
        assert_eq!(task.description.as_deref(), Some("send Friday"));
    }

    #[test]
    fn edit_rejects_blank_title_without_changes() {
        let now = Utc::now();
        let mut task = Task::new("Draft".to_string(), now, 0);
        let before = task.clone();
        assert!(task.apply_edit(Some("   "), Some("notes"), now).is_err());
        assert!(task.apply_edit(None, None, now).is_err());
        assert_eq!(task, before);
    }

    #[test]
    fn subtasks_trim_toggle_and_tally() {
        let now = Utc::now();
        let parent = Uuid::new_v4();
        assert!(Subtask::new(parent, "  ", 0, now).is_err());

        let mut first = Subtask::new(parent, " Buy stamps ", 0, now).expect("subtask");
        assert_eq!(first.title, "Buy stamps");
        assert!(!first.completed);
        let second = Subtask::new(parent, "Post letter", 1, now).expect("subtask");

        assert_eq!(SubtaskProgress::tally(&[]).to_string(), "0/0");
        first.toggle();
        let progress = SubtaskProgress::tally(&[first.clone(), second]);
        assert_eq!(progress, SubtaskProgress { completed: 1, total: 2 });
        assert_eq!(progress.to_string(), "1/2");
        first.toggle();
        assert!(!first.completed);
    }

    #[test]
    fn recurrence_displays_its_wire_name() {
        assert_eq!(Recurrence::Daily.to_string(), "daily");
        assert_eq!("WEEKLY".parse::<Recurrence>().expect("parse").to_string(), "weekly");
    }

    #[test]
    fn counts_each_status() {
        let counts = StatusCounts::tally(&sample());
        assert_eq!(
            counts,
            StatusCounts {
                all: 3,
                todo: 1,
                in_progress: 1,
                done: 1,
            }
        );
    }

    #[test]
    fn completed_task_has_no_due_label() {
        let tz = chrono_tz::UTC;
        let now = Utc::now();
        let mut task = Task::new("Late".to_string(), now, 0);
        task.due_date = Some(now - Duration::days(3));
        assert_eq!(task.due_label(now, &tz).classification, DateClassification::Overdue);
        task.toggle_status(now);
        assert_eq!(task.due_label(now, &tz).classification, DateClassification::None);
    }

    #[test]
    fn serializes_backend_field_names() {
        let now = Utc
            .with_ymd_and_hms(2025, 6, 15, 12, 0, 0)
            .single()
            .expect("valid now");
        let mut task = Task::new("Ship".to_string(), now, 0);
        task.status = Status::InProgress;
        task.priority = Priority::High;
        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["status"], "in_progress");
        assert_eq!(value["priority"], "high");
        assert_eq!(value["due_date"], serde_json::Value::Null);

        let back: Task = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, task);
    }
}
