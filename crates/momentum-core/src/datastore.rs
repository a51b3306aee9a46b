use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::category::Category;
use crate::task::{Subtask, Task};

/// Request/response boundary to wherever tasks live. The hosted backend
/// and the local [`DataStore`] both sit behind it.
pub trait TaskBackend {
    fn list_tasks(&self) -> anyhow::Result<Vec<Task>>;

    fn get_task(&self, id: Uuid) -> anyhow::Result<Option<Task>>;

    fn insert_task(&mut self, task: Task) -> anyhow::Result<Task>;

    /// Replaces the stored task with the same id.
    fn update_task(&mut self, task: &Task) -> anyhow::Result<()>;

    /// Also deletes the task's subtasks.
    fn delete_task(&mut self, id: Uuid) -> anyhow::Result<()>;

    /// Subtasks of one task, by position.
    fn list_subtasks(&self, task_id: Uuid) -> anyhow::Result<Vec<Subtask>>;

    fn insert_subtask(&mut self, subtask: Subtask) -> anyhow::Result<Subtask>;

    fn update_subtask(&mut self, subtask: &Subtask) -> anyhow::Result<()>;

    fn delete_subtask(&mut self, id: Uuid) -> anyhow::Result<()>;

    /// Oldest first.
    fn list_categories(&self) -> anyhow::Result<Vec<Category>>;

    fn insert_category(&mut self, category: Category) -> anyhow::Result<Category>;

    /// Also unlinks the category from every task.
    fn delete_category(&mut self, id: Uuid) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub subtasks_path: PathBuf,
    pub categories_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let subtasks_path = data_dir.join("subtasks.data");
        for path in [&tasks_path, &subtasks_path] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        let categories_path = data_dir.join("categories.data");
        if !categories_path.exists() {
            let starters = Category::starter_set(Utc::now());
            save_jsonl_atomic(&categories_path, &starters)
                .with_context(|| format!("failed to create {}", categories_path.display()))?;
            info!(count = starters.len(), "seeded starter categories");
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            subtasks_path,
            categories_path,
        })
    }

    pub fn next_position(&self, tasks: &[Task]) -> u32 {
        tasks
            .iter()
            .map(|t| t.position)
            .max()
            .map_or(0, |max| max.saturating_add(1))
    }

    /// Finds a task by full id or unique id prefix.
    #[tracing::instrument(skip(self))]
    pub fn resolve(&self, token: &str) -> anyhow::Result<Task> {
        let needle = token.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Err(anyhow!("task id cannot be empty"));
        }

        let tasks = self.list_tasks()?;
        let mut matches = tasks
            .into_iter()
            .filter(|t| t.id.to_string().starts_with(&needle));
        let first = matches
            .next()
            .ok_or_else(|| anyhow!("no task matches id {token}"))?;
        if matches.next().is_some() {
            return Err(anyhow!("task id {token} is ambiguous"));
        }
        Ok(first)
    }

    /// Finds a category by name (any case) or unique id prefix.
    #[tracing::instrument(skip(self))]
    pub fn resolve_category(&self, token: &str) -> anyhow::Result<Category> {
        let needle = token.trim().to_lowercase();
        if needle.is_empty() {
            return Err(anyhow!("category name cannot be empty"));
        }

        let categories = self.list_categories()?;
        if let Some(found) = categories.iter().find(|c| c.matches_name(&needle)) {
            return Ok(found.clone());
        }
        let mut matches = categories
            .into_iter()
            .filter(|c| c.id.to_string().starts_with(&needle));
        let first = matches
            .next()
            .ok_or_else(|| anyhow!("no category named {}", token.trim()))?;
        if matches.next().is_some() {
            return Err(anyhow!("category id {token} is ambiguous"));
        }
        Ok(first)
    }

    fn save(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    fn all_subtasks(&self) -> anyhow::Result<Vec<Subtask>> {
        load_jsonl(&self.subtasks_path).context("failed to load subtasks.data")
    }

    fn save_subtasks(&self, subtasks: &[Subtask]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.subtasks_path, subtasks).context("failed to save subtasks.data")
    }

    fn save_categories(&self, categories: &[Category]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.categories_path, categories)
            .context("failed to save categories.data")
    }
}

impl TaskBackend for DataStore {
    #[tracing::instrument(skip(self))]
    fn list_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let mut tasks: Vec<Task> =
            load_jsonl(&self.tasks_path).context("failed to load tasks.data")?;
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    fn get_task(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        Ok(self.list_tasks()?.into_iter().find(|t| t.id == id))
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    fn insert_task(&mut self, task: Task) -> anyhow::Result<Task> {
        let mut tasks = self.list_tasks()?;
        if tasks.iter().any(|t| t.id == task.id) {
            return Err(anyhow!("task already exists: {}", task.id));
        }
        tasks.push(task.clone());
        self.save(&tasks)?;
        Ok(task)
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    fn update_task(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut tasks = self.list_tasks()?;
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or_else(|| anyhow!("task not found: {}", task.id))?;
        *slot = task.clone();
        self.save(&tasks)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    fn delete_task(&mut self, id: Uuid) -> anyhow::Result<()> {
        let tasks = self.list_tasks()?;
        let before = tasks.len();
        let kept: Vec<Task> = tasks.into_iter().filter(|t| t.id != id).collect();
        if kept.len() == before {
            return Err(anyhow!("task not found: {id}"));
        }
        self.save(&kept)?;

        let subtasks = self.all_subtasks()?;
        let before = subtasks.len();
        let kept: Vec<Subtask> = subtasks.into_iter().filter(|s| s.task_id != id).collect();
        if kept.len() != before {
            debug!(removed = before - kept.len(), "deleted subtasks with their task");
            self.save_subtasks(&kept)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(task_id = %task_id))]
    fn list_subtasks(&self, task_id: Uuid) -> anyhow::Result<Vec<Subtask>> {
        let mut subtasks: Vec<Subtask> = self
            .all_subtasks()?
            .into_iter()
            .filter(|s| s.task_id == task_id)
            .collect();
        subtasks.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(subtasks)
    }

    #[tracing::instrument(skip(self, subtask), fields(id = %subtask.id, task_id = %subtask.task_id))]
    fn insert_subtask(&mut self, subtask: Subtask) -> anyhow::Result<Subtask> {
        if self.get_task(subtask.task_id)?.is_none() {
            return Err(anyhow!("task not found: {}", subtask.task_id));
        }
        let mut subtasks = self.all_subtasks()?;
        if subtasks.iter().any(|s| s.id == subtask.id) {
            return Err(anyhow!("subtask already exists: {}", subtask.id));
        }
        subtasks.push(subtask.clone());
        self.save_subtasks(&subtasks)?;
        Ok(subtask)
    }

    #[tracing::instrument(skip(self, subtask), fields(id = %subtask.id))]
    fn update_subtask(&mut self, subtask: &Subtask) -> anyhow::Result<()> {
        let mut subtasks = self.all_subtasks()?;
        let slot = subtasks
            .iter_mut()
            .find(|s| s.id == subtask.id)
            .ok_or_else(|| anyhow!("subtask not found: {}", subtask.id))?;
        *slot = subtask.clone();
        self.save_subtasks(&subtasks)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    fn delete_subtask(&mut self, id: Uuid) -> anyhow::Result<()> {
        let subtasks = self.all_subtasks()?;
        let before = subtasks.len();
        let kept: Vec<Subtask> = subtasks.into_iter().filter(|s| s.id != id).collect();
        if kept.len() == before {
            return Err(anyhow!("subtask not found: {id}"));
        }
        self.save_subtasks(&kept)
    }

    #[tracing::instrument(skip(self))]
    fn list_categories(&self) -> anyhow::Result<Vec<Category>> {
        let mut categories: Vec<Category> =
            load_jsonl(&self.categories_path).context("failed to load categories.data")?;
        categories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(categories)
    }

    #[tracing::instrument(skip(self, category), fields(name = %category.name))]
    fn insert_category(&mut self, category: Category) -> anyhow::Result<Category> {
        let mut categories = self.list_categories()?;
        if categories.iter().any(|c| c.matches_name(&category.name)) {
            return Err(anyhow!("category already exists: {}", category.name));
        }
        categories.push(category.clone());
        self.save_categories(&categories)?;
        Ok(category)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    fn delete_category(&mut self, id: Uuid) -> anyhow::Result<()> {
        let categories = self.list_categories()?;
        let before = categories.len();
        let kept: Vec<Category> = categories.into_iter().filter(|c| c.id != id).collect();
        if kept.len() == before {
            return Err(anyhow!("category not found: {id}"));
        }
        self.save_categories(&kept)?;

        let mut tasks = self.list_tasks()?;
        let mut unlinked = 0;
        for task in tasks.iter_mut().filter(|t| t.category_ids.contains(&id)) {
            task.category_ids.retain(|c| *c != id);
            unlinked += 1;
        }
        if unlinked > 0 {
            debug!(unlinked, "unlinked category from tasks");
            self.save(&tasks)?;
        }
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let serialized = serde_json::to_string(row)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
