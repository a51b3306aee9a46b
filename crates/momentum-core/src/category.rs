use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::Task;

pub const DEFAULT_COLOR: &str = "#A3A3A3";
pub const DEFAULT_ICON: &str = "💼";

/// Written into a data directory the first time it is opened.
const STARTER_CATEGORIES: [(&str, &str, &str); 4] = [
    ("Work", "💼", "#71717A"),
    ("Personal", "🏠", "#A1A1AA"),
    ("Family", "👨‍👩‍👧", "#52525B"),
    ("Health", "💪", "#6B7280"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,

    pub name: String,

    pub color: String,

    pub icon: String,

    #[serde(default)]
    pub is_default: bool,

    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Name is trimmed and must not be blank. Color must be `#RRGGBB`.
    pub fn new(name: &str, color: &str, icon: &str, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("category name cannot be empty"));
        }
        let icon = match icon.trim() {
            "" => DEFAULT_ICON,
            icon => icon,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: parse_color(color)?,
            icon: icon.to_string(),
            is_default: false,
            created_at: now,
        })
    }

    pub fn starter_set(now: DateTime<Utc>) -> Vec<Self> {
        STARTER_CATEGORIES
            .iter()
            .map(|(name, icon, color)| Self {
                id: Uuid::new_v4(),
                name: (*name).to_string(),
                color: (*color).to_string(),
                icon: (*icon).to_string(),
                is_default: true,
                created_at: now,
            })
            .collect()
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }

    /// `💼 Work`
    pub fn label(&self) -> String {
        format!("{} {}", self.icon, self.name)
    }
}

fn parse_color(raw: &str) -> anyhow::Result<String> {
    static HEX_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = HEX_RE
        .get_or_init(|| Regex::new(r"^#[0-9a-fA-F]{6}$").ok())
        .as_ref()
        .ok_or_else(|| anyhow!("internal regex compile failure"))?;

    let color = raw.trim();
    if !re.is_match(color) {
        return Err(anyhow!("expected a #RRGGBB color, got: {raw}"));
    }
    Ok(color.to_ascii_uppercase())
}

pub fn find_by_name<'a>(categories: &'a [Category], name: &str) -> Option<&'a Category> {
    categories.iter().find(|c| c.matches_name(name))
}

/// Looks up each name, failing on the first one that is not a category.
pub fn resolve_names(categories: &[Category], names: &[String]) -> anyhow::Result<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let category = find_by_name(categories, name)
            .ok_or_else(|| anyhow!("unknown category: {}", name.trim()))?;
        if !ids.contains(&category.id) {
            ids.push(category.id);
        }
    }
    Ok(ids)
}

/// Categories linked to `task`, in category order. Dangling ids are skipped.
pub fn categories_of<'a>(categories: &'a [Category], task: &Task) -> Vec<&'a Category> {
    categories
        .iter()
        .filter(|c| task.category_ids.contains(&c.id))
        .collect()
}

pub fn task_counts<'a>(categories: &'a [Category], tasks: &[Task]) -> Vec<(&'a Category, usize)> {
    categories
        .iter()
        .map(|category| {
            let count = tasks
                .iter()
                .filter(|t| t.category_ids.contains(&category.id))
                .count();
            (category, count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Category, DEFAULT_ICON, categories_of, resolve_names, task_counts};
    use crate::task::Task;

    #[test]
    fn new_category_is_trimmed_and_validated() {
        let now = Utc::now();
        let category = Category::new("  Errands ", "#a1b2c3", " ", now).expect("valid category");
        assert_eq!(category.name, "Errands");
        assert_eq!(category.color, "#A1B2C3");
        assert_eq!(category.icon, DEFAULT_ICON);
        assert!(!category.is_default);

        assert!(Category::new("   ", "#A3A3A3", "🏠", now).is_err());
        assert!(Category::new("Home", "red", "🏠", now).is_err());
        assert!(Category::new("Home", "#12345", "🏠", now).is_err());
    }

    #[test]
    fn starter_set_is_flagged_default() {
        let starters = Category::starter_set(Utc::now());
        let names: Vec<&str> = starters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Work", "Personal", "Family", "Health"]);
        assert!(starters.iter().all(|c| c.is_default));
        assert_eq!(starters[0].label(), "💼 Work");
    }

    #[test]
    fn names_resolve_case_insensitively() {
        let starters = Category::starter_set(Utc::now());
        let ids = resolve_names(
            &starters,
            &["work".to_string(), " HEALTH ".to_string(), "Work".to_string()],
        )
        .expect("resolve");
        assert_eq!(ids, vec![starters[0].id, starters[3].id]);

        let err = resolve_names(&starters, &["Garden".to_string()]).expect_err("unknown");
        assert!(err.to_string().contains("Garden"));
    }

    #[test]
    fn counts_tasks_per_category() {
        let now = Utc::now();
        let starters = Category::starter_set(now);
        let mut a = Task::new("Report".to_string(), now, 0);
        a.category_ids = vec![starters[0].id];
        let mut b = Task::new("Run".to_string(), now, 1);
        b.category_ids = vec![starters[0].id, starters[3].id];
        let tasks = vec![a, b];

        let counts: Vec<(&str, usize)> = task_counts(&starters, &tasks)
            .into_iter()
            .map(|(c, n)| (c.name.as_str(), n))
            .collect();
        assert_eq!(
            counts,
            vec![("Work", 2), ("Personal", 0), ("Family", 0), ("Health", 1)]
        );

        let linked: Vec<&str> = categories_of(&starters, &tasks[1])
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(linked, ["Work", "Health"]);
    }
}
