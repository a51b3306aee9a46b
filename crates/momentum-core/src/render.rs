use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarCell, CalendarPage, WEEKDAY_LABELS, month_name};
use crate::category::{Category, categories_of};
use crate::config::Config;
use crate::due::{format_due_full, short_date};
use crate::picker::{DateTimePicker, PickerTab};
use crate::task::{StatusCounts, Subtask, SubtaskProgress, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color, tz })
    }

    #[tracing::instrument(skip(self, tasks, categories, counts, now))]
    pub fn print_task_table(
        &mut self,
        tasks: &[&Task],
        categories: &[Category],
        counts: StatusCounts,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Due".to_string(),
            "Pri".to_string(),
            "Status".to_string(),
            "Title".to_string(),
            "Categories".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = self.paint(&task.id.to_string()[..8], "33");

            let due_info = task.due_label(now, &self.tz);
            let due = match (due_info.label.as_deref(), task.due_date) {
                (Some(label), _) if due_info.is_overdue() => self.paint(label, "31"),
                (Some(label), _) if due_info.is_soon() => self.paint(label, "36"),
                (Some(label), _) => label.to_string(),
                // done tasks keep the plain date
                (None, Some(due)) => short_date(due, &self.tz),
                (None, None) => String::new(),
            };

            let title = if task.is_done() {
                self.paint(&task.title, "2")
            } else {
                task.title.clone()
            };

            let tags = categories_of(categories, task)
                .iter()
                .map(|c| format!("#{}", c.name))
                .collect::<Vec<_>>()
                .join(" ");

            rows.push(vec![
                id,
                due,
                task.priority.to_string(),
                task.status.to_string(),
                title,
                tags,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        writeln!(
            out,
            "\n{} all, {} todo, {} in progress, {} done",
            counts.all, counts.todo, counts.in_progress, counts.done
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, categories, subtasks, now))]
    pub fn print_task_info(
        &mut self,
        task: &Task,
        categories: &[Category],
        subtasks: &[Subtask],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if let Some(description) = &task.description {
            writeln!(out, "description {description}")?;
        }
        writeln!(out, "status      {}", task.status)?;
        writeln!(out, "priority    {}", task.priority)?;
        if let Some(due) = task.due_date {
            let info = task.due_label(now, &self.tz);
            writeln!(
                out,
                "due         {} ({})",
                format_due_full(due, &self.tz),
                info.classification
            )?;
        }
        if let Some(recurrence) = task.recurrence {
            writeln!(out, "repeats     {recurrence}")?;
        }
        let linked = categories_of(categories, task);
        if !linked.is_empty() {
            let labels = linked.iter().map(|c| c.label()).collect::<Vec<_>>();
            writeln!(out, "categories  {}", labels.join(", "))?;
        }
        writeln!(out, "created     {}", format_due_full(task.created_at, &self.tz))?;
        if let Some(done) = task.completed_at {
            writeln!(out, "completed   {}", format_due_full(done, &self.tz))?;
        }
        write_subtasks(&mut out, subtasks)
    }

    pub fn print_category_table(&mut self, rows: &[(&Category, usize)]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "Icon".to_string(),
            "Name".to_string(),
            "Color".to_string(),
            "Tasks".to_string(),
        ];
        let rows = rows
            .iter()
            .map(|(category, count)| {
                vec![
                    category.icon.clone(),
                    category.name.clone(),
                    category.color.clone(),
                    count.to_string(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_calendar(&mut self, page: &CalendarPage) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{} {}", month_name(page.month0), page.year)?;
        write_calendar(&mut out, page, |_| false)
    }

    /// Shows the picker's current tab. Prints nothing for a closed picker.
    pub fn print_picker(&mut self, picker: &DateTimePicker, now: DateTime<Utc>) -> anyhow::Result<()> {
        let styled = self.styled();
        write_picker(io::stdout().lock(), picker, now, styled)
    }

    /// Escape codes only go to a terminal, and only with `color` on.
    fn styled(&self) -> bool {
        self.color && io::stdout().is_terminal()
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.styled() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_picker<W: Write>(
    mut out: W,
    picker: &DateTimePicker,
    now: DateTime<Utc>,
    styled: bool,
) -> anyhow::Result<()> {
    let (Some(preview), Some(tab)) = (picker.preview_text(), picker.tab()) else {
        return Ok(());
    };
    writeln!(out, "{preview}")?;
    match tab {
        PickerTab::Date => {
            let Some(page) = picker.page() else {
                return Ok(());
            };
            writeln!(
                out,
                "[Date]  Time     < {} >",
                picker.month_title().unwrap_or_default()
            )?;
            write_calendar(&mut out, &page, |day| {
                styled && (picker.is_selected(day) || picker.is_today(day, now))
            })?;
        }
        PickerTab::Time => {
            let time = picker.time().unwrap_or_default();
            writeln!(out, " Date  [Time]")?;
            writeln!(out, "HOUR {:02} : {:02} MINUTE", time.hour, time.minute)?;
        }
    }
    Ok(())
}

/// Progress header then one numbered line per subtask. Nothing when empty.
fn write_subtasks<W: Write>(mut out: W, subtasks: &[Subtask]) -> anyhow::Result<()> {
    if subtasks.is_empty() {
        return Ok(());
    }
    writeln!(out, "subtasks    {}", SubtaskProgress::tally(subtasks))?;
    for (idx, subtask) in subtasks.iter().enumerate() {
        let mark = if subtask.completed { 'x' } else { ' ' };
        writeln!(out, "  {:>2}. [{mark}] {}", idx + 1, subtask.title)?;
    }
    Ok(())
}

fn write_calendar<W: Write>(
    mut writer: W,
    page: &CalendarPage,
    highlight: impl Fn(u32) -> bool,
) -> anyhow::Result<()> {
    writeln!(writer, "{}", WEEKDAY_LABELS.join(" "))?;
    for week in page.weeks() {
        let line = week
            .iter()
            .map(|cell| match cell {
                CalendarCell::Day(day) if highlight(*day) => format!("\x1b[7m{day:>2}\x1b[0m"),
                CalendarCell::Day(day) => format!("{day:>2}"),
                CalendarCell::Empty => "  ".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line.trim_end())?;
    }
    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
