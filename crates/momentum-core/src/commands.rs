use std::io::{self, BufRead, Write};
use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::calendar::CalendarPage;
use crate::category::{Category, resolve_names, task_counts};
use crate::cli::{CategoryCommand, Command, SubtaskCommand};
use crate::config::Config;
use crate::datastore::{DataStore, TaskBackend};
use crate::datetime::{default_due, local_date, parse_date_expr};
use crate::picker::{DateTimePicker, PickerMsg, PickerOutcome, PickerTab};
use crate::render::Renderer;
use crate::task::{StatusCounts, StatusFilter, Subtask, Task, filter_tasks};

pub struct CommandContext<'a> {
    pub store: &'a mut DataStore,
    pub cfg: &'a Config,
    pub renderer: &'a mut Renderer,
    pub tz: Tz,
}

pub fn dispatch(ctx: CommandContext<'_>, command: Option<Command>) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = command.unwrap_or(Command::List {
        status: StatusFilter::All,
        search: String::new(),
        category: None,
    });
    debug!(?command, "dispatching command");

    match command {
        Command::List {
            status,
            search,
            category,
        } => cmd_list(ctx, status, &search, category.as_deref(), now),
        Command::Add {
            title,
            due,
            priority,
            categories,
            recur,
            description,
        } => {
            let title = title.trim();
            if title.is_empty() {
                return Err(anyhow!("task title cannot be empty"));
            }
            let mut task = Task::new(title.to_string(), now, 0);
            task.priority = priority.unwrap_or_default();
            task.description = description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
            task.set_recurrence(recur);
            cmd_add(ctx, task, &categories, due.as_deref(), now)
        }
        Command::Info { id } => cmd_info(ctx, &id, now),
        Command::Edit {
            id,
            title,
            description,
        } => cmd_edit(ctx, &id, title.as_deref(), description.as_deref(), now),
        Command::Toggle { id } => cmd_toggle(ctx, &id, now),
        Command::Delete { id } => cmd_delete(ctx, &id),
        Command::Calendar { month } => cmd_calendar(ctx, month.as_deref(), now),
        Command::Pick { id } => {
            let stdin = io::stdin();
            cmd_pick(ctx, &id, stdin.lock(), now)
        }
        Command::Subtask { action } => cmd_subtask(ctx, action, now),
        Command::Category { action } => cmd_category(ctx, action, now),
    }
}

#[instrument(skip(ctx, now))]
fn cmd_list(
    mut ctx: CommandContext<'_>,
    status: StatusFilter,
    search: &str,
    category: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let tasks = ctx.store.list_tasks()?;
    let categories = ctx.store.list_categories()?;
    let counts = StatusCounts::tally(&tasks);
    let mut shown = filter_tasks(&tasks, status, search);
    if let Some(name) = category {
        let wanted = ctx.store.resolve_category(name)?;
        shown.retain(|t| t.category_ids.contains(&wanted.id));
    }
    info!(total = tasks.len(), shown = shown.len(), "listing tasks");
    ctx.renderer.print_task_table(&shown, &categories, counts, now)
}

#[instrument(skip(ctx, task, now), fields(title = %task.title))]
fn cmd_add(
    mut ctx: CommandContext<'_>,
    mut task: Task,
    categories: &[String],
    due: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    task.due_date = Some(match due {
        Some(expr) => parse_date_expr(expr, now, &ctx.tz)?,
        None => default_due(now, &ctx.tz, ctx.cfg.default_due_hour()),
    });
    task.category_ids = resolve_names(&ctx.store.list_categories()?, categories)
        .context("see `momentum category list` for known categories")?;

    let existing = ctx.store.list_tasks()?;
    task.position = ctx.store.next_position(&existing);

    let task = ctx.store.insert_task(task)?;
    info!(id = %task.id, "created task");
    println!("Created task {}.", &task.id.to_string()[..8]);
    Ok(())
}

#[instrument(skip(ctx, now))]
fn cmd_info(mut ctx: CommandContext<'_>, id: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
    let task = ctx.store.resolve(id)?;
    let categories = ctx.store.list_categories()?;
    let subtasks = ctx.store.list_subtasks(task.id)?;
    ctx.renderer
        .print_task_info(&task, &categories, &subtasks, now)
}

#[instrument(skip(ctx, title, description, now))]
fn cmd_edit(
    mut ctx: CommandContext<'_>,
    id: &str,
    title: Option<&str>,
    description: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut task = ctx.store.resolve(id)?;
    task.apply_edit(title, description, now)?;
    ctx.store.update_task(&task)?;
    info!(id = %task.id, "edited task");
    println!("Updated task {}.", &task.id.to_string()[..8]);
    Ok(())
}

#[instrument(skip(ctx, now))]
fn cmd_subtask(mut ctx: CommandContext<'_>, action: SubtaskCommand, now: DateTime<Utc>) -> anyhow::Result<()> {
    match action {
        SubtaskCommand::Add { task, title } => {
            let task = ctx.store.resolve(&task)?;
            let existing = ctx.store.list_subtasks(task.id)?;
            let position = existing
                .iter()
                .map(|s| s.position)
                .max()
                .map_or(0, |max| max.saturating_add(1));
            let subtask = ctx
                .store
                .insert_subtask(Subtask::new(task.id, &title, position, now)?)?;
            info!(task = %task.id, subtask = %subtask.id, "added subtask");
            println!(
                "Added subtask {} to task {}.",
                existing.len() + 1,
                &task.id.to_string()[..8]
            );
        }
        SubtaskCommand::Toggle { task, number } => {
            let task = ctx.store.resolve(&task)?;
            let mut subtask = subtask_number(ctx.store.list_subtasks(task.id)?, number)?;
            subtask.toggle();
            ctx.store.update_subtask(&subtask)?;
            let state = if subtask.completed { "done" } else { "open" };
            info!(subtask = %subtask.id, state, "toggled subtask");
            println!("Subtask {number} is now {state}.");
        }
        SubtaskCommand::Delete { task, number } => {
            let task = ctx.store.resolve(&task)?;
            let subtask = subtask_number(ctx.store.list_subtasks(task.id)?, number)?;
            ctx.store.delete_subtask(subtask.id)?;
            info!(subtask = %subtask.id, "deleted subtask");
            println!("Deleted subtask '{}'.", subtask.title);
        }
    }
    Ok(())
}

/// `number` counts from 1 in position order.
fn subtask_number(subtasks: Vec<Subtask>, number: usize) -> anyhow::Result<Subtask> {
    let count = subtasks.len();
    number
        .checked_sub(1)
        .and_then(|idx| subtasks.into_iter().nth(idx))
        .ok_or_else(|| anyhow!("no subtask {number}; the task has {count}"))
}

#[instrument(skip(ctx, now))]
fn cmd_category(mut ctx: CommandContext<'_>, action: CategoryCommand, now: DateTime<Utc>) -> anyhow::Result<()> {
    match action {
        CategoryCommand::List => {
            let categories = ctx.store.list_categories()?;
            let tasks = ctx.store.list_tasks()?;
            ctx.renderer
                .print_category_table(&task_counts(&categories, &tasks))?;
        }
        CategoryCommand::Add { name, color, icon } => {
            let category = ctx
                .store
                .insert_category(Category::new(&name, &color, &icon, now)?)?;
            info!(id = %category.id, name = %category.name, "created category");
            println!("Created category {}.", category.label());
        }
        CategoryCommand::Delete { name } => {
            let category = ctx.store.resolve_category(&name)?;
            ctx.store.delete_category(category.id)?;
            info!(id = %category.id, "deleted category");
            println!("Deleted category '{}'.", category.name);
        }
    }
    Ok(())
}

#[instrument(skip(ctx, now))]
fn cmd_toggle(mut ctx: CommandContext<'_>, id: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
    let mut task = ctx.store.resolve(id)?;
    task.toggle_status(now);
    ctx.store.update_task(&task)?;
    info!(id = %task.id, status = %task.status, "toggled task");
    println!("Task {} is now {}.", &task.id.to_string()[..8], task.status);
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_delete(mut ctx: CommandContext<'_>, id: &str) -> anyhow::Result<()> {
    let task = ctx.store.resolve(id)?;
    ctx.store.delete_task(task.id)?;
    info!(id = %task.id, "deleted task");
    println!("Deleted task '{}'.", task.title);
    Ok(())
}

#[instrument(skip(ctx, now))]
fn cmd_calendar(mut ctx: CommandContext<'_>, month: Option<&str>, now: DateTime<Utc>) -> anyhow::Result<()> {
    let (year, month0) = match month {
        Some(raw) => parse_year_month(raw)?,
        None => {
            let today = local_date(now, &ctx.tz);
            (today.year(), today.month0())
        }
    };
    ctx.renderer.print_calendar(&CalendarPage::new(year, month0))
}

/// `YYYY-MM` to `(year, month0)`.
fn parse_year_month(raw: &str) -> anyhow::Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM, got: {raw}"))?;
    Ok((date.year(), date.month0()))
}

#[instrument(skip(ctx, input, now))]
fn cmd_pick<R: BufRead>(mut ctx: CommandContext<'_>, id: &str, input: R, now: DateTime<Utc>) -> anyhow::Result<()> {
    let mut task = ctx.store.resolve(id)?;
    let initial = task
        .due_date
        .unwrap_or_else(|| default_due(now, &ctx.tz, ctx.cfg.default_due_hour()));

    let mut picker = DateTimePicker::new(ctx.tz);
    picker.open(initial);
    let outcome = run_picker_session(&mut picker, input, |p| ctx.renderer.print_picker(p, now))?;

    match outcome {
        PickerOutcome::Confirmed(due) => {
            task.due_date = Some(due);
            task.updated_at = now;
            ctx.store.update_task(&task)?;
            info!(id = %task.id, due = %due, "updated due date");
            println!("Due date set for task {}.", &task.id.to_string()[..8]);
        }
        PickerOutcome::Cancelled => {
            println!("Due date unchanged.");
        }
    }
    Ok(())
}

/// Feeds input lines to an open picker until it confirms or cancels. End of
/// input counts as cancel.
pub fn run_picker_session<R, F>(
    picker: &mut DateTimePicker,
    input: R,
    mut show: F,
) -> anyhow::Result<PickerOutcome>
where
    R: BufRead,
    F: FnMut(&DateTimePicker) -> anyhow::Result<()>,
{
    show(picker)?;
    prompt()?;
    for line in input.lines() {
        let line = line.context("failed reading picker input")?;
        let Some(msg) = parse_picker_input(&line) else {
            if !line.trim().is_empty() {
                warn!(input = %line.trim(), "unrecognized picker input");
                println!(
                    "commands: prev, next, <day>, date, time, h+, h-, m+, m-, ok, cancel"
                );
            }
            prompt()?;
            continue;
        };
        if let Some(outcome) = picker.update(msg) {
            return Ok(outcome);
        }
        show(picker)?;
        prompt()?;
    }

    picker
        .cancel()
        .ok_or_else(|| anyhow!("picker session was not open"))
}

fn prompt() -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "> ")?;
    out.flush()?;
    Ok(())
}

pub fn parse_picker_input(line: &str) -> Option<PickerMsg> {
    static DAY_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let token = line.trim().to_ascii_lowercase();

    let msg = match token.as_str() {
        "prev" | "p" | "<" => PickerMsg::PrevMonth,
        "next" | "n" | ">" => PickerMsg::NextMonth,
        "date" | "d" => PickerMsg::SwitchTab(PickerTab::Date),
        "time" | "t" => PickerMsg::SwitchTab(PickerTab::Time),
        "h+" | "hour+" => PickerMsg::HourUp,
        "h-" | "hour-" => PickerMsg::HourDown,
        "m+" | "min+" => PickerMsg::MinuteUp,
        "m-" | "min-" => PickerMsg::MinuteDown,
        "ok" | "confirm" | "y" => PickerMsg::Confirm,
        "cancel" | "c" | "q" => PickerMsg::Cancel,
        _ => {
            let re = DAY_RE
                .get_or_init(|| Regex::new(r"^(?:day\s+)?(?P<day>\d{1,2})$").ok())
                .as_ref()?;
            let day = re.captures(&token)?.name("day")?.as_str().parse().ok()?;
            PickerMsg::SelectDay(day)
        }
    };
    Some(msg)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::{
        CommandContext, cmd_category, cmd_edit, cmd_subtask, dispatch, parse_picker_input,
        parse_year_month, run_picker_session,
    };
    use crate::cli::{CategoryCommand, Command, SubtaskCommand};
    use crate::config::Config;
    use crate::datastore::{DataStore, TaskBackend};
    use crate::picker::{DateTimePicker, PickerMsg, PickerOutcome, PickerTab};
    use crate::render::Renderer;
    use crate::task::{SubtaskProgress, Task};

    fn context<'a>(
        store: &'a mut DataStore,
        cfg: &'a Config,
        renderer: &'a mut Renderer,
    ) -> CommandContext<'a> {
        CommandContext {
            store,
            cfg,
            renderer,
            tz: chrono_tz::UTC,
        }
    }

    #[test]
    fn picker_input_words() {
        assert_eq!(parse_picker_input(" next "), Some(PickerMsg::NextMonth));
        assert_eq!(parse_picker_input("TIME"), Some(PickerMsg::SwitchTab(PickerTab::Time)));
        assert_eq!(parse_picker_input("day 12"), Some(PickerMsg::SelectDay(12)));
        assert_eq!(parse_picker_input("5"), Some(PickerMsg::SelectDay(5)));
        assert_eq!(parse_picker_input("m-"), Some(PickerMsg::MinuteDown));
        assert_eq!(parse_picker_input("tomorrow"), None);
        assert_eq!(parse_picker_input("123"), None);
    }

    #[test]
    fn year_month_argument() {
        assert_eq!(parse_year_month("2025-03").expect("parse"), (2025, 2));
        assert!(parse_year_month("2025-13").is_err());
    }

    #[test]
    fn scripted_session_confirms() {
        let tz = chrono_tz::UTC;
        let start = Utc
            .with_ymd_and_hms(2025, 2, 20, 8, 0, 0)
            .single()
            .expect("valid start");
        let mut picker = DateTimePicker::new(tz);
        picker.open(start);

        let script = "next\n5\nbogus\ntime\nh+\nok\nnext\n";
        let mut shown = 0;
        let outcome = run_picker_session(&mut picker, Cursor::new(script), |_| {
            shown += 1;
            Ok(())
        })
        .expect("session");

        assert_eq!(
            outcome,
            PickerOutcome::Confirmed(
                Utc.with_ymd_and_hms(2025, 3, 5, 9, 0, 0)
                    .single()
                    .expect("valid instant")
            )
        );
        // initial view plus one per accepted transition before ok
        assert_eq!(shown, 5);
    }

    #[test]
    fn end_of_input_cancels() {
        let mut picker = DateTimePicker::new(chrono_tz::UTC);
        picker.open(Utc::now());
        let outcome = run_picker_session(&mut picker, Cursor::new("h+\n"), |_| Ok(()))
            .expect("session");
        assert_eq!(outcome, PickerOutcome::Cancelled);
        assert!(!picker.is_open());
    }

    #[test]
    fn edit_updates_the_stored_task() {
        let temp = tempdir().expect("tempdir");
        let mut store = DataStore::open(temp.path()).expect("open datastore");
        let cfg = Config::default();
        let mut renderer = Renderer::new(&cfg, chrono_tz::UTC).expect("renderer");
        let now = Utc::now();
        let mut task = Task::new("Draft".to_string(), now, 0);
        task.description = Some("old".to_string());
        let task = store.insert_task(task).expect("insert");
        let prefix = task.id.to_string()[..8].to_string();

        cmd_edit(
            context(&mut store, &cfg, &mut renderer),
            &prefix,
            Some(" Final "),
            Some("  "),
            now,
        )
        .expect("edit");
        let stored = store.get_task(task.id).expect("get").expect("present");
        assert_eq!(stored.title, "Final");
        assert_eq!(stored.description, None);

        assert!(
            cmd_edit(context(&mut store, &cfg, &mut renderer), &prefix, Some(""), None, now).is_err()
        );
        assert_eq!(store.get_task(task.id).expect("get").expect("present").title, "Final");
    }

    #[test]
    fn subtask_commands_add_toggle_and_delete() {
        let temp = tempdir().expect("tempdir");
        let mut store = DataStore::open(temp.path()).expect("open datastore");
        let cfg = Config::default();
        let mut renderer = Renderer::new(&cfg, chrono_tz::UTC).expect("renderer");
        let now = Utc::now();
        let task = store
            .insert_task(Task::new("Move flat".to_string(), now, 0))
            .expect("insert");
        let id = task.id.to_string();

        for title in ["Book van", "Buy boxes", "Label boxes"] {
            cmd_subtask(
                context(&mut store, &cfg, &mut renderer),
                SubtaskCommand::Add {
                    task: id.clone(),
                    title: title.to_string(),
                },
                now,
            )
            .expect("add subtask");
        }
        assert!(
            cmd_subtask(
                context(&mut store, &cfg, &mut renderer),
                SubtaskCommand::Add {
                    task: id.clone(),
                    title: "   ".to_string(),
                },
                now,
            )
            .is_err()
        );

        cmd_subtask(
            context(&mut store, &cfg, &mut renderer),
            SubtaskCommand::Toggle {
                task: id.clone(),
                number: 2,
            },
            now,
        )
        .expect("toggle subtask");
        cmd_subtask(
            context(&mut store, &cfg, &mut renderer),
            SubtaskCommand::Delete {
                task: id.clone(),
                number: 1,
            },
            now,
        )
        .expect("delete subtask");
        for number in [0, 3] {
            assert!(
                cmd_subtask(
                    context(&mut store, &cfg, &mut renderer),
                    SubtaskCommand::Toggle {
                        task: id.clone(),
                        number,
                    },
                    now,
                )
                .is_err()
            );
        }

        let subtasks = store.list_subtasks(task.id).expect("list subtasks");
        let titles: Vec<&str> = subtasks.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["Buy boxes", "Label boxes"]);
        assert_eq!(SubtaskProgress::tally(&subtasks).to_string(), "1/2");
    }

    #[test]
    fn categories_link_by_name_and_count_tasks() {
        let temp = tempdir().expect("tempdir");
        let mut store = DataStore::open(temp.path()).expect("open datastore");
        let cfg = Config::default();
        let mut renderer = Renderer::new(&cfg, chrono_tz::UTC).expect("renderer");
        let now = Utc::now();

        cmd_category(
            context(&mut store, &cfg, &mut renderer),
            CategoryCommand::Add {
                name: "Garden".to_string(),
                color: "#22aa44".to_string(),
                icon: "🌱".to_string(),
            },
            now,
        )
        .expect("add category");

        dispatch(
            context(&mut store, &cfg, &mut renderer),
            Some(Command::Add {
                title: "  Mow lawn ".to_string(),
                due: Some("+1d".to_string()),
                priority: None,
                categories: vec!["garden".to_string(), "work".to_string()],
                recur: None,
                description: Some(" ".to_string()),
            }),
        )
        .expect("add task");
        assert!(
            dispatch(
                context(&mut store, &cfg, &mut renderer),
                Some(Command::Add {
                    title: "Prune".to_string(),
                    due: None,
                    priority: None,
                    categories: vec!["Orchard".to_string()],
                    recur: None,
                    description: None,
                }),
            )
            .is_err()
        );

        let tasks = store.list_tasks().expect("list");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Mow lawn");
        assert_eq!(tasks[0].description, None);
        let garden = store.resolve_category("Garden").expect("garden");
        let work = store.resolve_category("Work").expect("work");
        assert_eq!(tasks[0].category_ids, vec![garden.id, work.id]);

        let categories = store.list_categories().expect("categories");
        let counts: Vec<(String, usize)> = super::task_counts(&categories, &tasks)
            .into_iter()
            .map(|(c, n)| (c.name.clone(), n))
            .collect();
        assert_eq!(counts[0], ("Work".to_string(), 1));
        assert_eq!(counts[4], ("Garden".to_string(), 1));

        cmd_category(
            context(&mut store, &cfg, &mut renderer),
            CategoryCommand::Delete {
                name: "garden".to_string(),
            },
            now,
        )
        .expect("delete category");
        let after = store.list_tasks().expect("list");
        assert_eq!(after[0].category_ids, vec![work.id]);
    }
}
