//! Chat rendering for task lists, task details and selection keyboards.

use crate::channel::InlineButton;
use crate::watch::{AssigneeDirectory, ColumnDirectory};
use crate::weeek::{Board, Column, ColumnId, Project, ProjectId, Task};

/// Project picker: one button per project, two per row.
pub fn project_buttons(projects: &[Project]) -> Vec<Vec<InlineButton>> {
    projects
        .chunks(2)
        .map(|row| {
            row.iter()
                .map(|p| InlineButton::new(display_or_id(&p.name, p.id), format!("project:{}", p.id)))
                .collect()
        })
        .collect()
}

/// Board picker for one project: one button per row.
pub fn board_buttons(project_id: ProjectId, boards: &[Board]) -> Vec<Vec<InlineButton>> {
    boards
        .iter()
        .map(|b| {
            vec![InlineButton::new(
                display_or_id(&b.name, b.id),
                format!("board:{project_id}:{}", b.id),
            )]
        })
        .collect()
}

/// Column picker for the task list: one button per column, then "All columns".
pub fn column_buttons(columns: &[Column]) -> Vec<Vec<InlineButton>> {
    columns
        .iter()
        .map(|c| {
            vec![InlineButton::new(
                display_or_id(&c.name, c.id),
                format!("tasks:{}", c.id),
            )]
        })
        .chain(std::iter::once(vec![InlineButton::new("All columns", "tasks:all")]))
        .collect()
}

fn display_or_id(name: &str, id: i64) -> String {
    if name.trim().is_empty() {
        format!("#{id}")
    } else {
        name.to_owned()
    }
}

/// Keep the tasks in `column` (all when `None`), newest first, and cut out
/// page `page` (1-based). Returns the page and whether more follow.
pub fn paginate(
    mut tasks: Vec<Task>,
    column: Option<ColumnId>,
    page: u32,
    per_page: u32,
) -> (Vec<Task>, bool) {
    if let Some(column) = column {
        tasks.retain(|t| t.column_id == Some(column));
    }
    // ISO-8601 strings sort chronologically; tasks without a date go last.
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let per_page = per_page as usize;
    let start = (page.saturating_sub(1) as usize)
        .saturating_mul(per_page)
        .min(tasks.len());
    let end = start.saturating_add(per_page).min(tasks.len());
    let has_more = end < tasks.len();
    (tasks.drain(start..end).collect(), has_more)
}

/// One page of the task list, as cut by [`paginate`]. `page` is 1-based;
/// the navigation buttons keep the `column` filter.
pub fn task_page(
    board_name: &str,
    tasks: &[Task],
    columns: &ColumnDirectory,
    column: Option<ColumnId>,
    page: u32,
    has_more: bool,
) -> (String, Vec<Vec<InlineButton>>) {
    let mut text = match column {
        Some(_) => format!("📋 {board_name} · {} · page {page}\n", columns.name(column)),
        None => format!("📋 {board_name} · page {page}\n"),
    };
    if tasks.is_empty() {
        text.push_str("\nNo tasks here.");
    }
    let mut buttons: Vec<Vec<InlineButton>> = Vec::new();
    for task in tasks {
        text.push_str(&format!(
            "\n📌 {}\n📂 {} · {}\n",
            task.title,
            columns.name(task.column_id),
            status(task)
        ));
        buttons.push(vec![InlineButton::new(
            truncate(&task.title, 40),
            format!("task:{}", task.id),
        )]);
    }

    let page_data = |page: u32| match column {
        Some(column) => format!("page:{page}:{column}"),
        None => format!("page:{page}"),
    };
    let mut nav = Vec::new();
    if page > 1 {
        nav.push(InlineButton::new("⬅ Back", page_data(page - 1)));
    }
    if has_more {
        nav.push(InlineButton::new("Next ➡", page_data(page + 1)));
    }
    if !nav.is_empty() {
        buttons.push(nav);
    }
    (text, buttons)
}

/// Full task card.
pub fn task_details(
    task: &Task,
    columns: &ColumnDirectory,
    assignees: &AssigneeDirectory,
    workspace_id: Option<&str>,
) -> String {
    let description = task
        .description
        .as_deref()
        .map(strip_html)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| "—".to_owned());
    let ids = task.assignees.iter().cloned().collect();

    let mut text = format!(
        "📌 {}\n📝 {}\n📂 Column: {}\n👤 {}\n📅 Due: {}\n🏷 Type: {}\n⚡ Status: {}",
        task.title,
        description,
        columns.name(task.column_id),
        assignees.render(&ids),
        task.due_date.as_deref().unwrap_or("no deadline"),
        task.kind.as_deref().unwrap_or("not set"),
        status(task),
    );
    if let Some(ws) = workspace_id {
        text.push_str(&format!("\n🔗 https://app.weeek.net/ws/{ws}/task/{}", task.id));
    }
    text
}

fn status(task: &Task) -> &'static str {
    if task.deleted {
        "deleted"
    } else if task.completed {
        "completed"
    } else {
        "active"
    }
}

/// Drop HTML tags, decode the common entities and trim blank lines.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut tag = String::new();
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                if matches!(name.as_str(), "br" | "p" | "div" | "li" | "tr") {
                    out.push('\n');
                }
            }
            _ if in_tag => tag.push(c),
            _ => out.push(c),
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    let cut: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}…")
}
