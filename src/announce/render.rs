//! Text the distributor writes into the platform: channel names, the post
//! body's task table and the teaser that carries announcement metadata.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use super::Task;

const PLACEHOLDER: &str = "—";
const CELL: &str = "border:1px solid #e5e7eb; padding:12px;";

/// `"<department> - M/D/YYYY"`
pub fn channel_name(department: &str, today: NaiveDate) -> String {
    format!(
        "{} - {}/{}/{}",
        department,
        today.month(),
        today.day(),
        today.year()
    )
}

/// Earliest due date across tasks, if any task has one.
pub fn earliest_due_date(tasks: &[Task]) -> Option<NaiveDate> {
    tasks.iter().filter_map(|task| task.due_date).min()
}

/// `"Category: X; Stores: N; DueDate: YYYY-MM-DD"`, with an empty due date when
/// no task carries one.
pub fn build_teaser(department: &str, store_count: usize, due: Option<NaiveDate>) -> String {
    format!(
        "Category: {}; Stores: {}; DueDate: {}",
        department,
        store_count,
        due.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    )
}

/// The raw `DueDate:` token of a teaser; absent when missing or blank.
pub fn teaser_due_date(teaser: &str) -> Option<String> {
    static DUE_DATE: OnceLock<Regex> = OnceLock::new();
    let pattern = DUE_DATE
        .get_or_init(|| Regex::new(r"(?i)DueDate:\s*([^;]*)").expect("due date pattern compiles"));

    let value = pattern.captures(teaser)?.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Post body: the title as a heading, then the task table when there are tasks.
pub fn post_content(title: &str, tasks: &[Task]) -> String {
    format!("<h2>{}</h2><hr>{}", escape_html(title), task_table(tasks))
}

pub fn task_table(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return String::new();
    }

    let mut html = String::from("\n<h3>📋 Action Items</h3>\n");
    html.push_str(
        "<table style=\"width:100%; border-collapse:collapse; margin:16px 0; font-size:14px;\">\n",
    );
    html.push_str("  <thead>\n    <tr style=\"background:#f3f4f6;\">\n");
    for heading in ["#", "Task", "Description", "Due Date"] {
        html.push_str(&format!(
            "      <th style=\"{} text-align:left; font-weight:600;\">{}</th>\n",
            CELL, heading
        ));
    }
    html.push_str("    </tr>\n  </thead>\n  <tbody>\n");

    for (index, task) in tasks.iter().enumerate() {
        let description = task
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(escape_html)
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        let due = task
            .due_date
            .map(table_date)
            .unwrap_or_else(|| PLACEHOLDER.to_string());

        html.push_str("    <tr>\n");
        html.push_str(&format!(
            "      <td style=\"{} text-align:center; font-weight:600; color:#FF6900;\">{}</td>\n",
            CELL,
            index + 1
        ));
        html.push_str(&format!(
            "      <td style=\"{} font-weight:500;\">{}</td>\n",
            CELL,
            escape_html(&task.title)
        ));
        html.push_str(&format!(
            "      <td style=\"{} color:#6b7280;\">{}</td>\n",
            CELL, description
        ));
        html.push_str(&format!(
            "      <td style=\"{} white-space:nowrap;\">{}</td>\n",
            CELL, due
        ));
        html.push_str("    </tr>\n");
    }

    html.push_str("  </tbody>\n</table>");
    html
}

/// `Mon D, YYYY`
fn table_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
