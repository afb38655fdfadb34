use rand::Rng;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Incomplete,
    Complete,
}

/// A timestamped note on a task. Comments carry no id; they are addressed by
/// their position in the task's comment list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Task {
            id: generate_task_id(),
            title: title.into(),
            status: TaskStatus::Incomplete,
            time: now_rfc3339(),
            comments: None,
        }
    }
}

/// The stored record for one subject: the whole list plus server timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoRecord {
    pub id: String,
    #[serde(rename = "todoList", default)]
    pub todo_list: Vec<Task>,
    pub created_at: String,
    pub updated: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveTodosRequest {
    #[serde(rename = "todoList")]
    pub todo_list: Vec<Task>,
}

pub fn generate_task_id() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..21)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("formatting current timestamp")
}

/// Renders a task or comment timestamp for display. Unparseable input
/// degrades to a literal marker instead of failing the render.
pub fn format_time(time: &str) -> String {
    let fmt = format_description!(
        "[hour repr:12 padding:none]:[minute] [period], [month]/[day]/[year]"
    );
    OffsetDateTime::parse(time, &Rfc3339)
        .ok()
        .and_then(|parsed| parsed.format(&fmt).ok())
        .unwrap_or_else(|| "Invalid date".to_string())
}
