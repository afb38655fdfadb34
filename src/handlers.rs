use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::info;

use crate::db::{get_record, put_record};
use crate::error::AppError;
use crate::middleware::Subject;
use crate::models::{SaveTodosRequest, TodoRecord};
use crate::AppState;

pub async fn get_todos(
    Subject(subject): Subject,
    State(state): State<AppState>,
) -> Result<Json<TodoRecord>, AppError> {
    match get_record(&state.db, &subject)? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound("No todo list found")),
    }
}

pub async fn put_todos(
    Subject(subject): Subject,
    State(state): State<AppState>,
    body: Result<Json<SaveTodosRequest>, JsonRejection>,
) -> Result<Json<TodoRecord>, AppError> {
    let Json(req) = body.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let record = put_record(&state.db, &subject, &req.todo_list)?;
    info!(count = record.todo_list.len(), "Saved todo list");
    Ok(Json(record))
}
