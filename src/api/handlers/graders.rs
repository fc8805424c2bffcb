// src/api/handlers/graders.rs
use actix_web::{web, HttpResponse, Result};

use crate::api::response;
use crate::api::AppState;
use crate::errors::EvalError;

/// GET /api/graders
pub async fn list_graders(state: web::Data<AppState>) -> Result<HttpResponse> {
    let graders = state.graders.list();
    Ok(response::ok(&format!("Retrieved {} graders", graders.len()), graders))
}

/// GET /api/graders/{id}
pub async fn get_grader(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = path.into_inner();
    let info = state
        .graders
        .get(&id)
        .ok_or_else(|| EvalError::not_found("Grader", &id))?;
    Ok(response::ok("Grader retrieved", info))
}
