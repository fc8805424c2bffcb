// src/api/handlers/health.rs
use actix_web::{web, HttpResponse, Result};
use serde_json::json;

use crate::api::AppState;

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let storage = match state.config.storage {
        crate::config::StorageConfig::Memory => "memory",
        crate::config::StorageConfig::Sqlite { .. } => "sqlite",
    };
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "agent-eval",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": storage,
    })))
}
