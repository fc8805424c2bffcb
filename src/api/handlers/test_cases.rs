// src/api/handlers/test_cases.rs
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Result};

use crate::api::response::{self, Pagination};
use crate::api::AppState;
use crate::errors::EvalError;
use crate::models::{NewTestCase, TestCaseUpdate};

/// POST /api/test-cases
pub async fn create_test_case(
    state: web::Data<AppState>,
    req: web::Json<NewTestCase>,
) -> Result<HttpResponse> {
    let test_case = req.into_inner().into_test_case()?;
    state.repo.create_test_case(&test_case).await?;
    log::info!("Created test case {}", test_case.id);
    Ok(response::success(StatusCode::CREATED, "Test case created", test_case))
}

/// GET /api/test-cases?skip&limit
pub async fn list_test_cases(
    state: web::Data<AppState>,
    query: web::Query<Pagination>,
) -> Result<HttpResponse> {
    let (skip, limit) = query.resolve()?;
    let test_cases = state.repo.list_test_cases(skip, limit).await?;
    Ok(response::ok(
        &format!("Retrieved {} test cases", test_cases.len()),
        test_cases,
    ))
}

/// GET /api/test-cases/{id}
pub async fn get_test_case(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = path.into_inner();
    let test_case = state
        .repo
        .get_test_case(&id)
        .await?
        .ok_or_else(|| EvalError::not_found("TestCase", &id))?;
    Ok(response::ok("Test case retrieved", test_case))
}

/// PUT /api/test-cases/{id}
pub async fn update_test_case(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<TestCaseUpdate>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let update = req.into_inner();
    update.validate()?;
    let test_case = state
        .repo
        .update_test_case(&id, update)
        .await?
        .ok_or_else(|| EvalError::not_found("TestCase", &id))?;
    Ok(response::ok("Test case updated", test_case))
}

/// DELETE /api/test-cases/{id}
pub async fn delete_test_case(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = path.into_inner();
    if !state.repo.delete_test_case(&id).await? {
        return Err(EvalError::not_found("TestCase", &id).into());
    }
    log::info!("Deleted test case {}", id);
    Ok(response::ok("Test case deleted", serde_json::json!({ "id": id })))
}
