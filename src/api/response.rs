// src/api/response.rs
//! JSON envelopes shared by every handler.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::EvalError;

pub const MAX_PAGE_LIMIT: usize = 100;
const DEFAULT_PAGE_LIMIT: usize = 100;

/// `{status: "success", message, data}`
pub fn success<T: Serialize>(status: StatusCode, message: &str, data: T) -> HttpResponse {
    HttpResponse::build(status).json(json!({
        "status": "success",
        "message": message,
        "data": data,
    }))
}

pub fn ok<T: Serialize>(message: &str, data: T) -> HttpResponse {
    success(StatusCode::OK, message, data)
}

#[derive(Deserialize, Debug, Default)]
pub struct Pagination {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    /// Returns `(skip, limit)` or a validation error.
    pub fn resolve(&self) -> Result<(usize, usize), EvalError> {
        let skip = self.skip.unwrap_or(0);
        if skip < 0 {
            return Err(EvalError::Validation("skip must be >= 0".to_string()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT as i64);
        if !(1..=MAX_PAGE_LIMIT as i64).contains(&limit) {
            return Err(EvalError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        Ok((skip as usize, limit as usize))
    }
}

impl ResponseError for EvalError {
    fn status_code(&self) -> StatusCode {
        match self {
            EvalError::NotFound { .. } => StatusCode::NOT_FOUND,
            EvalError::Validation(_) | EvalError::UnknownGrader(_) => StatusCode::BAD_REQUEST,
            EvalError::RunAlreadyStarted { .. } | EvalError::InvalidRunState { .. } => StatusCode::CONFLICT,
            EvalError::DispatcherClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            log::error!("Request failed: {}", self);
            match self {
                EvalError::DispatcherClosed => self.to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(json!({
            "status": "error",
            "message": message,
            "code": status.as_u16(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        let page = |skip, limit| Pagination { skip, limit }.resolve();
        assert_eq!(page(None, None).unwrap(), (0, 100));
        assert_eq!(page(Some(5), Some(1)).unwrap(), (5, 1));
        assert!(page(Some(-1), None).is_err());
        assert!(page(None, Some(0)).is_err());
        assert!(page(None, Some(101)).is_err());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(EvalError::not_found("TestCase", "x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(EvalError::UnknownGrader("nope".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            EvalError::RunAlreadyStarted { id: "r".into(), status: "running".into() }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EvalError::Config("bad".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
