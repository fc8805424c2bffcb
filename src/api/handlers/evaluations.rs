// src/api/handlers/evaluations.rs
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Result};
use serde::Serialize;

use crate::api::response::{self, Pagination};
use crate::api::AppState;
use crate::errors::EvalError;
use crate::models::{EvaluationResult, NewRun, ResponseStatus, RunStatus, Score};

#[derive(Serialize)]
pub struct ResultWithScores {
    #[serde(flatten)]
    pub result: EvaluationResult,
    pub scores: Vec<Score>,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct ResultsSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub timeout: usize,
    pub avg_latency_ms: Option<f64>,
}

impl ResultsSummary {
    pub fn from_results(results: &[EvaluationResult]) -> Self {
        let count = |status: ResponseStatus| results.iter().filter(|r| r.response_status == status).count();
        let latencies: Vec<u64> = results
            .iter()
            .filter(|r| r.response_status == ResponseStatus::Success)
            .filter_map(|r| r.response_latency_ms)
            .collect();
        let avg_latency_ms = if latencies.is_empty() {
            None
        } else {
            let avg = latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;
            Some((avg * 100.0).round() / 100.0)
        };

        Self {
            total: results.len(),
            successful: count(ResponseStatus::Success),
            failed: count(ResponseStatus::Error),
            timeout: count(ResponseStatus::Timeout),
            avg_latency_ms,
        }
    }
}

/// POST /api/evaluations - validate, store as pending, and hand off to the dispatcher
pub async fn create_evaluation(
    state: web::Data<AppState>,
    req: web::Json<NewRun>,
) -> Result<HttpResponse> {
    let run = state.runner.submit(req.into_inner()).await?;
    state.dispatcher.submit(&run.id)?;
    Ok(response::success(
        StatusCode::CREATED,
        "Evaluation run created and queued",
        run,
    ))
}

/// GET /api/evaluations?skip&limit
pub async fn list_evaluations(
    state: web::Data<AppState>,
    query: web::Query<Pagination>,
) -> Result<HttpResponse> {
    let (skip, limit) = query.resolve()?;
    let runs = state.runner.list_runs(skip, limit).await?;
    Ok(response::ok(&format!("Retrieved {} evaluation runs", runs.len()), runs))
}

/// GET /api/evaluations/{id}
pub async fn get_evaluation(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let run = state.runner.get_run(&path.into_inner()).await?;
    Ok(response::ok("Evaluation run retrieved", run))
}

/// GET /api/evaluations/{id}/results
pub async fn get_evaluation_results(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let run_id = path.into_inner();
    let results = state.runner.list_results(&run_id).await?;
    let summary = ResultsSummary::from_results(&results);

    let mut with_scores = Vec::with_capacity(results.len());
    for result in results {
        let scores = state.repo.list_scores(&result.id).await?;
        with_scores.push(ResultWithScores { result, scores });
    }

    Ok(response::ok(
        &format!("Retrieved {} results", with_scores.len()),
        serde_json::json!({
            "run_id": run_id,
            "results": with_scores,
            "summary": summary,
        }),
    ))
}

/// GET /api/evaluations/{id}/grading
pub async fn get_grading_summary(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let run_id = path.into_inner();
    state.runner.get_run(&run_id).await?;
    let summary = state.runner.grading().summarize(&run_id).await?;
    Ok(response::ok("Grading summary retrieved", summary))
}

/// POST /api/evaluations/{id}/grade - re-run grading over a completed run
pub async fn regrade_evaluation(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let run_id = path.into_inner();
    let run = state.runner.get_run(&run_id).await?;
    if run.status != RunStatus::Completed {
        return Err(EvalError::InvalidRunState {
            id: run_id,
            status: run.status.to_string(),
            expected: "completed",
        }
        .into());
    }

    let metrics = state.runner.grading().grade_run(&run_id).await?;
    log::info!(
        "Re-graded run {}: {} scores stored, {} failed",
        run_id,
        metrics.successful_scores,
        metrics.failed_scores
    );
    Ok(response::ok("Grading complete", metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: ResponseStatus, latency: Option<u64>) -> EvaluationResult {
        EvaluationResult::new("run", "tc", None, latency, status, None)
    }

    #[test]
    fn test_summary_averages_successful_latencies_only() {
        let results = vec![
            result(ResponseStatus::Success, Some(100)),
            result(ResponseStatus::Success, Some(201)),
            result(ResponseStatus::Success, Some(200)),
            result(ResponseStatus::Timeout, Some(30_000)),
            result(ResponseStatus::Error, Some(5)),
        ];
        let summary = ResultsSummary::from_results(&results);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.timeout, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.avg_latency_ms, Some(167.0));
    }

    #[test]
    fn test_summary_of_no_results() {
        let summary = ResultsSummary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.avg_latency_ms, None);
    }
}
