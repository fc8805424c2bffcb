// src/api/routes.rs
use actix_web::web;
use super::handlers;
use crate::errors::EvalError;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| EvalError::Validation(err.to_string()).into());
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| EvalError::Validation(err.to_string()).into());

    cfg.app_data(json_config)
        .app_data(query_config)
        .route("/health", web::get().to(handlers::health_check))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/test-cases")
                        .route("", web::post().to(handlers::create_test_case))
                        .route("", web::get().to(handlers::list_test_cases))
                        .route("/{id}", web::get().to(handlers::get_test_case))
                        .route("/{id}", web::put().to(handlers::update_test_case))
                        .route("/{id}", web::delete().to(handlers::delete_test_case)),
                )
                .service(
                    web::scope("/evaluations")
                        .route("", web::post().to(handlers::create_evaluation))
                        .route("", web::get().to(handlers::list_evaluations))
                        .route("/{id}", web::get().to(handlers::get_evaluation))
                        .route("/{id}/results", web::get().to(handlers::get_evaluation_results))
                        .route("/{id}/grading", web::get().to(handlers::get_grading_summary))
                        .route("/{id}/grade", web::post().to(handlers::regrade_evaluation)),
                )
                .service(
                    web::scope("/graders")
                        .route("", web::get().to(handlers::list_graders))
                        .route("/{id}", web::get().to(handlers::get_grader)),
                ),
        );
}
