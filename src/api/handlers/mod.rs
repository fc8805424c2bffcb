// src/api/handlers/mod.rs
mod evaluations;
mod graders;
mod health;
mod test_cases;

pub use evaluations::{
    create_evaluation, get_evaluation, get_evaluation_results, get_grading_summary, list_evaluations,
    regrade_evaluation,
};
pub use graders::{get_grader, list_graders};
pub use health::health_check;
pub use test_cases::{create_test_case, delete_test_case, get_test_case, list_test_cases, update_test_case};
