// src/lib.rs
pub mod agent;
pub mod api;
pub mod banner;
pub mod config;
pub mod database;
pub mod dispatcher;
pub mod errors;
pub mod graders;
pub mod grading;
pub mod models;
pub mod repository;
pub mod runner;
