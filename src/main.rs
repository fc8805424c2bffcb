// src/main.rs
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use agent_eval::api::{configure_routes, AppState};
use agent_eval::{banner, config};
use std::io;

#[actix_web::main]
async fn main() -> io::Result<()> {
    banner::print_banner();

    if let Err(e) = dotenvy::dotenv() {
        eprintln!("⚠️  Warning: Could not load .env file: {}", e);
    }

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let app_config = config::AppConfig::from_env().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;
    let bind = (app_config.host.clone(), app_config.port);

    let state = AppState::new(app_config).await.map_err(|e| {
        log::error!("Failed to initialise application state: {}", e);
        io::Error::other(e.to_string())
    })?;

    log::info!(
        "Registered graders: {}",
        state
            .graders
            .list()
            .iter()
            .map(|g| g.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("🚀 Starting server on http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind(bind)?
    .run()
    .await
}
