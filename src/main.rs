use std::path::Path;

use actix_web::{middleware::Logger, web, App, HttpServer};
use log::info;

use chunk_depot::app_state::AppState;
use chunk_depot::handlers;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let state = AppState::new().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, format!("startup failed: {}", e))
    })?;

    init_logging(&state.config.logging.config_file);

    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    let workers = state.config.server.workers;
    let max_payload = state.config.server.max_payload_size;
    let data = web::Data::new(state);

    info!("Starting chunk-depot on {}:{}", host, port);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .app_data(web::PayloadConfig::new(max_payload))
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .workers(workers)
    .bind((host.as_str(), port))?
    .run()
    .await
}

fn init_logging(config_file: &str) {
    if Path::new(config_file).exists() {
        if log4rs::init_file(config_file, Default::default()).is_ok() {
            return;
        }
        eprintln!("Failed to initialize log4rs from {}", config_file);
    }
    env_logger::init();
}
