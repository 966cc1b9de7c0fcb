use actix_web::{web, App, HttpServer};
use log::{error, info};
use log4rs;

use hath_cache::api;
use hath_cache::app_state::AppState;
use hath_cache::config::AppConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::load().map_err(|e| std::io::Error::other(e.to_string()))?;
    if let Err(e) = log4rs::init_file(&config.logging.config_file, Default::default()) {
        eprintln!("Failed to initialize logging from {}: {}", config.logging.config_file, e);
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let workers = config.server.workers.max(1);

    let app_state = AppState::from_config(config).map_err(|e| std::io::Error::other(e.to_string()))?;
    let server = app_state.server.clone();
    let data = web::Data::new(app_state);

    info!("Starting server on {}:{}", host, port);
    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(data.clone())
            .configure(api::configure)
    })
    .workers(workers)
    .bind((host.as_str(), port))?
    .run()
    .await?;

    // the HTTP server has stopped; flush pending usage before exiting
    match server.close().await {
        Ok(stats) => info!("Shutdown complete, {} usage events applied", stats.applied()),
        Err(e) => error!("Error during shutdown: {}", e),
    }
    Ok(())
}
