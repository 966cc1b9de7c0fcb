//! Request handlers and background services

pub mod collector;
pub mod usage_worker;

use actix_web::{web, Error, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, info};
use log_mdc;

use crate::app_state::AppState;
use crate::file::File;

fn file_response(file: &File, data: bytes::Bytes) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(file.kind.content_type())
        .body(data)
}

/// Serve `/h/{fileid}/{kwds}/{filename}`
pub async fn file_service(file_id: String, kwds: String, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    log_mdc::insert("file", &file_id);
    debug!("File request for {} with args {}", file_id, kwds);

    let server = &app_state.server;
    let file = server.authorize(&file_id, &kwds, Utc::now().timestamp()).await?;
    let data = server.deliver(&file)?;

    info!("Serving {} ({} bytes)", file, data.len());
    Ok(file_response(&file, data))
}

/// Serve `/p/{fileid}/{kwds}/{filename}`, a request relayed through this node
pub async fn proxy_service(file_id: String, kwds: String, req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    log_mdc::insert("file", &file_id);
    let origin = req.peer_addr().map(|addr| addr.ip());
    debug!("Proxy request for {} from {:?}", file_id, origin);

    let server = &app_state.server;
    let file = server
        .authorize_proxied(origin, &file_id, &kwds, Utc::now().timestamp())
        .await?;
    let data = server.deliver(&file)?;

    info!("Serving proxied {} ({} bytes) to {:?}", file, data.len(), origin);
    Ok(file_response(&file, data))
}

pub async fn status_service(app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let status = app_state.server.status()?;
    Ok(HttpResponse::Ok().json(status))
}
