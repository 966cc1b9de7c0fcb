//! HTTP routes of the cache node

use actix_web::{get, web, Error, HttpRequest, HttpResponse};

use crate::app_state::AppState;
use crate::service::{file_service, proxy_service, status_service};

/// image file request: /h/<fileid>/<additional:kwds>/<filename>
#[get("/h/{fileid}/{kwds}/{filename}")]
pub async fn get_file(path: web::Path<(String, String, String)>, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let (file_id, kwds, _filename) = path.into_inner();
    file_service(file_id, kwds, app_state).await
}

/// proxied file request: /p/<fileid>/<additional:kwds>/<filename>
#[get("/p/{fileid}/{kwds}/{filename}")]
pub async fn get_proxied_file(path: web::Path<(String, String, String)>, req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let (file_id, kwds, _filename) = path.into_inner();
    proxy_service(file_id, kwds, req, app_state).await
}

#[get("/status")]
pub async fn status(app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    status_service(app_state).await
}

/// Register every route of the node
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_file)
        .service(get_proxied_file)
        .service(status);
}
