use actix_web::{HttpResponse, Responder, get, web};
use serde_json::json;

use crate::engine::Engine;
use crate::healthcheck::CheckResult;

macros_utils::routes! {
    route health_route,
    route list_results,
    route get_result,
    route list_checks,
}

/// Liveness of the daemon itself.
/// This route returns no content, the response status is enough.
#[get("/health")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok()
}

/// Last known result of every check
#[get("/result")]
pub async fn list_results(engine: web::Data<Engine>) -> impl Responder {
    let results = engine.store().list();
    let body: Vec<&CheckResult> = results.iter().map(AsRef::as_ref).collect();
    HttpResponse::Ok().json(body)
}

#[get("/result/{name}")]
pub async fn get_result(engine: web::Data<Engine>, name: web::Path<String>) -> impl Responder {
    match engine.store().get(&name) {
        Some(result) => HttpResponse::Ok().json(result.as_ref()),
        None => HttpResponse::NotFound().json(json!({ "message": format!("No result for {}", name.as_str()) })),
    }
}

/// Configuration of every scheduled check
#[get("/healthcheck")]
pub async fn list_checks(engine: web::Data<Engine>) -> impl Responder {
    HttpResponse::Ok().json(engine.list_checks().await)
}
