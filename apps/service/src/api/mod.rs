//! Read-only admin API over the engine state

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use tracing::info;

use crate::config::ApiConfig;
use crate::engine::Engine;
use crate::error::ApiError;
use crate::healthcheck::join_host_port;

/// Bind the admin API. The returned server must be polled to serve
/// requests and is stopped through its handle, OS signals are left to the
/// caller.
pub fn serve(config: &ApiConfig, engine: Arc<Engine>) -> Result<Server, ApiError> {
    let addr: SocketAddr = join_host_port(&config.host, config.port).parse()?;
    let data = web::Data::from(engine);

    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::routes))
        .workers(1)
        .disable_signals()
        .bind(addr)
        .map_err(ApiError::Bind)?
        .run();

    info!(%addr, "Admin API listening");
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;

    #[actix_web::test]
    async fn test_serve_rejects_hostname() {
        let engine = Arc::new(Engine::new(EngineSettings::default()));
        let config = ApiConfig { host: "localhost".into(), ..ApiConfig::default() };

        assert!(matches!(serve(&config, engine.clone()), Err(ApiError::Address(_))));
        engine.shutdown().await;
    }
}
