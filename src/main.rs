use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use chat_relay_service::{
    config::Config, db, error::AppError, logging, routes, state::AppState, storage::Storage,
};
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    let cfg = Config::from_env()?;
    logging::init_tracing(cfg.log_format);

    let storage = match cfg.database_url.as_deref() {
        Some(url) => {
            let pool = db::init_pool(url)
                .await
                .map_err(|e| AppError::StartServer(format!("db: {e}")))?;
            tracing::info!("using Postgres storage");
            Storage::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage; data is lost on restart");
            Storage::memory()
        }
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let cors_origin = cfg.cors_origin.clone();
    let state = web::Data::new(AppState::new(cfg, storage));

    tracing::info!(
        %bind_addr,
        require_friendship = state.config.require_friendship,
        "starting chat-relay-service"
    );

    HttpServer::new(move || {
        let cors = match cors_origin.as_deref() {
            Some(origin) => Cors::default().allowed_origin(origin),
            None => Cors::default().allow_any_origin(),
        }
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(format!("server: {e}")))
}
