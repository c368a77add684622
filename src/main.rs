use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

mod auth;
mod balance;
mod config;
mod error;
mod ledger;
mod log;
mod money;
mod profile;
mod routes;
mod schemas;
mod settlement;
mod split;
mod store;

use config::Config;
use routes::AppState;
use store::{ExpenseStore, MemoryStore, MongoStore};

fn cors(origin: Option<&str>) -> Cors {
    match origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allow_any_method()
            .allow_any_header(),
        None => Cors::permissive(),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    log::init_logging();
    let config = Config::from_env()?;

    let store: Arc<dyn ExpenseStore> = match &config.mongodb_uri {
        Some(uri) => Arc::new(
            MongoStore::connect(uri, &config.database_name)
                .await
                .context("failed to connect")?,
        ),
        None => {
            warn!("MONGODB_URI is not set, keeping the ledger in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let state = web::Data::new(AppState {
        store,
        auth: config.auth.clone(),
    });

    info!(addr = %config.bind_addr, "starting server");
    let cors_origin = config.cors_origin.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(cors(cors_origin.as_deref()))
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(config.bind_addr.as_str())
    .with_context(|| format!("failed to bind {}", config.bind_addr))?
    .run()
    .await?;
    Ok(())
}
