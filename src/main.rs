// src/main.rs

use std::process;
use std::sync::Arc;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{http, middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info};
use mongodb::bson::doc;

use skillswap_projects::app_state::AppState;
use skillswap_projects::auth::Authentication;
use skillswap_projects::config::Config;
use skillswap_projects::db::MongoDB;
use skillswap_projects::fanout::FanoutServer;
use skillswap_projects::project;
use skillswap_projects::service::ProjectService;
use skillswap_projects::store::MongoProjectStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let mongodb = match MongoDB::init(&config.mongo_uri, &config.database_name).await {
        Ok(mongodb) => mongodb,
        Err(e) => {
            error!("Failed to connect to MongoDB: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = mongodb
        .client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
    {
        error!("MongoDB ping failed: {}", e);
        process::exit(1);
    }
    info!("Connected to MongoDB database '{}'", config.database_name);

    let fanout = FanoutServer::new().start();
    let projects = Arc::new(ProjectService::new(
        Arc::new(MongoProjectStore::new(&mongodb)),
        Arc::new(fanout.clone()),
        config.commit_attempts,
        config.offer_policy,
    ));
    let state = AppState { fanout, projects };

    info!("Server running at http://{}", config.bind_address);
    info!("Allowed CORS Origin: {}", config.frontend_origin);
    info!(
        "Commit attempts: {}, offer policy: {:?}",
        config.commit_attempts, config.offer_policy
    );

    let frontend_origin = config.frontend_origin.clone();
    let jwt_secret = config.jwt_secret.clone();

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication::new(jwt_secret.clone()))
            .app_data(web::Data::new(state.clone()))
            .configure(project::configure)
    })
    .bind(config.bind_address.as_str())?
    .run()
    .await
}
