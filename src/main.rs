//! VoiceLink billing server
//!
//! Rate lookup, wallet ledger, call admission and provider-driven settlement
//! behind an actix-web API.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voicelink_api::{configure_routes, AppState};
use voicelink_auth::JwtService;
use voicelink_cache::{MemoryCache, RedisCache};
use voicelink_core::traits::CacheService;
use voicelink_core::AppConfig;
use voicelink_db::{
    create_pool, run_migrations, seed_default_rates, PgCallRecordRepository, PgRateRepository,
    PgUserRepository,
};
use voicelink_telephony::{CallbackValidator, TwilioClient};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "voicelink_billing={lvl},voicelink_api={lvl},voicelink_services={lvl},\
             voicelink_db={lvl},voicelink_telephony={lvl},actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

async fn connect_cache(url: &str) -> Arc<dyn CacheService> {
    let redis = match RedisCache::new(url).await {
        Ok(cache) => cache.ping().await.map(|_| cache),
        Err(e) => Err(e),
    };
    match redis {
        Ok(cache) => {
            info!("Redis cache connected");
            Arc::new(cache)
        }
        Err(e) => {
            warn!("Redis unavailable ({}), falling back to in-process rate cache", e);
            Arc::new(MemoryCache::new())
        }
    }
}

fn cors(origins: &str) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
        ])
        .max_age(3600);

    if origins.trim() == "*" {
        return cors.allow_any_origin();
    }

    let allowed: Vec<String> = origins
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    cors.allowed_origin_fn(move |origin, _req_head| {
        origin
            .to_str()
            .map(|origin| allowed.iter().any(|o| o == origin))
            .unwrap_or(false)
    })
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting VoiceLink billing v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("Failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let users = Arc::new(PgUserRepository::new(pool.clone()));
    let rate_repo = Arc::new(PgRateRepository::new(pool.clone()));
    let calls = Arc::new(PgCallRecordRepository::new(pool.clone()));

    if config.billing.seed_default_rates {
        let seeded = seed_default_rates(rate_repo.as_ref())
            .await
            .context("Failed to seed default call rates")?;
        if seeded == 0 {
            info!("Rate table already populated, skipping seed");
        }
    }

    let cache = connect_cache(&config.redis.url).await;
    let provider = Arc::new(
        TwilioClient::new(&config.telephony).context("Failed to configure telephony provider")?,
    );
    if config.telephony.status_callback_url.is_empty() {
        warn!("telephony.status_callback_url is not set; PSTN calls will never settle");
    }

    let mut state = AppState::new(
        users,
        rate_repo,
        calls,
        cache,
        provider,
        config.billing.clone(),
    );
    if config.telephony.validate_callback_signatures {
        let validator = CallbackValidator::new(&config.telephony)
            .context("Failed to configure status callback validation")?;
        state = state.with_callback_validator(validator);
    } else {
        warn!("Status callback signatures are not checked; anyone can settle calls");
    }

    let jwt_service = Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.jwt_expiration_minutes * 60,
    ));
    info!(
        "JWT service configured with {} second token expiration",
        jwt_service.expiration_secs()
    );

    let bind_addr = config.server_addr();
    let workers = config.server.workers.max(1);
    let cors_origins = config.server.cors_origins.clone();
    info!("Starting HTTP server on {} with {} workers", bind_addr, workers);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(jwt_service.clone()))
            .app_data(web::JsonConfig::default().limit(64 * 1024))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "message": error_message,
                        "status": 400
                    })),
                )
                .into()
            }))
            .wrap(cors(&cors_origins))
            .wrap(TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            .service(web::scope("/api/v1").configure(configure_routes))
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await
    .context("HTTP server terminated with an error")?;

    Ok(())
}
