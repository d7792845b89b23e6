use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{Response, StatusCode, header},
    routing::get,
};
use clap::Parser;
use rs_block_spider::{
    api::{
        EventsParams, handle_request,
        handlers::{ApiHttpResponse, get_block, get_events, get_key_value, get_state},
        storage::ApiStorage,
    },
    cli::Cli,
    config::AppConfig,
    utils::logger::init_logger_named,
};
use tokio::signal;
use tracing::{error, info};

#[derive(Clone)]
struct ApiState {
    storage: Arc<ApiStorage>,
}

async fn kv_handler(Path(key): Path<String>, State(state): State<ApiState>) -> Response<Body> {
    build_response(get_key_value(&key, &state.storage))
}

async fn state_handler(State(state): State<ApiState>) -> Response<Body> {
    build_response(get_state(&state.storage))
}

async fn block_handler(Path(number): Path<u64>, State(state): State<ApiState>) -> Response<Body> {
    build_response(get_block(number, &state.storage))
}

async fn events_handler(
    Query(params): Query<EventsParams>,
    State(state): State<ApiState>,
) -> Response<Body> {
    build_response(get_events(params.from, params.limit, &state.storage))
}

async fn fallback_handler(
    State(state): State<ApiState>,
    request: axum::http::Request<Body>,
) -> Response<Body> {
    build_response(handle_request(request.uri().path(), &state.storage))
}

fn build_response(api_response: ApiHttpResponse) -> Response<Body> {
    let mut response = Response::new(Body::from(api_response.body));
    *response.status_mut() =
        StatusCode::from_u16(api_response.status).unwrap_or_else(|err| {
            error!("Invalid response status {}: {err}", api_response.status);
            StatusCode::INTERNAL_SERVER_ERROR
        });
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(api_response.content_type),
    );
    response
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let mut config = AppConfig::load(&args.config)?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_logger_named(&config.logging, "api.log")?;

    let storage = Arc::new(ApiStorage::open_readonly(
        &config.storage.path,
        config.crawler.chain_name.clone(),
    )?);
    let state = ApiState { storage };

    let router = Router::new()
        .route("/state", get(state_handler))
        .route("/blocks/:number", get(block_handler))
        .route("/events", get(events_handler))
        .route("/kv/:key", get(kv_handler))
        .fallback(fallback_handler)
        .with_state(state);

    let listen_addr: SocketAddr = config.api.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("API service listening on {}", listener.local_addr()?);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async {
            if signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received, stopping API service");
            }
        })
        .await?;

    Ok(())
}
