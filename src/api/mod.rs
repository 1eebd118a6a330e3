//! HTTP API driving the bridge: view, selectors and the primary action

use crate::config::ApiConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{NetworkKind, Registry};
use crate::transfer::{BridgeView, Orchestrator};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<Registry>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Build the router with middleware
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/state", get(get_state))
        .route("/chains", get(get_chains))
        .route("/tokens", get(get_tokens))
        .route("/connect", post(connect))
        .route("/network", post(switch_network))
        .route("/source", post(select_source))
        .route("/destination", post(select_destination))
        .route("/token", post(select_token))
        .route("/amount", post(set_amount))
        .route("/amount/max", post(set_max))
        .route("/swap", post(swap))
        .route("/action", post(primary_action))
        .route("/deploy", post(deploy))
        .route("/refresh", post(refresh))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> BridgeResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| BridgeError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

fn status_for(e: &BridgeError) -> StatusCode {
    match e {
        BridgeError::UnknownNetwork { .. } | BridgeError::UnknownToken(_) => StatusCode::NOT_FOUND,
        BridgeError::InvalidAmount(_) | BridgeError::BelowMinimumAmount { .. } => {
            StatusCode::BAD_REQUEST
        }
        BridgeError::Busy { .. }
        | BridgeError::NoQuote
        | BridgeError::StaleQuote
        | BridgeError::NotConnected
        | BridgeError::TokenNotSupported { .. }
        | BridgeError::ContractNotDeployed { .. } => StatusCode::CONFLICT,
        BridgeError::NoWalletFound => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::UserRejected => StatusCode::FORBIDDEN,
        BridgeError::Config(_) | BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn api_error(e: BridgeError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&e);
    if status.is_server_error() {
        warn!("Request failed: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// Run `result`, then answer with the updated view
async fn respond(state: &AppState, result: BridgeResult<()>) -> ApiResult<BridgeView> {
    result.map_err(api_error)?;
    Ok(Json(state.orchestrator.view().await))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_state(State(state): State<AppState>) -> Json<BridgeView> {
    Json(state.orchestrator.view().await)
}

async fn get_chains(State(state): State<AppState>) -> Json<ChainsResponse> {
    let chains = state
        .registry
        .networks()
        .iter()
        .map(|n| ChainInfo {
            chain_id: n.chain_id,
            lz_chain_id: n.lz_chain_id,
            name: n.name.to_string(),
            symbol: n.symbol.to_string(),
            testnet: n.kind == NetworkKind::Testnet,
        })
        .collect();
    Json(ChainsResponse { chains })
}

async fn get_tokens(State(state): State<AppState>) -> Json<TokensResponse> {
    let tokens = state
        .registry
        .tokens()
        .iter()
        .map(|t| TokenInfo {
            symbol: t.symbol.clone(),
            name: t.name.clone(),
            decimals: t.decimals,
            is_native: t.is_native,
        })
        .collect();
    Json(TokensResponse { tokens })
}

async fn connect(State(state): State<AppState>) -> ApiResult<BridgeView> {
    let result = state.orchestrator.connect().await;
    respond(&state, result).await
}

async fn switch_network(
    State(state): State<AppState>,
    Json(request): Json<ChainRequest>,
) -> ApiResult<BridgeView> {
    let result = state.orchestrator.switch_network(request.chain_id).await;
    respond(&state, result).await
}

async fn select_source(
    State(state): State<AppState>,
    Json(request): Json<ChainRequest>,
) -> ApiResult<BridgeView> {
    let result = state.orchestrator.select_source(request.chain_id).await;
    respond(&state, result).await
}

async fn select_destination(
    State(state): State<AppState>,
    Json(request): Json<ChainRequest>,
) -> ApiResult<BridgeView> {
    let result = state.orchestrator.select_destination(request.chain_id).await;
    respond(&state, result).await
}

async fn select_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> ApiResult<BridgeView> {
    let result = state.orchestrator.select_token(&request.symbol).await;
    respond(&state, result).await
}

async fn set_amount(
    State(state): State<AppState>,
    Json(request): Json<AmountRequest>,
) -> ApiResult<BridgeView> {
    let result = state.orchestrator.set_amount(&request.amount).await;
    respond(&state, result).await
}

async fn set_max(State(state): State<AppState>) -> ApiResult<BridgeView> {
    let result = state.orchestrator.set_max().await;
    respond(&state, result).await
}

async fn swap(State(state): State<AppState>) -> ApiResult<BridgeView> {
    let result = state.orchestrator.swap_chains().await;
    respond(&state, result).await
}

async fn primary_action(State(state): State<AppState>) -> ApiResult<BridgeView> {
    let result = state.orchestrator.primary_action().await;
    respond(&state, result).await
}

async fn deploy(State(state): State<AppState>) -> ApiResult<BridgeView> {
    let result = state.orchestrator.deploy().await;
    respond(&state, result).await
}

async fn refresh(State(state): State<AppState>) -> ApiResult<BridgeView> {
    let result = state.orchestrator.refresh().await;
    respond(&state, result).await
}

// Request and response types

#[derive(Deserialize)]
struct ChainRequest {
    chain_id: u64,
}

#[derive(Deserialize)]
struct TokenRequest {
    symbol: String,
}

#[derive(Deserialize)]
struct AmountRequest {
    amount: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ChainInfo {
    chain_id: u64,
    lz_chain_id: u16,
    name: String,
    symbol: String,
    testnet: bool,
}

#[derive(Serialize)]
struct ChainsResponse {
    chains: Vec<ChainInfo>,
}

#[derive(Serialize)]
struct TokenInfo {
    symbol: String,
    name: String,
    decimals: u32,
    is_native: bool,
}

#[derive(Serialize)]
struct TokensResponse {
    tokens: Vec<TokenInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainGateway;
    use crate::config::{BridgeConfig, DeployConfig};
    use crate::session::SessionManager;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let registry = Arc::new(Registry::builtin());
        let orchestrator = Orchestrator::new(
            SessionManager::new(None),
            Arc::new(MockChainGateway::new()),
            registry.clone(),
            BridgeConfig::default(),
            DeployConfig::default(),
        );
        router(AppState {
            orchestrator: Arc::new(orchestrator),
            registry,
        })
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_state_starts_disconnected() {
        let (status, body) = call(app(), "GET", "/state", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"]["label"], "Connect Wallet");
        assert_eq!(body["intent"]["source"], 5);
        assert_eq!(body["intent"]["destination"], 1);
        assert_eq!(body["state"], "idle");
    }

    #[tokio::test]
    async fn test_chains_and_tokens_listed() {
        let (_, chains) = call(app(), "GET", "/chains", None).await;
        assert_eq!(chains["chains"].as_array().unwrap().len(), 9);
        assert_eq!(chains["chains"][0]["lz_chain_id"], 101);

        let (_, tokens) = call(app(), "GET", "/tokens", None).await;
        let symbols: Vec<&str> = tokens["tokens"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["symbol"].as_str())
            .collect();
        assert_eq!(symbols, vec!["ETH", "METH"]);
    }

    #[tokio::test]
    async fn test_connect_without_wallet_is_unavailable() {
        let (status, body) = call(app(), "POST", "/connect", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "No crypto wallet found.");
    }

    #[tokio::test]
    async fn test_selectors_update_the_view() {
        let app = app();

        let (status, body) = call(app.clone(), "POST", "/swap", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["intent"]["source"], 1);
        assert_eq!(body["intent"]["destination"], 5);

        let (_, body) = call(
            app.clone(),
            "POST",
            "/token",
            Some(serde_json::json!({ "symbol": "METH" })),
        )
        .await;
        assert_eq!(body["intent"]["token"], "METH");

        let (status, body) = call(
            app,
            "POST",
            "/destination",
            Some(serde_json::json!({ "chain_id": 424242 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("424242"));
    }

    #[tokio::test]
    async fn test_invalid_amount_is_bad_request() {
        let (status, _) = call(
            app(),
            "POST",
            "/amount",
            Some(serde_json::json!({ "amount": "1.2.3" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
