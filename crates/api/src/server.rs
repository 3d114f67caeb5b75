use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use stockpilot_core::domain::contract::normalize_symbol;

use crate::protocol::{
    CallToolParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, JSONRPC_VERSION,
};
use crate::tools::{definitions, AppState};

/// Handles one JSON-RPC message. `None` means nothing goes back on the wire.
pub async fn handle_message(state: &AppState, raw: &str) -> Option<JsonRpcResponse> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return Some(JsonRpcResponse::failure(None, JsonRpcError::parse_error(e))),
    };
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            return Some(JsonRpcResponse::failure(
                None,
                JsonRpcError::invalid_request(e),
            ))
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return Some(JsonRpcResponse::failure(
            request.id,
            JsonRpcError::invalid_request(format!("unsupported jsonrpc version {}", request.jsonrpc)),
        ));
    }

    if request.is_notification() {
        tracing::debug!(method = %request.method, "notification");
        return None;
    }

    let id = request.id.clone();
    let outcome = match request.method.as_str() {
        "initialize" => serde_json::to_value(InitializeResult::default())
            .map_err(JsonRpcError::invalid_params),
        "ping" => Ok(json!({})),
        "tools/list" => serde_json::to_value(ListToolsResult {
            tools: definitions(),
        })
        .map_err(JsonRpcError::invalid_params),
        "tools/call" => match request
            .params
            .map(serde_json::from_value::<CallToolParams>)
            .transpose()
        {
            Ok(Some(params)) => {
                tracing::info!(tool = %params.name, "tools/call");
                serde_json::to_value(state.call(params).await).map_err(JsonRpcError::invalid_params)
            }
            Ok(None) => Err(JsonRpcError::invalid_params("missing params")),
            Err(e) => Err(JsonRpcError::invalid_params(e)),
        },
        other => Err(JsonRpcError::method_not_found(other)),
    };

    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

/// Newline-delimited JSON-RPC over stdin/stdout until stdin closes.
pub async fn serve_stdio(state: Arc<AppState>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(response) = handle_message(&state, line).await else {
            continue;
        };
        let mut out = serde_json::to_vec(&response).context("failed to encode response")?;
        out.push(b'\n');
        stdout.write_all(&out).await.context("failed to write stdout")?;
        stdout.flush().await.context("failed to flush stdout")?;
    }

    tracing::info!("stdin closed");
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/mcp", post(mcp))
        .route("/api/stock/:symbol", get(stock))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn mcp(State(state): State<Arc<AppState>>, body: String) -> Response {
    match handle_message(&state, &body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn stock(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> Response {
    let quote = match normalize_symbol(&symbol) {
        Ok(symbol) => state.provider().quote(&symbol).await,
        Err(e) => Err(e),
    };
    match quote {
        Ok(q) => Json(q).into_response(),
        Err(e) => {
            tracing::error!(symbol = %symbol, error = %format!("{e:#}"), "stock lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("{e:#}")})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tests::{state_with, QuoteOnlyProvider};

    async fn roundtrip(state: &AppState, raw: &str) -> Value {
        let res = handle_message(state, raw).await.unwrap();
        serde_json::to_value(res).unwrap()
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let (state, _dir) = state_with(QuoteOnlyProvider::default()).await;
        let v = roundtrip(&state, "{not json").await;
        assert_eq!(v["error"]["code"], -32700);
        assert_eq!(v["id"], Value::Null);
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let (state, _dir) = state_with(QuoteOnlyProvider::default()).await;
        let res = handle_message(
            &state,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn initialize_then_list_tools() {
        let (state, _dir) = state_with(QuoteOnlyProvider::default()).await;
        let init = roundtrip(
            &state,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .await;
        assert_eq!(init["id"], 1);
        assert_eq!(init["result"]["serverInfo"]["name"], "nasdaq-100-stock-server");

        let list = roundtrip(&state, r#"{"jsonrpc":"2.0","id":"two","method":"tools/list"}"#).await;
        assert_eq!(list["id"], "two");
        assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 24);
    }

    #[tokio::test]
    async fn unknown_method_and_unknown_tool_differ() {
        let (state, _dir) = state_with(QuoteOnlyProvider::default()).await;
        let method = roundtrip(&state, r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#).await;
        assert_eq!(method["error"]["code"], -32601);

        let tool = roundtrip(
            &state,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
        )
        .await;
        assert!(tool.get("error").is_none());
        assert_eq!(tool["result"]["isError"], true);
    }

    #[tokio::test]
    async fn tool_call_returns_text_content() {
        let (state, _dir) = state_with(QuoteOnlyProvider::with("AAPL", 190.0)).await;
        let v = roundtrip(
            &state,
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"get_stock_price","arguments":{"symbol":"AAPL"}}}"#,
        )
        .await;
        assert_eq!(v["result"]["content"][0]["type"], "text");
        let quote: Value =
            serde_json::from_str(v["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(quote["price"], 190.0);
    }
}
