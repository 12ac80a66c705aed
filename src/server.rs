use axum::http::StatusCode;
use axum::{
    Json, Router,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use uuid::Uuid;

use crate::agent::engine::ChatEngine;
use crate::agent::tools::{ExecutedCall, ToolRegistry, ToolSpec};
use crate::domain::{Book, Customer, OrderDetail};
use crate::session::{Message, Session, SessionSummary, ToolCallRecord};
use crate::storage::{LibraryStore, TableCounts};

#[derive(Clone)]
pub struct AppState {
    pub store: LibraryStore,
    pub engine: Arc<ChatEngine>,
    pub registry: Arc<ToolRegistry>,
    pub low_stock_threshold: i64,
}

fn internal_error<E: std::fmt::Display>(e: E) -> StatusCode {
    tracing::error!(error = %e, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub session_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub message: String,
    pub tool_calls: Vec<ExecutedCall>,
}

async fn chat(
    axum::extract::State(state): axum::extract::State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponse>, StatusCode> {
    if body.message.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let outcome = state
        .engine
        .handle_turn(body.session_id, &body.message)
        .await
        .map_err(internal_error)?;
    Ok(Json(ChatResponse {
        session_id: outcome.session_id,
        message: outcome.reply.content,
        tool_calls: outcome.tool_calls,
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionBody {
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

async fn create_session(
    axum::extract::State(state): axum::extract::State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<CreateSessionResponse>, StatusCode> {
    let Session {
        id,
        title,
        created_at,
    } = state
        .store
        .create_session(body.title)
        .await
        .map_err(internal_error)?;
    Ok(Json(CreateSessionResponse {
        id,
        title,
        created_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

async fn list_sessions(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<ListSessionsResponse>, StatusCode> {
    let sessions = state.store.list_sessions().await.map_err(internal_error)?;
    Ok(Json(ListSessionsResponse { sessions }))
}

#[derive(Debug, Serialize)]
pub struct SessionMessagesResponse {
    pub session_id: Uuid,
    pub messages: Vec<Message>,
}

async fn session_messages(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<SessionMessagesResponse>, StatusCode> {
    match state.store.session_messages(id).await.map_err(internal_error)? {
        Some(messages) => Ok(Json(SessionMessagesResponse {
            session_id: id,
            messages,
        })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Debug, Serialize)]
pub struct SessionToolCallsResponse {
    pub session_id: Uuid,
    pub tool_calls: Vec<ToolCallRecord>,
}

async fn session_tool_calls(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<SessionToolCallsResponse>, StatusCode> {
    match state
        .store
        .session_tool_calls(id)
        .await
        .map_err(internal_error)?
    {
        Some(tool_calls) => Ok(Json(SessionToolCallsResponse {
            session_id: id,
            tool_calls,
        })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Debug, Serialize)]
pub struct BooksResponse {
    pub books: Vec<Book>,
}

async fn list_books(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<BooksResponse>, StatusCode> {
    let books = state.store.list_books().await.map_err(internal_error)?;
    Ok(Json(BooksResponse { books }))
}

#[derive(Debug, Serialize)]
pub struct CustomersResponse {
    pub customers: Vec<Customer>,
}

async fn list_customers(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<CustomersResponse>, StatusCode> {
    let customers = state.store.list_customers().await.map_err(internal_error)?;
    Ok(Json(CustomersResponse { customers }))
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<OrderDetail>,
}

async fn list_orders(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<OrdersResponse>, StatusCode> {
    let orders = state.store.list_orders().await.map_err(internal_error)?;
    Ok(Json(OrdersResponse { orders }))
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolSpec>,
}

async fn list_tools(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.registry.catalog(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub timestamp: DateTime<Utc>,
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<HealthResponse> {
    let up = state.store.ping().await;
    Json(HealthResponse {
        status: if up { "ok" } else { "degraded" },
        database: if up { "connected" } else { "unreachable" },
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counts: TableCounts,
    pub low_stock_books: i64,
    pub low_stock_threshold: i64,
}

async fn stats(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<StatsResponse>, StatusCode> {
    let counts = state.store.table_counts().await.map_err(internal_error)?;
    let low_stock_books = state
        .store
        .low_stock_count(state.low_stock_threshold)
        .await
        .map_err(internal_error)?;
    Ok(Json(StatsResponse {
        counts,
        low_stock_books,
        low_stock_threshold: state.low_stock_threshold,
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat", post(chat))
        .route("/v1/sessions", post(create_session).get(list_sessions))
        .route("/v1/sessions/:id/messages", get(session_messages))
        .route("/v1/sessions/:id/tool-calls", get(session_tool_calls))
        .route("/v1/books", get(list_books))
        .route("/v1/customers", get(list_customers))
        .route("/v1/orders", get(list_orders))
        .route("/v1/tools", get(list_tools))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
    }
}
