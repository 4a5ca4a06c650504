//! REST layer: thin request/response mapping over the repositories and the
//! AI gateway.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::ai::{suggested_questions, AiGateway, AskError};
use crate::database::{
    client_repository::ClientUpdate, ClientRepository, ConversationRepository,
    TransactionRepository,
};
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub clients: ClientRepository,
    pub transactions: TransactionRepository,
    pub conversations: ConversationRepository,
    pub gateway: AiGateway,
}

/// HTTP-facing error: status code plus a `{"error": ...}` body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = match &err {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("Внутренняя ошибка: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<AskError> for ApiError {
    fn from(err: AskError) -> Self {
        error!("Ошибка AI шлюза: {}", err);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

/// Client or transaction ids arrive as JSON numbers from the CRM UI and as
/// composite strings in banking mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Int(i64),
    Str(String),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            IdValue::Int(id) => id.to_string(),
            IdValue::Str(id) => id,
        }
    }
}

#[derive(Deserialize)]
pub struct StatusFilter {
    status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateClientRequest {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateClientRequest {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateTransactionRequest {
    client_id: Option<IdValue>,
    amount: Option<f64>,
    category: Option<String>,
    direction: Option<String>,
    description: Option<String>,
    transaction_date: Option<String>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct AskRequest {
    question: Option<String>,
    client_id: Option<IdValue>,
}

#[derive(Deserialize)]
pub struct ConversationsQuery {
    client_id: Option<IdValue>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SuggestionsQuery {
    client_id: Option<IdValue>,
}

#[derive(Serialize)]
struct CreatedResponse {
    id: String,
    message: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/clients", get(list_clients).post(create_client))
        .route(
            "/api/clients/:id",
            get(get_client_details)
                .put(update_client)
                .delete(delete_client),
        )
        .route("/api/clients/:id/transactions", get(list_client_transactions))
        .route("/api/transactions", post(create_transaction))
        .route("/api/ai/ask", post(ai_ask))
        .route("/api/ai/suggestions", get(ai_suggestions))
        .route("/api/ai/conversations", get(list_conversations))
        .route("/api/stats", get(get_stats))
        .route("/api/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

async fn list_clients(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let clients = state.clients.list(filter.status.as_deref()).await?;
    info!("Загружено клиентов: {}", clients.len());
    Ok(Json(json!({ "clients": clients })))
}

async fn get_client_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let client = state
        .clients
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Клиент не найден"))?;

    let transactions = state.transactions.list_by_client(&id, None).await?;
    let summary = state.transactions.summary(&id).await?;
    let categories = state.transactions.by_category(&id).await?;
    let conversations = state.conversations.get_by_client(&id, 10).await?;
    let rating = state.transactions.client_rating(&state.clients, &id).await?;

    Ok(Json(json!({
        "client": client,
        "transactions": transactions,
        "summary": summary,
        "categories": categories,
        "conversations": conversations,
        "rating": rating,
    })))
}

async fn create_client(
    State(state): State<AppState>,
    Json(body): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let name = body
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Имя клиента обязательно"))?;

    let id = state
        .clients
        .create(
            name,
            body.email.as_deref(),
            body.phone.as_deref(),
            body.status.as_deref().unwrap_or("active"),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id,
            message: "Клиент успешно создан".to_string(),
        }),
    ))
}

async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateClientRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows = state
        .clients
        .update(
            &id,
            ClientUpdate {
                name: body.name,
                email: body.email,
                phone: body.phone,
                status: body.status,
            },
        )
        .await?;

    if rows == 0 {
        return Err(ApiError::not_found("Клиент не найден"));
    }
    Ok(Json(json!({ "message": "Клиент успешно обновлен" })))
}

async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows = state.clients.delete(&id).await?;
    if rows == 0 {
        return Err(ApiError::not_found("Клиент не найден"));
    }
    Ok(Json(json!({ "message": "Клиент успешно удален" })))
}

async fn list_client_transactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let transactions = state.transactions.list_by_client(&id, query.limit).await?;
    Ok(Json(json!({ "transactions": transactions })))
}

async fn create_transaction(
    State(state): State<AppState>,
    Json(body): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let client_id = body
        .client_id
        .ok_or_else(|| ApiError::bad_request("ID клиента обязателен"))?
        .into_string();
    let amount = body
        .amount
        .ok_or_else(|| ApiError::bad_request("Сумма обязательна"))?;
    let direction = body
        .direction
        .as_deref()
        .filter(|d| *d == "income" || *d == "expense")
        .ok_or_else(|| ApiError::bad_request("Направление должно быть income или expense"))?;

    let id = state
        .transactions
        .create(
            &client_id,
            amount,
            body.category.as_deref().unwrap_or("Прочее"),
            direction,
            body.description.as_deref(),
            body.transaction_date.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id: id.to_string(),
            message: "Транзакция успешно создана".to_string(),
        }),
    ))
}

async fn ai_ask(
    State(state): State<AppState>,
    Json(body): Json<AskRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let question = body
        .question
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Вопрос не указан"))?;
    let client_id = body.client_id.map(IdValue::into_string);

    let answer = state.gateway.ask(question, client_id.as_deref()).await?;

    // The audit record is written only after a successful upstream call.
    let context_data = answer
        .context_summary
        .as_ref()
        .and_then(|s| serde_json::to_string(s).ok());
    state
        .conversations
        .create(
            client_id.as_deref(),
            question,
            &answer.answer,
            context_data.as_deref(),
        )
        .await?;

    Ok(Json(json!({
        "answer": answer.answer,
        "model": answer.model,
        "has_context": answer.has_context,
    })))
}

async fn ai_suggestions(
    Query(query): Query<SuggestionsQuery>,
) -> Json<serde_json::Value> {
    let suggestions = suggested_questions(query.client_id.is_some());
    Json(json!({ "suggestions": suggestions }))
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(20);
    let conversations = match query.client_id {
        Some(client_id) => {
            state
                .conversations
                .get_by_client(&client_id.into_string(), limit)
                .await?
        }
        None => state.conversations.get_recent_global(limit).await?,
    };
    Ok(Json(json!({ "conversations": conversations })))
}

async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let total_clients = state.clients.count(None).await?;
    let active_clients = state.clients.count(Some("active")).await?;

    let clients = state.clients.list(None).await?;
    let mut total_income = 0.0;
    let mut total_expense = 0.0;
    let mut total_transactions = 0i64;
    for client in &clients {
        let summary = state.transactions.summary(&client.id).await?;
        total_income += summary.total_income;
        total_expense += summary.total_expense;
        total_transactions += summary.transaction_count;
    }
    let average_balance = state.transactions.average_balance(&state.clients).await?;

    Ok(Json(json!({
        "clients": {
            "total": total_clients,
            "active": active_clients,
            "inactive": total_clients - active_clients,
        },
        "transactions": {
            "count": total_transactions,
            "income": total_income,
            "expense": total_expense,
            "balance": total_income - total_expense,
        },
        "average_balance": average_balance,
    })))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "AI CRM API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
