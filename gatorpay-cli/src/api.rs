//! # HTTP API
//!
//! Builds the axum router for `gatorpay serve`. Handlers are thin: they
//! bind the request, run the core call on the blocking pool and wrap the
//! outcome in the `{success, message, data}` envelope.
//!
//! | Method | Path                          | Auth   |
//! |--------|-------------------------------|--------|
//! | GET    | `/api/health`                 |        |
//! | POST   | `/api/v1/auth/register`       |        |
//! | POST   | `/api/v1/auth/login`          |        |
//! | POST   | `/api/v1/auth/verify-otp`     |        |
//! | POST   | `/api/v1/auth/resend-otp`     |        |
//! | POST   | `/api/v1/auth/google`         |        |
//! | GET    | `/api/v1/auth/me`             | bearer |
//! | GET    | `/api/v1/wallet`              | bearer |
//! | POST   | `/api/v1/wallet/add`          | bearer |
//! | POST   | `/api/v1/wallet/withdraw`     | bearer |
//! | GET    | `/api/v1/wallet/transactions` | bearer |

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Query, State},
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use gatorpay_core::services::{
    DepositInput, FederatedInput, LogEvent, LoggingService, LoginInput, RegisterInput,
    WithdrawInput,
};
use gatorpay_core::{CodePurpose, Error, GatorPayContext, OperationResult};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<GatorPayContext>,
    pub logger: Option<Arc<LoggingService>>,
}

impl AppState {
    pub fn new(context: Arc<GatorPayContext>, logger: Option<Arc<LoggingService>>) -> Self {
        Self { context, logger }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failure already mapped to its transport status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "validation_error",
            message: message.into(),
        }
    }

    fn unauthorized(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind,
            message: message.into(),
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal_error",
            message: "internal server error".to_string(),
        }
    }
}

/// HTTP status for each core failure
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) | Error::WalletInactive | Error::InsufficientBalance => {
            StatusCode::BAD_REQUEST
        }
        Error::DuplicateIdentity(_) => StatusCode::CONFLICT,
        Error::InvalidCredentials
        | Error::InvalidCode
        | Error::CodeExpired
        | Error::Session(_) => StatusCode::UNAUTHORIZED,
        Error::UserNotFound | Error::WalletNotFound => StatusCode::NOT_FOUND,
        Error::AccountCreationFailed
        | Error::Storage(_)
        | Error::Delivery(_)
        | Error::Config(_)
        | Error::Io(_)
        | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        if !error.is_client_error() && !matches!(error, Error::AccountCreationFailed) {
            tracing::error!(kind = error.kind(), error = %error, "request failed");
            return Self::internal();
        }
        Self {
            status: status_for(&error),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "message": self.message,
            "error": self.kind,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<(StatusCode, Json<OperationResult<T>>), ApiError>;

fn respond<T>(status: StatusCode, message: &str, data: T) -> ApiResult<T> {
    Ok((status, Json(OperationResult::ok(message, data))))
}

/// Run a core call on the blocking pool, recording failures in the
/// activity log by operation and error kind
async fn run_core<T, F>(state: &AppState, operation: &'static str, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&GatorPayContext) -> gatorpay_core::Result<T> + Send + 'static,
{
    let context = Arc::clone(&state.context);
    let logger = state.logger.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let result = f(&context);
        if let (Err(e), Some(logger)) = (&result, &logger) {
            if let Err(log_err) = logger.log(
                LogEvent::new("operation_failed")
                    .with_operation(operation)
                    .with_error_kind(e.kind()),
            ) {
                tracing::debug!(error = %log_err, "activity log write failed");
            }
        }
        result
    })
    .await
    .map_err(|e| {
        tracing::error!(operation, error = %e, "blocking task failed");
        ApiError::internal()
    })?;

    outcome.map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// Bearer authentication
// ---------------------------------------------------------------------------

/// Subject of a validated `Authorization: Bearer <token>` header
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| ApiError::unauthorized("missing_token", "authorization header required"))?;
        let value = value
            .to_str()
            .map_err(|_| ApiError::unauthorized("missing_token", "invalid authorization header"))?;

        let token = match value.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
                token.trim()
            }
            _ => {
                return Err(ApiError::unauthorized(
                    "missing_token",
                    "authorization header must be 'Bearer <token>'",
                ))
            }
        };

        let user_id = state.context.auth_service.authenticate(token)?;
        Ok(AuthUser(user_id))
    }
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub user_id: Uuid,
    pub code: String,
    pub purpose: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendOtpRequest {
    pub user_id: Uuid,
    pub purpose: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Build the full router with CORS and request tracing
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.context.config.cors_origins);

    let v1 = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/verify-otp", post(verify_otp_handler))
        .route("/auth/resend-otp", post(resend_otp_handler))
        .route("/auth/google", post(google_handler))
        .route("/auth/me", get(me_handler))
        .route("/wallet", get(wallet_handler))
        .route("/wallet/add", post(deposit_handler))
        .route("/wallet/withdraw", post(withdraw_handler))
        .route("/wallet/transactions", get(transactions_handler));

    Router::new()
        .route("/api/health", get(health_handler))
        .nest("/api/v1", v1)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin when none are configured, otherwise exactly the listed ones
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(allowed)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> Json<Health> {
    Json(Health { status: "healthy" })
}

async fn register_handler(
    State(state): State<AppState>,
    payload: Result<Json<RegisterInput>, JsonRejection>,
) -> ApiResult<gatorpay_core::services::OtpSent> {
    let Json(input) = payload?;
    let sent = run_core(&state, "auth.register", move |ctx| ctx.auth_service.register(&input)).await?;
    respond(StatusCode::CREATED, "verification code sent", sent)
}

async fn login_handler(
    State(state): State<AppState>,
    payload: Result<Json<LoginInput>, JsonRejection>,
) -> ApiResult<gatorpay_core::services::OtpSent> {
    let Json(input) = payload?;
    let sent = run_core(&state, "auth.login", move |ctx| ctx.auth_service.login(&input)).await?;
    respond(StatusCode::OK, "verification code sent", sent)
}

async fn verify_otp_handler(
    State(state): State<AppState>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> ApiResult<gatorpay_core::services::AuthSession> {
    let Json(request) = payload?;
    let session = run_core(&state, "auth.verify", move |ctx| {
        let purpose: CodePurpose = request.purpose.parse()?;
        ctx.auth_service
            .verify_code(&request.user_id, &request.code, purpose)
    })
    .await?;
    respond(StatusCode::OK, "authenticated", session)
}

async fn resend_otp_handler(
    State(state): State<AppState>,
    payload: Result<Json<ResendOtpRequest>, JsonRejection>,
) -> ApiResult<gatorpay_core::services::OtpSent> {
    let Json(request) = payload?;
    let sent = run_core(&state, "auth.resend", move |ctx| {
        let purpose: CodePurpose = request.purpose.parse()?;
        ctx.auth_service.resend_code(&request.user_id, purpose)
    })
    .await?;
    respond(StatusCode::OK, "verification code sent", sent)
}

async fn google_handler(
    State(state): State<AppState>,
    payload: Result<Json<FederatedInput>, JsonRejection>,
) -> ApiResult<gatorpay_core::services::AuthSession> {
    let Json(input) = payload?;
    let session = run_core(&state, "auth.federated", move |ctx| ctx.auth_service.federated(&input)).await?;
    respond(StatusCode::OK, "authenticated", session)
}

async fn me_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<gatorpay_core::services::Profile> {
    let profile = run_core(&state, "auth.profile", move |ctx| ctx.auth_service.get_profile(&user_id)).await?;
    respond(StatusCode::OK, "ok", profile)
}

async fn wallet_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<gatorpay_core::Wallet> {
    let wallet = run_core(&state, "wallet.get", move |ctx| ctx.wallet_service.get_wallet(&user_id)).await?;
    respond(StatusCode::OK, "ok", wallet)
}

async fn deposit_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<DepositInput>, JsonRejection>,
) -> ApiResult<gatorpay_core::Wallet> {
    let Json(input) = payload?;
    let wallet = run_core(&state, "wallet.deposit", move |ctx| {
        ctx.wallet_service.deposit(&user_id, &input)
    })
    .await?;
    respond(StatusCode::OK, "deposit successful", wallet)
}

async fn withdraw_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<WithdrawInput>, JsonRejection>,
) -> ApiResult<gatorpay_core::Wallet> {
    let Json(input) = payload?;
    let wallet = run_core(&state, "wallet.withdraw", move |ctx| {
        ctx.wallet_service.withdraw(&user_id, &input)
    })
    .await?;
    respond(StatusCode::OK, "withdrawal successful", wallet)
}

async fn transactions_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    query: Option<Query<PageQuery>>,
) -> ApiResult<gatorpay_core::services::TransactionPage> {
    let paging = query.map(|Query(paging)| paging).unwrap_or_default();
    let page = run_core(&state, "wallet.transactions", move |ctx| {
        ctx.wallet_service.list_transactions(
            &user_id,
            paging.page.unwrap_or(1),
            paging.limit.unwrap_or(10),
        )
    })
    .await?;
    respond(StatusCode::OK, "ok", page)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
