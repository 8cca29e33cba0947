//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, DevGateway, HttpGateway, LogTransport, TokenAuthService, TransportNotifier},
    config::Config,
    error::ApiError,
    web::{
        middleware::require_auth,
        payments::{
            capture_payment_handler, create_order_handler, get_session_payment_handler,
            refund_payment_handler, verify_payment_handler, webhook_handler,
        },
        rest::ApiDoc,
        session_requests::{
            accept_request_handler, cancel_request_handler, create_request_handler,
            decline_request_handler, list_requests_handler, list_tutor_requests_handler,
        },
        sessions::{
            approve_completion_handler, cancel_session_handler, check_availability_handler,
            create_session_handler, get_session_handler, list_sessions_handler,
            list_tutor_sessions_handler, reject_completion_handler, request_completion_handler,
            reschedule_session_handler, review_session_handler,
        },
        state::AppState,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use studysphere_core::{
    BookingOrchestrator, PaymentGateway, PaymentMode, PaymentService,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let gateway: Arc<dyn PaymentGateway> = match config.payment_mode {
        PaymentMode::Development => {
            info!("Payment mode: development (gateway auto-succeeds)");
            Arc::new(DevGateway)
        }
        mode => {
            info!("Payment mode: {}", mode.as_str());
            let key_id = config
                .gateway_key_id
                .clone()
                .ok_or_else(|| ApiError::Internal("GATEWAY_KEY_ID is required".to_string()))?;
            let key_secret = config
                .gateway_key_secret
                .clone()
                .ok_or_else(|| ApiError::Internal("GATEWAY_KEY_SECRET is required".to_string()))?;
            Arc::new(HttpGateway::new(
                config.gateway_base_url.clone(),
                key_id,
                key_secret,
                config.gateway_timeout_secs,
            )?)
        }
    };

    let payments = Arc::new(PaymentService::new(
        db_adapter.clone(),
        gateway,
        config.platform_fee_percent,
        config.currency.clone(),
        config.payment_mode,
    ));
    let notifier = Arc::new(TransportNotifier::new(LogTransport));
    let orchestrator = Arc::new(BookingOrchestrator::new(
        db_adapter.clone(),
        db_adapter.clone(),
        db_adapter.clone(),
        payments.clone(),
        notifier,
    ));
    let auth = Arc::new(TokenAuthService::new(config.auth_token_secret.clone()));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        orchestrator,
        payments,
        auth,
        config: config.clone(),
    });

    let cors_origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("invalid CORS_ORIGIN: {e}")))?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required; the webhook is signature-checked)
    let public_routes = Router::new().route("/payments/webhook", post(webhook_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/sessions",
            post(create_session_handler).get(list_sessions_handler),
        )
        .route("/sessions/tutor", get(list_tutor_sessions_handler))
        .route("/sessions/check-availability", post(check_availability_handler))
        .route("/sessions/{id}", get(get_session_handler))
        .route("/sessions/{id}/cancel", patch(cancel_session_handler))
        .route("/sessions/{id}/complete", patch(request_completion_handler))
        .route(
            "/sessions/{id}/complete/approve",
            patch(approve_completion_handler),
        )
        .route(
            "/sessions/{id}/complete/reject",
            patch(reject_completion_handler),
        )
        .route("/sessions/{id}/reschedule", patch(reschedule_session_handler))
        .route("/sessions/{id}/review", patch(review_session_handler))
        .route(
            "/session-requests",
            post(create_request_handler).get(list_requests_handler),
        )
        .route("/session-requests/tutor", get(list_tutor_requests_handler))
        .route("/session-requests/{id}/accept", patch(accept_request_handler))
        .route(
            "/session-requests/{id}/decline",
            patch(decline_request_handler),
        )
        .route("/session-requests/{id}/cancel", patch(cancel_request_handler))
        .route("/payments/create-order", post(create_order_handler))
        .route("/payments/verify", post(verify_payment_handler))
        .route(
            "/payments/capture/{session_id}",
            post(capture_payment_handler),
        )
        .route(
            "/payments/refund/{session_id}",
            post(refund_payment_handler),
        )
        .route(
            "/payments/session/{session_id}",
            get(get_session_payment_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
