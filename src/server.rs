//! # Server Configuration
//!
//! This module contains the server setup and configuration for the
//! Integrations API: shared application state, the router, and startup.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use rand::RngCore;
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::orchestrator::SyncOrchestrator;
use crate::providers::ProviderRegistry;
use crate::refresher::TokenRefresher;
use crate::repositories::{BindingRepository, CredentialRepository, MetricRepository};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub registry: Arc<ProviderRegistry>,
    pub credentials: CredentialRepository,
    pub bindings: BindingRepository,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl AppState {
    /// Wire the state graph from configuration and an open database pool.
    pub fn build(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let db_arc = Arc::new(db.clone());

        let crypto_key = match config.crypto_key.clone() {
            Some(bytes) => CryptoKey::new(bytes).map_err(|e| anyhow::anyhow!("{e}"))?,
            None => {
                // Dev fallback: tokens encrypted under an ephemeral key are
                // unreadable after restart, forcing re-authorization.
                warn!(
                    "SEOPS_CRYPTO_KEY not set; using an ephemeral key, stored tokens will not survive a restart"
                );
                let mut bytes = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                CryptoKey::new(bytes).map_err(|e| anyhow::anyhow!("{e}"))?
            }
        };

        let registry = Arc::new(ProviderRegistry::from_config(&config));
        let credentials = CredentialRepository::new(Arc::clone(&db_arc), crypto_key);
        let bindings = BindingRepository::new(Arc::clone(&db_arc));
        let metrics = MetricRepository::new(Arc::clone(&db_arc));
        let refresher = TokenRefresher::new(credentials.clone(), config.token_refresh.skew_seconds);

        let orchestrator = Arc::new(SyncOrchestrator::new(
            &config,
            Arc::clone(&registry),
            credentials.clone(),
            bindings.clone(),
            metrics,
            refresher,
        ));

        Ok(Self {
            config,
            db,
            registry,
            credentials,
            bindings,
            orchestrator,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/integrations/{provider}/authorize",
            post(handlers::integrations::start_authorize),
        )
        .route(
            "/integrations/{provider}/sync",
            post(handlers::integrations::trigger_sync),
        )
        .route(
            "/integrations/{provider}/status",
            get(handlers::integrations::integration_status),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/integrations/providers",
            get(handlers::integrations::list_providers),
        )
        // The callback is entered by a browser redirect from the provider
        // and cannot carry an operator token.
        .route(
            "/integrations/{provider}/callback",
            get(handlers::integrations::oauth_callback),
        )
        .merge(protected)
        .with_state(state)
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Attach a correlation ID to the request extensions and the task-local
/// trace context so error responses can echo it.
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = format!("req-{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let context = crate::telemetry::TraceContext {
        trace_id: trace_id.clone(),
    };
    request.extensions_mut().insert(context.clone());
    crate::telemetry::with_trace_context(context, next.run(request)).await
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db = crate::db::init_pool(&config).await?;

    use migration::{Migrator, MigratorTrait};
    Migrator::up(&db, None).await?;

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::build(config, db)?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::integrations::list_providers,
        crate::handlers::integrations::start_authorize,
        crate::handlers::integrations::oauth_callback,
        crate::handlers::integrations::trigger_sync,
        crate::handlers::integrations::integration_status,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::providers::Provider,
            crate::providers::ProviderMetadata,
            crate::providers::DateRange,
            crate::handlers::integrations::AuthorizeRequest,
            crate::handlers::integrations::AuthorizeUrlResponse,
            crate::handlers::integrations::TriggerSyncRequest,
            crate::handlers::integrations::TriggerSyncResponse,
            crate::handlers::integrations::IntegrationStatusResponse,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "SEO Integrations API",
        description = "OAuth integration and external-data sync pipeline",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
