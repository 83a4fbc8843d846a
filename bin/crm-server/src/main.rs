//! Gestio Server
//!
//! Serves the CRM REST APIs, the notification WebSocket and the health
//! probes from a single axum listener, and runs the follow-up reminder scan.
//!
//! ## Configuration
//!
//! Read by `crm_config::ConfigLoader` from `config.toml` (or `CRM_CONFIG`),
//! with `CRM_*` environment overrides:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CRM_HTTP_PORT` | `8080` | HTTP port |
//! | `CRM_MONGODB_URI` | `mongodb://localhost:27017` | MongoDB connection URL |
//! | `CRM_MONGODB_DATABASE` | `gestio` | MongoDB database name |
//! | `CRM_JWT_SECRET` | - | HS256 signing secret (required outside dev mode) |
//! | `CRM_SMTP_HOST` | - | SMTP relay; mail is only logged when empty |
//! | `CRM_REMINDERS_INTERVAL_SECS` | `3600` | Reminder scan period |
//! | `RUST_LOG` | `info` | Log level |

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::HeaderValue;
use axum::Router;
use tokio::{net::TcpListener, signal, sync::broadcast};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crm_config::AppConfig;
use crm_platform::api::{
    appointments_router, auth_router, business_cards_router, clients_router, devis_router,
    health_router, invoices_router, notifications_router, services_router, socket_router,
    users_router, AppState, AppointmentsState, AuthLayer, AuthState, BusinessCardsState,
    ClientsState, DevisState, HealthState, InvoicesState, NotificationsState, ServicesState,
    UsersState,
};
use crm_platform::shared::indexes::initialize_indexes;
use crm_platform::{
    AppointmentRepository, Argon2Config, AuthConfig, AuthService, BusinessCardRepository,
    ClientRepository, DevisRepository, InvoiceRepository, LogMailer, Mailer, NotificationHub,
    NotificationRepository, NotificationService, PasswordPolicy, PasswordService, ReminderScanner,
    ServiceRepository, SmtpMailer, SmtpSettings, UserRepository,
};

const DEV_JWT_SECRET: &str = "gestio-dev-secret-do-not-use-in-production";

#[tokio::main]
async fn main() -> Result<()> {
    crm_common::init_logging("crm-server");

    info!("Starting Gestio Server");

    let config = AppConfig::load()?;
    config.validate()?;

    // Connect to MongoDB
    info!("Connecting to MongoDB: {}/{}", config.mongodb.uri, config.mongodb.database);
    let mongo_client = mongodb::Client::with_uri_str(&config.mongodb.uri).await?;
    let db = mongo_client.database(&config.mongodb.database);

    // Uniqueness of invoice numbers, e-mails and dedup keys rests on these
    initialize_indexes(&db).await?;

    // Initialize repositories
    let user_repo = Arc::new(UserRepository::new(&db));
    let client_repo = Arc::new(ClientRepository::new(&db));
    let devis_repo = Arc::new(DevisRepository::new(&db));
    let invoice_repo = Arc::new(InvoiceRepository::new(&db));
    let appointment_repo = Arc::new(AppointmentRepository::new(&db));
    let service_repo = Arc::new(ServiceRepository::new(&db));
    let card_repo = Arc::new(BusinessCardRepository::new(&db));
    let notification_repo = Arc::new(NotificationRepository::new(&db));
    info!("Repositories initialized");

    // Auth
    let secret_key = if config.auth.jwt_secret.is_empty() {
        warn!("No JWT secret configured, using the development secret");
        DEV_JWT_SECRET.to_string()
    } else {
        config.auth.jwt_secret.clone()
    };
    let auth_service = Arc::new(AuthService::new(AuthConfig {
        secret_key,
        issuer: config.auth.issuer.clone(),
        access_token_expiry_secs: config.auth.access_token_expiry_secs,
        ..AuthConfig::default()
    }));
    let password_service = Arc::new(PasswordService::new(
        Argon2Config::default(),
        PasswordPolicy::default(),
    )?);
    info!("Auth services initialized");

    let app_state = AppState {
        auth_service: auth_service.clone(),
        user_repo: user_repo.clone(),
    };

    // Notifications and mail
    let hub = Arc::new(NotificationHub::default());
    let notifications = Arc::new(NotificationService::new(notification_repo.clone(), hub.clone()));
    let mailer: Arc<dyn Mailer> = if config.mail.is_enabled() {
        info!(host = %config.mail.smtp_host, "SMTP mailer enabled");
        Arc::new(SmtpMailer::new(&SmtpSettings {
            host: config.mail.smtp_host.clone(),
            port: config.mail.smtp_port,
            username: config.mail.username.clone(),
            password: config.mail.password.clone(),
            from_address: config.mail.from_address.clone(),
        })?)
    } else {
        info!("No SMTP host configured, outgoing mail is logged only");
        Arc::new(LogMailer)
    };

    // Build API states
    let auth_state = AuthState {
        auth_service: auth_service.clone(),
        password_service,
        user_repo: user_repo.clone(),
        trial_days: config.auth.trial_days,
    };
    let users_state = UsersState { user_repo: user_repo.clone() };
    let clients_state = ClientsState {
        client_repo: client_repo.clone(),
        devis_repo: devis_repo.clone(),
        invoice_repo: invoice_repo.clone(),
        user_repo: user_repo.clone(),
        card_repo: card_repo.clone(),
        notifications: notifications.clone(),
    };
    let devis_state = DevisState {
        devis_repo: devis_repo.clone(),
        client_repo: client_repo.clone(),
        user_repo: user_repo.clone(),
        notifications: notifications.clone(),
    };
    let invoices_state = InvoicesState {
        invoice_repo,
        devis_repo: devis_repo.clone(),
        client_repo: client_repo.clone(),
        user_repo: user_repo.clone(),
        notifications: notifications.clone(),
        mailer,
    };
    let appointments_state = AppointmentsState {
        appointment_repo,
        client_repo: client_repo.clone(),
        service_repo: service_repo.clone(),
        notifications: notifications.clone(),
    };
    let services_state = ServicesState { service_repo };
    let cards_state = BusinessCardsState { card_repo };
    let notifications_state = NotificationsState {
        repo: notification_repo,
        hub,
        auth: app_state.clone(),
    };
    let health_state = HealthState::new(Some(db.clone()), Some(env!("CARGO_PKG_VERSION").to_string()));

    // Build API router using OpenApiRouter for auto-collected OpenAPI paths
    let (router, mut openapi) = OpenApiRouter::new()
        .nest("/auth", auth_router(auth_state))
        .nest("/users", users_router(users_state))
        .nest("/clients", clients_router(clients_state))
        .nest("/devis", devis_router(devis_state))
        .nest("/invoices", invoices_router(invoices_state))
        .nest("/appointments", appointments_router(appointments_state))
        .nest("/services", services_router(services_state))
        .nest("/business-cards", business_cards_router(cards_state))
        .nest("/notifications", notifications_router(notifications_state.clone()))
        .split_for_parts();

    openapi
        .components
        .get_or_insert_with(utoipa::openapi::Components::new)
        .add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    openapi.info.title = "Gestio API".to_string();
    openapi.info.version = env!("CARGO_PKG_VERSION").to_string();
    openapi.info.description = Some("CRM, devis, invoicing and appointments for independent tradespeople".to_string());

    let app = Router::new()
        .merge(router)
        // Routes that return regular Router (not collected in OpenAPI)
        .nest("/ws", socket_router(notifications_state))
        .nest("/health", health_router(health_state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/q/openapi", openapi))
        .layer(AuthLayer::new(app_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.http.cors_origins));

    // Reminder scan
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let reminder_task = if config.reminders.enabled {
        let scanner = Arc::new(ReminderScanner::new(
            user_repo,
            client_repo,
            devis_repo,
            notifications,
            Duration::from_secs(config.reminders.interval_secs),
            config.reminders.stale_client_days,
        ));
        info!(
            interval_secs = config.reminders.interval_secs,
            stale_client_days = config.reminders.stale_client_days,
            "Reminder scanner started"
        );
        Some(scanner.spawn(&shutdown_tx))
    } else {
        info!("Reminder scanner disabled");
        None
    };

    // Start API server
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);
    health_state.set_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Shutdown signal received...");

    let _ = shutdown_tx.send(());
    if let Some(task) = reminder_task {
        let _ = task.await;
    }

    info!("Gestio Server shutdown complete");
    Ok(())
}

/// `*` or an empty list allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
