//! Application Startup
//!
//! Wiring of repositories, services and the realtime gateway, plus server
//! initialization and background housekeeping.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;

use crate::application::services::{AuthService, ChatService, MessageService, SessionService, TokenCodec};
use crate::config::Settings;
use crate::domain::{ChatRepository, MessageRepository, RefreshTokenRepository, UserRepository};
use crate::infrastructure::database::{self, HealthProbe};
use crate::infrastructure::media::{HttpMediaHost, MediaHost};
use crate::infrastructure::repositories::{
    PgChatRepository, PgMessageRepository, PgRefreshTokenRepository, PgUserRepository,
};
use crate::presentation::http::handlers::health;
use crate::presentation::http::routes;
use crate::presentation::middleware::{cors, logging, RateLimiter};
use crate::presentation::websocket::{Broadcaster, ConnectionRegistry, Gateway};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);
const RATE_LIMIT_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Store implementations the application is built on.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub chats: Arc<dyn ChatRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub sessions: Arc<SessionService>,
    pub tokens: Arc<TokenCodec>,
    pub messages: Arc<MessageService>,
    pub chats: Arc<ChatService>,
    pub media: Arc<dyn MediaHost>,
    pub gateway: Arc<Gateway>,
    pub rate_limiter: Arc<RateLimiter>,
    pub health: Arc<dyn HealthProbe>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        media: Arc<dyn MediaHost>,
        health: Arc<dyn HealthProbe>,
        settings: Settings,
    ) -> Self {
        let tokens = Arc::new(TokenCodec::new(&settings.jwt));
        let sessions = Arc::new(SessionService::new(
            Arc::clone(&repos.refresh_tokens),
            settings.jwt.refresh_token_ttl_seconds,
        ));
        let auth = Arc::new(AuthService::new(
            Arc::clone(&repos.users),
            Arc::clone(&sessions),
            Arc::clone(&tokens),
        ));
        let messages = Arc::new(MessageService::new(Arc::clone(&repos.messages), Arc::clone(&repos.chats)));
        let chats = Arc::new(ChatService::new(
            Arc::clone(&repos.chats),
            Arc::clone(&repos.messages),
            Arc::clone(&repos.users),
        ));

        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry), Arc::clone(&repos.chats)));
        let gateway = Arc::new(Gateway::new(
            registry,
            broadcaster,
            Arc::clone(&repos.chats),
            Arc::clone(&repos.messages),
            &settings.websocket,
        ));

        let rate_limiter = Arc::new(RateLimiter::from_settings(&settings.rate_limit));

        Self {
            auth,
            sessions,
            tokens,
            messages,
            chats,
            media,
            gateway,
            rate_limiter,
            health,
            settings: Arc::new(settings),
        }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        self.gateway.broadcaster()
    }
}

/// Router with every layer applied. Tracing is outermost.
pub fn build_router(state: AppState) -> Router {
    let cors = cors::create_cors_layer(&state.settings.cors);
    routes::create_router(state).layer(
        ServiceBuilder::new()
            .layer(logging::create_trace_layer())
            .layer(cors)
            .layer(CompressionLayer::new()),
    )
}

/// Periodic purge of expired refresh tokens and idle rate-limit buckets.
pub fn spawn_housekeeping(state: &AppState) {
    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match sessions.purge_expired().await {
                Ok(purged) if purged > 0 => tracing::info!(purged, "Expired refresh tokens purged"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Refresh token purge failed"),
            }
        }
    });

    let limiter = Arc::clone(&state.rate_limiter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_LIMIT_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let dropped = limiter.purge_idle();
            tracing::debug!(dropped, remaining = limiter.bucket_count(), "Idle rate-limit buckets purged");
        }
    });
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        health::init_server_start();

        let db = database::create_pool(&settings.database).await?;
        tracing::info!("Database connection pool created");

        database::run_migrations(&db).await?;
        tracing::info!("Database migrations applied");

        let repos = Repositories {
            users: Arc::new(PgUserRepository::new(db.clone())),
            chats: Arc::new(PgChatRepository::new(db.clone())),
            messages: Arc::new(PgMessageRepository::new(db.clone())),
            refresh_tokens: Arc::new(PgRefreshTokenRepository::new(db.clone())),
        };

        let media = HttpMediaHost::new(&settings.media)?;
        if settings.media.upload_url.is_none() {
            tracing::warn!("MEDIA_UPLOAD_URL not set, uploads will fail");
        }

        let addr = settings.server_addr();
        let state = AppState::new(repos, Arc::new(media), Arc::new(db), settings);
        spawn_housekeeping(&state);

        let router = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(
            self.listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
