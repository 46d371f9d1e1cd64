use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tiket_server::auth::cache::PermissionCache;
use tiket_server::auth::identity::FirebaseVerifier;
use tiket_server::auth::session::SessionKeys;
use tiket_server::config::Config;
use tiket_server::payment::MidtransGateway;
use tiket_server::routes::create_routes;
use tiket_server::state::AppState;
use tiket_server::store::PgStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tiket_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        permissions: PermissionCache::new(),
        identity: Arc::new(FirebaseVerifier::new(config.firebase_project_id.clone())),
        payments: Arc::new(MidtransGateway::new(
            config.midtrans_server_key.clone(),
            config.midtrans_is_production,
            config.midtrans_finish_url.clone(),
        )),
        sessions: SessionKeys::new(&config.jwt_secret, config.jwt_ttl_minutes),
        config: Arc::new(config),
    };
    let port = state.config.port;
    let app = create_routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
