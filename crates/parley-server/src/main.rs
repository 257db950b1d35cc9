use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::auth::{self, AppState, AppStateInner};
use parley_api::chat;
use parley_api::media;
use parley_api::middleware::require_auth;
use parley_api::users;
use parley_gateway::connection;
use parley_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let upload_dir = std::env::var("PARLEY_UPLOAD_DIR").unwrap_or_else(|_| "./uploads".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let enforce_recipient = matches!(
        std::env::var("PARLEY_ENFORCE_RECIPIENT").as_deref(),
        Ok("1") | Ok("true")
    );

    // Init database
    let db = parley_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: jwt_secret.clone(),
        registry: Arc::new(dispatcher.clone()),
        upload_dir: PathBuf::from(upload_dir),
        enforce_recipient,
    });

    let app = app(app_state, dispatcher, jwt_secret);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(app_state: AppState, dispatcher: Dispatcher, jwt_secret: String) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    // /chat/{user_id} carries both verbs in one registration: the router
    // rejects two routes that differ only in parameter name.
    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/profile", put(users::update_profile))
        .route("/media", post(media::upload))
        .route("/media/{media_id}", get(media::download))
        .route("/chat/global", post(chat::send_global))
        .route(
            "/chat/{user_id}",
            post(chat::send_direct).get(chat::get_conversation),
        )
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ServerState {
            dispatcher,
            jwt_secret,
        });

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}
