// `userhub-macros` expands to `userhub::` paths, which also have to resolve
// inside this crate.
extern crate self as userhub;

pub mod admin;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod logging;
pub mod mailing;
pub mod models;
pub mod registry;
pub mod router;
pub mod sessions;
pub mod slug;
pub mod state;
pub mod website;

use std::{net::SocketAddr, time::Duration};

use axum::{middleware::from_fn_with_state, response::Redirect, routing::get, Router};
use menva::{read_default_file, FromEnv};
use tokio::{net::TcpListener, signal};

use sessions::Sessions;

pub use admin::{Column, ListingRow};
pub use config::Config;
pub use errors::AppError;
pub use slug::{slug_to_uuid, uuid_to_slug};
pub use state::AppState;
pub use userhub_macros::ListingRow;

/// The whole application: auth pages, the admin panel and the shared
/// middleware stack.
pub fn app(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(|| async { Redirect::to("/login") }))
        .merge(auth::routes())
        .merge(admin::routes(state.clone()))
        .layer(from_fn_with_state(state.clone(), auth::sessions_middleware));

    router::get_router(state, routes)
}

/// Reads the config from the environment (and `.env`), then serves until
/// ctrl-c or SIGTERM.
pub fn run(env_prefix: &str) -> Result<(), AppError> {
    read_default_file();
    let config = Config::from_env_with_prefix(env_prefix);
    let _sentry = logging::init_tracing(&config.env, config.sentry_dsn());

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| log_and_wrap_custom_internal!(e))?
        .block_on(async {
            let addr = config.socket_addr();
            let state = AppState::setup(config).await?;
            tokio::spawn(purge_sessions(state.sessions().clone()));
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|e| log_and_wrap_custom_internal!(e))?;
            tracing::info!(ip = %addr.0, port = addr.1, "listening");

            axum::serve(
                listener,
                app(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
        })
}

async fn purge_sessions(sessions: Sessions) {
    let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
    loop {
        interval.tick().await;
        if let Ok(purged) = sessions.purge_expired().await {
            tracing::info!(purged, "expired sessions purged");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
