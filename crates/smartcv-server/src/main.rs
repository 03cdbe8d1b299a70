mod api;
mod state;
mod webhook;

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use smartcv_core::{
    AdminNotifier, AiClient, Config, Database, JobDispatcher, Mailer, MessagingClient,
    QueueName, WorkerConfig, init_telemetry, migrations, run_worker,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    let _guard = init_telemetry(&config.app, &config.telemetry)?;

    let db = Database::new(&config.paths.database).await?;
    migrations::run_migrations(&db).await?;

    let session_kv = smartcv_core::KvStore::connect(&config.kv.connection_url()).await?;
    let queue_kv = smartcv_core::KvStore::connect(&config.kv.connection_url()).await?;

    let http = reqwest::Client::new();
    let messaging = Arc::new(MessagingClient::new(
        http.clone(),
        config.messaging.api_key.clone(),
        config.messaging.base_url.clone(),
        config.messaging.sender_number.clone(),
    ));
    let ai: Arc<dyn smartcv_core::ChatCompleter> = Arc::new(AiClient::new(http, &config.ai));

    let recruiter_mailer_transport = Mailer::new(&config.smtp_recruiter)?;
    let confirmation_mailer_transport = Mailer::new(&config.smtp_confirmation)?;
    let admin = Arc::new(AdminNotifier::new(confirmation_mailer_transport.clone(), config.admin.clone()));

    let app_state = AppState::build(
        &config,
        db.clone(),
        session_kv.clone(),
        queue_kv,
        messaging.clone(),
        ai.clone(),
        admin.clone(),
        recruiter_mailer_transport.clone(),
    )
    .await;

    let memory_governor = Arc::new(smartcv_core::MemoryGovernor::new(3 * 1024 * 1024 * 1024));

    let dispatcher = JobDispatcher::new(
        db.clone(),
        messaging,
        ai,
        Arc::new(recruiter_mailer_transport),
        Arc::new(confirmation_mailer_transport),
        admin,
        session_kv,
        config.paths.uploads.clone(),
        memory_governor,
        app_state.usage.clone(),
    );

    let shutdown = CancellationToken::new();
    let mut worker_handles = Vec::new();
    for queue in QueueName::ALL {
        let worker_shutdown = shutdown.child_token();
        worker_handles.push(tokio::spawn(run_worker(
            queue,
            app_state.queue.clone(),
            dispatcher.clone(),
            WorkerConfig::default(),
            worker_shutdown,
        )));
    }

    let app: Router = Router::new().merge(api::router()).merge(webhook::router()).with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("smartcv listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    for handle in worker_handles {
        if let Err(err) = handle.await {
            warn!("worker task join error: {err}");
        }
    }
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received ctrl+c, shutting down");
        }
        _ = terminate => {
            warn!("received terminate signal, shutting down");
        }
    }

    shutdown.cancel();
}
