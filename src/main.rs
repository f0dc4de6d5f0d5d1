use sensor_hub::api;
use sensor_hub::config::{self, Config};
use sensor_hub::dashboard::{DashboardSink, SharedDashboard};
use sensor_hub::occupancy::{AlertLauncher, CommandLauncher};
use sensor_hub::server::IngestServer;
use sensor_hub::state::{DashboardState, LogEntry};
use std::sync::{Arc, RwLock};

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_config() -> Result<Config, config::ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => config::load_from_path(path),
        None => config::load_default(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    init_tracing(config.log_level());
    tracing::info!(name = %config.app.name, "sensor-hub starting");

    let state = Arc::new(RwLock::new(DashboardState::new()));
    let sink: Arc<dyn DashboardSink> = Arc::new(SharedDashboard::new(Arc::clone(&state)));
    let launcher = match config.alert_command() {
        Some(command) => {
            tracing::info!(program = %command.program, "Alert command configured");
            Some(Box::new(CommandLauncher::new(command)) as Box<dyn AlertLauncher>)
        }
        None => {
            tracing::warn!("No [occupancy.alert] section, alert process disabled");
            sink.on_log(LogEntry::warning("Alert process disabled: no command configured"));
            None
        }
    };

    let server = match IngestServer::bind(config.server_settings(), launcher, sink).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "Failed to start UDP server");
            return Err(err.into());
        }
    };

    let (web_host, web_port) = config.web_endpoint();
    match tokio::net::TcpListener::bind((web_host.as_str(), web_port)).await {
        Ok(listener) => {
            tracing::info!(host = %web_host, port = web_port, "Dashboard API listening");
            let app = api::router(Arc::clone(&state));
            tokio::spawn(async move {
                if let Err(err) = axum::serve(listener, app).await {
                    tracing::error!(error = %err, "Dashboard API stopped");
                }
            });
        }
        Err(err) => {
            tracing::warn!(
                host = %web_host,
                port = web_port,
                error = %err,
                "Dashboard API disabled"
            );
        }
    }

    server.run(shutdown_signal()).await;
    tracing::info!("sensor-hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
