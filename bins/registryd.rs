use std::path::Path;

use dotenvy::dotenv;
use tracing::{error, info, warn};
use uuid::Uuid;

use registry::{DataRegistry, DataValue};

fn init_logging() {
    // Load .env first so RUST_LOG from it takes effect.
    dotenv().ok();
    common::utils::logging::init_logging_default();
    info!(service = "registryd", event = "logger_init", "tracing subscriber initialized");
}

fn main() -> std::process::ExitCode {
    init_logging();

    let service_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new({
        let service_id = service_id;
        move |info| {
            error!(
                service = "registryd",
                event = "panic",
                %service_id,
                pid,
                message = %info,
                "unhandled panic occurred"
            );
        }
    }));

    info!(
        service = "registryd",
        event = "start",
        %service_id,
        pid,
        version,
        "registry daemon starting"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "registryd", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    match rt.block_on(run()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(service = "registryd", event = "fatal", error = %e, "registry daemon failed");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = match configs::AppConfig::load_and_validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "config not loaded; using built-in defaults");
            configs::AppConfig::default()
        }
    };
    common::env::ensure_env(&config.registry.cache_root, "config.toml").await?;

    let registry = DataRegistry::with_config(&config);
    info!(session_id = %registry.session_id(), "registry ready");

    // Example working set: a deduplicated id cache flushed to data/seen.json.
    registry
        .register_cache(
            "jobs/seen",
            DataValue::empty_set(),
            Some(Path::new("data/seen.json")),
            "jobs",
            true,
            true,
            true,
            None,
            None,
            true,
        )
        .await?;

    registry.start_save_daemon(None).await?;

    tokio::signal::ctrl_c().await?;
    info!(event = "shutdown", "stopping save daemon");
    registry.stop_save_daemon();

    // Final flush so nothing written during the last interval is lost.
    registry.save().await;
    registry.save_caches().await;
    info!("{}", registry.summary().await);
    Ok(())
}
