mod config;
mod gateway;
mod modules;
mod playback;

use config::HostConfig;
use gateway::ConsoleGateway;
use orator_core::collab::ChannelDiagnosticsSink;
use orator_core::module::{FactoryCatalog, InMemoryDispatchSurface, ModuleRuntime};
use orator_core::{
    AudioFileManager, CommandErrorReporter, OratorError, SpeechService, SynthesisPipeline,
    TokioProcessInvoker,
};
use playback::ConsolePlayback;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,orator_core=info,orator_host=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = HostConfig::load();
    info!(target = "orator_host", version = %cfg.version, "Starting Orator: {}", cfg.description);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 1) Output directory, emptied of leftovers from the last run
    let files = Arc::new(AudioFileManager::new(cfg.synthesis.output_dir.clone()));
    files
        .ensure_output_directory()
        .await
        .map_err(|e| OratorError::Fatal(format!("output directory unusable: {}", e)))?;

    // 2) Synthesis + playback, both cancelled on shutdown
    let invoker = Arc::new(TokioProcessInvoker::new().with_shutdown(shutdown_rx.clone()));
    let pipeline = Arc::new(SynthesisPipeline::new(
        cfg.synthesis.clone(),
        invoker.clone(),
        files.clone(),
    ));
    let playback = Arc::new(ConsolePlayback::new(
        cfg.playback.clone(),
        invoker,
        files.clone(),
    ));
    let speech = Arc::new(
        SpeechService::new(pipeline, playback)
            .with_channel_timeout_phrases(cfg.channel_timeout_phrases.clone()),
    );

    // 3) Module runtime: built-ins first, then whatever the modules folder holds
    let catalog = Arc::new(FactoryCatalog::new());
    let surface = Arc::new(InMemoryDispatchSurface::new());
    let runtime = Arc::new(ModuleRuntime::with_manifests(
        surface,
        catalog.clone(),
        &cfg.modules,
    ));
    modules::install_factories(&catalog, speech.clone(), Arc::downgrade(&runtime));
    modules::register_builtins(&runtime, catalog.clone()).await?;

    if cfg.modules.modules_dir.is_dir() {
        let report = runtime.discovery.discover(&cfg.modules.modules_dir).await;
        for failure in &report.failures {
            warn!(target = "orator_host", error = %failure, "Module skipped");
        }
    } else {
        info!(target = "orator_host", dir = %cfg.modules.modules_dir.display(), "No modules folder; skipping discovery");
    }
    info!(target = "orator_host", modules = ?runtime.registry.names().await, "Modules ready");

    // 4) Console gateway, restarted on recoverable errors
    let reporter = CommandErrorReporter::new(Arc::new(ChannelDiagnosticsSink::spawn()), cfg.activation.clone());
    let gateway = ConsoleGateway::new(runtime.registry.clone(), reporter, cfg.activation.clone());
    println!("Commands: {0}say <text>, {0}leave, {0}reload [module], {0}modules", cfg.activation);

    let restart = cfg.restart.clone();
    let gateway_rx = shutdown_rx.clone();
    let serve = restart.supervise("console_gateway", || {
        let rx = gateway_rx.clone();
        let gateway = &gateway;
        async move {
            let stdin = BufReader::new(tokio::io::stdin());
            gateway.run(stdin, rx).await
        }
    });

    // Ctrl+C handler to shutdown gracefully
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(target = "orator_host", error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    let outcome = tokio::select! {
        res = serve => res,
        _ = ctrl_c => {
            info!(target = "orator_host", "Shutting down...");
            Ok(())
        }
    };

    // Cancel in-flight synthesis/playback, then drop generated files
    let _ = shutdown_tx.send(true);
    files.clear().await;
    outcome?;
    Ok(())
}
