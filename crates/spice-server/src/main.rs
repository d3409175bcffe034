use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use spice_api::{HttpApi, Metrics, ServerConfig, SimServer};
use spice_exec::{Simulator, SimulatorConfig, backend_by_name};
use spice_observe::{LoggerConfig, LoggerFormat, logger_init};
use tracing::{info, warn};

/// Serve simulation sessions over HTTP.
#[derive(Debug, Parser)]
#[command(version, long_about = None)]
struct Args {
    /// Simulator backend: ltspice, ngspice, qspice or xyce
    #[arg(default_value = "ltspice")]
    simulator: String,
    /// Per-run timeout in seconds; 0 disables it
    #[arg(default_value_t = 300)]
    timeout: u64,
    /// Port to listen on
    #[arg(short, long, default_value_t = 9000)]
    port: u16,
    /// Address to bind
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,
    /// Working directory for uploads and results
    #[arg(short, long, default_value = "./temp")]
    output: PathBuf,
    /// Simulations run in parallel
    #[arg(short = 'l', long, default_value_t = 4)]
    parallel: usize,
    /// Simulator executable, overriding discovery
    #[arg(long)]
    exe: Option<String>,
    /// Log filter, e.g. `info` or `spice_core=debug,info`
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Log format: text, json or journald
    #[arg(long, default_value = "text")]
    log_format: LoggerFormat,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            output_folder: self.output.clone(),
            parallel_sims: self.parallel.max(1),
            timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log = LoggerConfig::default()
        .with_level(&args.log_level)
        .with_format(args.log_format);
    logger_init(&log)?;

    let backend = backend_by_name(&args.simulator)?;
    let mut sim_cfg = SimulatorConfig::default();
    if let Some(exe) = &args.exe {
        sim_cfg = sim_cfg.with_executable(exe);
    }
    let simulator = Simulator::new(backend, sim_cfg)?;
    if !simulator.is_available() {
        warn!(simulator = simulator.name(), "simulator executable not found; runs will fail");
    }

    let cfg = args.server_config();
    let addr = cfg.addr();
    let server = SimServer::new(simulator, cfg)?;
    let metrics = Arc::new(Metrics::new().context("registering metrics")?);
    let app = HttpApi::new(Arc::clone(&server))
        .with_metrics(metrics)
        .router();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    spice_api::axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    server.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
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
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["spice-server"]);
        assert_eq!(args.simulator, "ltspice");
        let cfg = args.server_config();
        assert_eq!(cfg.addr(), "localhost:9000");
        assert_eq!(cfg.timeout, Some(Duration::from_secs(300)));
        assert_eq!(cfg.parallel_sims, 4);
    }

    #[test]
    fn positional_and_flags() {
        let args = Args::parse_from([
            "spice-server",
            "ngspice",
            "0",
            "-p",
            "9100",
            "-l",
            "0",
            "-o",
            "/tmp/sims",
            "--log-format",
            "json",
        ]);
        let cfg = args.server_config();
        assert_eq!(args.simulator, "ngspice");
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.timeout, None);
        assert_eq!(cfg.parallel_sims, 1);
        assert_eq!(cfg.output_folder, PathBuf::from("/tmp/sims"));
        assert!(matches!(args.log_format, LoggerFormat::Json));
    }
}
