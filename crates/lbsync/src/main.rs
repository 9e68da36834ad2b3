//! lbsync -- cloud load balancer reconciliation controller.

mod cli;
mod error;
mod manifest;

use std::sync::Arc;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lbsync_core::{
    HealthPoller, MetricsSink, NoopMetrics, PrometheusMetrics, Scheduler, Updater, connect,
    validate,
};

use crate::cli::Cli;
use crate::error::CliError;
use crate::manifest::{Manifest, ManifestSource};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if cli.check {
        return check(&cli).await;
    }

    let config = lbsync_config::load_controller_config(cli.config.as_deref())?;

    let metrics: Arc<dyn MetricsSink> = if cli.no_metrics {
        Arc::new(NoopMetrics)
    } else {
        PrometheusBuilder::new()
            .with_http_listener(cli.metrics_addr)
            .install()
            .map_err(|e| CliError::Metrics {
                addr: cli.metrics_addr.to_string(),
                message: e.to_string(),
            })?;
        info!(addr = %cli.metrics_addr, "prometheus exporter listening");
        Arc::new(PrometheusMetrics)
    };

    let source = Arc::new(ManifestSource::new(&cli.manifest));
    let adapter = connect(&config, Arc::clone(&metrics))?;
    let updater = Arc::new(Updater::new(
        &config,
        Arc::clone(&adapter),
        source.clone(),
        source,
        Arc::clone(&metrics),
    ));

    let lb = updater.ensure_load_balancer().await?;
    info!(lb_id = %lb.id, name = %lb.name, "managing load balancer");

    if cli.once {
        return run_once(&updater).await;
    }

    let cancel = CancellationToken::new();
    let cycles = updater.store().subscribe_last_cycle();
    let scheduler = Scheduler::new(updater, config.update_period, Arc::clone(&metrics));
    let mut tasks = vec![tokio::spawn(scheduler.run(cancel.clone()))];

    if config.health_poll_period.is_zero() {
        info!("backend health polling disabled");
    } else {
        let poller = HealthPoller::new(adapter, lb.id.clone(), config.health_poll_period, metrics)
            .with_cycle_signal(cycles);
        tasks.push(tokio::spawn(poller.run(cancel.clone())));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    Ok(())
}

/// One cycle, then report listeners on the load balancer that no
/// ingress manages.
async fn run_once(updater: &Updater) -> Result<(), CliError> {
    let report = updater.update().await?;
    info!(
        added = report.added,
        updated = report.updated,
        deleted = report.deleted,
        failed = report.failed,
        "cycle complete"
    );
    match updater.unmanaged_listeners().await {
        Ok(unmanaged) => {
            for listener in &unmanaged {
                warn!(
                    port = listener.listen_port,
                    protocol = %listener.protocol,
                    name = %listener.name,
                    "listener not managed by any ingress"
                );
            }
        }
        Err(e) => warn!(error = %e, "cannot list cloud listeners"),
    }
    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::PartialApply {
            failed: report.failed,
            total: report.total(),
        })
    }
}

/// Validate the manifest offline, without configuration or credentials.
async fn check(cli: &Cli) -> Result<(), CliError> {
    let manifest = Manifest::read(&cli.manifest).await?;
    validate(&manifest.ingresses).map_err(lbsync_core::CoreError::from)?;
    println!(
        "{}: {} ingresses, no conflicts",
        cli.manifest.display(),
        manifest.ingresses.len()
    );
    Ok(())
}
