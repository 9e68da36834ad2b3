//! Clap derive structures for the `lbsync` binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// lbsync -- keep a cloud load balancer in line with ingress rules
#[derive(Debug, Parser)]
#[command(
    name = "lbsync",
    version,
    about = "Reconcile cloud load balancer listeners onto ingress rules",
    long_about = "Watches ingress rule objects and converges the listeners, forwarding\n\
        rules and backends of one managed cloud load balancer onto them.\n\n\
        Runs a reconciliation cycle every update period until interrupted."
)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short = 'c', env = "LBSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Ingress and service manifest (YAML), re-read every cycle
    #[arg(long, short = 'm', env = "LBSYNC_MANIFEST")]
    pub manifest: PathBuf,

    /// Run a single reconciliation cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Validate the manifest for rule conflicts without contacting the cloud
    #[arg(long, conflicts_with = "once")]
    pub check: bool,

    /// Prometheus exporter listen address
    #[arg(long, env = "LBSYNC_METRICS_ADDR", default_value = "0.0.0.0:9100")]
    pub metrics_addr: SocketAddr,

    /// Do not start the Prometheus exporter
    #[arg(long)]
    pub no_metrics: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, env = "LBSYNC_LOG_JSON")]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn check_and_once_conflict() {
        let parsed = Cli::try_parse_from(["lbsync", "-m", "m.yaml", "--check", "--once"]);
        assert!(parsed.is_err());
    }
}
