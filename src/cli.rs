use std::net::SocketAddr;

use clap::Parser;

/// Expose cluster services on specific host interfaces from the annotated
/// port.
#[derive(Debug, Parser)]
#[command(name = "svc-exposer", version)]
pub struct Args {
    /// Annotation key looked for on services to determine the host port to
    /// expose them on.
    #[arg(short = 'a', long, default_value = "svc-exposer.sidero.dev/port")]
    pub annotation_key: String,

    /// CIDRs to match the host IPs against; only ports on matching IPs are
    /// listened on. When empty, all interfaces are listened on.
    #[arg(short = 'b', long, value_delimiter = ',')]
    pub bind_cidrs: Vec<String>,

    /// Host port ranges (`N` or `N-M`) that must never be exposed; a
    /// disallowed host port is skipped with a warning.
    #[arg(long, value_delimiter = ',')]
    pub disallowed_host_port_ranges: Vec<String>,

    /// Address to bind the debug HTTP server to. Disabled when not set.
    #[arg(long)]
    pub debug_bind_addr: Option<SocketAddr>,

    /// Enable debug logs.
    #[arg(long)]
    pub debug: bool,
}
