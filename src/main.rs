use std::fs::File;
use std::io;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::debug;

use sixscan::address::parse_addresses;
use sixscan::input::{Config, Opts};
use sixscan::net::datalink::{default_interface, interface_ipv6};
use sixscan::output::{sink_for, OutputSink};
use sixscan::port_strategy::PortStrategy;
use sixscan::scanner::{Rate, ScanConfig, Scanner};
use sixscan::tui::print_opening;
use sixscan::{detail, output};

#[cfg(not(tarpaulin_include))]
#[tokio::main]
/// Stateless IPv6 scanning from the command line.
/// The scan itself lives in the scanner module.
async fn main() -> Result<()> {
    env_logger::init();

    let mut opts = Opts::read();
    let config = Config::read(opts.config_path.clone()).context("Failed to parse the config file")?;
    opts.merge(&config);

    debug!("Main() `opts` arguments are {opts:?}");
    print_opening(opts.quiet);

    let targets = parse_addresses(&opts).await;
    if targets.is_empty() {
        bail!("No IPv6 targets to scan, check the --addresses argument");
    }

    let interface = match &opts.interface {
        Some(name) => name.clone(),
        None => default_interface()
            .context("No interface with a global IPv6 address found, pass --interface")?,
    };
    let source_ip = match opts.source_ip {
        Some(addr) => addr,
        None => interface_ipv6(&interface)?
            .with_context(|| format!("{interface} has no global IPv6 address, pass --source-ip"))?,
    };

    let ports = PortStrategy::pick(&opts.port_list(), opts.scan_order);
    detail!(
        format!(
            "Scanning {} addresses x {} ports from {source_ip} on {interface}",
            targets.len(),
            ports.len()
        ),
        opts.quiet
    );

    let mut scan_config = ScanConfig::new(source_ip, ports);
    scan_config.source_port = opts.source_port.into();
    scan_config.source_mac = opts.source_mac;
    scan_config.router_mac = opts.router_mac;
    scan_config.max_rate = Rate::from_max_rate(opts.max_rate)?;
    scan_config.show_closed = opts.show_closed;
    scan_config.banners = opts.banners;
    scan_config.stats_interval = Duration::from_millis(opts.stats_interval);
    scan_config.finish_wait = Duration::from_millis(opts.finish_wait);
    scan_config.banner_timeout = Duration::from_millis(opts.banner_timeout);

    let sink = open_output(&opts)?;
    let quiet = opts.quiet;

    let summary = tokio::task::spawn_blocking(move || {
        let mut scanner = Scanner::new(targets, sink);
        scanner.configure(scan_config)?;
        scanner.run(&interface, quiet)
    })
    .await
    .context("Scan thread failed")??;

    output!(
        format!(
            "{} probes sent, {} frames received",
            summary.sent, summary.received
        ),
        quiet
    );
    Ok(())
}

fn open_output(opts: &Opts) -> Result<Box<dyn OutputSink>> {
    Ok(match &opts.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            sink_for(opts.output_format, file)
        }
        None => sink_for(opts.output_format, io::stdout()),
    })
}
