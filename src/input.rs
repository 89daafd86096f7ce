//! Provides a means to read, parse and hold configuration options for scans.
use clap::{Parser, ValueEnum};
use pnet::util::MacAddr;
use serde_derive::Deserialize;
use std::fs;
use std::net::Ipv6Addr;
use std::path::PathBuf;

use crate::banner;

const LOWEST_PORT_NUMBER: u16 = 1;
const TOP_PORT_NUMBER: u16 = 65535;

/// Represents the strategy in which the port scanning will run.
///   - Serial will run from start to end, for example 1 to 1_000.
///   - Random will randomize the order in which ports will be scanned,
///     drawing a new order for every target.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Serial,
    Random,
}

/// How results are written.
///   - List prints one line per result, suitable for grep.
///   - Json writes a single JSON array of result objects.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    List,
    Json,
}

pub type Ports = Vec<u16>;

#[cfg(not(tarpaulin_include))]
pub fn parse_ports_and_ranges(input: &str) -> Result<Ports, String> {
    let mut ports = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => ports.extend(parse_port_range(part, start, end)?),
            None => ports.push(parse_single_port(part)?),
        }
    }

    if ports.is_empty() {
        return Err(String::from("No valid ports or ranges provided"));
    }

    ports.sort_unstable();
    ports.dedup();

    Ok(ports)
}

fn parse_port_range(
    range_str: &str,
    start: &str,
    end: &str,
) -> Result<std::ops::RangeInclusive<u16>, String> {
    if end.contains('-') {
        return Err(format!(
            "Invalid range format '{range_str}'. Expected 'start-end'. Example: 1-1000.",
        ));
    }

    let start: u16 = start
        .parse()
        .map_err(|_| format!("Invalid start port '{start}' in range '{range_str}'"))?;
    let end: u16 = end
        .parse()
        .map_err(|_| format!("Invalid end port '{end}' in range '{range_str}'"))?;

    if start > end {
        return Err(format!(
            "Start port {start} is greater than end port {end} in range '{range_str}'",
        ));
    }
    if start < LOWEST_PORT_NUMBER {
        return Err(format!(
            "Ports in range '{range_str}' must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}",
        ));
    }

    Ok(start..=end)
}

fn parse_single_port(port_str: &str) -> Result<u16, String> {
    let port: u16 = port_str
        .parse()
        .map_err(|_| format!("Invalid port number '{port_str}'"))?;

    if port < LOWEST_PORT_NUMBER {
        return Err(format!(
            "Port {port} must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}",
        ));
    }

    Ok(port)
}

fn parse_mac(input: &str) -> Result<MacAddr, String> {
    input
        .parse()
        .map_err(|_| format!("Invalid MAC address '{input}'. Example: 02:00:5e:10:00:01"))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sixscan",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Stateless IPv6 SYN port scanner.
/// Probes are sent from a raw socket and replies are matched without
/// keeping per-connection state. Needs the privileges to open a raw
/// capture on the chosen interface.
pub struct Opts {
    /// A comma-delimited list or newline-delimited file of IPv6 CIDRs, addresses, or hosts to be scanned.
    #[arg(short, long, value_delimiter = ',')]
    pub addresses: Vec<String>,

    /// A list of ports and/or port ranges to be scanned. Examples: 80,443,8080 or 1-1000 or 1-1000,8080
    #[arg(short, long, alias = "range", value_parser = parse_ports_and_ranges, conflicts_with = "top")]
    pub ports: Option<Ports>,

    /// Scan only the ports sixscan knows how to grab banners from.
    #[arg(long)]
    pub top: bool,

    /// Network interface to send and capture on. Defaults to the first
    /// interface that is up and has a global IPv6 address.
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Source address of the probes. Defaults to the interface's global address.
    #[arg(short, long)]
    pub source_ip: Option<Ipv6Addr>,

    /// Fixed source port. A random port of at least 4096 is drawn per probe otherwise.
    #[arg(long)]
    pub source_port: Option<u16>,

    /// Source MAC address. Defaults to the interface's address.
    #[arg(long, value_parser = parse_mac)]
    pub source_mac: Option<MacAddr>,

    /// MAC address of the next hop. Required on interfaces with link headers.
    #[arg(short, long, value_parser = parse_mac)]
    pub router_mac: Option<MacAddr>,

    /// Maximum probes per second. -1 disables the limit.
    #[arg(short, long, default_value = "-1", allow_negative_numbers = true)]
    pub max_rate: i64,

    /// Also report closed ports.
    #[arg(long)]
    pub show_closed: bool,

    /// Complete the handshake on known service ports and record their banners.
    #[arg(short, long)]
    pub banners: bool,

    /// Format of the results.
    #[arg(long, value_enum, ignore_case = true, default_value = "list")]
    pub output_format: OutputFormat,

    /// File to write results to. Results go to stdout otherwise.
    #[arg(short, long, value_parser)]
    pub output: Option<PathBuf>,

    /// The order of scanning to be performed. The "serial" option will
    /// scan ports in ascending order while the "random" option will scan
    /// ports randomly.
    #[arg(long, value_enum, ignore_case = true, default_value = "serial")]
    pub scan_order: ScanOrder,

    /// Milliseconds between progress reports. The rate limit is enforced per interval.
    #[arg(long, default_value = "1000")]
    pub stats_interval: u64,

    /// Milliseconds to keep listening after the last probe was sent.
    #[arg(long, default_value = "5000")]
    pub finish_wait: u64,

    /// Milliseconds a banner capture may take before it is closed.
    #[arg(long, default_value = "2500")]
    pub banner_timeout: u64,

    /// Do not print progress, banner or warnings.
    #[arg(short, long)]
    pub quiet: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    pub fn read() -> Self {
        let mut opts = Opts::parse();

        if opts.top {
            opts.ports = Some(banner::ports());
        }

        opts
    }

    /// Reads the command line arguments into an Opts struct and merge
    /// values found within the user configuration file.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            addresses,
            max_rate,
            show_closed,
            banners,
            output_format,
            scan_order,
            stats_interval,
            finish_wait,
            banner_timeout,
            quiet
        );
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if self.$field.is_none() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        // Ports given on the command line, or through --top, win.
        merge_optional!(
            ports,
            interface,
            source_ip,
            source_port,
            source_mac,
            router_mac,
            output
        );
    }

    /// The port set to scan: the explicit list, else every port.
    pub fn port_list(&self) -> Ports {
        self.ports
            .clone()
            .unwrap_or_else(|| (LOWEST_PORT_NUMBER..=TOP_PORT_NUMBER).collect())
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            addresses: vec![],
            ports: None,
            top: false,
            interface: None,
            source_ip: None,
            source_port: None,
            source_mac: None,
            router_mac: None,
            max_rate: -1,
            show_closed: false,
            banners: false,
            output_format: OutputFormat::List,
            output: None,
            scan_order: ScanOrder::Serial,
            stats_interval: 1000,
            finish_wait: 5000,
            banner_timeout: 2500,
            quiet: true,
            no_config: true,
            config_path: None,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[cfg(not(tarpaulin_include))]
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    addresses: Option<Vec<String>>,
    ports: Option<Vec<u16>>,
    interface: Option<String>,
    source_ip: Option<Ipv6Addr>,
    source_port: Option<u16>,
    source_mac: Option<MacAddr>,
    router_mac: Option<MacAddr>,
    max_rate: Option<i64>,
    show_closed: Option<bool>,
    banners: Option<bool>,
    output_format: Option<OutputFormat>,
    output: Option<PathBuf>,
    scan_order: Option<ScanOrder>,
    stats_interval: Option<u64>,
    finish_wait: Option<u64>,
    banner_timeout: Option<u64>,
    quiet: Option<bool>,
}

#[cfg(not(tarpaulin_include))]
#[allow(clippy::doc_link_with_quotes)]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing or unreadable file yields an empty config.
    ///
    /// # Format
    ///
    /// addresses = ["2001:db8::/120"]
    /// ports = [22, 80, 443]
    /// interface = "eth0"
    /// router_mac = "02:00:5e:10:00:01"
    /// max_rate = 5000
    /// banners = true
    /// output_format = "json"
    /// scan_order = "Random"
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self, toml::de::Error> {
        let config_path = custom_config_path.unwrap_or_else(default_config_path);
        let content = fs::read_to_string(config_path).unwrap_or_default();

        toml::from_str(&content)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> PathBuf {
    let mut config_path = dirs::home_dir().unwrap_or_default();
    config_path.push(".sixscan.toml");
    config_path
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use parameterized::parameterized;
    use pnet::util::MacAddr;

    use super::{parse_ports_and_ranges, Config, Opts, OutputFormat, ScanOrder};

    fn config() -> Config {
        Config {
            addresses: Some(vec!["2001:db8::1".to_owned()]),
            max_rate: Some(10_000),
            banners: Some(true),
            output_format: Some(OutputFormat::Json),
            scan_order: Some(ScanOrder::Random),
            stats_interval: Some(500),
            interface: Some("eth1".to_owned()),
            router_mac: Some(MacAddr::new(2, 0, 0, 0, 0, 1)),
            ports: Some(vec![22, 80]),
            ..Config::default()
        }
    }

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn parse_full_command_line() {
        let opts = Opts::parse_from([
            "sixscan",
            "-a",
            "2001:db8::/126,2001:db8:1::5",
            "-p",
            "22,80-81",
            "--max-rate",
            "-1",
            "--router-mac",
            "02:00:5e:10:00:01",
            "--source-ip",
            "2001:db8::ffff",
            "--output-format",
            "JSON",
        ]);

        assert_eq!(opts.addresses, vec!["2001:db8::/126", "2001:db8:1::5"]);
        assert_eq!(opts.ports, Some(vec![22, 80, 81]));
        assert_eq!(opts.max_rate, -1);
        assert_eq!(opts.router_mac, Some(MacAddr::new(2, 0, 0x5e, 0x10, 0, 1)));
        assert_eq!(opts.source_ip, Some("2001:db8::ffff".parse().unwrap()));
        assert_eq!(opts.output_format, OutputFormat::Json);
        assert_eq!(opts.stats_interval, 1000);
        assert_eq!(opts.finish_wait, 5000);
    }

    #[test]
    fn invalid_mac_is_rejected() {
        let result = Opts::try_parse_from(["sixscan", "--router-mac", "02:00:5e"]);
        assert!(result.is_err());
    }

    #[test]
    fn top_conflicts_with_ports() {
        let result = Opts::try_parse_from(["sixscan", "--top", "-p", "80"]);
        assert!(result.is_err());
    }

    #[test]
    fn opts_no_merge_when_config_is_ignored() {
        let mut opts = Opts::default();
        opts.merge(&config());

        assert_eq!(opts.addresses, Vec::<String>::new());
        assert_eq!(opts.max_rate, -1);
        assert!(!opts.banners);
        assert_eq!(opts.scan_order, ScanOrder::Serial);
        assert_eq!(opts.interface, None);
    }

    #[test]
    fn opts_merge_required_arguments() {
        let mut opts = Opts::default();
        let config = config();

        opts.merge_required(&config);

        assert_eq!(opts.addresses, config.addresses.unwrap());
        assert_eq!(opts.max_rate, 10_000);
        assert!(opts.banners);
        assert_eq!(opts.output_format, OutputFormat::Json);
        assert_eq!(opts.scan_order, ScanOrder::Random);
        assert_eq!(opts.stats_interval, 500);
        assert_eq!(opts.finish_wait, 5000);
    }

    #[test]
    fn opts_merge_optional_keeps_command_line_values() {
        let mut opts = Opts {
            ports: Some(vec![443]),
            ..Opts::default()
        };
        opts.merge_optional(&config());

        assert_eq!(opts.ports, Some(vec![443]));
        assert_eq!(opts.interface.as_deref(), Some("eth1"));
        assert_eq!(opts.router_mac, Some(MacAddr::new(2, 0, 0, 0, 0, 1)));
        assert_eq!(opts.source_port, None);
    }

    #[test]
    fn config_from_toml() {
        let config: Config = toml::from_str(
            r#"
            addresses = ["2001:db8::/120"]
            router_mac = "02:00:5e:10:00:01"
            source_ip = "2001:db8::2"
            output_format = "json"
            scan_order = "Random"
            max_rate = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.router_mac, Some(MacAddr::new(2, 0, 0x5e, 0x10, 0, 1)));
        assert_eq!(config.source_ip, Some("2001:db8::2".parse().unwrap()));
        assert_eq!(config.output_format, Some(OutputFormat::Json));
        assert_eq!(config.scan_order, Some(ScanOrder::Random));
        assert_eq!(config.max_rate, Some(100));
    }

    #[test]
    fn missing_config_file_is_empty() {
        let config = Config::read(Some("does/not/exist.toml".into())).unwrap();
        assert!(config.addresses.is_none());
    }

    #[test]
    fn port_list_defaults_to_every_port() {
        let opts = Opts::default();
        let ports = opts.port_list();
        assert_eq!(ports.len(), 65_535);
        assert_eq!(ports.first(), Some(&1));
    }

    #[parameterized(input = {
        "80", "80,443,8080", "1-5", "80,443,1-3,8080", "80, 443, 1-3, 8080", "80,443,80,443",
        "1,80,443,1-5,8080,9090,10-12"
    }, expected = {
        vec![80], vec![80, 443, 8080], vec![1, 2, 3, 4, 5], vec![1, 2, 3, 80, 443, 8080],
        vec![1, 2, 3, 80, 443, 8080], vec![80, 443], vec![1, 2, 3, 4, 5, 10, 11, 12, 80, 443, 8080, 9090]
    })]
    fn parse_ports_and_ranges_accepts(input: &str, expected: Vec<u16>) {
        assert_eq!(parse_ports_and_ranges(input), Ok(expected));
    }

    #[parameterized(input = {
        "", "80,abc,443", "80,1-abc,443", "80,1-2-3,443", "80,5-1,443", "80,70000,443",
        "80,1-70000,443", "80,0,443", "0-10"
    }, message = {
        "No valid ports or ranges provided",
        "Invalid port number 'abc'",
        "Invalid end port 'abc' in range '1-abc'",
        "Invalid range format '1-2-3'. Expected 'start-end'",
        "Start port 5 is greater than end port 1 in range '5-1'",
        "Invalid port number '70000'",
        "Invalid end port '70000' in range '1-70000'",
        "Port 0 must be between 1 and 65535",
        "Ports in range '0-10' must be between 1 and 65535"
    })]
    fn parse_ports_and_ranges_rejects(input: &str, message: &str) {
        let error = parse_ports_and_ranges(input).unwrap_err();
        assert!(error.contains(message), "{error}");
    }
}
