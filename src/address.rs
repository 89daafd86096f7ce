//! Provides functions to parse input IPv6 addresses, CIDRs or files, and
//! the target generator the send engine walks.

use std::net::{IpAddr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;

use cidr_utils::cidr::IpCidr;
use itertools::Itertools;
use log::debug;
use tokio::fs;

use crate::input::Opts;
use crate::warning;

/// Source of scan targets, walked once from start to end.
pub trait TargetSource: Send {
    /// Next address in enumeration order, `None` once exhausted.
    fn next_target(&mut self) -> Option<Ipv6Addr>;

    /// Share of the target space handed out so far, in `[0, 1]`.
    fn progress(&self) -> f32;
}

/// Inclusive address ranges enumerated lazily.
///
/// Ranges are kept as `u128` bounds, so a `/64` costs two integers rather
/// than 2^64 addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    ranges: Vec<(u128, u128)>,
    range: usize,
    cursor: Option<u128>,
    emitted: u128,
    total: u128,
}

impl Targets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_addr(&mut self, addr: Ipv6Addr) {
        let value = u128::from(addr);
        self.push_range(value, value);
    }

    pub fn push_cidr(&mut self, first: Ipv6Addr, last: Ipv6Addr) {
        self.push_range(u128::from(first), u128::from(last));
    }

    fn push_range(&mut self, start: u128, end: u128) {
        let (start, end) = (start.min(end), start.max(end));
        self.total = self.total.saturating_add((end - start).saturating_add(1));
        self.ranges.push((start, end));
    }

    /// Number of addresses, saturating at `u128::MAX` for `::/0`.
    pub fn len(&self) -> u128 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl TargetSource for Targets {
    fn next_target(&mut self) -> Option<Ipv6Addr> {
        let &(start, end) = self.ranges.get(self.range)?;
        let value = self.cursor.unwrap_or(start);
        if value == end {
            self.range += 1;
            self.cursor = None;
        } else {
            self.cursor = Some(value + 1);
        }
        self.emitted = self.emitted.saturating_add(1);
        Some(Ipv6Addr::from(value))
    }

    #[allow(clippy::cast_precision_loss)]
    fn progress(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.emitted as f64 / self.total as f64) as f32
    }
}

impl FromIterator<Ipv6Addr> for Targets {
    fn from_iter<I: IntoIterator<Item = Ipv6Addr>>(iter: I) -> Self {
        let mut targets = Self::new();
        for addr in iter {
            targets.push_addr(addr);
        }
        targets
    }
}

/// Parses the string(s) into IPv6 targets.
///
/// Goes through all possible inputs (files or via argparsing). Entries that
/// are neither an address, a CIDR, a resolvable host nor a readable file
/// are reported and skipped.
///
/// ```rust
/// # use sixscan::input::Opts;
/// # use sixscan::address::parse_addresses;
/// # tokio_test();
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn tokio_test() {
/// let mut opts = Opts::default();
/// opts.addresses = vec!["2001:db8::/126".to_owned()];
///
/// let targets = parse_addresses(&opts).await;
/// assert_eq!(targets.len(), 4);
/// # }
/// ```
pub async fn parse_addresses(input: &Opts) -> Targets {
    let mut targets = Targets::new();

    for address in &input.addresses {
        if parse_address(address, &mut targets).await {
            continue;
        }
        if read_targets_from_file(Path::new(address), &mut targets)
            .await
            .is_none()
        {
            warning!(format!("Host {address:?} could not be resolved."), input.quiet);
        }
    }

    targets
}

/// Given a string, parse it as an IPv6 address, CIDR or host and append
/// what it stands for to `targets`. Returns false if nothing was added.
pub async fn parse_address(address: &str, targets: &mut Targets) -> bool {
    if let Ok(addr) = Ipv6Addr::from_str(address) {
        targets.push_addr(addr);
        return true;
    }

    match IpCidr::from_str(address) {
        Ok(IpCidr::V6(cidr)) => {
            targets.push_cidr(cidr.first_address(), cidr.last_address());
            true
        }
        Ok(IpCidr::V4(_)) => {
            debug!("Skipping IPv4 network {address}");
            false
        }
        Err(_) => {
            let addrs = resolve_ips_from_host(address).await;
            let found = !addrs.is_empty();
            addrs.into_iter().for_each(|addr| targets.push_addr(addr));
            found
        }
    }
}

/// Uses DNS to get the IPv6 addresses associated with host
async fn resolve_ips_from_host(source: &str) -> Vec<Ipv6Addr> {
    match tokio::net::lookup_host((source, 80)).await {
        Ok(addrs) => addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V6(v6) => Some(v6),
                IpAddr::V4(_) => None,
            })
            .unique()
            .collect_vec(),
        Err(e) => {
            debug!("Lookup of {source:?} failed: {e}");
            Vec::new()
        }
    }
}

/// Parses an input file of targets, one per line. `#` starts a comment.
/// Returns `None` if the file cannot be read.
async fn read_targets_from_file(path: &Path, targets: &mut Targets) -> Option<()> {
    let content = fs::read_to_string(path).await.ok()?;

    for line in content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
    {
        if !parse_address(line, targets).await {
            debug!("Ignoring {line:?} in {}", path.display());
        }
    }
    Some(())
}
