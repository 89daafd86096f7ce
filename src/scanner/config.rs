//! The immutable description of a scan.
use std::net::Ipv6Addr;
use std::num::NonZeroU32;
use std::time::Duration;

use pnet::util::MacAddr;

use crate::port_strategy::PortStrategy;

/// Capacity of the TCP-state table when the send rate is not limited.
pub const UNBOUNDED_RESPONDER_CAPACITY: usize = 65_536;

/// Errors in a scan configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no ports to scan")]
    EmptyPorts,

    #[error("maximum rate must be positive, or -1 for no limit")]
    ZeroRate,

    #[error("stats interval must be longer than zero")]
    ZeroInterval,

    #[error("source address must be specified")]
    UnspecifiedSource,

    #[error("interface {0} uses link headers, a router MAC address is required")]
    MissingRouterMac(String),
}

/// Source port of the probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePort {
    Fixed(u16),
    /// A fresh port of at least 4096 for every probe.
    Random,
}

impl SourcePort {
    pub const fn fixed(self) -> Option<u16> {
        match self {
            Self::Fixed(port) => Some(port),
            Self::Random => None,
        }
    }
}

impl From<Option<u16>> for SourcePort {
    fn from(port: Option<u16>) -> Self {
        port.map_or(Self::Random, Self::Fixed)
    }
}

/// Probe rate ceiling in probes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rate {
    Limited(NonZeroU32),
    Unlimited,
}

impl Rate {
    /// Interprets the command line value: negative means no limit, zero is
    /// rejected and anything past `u32::MAX` is clamped.
    pub fn from_max_rate(max_rate: i64) -> Result<Self, ConfigError> {
        if max_rate < 0 {
            return Ok(Self::Unlimited);
        }
        let rate = u32::try_from(max_rate).unwrap_or(u32::MAX);
        NonZeroU32::new(rate)
            .map(Self::Limited)
            .ok_or(ConfigError::ZeroRate)
    }
}

/// Everything both engines need to know, fixed before either starts.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub source_addr: Ipv6Addr,
    pub source_port: SourcePort,
    /// Overrides the interface's own hardware address.
    pub source_mac: Option<MacAddr>,
    /// Next hop for every frame. Needed when the interface has link headers.
    pub router_mac: Option<MacAddr>,
    pub ports: PortStrategy,
    pub max_rate: Rate,
    pub show_closed: bool,
    pub banners: bool,
    pub stats_interval: Duration,
    pub finish_wait: Duration,
    pub banner_timeout: Duration,
}

impl ScanConfig {
    pub fn new(source_addr: Ipv6Addr, ports: PortStrategy) -> Self {
        Self {
            source_addr,
            source_port: SourcePort::Random,
            source_mac: None,
            router_mac: None,
            ports,
            max_rate: Rate::Unlimited,
            show_closed: false,
            banners: false,
            stats_interval: Duration::from_millis(1000),
            finish_wait: Duration::from_millis(5000),
            banner_timeout: Duration::from_millis(2500),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ports.is_empty() {
            return Err(ConfigError::EmptyPorts);
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.source_addr.is_unspecified() {
            return Err(ConfigError::UnspecifiedSource);
        }
        Ok(())
    }

    /// Probes allowed between two counter resets. The rate applies per
    /// second and resets happen once per stats interval.
    pub fn send_ceiling(&self) -> u32 {
        match self.max_rate {
            Rate::Unlimited => u32::MAX,
            Rate::Limited(rate) => {
                let per_interval =
                    u128::from(rate.get()) * self.stats_interval.as_millis() / 1000;
                u32::try_from(per_interval.max(1)).unwrap_or(u32::MAX)
            }
        }
    }

    /// Slots in the TCP-state table: enough for every connection that can be
    /// opened within one banner timeout.
    pub fn responder_capacity(&self) -> usize {
        match self.max_rate {
            Rate::Unlimited => UNBOUNDED_RESPONDER_CAPACITY,
            Rate::Limited(rate) => {
                let slots = u128::from(rate.get()) * self.banner_timeout.as_millis() / 1000;
                usize::try_from(slots.max(1)).unwrap_or(UNBOUNDED_RESPONDER_CAPACITY)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ScanOrder;
    use parameterized::parameterized;

    fn config() -> ScanConfig {
        ScanConfig::new(
            "2001:db8::1".parse().unwrap(),
            PortStrategy::pick(&[22, 80], ScanOrder::Serial),
        )
    }

    #[parameterized(max_rate = {-1, -20, 1, 5000, 1 << 40}, expected = {
        Some(Rate::Unlimited),
        Some(Rate::Unlimited),
        NonZeroU32::new(1).map(Rate::Limited),
        NonZeroU32::new(5000).map(Rate::Limited),
        NonZeroU32::new(u32::MAX).map(Rate::Limited)
    })]
    fn rate_from_command_line(max_rate: i64, expected: Option<Rate>) {
        assert_eq!(Rate::from_max_rate(max_rate).ok(), expected);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert_eq!(Rate::from_max_rate(0), Err(ConfigError::ZeroRate));
    }

    #[test]
    fn validation() {
        assert_eq!(config().validate(), Ok(()));

        let empty = ScanConfig {
            ports: PortStrategy::pick(&[], ScanOrder::Serial),
            ..config()
        };
        assert_eq!(empty.validate(), Err(ConfigError::EmptyPorts));

        let no_interval = ScanConfig {
            stats_interval: Duration::ZERO,
            ..config()
        };
        assert_eq!(no_interval.validate(), Err(ConfigError::ZeroInterval));

        let unspecified = ScanConfig {
            source_addr: Ipv6Addr::UNSPECIFIED,
            ..config()
        };
        assert_eq!(unspecified.validate(), Err(ConfigError::UnspecifiedSource));
    }

    #[test]
    fn ceiling_scales_with_the_interval() {
        let mut cfg = config();
        assert_eq!(cfg.send_ceiling(), u32::MAX);

        cfg.max_rate = Rate::from_max_rate(1000).unwrap();
        assert_eq!(cfg.send_ceiling(), 1000);

        cfg.stats_interval = Duration::from_millis(250);
        assert_eq!(cfg.send_ceiling(), 250);

        cfg.max_rate = Rate::from_max_rate(2).unwrap();
        assert_eq!(cfg.send_ceiling(), 1);
    }

    #[test]
    fn responder_capacity_follows_rate() {
        let mut cfg = config();
        assert_eq!(cfg.responder_capacity(), UNBOUNDED_RESPONDER_CAPACITY);

        cfg.max_rate = Rate::from_max_rate(1000).unwrap();
        assert_eq!(cfg.responder_capacity(), 2500);
    }

    #[test]
    fn source_port_from_option() {
        assert_eq!(SourcePort::from(Some(53)), SourcePort::Fixed(53));
        assert_eq!(SourcePort::from(None), SourcePort::Random);
        assert_eq!(SourcePort::Fixed(53).fixed(), Some(53));
        assert_eq!(SourcePort::Random.fixed(), None);
    }
}
