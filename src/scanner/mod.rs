//! Core functionality for actual scanning behaviour.
//!
//! A [`Scanner`] is configured once and run once. Running it starts two
//! engine threads on a shared [`Transport`]: the [`SendEngine`] emits one SYN
//! per target and port, the [`ReceiveEngine`] classifies whatever comes back.
//! The calling thread reports progress until the send engine is done, waits
//! for stragglers, stops capture and finalises the output.
mod config;
mod counters;
mod receiver;
mod sender;

pub use config::{ConfigError, Rate, ScanConfig, SourcePort, UNBOUNDED_RESPONDER_CAPACITY};
pub use counters::{CompletionFlag, Counters, RateLimiter};
pub use receiver::{decode_reply, DropReason, ReceiveEngine, Reply};
pub use sender::{random_source_port, Probe, SendEngine};

use std::io;
use std::sync::{Mutex, PoisonError};
use std::thread;

use log::{debug, warn};
use pnet::util::MacAddr;

use crate::address::TargetSource;
use crate::detail;
use crate::net::datalink::DatalinkTransport;
use crate::net::{CaptureFilter, LinkAddrs, Transport, TransportError};
use crate::output::OutputSink;
use crate::responder::Responder;

/// Read buffer handed to the capture channel.
const SNAPLEN: usize = 65_536;

/// Lifecycle of a [`Scanner`]. There is no way back from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Configured,
    Running,
    Draining,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scanner has not been configured")]
    NotConfigured,

    #[error("a scanner can only be run once")]
    AlreadyRun,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to start the {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("the {0} thread panicked")]
    EnginePanicked(&'static str),
}

/// Totals of a finished scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Probes the transport accepted.
    pub sent: u64,
    /// Frames that passed the capture filter, replies or not.
    pub received: u64,
}

pub struct Scanner {
    state: ScanState,
    config: Option<ScanConfig>,
    targets: Mutex<Box<dyn TargetSource>>,
    output: Box<dyn OutputSink>,
}

impl Scanner {
    pub fn new<T>(targets: T, output: Box<dyn OutputSink>) -> Self
    where
        T: TargetSource + 'static,
    {
        Self {
            state: ScanState::Idle,
            config: None,
            targets: Mutex::new(Box::new(targets)),
            output,
        }
    }

    pub const fn state(&self) -> ScanState {
        self.state
    }

    pub const fn config(&self) -> Option<&ScanConfig> {
        self.config.as_ref()
    }

    /// Validates and stores `config`. May be repeated until the scan runs.
    pub fn configure(&mut self, config: ScanConfig) -> Result<(), ScanError> {
        if !matches!(self.state, ScanState::Idle | ScanState::Configured) {
            return Err(ScanError::AlreadyRun);
        }
        config.validate()?;
        self.config = Some(config);
        transition(&mut self.state, ScanState::Configured);
        Ok(())
    }

    /// Opens `interface` and runs the scan on it.
    pub fn run(&mut self, interface: &str, quiet: bool) -> Result<ScanSummary, ScanError> {
        self.ensure_configured()?;
        match DatalinkTransport::open(interface, SNAPLEN) {
            Ok(transport) => self.run_with(transport, quiet),
            Err(e) => {
                transition(&mut self.state, ScanState::Closed);
                Err(e.into())
            }
        }
    }

    /// Runs the scan on an already open transport, which is closed (dropped)
    /// before returning.
    pub fn run_with<T: Transport>(
        &mut self,
        mut transport: T,
        quiet: bool,
    ) -> Result<ScanSummary, ScanError> {
        self.ensure_configured()?;
        transition(&mut self.state, ScanState::Running);
        let result = self.execute(&mut transport, quiet);
        transition(&mut self.state, ScanState::Closed);
        drop(transport);
        result
    }

    fn ensure_configured(&self) -> Result<(), ScanError> {
        match self.state {
            ScanState::Configured => Ok(()),
            ScanState::Idle => Err(ScanError::NotConfigured),
            _ => Err(ScanError::AlreadyRun),
        }
    }

    fn execute(
        &mut self,
        transport: &mut dyn Transport,
        quiet: bool,
    ) -> Result<ScanSummary, ScanError> {
        let Self {
            state,
            config,
            targets,
            output,
        } = self;
        let config = config.as_ref().ok_or(ScanError::NotConfigured)?;

        let link = link_addrs(config, transport)?;
        transport.set_filter(CaptureFilter::new(
            config.source_addr,
            config.source_port.fixed(),
        ))?;
        let transport: &dyn Transport = transport;

        let mut responder = config.banners.then(|| {
            Responder::init(
                config.responder_capacity(),
                config.source_addr,
                link,
                config.banner_timeout,
            )
        });

        if let Err(e) = output.begin() {
            warn!("Failed to write output header: {e}");
        }

        let counters = Counters::new();
        let done = CompletionFlag::new();
        let targets: &Mutex<Box<dyn TargetSource>> = targets;

        let receive_engine = ReceiveEngine::new(
            config,
            transport,
            &counters,
            &mut **output,
            responder.as_mut(),
        );
        let limiter = RateLimiter::new(&counters, config.send_ceiling());
        let send_engine = SendEngine::new(config, transport, targets, limiter, &done, link);

        let (sent, mut received) = thread::scope(|s| -> Result<(u64, u64), ScanError> {
            let receiver = thread::Builder::new()
                .name("receiver".to_owned())
                .spawn_scoped(s, move || receive_engine.run())
                .map_err(|source| ScanError::Spawn {
                    name: "receiver",
                    source,
                })?;

            let sender = match thread::Builder::new()
                .name("sender".to_owned())
                .spawn_scoped(s, move || send_engine.run())
            {
                Ok(handle) => handle,
                Err(source) => {
                    transport.break_loop();
                    return Err(ScanError::Spawn {
                        name: "sender",
                        source,
                    });
                }
            };

            let mut received = 0u64;
            loop {
                // read the flag first so the last interval is still counted
                let finished = done.is_set() || sender.is_finished();
                let snt = counters.take_sent();
                let rcv = counters.take_received();
                received += u64::from(rcv);
                if !quiet {
                    let progress = targets
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .progress();
                    eprint!("snt:{snt:4} rcv:{rcv:4} p:{:3.0}%\r", progress * 100.0);
                }
                if finished {
                    break;
                }
                thread::sleep(config.stats_interval);
            }
            if !quiet {
                eprintln!();
            }

            transition(state, ScanState::Draining);
            detail!(
                format!("Waiting {:.1} more seconds...", config.finish_wait.as_secs_f32()),
                quiet
            );
            thread::sleep(config.finish_wait);
            transport.break_loop();

            let sent = sender.join();
            let capture = receiver.join();
            let sent = sent.map_err(|_| ScanError::EnginePanicked("sender"))?;
            capture.map_err(|_| ScanError::EnginePanicked("receiver"))?;
            Ok((sent, received))
        })?;

        if let Some(responder) = responder.as_mut() {
            responder.finish(transport, &mut **output);
        }

        let residual = counters.take_received();
        received += u64::from(residual);
        if !quiet {
            eprintln!("rcv:{residual:4}");
        }

        if let Err(e) = output.end() {
            warn!("Failed to write output trailer: {e}");
        }
        debug!("Scan finished: {sent} probes sent, {received} frames received");
        Ok(ScanSummary { sent, received })
    }
}

fn transition(state: &mut ScanState, next: ScanState) {
    debug!("Scanner state {state:?} -> {next:?}");
    *state = next;
}

/// Link addresses of every frame we send. Without link headers they are
/// stripped by the transport and only need to exist.
fn link_addrs(config: &ScanConfig, transport: &dyn Transport) -> Result<LinkAddrs, ConfigError> {
    if !transport.has_link_headers() {
        return Ok(LinkAddrs::new(MacAddr::zero(), MacAddr::zero()));
    }
    let router = config
        .router_mac
        .ok_or_else(|| ConfigError::MissingRouterMac(transport.name().to_owned()))?;
    let source = config
        .source_mac
        .or_else(|| transport.link_address())
        .unwrap_or_else(MacAddr::zero);
    Ok(LinkAddrs::new(source, router))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Targets;
    use crate::input::{OutputFormat, ScanOrder};
    use crate::output::sink_for;
    use crate::port_strategy::PortStrategy;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Swallows every frame and never captures anything.
    #[derive(Default)]
    struct Sink {
        link_headers: bool,
        sent: AtomicUsize,
        stop: AtomicBool,
    }

    impl Transport for Sink {
        fn name(&self) -> &str {
            "sink0"
        }

        fn has_link_headers(&self) -> bool {
            self.link_headers
        }

        fn set_filter(&mut self, _: CaptureFilter) -> Result<(), TransportError> {
            Ok(())
        }

        fn send(&self, _: &[u8]) -> Result<(), TransportError> {
            self.sent.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn capture_loop(&self, _: &mut dyn FnMut(u64, &[u8])) -> Result<(), TransportError> {
            while !self.stop.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }

        fn break_loop(&self) {
            self.stop.store(true, Ordering::Release);
        }
    }

    fn config(ports: &[u16]) -> ScanConfig {
        ScanConfig {
            stats_interval: Duration::from_millis(10),
            finish_wait: Duration::from_millis(10),
            ..ScanConfig::new(
                "2001:db8::1".parse().unwrap(),
                PortStrategy::pick(ports, ScanOrder::Serial),
            )
        }
    }

    fn scanner(targets: &[&str]) -> Scanner {
        let targets: Targets = targets.iter().map(|t| t.parse().unwrap()).collect();
        Scanner::new(targets, sink_for(OutputFormat::List, io::sink()))
    }

    #[test]
    fn run_requires_configuration() {
        let mut scanner = scanner(&["2001:db8::2"]);
        assert_eq!(scanner.state(), ScanState::Idle);
        assert!(matches!(
            scanner.run_with(Sink::default(), true),
            Err(ScanError::NotConfigured)
        ));
        assert_eq!(scanner.state(), ScanState::Idle);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut scanner = scanner(&["2001:db8::2"]);
        let err = scanner.configure(config(&[])).unwrap_err();
        assert!(matches!(err, ScanError::Config(ConfigError::EmptyPorts)));
        assert_eq!(scanner.state(), ScanState::Idle);

        scanner.configure(config(&[80])).unwrap();
        scanner.configure(config(&[443])).unwrap();
        assert_eq!(scanner.state(), ScanState::Configured);
        assert_eq!(scanner.config().unwrap().ports.len(), 1);
    }

    #[test]
    fn runs_once() {
        let mut scanner = scanner(&["2001:db8::2", "2001:db8::3"]);
        scanner.configure(config(&[22, 80, 443])).unwrap();

        let summary = scanner.run_with(Sink::default(), true).unwrap();
        assert_eq!(summary.sent, 6);
        assert_eq!(scanner.state(), ScanState::Closed);

        assert!(matches!(
            scanner.run_with(Sink::default(), true),
            Err(ScanError::AlreadyRun)
        ));
        assert!(matches!(
            scanner.configure(config(&[22])),
            Err(ScanError::AlreadyRun)
        ));
    }

    #[test]
    fn empty_target_space_finishes_immediately() {
        let mut scanner = scanner(&[]);
        scanner.configure(config(&[22])).unwrap();
        let summary = scanner.run_with(Sink::default(), true).unwrap();
        assert_eq!(summary, ScanSummary::default());
    }

    #[test]
    fn link_headers_need_a_router() {
        let mut scanner = scanner(&["2001:db8::2"]);
        scanner.configure(config(&[22])).unwrap();
        let transport = Sink {
            link_headers: true,
            ..Sink::default()
        };

        let err = scanner.run_with(transport, true).unwrap_err();
        assert!(matches!(
            err,
            ScanError::Config(ConfigError::MissingRouterMac(ref name)) if name == "sink0"
        ));
        assert_eq!(scanner.state(), ScanState::Closed);
    }

    #[test]
    fn source_mac_falls_back_to_the_interface() {
        let transport = Sink {
            link_headers: true,
            ..Sink::default()
        };
        let router = MacAddr::new(2, 0, 0, 0, 0, 0xfe);
        let cfg = ScanConfig {
            router_mac: Some(router),
            ..config(&[22])
        };
        assert_eq!(
            link_addrs(&cfg, &transport).unwrap(),
            LinkAddrs::new(MacAddr::zero(), router)
        );

        let own = MacAddr::new(2, 0, 0, 0, 0, 1);
        let cfg = ScanConfig {
            source_mac: Some(own),
            ..cfg
        };
        assert_eq!(link_addrs(&cfg, &transport).unwrap(), LinkAddrs::new(own, router));
    }
}
