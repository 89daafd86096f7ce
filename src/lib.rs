//! This crate exposes the internal functionality of the sixscan port
//! scanner.
//!
//! sixscan is a stateless IPv6 SYN scanner. It sends exactly one SYN per
//! target address and port, never keeps state for a probe, and classifies
//! ports purely from the flags of whatever comes back. Optionally it
//! completes the handshake with open ports of well-known services and grabs
//! their banners.
//!
//! ## Architecture Overview
//!
//! The core scanning behaviour is managed by
//! [`Scanner`](crate::scanner::Scanner), which runs two engines over a
//! [`Transport`](crate::net::Transport):
//!
//! 1. **Input Processing**: targets and ports are parsed from the command
//!    line and the config file ([`input`], [`address`])
//! 2. **Port Strategy**: determines the order ports are probed in
//!    ([`port_strategy`])
//! 3. **Send Engine**: one SYN per target and port, throttled to the
//!    configured rate
//! 4. **Receive Engine**: replies are decoded and classified as open or
//!    closed
//! 5. **Banner grabbing**: the [`responder`] completes handshakes and
//!    collects service banners using the [`banner`] protocol table
//! 6. **Result Processing**: records are written by an
//!    [`OutputSink`](crate::output::OutputSink)
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use std::io;
//!
//! use sixscan::address::Targets;
//! use sixscan::input::{OutputFormat, ScanOrder};
//! use sixscan::output::sink_for;
//! use sixscan::port_strategy::PortStrategy;
//! use sixscan::scanner::{ScanConfig, Scanner};
//! use pnet::util::MacAddr;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut targets = Targets::new();
//!     targets.push_cidr("2001:db8::".parse()?, "2001:db8::ff".parse()?);
//!
//!     let ports = PortStrategy::pick(&[22, 80, 443], ScanOrder::Random);
//!     let mut config = ScanConfig::new("2001:db8::1".parse()?, ports);
//!     config.router_mac = Some(MacAddr::new(0x02, 0, 0x5e, 0, 0, 1));
//!
//!     let mut scanner = Scanner::new(targets, sink_for(OutputFormat::List, io::stdout()));
//!     scanner.configure(config)?;
//!     let summary = scanner.run("eth0", false)?;
//!     println!("{} probes sent", summary.sent);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Only opening the interface, installing the capture filter and starting
//! the engine threads can fail a scan. Malformed replies and banners are
//! dropped, probes without an answer are simply not reported.
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod input;

pub mod address;

pub mod port_strategy;

pub mod net;

pub mod banner;

pub mod output;

pub mod responder;

pub mod scanner;
