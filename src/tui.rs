//! Utilities for terminal output during scanning.
//!
//! Status text goes to stderr so stdout stays free for scan results.

/// Terminal User Interface Module for sixscan
/// Defines macros to use
#[macro_export]
macro_rules! warning {
    ($name:expr) => {
        eprintln!("{} {}", colored::Colorize::bold(colored::Colorize::red("[!]")), $name);
    };
    ($name:expr, $quiet:expr) => {
        if !$quiet {
            $crate::warning!($name);
        }
    };
}

#[macro_export]
macro_rules! detail {
    ($name:expr) => {
        eprintln!("{} {}", colored::Colorize::bold(colored::Colorize::blue("[~]")), $name);
    };
    ($name:expr, $quiet:expr) => {
        if !$quiet {
            $crate::detail!($name);
        }
    };
}

#[macro_export]
macro_rules! output {
    ($name:expr) => {
        eprintln!(
            "{} {}",
            colored::Colorize::bold(colored::Colorize::green("[>]")),
            $name
        );
    };
    ($name:expr, $quiet:expr) => {
        if !$quiet {
            $crate::output!($name);
        }
    };
}

/// Prints the opening banner.
pub fn print_opening(quiet: bool) {
    use colored::Colorize;

    if quiet {
        return;
    }
    let art = r"
.-----------------------------------.
| sixscan  :  SYN, listen, forget.  |
`-----------------------------------'";
    let info = format!(
        "sixscan {}: stateless IPv6 port scanning",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", art.bright_cyan());
    eprintln!("{}\n", info.dimmed());
}
