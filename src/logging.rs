//! Logging setup.
//!
//! Stage activity reaches operators on two paths: free-text lines pushed
//! into the [`StatusLedger`] ring buffer for pollers, and the same lines
//! mirrored to `tracing` under the `tilestage::ledger` target. This
//! module installs the subscriber that mirror lands in, writing to
//! stderr so stdout stays reserved for the CLI's JSON results.
//!
//! `RUST_LOG` overrides the default filter, and `RUST_LOG_FORMAT=json`
//! switches the stderr stream to JSON lines for log shippers.
//!
//! [`StatusLedger`]: crate::status::StatusLedger

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset. The crate-wide directive
/// covers the `tilestage::ledger` mirror target by prefix, so ledger
/// lines are visible out of the box.
pub const DEFAULT_DIRECTIVES: &str = "tilestage=info";

fn json_requested() -> bool {
    std::env::var("RUST_LOG_FORMAT")
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Install the global subscriber. Repeated calls are no-ops, so library
/// embedders and tests can call this freely.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    if json_requested() {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusLedger;

    #[test]
    fn repeated_init_is_a_no_op() {
        init();
        init();
    }

    #[test]
    fn default_directives_parse_as_an_env_filter() {
        let filter = EnvFilter::builder().parse(DEFAULT_DIRECTIVES);
        assert!(filter.is_ok(), "{filter:?}");
    }

    #[test]
    fn ledger_lines_survive_the_mirror_with_a_subscriber_installed() {
        init();
        let ledger = StatusLedger::new();
        ledger.log("mirror smoke line");
        let logs = ledger.snapshot().logs;
        assert_eq!(logs.len(), 1);
        assert!(logs[0].ends_with("mirror smoke line"), "got: {}", logs[0]);
    }
}
