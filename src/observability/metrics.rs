//! Metrics recorded through the `metrics` facade.
//!
//! # Metrics
//! - `portmux_connections_accepted_total` (counter): client connections registered
//! - `portmux_active_connections` (gauge): client connections currently registered
//! - `portmux_sniff_decisions_total` (counter): decisions by `protocol`
//! - `portmux_bind_failures_total` (counter): ports that failed to bind
//!
//! No exporter is installed here; without a recorder every call is a no-op.

pub fn connection_opened() {
    ::metrics::counter!("portmux_connections_accepted_total").increment(1);
    ::metrics::gauge!("portmux_active_connections").increment(1.0);
}

pub fn connection_closed() {
    ::metrics::gauge!("portmux_active_connections").decrement(1.0);
}

pub fn sniff_decision(protocol: &'static str) {
    ::metrics::counter!("portmux_sniff_decisions_total", "protocol" => protocol).increment(1);
}

pub fn bind_failed() {
    ::metrics::counter!("portmux_bind_failures_total").increment(1);
}
