//! Daemon wiring for bouncer.
//!
//! The `bouncer` binary runs the reconciliation scheduler and serves the
//! revoke endpoint defined in [`http`].
pub mod http;
