//! xray-checker - Proxy Endpoint Connectivity Monitor
//!
//! Periodically verifies that configured proxy endpoints are actually
//! routing traffic and reports the outcome to a monitoring backend.
//!
//! ## Features
//!
//! - Parses vless, trojan and shadowsocks proxy links
//! - Generates xray runtime configs from per-protocol templates
//! - Supervises the xray engine with a bounded readiness wait
//! - Dual-IP connectivity check (direct vs. SOCKS5-proxied)
//! - Pluggable reporting providers (built-in: Uptime-Kuma push)
//! - Fixed-interval scheduler with a bounded worker pool

pub mod checker;
pub mod config;
pub mod error;
pub mod generator;
pub mod link;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod scheduler;
pub mod supervisor;

pub use config::{ProgramConfig, ProviderConfig, Settings};
pub use error::{CheckerError, Result};
