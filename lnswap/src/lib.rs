#![warn(
    unused_extern_crates,
    missing_debug_implementations,
    missing_copy_implementations,
    rust_2018_idioms,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::fallible_impl_from,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::print_stdout,
    clippy::dbg_macro
)]
#![forbid(unsafe_code)]

pub mod commitment;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fs;
pub mod lnd;
pub mod node;
pub mod payment;
mod preimage;
pub mod resolution;
pub mod retrieve;
mod serde_str;
mod swap_hash;
#[cfg(test)]
mod test_harness;
pub mod timelock;
mod timestamp;
pub mod trace;
mod tracing_ext;
pub mod watcher;

pub use self::{
    commitment::CommitmentOptions,
    config::Settings,
    coordinator::Coordinator,
    error::{ConfigError, Error, InvoiceError, PermanentError, TransportError},
    lnd::{LndConnector, LndConnectorParams},
    node::PaymentNode,
    preimage::Preimage,
    swap_hash::{FromErr, SwapHash},
    timelock::{Chain, ForwardingPolicy, TimelockBudget},
    timestamp::{RelativeTime, Timestamp},
};
