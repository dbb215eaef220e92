//! Client core of a custodial BSV wallet.
//!
//! The crate talks to the wallet service through host provided
//! [`external::HttpConnection`] and [`external::Storage`] implementations,
//! see `yenwallet-transport` for native ones.

pub use self::core::WalletInterface;

pub mod core;
pub mod external;
pub mod models;
pub mod transport;

#[cfg(test)]
mod tests_utils;
