//! OSDF Common - Shared types for the reactive routing engine
//!
//! This crate provides the domain model every other OSDF crate builds on:
//! - Network identities (MAC, devices, connect points, hosts, links, paths)
//! - Packet-in parsing and frame construction
//! - Application catalog and traffic profiles
//! - Policies and their lifecycle events
//! - Match specifications, treatments and flow rules
//! - Controller collaborator traits and in-memory stand-ins
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod application;
pub mod error;
pub mod event;
pub mod flow;
pub mod memory;
pub mod net;
pub mod packet;
pub mod policy;
pub mod profile;
pub mod services;

pub use application::*;
pub use error::*;
pub use event::*;
pub use flow::*;
pub use net::*;
pub use packet::{EthernetFrame, FrameBuilder, InboundPacket, OutboundPacket, Transport};
pub use policy::*;
pub use profile::*;
pub use services::*;

use std::sync::atomic::{AtomicU64, Ordering};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Lock-free counter for statistics
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create new counter
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Increment and return previous value
    #[inline(always)]
    pub fn inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Add value and return previous
    #[inline(always)]
    pub fn add(&self, val: u64) -> u64 {
        self.0.fetch_add(val, Ordering::Relaxed)
    }

    /// Get current value
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_counter() {
        let counter = AtomicCounter::new(0);
        assert_eq!(counter.inc(), 0);
        assert_eq!(counter.inc(), 1);
        assert_eq!(counter.add(3), 2);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_now_millis_advances() {
        let a = now_millis();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(now_millis() > a);
    }
}
