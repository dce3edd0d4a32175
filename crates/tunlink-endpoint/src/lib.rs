#![forbid(unsafe_code)]

//! The adapter endpoint bridging a raw packet device and a userspace network stack.
//!
//! Data flows in two independent directions:
//! - **Inbound**: device → pump → classify (IPv4/IPv6/drop) → optional checksum repair
//!   → stack inbound dispatch. Offset and direct devices get a dedicated reader
//!   thread; push devices deliver through a sink the endpoint exposes.
//! - **Outbound**: stack enqueue → [`notify`](tunlink_stack::OutboundNotify::notify) →
//!   dequeue one packet → flatten prefix + network header + transport header + payload
//!   into a locked scratch buffer → device write. Best-effort: a failed write drops
//!   that packet only.
//!
//! The endpoint holds the MTU, the device I/O variant, and the write scratch buffer;
//! it shares nothing between the two directions except the device itself.

mod endpoint;
mod pump;

pub use endpoint::{ChecksumPolicy, LinkConfig, LinkEndpoint};
pub use pump::PumpHandle;

pub use tunlink_device::DeviceIo;

use thiserror::Error;

/// Construction/attach-time failures.
///
/// Runtime per-packet failures never surface here: a device read error stops the pump
/// (observable via [`PumpHandle`]), a device write error drops the one affected
/// outbound packet.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("mtu must be non-zero")]
    InvalidMtu,

    #[error("frame prefix {prefix} exceeds maximum {max}")]
    FramePrefixTooLarge { prefix: usize, max: usize },

    #[error("endpoint is already attached to a dispatcher")]
    AlreadyAttached,

    #[error("failed to start push device")]
    PushStart(#[source] std::io::Error),

    #[error("failed to spawn pump thread")]
    PumpSpawn(#[source] std::io::Error),
}
