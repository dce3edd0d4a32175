#![forbid(unsafe_code)]

//! Stack-side contracts for the link bridge.
//!
//! The userspace network stack is an external collaborator; this crate pins down the
//! narrow surface the bridge consumes: an inbound dispatch entry, a non-blocking
//! outbound dequeue, and the per-enqueue notification callback. The stack's internal
//! packet processing, routing, and sockets are out of scope.

use std::sync::Arc;

use tunlink_packet::IpVersion;

/// One outbound packet as the stack queues it.
///
/// Stacks keep network header, transport header, and payload as separate segments;
/// they are not contiguous in the stack's own representation. The drain flattens them
/// into a single device-facing buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub network_header: Vec<u8>,
    pub transport_header: Vec<u8>,
    pub payload: Vec<u8>,
}

impl OutboundPacket {
    /// Total length of the flattened wire packet.
    pub fn wire_len(&self) -> usize {
        self.network_header.len() + self.transport_header.len() + self.payload.len()
    }
}

/// The stack's entry point for packets arriving from the device.
pub trait InboundDispatcher: Send + Sync {
    /// Hand the stack one classified IP packet. The buffer is independently owned by
    /// the callee; the bridge never reuses it.
    fn inject_inbound(&self, version: IpVersion, packet: Vec<u8>);
}

/// Non-blocking view of the stack's outbound queue.
pub trait OutboundQueue: Send + Sync {
    /// Dequeue the next outbound packet, or `None` when the queue is empty.
    fn read_outbound(&self) -> Option<OutboundPacket>;
}

/// Callback the stack invokes once per outbound enqueue.
///
/// Registered once for the endpoint's lifetime. Invocations may be spurious; the
/// handler re-checks the queue and no-ops when nothing is pending.
pub trait OutboundNotify: Send + Sync {
    fn notify(&self);
}

impl<T: InboundDispatcher + ?Sized> InboundDispatcher for Arc<T> {
    fn inject_inbound(&self, version: IpVersion, packet: Vec<u8>) {
        <T as InboundDispatcher>::inject_inbound(self, version, packet);
    }
}

impl<T: OutboundQueue + ?Sized> OutboundQueue for Arc<T> {
    fn read_outbound(&self) -> Option<OutboundPacket> {
        <T as OutboundQueue>::read_outbound(self)
    }
}

impl<T: OutboundNotify + ?Sized> OutboundNotify for Arc<T> {
    fn notify(&self) {
        <T as OutboundNotify>::notify(self);
    }
}
