use std::sync::{Arc, Mutex, OnceLock};

use tunlink_device::{DeviceIo, PacketSink, MAX_FRAME_PREFIX};
use tunlink_packet::{
    recompute_ipv4_checksum, recompute_transport_checksum, IpVersion, PacketError,
};
use tunlink_stack::{InboundDispatcher, OutboundNotify, OutboundQueue};

use crate::pump::{self, PumpHandle, Reader};
use crate::EndpointError;

/// Whether the device computes transport checksums itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// The device (or its driver) delivers packets with valid checksums.
    #[default]
    Offload,
    /// The device delivers packets without computed checksums; the endpoint repairs
    /// the IPv4 header checksum and the TCP/UDP checksum before inbound dispatch.
    Recompute,
}

/// Link endpoint construction parameters.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Negotiated interface MTU. Immutable after construction; bounds every buffer
    /// the endpoint allocates.
    pub mtu: usize,
    pub checksum: ChecksumPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mtu: 1500,
            checksum: ChecksumPolicy::Offload,
        }
    }
}

/// The stack-facing link endpoint for one device.
///
/// Cheap to clone; clones share the same device, scratch buffer, and dispatcher
/// registration.
#[derive(Clone)]
pub struct LinkEndpoint {
    inner: Arc<Shared>,
}

pub(crate) struct Shared {
    io: DeviceIo,
    pub(crate) mtu: usize,
    pub(crate) prefix: usize,
    checksum: ChecksumPolicy,
    /// Outbound scratch: `prefix` reserved bytes + up to `mtu` bytes of packet.
    /// All access is serialized; the lock scope is exactly fill + device write.
    scratch: Mutex<Vec<u8>>,
    outbound: Arc<dyn OutboundQueue>,
    dispatcher: OnceLock<Arc<dyn InboundDispatcher>>,
}

impl LinkEndpoint {
    pub fn new(
        io: DeviceIo,
        outbound: Arc<dyn OutboundQueue>,
        cfg: LinkConfig,
    ) -> Result<Self, EndpointError> {
        if cfg.mtu == 0 {
            return Err(EndpointError::InvalidMtu);
        }
        let prefix = io.frame_prefix();
        if prefix > MAX_FRAME_PREFIX {
            return Err(EndpointError::FramePrefixTooLarge {
                prefix,
                max: MAX_FRAME_PREFIX,
            });
        }
        let mut scratch = Vec::with_capacity(prefix + cfg.mtu);
        scratch.resize(prefix, 0);
        Ok(Self {
            inner: Arc::new(Shared {
                io,
                mtu: cfg.mtu,
                prefix,
                checksum: cfg.checksum,
                scratch: Mutex::new(scratch),
                outbound,
                dispatcher: OnceLock::new(),
            }),
        })
    }

    pub fn mtu(&self) -> usize {
        self.inner.mtu
    }

    pub fn frame_prefix(&self) -> usize {
        self.inner.prefix
    }

    /// Register the stack's inbound dispatcher and start inbound delivery.
    ///
    /// Offset and direct devices get a dedicated reader thread whose termination (on
    /// the first device read error) is observable through the returned [`PumpHandle`].
    /// Push devices are handed a sink instead and run inbound delivery on their own
    /// context; for those the handle carries no thread and never reports stopped.
    ///
    /// Must be called before any inbound traffic is expected, and at most once.
    pub fn attach(
        &self,
        dispatcher: Arc<dyn InboundDispatcher>,
    ) -> Result<PumpHandle, EndpointError> {
        self.inner
            .dispatcher
            .set(dispatcher)
            .map_err(|_| EndpointError::AlreadyAttached)?;
        match &self.inner.io {
            DeviceIo::Offset { dev, prefix } => {
                pump::spawn(self.inner.clone(), Reader::Offset(dev.clone(), *prefix))
                    .map_err(EndpointError::PumpSpawn)
            }
            DeviceIo::Direct { dev } => {
                pump::spawn(self.inner.clone(), Reader::Direct(dev.clone()))
                    .map_err(EndpointError::PumpSpawn)
            }
            DeviceIo::Push { dev } => {
                let sink: Arc<dyn PacketSink> = Arc::new(PushSink {
                    shared: self.inner.clone(),
                });
                dev.start(sink).map_err(EndpointError::PushStart)?;
                Ok(PumpHandle::device_driven())
            }
        }
    }
}

impl Shared {
    /// Classify → (repair) → forward. Shared by the pump loop and the push sink.
    pub(crate) fn ingest(&self, mut packet: Vec<u8>) {
        let Some(dispatcher) = self.dispatcher.get() else {
            return;
        };
        let Some(version) = IpVersion::of_packet(&packet) else {
            // Not an IP packet: dropped silently, uncounted.
            return;
        };
        if self.checksum == ChecksumPolicy::Recompute {
            if let Err(err) = repair(&mut packet, version) {
                tracing::debug!(?version, "dropping unrepairable inbound packet: {err}");
                return;
            }
        }
        dispatcher.inject_inbound(version, packet);
    }

    /// Dequeue one outbound packet, if any, and write it to the device.
    fn drain_outbound(&self) {
        // Notifications can be spurious; an empty queue is a no-op.
        let Some(packet) = self.outbound.read_outbound() else {
            return;
        };
        if packet.wire_len() > self.mtu {
            tracing::warn!(
                len = packet.wire_len(),
                mtu = self.mtu,
                "dropping outbound packet larger than mtu"
            );
            return;
        }
        let mut scratch = self
            .scratch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        scratch.truncate(self.prefix);
        scratch.fill(0);
        scratch.extend_from_slice(&packet.network_header);
        scratch.extend_from_slice(&packet.transport_header);
        scratch.extend_from_slice(&packet.payload);
        let result = match &self.io {
            DeviceIo::Offset { dev, prefix } => dev.write_offset(&mut scratch, *prefix),
            DeviceIo::Direct { dev } => dev.write(&scratch),
            DeviceIo::Push { dev } => dev.inject(&scratch),
        };
        if let Err(err) = result {
            // Outbound delivery is best-effort; only this packet is lost.
            tracing::debug!("device write failed, dropping outbound packet: {err}");
        }
    }
}

fn repair(packet: &mut [u8], version: IpVersion) -> Result<(), PacketError> {
    if version == IpVersion::V4 {
        recompute_ipv4_checksum(packet)?;
    }
    recompute_transport_checksum(packet, version)
}

impl OutboundNotify for LinkEndpoint {
    fn notify(&self) {
        self.inner.drain_outbound();
    }
}

/// Inbound adapter handed to push devices. Holds a real reference to the shared
/// endpoint state and runs the same ingest path as the pump, synchronously on the
/// device's delivery context.
struct PushSink {
    shared: Arc<Shared>,
}

impl PacketSink for PushSink {
    fn push(&self, packet: &[u8]) {
        self.shared.ingest(packet.to_vec());
    }
}
