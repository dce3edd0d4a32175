#![forbid(unsafe_code)]

//! Device-side contracts for the link bridge.
//!
//! Real packet devices expose one of three I/O shapes:
//! - **offset**: a stream whose every buffer starts with a fixed device-owned frame
//!   prefix (e.g. a 4-byte address-family tag on BSD-style tun devices),
//! - **direct**: plain reads/writes with the IP packet at byte 0,
//! - **push**: a capture/injection driver that cannot be polled and instead delivers
//!   inbound packets from its own thread through a sink the endpoint exposes.
//!
//! This crate is intentionally minimal: one trait per capability, the [`DeviceIo`] sum
//! type an endpoint drives, and the [`DeviceHandle`] negotiation builder for openers
//! that discover capabilities at runtime. Device construction itself (driver handles,
//! privileges, interface naming) lives with the platform code that implements these
//! traits.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Widest frame prefix any supported device family uses, in bytes.
///
/// Observed widths are 4 (offset devices) and 0 (direct/push devices); the cap only
/// guards against a wildly wrong constant reaching buffer sizing.
pub const MAX_FRAME_PREFIX: usize = 16;

#[derive(Debug, Error)]
pub enum DeviceError {
    /// The opened device declared none of the offset, direct, or push capabilities.
    /// This is a setup-time contract violation, not a runtime failure.
    #[error("device supports none of the offset, direct, or push I/O contracts")]
    NoSupportedIo,
}

/// Offset-aware packet I/O.
///
/// The device owns the first `offset` bytes of every buffer it reads into or writes
/// from; the IP packet occupies `buf[offset..]`. Callers must preserve the prefix
/// region length-for-length on write.
pub trait OffsetIo: Send + Sync {
    /// Read one packet into `buf[offset..]`, returning the packet length (prefix
    /// excluded). An error permanently ends inbound delivery for this device.
    fn read_offset(&self, buf: &mut [u8], offset: usize) -> io::Result<usize>;

    /// Write one packet from `buf[offset..]`, with `buf[..offset]` available for the
    /// device to fill in. Returns the number of bytes consumed.
    fn write_offset(&self, buf: &mut [u8], offset: usize) -> io::Result<usize>;
}

/// Direct packet I/O: no frame prefix, the IP packet starts at byte 0.
pub trait DirectIo: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&self, buf: &[u8]) -> io::Result<usize>;
}

/// Inbound entry point an endpoint exposes to push-style devices.
///
/// Implementations run classification (and checksum repair, where configured)
/// synchronously on the caller's context; the device may call this from any thread.
pub trait PacketSink: Send + Sync {
    fn push(&self, packet: &[u8]);
}

/// Push-style device: cannot be polled for inbound packets.
pub trait PushIo: Send + Sync {
    /// Hand the device the endpoint's inbound sink. Must not block; the device
    /// delivers packets from its own delivery context for as long as it is open.
    fn start(&self, sink: Arc<dyn PacketSink>) -> io::Result<()>;

    /// Inject one outbound packet into the device.
    fn inject(&self, packet: &[u8]) -> io::Result<usize>;
}

/// The I/O variant an endpoint drives, chosen once at construction.
#[derive(Clone)]
pub enum DeviceIo {
    /// Offset read/write with a fixed frame prefix width in bytes.
    Offset { dev: Arc<dyn OffsetIo>, prefix: usize },
    Direct { dev: Arc<dyn DirectIo> },
    Push { dev: Arc<dyn PushIo> },
}

impl DeviceIo {
    /// Frame prefix width for this variant. A per-device-type constant, never derived
    /// from packet data.
    pub fn frame_prefix(&self) -> usize {
        match self {
            DeviceIo::Offset { prefix, .. } => *prefix,
            DeviceIo::Direct { .. } | DeviceIo::Push { .. } => 0,
        }
    }
}

impl fmt::Debug for DeviceIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceIo::Offset { prefix, .. } => {
                f.debug_struct("Offset").field("prefix", prefix).finish()
            }
            DeviceIo::Direct { .. } => f.debug_struct("Direct").finish(),
            DeviceIo::Push { .. } => f.debug_struct("Push").finish(),
        }
    }
}

/// Capability declaration for openers that only learn what a device supports at open
/// time.
///
/// This replaces downcast-style probing with an explicit negotiation: the opener
/// declares each capability it implements, and [`DeviceHandle::into_io`] selects one in
/// a fixed, documented order. Endpoints that know their device shape statically can
/// construct a [`DeviceIo`] directly and skip this type.
#[derive(Default)]
pub struct DeviceHandle {
    offset: Option<(Arc<dyn OffsetIo>, usize)>,
    direct: Option<Arc<dyn DirectIo>>,
    push: Option<Arc<dyn PushIo>>,
}

impl DeviceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset_io(mut self, dev: Arc<dyn OffsetIo>, prefix: usize) -> Self {
        self.offset = Some((dev, prefix));
        self
    }

    pub fn with_direct_io(mut self, dev: Arc<dyn DirectIo>) -> Self {
        self.direct = Some(dev);
        self
    }

    pub fn with_push_io(mut self, dev: Arc<dyn PushIo>) -> Self {
        self.push = Some(dev);
        self
    }

    /// Select the I/O variant, preferring offset, then direct, then push.
    ///
    /// A handle with no declared capability is a fatal misconfiguration and yields
    /// [`DeviceError::NoSupportedIo`]; callers are expected to abort attachment, not
    /// retry.
    pub fn into_io(self) -> Result<DeviceIo, DeviceError> {
        if let Some((dev, prefix)) = self.offset {
            return Ok(DeviceIo::Offset { dev, prefix });
        }
        if let Some(dev) = self.direct {
            return Ok(DeviceIo::Direct { dev });
        }
        if let Some(dev) = self.push {
            return Ok(DeviceIo::Push { dev });
        }
        Err(DeviceError::NoSupportedIo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullOffset;

    impl OffsetIo for NullOffset {
        fn read_offset(&self, _buf: &mut [u8], _offset: usize) -> io::Result<usize> {
            Err(io::ErrorKind::UnexpectedEof.into())
        }

        fn write_offset(&self, buf: &mut [u8], offset: usize) -> io::Result<usize> {
            Ok(buf.len() - offset)
        }
    }

    struct NullDirect;

    impl DirectIo for NullDirect {
        fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::UnexpectedEof.into())
        }

        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
    }

    #[test]
    fn negotiation_prefers_offset_over_direct() {
        let io = DeviceHandle::new()
            .with_direct_io(Arc::new(NullDirect))
            .with_offset_io(Arc::new(NullOffset), 4)
            .into_io()
            .unwrap();
        assert!(matches!(&io, DeviceIo::Offset { prefix: 4, .. }));
        assert_eq!(io.frame_prefix(), 4);
    }

    #[test]
    fn direct_and_push_have_no_prefix() {
        let io = DeviceHandle::new()
            .with_direct_io(Arc::new(NullDirect))
            .into_io()
            .unwrap();
        assert_eq!(io.frame_prefix(), 0);
    }

    #[test]
    fn empty_handle_is_a_fatal_mismatch() {
        assert!(matches!(
            DeviceHandle::new().into_io(),
            Err(DeviceError::NoSupportedIo)
        ));
    }
}
