use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tunlink_device::{DirectIo, OffsetIo};

use crate::endpoint::Shared;

/// Supervised handle to an endpoint's inbound reader thread.
///
/// The pump stops permanently on the first device read error; no restart is attempted
/// here. An external supervisor that wants reconnect semantics watches
/// [`is_stopped`](PumpHandle::is_stopped) (or blocks in [`join`](PumpHandle::join)) and
/// rebuilds the endpoint around a fresh device handle.
#[derive(Debug)]
pub struct PumpHandle {
    stopped: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PumpHandle {
    pub(crate) fn device_driven() -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Whether the reader thread has terminated. Always false for push devices, whose
    /// delivery context the device itself owns.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Block until the reader thread exits. Returns immediately for push devices.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub(crate) enum Reader {
    Offset(Arc<dyn OffsetIo>, usize),
    Direct(Arc<dyn DirectIo>),
}

impl Reader {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Reader::Offset(dev, offset) => dev.read_offset(buf, *offset),
            Reader::Direct(dev) => dev.read(buf),
        }
    }
}

pub(crate) fn spawn(shared: Arc<Shared>, reader: Reader) -> io::Result<PumpHandle> {
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = stopped.clone();
    let thread = thread::Builder::new()
        .name("tunlink-pump".into())
        .spawn(move || {
            run(&shared, &reader);
            flag.store(true, Ordering::Release);
        })?;
    Ok(PumpHandle {
        stopped,
        thread: Some(thread),
    })
}

fn run(shared: &Shared, reader: &Reader) {
    let size = shared.prefix + shared.mtu;
    loop {
        // The stack takes ownership of every forwarded packet; the buffer is fresh
        // per iteration, never reused across dispatches.
        let mut buf = vec![0u8; size];
        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(err) => {
                tracing::debug!("device read failed, stopping inbound pump: {err}");
                break;
            }
        };
        buf.truncate(shared.prefix + n);
        let packet = buf.split_off(shared.prefix);
        shared.ingest(packet);
    }
}
