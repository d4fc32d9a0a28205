//! UDP voice transport: paced RTP-style Opus packets to a fixed peer.
//!
//! Each joined connection owns a sender thread that takes one frame per 20 ms tick
//! from a rendezvous channel, so the pipeline's send timeout sees real backpressure.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use voice_player::{Frame, TransportError, VoiceConnection, VoiceGateway};

/// Opus frame duration at 48 kHz.
const FRAME_DURATION: Duration = Duration::from_millis(20);
const SAMPLES_PER_FRAME: u32 = 960;
const RTP_HEADER_LEN: usize = 12;
/// Dynamic payload type conventionally used for Opus.
const OPUS_PAYLOAD_TYPE: u8 = 120;

/// Joins by binding a local socket and connecting it to `target`.
pub struct UdpGateway {
    pub bind: SocketAddr,
    pub target: SocketAddr,
}

impl VoiceGateway for UdpGateway {
    fn join(&self) -> Result<Box<dyn VoiceConnection>, TransportError> {
        let socket = UdpSocket::bind(self.bind)
            .map_err(|e| TransportError::Join(format!("bind {}: {e}", self.bind)))?;
        socket
            .connect(self.target)
            .map_err(|e| TransportError::Join(format!("connect {}: {e}", self.target)))?;
        tracing::info!(local = ?socket.local_addr().ok(), target = %self.target, "udp voice joined");
        Ok(Box::new(UdpConnection::start(socket)?))
    }
}

/// Running sender thread plus its control flags.
pub struct UdpConnection {
    sink: Option<Sender<Frame>>,
    ready: Arc<AtomicBool>,
    speaking: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl UdpConnection {
    fn start(socket: UdpSocket) -> Result<Self, TransportError> {
        let (tx, rx) = bounded::<Frame>(0);
        let ready = Arc::new(AtomicBool::new(false));
        let speaking = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let worker = {
            let ready = ready.clone();
            let speaking = speaking.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("udp-voice".into())
                .spawn(move || {
                    ready.store(true, Ordering::SeqCst);
                    send_loop(&socket, &rx, &speaking, &stop);
                    ready.store(false, Ordering::SeqCst);
                })
                .map_err(|e| TransportError::Join(format!("spawn sender: {e}")))?
        };
        Ok(Self {
            sink: Some(tx),
            ready,
            speaking,
            stop,
            worker: Some(worker),
        })
    }
}

impl VoiceConnection for UdpConnection {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn set_speaking(&mut self, speaking: bool) {
        if self.speaking.swap(speaking, Ordering::SeqCst) != speaking {
            tracing::debug!(speaking, "speaking state changed");
        }
    }

    fn frame_sink(&self) -> Sender<Frame> {
        match &self.sink {
            Some(sink) => sink.clone(),
            // Disconnected: hand out a sender whose receiver is already gone.
            None => bounded(0).0,
        }
    }

    fn disconnect(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.sink.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("udp sender thread panicked");
            }
        }
    }
}

impl Drop for UdpConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Packet sequence/timestamp state for one connection.
struct RtpState {
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
}

impl RtpState {
    fn packet(&mut self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(RTP_HEADER_LEN + payload.len());
        out.push(0x80);
        out.push(OPUS_PAYLOAD_TYPE);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        out.extend_from_slice(payload);
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(SAMPLES_PER_FRAME);
        out
    }
}

/// Runs until `stop` is set or every sender is gone.
fn send_loop(socket: &UdpSocket, frames: &Receiver<Frame>, speaking: &AtomicBool, stop: &AtomicBool) {
    let mut rtp = RtpState {
        sequence: 0,
        timestamp: 0,
        ssrc: std::process::id(),
    };
    let mut next_tick = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        let frame = match frames.recv_timeout(Duration::from_millis(250)) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => {
                next_tick = Instant::now();
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        };
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        }
        next_tick = next_tick.max(now) + FRAME_DURATION;
        if !speaking.load(Ordering::Relaxed) {
            continue;
        }
        if let Err(err) = socket.send(&rtp.packet(&frame)) {
            tracing::warn!(error = %err, "udp send failed");
        }
    }
}
