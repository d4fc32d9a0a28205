//! Transport stage: owns the voice connection for a whole session.
//!
//! Frames from the bounded queue are forwarded to the connection's send path. A send
//! that is not accepted within `send_timeout` is fatal. No frames for `idle_timeout`
//! ends the session quietly. Whatever the exit path, the connection is disconnected
//! once and the session token is cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, select};

use crate::config::PlayerConfig;
use crate::decode::Frame;
use crate::error::TransportError;
use crate::signal::CancelToken;

/// Factory for voice connections (one join per session).
pub trait VoiceGateway: Send + Sync {
    fn join(&self) -> Result<Box<dyn VoiceConnection>, TransportError>;
}

impl<F> VoiceGateway for F
where
    F: Fn() -> Result<Box<dyn VoiceConnection>, TransportError> + Send + Sync,
{
    fn join(&self) -> Result<Box<dyn VoiceConnection>, TransportError> {
        self()
    }
}

/// A joined voice channel.
pub trait VoiceConnection: Send {
    /// Whether the connection can accept audio yet.
    fn is_ready(&self) -> bool;
    fn set_speaking(&mut self, speaking: bool);
    /// Send path for encoded frames. May block or never drain.
    fn frame_sink(&self) -> Sender<Frame>;
    fn disconnect(&mut self);
}

/// Clean reasons for the transport stage to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportExit {
    /// The session token was cancelled.
    Cancelled,
    /// No frame arrived within the idle timeout.
    Idle,
    /// Every frame producer went away.
    QueueClosed,
}

/// Session-lifetime consumer of the frame queue.
pub struct TransportStage {
    frames: Receiver<Frame>,
    cancel: CancelToken,
    ready_timeout: Duration,
    ready_poll_interval: Duration,
    idle_timeout: Duration,
    send_timeout: Duration,
    frames_sent: Arc<AtomicU64>,
}

impl TransportStage {
    pub fn new(config: &PlayerConfig, frames: Receiver<Frame>, cancel: CancelToken) -> Self {
        Self {
            frames,
            cancel,
            ready_timeout: config.ready_timeout,
            ready_poll_interval: config.ready_poll_interval,
            idle_timeout: config.idle_timeout,
            send_timeout: config.send_timeout,
            frames_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Share an existing frame counter (for status reporting).
    pub fn with_counter(mut self, frames_sent: Arc<AtomicU64>) -> Self {
        self.frames_sent = frames_sent;
        self
    }

    /// Join, wait for readiness, then forward frames until something ends the session.
    ///
    /// `on_ready` runs once the connection is ready and speaking.
    pub fn run(
        self,
        gateway: &dyn VoiceGateway,
        on_ready: impl FnOnce(),
    ) -> Result<TransportExit, TransportError> {
        let _cancel = CancelOnDrop(self.cancel.clone());

        let mut conn = ConnectionGuard(gateway.join()?);
        tracing::info!("voice connection joined");
        if !self.wait_ready(conn.0.as_ref())? {
            return Ok(TransportExit::Cancelled);
        }
        conn.0.set_speaking(true);
        on_ready();
        tracing::info!("voice connection ready");

        let sink = conn.0.frame_sink();
        loop {
            select! {
                recv(self.cancel.channel()) -> _ => return Ok(TransportExit::Cancelled),
                recv(self.frames) -> msg => match msg {
                    Ok(frame) => self.send(&sink, frame)?,
                    Err(_) => return Ok(TransportExit::QueueClosed),
                },
                default(self.idle_timeout) => {
                    tracing::info!(idle = ?self.idle_timeout, "no audio, leaving voice channel");
                    return Ok(TransportExit::Idle);
                }
            }
        }
    }

    /// Poll readiness. `Ok(false)` means the session was cancelled meanwhile.
    fn wait_ready(&self, conn: &dyn VoiceConnection) -> Result<bool, TransportError> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            if conn.is_ready() {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::NotReady(self.ready_timeout));
            }
            let nap = self.ready_poll_interval.min(deadline - now);
            if self.cancel.wait_timeout(nap) {
                return Ok(false);
            }
        }
    }

    fn send(&self, sink: &Sender<Frame>, frame: Frame) -> Result<(), TransportError> {
        match sink.send_timeout(frame, self.send_timeout) {
            Ok(()) => {
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(TransportError::Stalled(self.send_timeout)),
            Err(SendTimeoutError::Disconnected(_)) => Err(TransportError::Closed),
        }
    }
}

struct ConnectionGuard(Box<dyn VoiceConnection>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.set_speaking(false);
        self.0.disconnect();
        tracing::info!("voice connection closed");
    }
}

struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory voice transport.

    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};

    use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Joined,
        Speaking(bool),
        Disconnected,
    }

    /// Gateway handing out connections that share one event log and frame sink.
    #[derive(Clone)]
    pub struct FakeGateway {
        pub events: Arc<Mutex<Vec<Event>>>,
        pub ready: Arc<AtomicBool>,
        pub fail_join: bool,
        sink: Sender<Frame>,
        pub received: Receiver<Frame>,
    }

    impl FakeGateway {
        /// Connection whose sink buffers everything.
        pub fn new() -> Self {
            let (sink, received) = unbounded();
            Self::with_sink(sink, received)
        }

        /// Connection whose sink never accepts a frame.
        pub fn stalled() -> Self {
            let (sink, received) = bounded(0);
            Self::with_sink(sink, received)
        }

        fn with_sink(sink: Sender<Frame>, received: Receiver<Frame>) -> Self {
            Self {
                events: Arc::default(),
                ready: Arc::new(AtomicBool::new(true)),
                fail_join: false,
                sink,
                received,
            }
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        pub fn disconnects(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| **e == Event::Disconnected)
                .count()
        }
    }

    impl VoiceGateway for FakeGateway {
        fn join(&self) -> Result<Box<dyn VoiceConnection>, TransportError> {
            if self.fail_join {
                return Err(TransportError::Join("channel unavailable".into()));
            }
            self.events.lock().unwrap().push(Event::Joined);
            Ok(Box::new(FakeConnection {
                events: self.events.clone(),
                ready: self.ready.clone(),
                sink: self.sink.clone(),
            }))
        }
    }

    struct FakeConnection {
        events: Arc<Mutex<Vec<Event>>>,
        ready: Arc<AtomicBool>,
        sink: Sender<Frame>,
    }

    impl VoiceConnection for FakeConnection {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn set_speaking(&mut self, speaking: bool) {
            self.events.lock().unwrap().push(Event::Speaking(speaking));
        }

        fn frame_sink(&self) -> Sender<Frame> {
            self.sink.clone()
        }

        fn disconnect(&mut self) {
            self.events.lock().unwrap().push(Event::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{Event, FakeGateway};
    use super::*;
    use crossbeam_channel::bounded;
    use std::thread;

    fn fast_config() -> PlayerConfig {
        PlayerConfig {
            ready_timeout: Duration::from_millis(100),
            ready_poll_interval: Duration::from_millis(5),
            idle_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_millis(50),
            ..PlayerConfig::default()
        }
    }

    #[test]
    fn forwards_frames_in_order_and_disconnects_once() {
        let gateway = FakeGateway::new();
        let (tx, rx) = bounded(4);
        let cancel = CancelToken::new();
        let stage = TransportStage::new(&fast_config(), rx, cancel.clone());
        let counter = stage.frames_sent.clone();
        let worker = {
            let gateway = gateway.clone();
            thread::spawn(move || stage.run(&gateway, || {}))
        };
        for i in 0..20u8 {
            tx.send(vec![i]).unwrap();
        }
        drop(tx);
        assert_eq!(worker.join().unwrap().unwrap(), TransportExit::QueueClosed);

        let got: Vec<Frame> = gateway.received.try_iter().collect();
        assert_eq!(got, (0..20u8).map(|i| vec![i]).collect::<Vec<_>>());
        assert_eq!(counter.load(Ordering::Relaxed), 20);
        assert_eq!(
            gateway.events(),
            vec![
                Event::Joined,
                Event::Speaking(true),
                Event::Speaking(false),
                Event::Disconnected
            ]
        );
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn stalled_sink_fails_and_disconnects_once() {
        let gateway = FakeGateway::stalled();
        let (tx, rx) = bounded(4);
        let cancel = CancelToken::new();
        tx.send(vec![1]).unwrap();
        let err = TransportStage::new(&fast_config(), rx, cancel.clone())
            .run(&gateway, || {})
            .unwrap_err();
        assert!(matches!(err, TransportError::Stalled(_)));
        assert_eq!(gateway.disconnects(), 1);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn not_ready_times_out() {
        let gateway = FakeGateway::new();
        gateway.ready.store(false, Ordering::SeqCst);
        let (_tx, rx) = bounded(1);
        let mut ready_called = false;
        let err = TransportStage::new(&fast_config(), rx, CancelToken::new())
            .run(&gateway, || ready_called = true)
            .unwrap_err();
        assert!(matches!(err, TransportError::NotReady(_)));
        assert!(!ready_called);
        assert_eq!(gateway.disconnects(), 1);
    }

    #[test]
    fn idle_timeout_ends_cleanly() {
        let gateway = FakeGateway::new();
        let (_tx, rx) = bounded(1);
        let cancel = CancelToken::new();
        let config = PlayerConfig {
            idle_timeout: Duration::from_millis(30),
            ..fast_config()
        };
        let exit = TransportStage::new(&config, rx, cancel.clone())
            .run(&gateway, || {})
            .unwrap();
        assert_eq!(exit, TransportExit::Idle);
        assert!(cancel.is_cancelled());
        assert_eq!(gateway.disconnects(), 1);
    }

    #[test]
    fn cancellation_ends_cleanly() {
        let gateway = FakeGateway::new();
        let (_tx, rx) = bounded(1);
        let cancel = CancelToken::new();
        let stage = TransportStage::new(&fast_config(), rx, cancel.clone());
        let worker = {
            let gateway = gateway.clone();
            thread::spawn(move || stage.run(&gateway, || {}))
        };
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
        assert_eq!(worker.join().unwrap().unwrap(), TransportExit::Cancelled);
        assert_eq!(gateway.disconnects(), 1);
    }

    #[test]
    fn join_failure_cancels_session() {
        let mut gateway = FakeGateway::new();
        gateway.fail_join = true;
        let (_tx, rx) = bounded(1);
        let cancel = CancelToken::new();
        let err = TransportStage::new(&fast_config(), rx, cancel.clone())
            .run(&gateway, || {})
            .unwrap_err();
        assert!(matches!(err, TransportError::Join(_)));
        assert!(cancel.is_cancelled());
        assert_eq!(gateway.disconnects(), 0);
    }

    #[test]
    fn closures_act_as_gateways() {
        let gateway = || -> Result<Box<dyn VoiceConnection>, TransportError> {
            Err(TransportError::Join("nope".into()))
        };
        assert!(gateway.join().is_err());
    }
}
