//! Device controller: lifecycle state machine and acquisition backends.
//!
//! One controller owns one transport at a time. `open()` acquires it,
//! `start()` hands it to a background task that pushes bytes through the
//! frame extractor and decoder into the shared [`FixStore`], `stop()`
//! cancels that task cooperatively, `close()` releases whatever is left.
//! The background task is the sole writer of the store for its session.

use crate::{
    error::{DeviceError, Result},
    gps::{
        data::{FixStore, PositionFix},
        frame::FrameExtractor,
        gpsd, nmea, Update,
    },
};
use chrono::Utc;
use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::AsyncReadExt,
    net::TcpStream,
    sync::broadcast,
    task::JoinHandle,
    time::{interval, timeout},
};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, warn};

#[cfg(windows)]
use crate::gps::windows as platform;
#[cfg(windows)]
use windows::Devices::Geolocation::Geolocator;

/// Poll interval for available serial bytes.
const SERIAL_POLL: Duration = Duration::from_millis(150);
/// Pace of the file-replay backend.
const REPLAY_POLL: Duration = Duration::from_millis(100);
/// How often the gpsd backend re-checks the stop flag while the socket
/// stays quiet.
const GPSD_POLL: Duration = Duration::from_millis(250);

/// Transport selection for a device session.
#[derive(Debug, Clone)]
pub enum GpsSource {
    Serial { port: String, baudrate: u32 },
    FileReplay { path: PathBuf },
    Gpsd { host: String, port: u16 },
    #[cfg(windows)]
    Platform { accuracy: u32, interval_secs: u64 },
}

/// Notifications broadcast to consumers.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A sentence yielded a usable Active fix; carries the position part of
    /// the state as of that sentence.
    PositionUpdated(PositionFix),
    /// Some part of the fix state changed: satellite table, fix quality,
    /// active set, status. Fired for every successfully decoded sentence.
    StatusUpdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    Closed,
    Open,
    Running,
    Stopping,
}

impl DeviceState {
    fn name(self) -> &'static str {
        match self {
            DeviceState::Closed => "closed",
            DeviceState::Open => "open",
            DeviceState::Running => "running",
            DeviceState::Stopping => "stopping",
        }
    }
}

/// The opened but not yet running transport.
enum Transport {
    Serial(SerialStream),
    File(tokio::fs::File),
    Gpsd(TcpStream),
    #[cfg(windows)]
    Platform(Geolocator),
}

/// Lifecycle wrapper presented uniformly over all backends.
pub struct GpsDevice {
    source: GpsSource,
    log_dir: Option<PathBuf>,
    state: DeviceState,
    transport: Option<Transport>,
    store: Arc<FixStore>,
    running: Arc<AtomicBool>,
    events: broadcast::Sender<DeviceEvent>,
    task: Option<JoinHandle<()>>,
}

impl GpsDevice {
    pub fn new(source: GpsSource) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            source,
            log_dir: None,
            state: DeviceState::Closed,
            transport: None,
            store: Arc::new(FixStore::new()),
            running: Arc::new(AtomicBool::new(false)),
            events,
            task: None,
        }
    }

    /// Enables the raw session log, written into `dir`.
    pub fn with_session_log(mut self, dir: PathBuf) -> Self {
        self.log_dir = Some(dir);
        self
    }

    /// Handle to the session's fix state, readable at any time.
    pub fn store(&self) -> Arc<FixStore> {
        Arc::clone(&self.store)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Acquires the underlying transport. The controller holds exactly one
    /// transport, so opening while not closed is rejected.
    pub async fn open(&mut self) -> Result<()> {
        if self.state != DeviceState::Closed {
            return Err(DeviceError::Lifecycle {
                op: "open",
                state: self.state.name(),
            });
        }

        let transport = match &self.source {
            GpsSource::Serial { port, baudrate } => {
                let serial = tokio_serial::new(port, *baudrate)
                    .timeout(Duration::from_millis(1000))
                    .open_native_async()
                    .map_err(|e| {
                        DeviceError::Open(format!("cannot open serial port {}: {}", port, e))
                    })?;
                info!("opened serial port {} at {} baud", port, baudrate);
                Transport::Serial(serial)
            }
            GpsSource::FileReplay { path } => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    DeviceError::Open(format!("cannot open replay file {}: {}", path.display(), e))
                })?;
                info!("opened replay file {}", path.display());
                Transport::File(file)
            }
            GpsSource::Gpsd { host, port } => {
                let socket = gpsd::connect(host, *port).await?;
                info!("connected to gpsd at {}:{}", host, port);
                Transport::Gpsd(socket)
            }
            #[cfg(windows)]
            GpsSource::Platform { accuracy, .. } => {
                platform::request_location_access().await?;
                let geolocator = platform::create_geolocator(*accuracy)?;
                info!("registered with the platform location service");
                Transport::Platform(geolocator)
            }
        };

        self.transport = Some(transport);
        self.state = DeviceState::Open;
        Ok(())
    }

    /// Begins the acquisition loop on a background task. Valid only from
    /// Open. May open the session log as a side effect.
    pub fn start(&mut self) -> Result<()> {
        if self.state != DeviceState::Open {
            return Err(DeviceError::Lifecycle {
                op: "start",
                state: self.state.name(),
            });
        }
        let transport = self.transport.take().ok_or(DeviceError::Lifecycle {
            op: "start",
            state: "open without transport",
        })?;

        let log = self.log_dir.as_deref().and_then(open_session_log);
        self.running.store(true, Ordering::Relaxed);

        let shared = LoopShared {
            store: Arc::clone(&self.store),
            running: Arc::clone(&self.running),
            events: self.events.clone(),
            log,
        };

        self.task = Some(match transport {
            Transport::Serial(serial) => tokio::spawn(serial_loop(serial, shared)),
            Transport::File(file) => tokio::spawn(replay_loop(file, shared)),
            Transport::Gpsd(socket) => tokio::spawn(gpsd_loop(socket, shared)),
            #[cfg(windows)]
            Transport::Platform(geolocator) => {
                let interval_secs = match &self.source {
                    GpsSource::Platform { interval_secs, .. } => (*interval_secs).max(1),
                    _ => 1,
                };
                tokio::spawn(platform_loop(geolocator, interval_secs, shared))
            }
        });

        self.state = DeviceState::Running;
        Ok(())
    }

    /// Posts a cooperative stop request and waits for the loop to observe
    /// it at its next iteration boundary. Any decode in progress completes
    /// first. Valid only from Running.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state != DeviceState::Running {
            return Err(DeviceError::Lifecycle {
                op: "stop",
                state: self.state.name(),
            });
        }
        self.state = DeviceState::Stopping;
        self.running.store(false, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.state = DeviceState::Closed;
        Ok(())
    }

    /// Releases the transport and the session log. Idempotent; callable
    /// from any state.
    pub async fn close(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            // The task owns the transport and the log; awaiting it flushes
            // and drops both.
            let _ = task.await;
        }
        self.transport = None;
        self.state = DeviceState::Closed;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state == DeviceState::Running && self.running.load(Ordering::Relaxed)
    }
}

/// Everything a backend loop shares with its controller.
struct LoopShared {
    store: Arc<FixStore>,
    running: Arc<AtomicBool>,
    events: broadcast::Sender<DeviceEvent>,
    log: Option<std::fs::File>,
}

impl LoopShared {
    fn stop_requested(&self) -> bool {
        !self.running.load(Ordering::Relaxed)
    }

    /// Pushes one raw chunk through the extractor and decodes every
    /// complete frame it yields, in arrival order.
    fn consume_chunk(&mut self, extractor: &mut FrameExtractor, chunk: &[u8]) {
        let clean = extractor.ingest(chunk);
        self.log_bytes(&clean);
        while let Some(frame) = extractor.next_frame() {
            self.decode_frame(&frame);
        }
    }

    fn decode_frame(&self, frame: &str) {
        let (update, position) = self.store.apply(|state| {
            match nmea::decode_sentence(state, frame) {
                Ok(update) => (update, state.position()),
                Err(e) => {
                    // One bad sentence never stops the stream.
                    debug!("dropping frame {:?}: {}", frame, e);
                    (Update::None, PositionFix::default())
                }
            }
        });
        self.notify(update, position);
    }

    fn notify(&self, update: Update, position: PositionFix) {
        match update {
            Update::Position => {
                let _ = self.events.send(DeviceEvent::PositionUpdated(position));
                let _ = self.events.send(DeviceEvent::StatusUpdated);
            }
            Update::Status => {
                let _ = self.events.send(DeviceEvent::StatusUpdated);
            }
            Update::None => {}
        }
    }

    fn log_bytes(&mut self, bytes: &[u8]) {
        if let Some(log) = &mut self.log {
            if let Err(e) = log.write_all(bytes) {
                warn!("session log write failed, disabling log: {}", e);
                self.log = None;
            }
        }
    }
}

/// Serial backend: periodic polling for available bytes. The timeout is the
/// scheduling point at which a stop request is observed.
async fn serial_loop(mut serial: SerialStream, mut shared: LoopShared) {
    let mut extractor = FrameExtractor::new();
    let mut buf = [0u8; 512];

    while !shared.stop_requested() {
        match timeout(SERIAL_POLL, serial.read(&mut buf)).await {
            Err(_) => continue, // no bytes this interval
            Ok(Ok(0)) => {
                warn!("serial port: {}", DeviceError::TransportClosed);
                break;
            }
            Ok(Ok(n)) => shared.consume_chunk(&mut extractor, &buf[..n]),
            Ok(Err(e)) => {
                warn!("serial read failed, no further updates: {}", e);
                break;
            }
        }
    }
}

/// File-replay backend: reads the next slice of the log on a fixed tick.
async fn replay_loop(mut file: tokio::fs::File, mut shared: LoopShared) {
    let mut extractor = FrameExtractor::new();
    let mut buf = [0u8; 256];
    let mut ticker = interval(REPLAY_POLL);

    while !shared.stop_requested() {
        ticker.tick().await;
        match file.read(&mut buf).await {
            Ok(0) => {
                info!("replay file exhausted");
                break;
            }
            Ok(n) => shared.consume_chunk(&mut extractor, &buf[..n]),
            Err(e) => {
                warn!("replay read failed, no further updates: {}", e);
                break;
            }
        }
    }
}

/// Network backend: blocks on socket readability (bounded by the poll
/// timeout so the stop flag stays observable) and decodes report lines.
async fn gpsd_loop(mut socket: TcpStream, mut shared: LoopShared) {
    let mut buf = [0u8; 512];
    let mut pending: Vec<u8> = Vec::new();

    while !shared.stop_requested() {
        match timeout(GPSD_POLL, socket.read(&mut buf)).await {
            Err(_) => continue,
            Ok(Ok(0)) => {
                warn!("gpsd connection: {}", DeviceError::TransportClosed);
                break;
            }
            Ok(Ok(n)) => {
                shared.log_bytes(&buf[..n]);
                pending.extend_from_slice(&buf[..n]);
                while let Some(end) = pending.iter().position(|&b| b == b'\n') {
                    let line = String::from_utf8_lossy(&pending[..end]).trim().to_string();
                    pending.drain(..=end);
                    if line.is_empty() {
                        continue;
                    }
                    let (update, position) = shared.store.apply(|state| {
                        let update = gpsd::decode_report(state, &line);
                        (update, state.position())
                    });
                    shared.notify(update, position);
                }
            }
            Ok(Err(e)) => {
                warn!("gpsd read failed, no further updates: {}", e);
                break;
            }
        }
    }
}

/// Platform backend: the location service delivers discrete reports, polled
/// at the configured interval.
#[cfg(windows)]
async fn platform_loop(geolocator: Geolocator, interval_secs: u64, shared: LoopShared) {
    let mut ticker = interval(Duration::from_secs(interval_secs));

    while !shared.stop_requested() {
        ticker.tick().await;
        match platform::poll_step(&geolocator, &shared.store).await {
            Ok(update) => {
                let position = shared.store.position();
                shared.notify(update, position);
            }
            Err(e) => warn!("location service report failed: {}", e),
        }
    }
}

/// Creates the raw-bytes session log. The filename embeds an ISO-8601
/// timestamp with colons replaced to stay filesystem-safe. Failure is
/// operator-visible but never aborts acquisition.
fn open_session_log(dir: &Path) -> Option<std::fs::File> {
    let name = format!("log-{}.nmea", Utc::now().format("%Y-%m-%dT%H-%M-%S"));
    let path = dir.join(name);
    match std::fs::File::create(&path) {
        Ok(file) => {
            info!("session log: {}", path.display());
            Some(file)
        }
        Err(e) => {
            error!("unable to create session log {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::FixStatus;
    use std::io::Write as _;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "gps-device-test-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_start_requires_open() {
        let mut device = GpsDevice::new(GpsSource::FileReplay {
            path: PathBuf::from("/nonexistent"),
        });

        match device.start() {
            Err(DeviceError::Lifecycle { op: "start", state }) => assert_eq!(state, "closed"),
            other => panic!("expected lifecycle error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_open_failure_stays_closed() {
        let mut device = GpsDevice::new(GpsSource::FileReplay {
            path: PathBuf::from("/nonexistent/replay.nmea"),
        });

        assert!(matches!(device.open().await, Err(DeviceError::Open(_))));
        assert!(device.start().is_err());
        // close() is idempotent even after a failed open
        device.close().await.unwrap();
        device.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_open_rejected() {
        let dir = temp_dir("double-open");
        let path = dir.join("replay.nmea");
        std::fs::write(&path, b"$GPGLL,4916.45,N,12311.12,W,225444,A\r\n").unwrap();

        let mut device = GpsDevice::new(GpsSource::FileReplay { path });
        device.open().await.unwrap();
        assert!(matches!(
            device.open().await,
            Err(DeviceError::Lifecycle { op: "open", .. })
        ));
        device.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_replay_produces_updates() {
        let dir = temp_dir("replay");
        let path = dir.join("replay.nmea");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"$GPGLL,4916.45,N,12311.12,W,225444,A\r\n").unwrap();
        file.write_all(
            b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n",
        )
        .unwrap();
        drop(file);

        let mut device = GpsDevice::new(GpsSource::FileReplay { path });
        let mut events = device.subscribe();
        let store = device.store();

        device.open().await.unwrap();
        device.start().unwrap();
        assert!(device.is_running());

        // Both sentences fit in the first replay chunk; the RMC one must
        // yield a position notification.
        let mut saw_position = false;
        for _ in 0..4 {
            match timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Ok(DeviceEvent::PositionUpdated(pos))) => {
                    assert!((pos.latitude - 48.1173).abs() < 0.0001);
                    assert_eq!(pos.speed, 41.5);
                    saw_position = true;
                    break;
                }
                Ok(Ok(DeviceEvent::StatusUpdated)) => continue,
                other => panic!("expected an event, got {:?}", other),
            }
        }
        assert!(saw_position);
        assert_eq!(store.fix_status(), FixStatus::Active);

        device.stop().await.unwrap();
        assert!(!device.is_running());
        device.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_from_closed_is_rejected() {
        let mut device = GpsDevice::new(GpsSource::Gpsd {
            host: "localhost".to_string(),
            port: 2947,
        });

        assert!(matches!(
            device.stop().await,
            Err(DeviceError::Lifecycle { op: "stop", .. })
        ));
    }

    #[test]
    fn test_session_log_filename_is_filesystem_safe() {
        let dir = temp_dir("session-log");
        let log = open_session_log(&dir);
        assert!(log.is_some());

        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        let name = names.iter().find(|n| n.starts_with("log-")).unwrap();
        assert!(name.ends_with(".nmea"));
        assert!(!name.contains(':'));
    }
}
