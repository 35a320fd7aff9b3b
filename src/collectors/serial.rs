use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::time::Instant;

use super::health::{CollectorHealth, HealthMonitor, LinkState};
use super::RunFlag;
use crate::blackboard::{NavigationState, Source};
use crate::calibration::ProfileCell;
use crate::config::Tuning;
use crate::error::NavResult;
use crate::nmea::{LineOutcome, NmeaDispatcher, SentenceFramer};

/// Opens (or reopens) the byte stream the collector reads from.
pub type SerialOpener = Box<dyn FnMut() -> NavResult<Box<dyn Read + Send>> + Send>;

/// Opener for a real serial device.
pub fn device_opener(path: String, baud: u32, read_timeout: Duration) -> SerialOpener {
    Box::new(move || {
        let port = serialport::new(&path, baud).timeout(read_timeout).open()?;
        log::info!("Opened {} at {} baud", path, baud);
        Ok(Box::new(port) as Box<dyn Read + Send>)
    })
}

/// Blocking NMEA reader for a serial GPS.
///
/// Run it on a blocking thread. While the network source is live the
/// collector stops reading and sleeps, so the two never interleave.
pub struct SerialCollector {
    opener: SerialOpener,
    dispatcher: NmeaDispatcher,
    state: Arc<NavigationState>,
    health: Arc<HealthMonitor>,
    framer: SentenceFramer,
    tuning: Tuning,
}

impl SerialCollector {
    pub fn new(
        opener: SerialOpener,
        state: Arc<NavigationState>,
        profile: Arc<ProfileCell>,
        health: Arc<HealthMonitor>,
        tuning: &Tuning,
    ) -> Self {
        let dispatcher = NmeaDispatcher::new(state.clone(), Source::Serial, tuning).with_profile(profile);
        Self {
            opener,
            dispatcher,
            state,
            health,
            framer: SentenceFramer::new(),
            tuning: tuning.clone(),
        }
    }

    fn link(&self) -> &CollectorHealth {
        &self.health.serial
    }

    pub fn should_defer(&self, now: Instant) -> bool {
        self.state.is_source_live(Source::Network, now)
    }

    /// Frame and apply a chunk of bytes; returns the number of fields written.
    pub fn ingest(&mut self, bytes: &[u8], now: Instant) -> usize {
        let mut written = 0;
        for line in self.framer.feed(bytes) {
            if let LineOutcome::Applied(n) = self.dispatcher.apply_line(&line, now) {
                written += n;
            }
        }
        written
    }

    pub fn run(mut self, run_flag: RunFlag) {
        let mut port: Option<Box<dyn Read + Send>> = None;
        let mut buf = [0u8; 256];
        let mut open_failures = 0u32;

        while run_flag.is_running() {
            let Some(reader) = port.as_mut() else {
                self.link().set_state(LinkState::Connecting);
                match (self.opener)() {
                    Ok(opened) => {
                        open_failures = 0;
                        self.framer.clear();
                        port = Some(opened);
                        self.link().set_state(LinkState::Streaming);
                    }
                    Err(e) => {
                        open_failures += 1;
                        if open_failures <= self.tuning.connect_logged_attempts {
                            log::warn!("Cannot open serial GPS: {}", e);
                        } else {
                            log::debug!("Cannot open serial GPS: {}", e);
                        }
                        self.link().set_state(LinkState::Disconnected);
                        thread::sleep(self.tuning.serial_reopen_delay);
                    }
                }
                continue;
            };

            if self.should_defer(Instant::now()) {
                thread::sleep(self.tuning.serial_defer_sleep);
                continue;
            }

            match reader.read(&mut buf) {
                Ok(0) => {
                    log::info!("Serial GPS stream ended");
                    port = None;
                    self.link().set_state(LinkState::Disconnected);
                }
                Ok(n) => {
                    self.ingest(&buf[..n], Instant::now());
                    self.link().update();
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                Err(e) => {
                    self.link().record_failure();
                    log::debug!("Serial read error: {}", e);
                    thread::sleep(self.tuning.serial_error_delay);
                }
            }
        }
        self.link().set_state(LinkState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::{Origin, Provenance};
    use crate::nmea::codec::with_checksum;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_tuning() -> Tuning {
        Tuning {
            serial_reopen_delay: Duration::from_millis(5),
            serial_defer_sleep: Duration::from_millis(5),
            serial_error_delay: Duration::from_millis(1),
            ..Tuning::default()
        }
    }

    fn stream() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(with_checksum('$', "GPRMC,123519,A,4807.038,N,01131.000,E,5.5,084.4,230394,003.1,W").bytes());
        bytes.extend(with_checksum('$', "SDDPT,12.5,0.5").bytes());
        bytes.extend(b"$SDMTW,15.0,C*7F\r\n");
        bytes
    }

    /// Serves `stream()` once, then stops the collector on the next open.
    fn one_shot_opener(flag: RunFlag, opens: Arc<AtomicU32>) -> SerialOpener {
        Box::new(move || {
            if opens.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Box::new(Cursor::new(stream())) as Box<dyn Read + Send>)
            } else {
                flag.stop();
                Err(crate::error::NavError::Io(std::io::Error::new(ErrorKind::NotFound, "gone")))
            }
        })
    }

    fn never_opens() -> SerialOpener {
        Box::new(|| -> NavResult<Box<dyn Read + Send>> {
            Err(crate::error::NavError::Storage("no device".into()))
        })
    }

    fn collector(opener: SerialOpener, state: &Arc<NavigationState>, health: &Arc<HealthMonitor>) -> SerialCollector {
        SerialCollector::new(
            opener,
            state.clone(),
            Arc::new(ProfileCell::default()),
            health.clone(),
            &fast_tuning(),
        )
    }

    #[test]
    fn test_reads_stream_into_blackboard() {
        let state = Arc::new(NavigationState::default());
        let health = Arc::new(HealthMonitor::default());
        let flag = RunFlag::new();
        let opens = Arc::new(AtomicU32::new(0));
        collector(one_shot_opener(flag.clone(), opens.clone()), &state, &health).run(flag);

        let now = Instant::now();
        let sog = state.speed_over_ground.read(now);
        assert_eq!(sog.value, 5.5);
        assert_eq!(sog.source, Some(Source::Serial));
        assert_eq!(state.depth.read(now).value, 13.0);
        // Bad checksum on MTW.
        assert!(state.water_temperature.stamp().is_none());
        assert!(state.is_source_live(Source::Serial, now));
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(health.serial.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_defers_while_network_live() {
        let state = Arc::new(NavigationState::default());
        state.mark_seen(Source::Network, Instant::now());
        let health = Arc::new(HealthMonitor::default());
        let flag = RunFlag::new();
        let opens = Arc::new(AtomicU32::new(0));
        let serial = collector(one_shot_opener(flag.clone(), opens.clone()), &state, &health);
        assert!(serial.should_defer(Instant::now()));

        let runner = {
            let flag = flag.clone();
            thread::spawn(move || serial.run(flag))
        };
        thread::sleep(Duration::from_millis(100));
        flag.stop();
        runner.join().unwrap();

        assert!(state.speed_over_ground.stamp().is_none());
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ingest_across_chunks() {
        let state = Arc::new(NavigationState::default());
        let health = Arc::new(HealthMonitor::default());
        let mut serial = collector(never_opens(), &state, &health);

        let bytes = stream();
        let now = Instant::now();
        assert_eq!(serial.ingest(&bytes[..20], now), 0);
        assert!(serial.ingest(&bytes[20..], now) > 0);
    }

    #[test]
    fn test_network_heading_outranks_serial() {
        let state = Arc::new(NavigationState::default());
        let health = Arc::new(HealthMonitor::default());
        let mut serial = collector(never_opens(), &state, &health);
        let now = Instant::now();
        state
            .heading
            .set_if_fresher(200.0, Provenance::new(Source::Network, Origin::Hdt), now);

        serial.ingest(with_checksum('$', "HCHDT,100.0,T").as_bytes(), now);
        assert_eq!(state.heading.read(now).value, 200.0);
    }
}
