use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

use super::backoff::ReconnectBackoff;
use super::health::{CollectorHealth, HealthMonitor, LinkState};
use super::RunFlag;
use crate::blackboard::{NavigationState, Source};
use crate::calibration::ProfileCell;
use crate::config::Tuning;
use crate::nmea::{LineOutcome, NmeaDispatcher, SentenceFramer};

/// Why a streaming session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    Closed,
    Idle,
    Failed,
}

/// NMEA-over-TCP client, the highest-ranked source.
pub struct NetworkCollector {
    address: String,
    dispatcher: NmeaDispatcher,
    health: Arc<HealthMonitor>,
    framer: SentenceFramer,
    backoff: ReconnectBackoff,
    tuning: Tuning,
}

impl NetworkCollector {
    pub fn new(
        address: String,
        state: Arc<NavigationState>,
        profile: Arc<ProfileCell>,
        health: Arc<HealthMonitor>,
        tuning: &Tuning,
    ) -> Self {
        Self {
            backoff: ReconnectBackoff::from_tuning(&format!("NMEA {}", address), tuning),
            address,
            dispatcher: NmeaDispatcher::new(state, Source::Network, tuning).with_profile(profile),
            health,
            framer: SentenceFramer::new(),
            tuning: tuning.clone(),
        }
    }

    fn link(&self) -> &CollectorHealth {
        &self.health.network
    }

    pub async fn run(mut self, run_flag: RunFlag) {
        while run_flag.is_running() {
            self.link().set_state(LinkState::Connecting);
            let connect = timeout(self.tuning.initial_readable_wait, TcpStream::connect(&self.address)).await;
            match connect {
                Ok(Ok(stream)) => {
                    log::info!("Connected to NMEA server {}", self.address);
                    let end = self.stream(stream, &run_flag).await;
                    self.link().set_state(LinkState::Disconnected);
                    if end == SessionEnd::Stopped {
                        break;
                    }
                    log::info!("NMEA session with {} ended: {:?}", self.address, end);
                    self.link().record_failure();
                    let wait = self.backoff.record_failure();
                    pause(wait, &run_flag).await;
                }
                Ok(Err(e)) => {
                    self.link().set_state(LinkState::Disconnected);
                    self.link().record_failure();
                    log::debug!("connect {}: {}", self.address, e);
                    let wait = self.backoff.record_failure();
                    pause(wait, &run_flag).await;
                }
                Err(_) => {
                    self.link().set_state(LinkState::Disconnected);
                    self.link().record_failure();
                    log::debug!("connect {}: timed out", self.address);
                    let wait = self.backoff.record_failure();
                    pause(wait, &run_flag).await;
                }
            }
        }
        self.link().set_state(LinkState::Disconnected);
    }

    async fn stream(&mut self, mut stream: TcpStream, run_flag: &RunFlag) -> SessionEnd {
        self.framer.clear();
        self.link().set_state(LinkState::Streaming);
        let mut buf = [0u8; 1024];
        let mut wait = self.tuning.initial_readable_wait;
        let mut idle_reads = 0u32;
        let mut received = false;

        while run_flag.is_running() {
            match timeout(wait, stream.read(&mut buf)).await {
                Ok(Ok(0)) => return SessionEnd::Closed,
                Ok(Ok(n)) => {
                    if !received {
                        received = true;
                        self.backoff.record_success();
                        self.link().reset_failures();
                    }
                    idle_reads = 0;
                    wait = self.tuning.read_wait;
                    self.link().set_state(LinkState::Streaming);
                    self.link().update();
                    if self.ingest(&buf[..n], Instant::now()) == 0 && self.framer.pending().len() == n {
                        // Only a fragment so far; let the rest arrive.
                        sleep(self.tuning.empty_read_delay).await;
                    }
                }
                Ok(Err(e)) => {
                    log::warn!("NMEA read from {} failed: {}", self.address, e);
                    return SessionEnd::Failed;
                }
                Err(_) => {
                    idle_reads += 1;
                    if idle_reads > self.tuning.idle_read_budget {
                        log::warn!("No NMEA data from {} after {} retries", self.address, idle_reads - 1);
                        return SessionEnd::Idle;
                    }
                    self.link().set_state(LinkState::SocketIdleRetry);
                    sleep(self.tuning.idle_retry_delay).await;
                }
            }
        }
        SessionEnd::Stopped
    }

    /// Frame and apply received bytes; returns the number of sentences applied.
    pub fn ingest(&mut self, bytes: &[u8], now: Instant) -> usize {
        self.framer
            .feed(bytes)
            .iter()
            .filter(|line| matches!(self.dispatcher.apply_line(line, now), LineOutcome::Applied(_)))
            .count()
    }
}

/// Sleep for `total`, waking every second to honor the run flag.
async fn pause(total: Duration, run_flag: &RunFlag) {
    let deadline = Instant::now() + total;
    while run_flag.is_running() {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        sleep((deadline - now).min(Duration::from_secs(1))).await;
    }
}
