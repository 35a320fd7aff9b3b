use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, Instant};

use speedometer_rs::blackboard::{ArbitrationPolicy, NavigationState, NavigationView};
use speedometer_rs::calibration::{apply_calibration, CalibrationOutcome, CalibrationRecorder, ProfileCell};
use speedometer_rs::collectors::serial::device_opener;
use speedometer_rs::collectors::{
    health_monitor_task, HealthMonitor, I2cCollector, LinkState, NetworkCollector, RunFlag,
    SerialCollector,
};
use speedometer_rs::config::{RuntimeConfig, Tuning};
use speedometer_rs::declination::FixedDeclination;
use speedometer_rs::error::{NavError, NavResult};
use speedometer_rs::imu::{ImuFusionEngine, SharedImu};
use speedometer_rs::live_status::LiveStatus;
use speedometer_rs::persistence::{JsonSettingsStore, SettingsStore};

#[derive(Parser, Debug)]
#[command(name = "speedometer")]
#[command(about = "Marine navigation sensor fusion: IMU compass, serial GPS and NMEA over TCP", long_about = None)]
struct Args {
    /// Duration in seconds (0 = run until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON settings file holding runtime config and calibration
    #[arg(long, default_value = "speedometer.json")]
    settings: PathBuf,

    /// Do not read the serial GPS
    #[arg(short = 'g', long)]
    no_gps: bool,

    /// Do not read the IMU
    #[arg(short = 'i', long)]
    no_imu: bool,

    /// Do not connect to the NMEA server
    #[arg(short = 'n', long)]
    no_network: bool,

    /// Serial device, overrides the settings file
    #[arg(long)]
    tty: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    /// NMEA server host
    #[arg(long)]
    host: Option<String>,

    /// NMEA server port
    #[arg(long)]
    port: Option<u16>,

    /// Write a JSON status snapshot here
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Seconds between status snapshots
    #[arg(long, default_value = "1")]
    status_interval: u64,

    /// Run one magnetometer calibration at start-up
    #[arg(long)]
    calibrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let started = Instant::now();

    let store: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::new(&args.settings));
    let config = load_config(store.as_ref(), &args)?;
    let tuning = Tuning::default();

    log::info!("Speedometer starting");
    log::info!("  Settings: {}", args.settings.display());
    log::info!("  Serial: {} @ {}", config.serial_device, config.baud);
    log::info!("  Network: {}", config.network_address());
    log::info!("  I2C: {}", config.i2c_bus);
    log::info!("  Duration: {} seconds (0=continuous)", args.duration);

    let profile = match store.load_calibration() {
        Ok(profile) => profile,
        Err(e) => {
            log::warn!("Using default calibration: {}", e);
            Default::default()
        }
    };
    let profile = Arc::new(ProfileCell::new(profile));
    let state = Arc::new(NavigationState::new(ArbitrationPolicy::from_tuning(&tuning)));
    let health = Arc::new(HealthMonitor::new(tuning.freshness_window));
    let run_flag = RunFlag::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    handles.push(tokio::spawn(health_monitor_task(health.clone(), run_flag.clone())));

    let imu = if args.no_imu {
        health.i2c.set_state(LinkState::Disabled);
        None
    } else {
        match open_imu(&config.i2c_bus, &tuning) {
            Ok(engine) => {
                log::info!("IMU detected: {}", engine.chip_name());
                Some(engine.into_shared())
            }
            Err(e) => {
                log::error!("IMU unavailable on {}: {}", config.i2c_bus, e);
                health.i2c.set_state(LinkState::Disabled);
                None
            }
        }
    };
    let imu_chip = imu
        .as_ref()
        .map(|imu| imu.lock().unwrap_or_else(PoisonError::into_inner).chip_name());

    if let Some(imu) = &imu {
        let collector = I2cCollector::new(
            imu.clone(),
            state.clone(),
            profile.clone(),
            store.clone(),
            health.clone(),
            &tuning,
        );
        handles.push(tokio::spawn(collector.run(run_flag.clone())));
    }

    if args.no_gps {
        health.serial.set_state(LinkState::Disabled);
    } else {
        let opener = device_opener(config.serial_device.clone(), config.baud, tuning.serial_read_timeout);
        let collector = SerialCollector::new(opener, state.clone(), profile.clone(), health.clone(), &tuning);
        let flag = run_flag.clone();
        handles.push(tokio::task::spawn_blocking(move || collector.run(flag)));
    }

    if args.no_network {
        health.network.set_state(LinkState::Disabled);
    } else {
        let collector = NetworkCollector::new(
            config.network_address(),
            state.clone(),
            profile.clone(),
            health.clone(),
            &tuning,
        );
        handles.push(tokio::spawn(collector.run(run_flag.clone())));
    }

    if let Some(path) = args.status_file.clone() {
        let view = NavigationView::new(state.clone());
        let health = health.clone();
        let flag = run_flag.clone();
        let every = Duration::from_secs(args.status_interval.max(1));
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(every);
            while flag.is_running() {
                ticker.tick().await;
                let status = LiveStatus::capture(&view, &health, started.elapsed(), imu_chip);
                if let Err(e) = status.save(&path) {
                    log::warn!("Cannot write status file {}: {}", path.display(), e);
                }
            }
        }));
    }

    if args.calibrate {
        match &imu {
            Some(imu) => calibrate(imu, &state, &profile, store.as_ref(), &tuning).await,
            None => log::warn!("Calibration requested but no IMU is available"),
        }
    }

    if args.duration > 0 {
        tokio::select! {
            _ = signal::ctrl_c() => log::info!("Interrupted, stopping..."),
            _ = sleep(Duration::from_secs(args.duration)) => log::info!("Duration reached, stopping..."),
        }
    } else {
        signal::ctrl_c().await?;
        log::info!("Interrupted, stopping...");
    }

    run_flag.stop();
    for handle in handles {
        if let Err(e) = handle.await {
            log::warn!("Collector task ended abnormally: {}", e);
        }
    }
    log::info!("Stopped after {}s", started.elapsed().as_secs());
    Ok(())
}

fn load_config(store: &dyn SettingsStore, args: &Args) -> NavResult<RuntimeConfig> {
    let mut config = match store.load_runtime_config() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Using default runtime config: {}", e);
            RuntimeConfig::default()
        }
    };
    if let Some(tty) = &args.tty {
        config.serial_device = tty.clone();
    }
    if let Some(baud) = args.baud {
        config.baud = baud;
    }
    if let Some(host) = &args.host {
        config.network_host = host.clone();
    }
    if let Some(port) = args.port {
        config.network_port = port;
    }
    config.validated()
}

#[cfg(target_os = "linux")]
fn open_imu(path: &str, tuning: &Tuning) -> NavResult<ImuFusionEngine> {
    let bus = speedometer_rs::imu::LinuxI2cBus::open(path)?;
    ImuFusionEngine::init(Box::new(bus), tuning)
}

#[cfg(not(target_os = "linux"))]
fn open_imu(path: &str, _tuning: &Tuning) -> NavResult<ImuFusionEngine> {
    Err(NavError::Bus(format!("{}: I2C needs Linux", path)))
}

/// One operator-triggered calibration; Ctrl-C aborts it and keeps the old profile.
async fn calibrate(
    imu: &SharedImu,
    state: &NavigationState,
    profile: &ProfileCell,
    store: &dyn SettingsStore,
    tuning: &Tuning,
) {
    let recorder = CalibrationRecorder::new(tuning);
    let position = state.position.fresh(Instant::now());
    // No online declination service is configured; the stored value is kept.
    let lookup = FixedDeclination(None);
    let flag = RunFlag::new();

    let outcome = tokio::select! {
        outcome = recorder.record(imu, profile.load(), position, &lookup, &flag) => outcome,
        _ = signal::ctrl_c() => {
            log::info!("Calibration aborted by operator");
            Ok(CalibrationOutcome::Cancelled)
        }
    };

    let result: NavResult<_> = outcome.and_then(|o| apply_calibration(store, profile, &o));
    match result {
        Ok(Some(applied)) => log::info!(
            "New calibration in effect: offsets {:?}",
            applied.hard_iron_offset().as_slice()
        ),
        Ok(None) => log::info!("Calibration cancelled; previous profile kept"),
        Err(NavError::Calibration(msg)) => log::warn!("Calibration failed: {}", msg),
        Err(e) => log::error!("Calibration could not be saved: {}", e),
    }
}
