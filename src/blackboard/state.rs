use chrono::NaiveDateTime;
use crossbeam::atomic::AtomicCell;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

use super::field::{FieldReading, NavigationField};
use super::policy::{ArbitrationPolicy, Quantity, Source, Stamp};
use crate::types::Position;

/// Wind angle off the bow and speed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Wind {
    /// 0..=180 degrees; `port` tells which side.
    pub angle_deg: f64,
    pub speed_mps: f64,
    pub port: bool,
}

/// A telemetry value tagged with its bank or sensor location.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ChannelReading {
    pub value: f64,
    pub channel: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct EnergyCounters {
    pub charged_kwh: f64,
    pub consumed_kwh: f64,
    /// Unix time the counters were last reset.
    pub since_epoch: i64,
}

/// Shared navigation blackboard.
///
/// Created once with zero values; collectors write through
/// [`NavigationField::set_if_fresher`], consumers read through
/// [`NavigationView`].
#[derive(Debug)]
pub struct NavigationState {
    policy: ArbitrationPolicy,
    /// Degrees, 0..360.
    pub heading: NavigationField<f64>,
    pub roll: NavigationField<f64>,
    pub pitch: NavigationField<f64>,
    /// Knots.
    pub speed_over_ground: NavigationField<f64>,
    /// Knots.
    pub speed_through_water: NavigationField<f64>,
    /// Metres below surface.
    pub depth: NavigationField<f64>,
    /// Celsius.
    pub water_temperature: NavigationField<f64>,
    pub relative_wind: NavigationField<Wind>,
    pub true_wind: NavigationField<Wind>,
    pub position: NavigationField<Position>,
    pub utc: NavigationField<Option<NaiveDateTime>>,
    pub battery_voltage: NavigationField<ChannelReading>,
    pub battery_current: NavigationField<ChannelReading>,
    pub temperature: NavigationField<ChannelReading>,
    pub energy: NavigationField<EnergyCounters>,
    last_seen: [AtomicCell<Option<Instant>>; 3],
}

impl Default for NavigationState {
    fn default() -> Self {
        Self::new(ArbitrationPolicy::default())
    }
}

impl NavigationState {
    pub fn new(policy: ArbitrationPolicy) -> Self {
        Self {
            policy,
            heading: NavigationField::new(Quantity::Heading, policy),
            roll: NavigationField::new(Quantity::Roll, policy),
            pitch: NavigationField::new(Quantity::Pitch, policy),
            speed_over_ground: NavigationField::new(Quantity::SpeedOverGround, policy),
            speed_through_water: NavigationField::new(Quantity::SpeedThroughWater, policy),
            depth: NavigationField::new(Quantity::Depth, policy),
            water_temperature: NavigationField::new(Quantity::WaterTemperature, policy),
            relative_wind: NavigationField::new(Quantity::RelativeWind, policy),
            true_wind: NavigationField::new(Quantity::TrueWind, policy),
            position: NavigationField::new(Quantity::Position, policy),
            utc: NavigationField::new(Quantity::UtcTime, policy),
            battery_voltage: NavigationField::new(Quantity::BatteryVoltage, policy),
            battery_current: NavigationField::new(Quantity::BatteryCurrent, policy),
            temperature: NavigationField::new(Quantity::Temperature, policy),
            energy: NavigationField::new(Quantity::Energy, policy),
            last_seen: [
                AtomicCell::new(None),
                AtomicCell::new(None),
                AtomicCell::new(None),
            ],
        }
    }

    pub fn policy(&self) -> &ArbitrationPolicy {
        &self.policy
    }

    /// Record that `source` delivered navigation data at `now`.
    pub fn mark_seen(&self, source: Source, now: Instant) {
        self.last_seen[source.index()].store(Some(now));
    }

    pub fn last_seen(&self, source: Source) -> Option<Instant> {
        self.last_seen[source.index()].load()
    }

    /// Has `source` delivered navigation data within the freshness window?
    pub fn is_source_live(&self, source: Source, now: Instant) -> bool {
        self.last_seen(source)
            .map(|at| now.saturating_duration_since(at) <= self.policy.freshness_window)
            .unwrap_or(false)
    }

    pub fn stamp_of(&self, quantity: Quantity) -> Option<Stamp> {
        match quantity {
            Quantity::Heading => self.heading.stamp(),
            Quantity::Roll => self.roll.stamp(),
            Quantity::Pitch => self.pitch.stamp(),
            Quantity::SpeedOverGround => self.speed_over_ground.stamp(),
            Quantity::SpeedThroughWater => self.speed_through_water.stamp(),
            Quantity::Depth => self.depth.stamp(),
            Quantity::WaterTemperature => self.water_temperature.stamp(),
            Quantity::RelativeWind => self.relative_wind.stamp(),
            Quantity::TrueWind => self.true_wind.stamp(),
            Quantity::Position => self.position.stamp(),
            Quantity::UtcTime => self.utc.stamp(),
            Quantity::BatteryVoltage => self.battery_voltage.stamp(),
            Quantity::BatteryCurrent => self.battery_current.stamp(),
            Quantity::Temperature => self.temperature.stamp(),
            Quantity::Energy => self.energy.stamp(),
        }
    }

    pub fn snapshot(&self, now: Instant) -> NavigationSnapshot {
        NavigationSnapshot {
            heading: self.heading.read(now),
            roll: self.roll.read(now),
            pitch: self.pitch.read(now),
            speed_over_ground: self.speed_over_ground.read(now),
            speed_through_water: self.speed_through_water.read(now),
            depth: self.depth.read(now),
            water_temperature: self.water_temperature.read(now),
            relative_wind: self.relative_wind.read(now),
            true_wind: self.true_wind.read(now),
            position: self.position.read(now),
            utc: self.utc.read(now),
            battery_voltage: self.battery_voltage.read(now),
            battery_current: self.battery_current.read(now),
            temperature: self.temperature.read(now),
            energy: self.energy.read(now),
        }
    }
}

/// Every field as read at one instant. Fields are read one by one, so two
/// fields may straddle a concurrent write.
#[derive(Clone, Debug, Serialize)]
pub struct NavigationSnapshot {
    pub heading: FieldReading<f64>,
    pub roll: FieldReading<f64>,
    pub pitch: FieldReading<f64>,
    pub speed_over_ground: FieldReading<f64>,
    pub speed_through_water: FieldReading<f64>,
    pub depth: FieldReading<f64>,
    pub water_temperature: FieldReading<f64>,
    pub relative_wind: FieldReading<Wind>,
    pub true_wind: FieldReading<Wind>,
    pub position: FieldReading<Position>,
    pub utc: FieldReading<Option<NaiveDateTime>>,
    pub battery_voltage: FieldReading<ChannelReading>,
    pub battery_current: FieldReading<ChannelReading>,
    pub temperature: FieldReading<ChannelReading>,
    pub energy: FieldReading<EnergyCounters>,
}

/// Read-only handle for display and mirroring consumers.
#[derive(Clone, Debug)]
pub struct NavigationView {
    state: Arc<NavigationState>,
}

impl NavigationView {
    pub fn new(state: Arc<NavigationState>) -> Self {
        Self { state }
    }

    pub fn snapshot(&self, now: Instant) -> NavigationSnapshot {
        self.state.snapshot(now)
    }

    pub fn is_fresh(&self, quantity: Quantity, now: Instant) -> bool {
        self.state
            .stamp_of(quantity)
            .map(|s| self.state.policy().is_fresh(&s, now))
            .unwrap_or(false)
    }

    pub fn is_source_live(&self, source: Source, now: Instant) -> bool {
        self.state.is_source_live(source, now)
    }
}
