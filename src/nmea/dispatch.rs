//! Writes parsed sentences into the blackboard.

use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tokio::time::Instant;

use super::codec::{parse_coordinate, CoordinateAxis};
use super::sentence::{NmeaSentence, SentenceKind};
use crate::blackboard::{
    ChannelReading, EnergyCounters, NavigationField, NavigationState, Origin, Provenance, Source,
    Wind,
};
use crate::calibration::ProfileCell;
use crate::config::{Tuning, KNOTS_PER_MPS};
use crate::types::{normalize_degrees, Position};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Checksum missing or wrong.
    Rejected,
    /// Valid but nothing was written.
    Ignored,
    Applied(usize),
}

pub struct NmeaDispatcher {
    state: Arc<NavigationState>,
    source: Source,
    profile: Option<Arc<ProfileCell>>,
    trusted_sog_knots: f64,
    true_wind_min_stw_knots: f64,
}

impl NmeaDispatcher {
    pub fn new(state: Arc<NavigationState>, source: Source, tuning: &Tuning) -> Self {
        Self {
            state,
            source,
            profile: None,
            trusted_sog_knots: tuning.trusted_sog_knots,
            true_wind_min_stw_knots: tuning.true_wind_min_stw_knots,
        }
    }

    /// Use the shared profile's depth correction for DBT readings.
    pub fn with_profile(mut self, profile: Arc<ProfileCell>) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn apply_line(&self, line: &str, now: Instant) -> LineOutcome {
        let sentence = NmeaSentence::parse(line);
        if !sentence.is_valid() {
            log::debug!("[{}] dropping sentence with bad checksum: {}", self.source.name(), sentence.raw());
            return LineOutcome::Rejected;
        }
        match self.apply(&sentence, now) {
            0 => LineOutcome::Ignored,
            n => LineOutcome::Applied(n),
        }
    }

    /// Apply one checksum-valid sentence; returns how many fields were written.
    pub fn apply(&self, s: &NmeaSentence<'_>, now: Instant) -> usize {
        let kind = s.kind();
        if matches!(kind, SentenceKind::Rmc | SentenceKind::Gll | SentenceKind::Vtg) {
            self.state.mark_seen(self.source, now);
        }
        match kind {
            SentenceKind::Rmc => self.apply_rmc(s, now),
            SentenceKind::Gll => self.apply_gll(s, now),
            SentenceKind::Vtg => self.apply_vtg(s, now),
            SentenceKind::Hdt => self.apply_heading(s, Origin::Hdt, now),
            SentenceKind::Hdg => self.apply_heading(s, Origin::Hdg, now),
            SentenceKind::Hdm => self.apply_heading(s, Origin::Hdm, now),
            SentenceKind::Vhw => self.apply_vhw(s, now),
            SentenceKind::Dpt => self.apply_dpt(s, now),
            SentenceKind::Dbt => self.apply_dbt(s, now),
            SentenceKind::Mtw => self.write_opt(&self.state.water_temperature, s.number(1), Origin::Mtw, now),
            SentenceKind::Mwv => self.apply_mwv(s, now),
            SentenceKind::Vwr => self.apply_vwr(s, now),
            SentenceKind::Env => self.apply_env(s, now),
            SentenceKind::Other => 0,
        }
    }

    fn write<T: Copy>(&self, field: &NavigationField<T>, value: T, origin: Origin, now: Instant) -> usize {
        let provenance = Provenance::new(self.source, origin);
        usize::from(field.set_if_fresher(value, provenance, now))
    }

    fn write_opt<T: Copy>(
        &self,
        field: &NavigationField<T>,
        value: Option<T>,
        origin: Origin,
        now: Instant,
    ) -> usize {
        value.map_or(0, |v| self.write(field, v, origin, now))
    }

    /// SOG and track are only trusted above a minimum speed.
    fn write_motion(&self, sog: Option<f64>, track: Option<f64>, origin: Origin, now: Instant) -> usize {
        let Some(sog) = sog.filter(|v| *v >= self.trusted_sog_knots) else {
            return 0;
        };
        let mut written = self.write(&self.state.speed_over_ground, sog, origin, now);
        if let Some(track) = track.filter(|t| *t != 0.0) {
            written += self.write(&self.state.heading, normalize_degrees(track), origin, now);
        }
        written
    }

    fn position(s: &NmeaSentence<'_>, lat: usize) -> Option<Position> {
        Some(Position {
            latitude: parse_coordinate(s.field(lat), s.field(lat + 1), CoordinateAxis::Latitude)?,
            longitude: parse_coordinate(s.field(lat + 2), s.field(lat + 3), CoordinateAxis::Longitude)?,
        })
    }

    fn apply_rmc(&self, s: &NmeaSentence<'_>, now: Instant) -> usize {
        let mut written = self.write_opt(&self.state.position, Self::position(s, 3), Origin::Rmc, now);
        if let Some(utc) = parse_utc(s.field(1), s.field(9)) {
            written += self.write(&self.state.utc, Some(utc), Origin::Rmc, now);
        }
        written + self.write_motion(s.number(7), s.number(8), Origin::Rmc, now)
    }

    fn apply_gll(&self, s: &NmeaSentence<'_>, now: Instant) -> usize {
        self.write_opt(&self.state.position, Self::position(s, 1), Origin::Gll, now)
    }

    fn apply_vtg(&self, s: &NmeaSentence<'_>, now: Instant) -> usize {
        self.write_motion(s.number(5), s.number(1), Origin::Vtg, now)
    }

    fn apply_heading(&self, s: &NmeaSentence<'_>, origin: Origin, now: Instant) -> usize {
        self.write_opt(&self.state.heading, s.number(1).map(normalize_degrees), origin, now)
    }

    fn apply_vhw(&self, s: &NmeaSentence<'_>, now: Instant) -> usize {
        let stw = s.number(5).filter(|v| *v != 0.0);
        let mut written = self.write_opt(&self.state.speed_through_water, stw, Origin::Vhw, now);
        let heading = s.number(1).or_else(|| s.number(3)).map(normalize_degrees);
        written += self.write_opt(&self.state.heading, heading, Origin::Vhw, now);
        written
    }

    fn apply_dpt(&self, s: &NmeaSentence<'_>, now: Instant) -> usize {
        let depth = s.number(1).map(|d| d + s.number(2).unwrap_or(0.0));
        self.write_opt(&self.state.depth, depth, Origin::Dpt, now)
    }

    fn apply_dbt(&self, s: &NmeaSentence<'_>, now: Instant) -> usize {
        let correction = self.profile.as_ref().map_or(0.0, |p| p.load().depth_offset_m);
        let depth = s.number(3).map(|d| d + correction);
        self.write_opt(&self.state.depth, depth, Origin::Dbt, now)
    }

    fn apply_mwv(&self, s: &NmeaSentence<'_>, now: Instant) -> usize {
        if s.field(4) != "N" {
            return 0;
        }
        let (Some(angle), Some(speed)) = (s.number(1), s.number(3)) else {
            return 0;
        };
        let speed_mps = speed / KNOTS_PER_MPS;
        match s.field(2) {
            "R" => {
                let relative = fold_relative(angle, speed_mps);
                self.write(&self.state.relative_wind, relative, Origin::Mwv, now)
                    + self.derive_true_wind(relative, Origin::Mwv, now)
            }
            "T" => {
                let wind = Wind {
                    angle_deg: normalize_degrees(angle),
                    speed_mps,
                    port: false,
                };
                self.write(&self.state.true_wind, wind, Origin::Mwv, now)
            }
            _ => 0,
        }
    }

    fn apply_vwr(&self, s: &NmeaSentence<'_>, now: Instant) -> usize {
        let (Some(angle), Some(speed)) = (s.number(1), s.number(3)) else {
            return 0;
        };
        let relative = Wind {
            angle_deg: angle.clamp(0.0, 180.0),
            speed_mps: speed / KNOTS_PER_MPS,
            port: s.field(2) != "R",
        };
        let written = self.write(&self.state.relative_wind, relative, Origin::Vwr, now);
        if written == 0 {
            return 0;
        }
        written + self.derive_true_wind(relative, Origin::Vwr, now)
    }

    /// True wind from apparent wind and fresh water speed.
    fn derive_true_wind(&self, relative: Wind, origin: Origin, now: Instant) -> usize {
        let Some(stw) = self
            .state
            .speed_through_water
            .fresh(now)
            .filter(|v| *v > self.true_wind_min_stw_knots)
        else {
            return 0;
        };
        let boat_mps = stw / KNOTS_PER_MPS;
        let wind = Wind {
            angle_deg: true_wind_direction(boat_mps, relative.speed_mps, relative.angle_deg),
            speed_mps: true_wind_speed(boat_mps, relative.speed_mps, relative.angle_deg),
            port: relative.port,
        };
        self.write(&self.state.true_wind, wind, origin, now)
    }

    // $P..ENV,volt,bank,current,bank,temp,location,kWh_charged,kWh_consumed,start_epoch
    fn apply_env(&self, s: &NmeaSentence<'_>, now: Instant) -> usize {
        let mut written = 0;
        if let Some(volt) = s.number(1).filter(|v| *v >= 8.0) {
            let reading = ChannelReading {
                value: volt,
                channel: s.integer(2).unwrap_or(0),
            };
            written += self.write(&self.state.battery_voltage, reading, Origin::Env, now);
        }
        if let Some(current) = s.number(3) {
            let reading = ChannelReading {
                value: current,
                channel: s.integer(4).unwrap_or(0),
            };
            written += self.write(&self.state.battery_current, reading, Origin::Env, now);
        }
        // 100 °C is the sender's "no sensor" marker.
        if let Some(temp) = s.number(5).filter(|t| *t != 100.0) {
            let reading = ChannelReading {
                value: temp,
                channel: s.integer(6).unwrap_or(0),
            };
            written += self.write(&self.state.temperature, reading, Origin::Env, now);
        }
        if let (Some(charged), Some(consumed)) = (s.number(7), s.number(8)) {
            let counters = EnergyCounters {
                charged_kwh: charged,
                consumed_kwh: consumed,
                since_epoch: s.integer(9).unwrap_or(0),
            };
            written += self.write(&self.state.energy, counters, Origin::Env, now);
        }
        written
    }
}

fn fold_relative(angle: f64, speed_mps: f64) -> Wind {
    let angle = normalize_degrees(angle);
    if angle > 180.0 {
        Wind {
            angle_deg: 360.0 - angle,
            speed_mps,
            port: true,
        }
    } else {
        Wind {
            angle_deg: angle,
            speed_mps,
            port: false,
        }
    }
}

/// True wind speed from boat speed and apparent wind (same units).
pub fn true_wind_speed(boat_speed: f64, apparent_speed: f64, apparent_angle_deg: f64) -> f64 {
    let a = apparent_angle_deg.to_radians();
    ((apparent_speed * a.cos() - boat_speed).powi(2) + (apparent_speed * a.sin()).powi(2)).sqrt()
}

/// True wind angle off the bow in degrees.
pub fn true_wind_direction(boat_speed: f64, apparent_speed: f64, apparent_angle_deg: f64) -> f64 {
    let (angle, mirrored) = if apparent_angle_deg > 180.0 {
        (360.0 - apparent_angle_deg, true)
    } else {
        (apparent_angle_deg, false)
    };
    let a = angle.to_radians();
    let twd = (90.0_f64.to_radians()
        - ((apparent_speed * a.cos() - boat_speed) / (apparent_speed * a.sin())).atan())
    .to_degrees();
    if mirrored {
        360.0 - twd
    } else {
        twd
    }
}

/// `hhmmss[.sss]` and `ddmmyy` to a UTC timestamp.
pub fn parse_utc(time: &str, date: &str) -> Option<NaiveDateTime> {
    if time.len() < 6 || date.len() != 6 || !time.is_ascii() || !date.is_ascii() {
        return None;
    }
    let two = |text: &str, at: usize| text.get(at..at + 2)?.parse::<u32>().ok();
    let (hour, minute, second) = (two(time, 0)?, two(time, 2)?, two(time, 4)?);
    let millis = match time.get(6..) {
        Some(frac) if frac.starts_with('.') && frac.len() > 1 => {
            let digits: String = frac[1..].chars().chain("000".chars()).take(3).collect();
            digits.parse::<u32>().ok()?
        }
        _ => 0,
    };
    let (day, month, yy) = (two(date, 0)?, two(date, 2)?, two(date, 4)?);
    let year = if yy >= 70 { 1900 + yy } else { 2000 + yy };
    NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_milli_opt(hour, minute, second, millis)
}
