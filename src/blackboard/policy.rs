//! Which writer is authoritative for each quantity.
//!
//! Two orderings are consulted before any field write:
//! - source rank: a higher-ranked source holds a field for the whole
//!   freshness window;
//! - origin tier: within one source, a lower-tier sentence yields to a
//!   higher-tier one for the deference window.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::Tuning;

/// Producer of a field value, highest precedence first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Source {
    Network,
    Serial,
    Imu,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Network, Source::Serial, Source::Imu];

    pub fn index(self) -> usize {
        match self {
            Source::Network => 0,
            Source::Serial => 1,
            Source::Imu => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Source::Network => "network",
            Source::Serial => "serial",
            Source::Imu => "imu",
        }
    }
}

/// Sentence or sensor pipeline a value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Origin {
    Rmc,
    Gll,
    Vtg,
    Hdt,
    Hdg,
    Hdm,
    Vhw,
    Dpt,
    Dbt,
    Mtw,
    Mwv,
    Vwr,
    Env,
    Compass,
    Attitude,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Quantity {
    Heading,
    Roll,
    Pitch,
    SpeedOverGround,
    SpeedThroughWater,
    Depth,
    WaterTemperature,
    RelativeWind,
    TrueWind,
    Position,
    UtcTime,
    BatteryVoltage,
    BatteryCurrent,
    Temperature,
    Energy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Provenance {
    pub source: Source,
    pub origin: Origin,
}

impl Provenance {
    pub fn new(source: Source, origin: Origin) -> Self {
        Self { source, origin }
    }
}

/// When and by whom a field was last written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stamp {
    pub at: Instant,
    pub provenance: Provenance,
}

/// Ordered sources and origin tiers for one quantity.
#[derive(Clone, Copy, Debug)]
pub struct Rule {
    pub sources: &'static [Source],
    pub tiers: &'static [&'static [Origin]],
}

const ALL_SOURCES: &[Source] = &[Source::Network, Source::Serial, Source::Imu];
const NMEA_SOURCES: &[Source] = &[Source::Network, Source::Serial];

pub fn rule(quantity: Quantity) -> Rule {
    use Origin::*;
    match quantity {
        Quantity::Heading => Rule {
            sources: ALL_SOURCES,
            tiers: &[&[Rmc], &[Vtg], &[Hdt, Hdg, Hdm], &[Vhw]],
        },
        Quantity::Roll | Quantity::Pitch => Rule {
            sources: &[Source::Imu],
            tiers: &[],
        },
        Quantity::SpeedOverGround => Rule {
            sources: NMEA_SOURCES,
            tiers: &[&[Rmc], &[Vtg]],
        },
        Quantity::Position => Rule {
            sources: NMEA_SOURCES,
            tiers: &[&[Rmc], &[Gll]],
        },
        Quantity::Depth => Rule {
            sources: NMEA_SOURCES,
            tiers: &[&[Dpt], &[Dbt]],
        },
        Quantity::RelativeWind | Quantity::TrueWind => Rule {
            sources: NMEA_SOURCES,
            tiers: &[&[Mwv], &[Vwr]],
        },
        Quantity::UtcTime
        | Quantity::SpeedThroughWater
        | Quantity::WaterTemperature
        | Quantity::BatteryVoltage
        | Quantity::BatteryCurrent
        | Quantity::Temperature
        | Quantity::Energy => Rule {
            sources: NMEA_SOURCES,
            tiers: &[],
        },
    }
}

impl Rule {
    /// Unlisted sources rank last.
    pub fn source_rank(&self, source: Source) -> usize {
        self.sources
            .iter()
            .position(|s| *s == source)
            .unwrap_or(self.sources.len())
    }

    /// Unlisted origins share the lowest tier.
    pub fn origin_tier(&self, origin: Origin) -> usize {
        self.tiers
            .iter()
            .position(|tier| tier.contains(&origin))
            .unwrap_or(self.tiers.len())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArbitrationPolicy {
    pub freshness_window: Duration,
    pub deference_window: Duration,
}

impl Default for ArbitrationPolicy {
    fn default() -> Self {
        Self::from_tuning(&Tuning::default())
    }
}

impl ArbitrationPolicy {
    pub fn new(freshness_window: Duration, deference_window: Duration) -> Self {
        Self {
            freshness_window,
            deference_window,
        }
    }

    pub fn from_tuning(tuning: &Tuning) -> Self {
        Self::new(tuning.freshness_window, tuning.deference_window)
    }

    pub fn is_fresh(&self, stamp: &Stamp, now: Instant) -> bool {
        now.saturating_duration_since(stamp.at) <= self.freshness_window
    }

    /// May `incoming` overwrite a field last written under `current`?
    pub fn permits(
        &self,
        quantity: Quantity,
        current: Option<&Stamp>,
        incoming: Provenance,
        now: Instant,
    ) -> bool {
        let Some(current) = current else {
            return true;
        };
        let rule = rule(quantity);
        let age = now.saturating_duration_since(current.at);
        let held = rule.source_rank(current.provenance.source);
        let wanted = rule.source_rank(incoming.source);

        if wanted < held {
            return true;
        }
        if wanted > held {
            return age > self.freshness_window;
        }

        let held_tier = rule.origin_tier(current.provenance.origin);
        let wanted_tier = rule.origin_tier(incoming.origin);
        !(held_tier < wanted_tier && age <= self.deference_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(at: Instant, source: Source, origin: Origin) -> Stamp {
        Stamp {
            at,
            provenance: Provenance::new(source, origin),
        }
    }

    #[test]
    fn test_empty_field_accepts_anyone() {
        let policy = ArbitrationPolicy::default();
        let now = Instant::now();
        assert!(policy.permits(
            Quantity::Heading,
            None,
            Provenance::new(Source::Imu, Origin::Compass),
            now
        ));
    }

    #[test]
    fn test_imu_yields_to_fresh_network_heading() {
        let policy = ArbitrationPolicy::default();
        let t0 = Instant::now();
        let current = stamp(t0, Source::Network, Origin::Hdt);
        let imu = Provenance::new(Source::Imu, Origin::Compass);

        assert!(!policy.permits(Quantity::Heading, Some(&current), imu, t0 + Duration::from_secs(1)));
        assert!(!policy.permits(Quantity::Heading, Some(&current), imu, t0 + Duration::from_secs(4)));
        assert!(policy.permits(Quantity::Heading, Some(&current), imu, t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_network_preempts_serial_immediately() {
        let policy = ArbitrationPolicy::default();
        let t0 = Instant::now();
        let current = stamp(t0, Source::Serial, Origin::Rmc);
        let incoming = Provenance::new(Source::Network, Origin::Gll);
        assert!(policy.permits(Quantity::Position, Some(&current), incoming, t0));
    }

    #[test]
    fn test_lower_tier_defers_for_half_window() {
        let policy = ArbitrationPolicy::default();
        let t0 = Instant::now();
        let current = stamp(t0, Source::Serial, Origin::Dpt);
        let dbt = Provenance::new(Source::Serial, Origin::Dbt);

        assert!(!policy.permits(Quantity::Depth, Some(&current), dbt, t0 + Duration::from_secs(1)));
        assert!(policy.permits(Quantity::Depth, Some(&current), dbt, t0 + Duration::from_millis(2100)));
    }

    #[test]
    fn test_higher_tier_always_writes() {
        let policy = ArbitrationPolicy::default();
        let t0 = Instant::now();
        let current = stamp(t0, Source::Network, Origin::Vwr);
        let mwv = Provenance::new(Source::Network, Origin::Mwv);
        assert!(policy.permits(Quantity::RelativeWind, Some(&current), mwv, t0));
    }

    #[test]
    fn test_rule_ranks() {
        let heading = rule(Quantity::Heading);
        assert!(heading.source_rank(Source::Network) < heading.source_rank(Source::Serial));
        assert!(heading.source_rank(Source::Serial) < heading.source_rank(Source::Imu));
        assert!(heading.origin_tier(Origin::Rmc) < heading.origin_tier(Origin::Hdm));
        assert_eq!(rule(Quantity::Roll).source_rank(Source::Network), 1);
    }
}
