use serde::{Serialize, Serializer};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::policy::{ArbitrationPolicy, Origin, Provenance, Quantity, Source, Stamp};

#[derive(Clone, Copy, Debug)]
struct Slot<T> {
    value: T,
    stamp: Option<Stamp>,
}

/// One timestamped quantity on the blackboard.
///
/// Value and stamp sit behind one small lock per field, so a reader never
/// sees a stamp newer than the value it describes. The lock is held only
/// for a copy.
#[derive(Debug)]
pub struct NavigationField<T> {
    quantity: Quantity,
    policy: ArbitrationPolicy,
    slot: Mutex<Slot<T>>,
}

/// Value plus age and provenance as seen at one instant.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct FieldReading<T> {
    pub value: T,
    #[serde(serialize_with = "age_secs", rename = "age_secs")]
    pub age: Option<Duration>,
    pub fresh: bool,
    pub source: Option<Source>,
    pub origin: Option<Origin>,
}

fn age_secs<S: Serializer>(age: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match age {
        Some(age) => serializer.serialize_some(&age.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

impl<T: Copy + Default> NavigationField<T> {
    pub fn new(quantity: Quantity, policy: ArbitrationPolicy) -> Self {
        Self {
            quantity,
            policy,
            slot: Mutex::new(Slot {
                value: T::default(),
                stamp: None,
            }),
        }
    }
}

impl<T: Copy> NavigationField<T> {
    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn load(&self) -> Slot<T> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stamp(&self) -> Option<Stamp> {
        self.load().stamp
    }

    pub fn read(&self, now: Instant) -> FieldReading<T> {
        let slot = self.load();
        FieldReading {
            value: slot.value,
            age: slot.stamp.map(|s| now.saturating_duration_since(s.at)),
            fresh: slot
                .stamp
                .map(|s| self.policy.is_fresh(&s, now))
                .unwrap_or(false),
            source: slot.stamp.map(|s| s.provenance.source),
            origin: slot.stamp.map(|s| s.provenance.origin),
        }
    }

    /// The value if it was written within the freshness window.
    pub fn fresh(&self, now: Instant) -> Option<T> {
        let reading = self.read(now);
        reading.fresh.then_some(reading.value)
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.read(now).fresh
    }

    /// Write `value` unless the arbitration policy keeps the current writer.
    pub fn set_if_fresher(&self, value: T, provenance: Provenance, now: Instant) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if !self
            .policy
            .permits(self.quantity, slot.stamp.as_ref(), provenance, now)
        {
            return false;
        }
        slot.value = value;
        slot.stamp = Some(Stamp { at: now, provenance });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading_field() -> NavigationField<f64> {
        NavigationField::new(Quantity::Heading, ArbitrationPolicy::default())
    }

    #[test]
    fn test_starts_empty_and_stale() {
        let field = heading_field();
        let reading = field.read(Instant::now());
        assert_eq!(reading.value, 0.0);
        assert!(reading.age.is_none());
        assert!(!reading.fresh);
        assert!(reading.source.is_none());
    }

    #[test]
    fn test_freshness_window() {
        let field = heading_field();
        let t = Instant::now();
        assert!(field.set_if_fresher(
            123.0,
            Provenance::new(Source::Serial, Origin::Hdt),
            t
        ));

        let at_3s = field.read(t + Duration::from_secs(3));
        assert!(at_3s.fresh);
        assert_eq!(at_3s.age, Some(Duration::from_secs(3)));
        assert_eq!(field.fresh(t + Duration::from_secs(3)), Some(123.0));

        let at_5s = field.read(t + Duration::from_secs(5));
        assert!(!at_5s.fresh);
        assert_eq!(at_5s.value, 123.0);
        assert_eq!(field.fresh(t + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_network_heading_survives_imu_write() {
        let field = heading_field();
        let t = Instant::now();
        field.set_if_fresher(200.0, Provenance::new(Source::Network, Origin::Hdt), t);

        let written = field.set_if_fresher(
            15.0,
            Provenance::new(Source::Imu, Origin::Compass),
            t + Duration::from_secs(1),
        );
        assert!(!written);

        let reading = field.read(t + Duration::from_secs(1));
        assert_eq!(reading.value, 200.0);
        assert_eq!(reading.source, Some(Source::Network));
    }

    #[test]
    fn test_reading_serializes_age_in_seconds() {
        let field = heading_field();
        let t = Instant::now();
        field.set_if_fresher(90.0, Provenance::new(Source::Imu, Origin::Compass), t);
        let json = serde_json::to_value(field.read(t + Duration::from_millis(1500))).unwrap();
        assert_eq!(json["age_secs"], 1.5);
        assert_eq!(json["source"], "Imu");
        assert_eq!(json["fresh"], true);
    }
}
