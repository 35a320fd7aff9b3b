pub mod field;
pub mod policy;
pub mod state;

pub use field::{FieldReading, NavigationField};
pub use policy::{ArbitrationPolicy, Origin, Provenance, Quantity, Source, Stamp};
pub use state::{
    ChannelReading, EnergyCounters, NavigationSnapshot, NavigationState, NavigationView, Wind,
};
