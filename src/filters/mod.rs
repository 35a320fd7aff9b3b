pub mod complementary;
pub mod heading;

pub use complementary::{AttitudeState, ComplementaryFilter};
pub use heading::{HeadingDebouncer, HeadingPipeline};
