pub mod codec;
pub mod dispatch;
pub mod framer;
pub mod sentence;

pub use codec::{dms_to_decimal_degrees, field, validate_checksum, CoordinateAxis};
pub use dispatch::{LineOutcome, NmeaDispatcher};
pub use framer::SentenceFramer;
pub use sentence::{NmeaSentence, SentenceKind};
