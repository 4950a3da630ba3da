//! The JSON CRDT Patch protocol: logical clock, operations, patches, the
//! patch builder and the patch wire codecs.

pub mod clock;
pub mod codec;
pub mod compaction;
pub mod constants;
pub mod enums;
pub mod operations;
pub mod patch;
pub mod patch_builder;
pub mod util;

pub use clock::{ts, tss, ClockVector, ServerClockVector, Ts, Tss};
pub use operations::{ConValue, Op};
pub use patch::Patch;
pub use patch_builder::{BuilderClock, PatchBuilder};
