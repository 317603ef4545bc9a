//! Index aliases shared by every layer of the engine.

/// Epoch number. The first epoch of a network is usually 1.
pub type Epoch = u32;

/// Frame number within an epoch. The first frame is 1, 0 means "none".
pub type Frame = u32;

/// Per-creator sequence number of an event within an epoch, 1-based.
pub type Seq = u32;

/// Lamport timestamp of an event.
pub type Lamport = u32;

/// Validator identifier.
pub type ValidatorId = u32;

/// Validator voting weight.
pub type Weight = u64;

/// Block number.
pub type BlockNumber = u64;

/// Unix time in nanoseconds.
pub type Timestamp = u64;

/// Frame number of the first frame of every epoch.
pub const FIRST_FRAME: Frame = 1;

/// Nanoseconds in one second.
pub const SECOND: Timestamp = 1_000_000_000;

/// Nanoseconds in one hour.
pub const HOUR: Timestamp = 3600 * SECOND;
