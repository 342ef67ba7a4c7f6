// Fundamental types of the simulation
// Principle: Small value types, no behaviour beyond bookkeeping

pub mod primitives;
pub mod vote;
pub mod team;
pub mod record;

pub use primitives::*;
pub use vote::*;
pub use team::*;
pub use record::*;
