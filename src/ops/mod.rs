//! Ops commands for inspecting a run

pub mod ranks;
pub mod status;
pub mod verify;

pub use ranks::{top_ranks, RanksReport};
pub use status::{collect_status, StatusReport};
pub use verify::{verify_store, IterationMass, VerifyReport};
