//! The workstation state transition table (spec §4.F) lives in
//! `stationd-core` so the scheduler's synchronous admission check (spec
//! §4.E) can consult it without depending on this crate. Re-exported here
//! under its original name since this is where the executor looks it up.

pub use stationd_core::transitions::legal_transition;
