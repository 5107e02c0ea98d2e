//! Core engine: the poll → classify → accumulate → persist cycle.

pub mod catalog;
pub mod classifier;
pub mod enricher;
pub mod ladder;
pub mod poller;
pub mod sentinel;
