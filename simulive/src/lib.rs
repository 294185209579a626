//! Simulated live HLS stream.
//!
//! A closed set of equal-duration fMP4 segments is replayed forever. Wall-clock
//! time is mapped onto a virtual sequence number, a sliding-window playlist is
//! republished once per segment, and every served fragment gets its `tfdt`
//! decode time shifted to match the virtual position it is served at.

pub mod api;
pub mod config;
pub mod context;
pub mod errors;
pub mod fragment;
pub mod manifest;
pub mod pool;
pub mod publisher;
pub mod store;
pub mod timeline;
