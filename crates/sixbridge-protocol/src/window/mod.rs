//! Sliding-window flow control: sequencing, acknowledgement, reordering.
//!
//! [`SlidingWindow`] holds the send and receive windows of one serial link.
//! The caller serializes access to it and drives timers; see the router crate
//! for the runtime that does so.

pub mod constants;
pub mod state;

pub use constants::*;
pub use state::{Accepted, Assigned, SlidingWindow};
