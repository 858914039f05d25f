//! End-to-end scenarios for the harvest pipeline.
//!
//! [`sim`] stands in for the radio: a set of simulated access points that show up in
//! scans and answer registrations with real M1/M3 messages.

pub mod sim;

mod pipeline;
