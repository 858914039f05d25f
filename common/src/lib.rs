//! # harvestr-common
//!
//! Types shared by every crate in the workspace: the domain models (access points,
//! sightings, captured WPS material, interface state), the error taxonomy and the
//! configuration surface.

pub mod config;
pub mod error;
pub mod models;
pub mod network;

/// Logs a positive milestone (a capture, a finished scan) with the success marker.
///
/// The terminal formatter renders events under the `harvestr::success` target
/// with their own symbol, everything else goes through the regular level mapping.
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        ::tracing::info!(target: "harvestr::success", $($arg)*)
    };
}
