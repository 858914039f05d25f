//! # harvestr-core
//!
//! The scan → rank → harvest → store loop and the pieces it is made of.
//!
//! The [`pipeline`] owns the [`registry`], the [`scheduler`] and the [`store`] on one
//! coordinating task. A scanner task and at most one harvest task talk to it over
//! channels, and both reach the radio only through leases handed out by the
//! [`interface`] manager.

pub mod harvester;
pub mod interface;
pub mod pipeline;
pub mod radio;
pub mod registry;
pub mod scanner;
pub mod scheduler;
pub mod store;
pub mod system;
