//! Anonymity network integration.
//!
//! The session talks to the network only through the traits in [`network`];
//! [`CTorNetwork`] implements them on top of the reference C-Tor binary,
//! driven over its control port.

mod control;
mod ctor;
mod network;

pub use ctor::{CTorClient, CTorHiddenService, CTorNetwork};
pub use network::{
    AnonymityNetwork, HiddenService, NetworkClient, PublishOptions, PublishedService,
};
