//! Abstraction seams between the core and its collaborators.
//!
//! Core defines the traits; backends implement them. Higher layers inject
//! the implementations, so the engine never names a concrete store or
//! gateway.

mod links;
mod push;
mod store;

pub use links::{BaseUrlLinks, ProfileLinks};
pub use push::PushGateway;
pub use store::CommunityStore;
