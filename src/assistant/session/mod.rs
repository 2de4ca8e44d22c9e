//! Session state: per-session history, the live-session registry and its
//! idle sweeper.

pub mod registry;
pub mod store;
pub mod sweeper;

pub use registry::{SessionHandle, SessionRegistry};
pub use store::SessionStore;
pub use sweeper::IdleSweeper;
