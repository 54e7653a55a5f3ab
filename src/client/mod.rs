/// Turn authority and reconciliation of state broadcasts.
pub mod authority;
/// Sans-IO room lifecycle controller.
pub mod controller;
/// Lobby phase state machine.
pub mod phase;
/// Heartbeat bookkeeping.
pub mod presence;
/// Async session driver.
pub mod session;

pub use self::{
    controller::{Effect, RoomController, SessionView},
    phase::LobbyPhase,
    session::RoomSession,
};
