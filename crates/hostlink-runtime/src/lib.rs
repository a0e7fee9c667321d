//! hostlink runtime
//!
//! Drives a connection lifecycle through "next state" values produced by
//! background operations:
//!
//! - [`StateMachine`]: one current state, applied on the designated execution
//!   context, with cancellable background waits tracked as jobs
//! - [`ConnectionStatus`] and [`LifecycleReceiver`]: the lifecycle states and
//!   the receiver they apply themselves to
//! - [`ConnectionController`]: the remote work behind each transition
//! - [`Session`]: the receiver that runs the whole lifecycle for one host

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod controller;
pub mod lifecycle;
pub mod machine;
pub mod pending;
pub mod session;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use controller::{ChangeCallback, ConnectionController};
pub use lifecycle::{ConnectionStatus, LifecycleReceiver, PlayerSnapshot, TransportHandle};
pub use machine::{State, StateMachine};
pub use pending::Pending;
pub use session::{Session, SessionObserver};
