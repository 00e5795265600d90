//! Pipeline module — the single-session state machine.
//!
//! One [`Pipeline`] is one session: created by the daemon on toggle-from-
//! idle, bound to the configuration snapshot captured at creation, and
//! destroyed when the session returns to [`Status::Idle`].

pub mod runner;
pub mod state;

pub use runner::Pipeline;
pub use state::{Action, SessionError, Status};
