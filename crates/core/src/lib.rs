//! Shared domain types for the SolarCare customer client.
//!
//! - [`session`] -- the authentication slice: session entity, actions, reducer.
//! - [`state`] -- the root state container with `dispatch` and change
//!   subscription.
//! - [`clock`] -- wall-clock abstraction used for session age and cache TTLs.

pub mod clock;
pub mod error;
pub mod session;
pub mod state;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use session::{AuthAction, AuthState, ProfilePatch, Session, UserProfile};
pub use state::{Action, AppState, Store, UiAction, UiState};
