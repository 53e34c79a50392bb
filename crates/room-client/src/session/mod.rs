//! Room session: lifecycle state machine, local producers, remote consumers.
//!
//! A session is a [`SessionActor`] task driven through a [`SessionHandle`].
//!
//! ```text
//! Idle -> Joining -> Negotiating -> Open -> Exiting -> Closed
//!   \________\____________\__________\______________/
//!              (abort, join failure, disconnect)
//! ```

mod actor;
mod consumers;
mod context;
mod events;
mod messages;
mod producers;
mod state;

pub use actor::{SessionActor, SessionHandle};
pub use context::SessionContext;
pub use events::{Listener, SessionEvent, SessionEventKind};
pub use messages::{ParticipantSummary, ProduceOutcome, SessionSnapshot};
pub use producers::ProducerState;
pub use state::SessionState;
