//! Session engine.
//!
//! ```text
//!   Session (handle) ──Command──► SessionActor ──bytes──► Transport
//!                                   │  ▲   ▲
//!        correlator ◄── Response/Ack┘  │   └── TimerKey (pending deadlines)
//!        dispatcher ◄── Request/Ping───┘
//! ```

mod actor;
pub mod correlator;
pub mod dispatcher;
mod handle;
pub mod pending;
pub mod state;

pub use actor::SessionStatus;
pub use correlator::Correlation;
pub use dispatcher::{
    HandlerOutcome, InboundRequest, RejectingHandler, RequestHandler, UnsupportedRequest,
};
pub use handle::{Credentials, Session, SessionBuilder};
pub use pending::{AckState, CallResult, PendingOperation, PendingTable, TimerKey};
pub use state::{Lifecycle, SessionState};
