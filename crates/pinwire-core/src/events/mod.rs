//! Event dispatch: what handlers see, how they are registered, and how they
//! send messages back.

pub mod dispatcher;
pub mod event;
pub mod outbox;

pub use dispatcher::{BoxError, EmitOutcome, EventDispatcher, HandlerError, HandlerResult};
pub use event::{
    internal_key, virtual_read_key, virtual_write_key, Event, ANY_VIRTUAL_READ,
    ANY_VIRTUAL_WRITE, CONNECTED, DISCONNECTED,
};
pub use outbox::{Outbox, Request};
