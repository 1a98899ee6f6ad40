//! Baton protocol - the wire contract between the controller and its peers
//!
//! Everything the coordinator and the workers exchange is a [`Note`]: a
//! request, a response or an asynchronous notification, serialized as JSON
//! and published on one of three shared topics (see [`Topic`]). There are no
//! per-peer topics: every peer observes every broadcast and self-filters,
//! and the coordinator tolerates echoes of its own requests.

mod channel;
mod clock;
mod error;
mod note;
mod topics;

pub use channel::NoteChannel;
pub use clock::{elapsed_millis, epoch_micros, now_micros};
pub use error::{ProtocolError, TransportError};
pub use note::{
    decode, encode, GetOption, LogLocation, Note, NoteKind, PeerId, PeerStats, Role, SetOption,
    TestDuration,
};
pub use topics::Topic;
