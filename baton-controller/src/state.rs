use baton_protocol::Note;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

/// Inbound reply/notification buffer: the listener task appends, the
/// coordinator's collect drains.
pub type NoteBuffer = Shared<VecDeque<Note>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
