/*!
Test harness for Baton components without a broker

Provides:
- StubChannel: records every published note for assertions
- ScenarioBus + ScriptedPeer: a scripted fleet answering coordinator
  broadcasts, feeding replies straight into the coordinator's buffer
*/

pub mod note_stub;
pub mod scenario;

pub use note_stub::{PublishedNote, StubChannel};
pub use scenario::{new_buffer, NoteBuffer, RoundOutcome, ScenarioBus, ScriptedPeer};
