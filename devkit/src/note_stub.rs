/*!
In-memory stand-in for the MQTT-backed note channel

Records every publish so tests can assert on what a client sent, without
starting a broker.
*/

use async_trait::async_trait;
use baton_protocol::{Note, NoteChannel, Topic, TransportError};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct PublishedNote {
    pub topic: Topic,
    pub note: Note,
    pub retain: bool,
}

#[derive(Default)]
pub struct StubChannel {
    published: Mutex<Vec<PublishedNote>>,
    fail_publishes: Mutex<bool>,
}

impl StubChannel {
    pub fn new() -> Self {
        let _ = env_logger::try_init();
        Self::default()
    }

    /// Makes every subsequent publish fail, for exercising the
    /// log-and-swallow paths.
    pub fn fail_publishes(&self, fail: bool) {
        *self.fail_publishes.lock() = fail;
    }

    /// All recorded publishes, in order.
    pub fn published(&self) -> Vec<PublishedNote> {
        self.published.lock().clone()
    }

    /// Notes published on one topic, in order.
    pub fn published_on(&self, topic: Topic) -> Vec<Note> {
        self.published
            .lock()
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.note.clone())
            .collect()
    }

    pub fn last_on(&self, topic: Topic) -> Option<Note> {
        self.published_on(topic).pop()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

#[async_trait]
impl NoteChannel for StubChannel {
    async fn publish(&self, topic: Topic, note: &Note, retain: bool) -> Result<(), TransportError> {
        if *self.fail_publishes.lock() {
            return Err(TransportError::Disconnected("stub set to fail".into()));
        }

        log::info!("[stub] published {} on {}", note.kind.label(), topic);
        self.published.lock().push(PublishedNote {
            topic,
            note: note.clone(),
            retain,
        });
        Ok(())
    }
}
