//! Out-of-band notifications from the response dispatcher.
//!
//! Servers volunteer information that belongs to no particular command:
//! `[ALERT]` texts that must reach the user, `* BYE` farewells, and
//! extension lines the engine does not model. The engine forwards them
//! through an [`EngineEvents`] sink instead of dropping them on the
//! floor.

/// Receiver for session-level notifications.
///
/// All methods default to doing nothing, so implementors pick the
/// events they care about.
pub trait EngineEvents: Send {
    /// An `[ALERT]` response code; its text must be shown to the user.
    fn alert(&mut self, _text: &str) {}

    /// The server announced it is closing the connection.
    fn bye(&mut self, _text: &str) {}

    /// An untagged line with this keyword was skipped.
    fn ignored(&mut self, _keyword: &str) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl EngineEvents for NoopEvents {}

/// Buffers events in memory; useful in tests and simple frontends that
/// poll for alerts after each round.
#[derive(Debug, Default)]
pub struct CollectedEvents {
    /// Alert texts, oldest first.
    pub alerts: Vec<String>,
    /// BYE texts.
    pub byes: Vec<String>,
    /// Keywords of skipped untagged lines.
    pub ignored: Vec<String>,
}

impl EngineEvents for CollectedEvents {
    fn alert(&mut self, text: &str) {
        self.alerts.push(text.to_string());
    }

    fn bye(&mut self, text: &str) {
        self.byes.push(text.to_string());
    }

    fn ignored(&mut self, keyword: &str) {
        self.ignored.push(keyword.to_string());
    }
}

/// Shared sink: the engine holds one clone, the frontend keeps the
/// other and drains it between rounds.
impl EngineEvents for std::sync::Arc<std::sync::Mutex<CollectedEvents>> {
    fn alert(&mut self, text: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.alert(text);
        }
    }

    fn bye(&mut self, text: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.bye(text);
        }
    }

    fn ignored(&mut self, keyword: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.ignored(keyword);
        }
    }
}
