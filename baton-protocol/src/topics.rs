/// Topic namespace shared by every Baton process.
pub const NAMESPACE: &str = "baton";

/// The fixed set of shared topics.
///
/// Topic resolution is deliberately not parameterized by peer identity:
/// all peers subscribe to the same control topic and filter broadcasts
/// themselves. Notifications get their own topic so they can be published
/// retained, and log transfers get a separate topic that can be throttled
/// without delaying control traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Requests and their correlated responses.
    Control,
    /// Asynchronous test notifications (retained, at-least-once).
    Notification,
    /// Bulk log transfer.
    Logs,
}

impl Topic {
    pub fn path(&self) -> &'static str {
        match self {
            Topic::Control => "baton/control",
            Topic::Notification => "baton/notification",
            Topic::Logs => "baton/logs",
        }
    }

    pub fn from_path(path: &str) -> Option<Topic> {
        match path {
            "baton/control" => Some(Topic::Control),
            "baton/notification" => Some(Topic::Notification),
            "baton/logs" => Some(Topic::Logs),
            _ => None,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}
