use crate::events::ToolEvent;

/// Formats one event as a server-sent-events frame:
/// `event: <type>\ndata: <json>\n\n`.
pub fn encode(event: &ToolEvent) -> String {
    // serde_json escapes control characters, so the data line never breaks.
    format!("event: {}\ndata: {}\n\n", event.event_type(), event.wire_data())
}
