//! Outbound messages from the dispatcher to bus integrations.

/// Messages FROM the dispatcher TO integrations (dialogue responses)
#[derive(Debug, Clone, PartialEq)]
pub enum ToBusMessage {
    /// End a dialogue session, optionally speaking a final text.
    EndSession {
        session_id: String,
        text: Option<String>,
    },

    /// Keep a dialogue session open and ask a follow-up question.
    ContinueSession {
        session_id: String,
        text: String,
        intent_filter: Vec<String>,
        custom_data: Option<String>,
        slot: Option<String>,
    },
}
