//! Observable reading state.

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadingStatus {
    /// Nothing playing
    #[default]
    Idle,
    /// Synthesizer starting up
    Preparing,
    /// Waiting for the next chunk to be synthesized
    Loading,
    /// Audio playing
    Reading,
    /// Reached the end of the text; `restart` goes back to the top
    Restartable,
}

impl ReadingStatus {
    /// True while a play task is running.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Loading | Self::Reading)
    }
}

/// Snapshot published to whoever renders the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadingState {
    pub status: ReadingStatus,
    /// Word currently spoken (or where reading will resume)
    pub current_word_index: usize,
    /// Set when reading stopped because of a failure
    pub error_message: Option<String>,
}
