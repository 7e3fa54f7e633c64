//! readalong - read text aloud with synthesized speech, tracking the
//! spoken word as it plays

pub mod cache;
pub mod config;
pub mod pipeline;
pub mod playback;
pub mod session;
pub mod text;

pub use config::ReadalongConfig;
pub use session::{ReadingSession, ReadingState, ReadingStatus};
