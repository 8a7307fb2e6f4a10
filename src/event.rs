use crate::agent::client::{CreatedSession, InstructionReply};
use crate::error::ApiError;
use crate::session::SessionId;
use std::path::PathBuf;

/// Results of background agent calls, delivered to the UI thread.
///
/// Each variant carries the identity it was issued for so that late results
/// can be matched against the session that is active when they arrive.
#[derive(Debug, Clone)]
pub enum AppEvent {
    SessionCreated {
        ticket: u64,
        result: Result<CreatedSession, ApiError>,
    },
    InstructionApplied {
        session_id: SessionId,
        result: Result<InstructionReply, ApiError>,
    },
    ArchiveSaved {
        session_id: SessionId,
        result: Result<PathBuf, String>,
    },
    SessionDeleted {
        session_id: SessionId,
        result: Result<(), ApiError>,
    },
}
