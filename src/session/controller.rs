//! Session state machine for the project editor.
//!
//! The controller never performs I/O. Operations that need the agent service
//! return a [`Command`]; the caller runs it and feeds the resulting
//! [`AppEvent`] back through [`SessionController::apply`].

use crate::agent::client::{AgentClient, CreatedSession, InstructionReply};
use crate::archive::Archive;
use crate::error::ApiError;
use crate::event::AppEvent;
use crate::session::{FileSet, OperationLog, SessionId, Transcript};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploading,
    Ready,
    Sending,
    Closed,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Ready => "ready",
            Self::Sending => "sending",
            Self::Closed => "closed",
        }
    }

    pub fn has_session(self) -> bool {
        matches!(self, Self::Ready | Self::Sending)
    }
}

/// Work the controller asks its caller to perform against the agent service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateSession { ticket: u64, archive: Archive },
    SendInstruction { session_id: SessionId, prompt: String },
    DeleteSession { session_id: SessionId },
    SaveArchive { session_id: SessionId, destination: PathBuf },
}

/// Why an operation was refused. A refused operation changes no state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("select a project archive first")]
    NoArchive,

    #[error("{0}")]
    InvalidArchive(String),

    #[error("an upload is already running")]
    UploadInProgress,

    #[error("exit the current session first")]
    SessionActive,

    #[error("instruction is empty")]
    EmptyPrompt,

    #[error("waiting for the previous instruction to finish")]
    AlreadySending,

    #[error("no active session")]
    NoSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient, user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingUpload {
    ticket: u64,
    initial_instruction: Option<String>,
}

pub struct SessionController {
    phase: Phase,
    next_ticket: u64,
    pending_upload: Option<PendingUpload>,
    session_id: Option<SessionId>,
    files: FileSet,
    transcript: Transcript,
    log: OperationLog,
    notice: Option<Notice>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            next_ticket: 1,
            pending_upload: None,
            session_id: None,
            files: FileSet::default(),
            transcript: Transcript::default(),
            log: OperationLog::default(),
            notice: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn is_sending(&self) -> bool {
        self.phase == Phase::Sending
    }

    /// Runs the client-side archive check, then starts the upload.
    ///
    /// A rejected path produces no command and leaves the phase untouched.
    pub fn begin_upload_from_path(
        &mut self,
        path: &Path,
        initial_instruction: &str,
    ) -> Result<Command, Rejection> {
        if path.as_os_str().is_empty() {
            return Err(Rejection::NoArchive);
        }
        self.ensure_can_upload()?;

        match Archive::load(path) {
            Ok(archive) => self.begin_upload(archive, initial_instruction),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "archive rejected before upload");
                self.notice = Some(Notice::error(err.to_string()));
                Err(Rejection::InvalidArchive(err.to_string()))
            }
        }
    }

    pub fn begin_upload(
        &mut self,
        archive: Archive,
        initial_instruction: &str,
    ) -> Result<Command, Rejection> {
        self.ensure_can_upload()?;
        if archive.bytes.is_empty() {
            return Err(Rejection::NoArchive);
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let initial_instruction = Some(initial_instruction.trim().to_string())
            .filter(|instruction| !instruction.is_empty());
        self.pending_upload = Some(PendingUpload {
            ticket,
            initial_instruction,
        });
        self.discard_session();
        self.notice = None;
        self.transition(Phase::Uploading);

        Ok(Command::CreateSession { ticket, archive })
    }

    fn ensure_can_upload(&self) -> Result<(), Rejection> {
        match self.phase {
            Phase::Idle | Phase::Closed => Ok(()),
            Phase::Uploading => Err(Rejection::UploadInProgress),
            Phase::Ready | Phase::Sending => Err(Rejection::SessionActive),
        }
    }

    /// Appends the user's turn immediately and asks for the agent call.
    pub fn send_message(&mut self, prompt: &str) -> Result<Command, Rejection> {
        let prompt = prompt.trim();
        match self.phase {
            Phase::Ready => {}
            Phase::Sending => return Err(Rejection::AlreadySending),
            Phase::Idle | Phase::Uploading | Phase::Closed => return Err(Rejection::NoSession),
        }
        if prompt.is_empty() {
            return Err(Rejection::EmptyPrompt);
        }
        let Some(session_id) = self.session_id.clone() else {
            return Err(Rejection::NoSession);
        };

        Ok(self.start_sending(session_id, prompt.to_string()))
    }

    fn start_sending(&mut self, session_id: SessionId, prompt: String) -> Command {
        self.transcript.push_user(prompt.clone());
        self.transition(Phase::Sending);
        Command::SendInstruction { session_id, prompt }
    }

    pub fn download_url(&self, client: &AgentClient) -> Result<String, Rejection> {
        let session_id = self.ready_session()?;
        Ok(client.download_url(session_id))
    }

    pub fn save_archive(&mut self, destination: PathBuf) -> Result<Command, Rejection> {
        let session_id = self.ready_session()?.clone();
        Ok(Command::SaveArchive {
            session_id,
            destination,
        })
    }

    fn ready_session(&self) -> Result<&SessionId, Rejection> {
        match (self.phase, self.session_id.as_ref()) {
            (Phase::Ready, Some(session_id)) => Ok(session_id),
            (Phase::Sending, Some(_)) => Err(Rejection::AlreadySending),
            _ => Err(Rejection::NoSession),
        }
    }

    /// Drops all client-side session state. The returned command asks the
    /// service to release the session; ignoring its outcome is fine.
    pub fn exit(&mut self) -> Option<Command> {
        match self.phase {
            Phase::Idle | Phase::Closed => return None,
            Phase::Uploading | Phase::Ready | Phase::Sending => {}
        }

        let session_id = self.session_id.take();
        self.pending_upload = None;
        self.discard_session();
        self.transition(Phase::Closed);

        session_id.map(|session_id| Command::DeleteSession { session_id })
    }

    pub fn apply(&mut self, event: AppEvent) -> Option<Command> {
        match event {
            AppEvent::SessionCreated { ticket, result } => self.on_session_created(ticket, result),
            AppEvent::InstructionApplied { session_id, result } => {
                self.on_instruction_applied(session_id, result);
                None
            }
            AppEvent::ArchiveSaved { session_id, result } => {
                if self.session_id.as_ref() == Some(&session_id) {
                    self.notice = Some(match result {
                        Ok(path) => Notice::info(format!("Saved archive to {}", path.display())),
                        Err(err) => Notice::error(format!("Could not save archive: {err}")),
                    });
                }
                None
            }
            AppEvent::SessionDeleted { session_id, result } => {
                if let Err(err) = result {
                    tracing::debug!(session_id = %session_id, error = %err, "session cleanup failed");
                }
                None
            }
        }
    }

    fn on_session_created(
        &mut self,
        ticket: u64,
        result: Result<CreatedSession, ApiError>,
    ) -> Option<Command> {
        let is_current = self.phase == Phase::Uploading
            && self
                .pending_upload
                .as_ref()
                .is_some_and(|pending| pending.ticket == ticket);

        if !is_current {
            tracing::debug!(ticket, "ignoring stale upload result");
            return result.ok().map(|created| Command::DeleteSession {
                session_id: created.session_id,
            });
        }

        let pending = self.pending_upload.take();
        match result {
            Ok(created) => {
                self.files.replace(created.files);
                self.session_id = Some(created.session_id.clone());
                self.transition(Phase::Ready);

                let instruction = pending.and_then(|pending| pending.initial_instruction);
                instruction.map(|prompt| self.start_sending(created.session_id, prompt))
            }
            Err(err) => {
                tracing::warn!(error = %err, "upload failed");
                self.notice = Some(Notice::error(err.to_string()));
                self.transition(Phase::Idle);
                None
            }
        }
    }

    fn on_instruction_applied(
        &mut self,
        session_id: SessionId,
        result: Result<InstructionReply, ApiError>,
    ) {
        if self.phase != Phase::Sending || self.session_id.as_ref() != Some(&session_id) {
            tracing::debug!(session_id = %session_id, "ignoring reply for inactive session");
            return;
        }

        match result {
            Ok(reply) => {
                self.files.replace(reply.files);
                self.log.replace(reply.logs);
                let explanation = if reply.explanation.trim().is_empty() {
                    "Done.".to_string()
                } else {
                    reply.explanation
                };
                self.transcript.push_assistant(explanation);
            }
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "instruction failed");
                self.transcript.push_error(format!(
                    "{err}. Your project was left unchanged; try again or rephrase."
                ));
            }
        }
        self.transition(Phase::Ready);
    }

    fn discard_session(&mut self) {
        self.session_id = None;
        self.files.clear();
        self.transcript.clear();
        self.log.clear();
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            tracing::info!(from = self.phase.label(), to = next.label(), "session phase changed");
        }
        self.phase = next;
    }
}
