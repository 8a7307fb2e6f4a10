pub mod client;

use crate::event::AppEvent;
use crate::session::controller::Command;
use crate::session::SessionId;
use client::AgentClient;
use eframe::egui;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, OnceLock};
use tokio::runtime::Handle;

/// Runs controller commands on the tokio runtime and reports back over `tx`.
#[derive(Clone)]
pub struct AgentBridge {
    client: Arc<AgentClient>,
    tx: mpsc::Sender<AppEvent>,
    runtime_handle: Handle,
    repaint: Arc<OnceLock<egui::Context>>,
}

impl AgentBridge {
    pub fn new(client: AgentClient, tx: mpsc::Sender<AppEvent>) -> Result<Self, String> {
        let runtime_handle =
            Handle::try_current().map_err(|err| format!("tokio runtime unavailable: {err}"))?;

        Ok(Self {
            client: Arc::new(client),
            tx,
            runtime_handle,
            repaint: Arc::new(OnceLock::new()),
        })
    }

    pub fn client(&self) -> &AgentClient {
        &self.client
    }

    /// Lets background tasks wake the UI when their result lands.
    pub fn attach_context(&self, ctx: &egui::Context) {
        let _ = self.repaint.set(ctx.clone());
    }

    pub fn dispatch(&self, command: Command) {
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        let repaint = Arc::clone(&self.repaint);

        self.runtime_handle.spawn(async move {
            let event = match command {
                Command::CreateSession { ticket, archive } => AppEvent::SessionCreated {
                    ticket,
                    result: client.create_session(&archive).await,
                },
                Command::SendInstruction { session_id, prompt } => {
                    let result = client.send_instruction(&session_id, &prompt).await;
                    AppEvent::InstructionApplied { session_id, result }
                }
                Command::DeleteSession { session_id } => {
                    let result = client.delete_session(&session_id).await;
                    AppEvent::SessionDeleted { session_id, result }
                }
                Command::SaveArchive {
                    session_id,
                    destination,
                } => {
                    let result = save_archive(&client, &session_id, destination).await;
                    AppEvent::ArchiveSaved { session_id, result }
                }
            };

            if tx.send(event).is_err() {
                tracing::debug!("ui closed before agent result arrived");
                return;
            }
            if let Some(ctx) = repaint.get() {
                ctx.request_repaint();
            }
        });
    }
}

async fn save_archive(
    client: &AgentClient,
    session_id: &SessionId,
    destination: PathBuf,
) -> Result<PathBuf, String> {
    let bytes = client
        .download_archive(session_id)
        .await
        .map_err(|err| err.to_string())?;
    tokio::fs::write(&destination, bytes)
        .await
        .map_err(|err| format!("failed to write {}: {err}", destination.display()))?;
    tracing::info!(session_id = %session_id, path = %destination.display(), "archive saved");
    Ok(destination)
}
