use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod controller;

/// Opaque identifier issued by the agent service on upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[cfg(test)]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> String {
        self.0.chars().take(8).collect()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The client's mirror of the project on the server.
///
/// Only ever replaced in full with a server snapshot; there is no per-file
/// mutation API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct FileSet(BTreeMap<String, String>);

impl FileSet {
    pub fn replace(&mut self, snapshot: FileSet) {
        *self = snapshot;
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(path, content)| (path.as_str(), content.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<P: Into<String>, C: Into<String>> FromIterator<(P, C)> for FileSet {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(path, content)| (path.into(), content.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Settlement state of a turn.
///
/// User turns start `Pending` and settle once the agent answers. Assistant
/// turns are appended already settled: `Failed` marks an error surrogate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Pending,
    Committed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub status: TurnStatus,
}

impl Turn {
    pub fn is_error(&self) -> bool {
        self.role == Role::Assistant && self.status == TurnStatus::Failed
    }
}

/// Append-only chat history for one session.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            content: content.into(),
            status: TurnStatus::Pending,
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.settle_pending(TurnStatus::Committed);
        self.turns.push(Turn {
            role: Role::Assistant,
            content: content.into(),
            status: TurnStatus::Committed,
        });
    }

    pub fn push_error(&mut self, content: impl Into<String>) {
        self.settle_pending(TurnStatus::Failed);
        self.turns.push(Turn {
            role: Role::Assistant,
            content: content.into(),
            status: TurnStatus::Failed,
        });
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        self.turns
            .iter()
            .any(|turn| turn.status == TurnStatus::Pending)
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    // Only the most recent user turn can be pending while sends are serialized.
    fn settle_pending(&mut self, status: TurnStatus) {
        if let Some(turn) = self
            .turns
            .iter_mut()
            .rev()
            .find(|turn| turn.role == Role::User)
        {
            if turn.status == TurnStatus::Pending {
                turn.status = status;
            }
        }
    }
}

/// Diagnostic output of the latest agent turn. Replaced, never accumulated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationLog(String);

impl OperationLog {
    pub fn replace(&mut self, logs: impl Into<String>) {
        self.0 = logs.into();
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

pub fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs().to_string(),
        Err(_) => "0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{FileSet, Role, Transcript, TurnStatus};

    #[test]
    fn file_set_replace_discards_previous_paths() {
        let mut files: FileSet = [("/index.html", "<h1>Hi</h1>"), ("/old.css", "body {}")]
            .into_iter()
            .collect();
        files.replace([("/index.html", "<h1>Hello</h1>")].into_iter().collect());

        assert_eq!(files.len(), 1);
        assert!(!files.contains("/old.css"));
        assert_eq!(files.get("/index.html"), Some("<h1>Hello</h1>"));
    }

    #[test]
    fn file_set_decodes_from_json_object() {
        let files: FileSet =
            serde_json::from_str(r#"{"/b.js": "b", "/a.js": "a"}"#).expect("file map should decode");
        assert_eq!(files.paths().collect::<Vec<_>>(), vec!["/a.js", "/b.js"]);
    }

    #[test]
    fn assistant_reply_commits_pending_user_turn() {
        let mut transcript = Transcript::default();
        transcript.push_user("make heading say Hello");
        assert!(transcript.has_pending());

        transcript.push_assistant("Updated heading text");
        let turns = transcript.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].status, TurnStatus::Committed);
        assert_eq!(turns[1].role, Role::Assistant);
        assert!(!transcript.has_pending());
    }

    #[test]
    fn error_reply_keeps_user_turn_and_marks_both_failed() {
        let mut transcript = Transcript::default();
        transcript.push_user("rename the page");
        transcript.push_error("instruction failed: agent service timed out");

        let turns = transcript.turns();
        assert_eq!(turns[0].content, "rename the page");
        assert_eq!(turns[0].status, TurnStatus::Failed);
        assert!(turns[1].is_error());
    }
}
