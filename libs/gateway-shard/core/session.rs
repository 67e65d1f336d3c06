//! Session continuity state
//!
//! The minimal facts needed to resume: last sequence, session id and the
//! resume URL. Owned and mutated by the shard worker only.

use crate::protocol::{Ready, Resume};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    sequence: Option<u64>,
    session_id: Option<String>,
    resume_url: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence number seen on this session
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    /// Record a dispatch sequence number; never moves backwards
    pub fn observe_sequence(&mut self, sequence: u64) {
        self.sequence = Some(self.sequence.map_or(sequence, |current| current.max(sequence)));
    }

    /// Store the identity handed out by READY
    pub fn on_ready(&mut self, ready: &Ready) {
        self.session_id = Some(ready.session_id.clone());
        self.resume_url = ready.resume_gateway_url.clone();
    }

    /// A previous session exists that a resume could re-attach to
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }

    /// Forget everything; the next connection will identify
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Build the resume payload, if there is anything to resume
    pub fn resume_payload(&self, token: &str) -> Option<Resume> {
        let session_id = self.session_id.as_ref()?;
        Some(Resume {
            token: token.to_string(),
            session_id: session_id.clone(),
            seq: self.sequence.unwrap_or(0),
        })
    }
}
