//! Session State (§4.E): sequence counter, session/user identity, resume
//! eligibility and trace data.

use crate::error::CloseCode;
use pulse_model::Snowflake;

/// Outcome of feeding an inbound sequence number into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// `sequence` was advanced normally.
    Advanced,
    /// A gap was detected; the caller must trigger a resume.
    GapDetected,
}

/// The engine's session identity and bookkeeping.
#[derive(Debug, Default)]
pub struct SessionState {
    pub sequence: u64,
    pub session_id: Option<String>,
    pub user_id: Option<Snowflake>,
    pub trace: Vec<String>,
    pub resuming: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an inbound frame's sequence number, if present (§4.E rule 1).
    ///
    /// A gap (`s_new > sequence + 1`) while not already resuming means
    /// events were lost; the caller is expected to trigger a resume and
    /// must NOT advance `sequence` until RESUMED confirms it.
    pub fn observe_sequence(&mut self, s_new: u64) -> SequenceOutcome {
        if s_new > self.sequence + 1 && !self.resuming {
            SequenceOutcome::GapDetected
        } else {
            self.sequence = s_new;
            SequenceOutcome::Advanced
        }
    }

    /// Apply a READY dispatch (§4.E rule 2). The reconnect budget reset
    /// this rule also requires lives on `GatewayEngine` (§4.F), since the
    /// budget is consulted by `run()`, not by session state.
    pub fn on_ready(&mut self, session_id: String, user_id: Snowflake, trace: Vec<String>) {
        self.session_id = Some(session_id);
        self.user_id = Some(user_id);
        self.resuming = false;
        self.trace = trace;
    }

    /// Apply a RESUMED dispatch (§4.E rule 3). See `on_ready` re: the
    /// reconnect budget reset.
    pub fn on_resumed(&mut self) {
        self.resuming = false;
    }

    /// Begin a resume attempt: marks `resuming` so further gaps aren't
    /// re-triggered while one resume is already in flight.
    pub fn begin_resume(&mut self) {
        self.resuming = true;
    }

    /// Whether the next `connect()` should IDENTIFY rather than RESUME.
    pub fn needs_identify(&self) -> bool {
        self.session_id.is_none()
    }

    /// Apply cleanup rules for a given close code (§4.E rule 4). NORMAL
    /// and GOING_AWAY wipe identity so the next open re-identifies;
    /// everything else preserves state for a resume attempt.
    pub fn cleanup(&mut self, code: CloseCode) {
        if code.clears_session() {
            self.sequence = 0;
            self.session_id = None;
        }
    }

    /// The value to send in a HEARTBEAT frame: `None` until the first
    /// sequenced frame has been observed.
    pub fn heartbeat_sequence(&self) -> Option<u64> {
        if self.sequence == 0 {
            None
        } else {
            Some(self.sequence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_starts_at_zero() {
        let session = SessionState::new();
        assert_eq!(session.sequence, 0);
        assert!(session.heartbeat_sequence().is_none());
    }

    #[test]
    fn sequential_frames_advance_normally() {
        let mut session = SessionState::new();
        assert_eq!(session.observe_sequence(1), SequenceOutcome::Advanced);
        assert_eq!(session.observe_sequence(2), SequenceOutcome::Advanced);
        assert_eq!(session.sequence, 2);
    }

    #[test]
    fn a_gap_is_detected_and_does_not_advance() {
        let mut session = SessionState::new();
        session.observe_sequence(1);
        assert_eq!(session.observe_sequence(5), SequenceOutcome::GapDetected);
        // sequence is unchanged until RESUMED confirms the new stream.
        assert_eq!(session.sequence, 1);
    }

    #[test]
    fn gaps_are_not_re_detected_while_already_resuming() {
        let mut session = SessionState::new();
        session.observe_sequence(1);
        session.begin_resume();
        assert_eq!(session.observe_sequence(5), SequenceOutcome::Advanced);
        assert_eq!(session.sequence, 5);
    }

    #[test]
    fn ready_sets_identity_and_clears_resuming() {
        let mut session = SessionState::new();
        session.resuming = true;
        session.on_ready("sess-1".to_string(), Snowflake::new(42), vec!["trace-a".into()]);
        assert_eq!(session.session_id.as_deref(), Some("sess-1"));
        assert_eq!(session.user_id, Some(Snowflake::new(42)));
        assert!(!session.resuming);
    }

    #[test]
    fn normal_close_wipes_identity() {
        let mut session = SessionState::new();
        session.on_ready("sess-1".to_string(), Snowflake::new(1), vec![]);
        session.observe_sequence(10);
        session.cleanup(CloseCode::Normal);
        assert!(session.session_id.is_none());
        assert_eq!(session.sequence, 0);
        assert!(session.needs_identify());
    }

    #[test]
    fn internal_retry_preserves_identity() {
        let mut session = SessionState::new();
        session.on_ready("sess-1".to_string(), Snowflake::new(1), vec![]);
        session.observe_sequence(10);
        session.cleanup(CloseCode::InternalRetry);
        assert_eq!(session.session_id.as_deref(), Some("sess-1"));
        assert_eq!(session.sequence, 10);
        assert!(!session.needs_identify());
    }
}
