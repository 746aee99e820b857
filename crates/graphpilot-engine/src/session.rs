use chrono::{DateTime, Duration, Utc};

use graphpilot_core::types::Credential;

/// The single live session held by an `EngineClient`.
#[derive(Debug, Clone)]
pub struct EngineSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub acquired_at: DateTime<Utc>,
    /// Engine most recently acquired through this session.
    pub engine_id: Option<String>,
    pub engine_url: Option<String>,
}

impl EngineSession {
    pub fn from_credential(credential: Credential) -> Self {
        Self {
            token: credential.token,
            expires_at: credential.expires_at,
            acquired_at: Utc::now(),
            engine_id: None,
            engine_url: None,
        }
    }

    /// Usable at `now`: not within `margin_secs` of expiry and younger than `max_age_secs`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin_secs: u64, max_age_secs: u64) -> bool {
        let margin = Duration::seconds(margin_secs as i64);
        let max_age = Duration::seconds(max_age_secs as i64);
        now + margin < self.expires_at && now - self.acquired_at < max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_in_secs: i64) -> EngineSession {
        EngineSession::from_credential(Credential {
            token: "tok".into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        })
    }

    #[test]
    fn test_fresh_session() {
        let s = session(3600);
        assert!(s.is_fresh(Utc::now(), 60, 7200));
    }

    #[test]
    fn test_session_inside_refresh_margin_is_stale() {
        let s = session(30);
        assert!(!s.is_fresh(Utc::now(), 60, 7200));
    }

    #[test]
    fn test_session_past_max_age_is_stale() {
        let mut s = session(36_000);
        s.acquired_at = Utc::now() - Duration::seconds(4000);
        assert!(!s.is_fresh(Utc::now(), 60, 3600));
    }
}
