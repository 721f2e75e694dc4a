pub const SESSION_TIMESTAMPS: &str = "session_timestamps";
pub const SESSIONS: &str = "sessions";
