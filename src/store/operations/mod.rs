pub mod session_logs;
pub mod session_timestamps;
