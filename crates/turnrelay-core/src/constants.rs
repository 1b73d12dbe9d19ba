//! Application constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// HTTP configuration
pub mod http {
    use super::*;

    /// Default bind address for the relay server
    pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

    /// Default public URL used when building plan links
    pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8787";

    /// Connection timeout for HTTP requests
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// How long a caller waits before retrying a "session not ready" failure
    pub const NOT_READY_RETRY_DELAY: Duration = Duration::from_millis(1500);

    /// Keep-alive interval for SSE responses
    pub const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);
}

/// Agent process configuration
pub mod agent {
    /// Default agent executable
    pub const DEFAULT_COMMAND: &str = "plan-agent";

    /// Flag appended (with the session id) when continuing a session
    pub const RESUME_FLAG: &str = "--resume";

    /// Flag repeated once per attached image path
    pub const IMAGE_FLAG: &str = "--image";

    /// Turns run for at most this long (agents can think for several minutes)
    pub const TURN_TIMEOUT_SECS: u64 = 600;

    /// Buffered events between the agent reader and the turn task
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;

    /// Lines of stderr kept for process failure messages
    pub const STDERR_TAIL_LINES: usize = 20;
}

/// Plan naming
pub mod plan {
    /// Prompts longer than this are truncated for plan names
    pub const NAME_MAX_CHARS: usize = 50;

    /// Appended to truncated plan names
    pub const NAME_ELLIPSIS: &str = "...";
}

/// Chat aggregation
pub mod aggregator {
    /// Fragments accumulated before a non-boundary flush
    pub const FLUSH_FRAGMENT_THRESHOLD: usize = 5;

    /// Maximum characters shown in a chat message
    pub const DISPLAY_CAP: usize = 500;

    /// A newline cut must keep at least this share of the cap
    pub const NEWLINE_RETAIN_RATIO: f64 = 0.6;

    /// Appended to truncated in-progress projections
    pub const STILL_PROCESSING_MARKER: &str = "\n\n_…still processing_";

    /// Appended to truncated final projections before the link
    pub const TRUNCATED_MARKER: &str = "…";

    /// Label of the link to the full plan output
    pub const FULL_OUTPUT_LABEL: &str = "View full output";

    /// Events buffered between a turn's producer and its aggregator task
    pub const CHANNEL_CAPACITY: usize = 128;
}

/// Chat API defaults
pub mod chat {
    /// Slack-compatible Web API base URL
    pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

    /// Environment variable holding the chat token
    pub const DEFAULT_TOKEN_ENV: &str = "TURNRELAY_CHAT_TOKEN";
}

/// Filesystem layout
pub mod paths {
    /// Data directory name under the home directory
    pub const DATA_DIR_NAME: &str = ".turnrelay";

    /// Config file name inside the data directory
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// SQLite database file name inside the data directory
    pub const DATABASE_FILE_NAME: &str = "turnrelay.db";

    /// Log file name used by the interactive client
    pub const LOG_FILE_NAME: &str = "turnrelay.log";
}
