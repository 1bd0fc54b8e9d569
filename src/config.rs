use std::time::Duration;

/// Connection settings shared by every connection a [`WebSocket`](crate::WebSocket)
/// opens.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long to wait for the peer to answer our close frame before the
    /// connection is torn down with [`WsError::CloseTimeout`](crate::WsError::CloseTimeout).
    pub close_timeout: Duration,

    /// Largest payload accepted in a single incoming frame.
    pub max_frame_size: usize,

    /// Largest reassembled incoming message.
    pub max_message_size: usize,

    /// Bytes reserved in the read buffer before each read.
    pub read_buffer_size: usize,

    /// Headers appended to the upgrade request (e.g. `Origin`, auth tokens).
    pub extra_headers: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_secs(5),
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            read_buffer_size: 8 * 1024,
            extra_headers: Vec::new(),
        }
    }
}

impl Config {
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }
}
