/// Server-level configuration for the call pipeline.
///
/// Controls call timeouts, concurrency limits, and the maximum accepted stub size.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Default timeout for calls in milliseconds.
    pub default_call_timeout_ms: u64,
    /// Maximum number of in-flight calls per connection before load shedding.
    pub max_concurrent_calls: u32,
    /// Largest request stub accepted, in bytes.
    pub max_stub_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_call_timeout_ms: 30_000,
            max_concurrent_calls: 1000,
            max_stub_size: 4 * 1024 * 1024,
        }
    }
}
