use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("circuit breaker open")]
    CircuitOpen,
    #[error("connection pool exhausted")]
    PoolExhausted,
    #[error("timed out waiting for a pooled connection")]
    AcquireTimeout,
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
