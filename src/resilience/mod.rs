pub mod circuit_breaker;
pub mod health;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use health::{AggregatedHealth, HealthState, ServiceHealth};
pub use retry::{
    GiveUpEvent, RetryConfig, RetryContext, RetryEvent, RetryHandler, RetryOptions, RetryStatistics,
};
pub use timeout::TimeoutExt;
