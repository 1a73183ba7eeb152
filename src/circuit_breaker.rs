use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Circuit breaker type tracking webhook delivery health.
pub type WebhookCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates a circuit breaker for webhook deliveries.
///
/// The notifier reports each delivery outcome to it and still posts every
/// event while it is open; an open breaker only marks the endpoint as failing
/// in the logs.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, requests pass through.
/// - **OPEN**: Too many failures, the endpoint is reported as failing.
/// - **HALF_OPEN**: Testing if the endpoint recovered.
///
/// # Returns
///
/// * `WebhookCircuitBreaker` - The configured circuit breaker instance.
pub fn create_webhook_circuit_breaker() -> WebhookCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
