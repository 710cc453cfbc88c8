//! Automatic reconnection after abrupt transport loss.
//!
//! Engaged only by the abrupt-failure path, never by explicit disconnect.
//! At most one reconnection task runs per connection instance; it retries
//! with exponential backoff against the original configuration and resumes
//! delivery to the preserved registries on success.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::error::Error;

use super::connection::Connection;
use super::state::ConnectionState;

/// Cap on the doubling exponent so the shift below cannot overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Spawn the reconnection task unless one is already in flight.
pub(crate) fn spawn(connection: Arc<Connection>) {
    if connection.reconnect_in_flight.swap(true, Ordering::SeqCst) {
        debug!(identity = %connection.identity(), "reconnection already in flight");
        return;
    }

    tokio::spawn(async move {
        run(&connection).await;
        connection.reconnect_in_flight.store(false, Ordering::SeqCst);
    });
}

async fn run(connection: &Arc<Connection>) {
    let policy = connection.config().reconnect.clone();
    let mut attempt: u32 = 0;

    loop {
        let delay = backoff_delay(&policy, attempt);
        connection.notify_status(|listener| listener.reconnecting_in(delay));
        info!(
            identity = %connection.identity(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnection"
        );
        tokio::time::sleep(delay).await;

        // The user may have disconnected or reconnected while we slept.
        if connection.reconnect_suspended.load(Ordering::SeqCst) {
            debug!(identity = %connection.identity(), "reconnection cancelled by disconnect");
            return;
        }
        if connection.state() != ConnectionState::Disconnected {
            debug!(identity = %connection.identity(), "reconnection superseded");
            return;
        }

        attempt += 1;
        connection.stats().inc_reconnect_attempt();

        match connection.establish().await {
            Ok(()) => {
                connection.stats().inc_reconnect_success();
                info!(identity = %connection.identity(), attempt, "reconnected");
                connection.notify_status(|listener| listener.reconnection_succeeded());
                return;
            }
            Err(error) if error.is_illegal_state() => {
                // Lost the race against an explicit connect or disconnect.
                debug!(identity = %connection.identity(), "reconnection superseded");
                return;
            }
            Err(error) => {
                warn!(
                    identity = %connection.identity(),
                    attempt,
                    error = %error,
                    "reconnection attempt failed"
                );

                if let Some(max_attempts) = policy.max_attempts {
                    if attempt >= max_attempts {
                        let error = Error::ReconnectionExhausted { attempts: attempt };
                        warn!(identity = %connection.identity(), %error, "giving up");
                        connection.notify_status(|listener| listener.reconnection_failed(&error));
                        return;
                    }
                }
            }
        }
    }
}

/// Exponential backoff: base doubling per attempt, capped at the policy
/// maximum. The exact curve is a tunable, not a correctness contract.
pub(crate) fn backoff_delay(policy: &ReconnectConfig, attempt: u32) -> Duration {
    let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
    let delay_ms = (policy.base_delay.as_millis() as u64).saturating_mul(1u64 << exponent);
    Duration::from_millis(delay_ms.min(policy.max_delay.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: None,
        };

        assert_eq!(backoff_delay(&policy, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(&policy, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(&policy, 4), Duration::from_secs(10));
        assert_eq!(backoff_delay(&policy, 60), Duration::from_secs(10));
    }
}
