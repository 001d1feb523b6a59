//! QoS guard: circuit breaker + timeout around one downstream call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::QosOptions;
use crate::error::{GatewayError, GatewayResult};
use crate::resilience::circuit_breaker::{BreakerSettings, CircuitBreaker};
use crate::resilience::timeouts::{effective_timeout, with_timeout};
use crate::transport::{DownstreamResponse, TransportError};

/// Compiled QoS options for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosPolicy {
    pub timeout: Duration,
    pub breaker: Option<BreakerSettings>,
}

impl QosPolicy {
    pub fn from_options(options: &QosOptions) -> Self {
        let breaker = (options.exceptions_allowed_before_breaking > 0).then(|| BreakerSettings {
            failure_threshold: options.exceptions_allowed_before_breaking,
            break_duration: Duration::from_millis(options.duration_of_break_ms),
            sampling_window: Duration::from_millis(options.sampling_duration_ms),
        });
        Self {
            timeout: effective_timeout(options),
            breaker,
        }
    }
}

/// Run `call` under the route's breaker and timeout.
///
/// Transport failures and timeouts count against the breaker. A downstream
/// response is a success for the breaker whatever its status code.
pub async fn guarded_call<F>(
    route: &str,
    timeout: Duration,
    breaker: Option<&CircuitBreaker>,
    call: F,
) -> GatewayResult<DownstreamResponse>
where
    F: Future<Output = Result<DownstreamResponse, TransportError>>,
{
    let permit = match breaker {
        Some(breaker) => match breaker.try_acquire(Instant::now()) {
            Ok(permit) => Some(permit),
            Err(rejected) => {
                tracing::warn!(route = %route, reason = ?rejected, "Circuit open, failing fast");
                return Err(GatewayError::CircuitOpen {
                    route: route.to_string(),
                });
            }
        },
        None => None,
    };

    match with_timeout(timeout, call).await {
        Some(Ok(response)) => {
            if let Some(permit) = permit {
                permit.record_success();
            }
            Ok(response)
        }
        Some(Err(source)) => {
            tracing::error!(route = %route, error = %source, "Downstream transport failure");
            if let Some(permit) = permit {
                permit.record_failure(Instant::now());
            }
            Err(GatewayError::DownstreamTransport {
                route: route.to_string(),
                source,
            })
        }
        None => {
            tracing::warn!(route = %route, timeout_ms = timeout.as_millis() as u64, "Downstream call timed out");
            if let Some(permit) = permit {
                permit.record_failure(Instant::now());
            }
            Err(GatewayError::DownstreamTimeout {
                route: route.to_string(),
                timeout,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;
    use axum::http::StatusCode;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "r",
            BreakerSettings {
                failure_threshold: 2,
                break_duration: Duration::from_secs(5),
                sampling_window: Duration::from_secs(30),
            },
        )
    }

    #[test]
    fn test_policy_from_options() {
        let default = QosPolicy::from_options(&QosOptions::default());
        assert_eq!(default.timeout, Duration::from_secs(90));
        assert!(default.breaker.is_none());

        let configured = QosPolicy::from_options(&QosOptions {
            exceptions_allowed_before_breaking: 3,
            duration_of_break_ms: 1_000,
            timeout_ms: Some(500),
            sampling_duration_ms: 10_000,
        });
        assert_eq!(configured.timeout, Duration::from_millis(500));
        assert_eq!(configured.breaker.unwrap().failure_threshold, 3);
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_breaker_failure() {
        let cb = breaker();
        for _ in 0..5 {
            let response = guarded_call("r", Duration::from_secs(1), Some(&cb), async {
                Ok(DownstreamResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom"))
            })
            .await
            .unwrap();
            assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_transport_failures_open_circuit() {
        let cb = breaker();
        for _ in 0..2 {
            let err = guarded_call("r", Duration::from_secs(1), Some(&cb), async {
                Err(TransportError::Connect("refused".into()))
            })
            .await
            .unwrap_err();
            assert!(matches!(err, GatewayError::DownstreamTransport { .. }));
        }

        let polled = std::sync::atomic::AtomicBool::new(false);
        let err = guarded_call("r", Duration::from_secs(1), Some(&cb), async {
            polled.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(DownstreamResponse::new(StatusCode::OK, "unreachable"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let cb = breaker();
        for _ in 0..2 {
            let err = guarded_call("r", Duration::from_millis(100), Some(&cb), async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(DownstreamResponse::new(StatusCode::OK, "late"))
            })
            .await
            .unwrap_err();
            assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
