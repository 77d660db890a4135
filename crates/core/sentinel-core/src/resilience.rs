//! Resilience patterns: retry with backoff, health checks

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Execute a fallible async operation with bounded exponential backoff
///
/// The last error is returned unwrapped so callers can still branch on its
/// kind after exhaustion.
pub async fn retry_with_backoff<F, T, E>(
    config: &RetryConfig,
    mut f: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send>,
    >,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries {
                    error!("All {} retry attempts failed: {}", config.max_retries, e);
                    return Err(e);
                }

                warn!("Attempt {} failed: {}. Retrying in {:?}", attempt, e, delay);
                tokio::time::sleep(delay).await;

                delay = Duration::from_millis(
                    ((delay.as_millis() as f64) * config.multiplier)
                        .min(config.max_delay.as_millis() as f64) as u64,
                );
            }
        }
    }
}

/// Health check result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Component is healthy
    Healthy,
    /// Component is slow but operational
    Degraded,
    /// Component is unreachable or failing
    Unhealthy,
}

impl HealthStatus {
    /// Stable label for reporting
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Health check information
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Component name
    pub name: String,
    /// Health status
    pub status: HealthStatus,
    /// Last check timestamp
    pub last_check: Instant,
    /// Response time in milliseconds
    pub response_time_ms: u64,
}

/// Health checker for the content source and stores
pub struct HealthChecker {
    checks: Arc<RwLock<HashMap<String, HealthCheck>>>,
    degraded_threshold_ms: u64,
}

impl HealthChecker {
    /// Create a new health checker with the default degradation threshold
    pub fn new() -> Self {
        Self {
            checks: Arc::new(RwLock::new(HashMap::new())),
            degraded_threshold_ms: 1000,
        }
    }

    /// Run a probe and record its outcome under `name`
    pub async fn check<F, T, E>(&self, name: &str, f: F) -> HealthStatus
    where
        F: std::future::Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let start = Instant::now();

        let status = match f.await {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => {
                error!("Health check failed for {}: {}", name, e);
                HealthStatus::Unhealthy
            }
        };

        let response_time_ms = start.elapsed().as_millis() as u64;
        let final_status =
            if status == HealthStatus::Healthy && response_time_ms > self.degraded_threshold_ms {
                HealthStatus::Degraded
            } else {
                status
            };

        let check = HealthCheck {
            name: name.to_string(),
            status: final_status,
            last_check: Instant::now(),
            response_time_ms,
        };
        self.checks.write().unwrap().insert(name.to_string(), check);

        final_status
    }

    /// Get overall health status
    pub fn overall_health(&self) -> HealthStatus {
        let checks = self.checks.read().unwrap();

        if checks.is_empty() {
            return HealthStatus::Healthy;
        }

        checks
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Get all recorded checks
    pub fn get_all_checks(&self) -> Vec<HealthCheck> {
        self.checks.read().unwrap().values().cloned().collect()
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retry_success() {
        let config = RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        };

        let mut attempts = 0;
        let result = retry_with_backoff(&config, || {
            attempts += 1;
            Box::pin(async move {
                if attempts < 2 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            })
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_exhaustion() {
        let config = RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        };

        let result =
            retry_with_backoff(&config, || Box::pin(async { Err::<(), _>("always fails") }))
                .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_health_checker() {
        let checker = HealthChecker::new();

        let status = checker
            .check("content_source", async { Ok::<_, String>(()) })
            .await;
        assert_eq!(status, HealthStatus::Healthy);

        let status = checker
            .check("event_store", async { Err::<(), _>("db down") })
            .await;
        assert_eq!(status, HealthStatus::Unhealthy);

        assert_eq!(checker.overall_health(), HealthStatus::Unhealthy);
        assert_eq!(checker.get_all_checks().len(), 2);
    }
}
