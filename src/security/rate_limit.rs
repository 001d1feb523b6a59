//! Per-route, per-client fixed-window rate limiting.
//!
//! # Algorithm
//! ```text
//! first request from client  → window starts, count = 1
//! count < limit              → admit, count += 1
//! count == limit             → reject until the window expires
//! elapsed > period           → window restarts at this request
//! ```
//!
//! # Design Decisions
//! - Windows are anchored to the client's first request, not the wall clock
//! - One `DashMap` per route; no lock shared with other routes
//! - Rejections never increment the counter

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::RateLimitOptions;
use crate::error::RateLimitRejection;
use crate::http::request::InboundRequest;
use crate::resilience::deadline;

/// Client id used when neither the header, a default, nor a remote address is known.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("period is empty")]
    Empty,

    #[error("invalid period '{0}', expected e.g. 500ms, 1s, 5m, 1h, 1d")]
    Invalid(String),

    #[error("period must be greater than zero")]
    Zero,
}

/// Parse a period such as `500ms`, `1s`, `15m`, `1h`, `1d`. A bare number means seconds.
pub fn parse_period(raw: &str) -> Result<Duration, PeriodError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PeriodError::Empty);
    }

    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| PeriodError::Invalid(raw.to_string()))?;

    let seconds = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| PeriodError::Invalid(raw.to_string()))
    };
    let duration = match unit.trim() {
        "ms" => Duration::from_millis(value),
        "" | "s" => seconds(1)?,
        "m" => seconds(60)?,
        "h" => seconds(3_600)?,
        "d" => seconds(86_400)?,
        _ => return Err(PeriodError::Invalid(raw.to_string())),
    };

    if duration.is_zero() {
        return Err(PeriodError::Zero);
    }
    Ok(duration)
}

/// Compiled rate-limit options.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub options: RateLimitOptions,
    pub period: Duration,
}

impl RateLimitPolicy {
    /// Compile options; `None` when limiting is switched off.
    pub fn compile(options: &RateLimitOptions) -> Result<Option<Self>, PeriodError> {
        if !options.enable_rate_limiting {
            return Ok(None);
        }
        let period = parse_period(&options.period)?;
        Ok(Some(Self {
            options: options.clone(),
            period,
        }))
    }

    fn quota_message(&self) -> String {
        match &self.options.quota_exceeded_message {
            Some(message) => message.clone(),
            None => format!(
                "API calls quota exceeded! maximum admitted {} per {}.",
                self.options.limit, self.options.period
            ),
        }
    }
}

/// Quota state reported on admitted responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaHeaders {
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Admitted; quota headers unless disabled or whitelisted.
    Allowed(Option<QuotaHeaders>),
    Rejected(RateLimitRejection),
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    started_at: Instant,
    count: u64,
}

/// Fixed-window counters for one route.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    counters: DashMap<String, WindowCounter>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            counters: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Header value, then the configured default, then the remote IP.
    pub fn client_id(&self, request: &InboundRequest) -> String {
        request
            .header_value(&self.policy.options.client_id_header)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| self.policy.options.default_client_id.clone())
            .or_else(|| request.remote_addr.map(|addr: SocketAddr| addr.ip().to_string()))
            .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
    }

    /// True when the request is admitted.
    pub fn allow(&self, client: &str) -> bool {
        matches!(self.check(client, Instant::now()), RateLimitDecision::Allowed(_))
    }

    pub fn check(&self, client: &str, now: Instant) -> RateLimitDecision {
        let options = &self.policy.options;
        if options.client_whitelist.iter().any(|c| c == client) {
            return RateLimitDecision::Allowed(None);
        }

        let period = self.policy.period;
        let mut counter = self
            .counters
            .entry(client.to_string())
            .or_insert(WindowCounter {
                started_at: now,
                count: 0,
            });

        if now.saturating_duration_since(counter.started_at) > period {
            *counter = WindowCounter {
                started_at: now,
                count: 0,
            };
        }

        let reset_after = deadline(counter.started_at, period).saturating_duration_since(now);

        if counter.count >= options.limit {
            return RateLimitDecision::Rejected(RateLimitRejection {
                status: StatusCode::from_u16(options.http_status_code)
                    .unwrap_or(StatusCode::TOO_MANY_REQUESTS),
                message: self.policy.quota_message(),
                retry_after: (!options.disable_rate_limit_headers).then_some(reset_after),
            });
        }

        counter.count += 1;
        let remaining = options.limit - counter.count;

        RateLimitDecision::Allowed((!options.disable_rate_limit_headers).then_some(QuotaHeaders {
            limit: options.limit,
            remaining,
            reset_after,
        }))
    }

    /// Drop counters whose window has fully elapsed.
    pub fn purge_expired(&self, now: Instant) {
        let period = self.policy.period;
        self.counters
            .retain(|_, c| now.saturating_duration_since(c.started_at) <= period);
    }

    pub fn tracked_clients(&self) -> usize {
        self.counters.len()
    }
}
