//! Traffic guard: per-(client, path) admission control.
//!
//! # Responsibilities
//! - Keep an access record per (client identifier, request path)
//! - Resolve the path's effective frequency from the group policies
//! - Accept or reject each request atomically per key
//!
//! # Design Decisions
//! - Records live in a sharded map; a decision holds only its key's shard lock
//! - Sliding-window log by default: accepted requests in any trailing window
//!   never exceed the limit. Token bucket available for smoother admission
//! - Fail closed: a panic in the bookkeeping rejects the request

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{body::Body, http::Request};
use dashmap::DashMap;
use serde::Serialize;

use crate::config::{RatePolicyKind, TrafficConfig};
use crate::error::ActionError;
use crate::http::middleware::recovery::panic_message;
use crate::http::middleware::{Handler, Middleware};
use crate::http::request::client_ip;
use crate::http::response::Responder;
use crate::observability::metrics;
use crate::routing::policy::GroupPolicies;

/// Weight of the newest sample in the smoothed rate estimate.
const RATE_SMOOTHING: f64 = 0.3;

/// Shortest interval used when estimating the instantaneous rate.
const MIN_INTERVAL_SECS: f64 = 1e-3;

/// Record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrafficKey {
    pub client: String,
    pub path: String,
}

impl TrafficKey {
    pub fn new(client: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            path: path.into(),
        }
    }
}

/// Access state of one (client, path) pair.
#[derive(Debug, Clone)]
pub struct TrafficRecord {
    /// Time of the last attempt, accepted or not.
    pub last_access: Instant,
    /// Smoothed requests-per-second estimate.
    pub rate: f64,
    /// Token bucket level.
    pub tokens: f64,
    /// Accepted attempts inside the sliding window.
    pub window: VecDeque<Instant>,
    pub accepted: u64,
    pub rejected: u64,
}

impl TrafficRecord {
    pub fn new(now: Instant, limit: f64) -> Self {
        Self {
            last_access: now,
            rate: 0.0,
            tokens: limit.max(1.0),
            window: VecDeque::new(),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Fold an attempt at `now` into the counters and rate estimate.
    fn observe(&mut self, now: Instant, admitted: bool) {
        if self.accepted + self.rejected > 0 {
            let elapsed = now
                .saturating_duration_since(self.last_access)
                .as_secs_f64()
                .max(MIN_INTERVAL_SECS);
            self.rate = RATE_SMOOTHING * (1.0 / elapsed) + (1.0 - RATE_SMOOTHING) * self.rate;
        }
        self.last_access = now;
        if admitted {
            self.accepted += 1;
        } else {
            self.rejected += 1;
        }
    }
}

/// Admission formula.
pub trait RatePolicy: Send + Sync + fmt::Debug + 'static {
    fn name(&self) -> &'static str;

    /// Decide whether the attempt at `now` is within `limit` requests per
    /// second, updating the policy state in `record`. `record.last_access`
    /// still holds the previous attempt's time.
    fn admit(&self, record: &mut TrafficRecord, limit: f64, now: Instant) -> bool;
}

/// Trailing-window log of accepted attempts.
///
/// Limits of one or more per second allow `floor(limit)` per second; lower
/// limits allow one attempt per `1 / limit` seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingWindow;

impl SlidingWindow {
    fn window_for(limit: f64) -> (usize, Duration) {
        if limit >= 1.0 {
            (limit.floor() as usize, Duration::from_secs(1))
        } else {
            // tiny limits overflow a Duration; such a window never expires
            let window = Duration::try_from_secs_f64(1.0 / limit).unwrap_or(Duration::MAX);
            (1, window)
        }
    }
}

impl RatePolicy for SlidingWindow {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    fn admit(&self, record: &mut TrafficRecord, limit: f64, now: Instant) -> bool {
        let (max_requests, window) = Self::window_for(limit);

        // Remove expired timestamps
        while record
            .window
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= window)
        {
            record.window.pop_front();
        }

        if record.window.len() < max_requests {
            record.window.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Token bucket refilled at `limit` tokens per second, capacity `max(limit, 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBucket;

impl RatePolicy for TokenBucket {
    fn name(&self) -> &'static str {
        "token_bucket"
    }

    fn admit(&self, record: &mut TrafficRecord, limit: f64, now: Instant) -> bool {
        let capacity = limit.max(1.0);
        let elapsed = now.saturating_duration_since(record.last_access).as_secs_f64();

        // Refill tokens
        record.tokens = (record.tokens + elapsed * limit).min(capacity);

        if record.tokens >= 1.0 {
            record.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Accepted { rate: f64, limit: f64 },
    Rejected { rate: f64, limit: f64 },
    /// The bookkeeping panicked; treated as a rejection.
    Faulted,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted { .. })
    }
}

/// Per-record view exposed for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficSnapshot {
    pub client: String,
    pub path: String,
    pub rate: f64,
    pub accepted: u64,
    pub rejected: u64,
}

struct GuardInner {
    records: DashMap<TrafficKey, TrafficRecord>,
    policies: Arc<GroupPolicies>,
    policy: Box<dyn RatePolicy>,
    responder: Responder,
}

/// Rate-limiting middleware. Cheap to clone; clones share records.
#[derive(Clone)]
pub struct TrafficGuard {
    inner: Arc<GuardInner>,
}

impl TrafficGuard {
    pub fn new(
        policies: Arc<GroupPolicies>,
        policy: impl RatePolicy,
        responder: Responder,
    ) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                records: DashMap::new(),
                policies,
                policy: Box::new(policy),
                responder,
            }),
        }
    }

    pub fn from_config(
        config: &TrafficConfig,
        policies: Arc<GroupPolicies>,
        responder: Responder,
    ) -> Self {
        match config.policy {
            RatePolicyKind::SlidingWindow => Self::new(policies, SlidingWindow, responder),
            RatePolicyKind::TokenBucket => Self::new(policies, TokenBucket, responder),
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.inner.policy.name()
    }

    /// Check an attempt happening now.
    pub fn check(&self, client: &str, path: &str) -> Admission {
        self.check_at(client, path, Instant::now())
    }

    /// Check an attempt happening at `now`.
    pub fn check_at(&self, client: &str, path: &str, now: Instant) -> Admission {
        let limit = self.inner.policies.frequency_for(path);
        let key = TrafficKey::new(client, path);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut entry = self
                .inner
                .records
                .entry(key.clone())
                .or_insert_with(|| TrafficRecord::new(now, limit));
            let record = entry.value_mut();
            // concurrent callers may reach the lock out of clock order
            let now = now.max(record.last_access);
            let admitted = self.inner.policy.admit(record, limit, now);
            record.observe(now, admitted);
            (admitted, record.rate)
        }));

        match outcome {
            Ok((true, rate)) => Admission::Accepted { rate, limit },
            Ok((false, rate)) => Admission::Rejected { rate, limit },
            Err(payload) => {
                let snapshot = self.inner.records.get(&key).map(|r| r.value().clone());
                tracing::error!(
                    client = %client,
                    path = %path,
                    record = ?snapshot,
                    panic = %panic_message(payload.as_ref()),
                    "Traffic guard panic"
                );
                Admission::Faulted
            }
        }
    }

    /// Number of tracked (client, path) pairs.
    pub fn tracked(&self) -> usize {
        self.inner.records.len()
    }

    pub fn snapshot(&self) -> Vec<TrafficSnapshot> {
        let mut out: Vec<_> = self
            .inner
            .records
            .iter()
            .map(|entry| TrafficSnapshot {
                client: entry.key().client.clone(),
                path: entry.key().path.clone(),
                rate: entry.value().rate,
                accepted: entry.value().accepted,
                rejected: entry.value().rejected,
            })
            .collect();
        out.sort_by(|a, b| (&a.path, &a.client).cmp(&(&b.path, &b.client)));
        out
    }
}

impl fmt::Debug for TrafficGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrafficGuard")
            .field("policy", &self.inner.policy)
            .field("tracked", &self.inner.records.len())
            .finish()
    }
}

impl Middleware for TrafficGuard {
    fn name(&self) -> &'static str {
        "traffic_guard"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let guard = self.clone();
        Handler::new(move |req: Request<Body>| {
            let next = next.clone();
            let guard = guard.clone();
            async move {
                let client = client_ip(&req);
                let path = req.uri().path().to_string();

                match guard.check(&client, &path) {
                    Admission::Accepted { rate, limit } => {
                        tracing::debug!(client = %client, path = %path, rate, limit, "[TG] record");
                        next.call(req).await
                    }
                    admission => {
                        if let Admission::Rejected { rate, limit } = admission {
                            tracing::error!(client = %client, path = %path, rate, limit, "[TG] jam");
                        }
                        metrics::record_rate_limited(&path);
                        let responder = guard.inner.responder;
                        let reply = ActionError::RateLimited.into_reply(&responder);
                        responder.write(&reply, &path)
                    }
                }
            }
        })
    }
}
