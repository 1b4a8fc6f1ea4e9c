//! Fixed-window rate limiter middleware.
//!
//! Allows `max_per_sec` requests in each one-second window across every
//! route it is layered on. The window opens on the first request after the
//! previous one expired.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Extension, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    opened: Instant,
    count: u64,
}

/// Shared limiter state. Clones share the same window.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    max_per_sec: u64,
    window: Arc<Mutex<Option<Window>>>,
}

impl RateLimiter {
    /// A limit of zero disables limiting.
    pub fn new(max_per_sec: u64) -> Self {
        Self {
            max_per_sec,
            window: Arc::new(Mutex::new(None)),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        if self.max_per_sec == 0 {
            return true;
        }
        let Ok(mut window) = self.window.lock() else {
            return true;
        };
        match window.as_mut() {
            Some(w) if now.duration_since(w.opened) < WINDOW => {
                if w.count < self.max_per_sec {
                    w.count += 1;
                    true
                } else {
                    false
                }
            }
            _ => {
                *window = Some(Window {
                    opened: now,
                    count: 1,
                });
                true
            }
        }
    }
}

/// Axum middleware that enforces the rate limit.
pub async fn rate_limit_middleware(
    Extension(limiter): Extension<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    if limiter.try_acquire() {
        next.run(req).await
    } else {
        tracing::warn!(path = %req.uri().path(), "Rate limit exceeded");
        ApiError::TooManyRequests.into_response()
    }
}
