//! Per-receiver rate limiting.
//!
//! A token bucket holding up to `permits` tokens, refilled continuously at
//! `permits` per `interval`. The worker takes one token before dispatching
//! each message from a rate-limited receiver and waits when the bucket is empty.

use std::time::{Duration, Instant};

use log::debug;
use tokio::sync::Mutex;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    permits: u32,
    interval: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Allow `permits` messages per `interval`. The bucket starts full.
    pub fn new(permits: u32, interval: Duration) -> Self {
        let permits = permits.max(1);
        Self {
            permits,
            interval,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(permits),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn permits(&self) -> u32 {
        self.permits
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);
        bucket.last_refill = now;

        if self.interval.is_zero() {
            bucket.tokens = f64::from(self.permits);
            return;
        }

        let rate = f64::from(self.permits) / self.interval.as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * rate).min(f64::from(self.permits));
    }

    /// Time until the next token, or `None` if one is available now.
    fn wait_time(&self, bucket: &Bucket) -> Option<Duration> {
        if bucket.tokens >= 1.0 {
            return None;
        }
        let rate = f64::from(self.permits) / self.interval.as_secs_f64();
        Some(Duration::from_secs_f64((1.0 - bucket.tokens) / rate))
    }

    /// Take a token if one is available right now.
    #[cfg(test)]
    async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take a token, waiting for the bucket to refill if needed.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                match self.wait_time(&bucket) {
                    None => {
                        bucket.tokens -= 1.0;
                        return;
                    }
                    Some(wait) => wait,
                }
            };

            debug!("Rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}
