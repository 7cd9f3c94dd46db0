// Per-second and per-day request budget for outbound provider calls.
//
// Counters live in memory only and start from zero with the process. The
// per-second window is rolled lazily on every check and also by a 1s ticker;
// the daily counter rolls at the next local midnight.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use crate::{config::RateLimitConfig, error::SearchError};

pub const REASON_DAILY_QUOTA: &str = "daily quota exceeded";
pub const REASON_RATE_LIMIT: &str = "rate limit exceeded";

const SECOND: Duration = Duration::from_secs(1);
const DAILY_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub reason: Option<&'static str>,
}

impl RateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitUsage {
    pub second_count: u32,
    pub day_count: u32,
    pub max_requests_per_second: u32,
    pub max_requests_per_day: u32,
    pub next_daily_reset: DateTime<Local>,
}

#[derive(Debug)]
struct Counters {
    second_count: u32,
    second_started: Instant,
    day_count: u32,
    next_daily_reset: DateTime<Local>,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    counters: Mutex<Counters>,
    notify: Notify,
}

fn next_local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    now.date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .unwrap_or_else(|| now + chrono::Duration::hours(24))
}

impl RateLimiter {
    // A per-second budget of zero would park every caller forever, so it is raised to one.
    pub fn new(mut config: RateLimitConfig) -> Self {
        if config.max_requests_per_second == 0 {
            warn!("max_requests_per_second of 0 raised to 1");
            config.max_requests_per_second = 1;
        }
        Self {
            config,
            counters: Mutex::new(Counters {
                second_count: 0,
                second_started: Instant::now(),
                day_count: 0,
                next_daily_reset: next_local_midnight(Local::now()),
            }),
            notify: Notify::new(),
        }
    }

    fn roll_windows(&self, counters: &mut Counters) {
        if counters.second_started.elapsed() >= SECOND {
            counters.second_count = 0;
            counters.second_started = Instant::now();
        }
        Self::roll_day(counters, Local::now());
    }

    fn roll_day(counters: &mut Counters, now: DateTime<Local>) -> bool {
        if now >= counters.next_daily_reset {
            counters.day_count = 0;
            counters.next_daily_reset = next_local_midnight(now);
            true
        } else {
            false
        }
    }

    fn decide(&self, counters: &Counters) -> RateDecision {
        if counters.day_count >= self.config.max_requests_per_day {
            RateDecision::deny(REASON_DAILY_QUOTA)
        } else if counters.second_count >= self.config.max_requests_per_second {
            RateDecision::deny(REASON_RATE_LIMIT)
        } else {
            RateDecision::allow()
        }
    }

    pub fn can_proceed(&self) -> RateDecision {
        let mut counters = self.counters.lock();
        self.roll_windows(&mut counters);
        self.decide(&counters)
    }

    pub fn record_attempt(&self) {
        let mut counters = self.counters.lock();
        self.roll_windows(&mut counters);
        counters.second_count += 1;
        counters.day_count += 1;
    }

    // Suspends until a slot is free without consuming it.
    pub async fn await_slot(&self) -> Result<(), SearchError> {
        self.wait(false).await
    }

    // Suspends until a slot is free and records the attempt under the same lock,
    // so concurrent callers can never overshoot the budget.
    pub async fn acquire(&self) -> Result<(), SearchError> {
        self.wait(true).await
    }

    async fn wait(&self, consume: bool) -> Result<(), SearchError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let window_end = {
                let mut counters = self.counters.lock();
                self.roll_windows(&mut counters);
                let decision = self.decide(&counters);

                if decision.allowed {
                    if consume {
                        counters.second_count += 1;
                        counters.day_count += 1;
                    }
                    return Ok(());
                }

                // Waiting for midnight would stall the caller for hours.
                if decision.reason == Some(REASON_DAILY_QUOTA) {
                    warn!(
                        "daily quota of {} requests exhausted until {}",
                        self.config.max_requests_per_day, counters.next_daily_reset
                    );
                    return Err(SearchError::QuotaExceeded);
                }

                counters.second_started + SECOND
            };

            debug!("rate limit reached, waiting for next window");
            tokio::select! {
                _ = &mut notified => {}
                _ = sleep_until(window_end) => {}
            }
        }
    }

    pub fn reset_second_window(&self) {
        {
            let mut counters = self.counters.lock();
            counters.second_count = 0;
            counters.second_started = Instant::now();
        }
        self.notify.notify_waiters();
    }

    pub fn check_daily_reset(&self) -> bool {
        self.check_daily_reset_at(Local::now())
    }

    pub(crate) fn check_daily_reset_at(&self, now: DateTime<Local>) -> bool {
        let rolled = Self::roll_day(&mut self.counters.lock(), now);
        if rolled {
            info!("daily request counter reset");
            self.notify.notify_waiters();
        }
        rolled
    }

    pub fn usage(&self) -> RateLimitUsage {
        let mut counters = self.counters.lock();
        self.roll_windows(&mut counters);
        RateLimitUsage {
            second_count: counters.second_count,
            day_count: counters.day_count,
            max_requests_per_second: self.config.max_requests_per_second,
            max_requests_per_day: self.config.max_requests_per_day,
            next_daily_reset: counters.next_daily_reset,
        }
    }

    // Background timers: one resets the per-second window every second,
    // the other checks the daily boundary every minute.
    pub fn spawn_reset_timers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let limiter = self.clone();
        let second_ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SECOND);
            loop {
                interval.tick().await;
                limiter.reset_second_window();
            }
        });

        let limiter = self.clone();
        let daily_ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(DAILY_CHECK_INTERVAL);
            loop {
                interval.tick().await;
                limiter.check_daily_reset();
            }
        });

        vec![second_ticker, daily_ticker]
    }
}
