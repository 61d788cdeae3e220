//! Off-peak scheduling gate for the crawl loop.
//!
//! The scheduler only decides *when* the main loop may run; it has no
//! effect on fetch correctness. When no window is configured, or the
//! no-wait knob is set, `wait_if_needed` returns immediately.

use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{Local, Timelike};

/// How often to re-check the clock while waiting for the window to open
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// A daily local-time window, possibly spanning midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffPeakWindow {
    /// Window start in minutes since local midnight
    start_min: u16,
    /// Window end in minutes since local midnight (exclusive)
    end_min: u16,
}

impl OffPeakWindow {
    /// Parse a window from two `HH:MM` strings
    pub fn new(start_hm: &str, end_hm: &str) -> Result<Self> {
        Ok(Self {
            start_min: parse_hm(start_hm)?,
            end_min: parse_hm(end_hm)?,
        })
    }

    /// Parse a combined `HH:MM-HH:MM` specification
    pub fn parse(spec: &str) -> Result<Self> {
        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| anyhow!("Expected HH:MM-HH:MM, got '{spec}'"))?;
        Self::new(start.trim(), end.trim())
    }

    /// Whether a minutes-since-midnight instant falls inside the window.
    ///
    /// A window whose end precedes its start wraps across midnight:
    /// `22:00-06:00` contains 23:30 and 05:59 but not 12:00.
    #[must_use]
    pub fn contains(&self, minutes: u16) -> bool {
        if self.start_min <= self.end_min {
            minutes >= self.start_min && minutes < self.end_min
        } else {
            minutes >= self.start_min || minutes < self.end_min
        }
    }

    fn contains_now(&self) -> bool {
        let now = Local::now();
        self.contains((now.hour() * 60 + now.minute()) as u16)
    }
}

fn parse_hm(hm: &str) -> Result<u16> {
    let (h, m) = hm
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected HH:MM, got '{hm}'"))?;
    let h: u16 = h.parse().map_err(|_| anyhow!("Invalid hour in '{hm}'"))?;
    let m: u16 = m.parse().map_err(|_| anyhow!("Invalid minute in '{hm}'"))?;
    if h > 23 || m > 59 {
        return Err(anyhow!("Time out of range in '{hm}'"));
    }
    Ok(h * 60 + m)
}

/// Gates the main loop on an optional off-peak window
#[derive(Debug, Clone)]
pub struct Scheduler {
    window: Option<OffPeakWindow>,
}

impl Scheduler {
    /// Create a scheduler; `None` means always open
    #[must_use]
    pub fn new(window: Option<OffPeakWindow>) -> Self {
        Self { window }
    }

    /// Create a scheduler that never blocks
    #[must_use]
    pub fn disabled() -> Self {
        Self { window: None }
    }

    /// Block until the local wall-clock is inside the configured window.
    ///
    /// Polls once a minute so a long wait still reacts to clock changes
    /// (DST transitions, suspended laptops).
    pub async fn wait_if_needed(&self) {
        let Some(window) = self.window else {
            return;
        };

        if window.contains_now() {
            return;
        }

        log::info!(
            "Outside off-peak window ({:02}:{:02}-{:02}:{:02}); waiting",
            window.start_min / 60,
            window.start_min % 60,
            window.end_min / 60,
            window.end_min % 60,
        );

        while !window.contains_now() {
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }

        log::info!("Off-peak window open; resuming");
    }
}
