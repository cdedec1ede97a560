// src/controller/rate.rs
//! Reporting cadence and the two-state (moving / stopped) motion model.

use chrono::NaiveTime;
use cinet_protocol::{OperatingMode, PositionFix};
use tokio::time::{Duration, Instant};
use tracing::warn;

use crate::config::Settings;

/// Inputs to the interval decision that are not configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateContext {
    pub in_deployment: bool,
    pub moving: bool,
}

/// First matching rule wins.
pub fn reporting_interval(ctx: RateContext, settings: &Settings) -> Duration {
    let secs = if ctx.in_deployment {
        u64::from(settings.rate_moving_sec)
    } else {
        match settings.mode {
            OperatingMode::Continuous => u64::from(settings.rate_moving_sec),
            OperatingMode::Standby | OperatingMode::ForeverStandby => u64::from(settings.rate_standby_sec),
            OperatingMode::Hibernate => settings.hibernate_wake_interval_hr.saturating_mul(3600),
            OperatingMode::Active | OperatingMode::Logging if ctx.moving => u64::from(settings.rate_moving_sec),
            OperatingMode::Active | OperatingMode::Logging => u64::from(settings.rate_stopped_sec),
        }
    };
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEdge {
    Started,
    Stopped,
}

/// Moving until `timeout` passes with no further motion event.
#[derive(Debug, Default, Clone)]
pub struct MotionTracker {
    moving: bool,
    last_motion: Option<Instant>,
}

impl MotionTracker {
    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn observe(&mut self, detected: bool, now: Instant, timeout: Duration) -> Option<MotionEdge> {
        if detected {
            self.last_motion = Some(now);
            if !self.moving {
                self.moving = true;
                return Some(MotionEdge::Started);
            }
            return None;
        }
        let expired = self
            .last_motion
            .is_none_or(|t| now.saturating_duration_since(t) >= timeout);
        if self.moving && expired {
            self.moving = false;
            return Some(MotionEdge::Stopped);
        }
        None
    }
}

/// Daily awake hours, inclusive at both ends. `start > end` spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwakeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl AwakeWindow {
    /// `None` when scheduling is off or either bound is not `HH:MM`.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        if !settings.schedule_enabled {
            return None;
        }
        let parse = |s: &str| NaiveTime::parse_from_str(s.trim(), "%H:%M");
        match (parse(&settings.schedule_awake_start), parse(&settings.schedule_awake_end)) {
            (Ok(start), Ok(end)) => Some(Self { start, end }),
            _ => {
                warn!(
                    start = %settings.schedule_awake_start,
                    end = %settings.schedule_awake_end,
                    "unreadable awake hours; schedule ignored"
                );
                None
            }
        }
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }

    /// Without a valid fix carrying a clock the beacon stays awake.
    pub fn allows(&self, fix: &PositionFix) -> bool {
        match fix.timestamp {
            Some(ts) if fix.valid => self.contains(ts.time()),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(in_deployment: bool, moving: bool) -> RateContext {
        RateContext { in_deployment, moving }
    }

    #[test]
    fn active_follows_motion() {
        let s = Settings::default();
        assert_eq!(reporting_interval(ctx(false, false), &s), Duration::from_secs(60));
        assert_eq!(reporting_interval(ctx(false, true), &s), Duration::from_secs(10));
    }

    #[test]
    fn deployment_window_overrides_mode() {
        let s = Settings { mode: OperatingMode::Hibernate, ..Settings::default() };
        assert_eq!(reporting_interval(ctx(true, false), &s), Duration::from_secs(10));
    }

    #[test]
    fn mode_specific_rates() {
        let mut s = Settings::default();
        s.mode = OperatingMode::Continuous;
        assert_eq!(reporting_interval(ctx(false, false), &s), Duration::from_secs(10));
        s.mode = OperatingMode::Standby;
        assert_eq!(reporting_interval(ctx(false, true), &s), Duration::from_secs(3600));
        s.mode = OperatingMode::ForeverStandby;
        assert_eq!(reporting_interval(ctx(false, false), &s), Duration::from_secs(3600));
        s.mode = OperatingMode::Hibernate;
        assert_eq!(reporting_interval(ctx(false, true), &s), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn motion_decays_after_timeout() {
        let t0 = Instant::now();
        let timeout = Duration::from_secs(120);
        let mut m = MotionTracker::default();

        assert_eq!(m.observe(false, t0, timeout), None);
        assert_eq!(m.observe(true, t0, timeout), Some(MotionEdge::Started));
        assert_eq!(m.observe(true, t0 + Duration::from_secs(30), timeout), None);
        assert_eq!(m.observe(false, t0 + Duration::from_secs(149), timeout), None);
        assert!(m.is_moving());
        assert_eq!(m.observe(false, t0 + Duration::from_secs(150), timeout), Some(MotionEdge::Stopped));
        assert!(!m.is_moving());
        assert_eq!(m.observe(false, t0 + Duration::from_secs(500), timeout), None);
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(start: &str, end: &str) -> Option<AwakeWindow> {
        AwakeWindow::from_settings(&Settings {
            schedule_enabled: true,
            schedule_awake_start: start.into(),
            schedule_awake_end: end.into(),
            ..Settings::default()
        })
    }

    #[test]
    fn awake_hours_within_one_day() {
        let w = window("06:00", "22:00").unwrap();
        assert!(!w.contains(hm(5, 59)));
        assert!(w.contains(hm(6, 0)));
        assert!(w.contains(hm(22, 0)));
        assert!(!w.contains(hm(22, 1)));
    }

    #[test]
    fn awake_hours_across_midnight() {
        let w = window("22:00", "06:00").unwrap();
        assert!(w.contains(hm(23, 30)));
        assert!(w.contains(hm(0, 0)));
        assert!(w.contains(hm(6, 0)));
        assert!(!w.contains(hm(12, 0)));
    }

    #[test]
    fn schedule_off_or_unreadable_means_always_awake() {
        assert_eq!(AwakeWindow::from_settings(&Settings::default()), None);
        assert_eq!(window("6am", "22:00"), None);
    }

    #[test]
    fn no_clock_keeps_the_beacon_awake() {
        let w = window("06:00", "22:00").unwrap();
        let night = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(2, 0, 0).unwrap();
        let mut fix = PositionFix { valid: true, timestamp: Some(night), ..PositionFix::default() };
        assert!(!w.allows(&fix));
        fix.valid = false;
        assert!(w.allows(&fix));
        fix.valid = true;
        fix.timestamp = None;
        assert!(w.allows(&fix));
    }
}
