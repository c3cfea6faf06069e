//! Next-wake computation and the alarm seam.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use sky_core::ScheduleConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// When to run the next background refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Minimum distance between now and the next wake-up
    pub throttle: Duration,
    /// The interval is divided by this after a failed cycle
    pub failure_divisor: u32,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::from(&ScheduleConfig::default())
    }
}

impl From<&ScheduleConfig> for SchedulePolicy {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            throttle: Duration::minutes(i64::from(config.throttle_minutes)),
            failure_divisor: config.failure_divisor.max(1),
        }
    }
}

impl SchedulePolicy {
    /// `now + interval`, or a fraction of it after a failure, never closer
    /// than the throttle. Callers skip scheduling for an interval of 0.
    pub fn next_wake_time(&self, now: DateTime<Utc>, interval_hours: u32, all_ok: bool) -> DateTime<Utc> {
        let interval = Duration::hours(i64::from(interval_hours));
        let delay = if all_ok {
            interval
        } else {
            let divisor = i32::try_from(self.failure_divisor.max(1)).unwrap_or(i32::MAX);
            interval / divisor
        };

        let wake = later(now, delay);
        let floor = later(now, self.throttle);
        if wake < floor {
            tracing::debug!("Next wake throttled to {}", floor);
            floor
        } else {
            wake
        }
    }
}

/// `now + delay`, saturating at the latest representable time
fn later(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Platform alarm service
pub trait AlarmScheduler: Send + Sync {
    /// Replace any pending alarm with one at `wake_at`. `wakeup` asks for the
    /// device to be woken rather than waiting for it to be awake.
    fn schedule(&self, wake_at: DateTime<Utc>, wakeup: bool);
}

/// Delivered when a `TokioAlarm` goes off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmFired {
    pub scheduled_for: DateTime<Utc>,
    pub wakeup: bool,
}

/// In-process alarm: one replaceable tokio timer feeding a channel
pub struct TokioAlarm {
    tx: mpsc::UnboundedSender<AlarmFired>,
    pending: Mutex<Option<(DateTime<Utc>, JoinHandle<()>)>>,
}

impl TokioAlarm {
    /// Create the alarm and the receiver its firings are delivered on
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<AlarmFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let alarm = Arc::new(Self {
            tx,
            pending: Mutex::new(None),
        });
        (alarm, rx)
    }

    /// Wake time of the armed timer, if any
    pub fn pending_wake(&self) -> Option<DateTime<Utc>> {
        self.pending
            .lock()
            .as_ref()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(at, _)| *at)
    }

    pub fn cancel(&self) {
        if let Some((_, handle)) = self.pending.lock().take() {
            handle.abort();
        }
    }
}

impl AlarmScheduler for TokioAlarm {
    fn schedule(&self, wake_at: DateTime<Utc>, wakeup: bool) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime; alarm for {} not armed", wake_at);
            return;
        };

        let delay = (wake_at - Utc::now()).to_std().unwrap_or_default();
        let tx = self.tx.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let fired = AlarmFired {
                scheduled_for: wake_at,
                wakeup,
            };
            if tx.send(fired).is_err() {
                tracing::debug!("Alarm fired with nobody listening");
            }
        });

        if let Some((_, previous)) = self.pending.lock().replace((wake_at, handle)) {
            previous.abort();
        }
        tracing::info!("Next refresh scheduled for {}", wake_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_success_uses_full_interval() {
        let policy = SchedulePolicy::default();
        assert_eq!(policy.next_wake_time(now(), 6, true), now() + Duration::hours(6));
    }

    #[test]
    fn test_failure_uses_tenth_of_interval() {
        let policy = SchedulePolicy::default();
        assert_eq!(policy.next_wake_time(now(), 6, false), now() + Duration::minutes(36));
    }

    #[test]
    fn test_near_wake_is_throttled() {
        let policy = SchedulePolicy::default();
        // 1h / 10 = 6 minutes, below the 10 minute floor
        assert_eq!(policy.next_wake_time(now(), 1, false), now() + Duration::minutes(10));
        assert_eq!(policy.next_wake_time(now(), 0, true), now() + Duration::minutes(10));
    }

    #[test]
    fn test_huge_interval_saturates() {
        let policy = SchedulePolicy::default();
        assert_eq!(policy.next_wake_time(now(), u32::MAX, true), DateTime::<Utc>::MAX_UTC);

        let failed = policy.next_wake_time(now(), u32::MAX, false);
        assert!(failed > now() + Duration::days(365));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = SchedulePolicy::from(&ScheduleConfig {
            throttle_minutes: 5,
            failure_divisor: 2,
        });
        assert_eq!(policy.next_wake_time(now(), 4, false), now() + Duration::hours(2));
        assert_eq!(policy.throttle, Duration::minutes(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_alarm_fires_once_at_latest_time() {
        let (alarm, mut rx) = TokioAlarm::channel();

        alarm.schedule(Utc::now() + Duration::hours(1), true);
        let second = Utc::now() + Duration::minutes(10);
        alarm.schedule(second, false);
        assert_eq!(alarm.pending_wake(), Some(second));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.scheduled_for, second);
        assert!(!fired.wakeup);

        tokio::time::advance(std::time::Duration::from_secs(2 * 3600)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms() {
        let (alarm, mut rx) = TokioAlarm::channel();
        alarm.schedule(Utc::now() + Duration::minutes(10), true);
        alarm.cancel();
        assert_eq!(alarm.pending_wake(), None);

        tokio::time::advance(std::time::Duration::from_secs(3600)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
