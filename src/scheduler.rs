//! Daily wall-clock trigger for the scheduled refresh pass

use chrono::{DateTime, Duration as ChronoDuration, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;

use crate::sync::SyncEngine;

/// First instant after `now` at which the local clock in `tz` reads `hour:00`.
///
/// On the spring-forward day a missing hour runs one hour later; on the
/// fall-back day a repeated hour runs at its first occurrence.
pub fn next_run_after(now: DateTime<Utc>, hour: u32, tz: Tz) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let mut date = now.with_timezone(&tz).date_naive();

    for _ in 0..3 {
        let local = date.and_time(time);
        let candidate = match tz.from_local_datetime(&local) {
            LocalResult::Single(t) => Some(t),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => tz
                .from_local_datetime(&(local + ChronoDuration::hours(1)))
                .earliest(),
        };
        if let Some(candidate) = candidate.map(|t| t.with_timezone(&Utc)) {
            if candidate > now {
                return candidate;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    log::warn!("Could not place {}:00 in {}, retrying in 24h", hour, tz);
    now + ChronoDuration::days(1)
}

/// Run the scheduled pass every day at the configured local hour, forever
pub async fn run_daemon(engine: Arc<SyncEngine>) {
    let hour = engine.config().schedule_hour;
    let tz = engine.config().timezone;
    log::info!("Running in daemon mode, refreshing daily at {:02}:00 {}", hour, tz);

    loop {
        let now = Utc::now();
        let next = next_run_after(now, hour, tz);
        log::info!(
            "Next scheduled refresh at {}",
            next.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z")
        );

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;
        engine.run_scheduled().await;
    }
}
