use crate::error::EngineError;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use configuration::SessionParams;
use strategies::calendar::{days_to_monday, localize, roll_past_weekend};

/// One occurrence of a session: both instants are in the trading timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub open_at: DateTime<Tz>,
    pub close_at: DateTime<Tz>,
}

impl SessionWindow {
    /// `open_at <= now < open_at + tolerance`.
    pub fn accepts_entry(&self, now: DateTime<Utc>, tolerance: Duration) -> bool {
        now >= self.open_at && now < self.open_at + tolerance
    }

    /// The entry window has lapsed.
    pub fn has_lapsed(&self, now: DateTime<Utc>, tolerance: Duration) -> bool {
        now >= self.open_at + tolerance
    }
}

/// Computes the recurring open/close instants of one session definition.
#[derive(Debug, Clone)]
pub struct SessionScheduler {
    open: NaiveTime,
    close: NaiveTime,
    overnight: bool,
    timezone: Tz,
}

impl SessionScheduler {
    pub fn new(open: NaiveTime, close: NaiveTime, overnight: bool, timezone: Tz) -> Self {
        Self {
            open,
            close,
            overnight,
            timezone,
        }
    }

    pub fn from_params(params: &SessionParams, timezone: Tz) -> Result<Self, EngineError> {
        let clock = |h, m| {
            NaiveTime::from_hms_opt(h, m, 0).ok_or_else(|| {
                EngineError::Configuration(format!("session {} has an invalid time {:02}:{:02}", params.name, h, m))
            })
        };
        Ok(Self::new(
            clock(params.open_hour, params.open_minute)?,
            clock(params.close_hour, params.close_minute)?,
            params.overnight,
            timezone,
        ))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The next window whose open is strictly after `now`.
    ///
    /// A window opening on a weekend moves to Monday together with its close.
    /// A close landing on a weekend is then moved to Monday on its own.
    pub fn next_window(&self, now: DateTime<Utc>) -> SessionWindow {
        let local = now.with_timezone(&self.timezone);
        let mut open_day = local.date_naive();
        if local >= localize(&self.timezone, open_day, self.open) {
            open_day += Duration::days(1);
        }
        let weekend_shift = days_to_monday(open_day);
        open_day += Duration::days(weekend_shift);

        let close_day = if self.overnight {
            open_day + Duration::days(1)
        } else {
            open_day
        };

        SessionWindow {
            open_at: localize(&self.timezone, open_day, self.open),
            close_at: roll_past_weekend(localize(&self.timezone, close_day, self.close)),
        }
    }

    /// Rebuilds the local open instant of a broker order.
    ///
    /// Only the date and the minute/second are taken from the broker; the hour
    /// always comes from the session definition.
    pub fn executed_open_time(&self, broker_open: NaiveDateTime) -> DateTime<Tz> {
        let time = NaiveTime::from_hms_opt(self.open.hour(), broker_open.minute(), broker_open.second())
            .unwrap_or(self.open);
        localize(&self.timezone, broker_open.date(), time)
    }

    /// When a position opened at `executed_open` is due to close.
    pub fn close_after(&self, executed_open: DateTime<Tz>) -> DateTime<Tz> {
        let mut day = executed_open.date_naive();
        if self.overnight {
            day += Duration::days(1);
        }
        roll_past_weekend(localize(&self.timezone, day, self.close))
    }
}
