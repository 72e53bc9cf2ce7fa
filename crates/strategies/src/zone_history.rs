use crate::calendar::localize;
use crate::fibonacci::{LevelSet, classify};
use api_client::PriceFeed;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use configuration::ZoneHistoryParams;
use core_types::{Kline, ZoneCode};
use rust_decimal::Decimal;

/// One classified bar close.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSample {
    pub timestamp: DateTime<Tz>,
    pub close: Decimal,
    /// `None` until the first level crossing has been observed.
    pub zone: Option<ZoneCode>,
}

/// What a refresh did to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// `fetched` bars were merged on top of `retained` existing samples.
    Merged { fetched: usize, retained: usize },
    /// The feed answered with no rows; the history is unchanged.
    NoData,
    /// The feed failed; the history is unchanged.
    FeedFailed,
}

/// A time-ordered timeline of zone samples for one ticker.
///
/// Timestamps are strictly increasing. The only mutation besides appending is
/// the truncation of the overlap window during a refresh.
#[derive(Debug, Clone)]
pub struct ZoneHistoryStore {
    ticker: String,
    timezone: Tz,
    levels: LevelSet,
    start_date: NaiveDate,
    overlap: Duration,
    interval: String,
    samples: Vec<ZoneSample>,
}

impl ZoneHistoryStore {
    pub fn new(ticker: &str, timezone: Tz, levels: LevelSet, params: &ZoneHistoryParams) -> Self {
        Self {
            ticker: ticker.to_string(),
            timezone,
            levels,
            start_date: params.start_date,
            overlap: Duration::days(params.overlap_days),
            interval: params.bar_interval.clone(),
            samples: Vec::new(),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn levels(&self) -> &LevelSet {
        &self.levels
    }

    pub fn samples(&self) -> &[ZoneSample] {
        &self.samples
    }

    pub fn latest(&self) -> Option<&ZoneSample> {
        self.samples.last()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Where the next fetch starts: the configured epoch for an empty history,
    /// otherwise the overlap window before the last known sample.
    pub fn fetch_start(&self) -> DateTime<Utc> {
        match self.samples.last() {
            Some(last) => (last.timestamp - self.overlap).with_timezone(&Utc),
            None => localize(&self.timezone, self.start_date, NaiveTime::MIN).with_timezone(&Utc),
        }
    }

    /// Pulls new bars from `feed` and merges them into the history.
    ///
    /// Refresh is best-effort: feed failures and empty answers are logged and
    /// leave the existing history untouched.
    pub async fn refresh(&mut self, feed: &dyn PriceFeed, now: DateTime<Utc>) -> RefreshOutcome {
        let start = self.fetch_start();
        let bars = match feed.get_bars(&self.ticker, start, now, &self.interval).await {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!(ticker = %self.ticker, %start, error = %e, "Price feed failed, keeping stale zone history");
                return RefreshOutcome::FeedFailed;
            }
        };

        if bars.is_empty() {
            tracing::warn!(ticker = %self.ticker, %start, %now, "Price feed returned no bars");
            return RefreshOutcome::NoData;
        }

        let fetched = bars.len();
        let retained = self.merge(bars);
        tracing::info!(
            ticker = %self.ticker,
            fetched,
            retained,
            total = self.samples.len(),
            latest_zone = ?self.latest().and_then(|s| s.zone),
            "Zone history refreshed"
        );
        RefreshOutcome::Merged { fetched, retained }
    }

    /// Replaces everything at or after the first fetched bar with the fetched
    /// batch, classifying each bar against the close before it.
    ///
    /// Returns the number of pre-existing samples that were kept.
    pub fn merge(&mut self, mut bars: Vec<Kline>) -> usize {
        bars.sort_by_key(|b| b.open_time);
        let Some(first) = bars.first() else {
            return self.samples.len();
        };
        let first_ts = first.open_time.with_timezone(&self.timezone);

        if let Some(idx) = self.samples.iter().position(|s| s.timestamp >= first_ts) {
            self.samples.truncate(idx);
        }
        let retained = self.samples.len();

        let (mut prev_close, mut zone) = self
            .samples
            .last()
            .map(|s| (s.close, s.zone))
            .unwrap_or((Decimal::ZERO, None));

        for bar in bars {
            let timestamp = bar.open_time.with_timezone(&self.timezone);
            // Duplicate rows inside one batch.
            if self.samples.last().is_some_and(|last| timestamp <= last.timestamp) {
                continue;
            }
            zone = classify(prev_close, bar.close, &self.levels).or(zone);
            prev_close = bar.close;
            self.samples.push(ZoneSample {
                timestamp,
                close: bar.close,
                zone,
            });
        }

        retained
    }

    /// The zone of the sample closest to `instant`; on a tie the earlier sample wins.
    pub fn zone_near(&self, instant: DateTime<Tz>) -> Option<ZoneCode> {
        let idx = self.samples.partition_point(|s| s.timestamp < instant);
        let before = idx.checked_sub(1).and_then(|i| self.samples.get(i));
        let after = self.samples.get(idx);

        let nearest = match (before, after) {
            (Some(b), Some(a)) => {
                if (a.timestamp - instant) < (instant - b.timestamp) {
                    a
                } else {
                    b
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };
        nearest.zone
    }
}
