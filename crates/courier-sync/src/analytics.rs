//! Performance-analytics view model with fallback merging.
//!
//! Dashboards must render something even when the live analytics query has
//! never succeeded. The merger combines, per field, the live result (when
//! the query has succeeded, including stale-but-available data), then
//! caller-supplied defaults, then defined zero placeholders with canonical
//! bucket labels, so presentation code never special-cases missing data.
//! Derived metrics are computed from the merged scalars only and are never
//! fetched.

use crate::query::QuerySnapshot;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Message volume for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyVolume {
    /// ISO date, e.g. `2026-08-25`.
    pub date: String,
    pub volume: u64,
}

/// Delivered/failed split for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    /// Abbreviated month name, e.g. `Aug`.
    pub month: String,
    pub delivered: u64,
    pub failed: u64,
}

/// Message volume for one four-hour bucket of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyVolume {
    /// Bucket start, e.g. `08:00`.
    pub time: String,
    pub volume: u64,
}

/// Live payload of the performance analytics endpoint, parameterized by a
/// lookback window in days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAnalytics {
    pub delivery_rate: f64,
    pub total_delivered: u64,
    pub total_failed: u64,
    #[serde(default)]
    pub daily_volumes: Vec<DailyVolume>,
    #[serde(default)]
    pub monthly_trends: Vec<MonthlyTrend>,
    #[serde(default)]
    pub hourly_volumes: Vec<HourlyVolume>,
}

/// Caller-supplied fallbacks, used when the consumer renders before any live
/// fetch has succeeded. Every field is optional; unspecified fields resolve
/// to the zero placeholders.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsDefaults {
    pub delivery_rate: Option<f64>,
    pub total_delivered: Option<u64>,
    pub total_failed: Option<u64>,
    pub daily_volumes: Option<Vec<DailyVolume>>,
    pub monthly_trends: Option<Vec<MonthlyTrend>>,
    pub hourly_volumes: Option<Vec<HourlyVolume>>,
}

/// One slice of the categorical delivery split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliverySlice {
    pub label: &'static str,
    pub value: u64,
}

/// Presentation-ready analytics. Every numeric field is defined; every
/// series has at least its canonical placeholder length. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsView {
    pub delivery_rate: f64,
    pub total_delivered: u64,
    pub total_failed: u64,
    /// Derived: `total_delivered + total_failed`.
    pub total_processed: u64,
    /// Derived: failed share of processed, in percent, zero when nothing
    /// was processed.
    pub failure_rate: f64,
    /// Categorical delivered-vs-failed split, derived from the merged
    /// scalars.
    pub delivery_split: Vec<DeliverySlice>,
    pub daily_volumes: Vec<DailyVolume>,
    pub monthly_trends: Vec<MonthlyTrend>,
    pub hourly_volumes: Vec<HourlyVolume>,
}

/// Zero-valued series for the last seven calendar days, oldest first.
pub fn zero_daily_volumes(reference: DateTime<Utc>) -> Vec<DailyVolume> {
    (0..7)
        .rev()
        .map(|days_back| DailyVolume {
            date: (reference - chrono::Duration::days(days_back))
                .format("%Y-%m-%d")
                .to_string(),
            volume: 0,
        })
        .collect()
}

/// Zero-valued trend for the last six calendar months, oldest first.
pub fn zero_monthly_trends(reference: DateTime<Utc>) -> Vec<MonthlyTrend> {
    (0..6)
        .rev()
        .map(|months_back| MonthlyTrend {
            month: month_label(reference, months_back),
            delivered: 0,
            failed: 0,
        })
        .collect()
}

/// Zero-valued volumes for the six four-hour buckets of a day.
pub fn zero_hourly_volumes() -> Vec<HourlyVolume> {
    (0..24)
        .step_by(4)
        .map(|hour| HourlyVolume {
            time: format!("{:02}:00", hour),
            volume: 0,
        })
        .collect()
}

/// Abbreviated name of the month `months_back` months before the reference.
fn month_label(reference: DateTime<Utc>, months_back: i64) -> String {
    let total = reference.year() as i64 * 12 + reference.month0() as i64 - months_back;
    let year = total.div_euclid(12) as i32;
    let month0 = total.rem_euclid(12) as u32;
    NaiveDate::from_ymd_opt(year, month0 + 1, 1)
        .map(|d| d.format("%b").to_string())
        .unwrap_or_default()
}

/// Merge a decoded live result with caller defaults into a view model.
///
/// `live` should be the snapshot data from a query that has succeeded at
/// least once; stale-but-available data qualifies. An empty live series is
/// treated as absent so series fields keep their canonical fixed length.
pub fn merge(
    live: Option<&PerformanceAnalytics>,
    defaults: &AnalyticsDefaults,
    reference: DateTime<Utc>,
) -> AnalyticsView {
    let delivery_rate = live
        .map(|a| a.delivery_rate)
        .or(defaults.delivery_rate)
        .unwrap_or(0.0);
    let total_delivered = live
        .map(|a| a.total_delivered)
        .or(defaults.total_delivered)
        .unwrap_or(0);
    let total_failed = live
        .map(|a| a.total_failed)
        .or(defaults.total_failed)
        .unwrap_or(0);

    let daily_volumes = pick_series(
        live.map(|a| &a.daily_volumes),
        defaults.daily_volumes.as_ref(),
    )
    .unwrap_or_else(|| zero_daily_volumes(reference));
    let monthly_trends = pick_series(
        live.map(|a| &a.monthly_trends),
        defaults.monthly_trends.as_ref(),
    )
    .unwrap_or_else(|| zero_monthly_trends(reference));
    let hourly_volumes = pick_series(
        live.map(|a| &a.hourly_volumes),
        defaults.hourly_volumes.as_ref(),
    )
    .unwrap_or_else(zero_hourly_volumes);

    let total_processed = total_delivered + total_failed;
    let failure_rate = if total_processed > 0 {
        round_rate(total_failed as f64 / total_processed as f64 * 100.0)
    } else {
        0.0
    };

    AnalyticsView {
        delivery_rate,
        total_delivered,
        total_failed,
        total_processed,
        failure_rate,
        delivery_split: vec![
            DeliverySlice {
                label: "Delivered",
                value: total_delivered,
            },
            DeliverySlice {
                label: "Failed",
                value: total_failed,
            },
        ],
        daily_volumes,
        monthly_trends,
        hourly_volumes,
    }
}

/// Merge directly from a query snapshot.
///
/// Snapshot data that does not decode as an analytics payload falls through
/// to the defaults, same as a query that never succeeded.
pub fn merge_snapshot(
    snapshot: &QuerySnapshot,
    defaults: &AnalyticsDefaults,
    reference: DateTime<Utc>,
) -> AnalyticsView {
    let live: Option<PerformanceAnalytics> = snapshot.decode();
    merge(live.as_ref(), defaults, reference)
}

fn pick_series<T: Clone>(live: Option<&Vec<T>>, default: Option<&Vec<T>>) -> Option<Vec<T>> {
    live.filter(|series| !series.is_empty())
        .or(default.filter(|series| !series.is_empty()))
        .cloned()
}

// Rates are reported to one decimal place, matching the analytics endpoint.
fn round_rate(rate: f64) -> f64 {
    (rate * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap()
    }

    fn live_sample() -> PerformanceAnalytics {
        PerformanceAnalytics {
            delivery_rate: 95.5,
            total_delivered: 100,
            total_failed: 4,
            daily_volumes: vec![DailyVolume {
                date: "2026-08-25".into(),
                volume: 40,
            }],
            monthly_trends: vec![MonthlyTrend {
                month: "Aug".into(),
                delivered: 100,
                failed: 4,
            }],
            hourly_volumes: vec![HourlyVolume {
                time: "08:00".into(),
                volume: 12,
            }],
        }
    }

    #[test]
    fn test_live_wins_over_defaults() {
        let defaults = AnalyticsDefaults {
            total_delivered: Some(42),
            ..AnalyticsDefaults::default()
        };
        let view = merge(Some(&live_sample()), &defaults, reference());
        assert_eq!(view.total_delivered, 100);
    }

    #[test]
    fn test_default_used_without_live_data() {
        let defaults = AnalyticsDefaults {
            total_delivered: Some(42),
            ..AnalyticsDefaults::default()
        };
        let view = merge(None, &defaults, reference());
        assert_eq!(view.total_delivered, 42);
    }

    #[test]
    fn test_placeholder_zero_without_live_or_default() {
        let view = merge(None, &AnalyticsDefaults::default(), reference());
        assert_eq!(view.total_delivered, 0);
        assert_eq!(view.total_failed, 0);
        assert_eq!(view.delivery_rate, 0.0);
        assert_eq!(view.failure_rate, 0.0);
        assert_eq!(view.total_processed, 0);
    }

    #[test]
    fn test_failure_rate_derivation() {
        let live = PerformanceAnalytics {
            delivery_rate: 80.0,
            total_delivered: 80,
            total_failed: 20,
            daily_volumes: vec![],
            monthly_trends: vec![],
            hourly_volumes: vec![],
        };
        let view = merge(Some(&live), &AnalyticsDefaults::default(), reference());
        assert_eq!(view.total_processed, 100);
        assert_eq!(view.failure_rate, 20.0);
    }

    #[test]
    fn test_failure_rate_zero_division_guard() {
        let view = merge(None, &AnalyticsDefaults::default(), reference());
        assert_eq!(view.failure_rate, 0.0);
    }

    #[test]
    fn test_placeholder_series_are_fixed_length_and_labeled() {
        let view = merge(None, &AnalyticsDefaults::default(), reference());

        assert_eq!(view.daily_volumes.len(), 7);
        assert_eq!(view.daily_volumes.first().unwrap().date, "2026-08-19");
        assert_eq!(view.daily_volumes.last().unwrap().date, "2026-08-25");

        assert_eq!(view.monthly_trends.len(), 6);
        let months: Vec<&str> = view.monthly_trends.iter().map(|t| t.month.as_str()).collect();
        assert_eq!(months, vec!["Mar", "Apr", "May", "Jun", "Jul", "Aug"]);

        assert_eq!(view.hourly_volumes.len(), 6);
        let times: Vec<&str> = view.hourly_volumes.iter().map(|h| h.time.as_str()).collect();
        assert_eq!(
            times,
            vec!["00:00", "04:00", "08:00", "12:00", "16:00", "20:00"]
        );

        // Every placeholder value is a defined zero.
        assert!(view.daily_volumes.iter().all(|d| d.volume == 0));
        assert!(view.hourly_volumes.iter().all(|h| h.volume == 0));
    }

    #[test]
    fn test_month_labels_wrap_year_boundary() {
        let january = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let trends = zero_monthly_trends(january);
        let months: Vec<&str> = trends.iter().map(|t| t.month.as_str()).collect();
        assert_eq!(months, vec!["Aug", "Sep", "Oct", "Nov", "Dec", "Jan"]);
    }

    #[test]
    fn test_empty_live_series_falls_through() {
        let live = PerformanceAnalytics {
            delivery_rate: 100.0,
            total_delivered: 1,
            total_failed: 0,
            daily_volumes: vec![],
            monthly_trends: vec![],
            hourly_volumes: vec![],
        };
        let view = merge(Some(&live), &AnalyticsDefaults::default(), reference());
        assert_eq!(view.daily_volumes.len(), 7);
        assert_eq!(view.monthly_trends.len(), 6);
        assert_eq!(view.hourly_volumes.len(), 6);
    }

    #[test]
    fn test_delivery_split_mirrors_merged_scalars() {
        let view = merge(Some(&live_sample()), &AnalyticsDefaults::default(), reference());
        assert_eq!(
            view.delivery_split,
            vec![
                DeliverySlice {
                    label: "Delivered",
                    value: 100
                },
                DeliverySlice {
                    label: "Failed",
                    value: 4
                },
            ]
        );
    }

    #[test]
    fn test_live_payload_decodes_from_endpoint_shape() {
        let payload = serde_json::json!({
            "delivery_rate": 97.2,
            "total_delivered": 350,
            "total_failed": 10,
            "daily_volumes": [{"date": "2026-08-25", "volume": 50}],
            "monthly_trends": [{"month": "Aug", "delivered": 350, "failed": 10}],
            "hourly_volumes": [{"time": "00:00", "volume": 3}]
        });
        let live: PerformanceAnalytics = serde_json::from_value(payload).unwrap();
        assert_eq!(live.total_delivered, 350);
        assert_eq!(live.monthly_trends[0].month, "Aug");
    }
}
