//! Per-day chart series and the anomaly detector.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::ordering::parse_timestamp;
use crate::record::{Alert, DietRecord, PoopRecord, Severity, WalkRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    #[default]
    Week,
    Month,
}

impl Period {
    pub fn days(self) -> i64 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "week" | "7" => Some(Self::Week),
            "month" | "30" => Some(Self::Month),
            _ => None,
        }
    }

    /// Calendar days covered, oldest first, ending with today.
    fn dates(self, now: DateTime<Utc>) -> Vec<NaiveDate> {
        let today = now.date_naive();
        (0..self.days())
            .rev()
            .map(|back| today - Duration::days(back))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyValue {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBand {
    Good,
    Fair,
    Poor,
}

impl ScoreBand {
    pub fn of(score: f64) -> Self {
        if score >= 4.0 {
            Self::Good
        } else if score >= 3.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyScore {
    pub date: NaiveDate,
    pub average: f64,
    pub count: usize,
    pub band: ScoreBand,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WalkSummary {
    pub walks: usize,
    /// Kilometres.
    pub total_distance: f64,
    pub total_minutes: i64,
}

fn day_of(raw: &str) -> Option<NaiveDate> {
    parse_timestamp(raw).map(|ts| ts.date_naive())
}

/// Calories per day over `period`, zero-filled. A record without a
/// calorie value counts one calorie per gram.
pub fn daily_calories(diets: &[DietRecord], period: Period, now: DateTime<Utc>) -> Vec<DailyValue> {
    period
        .dates(now)
        .into_iter()
        .map(|date| {
            let value = diets
                .iter()
                .filter(|d| day_of(&d.feed_time) == Some(date))
                .map(|d| d.calories.unwrap_or(d.amount))
                .sum();
            DailyValue { date, value }
        })
        .collect()
}

/// Average health score per day over `period`. Days without records are
/// left out.
pub fn daily_poop_scores(poops: &[PoopRecord], period: Period, now: DateTime<Utc>) -> Vec<DailyScore> {
    period
        .dates(now)
        .into_iter()
        .filter_map(|date| {
            let scores: Vec<f64> = poops
                .iter()
                .filter(|p| day_of(&p.poop_time) == Some(date))
                .map(|p| f64::from(p.health_score))
                .collect();
            if scores.is_empty() {
                return None;
            }
            let average = scores.iter().sum::<f64>() / scores.len() as f64;
            Some(DailyScore {
                date,
                average,
                count: scores.len(),
                band: ScoreBand::of(average),
            })
        })
        .collect()
}

pub fn walk_summary(walks: &[WalkRecord], period: Period, now: DateTime<Utc>) -> WalkSummary {
    let since = now - Duration::days(period.days());
    walks
        .iter()
        .filter(|w| parse_timestamp(&w.start_time).is_some_and(|ts| ts >= since && ts <= now))
        .fold(WalkSummary::default(), |mut acc, w| {
            acc.walks += 1;
            acc.total_distance += w.distance;
            acc.total_minutes += w.duration_minutes().unwrap_or(0).max(0);
            acc
        })
}

/// Walk distance for one Sunday-starting week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyDistance {
    pub week_start: NaiveDate,
    /// Kilometres.
    pub distance: f64,
}

/// Weeks shown on the walk chart.
pub const CHART_WEEKS: usize = 4;

/// Total distance per week for the latest `weeks` weeks that have walks,
/// oldest first. Weeks start on Sunday.
pub fn weekly_walk_distance(walks: &[WalkRecord], weeks: usize) -> Vec<WeeklyDistance> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for walk in walks {
        let Some(day) = day_of(&walk.start_time) else {
            continue;
        };
        let week_start = day - Duration::days(i64::from(day.weekday().num_days_from_sunday()));
        *totals.entry(week_start).or_default() += walk.distance;
    }
    let skip = totals.len().saturating_sub(weeks);
    totals
        .into_iter()
        .skip(skip)
        .map(|(week_start, distance)| WeeklyDistance {
            week_start,
            distance,
        })
        .collect()
}

// ============================================================================
// Health context
// ============================================================================

/// Records considered "recent" by the assistant.
pub const RECENT_RECORDS: usize = 7;

/// Summary of the most recent logs, given to the assistant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthContext {
    pub diet_count: usize,
    /// Grams per meal.
    pub avg_amount: f64,
    pub poop_count: usize,
    pub avg_score: f64,
    pub low_score_count: usize,
    pub walk_count: usize,
    pub total_distance: f64,
    pub total_minutes: i64,
}

fn average(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

impl HealthContext {
    /// Built from logs sorted newest first; only the first
    /// [`RECENT_RECORDS`] of each are counted.
    pub fn from_recent(diets: &[DietRecord], poops: &[PoopRecord], walks: &[WalkRecord]) -> Self {
        let diets = &diets[..diets.len().min(RECENT_RECORDS)];
        let poops = &poops[..poops.len().min(RECENT_RECORDS)];
        let walks = &walks[..walks.len().min(RECENT_RECORDS)];
        Self {
            diet_count: diets.len(),
            avg_amount: average(diets.iter().map(|d| d.amount)),
            poop_count: poops.len(),
            avg_score: average(poops.iter().map(|p| f64::from(p.health_score))),
            low_score_count: poops.iter().filter(|p| p.is_abnormal()).count(),
            walk_count: walks.len(),
            total_distance: walks.iter().map(|w| w.distance).sum(),
            total_minutes: walks
                .iter()
                .map(|w| w.duration_minutes().unwrap_or(0).max(0))
                .sum(),
        }
    }
}

pub const LOW_INTAKE_GRAMS: f64 = 100.0;
pub const LOW_EXERCISE_MINUTES: i64 = 60;

/// Plain-language concerns from the latest logs (newest first). Empty
/// means nothing stands out.
pub fn health_concerns(
    diets: &[DietRecord],
    poops: &[PoopRecord],
    walks: &[WalkRecord],
) -> Vec<String> {
    let ctx = HealthContext::from_recent(diets, poops, walks);
    let mut concerns = Vec::new();
    if ctx.diet_count > 0 && ctx.avg_amount < LOW_INTAKE_GRAMS {
        concerns.push("最近饮食量偏少，建议增加喂食量".to_string());
    }
    if poops.len() >= 2 && poops[..2].iter().all(PoopRecord::is_abnormal) {
        concerns.push("连续两次便便健康评分较低，建议关注饮食和健康状况".to_string());
    }
    if ctx.walk_count > 0 && ctx.total_minutes < LOW_EXERCISE_MINUTES {
        concerns.push("最近运动量偏少，建议增加遛狗频率".to_string());
    }
    concerns
}

// ============================================================================
// Anomaly detection
// ============================================================================

pub const ABNORMAL_POOP: &str = "abnormal_poop";
pub const MISSED_MEAL: &str = "missed_meal";
pub const NO_WALK: &str = "no_walk";

fn within(raw: &str, now: DateTime<Utc>, window: Duration) -> bool {
    parse_timestamp(raw).is_some_and(|ts| ts <= now && now - ts <= window)
}

/// Alerts implied by the current logs. Alerts are returned unsaved, highest
/// severity first.
pub fn detect_anomalies(
    diets: &[DietRecord],
    poops: &[PoopRecord],
    walks: &[WalkRecord],
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let alert = |alert_type: &str, severity: Severity, message: String| Alert {
        alert_type: alert_type.to_string(),
        message,
        severity,
        created_at: now.to_rfc3339(),
        ..Default::default()
    };
    let mut alerts = Vec::new();

    let abnormal = poops
        .iter()
        .filter(|p| p.is_abnormal() && within(&p.poop_time, now, Duration::days(3)))
        .count();
    if abnormal > 0 {
        alerts.push(alert(
            ABNORMAL_POOP,
            Severity::High,
            format!("最近 3 天有 {abnormal} 次便便健康评分偏低，请留意肠胃状况"),
        ));
    }

    if !diets.iter().any(|d| within(&d.feed_time, now, Duration::hours(24))) {
        alerts.push(alert(
            MISSED_MEAL,
            Severity::Medium,
            "超过 24 小时没有饮食记录".to_string(),
        ));
    }

    if !walks.iter().any(|w| within(&w.start_time, now, Duration::days(3))) {
        alerts.push(alert(
            NO_WALK,
            Severity::Low,
            "已经 3 天没有遛狗了".to_string(),
        ));
    }

    alerts
}
