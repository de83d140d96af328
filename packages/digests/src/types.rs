// ABOUTME: Digest vocabulary types: schedules, recipients, delivery records, stats
// ABOUTME: The digest is a delivery shell; content assembly and dispatch live elsewhere

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// How often a digest goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DeliveryPeriod {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl DeliveryPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryPeriod::Daily => "daily",
            DeliveryPeriod::Weekly => "weekly",
            DeliveryPeriod::Biweekly => "biweekly",
            DeliveryPeriod::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(DeliveryPeriod::Daily),
            "weekly" => Some(DeliveryPeriod::Weekly),
            "biweekly" => Some(DeliveryPeriod::Biweekly),
            "monthly" => Some(DeliveryPeriod::Monthly),
            _ => None,
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            DeliveryPeriod::Daily => 1,
            DeliveryPeriod::Weekly => 7,
            DeliveryPeriod::Biweekly => 14,
            DeliveryPeriod::Monthly => 30,
        }
    }

    /// Next delivery instant after `from`: one period out, anchored at
    /// `schedule_hour` UTC so deliveries stay on the hour.
    pub fn next_after(&self, from: DateTime<Utc>, schedule_hour: u8) -> DateTime<Utc> {
        let day = (from + Duration::days(self.days())).date_naive();
        let time = NaiveTime::from_hms_opt(u32::from(schedule_hour), 0, 0)
            .unwrap_or(NaiveTime::MIN);
        Utc.from_utc_datetime(&day.and_time(time))
    }
}

impl Default for DeliveryPeriod {
    fn default() -> Self {
        DeliveryPeriod::Weekly
    }
}

impl std::fmt::Display for DeliveryPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lookback window the digest content covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum TimeWindow {
    #[serde(rename = "24h")]
    #[sqlx(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    #[sqlx(rename = "7d")]
    Week,
    #[serde(rename = "14d")]
    #[sqlx(rename = "14d")]
    Fortnight,
    #[serde(rename = "30d")]
    #[sqlx(rename = "30d")]
    Month,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Day => "24h",
            TimeWindow::Week => "7d",
            TimeWindow::Fortnight => "14d",
            TimeWindow::Month => "30d",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "24h" => Some(TimeWindow::Day),
            "7d" => Some(TimeWindow::Week),
            "14d" => Some(TimeWindow::Fortnight),
            "30d" => Some(TimeWindow::Month),
            _ => None,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Day => Duration::hours(24),
            TimeWindow::Week => Duration::days(7),
            TimeWindow::Fortnight => Duration::days(14),
            TimeWindow::Month => Duration::days(30),
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::Week
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DigestStatus {
    Active,
    Paused,
    Archived,
}

impl DigestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestStatus::Active => "active",
            DigestStatus::Paused => "paused",
            DigestStatus::Archived => "archived",
        }
    }
}

impl std::fmt::Display for DigestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recipient validation state. Confirmation and bounce handling are the
/// mail system's job; we only store what it reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Confirmed,
    Bounced,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Confirmed => "confirmed",
            RecipientStatus::Bounced => "bounced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// A scheduled, recipient-addressed summary. The shell holds the roster
/// and the schedule; dispatch is an external scheduler's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub id: String,
    #[serde(rename = "orgId")]
    pub org_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "deliveryPeriod")]
    pub delivery_period: DeliveryPeriod,
    #[serde(rename = "timeWindow")]
    pub time_window: TimeWindow,
    #[serde(rename = "scheduleHour")]
    pub schedule_hour: i64,
    #[serde(rename = "includeRecommendations")]
    pub include_recommendations: bool,
    pub status: DigestStatus,
    #[serde(rename = "nextDeliveryAt", skip_serializing_if = "Option::is_none")]
    pub next_delivery_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastDeliveryAt", skip_serializing_if = "Option::is_none")]
    pub last_delivery_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdBy", skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    #[serde(rename = "digestId")]
    pub digest_id: String,
    #[serde(rename = "orgId")]
    pub org_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "includePdf")]
    pub include_pdf: bool,
    #[serde(rename = "includeInlineSummary")]
    pub include_inline_summary: bool,
    pub status: RecipientStatus,
    #[serde(rename = "addedAt")]
    pub added_at: DateTime<Utc>,
}

/// One completed dispatch attempt, reported back by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    #[serde(rename = "digestId")]
    pub digest_id: String,
    #[serde(rename = "orgId")]
    pub org_id: String,
    pub status: DeliveryStatus,
    #[serde(rename = "recipientCount")]
    pub recipient_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "deliveredAt")]
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DigestCreateInput {
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "deliveryPeriod")]
    pub delivery_period: Option<DeliveryPeriod>,
    #[serde(rename = "timeWindow")]
    pub time_window: Option<TimeWindow>,
    #[serde(rename = "scheduleHour")]
    pub schedule_hour: Option<i64>,
    #[serde(rename = "includeRecommendations")]
    pub include_recommendations: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DigestUpdateInput {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "deliveryPeriod")]
    pub delivery_period: Option<DeliveryPeriod>,
    #[serde(rename = "timeWindow")]
    pub time_window: Option<TimeWindow>,
    #[serde(rename = "scheduleHour")]
    pub schedule_hour: Option<i64>,
    #[serde(rename = "includeRecommendations")]
    pub include_recommendations: Option<bool>,
    pub status: Option<DigestStatus>,
}

impl DigestUpdateInput {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.delivery_period.is_none()
            && self.time_window.is_none()
            && self.schedule_hour.is_none()
            && self.include_recommendations.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipientInput {
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "includePdf")]
    pub include_pdf: Option<bool>,
    #[serde(rename = "includeInlineSummary")]
    pub include_inline_summary: Option<bool>,
}

/// Scheduler callback payload after a dispatch attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    #[serde(rename = "recipientCount", default)]
    pub recipient_count: i64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DigestFilter {
    pub status: Option<DigestStatus>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Org-wide aggregate counts. `Default` is the zeroed struct the degraded
/// path returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DigestStats {
    #[serde(rename = "totalDigests")]
    pub total_digests: i64,
    #[serde(rename = "activeDigests")]
    pub active_digests: i64,
    #[serde(rename = "totalDeliveries")]
    pub total_deliveries: i64,
    #[serde(rename = "successfulDeliveries")]
    pub successful_deliveries: i64,
    #[serde(rename = "totalRecipients")]
    pub total_recipients: i64,
    #[serde(rename = "activeRecipients")]
    pub active_recipients: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_period_round_trips() {
        for period in [
            DeliveryPeriod::Daily,
            DeliveryPeriod::Weekly,
            DeliveryPeriod::Biweekly,
            DeliveryPeriod::Monthly,
        ] {
            assert_eq!(DeliveryPeriod::parse(period.as_str()), Some(period));
        }
        assert_eq!(DeliveryPeriod::parse("fortnightly"), None);
    }

    #[test]
    fn test_window_round_trips() {
        for window in [
            TimeWindow::Day,
            TimeWindow::Week,
            TimeWindow::Fortnight,
            TimeWindow::Month,
        ] {
            assert_eq!(TimeWindow::parse(window.as_str()), Some(window));
        }
        assert_eq!(TimeWindow::parse("90d"), None);
    }

    #[test]
    fn test_next_after_anchors_at_schedule_hour() {
        let from = Utc.with_ymd_and_hms(2025, 3, 10, 14, 37, 12).unwrap();

        let next = DeliveryPeriod::Weekly.next_after(from, 8);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 17, 8, 0, 0).unwrap());

        let next = DeliveryPeriod::Daily.next_after(from, 0);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_update_input_is_empty() {
        assert!(DigestUpdateInput::default().is_empty());
        let input = DigestUpdateInput {
            status: Some(DigestStatus::Paused),
            ..Default::default()
        };
        assert!(!input.is_empty());
    }
}
