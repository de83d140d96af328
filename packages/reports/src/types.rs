use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Report template family. Drives the default section plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum ReportFormat {
    Briefing,
    StrategicOverview,
    QuarterlyReview,
    BoardPack,
    CrisisRetrospective,
}

impl Default for ReportFormat {
    fn default() -> Self {
        ReportFormat::Briefing
    }
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Briefing => "briefing",
            ReportFormat::StrategicOverview => "strategic_overview",
            ReportFormat::QuarterlyReview => "quarterly_review",
            ReportFormat::BoardPack => "board_pack",
            ReportFormat::CrisisRetrospective => "crisis_retrospective",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who the report is written for. Shifts tone and emphasis in prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum ReportAudience {
    Executive,
    Board,
    Investors,
    PrTeam,
    AllHands,
}

impl Default for ReportAudience {
    fn default() -> Self {
        ReportAudience::Executive
    }
}

impl ReportAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportAudience::Executive => "executive",
            ReportAudience::Board => "board",
            ReportAudience::Investors => "investors",
            ReportAudience::PrTeam => "pr_team",
            ReportAudience::AllHands => "all_hands",
        }
    }
}

/// Workflow states. Transitions are validated by [`ReportStatus::can_transition`];
/// everything else about the machine lives in the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Generating,
    GenerationFailed,
    Review,
    Approved,
    Published,
    Archived,
}

impl Default for ReportStatus {
    fn default() -> Self {
        ReportStatus::Draft
    }
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 7] = [
        ReportStatus::Draft,
        ReportStatus::Generating,
        ReportStatus::GenerationFailed,
        ReportStatus::Review,
        ReportStatus::Approved,
        ReportStatus::Published,
        ReportStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Draft => "draft",
            ReportStatus::Generating => "generating",
            ReportStatus::GenerationFailed => "generation_failed",
            ReportStatus::Review => "review",
            ReportStatus::Approved => "approved",
            ReportStatus::Published => "published",
            ReportStatus::Archived => "archived",
        }
    }

    /// The full transition matrix. Archive is reachable from any state
    /// (and is terminal); generation can be retried after a failure.
    pub fn can_transition(&self, to: ReportStatus) -> bool {
        use ReportStatus::*;
        if self == &to {
            return false;
        }
        match (self, to) {
            (_, Archived) => *self != Archived,
            (Draft, Generating) => true,
            (GenerationFailed, Generating) => true,
            (Generating, Review) => true,
            (Generating, GenerationFailed) => true,
            (Review, Approved) => true,
            (Approved, Published) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Voice for generated prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Tone {
    Neutral,
    Confident,
    Cautious,
}

impl Default for Tone {
    fn default() -> Self {
        Tone::Neutral
    }
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Neutral => "neutral",
            Tone::Confident => "confident",
            Tone::Cautious => "cautious",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TargetLength {
    Brief,
    Standard,
    Deep,
}

impl Default for TargetLength {
    fn default() -> Self {
        TargetLength::Standard
    }
}

impl TargetLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetLength::Brief => "brief",
            TargetLength::Standard => "standard",
            TargetLength::Deep => "deep",
        }
    }

    /// Rough per-section word budget handed to the prompt.
    pub fn word_budget(&self) -> u32 {
        match self {
            TargetLength::Brief => 150,
            TargetLength::Standard => 350,
            TargetLength::Deep => 700,
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            TargetLength::Brief => 1024,
            TargetLength::Standard => 2048,
            TargetLength::Deep => 4096,
        }
    }
}

/// An executive report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    #[serde(rename = "orgId")]
    pub org_id: String,
    pub title: String,
    pub description: Option<String>,
    pub format: ReportFormat,
    pub audience: ReportAudience,
    #[serde(default)]
    pub status: ReportStatus,
    #[serde(rename = "periodStart")]
    pub period_start: Option<DateTime<Utc>>,
    #[serde(rename = "periodEnd")]
    pub period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tone: Tone,
    #[serde(rename = "targetLength", default)]
    pub target_length: TargetLength,
    #[serde(rename = "includeRecommendations")]
    pub include_recommendations: bool,
    #[serde(rename = "includeMetrics")]
    pub include_metrics: bool,
    #[serde(rename = "includeSources")]
    pub include_sources: bool,
    pub summary: Option<String>,
    #[serde(rename = "kpiSnapshot", skip_serializing_if = "Option::is_none")]
    pub kpi_snapshot: Option<serde_json::Value>,
    #[serde(rename = "insightsRefreshedAt")]
    pub insights_refreshed_at: Option<DateTime<Utc>>,
    #[serde(rename = "approvedBy")]
    pub approved_by: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdBy")]
    pub created_by: Option<String>,
    #[serde(rename = "updatedBy")]
    pub updated_by: Option<String>,
    /// Bumped on every write; the transition CAS keys on status, the
    /// version makes lost updates visible to clients.
    pub version: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportCreateInput {
    pub title: String,
    pub description: Option<String>,
    pub format: Option<ReportFormat>,
    pub audience: Option<ReportAudience>,
    #[serde(rename = "periodStart")]
    pub period_start: Option<DateTime<Utc>>,
    #[serde(rename = "periodEnd")]
    pub period_end: Option<DateTime<Utc>>,
    pub tone: Option<Tone>,
    #[serde(rename = "targetLength")]
    pub target_length: Option<TargetLength>,
    #[serde(rename = "includeRecommendations")]
    pub include_recommendations: Option<bool>,
    #[serde(rename = "includeMetrics")]
    pub include_metrics: Option<bool>,
    #[serde(rename = "includeSources")]
    pub include_sources: Option<bool>,
}

/// Patchable fields. Status is deliberately absent: workflow
/// transitions go through the dedicated manager operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportUpdateInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub format: Option<ReportFormat>,
    pub audience: Option<ReportAudience>,
    #[serde(rename = "periodStart")]
    pub period_start: Option<DateTime<Utc>>,
    #[serde(rename = "periodEnd")]
    pub period_end: Option<DateTime<Utc>>,
    pub tone: Option<Tone>,
    #[serde(rename = "targetLength")]
    pub target_length: Option<TargetLength>,
    #[serde(rename = "includeRecommendations")]
    pub include_recommendations: Option<bool>,
    #[serde(rename = "includeMetrics")]
    pub include_metrics: Option<bool>,
    #[serde(rename = "includeSources")]
    pub include_sources: Option<bool>,
    pub summary: Option<String>,
}

impl ReportUpdateInput {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.format.is_none()
            && self.audience.is_none()
            && self.period_start.is_none()
            && self.period_end.is_none()
            && self.tone.is_none()
            && self.target_length.is_none()
            && self.include_recommendations.is_none()
            && self.include_metrics.is_none()
            && self.include_sources.is_none()
            && self.summary.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSortKey {
    CreatedAt,
    UpdatedAt,
    Title,
}

impl ReportSortKey {
    fn column(&self) -> &'static str {
        match self {
            ReportSortKey::CreatedAt => "created_at",
            ReportSortKey::UpdatedAt => "updated_at",
            ReportSortKey::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Listing filters, AND-composed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub format: Option<ReportFormat>,
    pub audience: Option<ReportAudience>,
    /// Matches reports whose period overlaps `[from, to]`.
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<ReportSortKey>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<SortOrder>,
}

impl ReportFilter {
    /// ORDER BY clause from the whitelisted sort keys.
    pub(crate) fn order_clause(&self) -> String {
        let column = self.sort_by.unwrap_or(ReportSortKey::UpdatedAt).column();
        let direction = match self.sort_order.unwrap_or(SortOrder::Desc) {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        format!("{} {}", column, direction)
    }
}
