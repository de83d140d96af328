// ABOUTME: Insight snapshot and aggregation type definitions
// ABOUTME: Structures for feed snapshots, risk levels, and the seven subsystem blocks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream feed a snapshot came from. One variant per connected system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum SourceSystem {
    MediaMonitoring,
    SocialListening,
    PressReleases,
    CompetitiveIntel,
    CrisisDetection,
    BrandHealth,
    SentimentAnalysis,
    InvestorRelations,
    AnalystCoverage,
    RegulatoryWatch,
    Governance,
    ExecutiveMetrics,
    CampaignPerformance,
    WebAnalytics,
    NewsletterMetrics,
    EventTracking,
    InfluencerTracking,
    InternalComms,
}

impl SourceSystem {
    pub const ALL: [SourceSystem; 18] = [
        SourceSystem::MediaMonitoring,
        SourceSystem::SocialListening,
        SourceSystem::PressReleases,
        SourceSystem::CompetitiveIntel,
        SourceSystem::CrisisDetection,
        SourceSystem::BrandHealth,
        SourceSystem::SentimentAnalysis,
        SourceSystem::InvestorRelations,
        SourceSystem::AnalystCoverage,
        SourceSystem::RegulatoryWatch,
        SourceSystem::Governance,
        SourceSystem::ExecutiveMetrics,
        SourceSystem::CampaignPerformance,
        SourceSystem::WebAnalytics,
        SourceSystem::NewsletterMetrics,
        SourceSystem::EventTracking,
        SourceSystem::InfluencerTracking,
        SourceSystem::InternalComms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::MediaMonitoring => "media_monitoring",
            SourceSystem::SocialListening => "social_listening",
            SourceSystem::PressReleases => "press_releases",
            SourceSystem::CompetitiveIntel => "competitive_intel",
            SourceSystem::CrisisDetection => "crisis_detection",
            SourceSystem::BrandHealth => "brand_health",
            SourceSystem::SentimentAnalysis => "sentiment_analysis",
            SourceSystem::InvestorRelations => "investor_relations",
            SourceSystem::AnalystCoverage => "analyst_coverage",
            SourceSystem::RegulatoryWatch => "regulatory_watch",
            SourceSystem::Governance => "governance",
            SourceSystem::ExecutiveMetrics => "executive_metrics",
            SourceSystem::CampaignPerformance => "campaign_performance",
            SourceSystem::WebAnalytics => "web_analytics",
            SourceSystem::NewsletterMetrics => "newsletter_metrics",
            SourceSystem::EventTracking => "event_tracking",
            SourceSystem::InfluencerTracking => "influencer_tracking",
            SourceSystem::InternalComms => "internal_comms",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|sys| sys.as_str() == s)
    }
}

impl std::fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered so `max()` picks the most severe level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(RiskLevel::Low),
            "moderate" => Some(RiskLevel::Moderate),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One observation captured from an upstream feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightSnapshot {
    pub id: String,
    #[serde(rename = "orgId")]
    pub org_id: String,
    pub system: SourceSystem,
    #[serde(rename = "sourceRef")]
    pub source_ref: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "riskLevel", skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(rename = "relevanceScore")]
    pub relevance_score: f64,
    #[serde(rename = "qualityScore")]
    pub quality_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Value>,
    #[serde(rename = "capturedAt")]
    pub captured_at: DateTime<Utc>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotCreateInput {
    pub system: SourceSystem,
    #[serde(rename = "sourceRef")]
    pub source_ref: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(rename = "riskLevel", default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(rename = "relevanceScore", default)]
    pub relevance_score: Option<f64>,
    #[serde(rename = "qualityScore", default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
    #[serde(rename = "capturedAt", default)]
    pub captured_at: Option<DateTime<Utc>>,
}

/// The `system` placeholder is meaningless on its own; construction
/// sites using struct-update syntax always override it.
impl Default for SnapshotCreateInput {
    fn default() -> Self {
        SnapshotCreateInput {
            system: SourceSystem::MediaMonitoring,
            source_ref: String::new(),
            title: String::new(),
            summary: None,
            risk_level: None,
            relevance_score: None,
            quality_score: None,
            metrics: None,
            captured_at: None,
        }
    }
}

/// Risk radar listing filters. All filters are equality / range matches
/// combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotFilter {
    pub system: Option<SourceSystem>,
    #[serde(rename = "riskLevel")]
    pub risk_level: Option<RiskLevel>,
    #[serde(rename = "capturedFrom", alias = "from")]
    pub captured_from: Option<DateTime<Utc>>,
    #[serde(rename = "capturedTo", alias = "to")]
    pub captured_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Digest of one subsystem over the reporting window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemInsight {
    pub system: SourceSystem,
    pub headline: String,
    pub highlights: Vec<String>,
    #[serde(rename = "topRisk", skip_serializing_if = "Option::is_none")]
    pub top_risk: Option<RiskLevel>,
    #[serde(rename = "snapshotCount")]
    pub snapshot_count: i64,
    #[serde(rename = "avgRelevance")]
    pub avg_relevance: f64,
}

/// Everything the section generator needs, grouped into the seven
/// blocks the report templates reference. A block with no snapshots in
/// the window (or whose query failed) is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedInsights {
    #[serde(rename = "mediaPerformance", skip_serializing_if = "Option::is_none")]
    pub media_performance: Option<SubsystemInsight>,
    #[serde(rename = "competitiveIntel", skip_serializing_if = "Option::is_none")]
    pub competitive_intel: Option<SubsystemInsight>,
    #[serde(rename = "crisisStatus", skip_serializing_if = "Option::is_none")]
    pub crisis_status: Option<SubsystemInsight>,
    #[serde(rename = "brandHealth", skip_serializing_if = "Option::is_none")]
    pub brand_health: Option<SubsystemInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub governance: Option<SubsystemInsight>,
    #[serde(rename = "investorSentiment", skip_serializing_if = "Option::is_none")]
    pub investor_sentiment: Option<SubsystemInsight>,
    #[serde(rename = "executiveMetrics", skip_serializing_if = "Option::is_none")]
    pub executive_metrics: Option<SubsystemInsight>,
    #[serde(rename = "refreshedAt")]
    pub refreshed_at: DateTime<Utc>,
}

impl AggregatedInsights {
    pub fn blocks(&self) -> impl Iterator<Item = &SubsystemInsight> {
        [
            self.media_performance.as_ref(),
            self.competitive_intel.as_ref(),
            self.crisis_status.as_ref(),
            self.brand_health.as_ref(),
            self.governance.as_ref(),
            self.investor_sentiment.as_ref(),
            self.executive_metrics.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Most severe risk across all populated blocks.
    pub fn top_risk(&self) -> Option<RiskLevel> {
        self.blocks().filter_map(|b| b.top_risk).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_system_round_trip() {
        for system in SourceSystem::ALL {
            assert_eq!(SourceSystem::parse(system.as_str()), Some(system));
        }
        assert_eq!(SourceSystem::parse("carrier_pigeon"), None);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Moderate);
        assert!(RiskLevel::Moderate > RiskLevel::Low);
        assert_eq!(
            [RiskLevel::Moderate, RiskLevel::Critical, RiskLevel::Low]
                .into_iter()
                .max(),
            Some(RiskLevel::Critical)
        );
    }

    #[test]
    fn test_serde_uses_snake_case_values() {
        let json = serde_json::to_string(&SourceSystem::MediaMonitoring).unwrap();
        assert_eq!(json, "\"media_monitoring\"");

        let parsed: RiskLevel = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(parsed, RiskLevel::Critical);
    }

    #[test]
    fn test_aggregated_top_risk_spans_blocks() {
        let block = |system, risk| SubsystemInsight {
            system,
            headline: "h".to_string(),
            highlights: vec![],
            top_risk: risk,
            snapshot_count: 1,
            avg_relevance: 0.5,
        };

        let insights = AggregatedInsights {
            media_performance: Some(block(SourceSystem::MediaMonitoring, Some(RiskLevel::Low))),
            competitive_intel: None,
            crisis_status: Some(block(SourceSystem::CrisisDetection, Some(RiskLevel::High))),
            brand_health: Some(block(SourceSystem::BrandHealth, None)),
            governance: None,
            investor_sentiment: None,
            executive_metrics: None,
            refreshed_at: Utc::now(),
        };

        assert_eq!(insights.top_risk(), Some(RiskLevel::High));
        assert_eq!(insights.blocks().count(), 3);
    }
}
