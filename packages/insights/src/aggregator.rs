// ABOUTME: Windowed aggregation of snapshots into the seven subsystem blocks
// ABOUTME: Block failures degrade to None so one bad feed never blocks a refresh

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::SnapshotStorage;
use crate::types::{AggregatedInsights, InsightSnapshot, SourceSystem, SubsystemInsight};

/// Snapshots considered per block, most relevant first.
const BLOCK_LIMIT: i64 = 100;
const HIGHLIGHT_COUNT: usize = 5;
const SOURCES_PER_BLOCK: usize = 3;

const MEDIA_SYSTEMS: &[SourceSystem] = &[
    SourceSystem::MediaMonitoring,
    SourceSystem::SocialListening,
    SourceSystem::PressReleases,
    SourceSystem::CampaignPerformance,
    SourceSystem::WebAnalytics,
    SourceSystem::NewsletterMetrics,
    SourceSystem::InfluencerTracking,
    SourceSystem::EventTracking,
];
const COMPETITIVE_SYSTEMS: &[SourceSystem] = &[
    SourceSystem::CompetitiveIntel,
    SourceSystem::AnalystCoverage,
];
const CRISIS_SYSTEMS: &[SourceSystem] = &[
    SourceSystem::CrisisDetection,
    SourceSystem::RegulatoryWatch,
];
const BRAND_SYSTEMS: &[SourceSystem] = &[
    SourceSystem::BrandHealth,
    SourceSystem::SentimentAnalysis,
];
const GOVERNANCE_SYSTEMS: &[SourceSystem] =
    &[SourceSystem::Governance, SourceSystem::InternalComms];
const INVESTOR_SYSTEMS: &[SourceSystem] = &[SourceSystem::InvestorRelations];
const EXECUTIVE_SYSTEMS: &[SourceSystem] = &[SourceSystem::ExecutiveMetrics];

/// A snapshot picked for attachment to a report as a cited source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub system: SourceSystem,
    #[serde(rename = "sourceRef")]
    pub source_ref: String,
    #[serde(rename = "relevanceScore")]
    pub relevance_score: f64,
    #[serde(rename = "qualityScore")]
    pub quality_score: f64,
    #[serde(rename = "isPrimary")]
    pub is_primary: bool,
}

#[derive(Debug)]
pub struct AggregationOutcome {
    pub insights: AggregatedInsights,
    pub sources: Vec<SourceCandidate>,
    /// Block labels whose queries failed this run.
    pub failed_blocks: Vec<&'static str>,
}

pub struct InsightAggregator {
    snapshots: SnapshotStorage,
}

impl InsightAggregator {
    pub fn new(snapshots: SnapshotStorage) -> Self {
        Self { snapshots }
    }

    /// Aggregate the org's snapshots captured in `[from, to]` into the
    /// seven subsystem blocks. Blocks fail independently.
    pub async fn aggregate(
        &self,
        org_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AggregationOutcome {
        debug!("Aggregating insights for org: {} ({} to {})", org_id, from, to);

        let mut failed_blocks = Vec::new();
        let mut sources = Vec::new();

        let insights = AggregatedInsights {
            media_performance: self
                .block(org_id, "media_performance", MEDIA_SYSTEMS, from, to, &mut failed_blocks, &mut sources)
                .await,
            competitive_intel: self
                .block(org_id, "competitive_intel", COMPETITIVE_SYSTEMS, from, to, &mut failed_blocks, &mut sources)
                .await,
            crisis_status: self
                .block(org_id, "crisis_status", CRISIS_SYSTEMS, from, to, &mut failed_blocks, &mut sources)
                .await,
            brand_health: self
                .block(org_id, "brand_health", BRAND_SYSTEMS, from, to, &mut failed_blocks, &mut sources)
                .await,
            governance: self
                .block(org_id, "governance", GOVERNANCE_SYSTEMS, from, to, &mut failed_blocks, &mut sources)
                .await,
            investor_sentiment: self
                .block(org_id, "investor_sentiment", INVESTOR_SYSTEMS, from, to, &mut failed_blocks, &mut sources)
                .await,
            executive_metrics: self
                .block(org_id, "executive_metrics", EXECUTIVE_SYSTEMS, from, to, &mut failed_blocks, &mut sources)
                .await,
            refreshed_at: Utc::now(),
        };

        AggregationOutcome {
            insights,
            sources,
            failed_blocks,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn block(
        &self,
        org_id: &str,
        label: &'static str,
        systems: &[SourceSystem],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        failed_blocks: &mut Vec<&'static str>,
        sources: &mut Vec<SourceCandidate>,
    ) -> Option<SubsystemInsight> {
        let snapshots = match self
            .snapshots
            .list_for_systems(org_id, systems, from, to, BLOCK_LIMIT)
            .await
        {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!("Failed to aggregate {} block for org {}: {}", label, org_id, e);
                failed_blocks.push(label);
                return None;
            }
        };

        if snapshots.is_empty() {
            return None;
        }

        for (index, snapshot) in snapshots.iter().take(SOURCES_PER_BLOCK).enumerate() {
            sources.push(SourceCandidate {
                system: snapshot.system,
                source_ref: snapshot.source_ref.clone(),
                relevance_score: snapshot.relevance_score,
                quality_score: snapshot.quality_score,
                is_primary: index == 0,
            });
        }

        Some(build_block(systems[0], &snapshots))
    }
}

/// `lead_system` labels the block even when its snapshots span several
/// feeds (e.g. the media block mixes monitoring and social listening).
fn build_block(lead_system: SourceSystem, snapshots: &[InsightSnapshot]) -> SubsystemInsight {
    let headline = snapshots[0].title.clone();
    let highlights = snapshots
        .iter()
        .take(HIGHLIGHT_COUNT)
        .map(|s| s.title.clone())
        .collect();
    let top_risk = snapshots.iter().filter_map(|s| s.risk_level).max();
    let avg_relevance =
        snapshots.iter().map(|s| s.relevance_score).sum::<f64>() / snapshots.len() as f64;

    SubsystemInsight {
        system: lead_system,
        headline,
        highlights,
        top_risk,
        snapshot_count: snapshots.len() as i64,
        avg_relevance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskLevel, SnapshotCreateInput};
    use chrono::Duration;

    async fn setup() -> (InsightAggregator, SnapshotStorage, sqlx::SqlitePool) {
        let pool = vantage_storage::connect_memory().await.unwrap();
        vantage_storage::run_migrations(&pool).await.unwrap();
        (
            InsightAggregator::new(SnapshotStorage::new(pool.clone())),
            SnapshotStorage::new(pool.clone()),
            pool,
        )
    }

    fn input(
        system: SourceSystem,
        source_ref: &str,
        title: &str,
        relevance: f64,
        risk: Option<RiskLevel>,
    ) -> SnapshotCreateInput {
        SnapshotCreateInput {
            system,
            source_ref: source_ref.to_string(),
            title: title.to_string(),
            summary: None,
            risk_level: risk,
            relevance_score: Some(relevance),
            quality_score: Some(0.8),
            metrics: None,
            captured_at: None,
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - Duration::days(7), now + Duration::minutes(1))
    }

    #[tokio::test]
    async fn test_empty_window_yields_no_blocks() {
        let (aggregator, _, _) = setup().await;
        let (from, to) = window();

        let outcome = aggregator.aggregate("org-1", from, to).await;

        assert!(outcome.insights.media_performance.is_none());
        assert!(outcome.insights.crisis_status.is_none());
        assert!(outcome.sources.is_empty());
        assert!(outcome.failed_blocks.is_empty());
    }

    #[tokio::test]
    async fn test_blocks_group_systems() {
        let (aggregator, storage, _) = setup().await;
        let (from, to) = window();

        storage
            .create("org-1", input(SourceSystem::MediaMonitoring, "mm-1", "Front page story", 0.9, None))
            .await
            .unwrap();
        storage
            .create("org-1", input(SourceSystem::SocialListening, "sl-1", "Thread going viral", 0.7, None))
            .await
            .unwrap();
        storage
            .create(
                "org-1",
                input(SourceSystem::CrisisDetection, "cd-1", "Outage chatter", 0.8, Some(RiskLevel::High)),
            )
            .await
            .unwrap();
        storage
            .create(
                "org-1",
                input(SourceSystem::RegulatoryWatch, "rw-1", "Filing deadline", 0.4, Some(RiskLevel::Moderate)),
            )
            .await
            .unwrap();

        let outcome = aggregator.aggregate("org-1", from, to).await;

        let media = outcome.insights.media_performance.expect("media block");
        assert_eq!(media.headline, "Front page story");
        assert_eq!(media.snapshot_count, 2);
        assert_eq!(media.highlights.len(), 2);
        assert!((media.avg_relevance - 0.8).abs() < 1e-9);

        let crisis = outcome.insights.crisis_status.expect("crisis block");
        assert_eq!(crisis.top_risk, Some(RiskLevel::High));
        assert_eq!(crisis.snapshot_count, 2);

        assert!(outcome.insights.investor_sentiment.is_none());
    }

    #[tokio::test]
    async fn test_primary_source_is_most_relevant() {
        let (aggregator, storage, _) = setup().await;
        let (from, to) = window();

        for (source_ref, relevance) in [("ci-low", 0.3), ("ci-top", 0.95), ("ci-mid", 0.6), ("ci-tail", 0.1)] {
            storage
                .create(
                    "org-1",
                    input(SourceSystem::CompetitiveIntel, source_ref, source_ref, relevance, None),
                )
                .await
                .unwrap();
        }

        let outcome = aggregator.aggregate("org-1", from, to).await;

        let competitive: Vec<_> = outcome
            .sources
            .iter()
            .filter(|s| s.system == SourceSystem::CompetitiveIntel)
            .collect();
        assert_eq!(competitive.len(), 3);
        assert!(competitive[0].is_primary);
        assert_eq!(competitive[0].source_ref, "ci-top");
        assert!(!competitive[1].is_primary);
    }

    #[tokio::test]
    async fn test_query_failure_degrades_to_none() {
        let (aggregator, storage, pool) = setup().await;
        let (from, to) = window();

        storage
            .create("org-1", input(SourceSystem::BrandHealth, "bh-1", "NPS steady", 0.5, None))
            .await
            .unwrap();

        // Force every block query to fail
        sqlx::query("DROP TABLE insight_snapshots")
            .execute(&pool)
            .await
            .unwrap();

        let outcome = aggregator.aggregate("org-1", from, to).await;

        assert!(outcome.insights.brand_health.is_none());
        assert_eq!(outcome.failed_blocks.len(), 7);
        assert!(outcome.failed_blocks.contains(&"brand_health"));
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let (aggregator, storage, _) = setup().await;
        let (from, to) = window();

        storage
            .create("org-2", input(SourceSystem::ExecutiveMetrics, "em-1", "OKR trend", 0.9, None))
            .await
            .unwrap();

        let outcome = aggregator.aggregate("org-1", from, to).await;
        assert!(outcome.insights.executive_metrics.is_none());
    }
}
