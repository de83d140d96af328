// ABOUTME: AI section generator: prompt assembly and markdown rendering
// ABOUTME: One TextGenerator call per section; results carry token and timing data

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use vantage_ai::{AIServiceResult, GenerationRequest, TextGenerator};
use vantage_insights::{AggregatedInsights, SubsystemInsight};

use crate::sections::{GeneratedContent, SectionKind};
use crate::types::{Report, ReportAudience, Tone};

/// Generates one section at a time through whatever [`TextGenerator`]
/// it was handed. Holds no storage; persisting the result is the
/// manager's problem.
pub struct SectionGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl SectionGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generate one section. The provider timeout lives inside the
    /// generator, so a hung call surfaces as an error here rather than
    /// a report stuck in `generating`.
    pub async fn generate(
        &self,
        report: &Report,
        kind: SectionKind,
        insights: &AggregatedInsights,
    ) -> AIServiceResult<GeneratedContent> {
        let started = Instant::now();

        let request = GenerationRequest {
            prompt: self.build_section_prompt(report, kind, insights),
            system: Some(self.build_system_prompt(report)),
            max_tokens: report.target_length.max_tokens(),
            temperature: Some(0.7),
        };

        let generated = self.generator.generate_text(request).await?;
        let generation_ms = started.elapsed().as_millis() as i64;

        info!(
            "Generated {} for report {} ({} tokens, {}ms)",
            kind.as_str(),
            report.id,
            generated.usage.total_tokens(),
            generation_ms
        );

        let html = render_markdown(&generated.text);
        Ok(GeneratedContent {
            markdown: generated.text,
            html,
            tokens_input: generated.usage.input_tokens as i64,
            tokens_output: generated.usage.output_tokens as i64,
            generation_ms,
        })
    }

    fn build_system_prompt(&self, report: &Report) -> String {
        let audience = match report.audience {
            ReportAudience::Executive => "the executive leadership team",
            ReportAudience::Board => "the board of directors",
            ReportAudience::Investors => "current and prospective investors",
            ReportAudience::PrTeam => "the communications and PR team",
            ReportAudience::AllHands => "the whole company",
        };
        let tone = match report.tone {
            Tone::Neutral => "balanced and factual",
            Tone::Confident => "assured and forward-looking",
            Tone::Cautious => "measured, flagging uncertainty explicitly",
        };

        format!(
            "You are a communications intelligence analyst writing one section of \
             an executive report for {}. Write in a {} tone. Work strictly from \
             the signals provided; never invent figures or events. Output clean \
             markdown with no top-level title and no code fences.",
            audience, tone
        )
    }

    fn build_section_prompt(
        &self,
        report: &Report,
        kind: SectionKind,
        insights: &AggregatedInsights,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!("# Write the \"{}\" section\n\n", kind.heading()));
        prompt.push_str("## Report\n");
        prompt.push_str(&format!("Title: {}\n", report.title));
        if let Some(description) = &report.description {
            prompt.push_str(&format!("Focus: {}\n", description));
        }
        match (report.period_start, report.period_end) {
            (Some(start), Some(end)) => {
                prompt.push_str(&format!(
                    "Period: {} to {}\n",
                    start.format("%Y-%m-%d"),
                    end.format("%Y-%m-%d")
                ));
            }
            _ => prompt.push_str("Period: most recent week\n"),
        }
        prompt.push('\n');

        prompt.push_str("## Signals\n");
        prompt.push_str(&self.build_insight_context(insights));

        prompt.push_str("\n## Task\n");
        prompt.push_str(&format!(
            "Write roughly {} words of markdown for this section.\n",
            report.target_length.word_budget()
        ));
        prompt.push_str(self.section_guidance(kind));
        if report.include_metrics {
            prompt.push_str("Quote concrete metrics from the signals where they exist.\n");
        }
        prompt.push_str("Start directly with the content; the section heading is added separately.\n");

        prompt
    }

    /// Flatten the populated insight blocks into prompt context. Blocks
    /// that failed or had no snapshots are simply absent.
    fn build_insight_context(&self, insights: &AggregatedInsights) -> String {
        let mut context = String::new();

        for block in insights.blocks() {
            context.push_str(&self.format_block(block));
        }

        if context.is_empty() {
            context.push_str(
                "No monitoring signals were available for this period. Say so plainly \
                 instead of speculating.\n",
            );
        }

        context
    }

    fn format_block(&self, block: &SubsystemInsight) -> String {
        let mut out = format!("### {}\n", block.system.as_str());
        out.push_str(&format!("Headline: {}\n", block.headline));
        for highlight in &block.highlights {
            out.push_str(&format!("- {}\n", highlight));
        }
        if let Some(risk) = block.top_risk {
            out.push_str(&format!("Top risk level: {}\n", risk.as_str()));
        }
        out.push_str(&format!(
            "({} snapshots, avg relevance {:.2})\n\n",
            block.snapshot_count, block.avg_relevance
        ));
        out
    }

    fn section_guidance(&self, kind: SectionKind) -> &'static str {
        match kind {
            SectionKind::ExecutiveSummary => {
                "Open with the single most important development, then the two or \
                 three findings leadership must know. No bullet lists.\n"
            }
            SectionKind::KeyDevelopments => {
                "List the notable developments of the period as short bold-led \
                 bullets, most consequential first.\n"
            }
            SectionKind::MediaAnalysis => {
                "Cover earned and owned media performance: volume, reach, standout \
                 coverage, and what moved the numbers.\n"
            }
            SectionKind::CompetitiveLandscape => {
                "Compare competitor activity and analyst positioning against our \
                 own footprint this period.\n"
            }
            SectionKind::RiskMatrix => {
                "Lay out active and emerging risks as a markdown table with \
                 columns: Risk, Level, Trend, Exposure.\n"
            }
            SectionKind::SentimentTrends => {
                "Describe how brand and investor sentiment moved across the \
                 period and what drove the shifts.\n"
            }
            SectionKind::Recommendations => {
                "Give three to five concrete, owned recommendations as a numbered \
                 list. Each must trace back to a signal above.\n"
            }
            SectionKind::Appendix => {
                "Summarize the data basis: systems consulted, snapshot counts, \
                 and any gaps in coverage.\n"
            }
        }
    }
}

/// Markdown to HTML with the table/strikethrough/tasklist extensions
/// the dashboards expect.
pub(crate) fn render_markdown(markdown: &str) -> String {
    use pulldown_cmark::{html, Options, Parser};

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);

    html_output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ReportCreateInput, ReportStatus, TargetLength};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use vantage_ai::{GeneratedText, Usage};
    use vantage_insights::{RiskLevel, SourceSystem};

    /// Records the request it was handed and replies with a canned body.
    struct ScriptedGenerator {
        reply: String,
        seen: Mutex<Option<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate_text(&self, request: GenerationRequest) -> AIServiceResult<GeneratedText> {
            *self.seen.lock().unwrap() = Some(request);
            Ok(GeneratedText {
                text: self.reply.clone(),
                usage: Usage {
                    input_tokens: 210,
                    output_tokens: 80,
                },
            })
        }
    }

    fn report(title: &str) -> Report {
        let now = Utc::now();
        let input = ReportCreateInput {
            title: title.to_string(),
            ..Default::default()
        };
        Report {
            id: "rpt-test".to_string(),
            org_id: "org-a".to_string(),
            title: input.title,
            description: Some("Product launch week".to_string()),
            format: Default::default(),
            audience: Default::default(),
            status: ReportStatus::Draft,
            period_start: None,
            period_end: None,
            tone: Tone::Cautious,
            target_length: TargetLength::Brief,
            include_recommendations: true,
            include_metrics: true,
            include_sources: true,
            summary: None,
            kpi_snapshot: None,
            insights_refreshed_at: None,
            approved_by: None,
            published_at: None,
            created_by: None,
            updated_by: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn insights() -> AggregatedInsights {
        AggregatedInsights {
            media_performance: Some(SubsystemInsight {
                system: SourceSystem::MediaMonitoring,
                headline: "Coverage doubled after the launch".to_string(),
                highlights: vec!["TechDaily front page feature".to_string()],
                top_risk: Some(RiskLevel::Moderate),
                snapshot_count: 14,
                avg_relevance: 0.81,
            }),
            competitive_intel: None,
            crisis_status: None,
            brand_health: None,
            governance: None,
            investor_sentiment: None,
            executive_metrics: None,
            refreshed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_generate_returns_rendered_content() {
        let scripted = Arc::new(ScriptedGenerator::new(
            "## Coverage\n\nCoverage doubled this week.",
        ));
        let generator = SectionGenerator::new(scripted.clone());

        let content = generator
            .generate(&report("Launch recap"), SectionKind::MediaAnalysis, &insights())
            .await
            .unwrap();

        assert!(content.markdown.contains("Coverage doubled"));
        assert!(content.html.contains("<h2>"));
        assert_eq!(content.tokens_input, 210);
        assert_eq!(content.tokens_output, 80);
    }

    #[tokio::test]
    async fn test_prompt_carries_report_and_signals() {
        let scripted = Arc::new(ScriptedGenerator::new("ok"));
        let generator = SectionGenerator::new(scripted.clone());

        generator
            .generate(&report("Launch recap"), SectionKind::ExecutiveSummary, &insights())
            .await
            .unwrap();

        let request = scripted.seen.lock().unwrap().take().unwrap();
        assert!(request.prompt.contains("Launch recap"));
        assert!(request.prompt.contains("Product launch week"));
        assert!(request.prompt.contains("Coverage doubled after the launch"));
        assert!(request.prompt.contains("roughly 150 words"));
        assert_eq!(request.max_tokens, TargetLength::Brief.max_tokens());

        let system = request.system.unwrap();
        assert!(system.contains("executive leadership team"));
        assert!(system.contains("measured"));
    }

    #[tokio::test]
    async fn test_prompt_flags_missing_signals() {
        let scripted = Arc::new(ScriptedGenerator::new("ok"));
        let generator = SectionGenerator::new(scripted.clone());

        let empty = AggregatedInsights {
            media_performance: None,
            competitive_intel: None,
            crisis_status: None,
            brand_health: None,
            governance: None,
            investor_sentiment: None,
            executive_metrics: None,
            refreshed_at: Utc::now(),
        };
        generator
            .generate(&report("Quiet week"), SectionKind::ExecutiveSummary, &empty)
            .await
            .unwrap();

        let request = scripted.seen.lock().unwrap().take().unwrap();
        assert!(request
            .prompt
            .contains("No monitoring signals were available"));
    }

    #[test]
    fn test_render_markdown_extensions() {
        let html = render_markdown("# Title\n\n- one\n- two\n\n| Risk | Level |\n|---|---|\n| Churn | high |");
        assert!(html.contains("<h1>"));
        assert!(html.contains("<li>one</li>"));
        assert!(html.contains("<table>"));
    }
}
