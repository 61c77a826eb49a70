//! Statistics engine
//!
//! Pure functions over loaded records. Nothing here writes to the store.
//!
//! ROI counts only completed sessions whose task type is productive (so
//! `human_review` never inflates savings). Costs:
//!
//! ```text
//! human_baseline_cost = baseline_minutes / 60 * human_hourly_rate
//! ai_cost             = ai_minutes / 60 * (ai_hourly_rate + oversight_ratio * human_hourly_rate)
//! productivity        = (Σ human_baseline_cost - Σ ai_cost) / Σ ai_cost
//! ```

use crate::config::{Config, RoiConfig, Vocabulary};
use crate::error::{Result, TrackerError};
use crate::models::{Interaction, Issue, Session, MAX_RATING, MIN_RATING};
use crate::store::{RecordStore, SessionMap};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// Report Types
// ============================================================================

/// Cost comparison between AI-assisted and human-only work
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoiMetrics {
    /// Productive completed sessions counted
    pub completed_sessions: usize,
    /// Of those, sessions with no estimate at all (no baseline)
    pub sessions_without_estimate: usize,
    pub total_ai_minutes: f64,
    pub human_baseline_minutes: f64,
    pub time_saved_minutes: f64,
    pub human_baseline_cost: f64,
    pub ai_subscription_cost: f64,
    pub oversight_cost: f64,
    pub total_ai_cost: f64,
    pub total_human_cost_saved: f64,
    /// Net savings per unit of AI cost; 0 when AI cost is 0
    pub productivity_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectivenessSummary {
    pub total_interactions: usize,
    pub average: f64,
    /// Rating → count, every rating present
    pub distribution: BTreeMap<u8, usize>,
}

/// Idle time between two consecutive completed sessions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionGap {
    pub between: [String; 2],
    pub gap_minutes: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GapSummary {
    pub total_idle_minutes: f64,
    pub average_gap_minutes: f64,
    pub longest_gap_minutes: f64,
    pub gaps: Vec<SessionGap>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueSummary {
    pub total: usize,
    pub unresolved: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodeMetricsSummary {
    pub files: usize,
    pub functions: usize,
    pub total_lines_added: u64,
    pub total_lines_modified: u64,
    pub average_complexity: f64,
    pub average_documentation_score: f64,
    pub total_effort_score: f64,
}

/// Session counts over every session in scope, productive or not
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionCounts {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}

/// Everything `report` prints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub generated_at: DateTime<Utc>,
    /// Set when the report is scoped to one session
    pub session_id: Option<String>,
    pub sessions: SessionCounts,
    pub roi: RoiMetrics,
    pub effectiveness: EffectivenessSummary,
    pub gaps: GapSummary,
    pub issues: IssueSummary,
    pub code: CodeMetricsSummary,
    pub rates: RoiConfig,
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone)]
pub struct StatisticsEngine {
    roi: RoiConfig,
    vocabulary: Vocabulary,
}

impl StatisticsEngine {
    pub fn new(roi: RoiConfig, vocabulary: Vocabulary) -> Self {
        Self { roi, vocabulary }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.roi.clone(), config.vocabulary.clone())
    }

    /// Sessions whose task type counts toward ROI
    pub fn filter_productive_sessions<'a, I>(&self, sessions: I) -> Vec<&'a Session>
    where
        I: IntoIterator<Item = &'a Session>,
    {
        sessions
            .into_iter()
            .filter(|s| self.vocabulary.is_productive(&s.task_type))
            .collect()
    }

    /// Elapsed minutes for a completed session; `None` while active
    pub fn calculate_session_duration_minutes(session: &Session) -> Option<f64> {
        session.duration_minutes()
    }

    pub fn calculate_roi_metrics<'a, I>(&self, sessions: I) -> RoiMetrics
    where
        I: IntoIterator<Item = &'a Session>,
    {
        let ai_rate = self.roi.ai_hourly_rate();
        let oversight_rate = self.roi.oversight_ratio * self.roi.human_hourly_rate;

        let mut metrics = RoiMetrics::default();
        for session in self.filter_productive_sessions(sessions) {
            let Some(ai_minutes) = Self::calculate_session_duration_minutes(session) else {
                continue;
            };
            metrics.completed_sessions += 1;
            metrics.total_ai_minutes += ai_minutes;

            match session.baseline_minutes() {
                Some(baseline) => metrics.human_baseline_minutes += baseline,
                None => metrics.sessions_without_estimate += 1,
            }
        }

        let ai_hours = metrics.total_ai_minutes / 60.0;
        metrics.time_saved_minutes = metrics.human_baseline_minutes - metrics.total_ai_minutes;
        metrics.human_baseline_cost =
            metrics.human_baseline_minutes / 60.0 * self.roi.human_hourly_rate;
        metrics.ai_subscription_cost = ai_hours * ai_rate;
        metrics.oversight_cost = ai_hours * oversight_rate;
        metrics.total_ai_cost = metrics.ai_subscription_cost + metrics.oversight_cost;
        metrics.total_human_cost_saved = metrics.human_baseline_cost - metrics.total_ai_cost;
        metrics.productivity_multiplier = if metrics.total_ai_cost > 0.0 {
            metrics.total_human_cost_saved / metrics.total_ai_cost
        } else {
            0.0
        };
        metrics
    }

    /// Count of interactions per rating, 1..=5 always present
    pub fn calculate_effectiveness_distribution(
        &self,
        interactions: &[Interaction],
    ) -> BTreeMap<u8, usize> {
        let mut distribution: BTreeMap<u8, usize> =
            (MIN_RATING..=MAX_RATING).map(|r| (r, 0)).collect();
        for interaction in interactions {
            if let Some(count) = distribution.get_mut(&interaction.effectiveness_rating) {
                *count += 1;
            }
        }
        distribution
    }

    pub fn calculate_average_effectiveness(&self, interactions: &[Interaction]) -> f64 {
        if interactions.is_empty() {
            return 0.0;
        }
        let sum: f64 = interactions
            .iter()
            .map(|i| f64::from(i.effectiveness_rating))
            .sum();
        sum / interactions.len() as f64
    }

    /// Gaps between consecutive completed sessions ordered by start time.
    /// Overlapping sessions produce a zero gap.
    pub fn calculate_session_gaps<'a, I>(&self, sessions: I) -> Vec<SessionGap>
    where
        I: IntoIterator<Item = &'a Session>,
    {
        let mut completed: Vec<(&Session, DateTime<Utc>)> = sessions
            .into_iter()
            .filter(|s| s.is_completed())
            .filter_map(|s| s.end_time.map(|end| (s, end)))
            .collect();
        completed.sort_by(|(a, _), (b, _)| {
            a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id))
        });

        completed
            .windows(2)
            .map(|pair| {
                let (prev, prev_end) = pair[0];
                let (next, _) = pair[1];
                let minutes = (next.start_time - prev_end).num_milliseconds() as f64 / 60_000.0;
                SessionGap {
                    between: [prev.id.clone(), next.id.clone()],
                    gap_minutes: minutes.max(0.0),
                }
            })
            .collect()
    }

    pub fn summarize_gaps(&self, gaps: Vec<SessionGap>) -> GapSummary {
        if gaps.is_empty() {
            return GapSummary::default();
        }
        let total: f64 = gaps.iter().map(|g| g.gap_minutes).sum();
        let longest = gaps.iter().map(|g| g.gap_minutes).fold(0.0, f64::max);
        GapSummary {
            total_idle_minutes: total,
            average_gap_minutes: total / gaps.len() as f64,
            longest_gap_minutes: longest,
            gaps,
        }
    }

    /// Issue counts. Every configured severity appears, even at zero.
    pub fn calculate_issue_summary(&self, issues: &[Issue]) -> IssueSummary {
        let mut by_severity: BTreeMap<String, usize> = self
            .vocabulary
            .severities
            .iter()
            .map(|s| (s.clone(), 0))
            .collect();
        let mut by_type = BTreeMap::new();

        for issue in issues {
            *by_severity.entry(issue.severity.clone()).or_insert(0) += 1;
            *by_type.entry(issue.issue_type.clone()).or_insert(0) += 1;
        }

        IssueSummary {
            total: issues.len(),
            unresolved: issues.iter().filter(|i| !i.resolved).count(),
            by_severity,
            by_type,
        }
    }

    pub fn calculate_code_metrics_summary<'a, I>(&self, sessions: I) -> CodeMetricsSummary
    where
        I: IntoIterator<Item = &'a Session>,
    {
        let mut summary = CodeMetricsSummary::default();
        let mut complexity = 0u64;
        let mut documentation = 0u64;

        for file in sessions.into_iter().flat_map(|s| &s.code_metrics) {
            summary.files += 1;
            for function in &file.functions {
                summary.functions += 1;
                summary.total_lines_added += u64::from(function.lines_added);
                summary.total_lines_modified += u64::from(function.lines_modified);
                summary.total_effort_score += function.effort_score;
                complexity += u64::from(function.complexity);
                documentation += u64::from(function.documentation_score);
            }
        }

        if summary.functions > 0 {
            summary.average_complexity = complexity as f64 / summary.functions as f64;
            summary.average_documentation_score = documentation as f64 / summary.functions as f64;
        }
        summary
    }

    /// Combine every metric. Session counts cover all sessions given;
    /// ROI covers only the productive completed ones.
    pub fn generate_summary_report(
        &self,
        sessions: &SessionMap,
        interactions: &[Interaction],
        issues: &[Issue],
    ) -> SummaryReport {
        let counts = SessionCounts {
            total: sessions.len(),
            active: sessions.values().filter(|s| s.is_active()).count(),
            completed: sessions.values().filter(|s| s.is_completed()).count(),
        };

        let gaps = self.calculate_session_gaps(sessions.values());

        SummaryReport {
            generated_at: Utc::now(),
            session_id: None,
            sessions: counts,
            roi: self.calculate_roi_metrics(sessions.values()),
            effectiveness: EffectivenessSummary {
                total_interactions: interactions.len(),
                average: self.calculate_average_effectiveness(interactions),
                distribution: self.calculate_effectiveness_distribution(interactions),
            },
            gaps: self.summarize_gaps(gaps),
            issues: self.calculate_issue_summary(issues),
            code: self.calculate_code_metrics_summary(sessions.values()),
            rates: self.roi.clone(),
        }
    }

    /// Load the store and report on everything, or on one session
    pub fn session_report(
        &self,
        store: &RecordStore,
        session_id: Option<&str>,
    ) -> Result<SummaryReport> {
        let mut sessions = store.sessions();
        let mut interactions = store.interactions();
        let mut issues = store.issues();

        if let Some(id) = session_id {
            let session = sessions
                .remove(id)
                .ok_or_else(|| TrackerError::NotFound(id.to_string()))?;
            sessions = SessionMap::from([(id.to_string(), session)]);
            interactions.retain(|i| i.session_id == id);
            issues.retain(|i| i.session_id == id);
        }

        debug!(
            "Reporting on {} sessions, {} interactions, {} issues",
            sessions.len(),
            interactions.len(),
            issues.len()
        );
        let mut report = self.generate_summary_report(&sessions, &interactions, &issues);
        report.session_id = session_id.map(str::to_string);
        Ok(report)
    }
}
