//! Session lifecycle
//!
//! `active` → `completed` is the only transition. Starting a session closes
//! any other active session in the same execution context, so a context never
//! accumulates orphaned active sessions while foreground and background work
//! stay independent. Closing clamps the recorded end time to
//! `start_time + max_duration`.

use crate::code_metrics::scan_function;
use crate::config::{Config, SessionConfig, Vocabulary};
use crate::error::{Result, TrackerError};
use crate::models::{
    generate_session_id, ExecutionContext, FileMetrics, FunctionChange, FunctionMetrics,
    Interaction, Issue, Outcome, Session, SessionStatus,
};
use crate::store::{Collection, RecordStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Result of `start_session`
#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session_id: String,
    pub task_type: String,
    pub execution_context: ExecutionContext,
    /// Sessions in the same context that were closed to make room
    pub auto_closed_sessions: Vec<String>,
}

/// Result of `log_interaction`
#[derive(Debug, Clone, Serialize)]
pub struct InteractionLogged {
    pub session_id: String,
    pub effectiveness_rating: u8,
    pub iteration_count: u32,
    pub total_interactions: u32,
    pub avg_effectiveness: f64,
}

/// Result of `end_session`
#[derive(Debug, Clone, Serialize)]
pub struct SessionEnded {
    pub session_id: String,
    pub outcome: Outcome,
    pub duration_minutes: f64,
    /// True when the end time was clamped to the max duration
    pub duration_capped: bool,
    pub total_interactions: u32,
    pub avg_effectiveness: f64,
    pub issues_count: usize,
}

/// Result of `log_code_metrics`
#[derive(Debug, Clone, Serialize)]
pub struct CodeMetricsLogged {
    pub session_id: String,
    pub file_path: String,
    pub functions_analyzed: usize,
    /// Requested functions that weren't found in the file
    pub functions_skipped: Vec<String>,
    pub average_complexity: f64,
    pub average_doc_quality: f64,
    pub total_effort_score: f64,
}

/// Interaction count and mean rating for one session, computed from scratch
pub fn interaction_aggregates(interactions: &[Interaction], session_id: &str) -> (u32, f64) {
    let ratings: Vec<f64> = interactions
        .iter()
        .filter(|i| i.session_id == session_id)
        .map(|i| f64::from(i.effectiveness_rating))
        .collect();
    if ratings.is_empty() {
        return (0, 0.0);
    }
    let total = ratings.len();
    (total as u32, ratings.iter().sum::<f64>() / total as f64)
}

/// Enforces the session state machine on top of a [`RecordStore`]
#[derive(Debug)]
pub struct SessionTracker {
    store: RecordStore,
    vocabulary: Vocabulary,
    limits: SessionConfig,
}

impl SessionTracker {
    pub fn new(store: RecordStore, vocabulary: Vocabulary, limits: SessionConfig) -> Self {
        Self {
            store,
            vocabulary,
            limits,
        }
    }

    /// Build a tracker storing into the configured directory
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            RecordStore::new(config.storage_dir()),
            config.vocabulary.clone(),
            config.session.clone(),
        )
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    // ========================================================================
    // Lifecycle Operations
    // ========================================================================

    /// Start a session, auto-closing any active session in the same context
    pub fn start_session(
        &self,
        name: &str,
        task_type: &str,
        model_name: &str,
        initial_estimate_minutes: f64,
        estimate_source: &str,
        developer: &str,
        project: &str,
        execution_context: &str,
    ) -> Result<StartedSession> {
        require("name", name)?;
        require("model_name", model_name)?;
        require("developer", developer)?;
        require("project", project)?;
        if !self.vocabulary.is_task_type(task_type) {
            return Err(one_of("task_type", task_type, &self.vocabulary.task_types));
        }
        if !self.vocabulary.is_estimate_source(estimate_source) {
            return Err(one_of(
                "estimate_source",
                estimate_source,
                &self.vocabulary.estimate_sources,
            ));
        }
        if !self.vocabulary.is_estimate_bucket(initial_estimate_minutes) {
            let buckets: Vec<String> = self
                .vocabulary
                .estimate_buckets_minutes
                .iter()
                .map(|b| b.to_string())
                .collect();
            return Err(TrackerError::Validation(format!(
                "initial_estimate_minutes must be one of: {} (got {})",
                buckets.join(", "),
                initial_estimate_minutes
            )));
        }
        let context: ExecutionContext = execution_context.parse()?;

        let writer = self.store.writer();
        let mut sessions = writer.sessions()?;
        let now = Utc::now();

        let mut auto_closed = Vec::new();
        for session in sessions.values_mut() {
            if session.is_active() && session.execution_context == context {
                self.close(session, Outcome::Partial, now, Some("new session started"));
                warn!("Auto-closed active {} session: {}", context, session.id);
                auto_closed.push(session.id.clone());
            }
        }

        let session = Session {
            id: generate_session_id(name, now),
            name: name.trim().to_string(),
            task_type: task_type.to_string(),
            status: SessionStatus::Active,
            start_time: now,
            end_time: None,
            model_name: model_name.to_string(),
            initial_estimate_minutes: Some(initial_estimate_minutes),
            final_estimate_minutes: None,
            estimate_source: estimate_source.to_string(),
            developer: developer.to_string(),
            project: project.to_string(),
            execution_context: context,
            outcome: None,
            notes: String::new(),
            total_interactions: 0,
            avg_effectiveness: 0.0,
            code_metrics: Vec::new(),
        };
        let session_id = session.id.clone();
        sessions.insert(session_id.clone(), session);
        writer.save_sessions(&sessions)?;

        info!("Started session: {}", session_id);
        Ok(StartedSession {
            session_id,
            task_type: task_type.to_string(),
            execution_context: context,
            auto_closed_sessions: auto_closed,
        })
    }

    /// Log one exchange; the rating is clamped to 1..=5, never rejected.
    ///
    /// The interaction and the session's aggregates are two saves. If the
    /// second one fails the interaction stays recorded and the error is
    /// returned; the next successful log recomputes the aggregates from every
    /// stored interaction, so they can't stay stale.
    pub fn log_interaction(
        &self,
        session_id: &str,
        prompt: &str,
        response_summary: &str,
        effectiveness_rating: i64,
        iteration_count: Option<i64>,
        tools_used: Option<Vec<String>>,
    ) -> Result<InteractionLogged> {
        let writer = self.store.writer();
        let mut session =
            self.active_session(writer.get_session(session_id)?, session_id, "log an interaction")?;

        let interaction = Interaction::new(
            session_id,
            prompt,
            response_summary,
            effectiveness_rating,
            iteration_count.unwrap_or(1),
            tools_used.unwrap_or_default(),
        );
        let rating = interaction.effectiveness_rating;
        let iterations = interaction.iteration_count;

        let mut interactions = writer.interactions()?;
        interactions.push(interaction);
        writer.save(Collection::Interactions, &interactions)?;

        let (total, avg) = interaction_aggregates(&interactions, session_id);
        session.total_interactions = total;
        session.avg_effectiveness = avg;
        writer.put_session(session)?;

        info!("Logged interaction for session {}, rating: {}", session_id, rating);
        Ok(InteractionLogged {
            session_id: session_id.to_string(),
            effectiveness_rating: rating,
            iteration_count: iterations,
            total_interactions: total,
            avg_effectiveness: avg,
        })
    }

    /// Record a problem against an active session
    pub fn flag_issue(
        &self,
        session_id: &str,
        issue_type: &str,
        description: &str,
        severity: &str,
    ) -> Result<Issue> {
        if !self.vocabulary.is_severity(severity) {
            return Err(one_of("severity", severity, &self.vocabulary.severities));
        }
        require("issue_type", issue_type)?;
        require("description", description)?;

        let writer = self.store.writer();
        self.active_session(writer.get_session(session_id)?, session_id, "flag an issue")?;

        let issue = Issue::new(session_id, issue_type, description, severity);
        writer.append_issue(issue.clone())?;

        info!("Flagged issue for session {}: {} ({})", session_id, issue_type, severity);
        Ok(issue)
    }

    /// Complete a session. The end time is clamped to the max duration.
    pub fn end_session(
        &self,
        session_id: &str,
        outcome: &str,
        final_estimate_minutes: Option<f64>,
        notes: Option<&str>,
    ) -> Result<SessionEnded> {
        let outcome: Outcome = outcome.parse()?;
        if let Some(estimate) = final_estimate_minutes {
            if !estimate.is_finite() || estimate <= 0.0 {
                return Err(TrackerError::Validation(format!(
                    "final_estimate_minutes must be a positive number (got {})",
                    estimate
                )));
            }
        }

        let writer = self.store.writer();
        let mut sessions = writer.sessions()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| TrackerError::NotFound(session_id.to_string()))?;

        if session.is_completed() {
            return Err(TrackerError::StateViolation(format!(
                "Session {} is already completed",
                session_id
            )));
        }
        if final_estimate_minutes.is_none() && session.initial_estimate_minutes.is_none() {
            return Err(TrackerError::StateViolation(format!(
                "Session {} has no initial estimate; a final estimate is required to close it",
                session_id
            )));
        }

        if let Some(notes) = notes {
            session.notes = notes.to_string();
        }
        if final_estimate_minutes.is_some() {
            session.final_estimate_minutes = final_estimate_minutes;
        }
        let capped = self.close(session, outcome, Utc::now(), None);

        let result = SessionEnded {
            session_id: session_id.to_string(),
            outcome,
            duration_minutes: session.duration_minutes().unwrap_or(0.0),
            duration_capped: capped,
            total_interactions: session.total_interactions,
            avg_effectiveness: session.avg_effectiveness,
            issues_count: 0,
        };
        writer.save_sessions(&sessions)?;

        let issues_count = self
            .store
            .issues()
            .iter()
            .filter(|i| i.session_id == session_id)
            .count();

        info!("Ended session {}, outcome: {}", session_id, outcome);
        Ok(SessionEnded {
            issues_count,
            ..result
        })
    }

    /// Active sessions across all contexts, oldest first
    pub fn get_active_sessions(&self) -> Vec<Session> {
        let mut active: Vec<Session> = self
            .store
            .sessions()
            .into_values()
            .filter(|s| s.is_active())
            .collect();
        active.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        active
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        self.store
            .get_session(session_id)
            .ok_or_else(|| TrackerError::NotFound(session_id.to_string()))
    }

    /// Close every active session in every context, e.g. on shutdown
    pub fn close_active_sessions(&self, reason: &str) -> Result<Vec<String>> {
        let writer = self.store.writer();
        let mut sessions = writer.sessions()?;
        let now = Utc::now();

        let mut closed = Vec::new();
        for session in sessions.values_mut().filter(|s| s.is_active()) {
            self.close(session, Outcome::Partial, now, Some(reason));
            closed.push(session.id.clone());
        }

        if !closed.is_empty() {
            writer.save_sessions(&sessions)?;
            info!("Auto-closed {} active session(s): {}", closed.len(), reason);
        }
        Ok(closed)
    }

    /// Measure the functions changed in one file and attach the result to the session
    pub fn log_code_metrics(
        &self,
        session_id: &str,
        file_path: &Path,
        functions_modified: &[FunctionChange],
    ) -> Result<CodeMetricsLogged> {
        if functions_modified.iter().any(|f| f.name.trim().is_empty()) {
            return Err(TrackerError::Validation(
                "functions_modified entries need a non-empty name".to_string(),
            ));
        }

        let writer = self.store.writer();
        let mut session =
            self.active_session(writer.get_session(session_id)?, session_id, "log code metrics")?;

        let source = std::fs::read_to_string(file_path).map_err(|e| {
            TrackerError::Validation(format!("Cannot read {}: {}", file_path.display(), e))
        })?;

        let mut functions = Vec::new();
        let mut skipped = Vec::new();
        for change in functions_modified {
            let Some(scan) = scan_function(&source, &change.name) else {
                debug!("Function '{}' not found in {}, skipping", change.name, file_path.display());
                skipped.push(change.name.clone());
                continue;
            };
            let mut metrics = FunctionMetrics {
                function_name: change.name.clone(),
                modification_type: change.modification_type,
                lines_added: change.lines_added,
                lines_modified: change.lines_modified,
                lines_deleted: change.lines_deleted,
                complexity: scan.complexity,
                documentation_score: scan.documentation_score(),
                has_docstring: scan.doc.is_some(),
                has_type_hints: scan.has_type_hints,
                effort_score: 0.0,
            };
            metrics.effort_score = metrics.compute_effort_score();
            functions.push(metrics);
        }

        let analyzed = functions.len();
        let (average_complexity, average_doc_quality) = if analyzed > 0 {
            let complexity: u32 = functions.iter().map(|f| f.complexity).sum();
            let docs: u32 = functions.iter().map(|f| f.documentation_score).sum();
            (
                f64::from(complexity) / analyzed as f64,
                f64::from(docs) / analyzed as f64,
            )
        } else {
            (0.0, 0.0)
        };
        let total_effort_score = functions.iter().map(|f| f.effort_score).sum();

        let file_path = file_path.display().to_string();
        session.code_metrics.push(FileMetrics {
            file_path: file_path.clone(),
            timestamp: Utc::now(),
            functions,
        });
        writer.put_session(session)?;

        info!("Logged code metrics for {} functions in {}", analyzed, file_path);
        Ok(CodeMetricsLogged {
            session_id: session_id.to_string(),
            file_path,
            functions_analyzed: analyzed,
            functions_skipped: skipped,
            average_complexity,
            average_doc_quality,
            total_effort_score,
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Transition to completed with a capped end time. Returns true if capped.
    fn close(
        &self,
        session: &mut Session,
        outcome: Outcome,
        now: DateTime<Utc>,
        auto_reason: Option<&str>,
    ) -> bool {
        let (end_time, cap_note) = self.capped_end_time(session.start_time, now);
        session.status = SessionStatus::Completed;
        session.end_time = Some(end_time);
        session.outcome = Some(outcome);

        match (auto_reason, &cap_note) {
            (Some(reason), Some(cap)) => {
                session.annotate(&format!("[Auto-closed: {}; {}]", reason, cap))
            }
            (Some(reason), None) => session.annotate(&format!("[Auto-closed: {}]", reason)),
            (None, Some(cap)) => session.annotate(&format!("[Duration capped: {}]", cap)),
            (None, None) => {}
        }
        cap_note.is_some()
    }

    /// `now`, or `start + max_duration` when the session ran past the limit
    fn capped_end_time(
        &self,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> (DateTime<Utc>, Option<String>) {
        let now = now.max(start);
        let max = self.limits.max_duration().max(chrono::Duration::zero());
        let elapsed = now - start;
        match start.checked_add_signed(max) {
            Some(capped) if elapsed > max => {
                let note = format!(
                    "exceeded {:.1}h max, was {:.1}h",
                    max.num_seconds() as f64 / 3600.0,
                    elapsed.num_seconds() as f64 / 3600.0
                );
                (capped, Some(note))
            }
            _ => (now, None),
        }
    }

    fn active_session(
        &self,
        session: Option<Session>,
        session_id: &str,
        action: &str,
    ) -> Result<Session> {
        let session = session.ok_or_else(|| TrackerError::NotFound(session_id.to_string()))?;
        if session.is_completed() {
            return Err(TrackerError::StateViolation(format!(
                "Cannot {}: session {} is already completed",
                action, session_id
            )));
        }
        Ok(session)
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TrackerError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn one_of(field: &str, got: &str, allowed: &[String]) -> TrackerError {
    let mut allowed = allowed.to_vec();
    allowed.sort();
    TrackerError::Validation(format!(
        "{} must be one of: {} (got '{}')",
        field,
        allowed.join(", "),
        got
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracker(dir: &TempDir) -> SessionTracker {
        SessionTracker::new(
            RecordStore::new(dir.path()),
            Vocabulary::default(),
            SessionConfig::default(),
        )
    }

    fn start(tracker: &SessionTracker, name: &str, context: &str) -> String {
        tracker
            .start_session(name, "code_generation", "test-model", 60.0, "manual", "dev", "proj", context)
            .unwrap()
            .session_id
    }

    #[test]
    fn test_start_session_persists_active() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let id = start(&tracker, "Add login", "foreground");

        let session = tracker.get_session(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.end_time, None);
        assert_eq!(session.initial_estimate_minutes, Some(60.0));
        assert_eq!(session.execution_context, ExecutionContext::Foreground);
    }

    #[test]
    fn test_start_session_validation_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);

        let bad_type = tracker.start_session("x", "gardening", "m", 60.0, "manual", "d", "p", "foreground");
        assert_eq!(bad_type.unwrap_err().kind(), "validation_error");

        let bad_source = tracker.start_session("x", "testing", "m", 60.0, "guess", "d", "p", "foreground");
        assert_eq!(bad_source.unwrap_err().kind(), "validation_error");

        let bad_bucket = tracker.start_session("x", "testing", "m", 45.0, "manual", "d", "p", "foreground");
        assert_eq!(bad_bucket.unwrap_err().kind(), "validation_error");

        let bad_context = tracker.start_session("x", "testing", "m", 60.0, "manual", "d", "p", "sideways");
        assert_eq!(bad_context.unwrap_err().kind(), "validation_error");

        let no_name = tracker.start_session("  ", "testing", "m", 60.0, "manual", "d", "p", "foreground");
        assert_eq!(no_name.unwrap_err().kind(), "validation_error");

        assert!(!dir.path().join("sessions.json").exists());
    }

    #[test]
    fn test_same_context_auto_closes() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let a = start(&tracker, "A", "foreground");
        let started = tracker
            .start_session("B", "debugging", "m", 30.0, "manual", "d", "p", "foreground")
            .unwrap();

        assert_eq!(started.auto_closed_sessions, vec![a.clone()]);
        let a = tracker.get_session(&a).unwrap();
        assert_eq!(a.status, SessionStatus::Completed);
        assert_eq!(a.outcome, Some(Outcome::Partial));
        assert!(a.end_time.is_some());
        assert!(a.notes.contains("[Auto-closed: new session started]"));
        assert!(tracker.get_session(&started.session_id).unwrap().is_active());
    }

    #[test]
    fn test_other_context_untouched() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let fg = start(&tracker, "fg", "foreground");
        let bg = start(&tracker, "bg", "background");

        assert!(tracker.get_session(&fg).unwrap().is_active());
        assert!(tracker.get_session(&bg).unwrap().is_active());
        assert_eq!(tracker.get_active_sessions().len(), 2);
    }

    #[test]
    fn test_log_interaction_updates_aggregates() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let id = start(&tracker, "S", "foreground");

        tracker.log_interaction(&id, "p1", "r1", 5, None, None).unwrap();
        let logged = tracker
            .log_interaction(&id, "p2", "r2", 2, Some(3), Some(vec!["grep".into()]))
            .unwrap();

        assert_eq!(logged.total_interactions, 2);
        assert_eq!(logged.avg_effectiveness, 3.5);
        assert_eq!(logged.iteration_count, 3);
        let session = tracker.get_session(&id).unwrap();
        assert_eq!(session.total_interactions, 2);
        assert_eq!(session.avg_effectiveness, 3.5);
    }

    #[test]
    fn test_log_interaction_clamps_rating() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let id = start(&tracker, "S", "foreground");

        assert_eq!(tracker.log_interaction(&id, "p", "r", 11, None, None).unwrap().effectiveness_rating, 5);
        assert_eq!(tracker.log_interaction(&id, "p", "r", -4, None, None).unwrap().effectiveness_rating, 1);
        assert_eq!(tracker.get_session(&id).unwrap().avg_effectiveness, 3.0);
    }

    #[test]
    fn test_unknown_session_not_found() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);

        let err = tracker.log_interaction("ghost", "p", "r", 3, None, None).unwrap_err();
        assert_eq!(err.kind(), "not_found");
        let err = tracker.flag_issue("ghost", "hallucination", "d", "high").unwrap_err();
        assert_eq!(err.kind(), "not_found");
        let err = tracker.end_session("ghost", "success", None, None).unwrap_err();
        assert_eq!(err.kind(), "not_found");

        assert!(tracker.store().interactions().is_empty());
        assert!(tracker.store().issues().is_empty());
    }

    #[test]
    fn test_flag_issue_validates_severity() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let id = start(&tracker, "S", "foreground");

        let err = tracker.flag_issue(&id, "hallucination", "made up API", "apocalyptic").unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let issue = tracker.flag_issue(&id, "hallucination", "made up API", "high").unwrap();
        assert!(!issue.resolved);
        assert_eq!(tracker.store().issues().len(), 1);
    }

    #[test]
    fn test_end_session() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let id = start(&tracker, "S", "foreground");
        tracker.flag_issue(&id, "tool_failure", "timeout", "low").unwrap();

        let ended = tracker.end_session(&id, "success", Some(120.0), Some("done")).unwrap();
        assert_eq!(ended.outcome, Outcome::Success);
        assert!(!ended.duration_capped);
        assert_eq!(ended.issues_count, 1);

        let session = tracker.get_session(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.outcome, Some(Outcome::Success));
        assert_eq!(session.final_estimate_minutes, Some(120.0));
        assert_eq!(session.notes, "done");
        assert!(session.end_time.is_some());
    }

    #[test]
    fn test_end_session_invalid_outcome() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let id = start(&tracker, "S", "foreground");

        let err = tracker.end_session(&id, "meh", None, None).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        let err = tracker.end_session(&id, "success", Some(-5.0), None).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(tracker.get_session(&id).unwrap().is_active());
    }

    #[test]
    fn test_end_session_caps_duration() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let id = start(&tracker, "Overnight", "foreground");

        let mut session = tracker.get_session(&id).unwrap();
        session.start_time = Utc::now() - chrono::Duration::hours(10);
        tracker.store().put_session(session.clone()).unwrap();

        let ended = tracker.end_session(&id, "success", None, None).unwrap();
        assert!(ended.duration_capped);
        assert_eq!(ended.duration_minutes, 240.0);

        let closed = tracker.get_session(&id).unwrap();
        assert_eq!(closed.end_time, Some(session.start_time + chrono::Duration::hours(4)));
        assert!(closed.notes.contains("exceeded 4.0h max, was 10.0h"));
    }

    #[test]
    fn test_negative_cap_never_ends_before_start() {
        let dir = TempDir::new().unwrap();
        let limits: crate::config::Config =
            toml::from_str("[session]\nmax_duration_hours = -1.0").unwrap();
        let tracker = SessionTracker::new(
            RecordStore::new(dir.path()),
            Vocabulary::default(),
            limits.session,
        );
        let id = start(&tracker, "Negative cap", "foreground");

        let mut session = tracker.get_session(&id).unwrap();
        session.start_time = Utc::now() - chrono::Duration::hours(10);
        tracker.store().put_session(session).unwrap();

        let ended = tracker.end_session(&id, "success", None, None).unwrap();
        assert!(ended.duration_capped);
        assert_eq!(ended.duration_minutes, 240.0);

        let closed = tracker.get_session(&id).unwrap();
        assert!(closed.end_time.unwrap() >= closed.start_time);
        assert!(closed.notes.contains("exceeded 4.0h max"));
    }

    #[test]
    fn test_auto_close_caps_duration() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let old = start(&tracker, "Old", "background");

        let mut session = tracker.get_session(&old).unwrap();
        session.start_time = Utc::now() - chrono::Duration::hours(12);
        tracker.store().put_session(session).unwrap();

        start(&tracker, "New", "background");
        let closed = tracker.get_session(&old).unwrap();
        assert_eq!(closed.duration_minutes(), Some(240.0));
        assert!(closed.notes.contains("[Auto-closed: new session started; exceeded 4.0h max"));
    }

    #[test]
    fn test_completed_session_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let id = start(&tracker, "S", "foreground");
        tracker.end_session(&id, "partial", None, None).unwrap();

        let err = tracker.end_session(&id, "success", None, None).unwrap_err();
        assert_eq!(err.kind(), "state_violation");
        let err = tracker.log_interaction(&id, "p", "r", 4, None, None).unwrap_err();
        assert_eq!(err.kind(), "state_violation");
        let err = tracker.flag_issue(&id, "t", "d", "low").unwrap_err();
        assert_eq!(err.kind(), "state_violation");

        let file = dir.path().join("late.py");
        std::fs::write(&file, "def late():\n    return 1\n").unwrap();
        let change = FunctionChange {
            name: "late".into(),
            modification_type: crate::models::ModificationType::Added,
            lines_added: 2,
            lines_modified: 0,
            lines_deleted: 0,
        };
        let err = tracker.log_code_metrics(&id, &file, &[change]).unwrap_err();
        assert_eq!(err.kind(), "state_violation");

        assert!(tracker.store().interactions().is_empty());
        assert!(tracker.store().issues().is_empty());
        assert!(tracker.get_session(&id).unwrap().code_metrics.is_empty());
        assert_eq!(tracker.get_session(&id).unwrap().outcome, Some(Outcome::Partial));
    }

    #[test]
    fn test_end_without_any_estimate_is_state_violation() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let id = start(&tracker, "Legacy", "foreground");

        let mut session = tracker.get_session(&id).unwrap();
        session.initial_estimate_minutes = None;
        tracker.store().put_session(session).unwrap();

        let err = tracker.end_session(&id, "success", None, None).unwrap_err();
        assert_eq!(err.kind(), "state_violation");
        assert!(tracker.end_session(&id, "success", Some(30.0), None).is_ok());
    }

    #[test]
    fn test_close_active_sessions() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        start(&tracker, "fg", "foreground");
        start(&tracker, "bg", "background");

        let closed = tracker.close_active_sessions("server shutdown").unwrap();
        assert_eq!(closed.len(), 2);
        assert!(tracker.get_active_sessions().is_empty());
        assert!(tracker.close_active_sessions("again").unwrap().is_empty());
    }

    #[test]
    fn test_log_code_metrics() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let id = start(&tracker, "S", "foreground");

        let file = dir.path().join("lib.py");
        std::fs::write(
            &file,
            "def greet(name: str) -> str:\n    \"\"\"Say hello.\"\"\"\n    if name:\n        return 'hi ' + name\n    return 'hi'\n",
        )
        .unwrap();

        let changes = vec![
            FunctionChange {
                name: "greet".into(),
                modification_type: crate::models::ModificationType::Modified,
                lines_added: 4,
                lines_modified: 2,
                lines_deleted: 0,
            },
            FunctionChange {
                name: "missing".into(),
                modification_type: crate::models::ModificationType::Added,
                lines_added: 10,
                lines_modified: 0,
                lines_deleted: 0,
            },
        ];
        let logged = tracker.log_code_metrics(&id, &file, &changes).unwrap();
        assert_eq!(logged.functions_analyzed, 1);
        assert_eq!(logged.functions_skipped, vec!["missing".to_string()]);
        assert_eq!(logged.average_complexity, 2.0);
        // 4 + 2*0.5 + 2*0.1
        assert!((logged.total_effort_score - 5.2).abs() < 1e-9);

        let session = tracker.get_session(&id).unwrap();
        assert_eq!(session.code_metrics.len(), 1);
        assert_eq!(session.code_metrics[0].functions[0].function_name, "greet");

        let err = tracker
            .log_code_metrics(&id, &dir.path().join("nope.py"), &changes)
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_interaction_aggregates_scoped_to_session() {
        let interactions = vec![
            Interaction::new("a", "p", "r", 5, 1, vec![]),
            Interaction::new("b", "p", "r", 1, 1, vec![]),
            Interaction::new("a", "p", "r", 4, 1, vec![]),
        ];
        assert_eq!(interaction_aggregates(&interactions, "a"), (2, 4.5));
        assert_eq!(interaction_aggregates(&interactions, "c"), (0, 0.0));
    }
}
