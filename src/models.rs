//! Record types persisted by the store
//!
//! Sessions own their interactions and issues through a `session_id`
//! back-reference; the three live in separate collections so appending an
//! interaction never rewrites the session map.

use crate::error::TrackerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

/// Lowest and highest effectiveness rating
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

// ============================================================================
// Enumerations
// ============================================================================

/// Session state. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the session runs. One active session is allowed per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionContext {
    /// Interactive editor/chat work
    #[default]
    Foreground,
    /// Batch, CLI or automation work
    Background,
}

impl ExecutionContext {
    pub const ALL: [ExecutionContext; 2] = [ExecutionContext::Foreground, ExecutionContext::Background];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionContext::Foreground => "foreground",
            ExecutionContext::Background => "background",
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionContext {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "foreground" => Ok(ExecutionContext::Foreground),
            "background" => Ok(ExecutionContext::Background),
            _ => Err(TrackerError::Validation(format!(
                "execution_context must be one of: background, foreground (got '{}')",
                s
            ))),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "partial" => Ok(Outcome::Partial),
            "failed" => Ok(Outcome::Failed),
            _ => Err(TrackerError::Validation(format!(
                "outcome must be one of: failed, partial, success (got '{}')",
                s
            ))),
        }
    }
}

/// What happened to a function in a code change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    Added,
    Modified,
    Refactored,
    Deleted,
}

impl FromStr for ModificationType {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(ModificationType::Added),
            "modified" => Ok(ModificationType::Modified),
            "refactored" => Ok(ModificationType::Refactored),
            "deleted" => Ok(ModificationType::Deleted),
            _ => Err(TrackerError::Validation(format!(
                "modification_type must be one of: added, deleted, modified, refactored (got '{}')",
                s
            ))),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// One tracked unit of AI-assisted work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(alias = "session_name")]
    pub name: String,
    pub task_type: String,
    #[serde(default)]
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "unknown")]
    pub model_name: String,
    /// Human estimate before work started
    #[serde(default, alias = "human_time_estimate_minutes")]
    pub initial_estimate_minutes: Option<f64>,
    /// Effort proxy recorded at close
    #[serde(default)]
    pub final_estimate_minutes: Option<f64>,
    #[serde(default = "unknown")]
    pub estimate_source: String,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub execution_context: ExecutionContext,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub total_interactions: u32,
    #[serde(default)]
    pub avg_effectiveness: f64,
    #[serde(default)]
    pub code_metrics: Vec<FileMetrics>,
}

fn unknown() -> String {
    "unknown".to_string()
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Elapsed minutes for completed sessions, `None` while active
    pub fn duration_minutes(&self) -> Option<f64> {
        if !self.is_completed() {
            return None;
        }
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 60_000.0)
    }

    /// Human baseline: final estimate when recorded, else the initial one
    pub fn baseline_minutes(&self) -> Option<f64> {
        self.final_estimate_minutes.or(self.initial_estimate_minutes)
    }

    /// Append an annotation to the notes, space-separated
    pub fn annotate(&mut self, note: &str) {
        if self.notes.trim().is_empty() {
            self.notes = note.to_string();
        } else {
            self.notes = format!("{} {}", self.notes.trim_end(), note);
        }
    }
}

/// One logged exchange within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub response_summary: String,
    pub effectiveness_rating: u8,
    #[serde(default = "one")]
    pub iteration_count: u32,
    #[serde(default)]
    pub tools_used: Vec<String>,
}

fn one() -> u32 {
    1
}

impl Interaction {
    /// Build an interaction, clamping the rating to 1..=5 and the
    /// iteration count to at least 1
    pub fn new(
        session_id: &str,
        prompt: &str,
        response_summary: &str,
        effectiveness_rating: i64,
        iteration_count: i64,
        tools_used: Vec<String>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            prompt: prompt.to_string(),
            response_summary: response_summary.to_string(),
            effectiveness_rating: clamp_rating(effectiveness_rating),
            iteration_count: iteration_count.clamp(1, i64::from(u32::MAX)) as u32,
            tools_used,
        }
    }
}

/// Clamp a raw rating into 1..=5
pub fn clamp_rating(rating: i64) -> u8 {
    rating.clamp(i64::from(MIN_RATING), i64::from(MAX_RATING)) as u8
}

/// A flagged problem within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub issue_type: String,
    pub description: String,
    pub severity: String,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolution_notes: String,
}

impl Issue {
    pub fn new(session_id: &str, issue_type: &str, description: &str, severity: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            issue_type: issue_type.to_string(),
            description: description.to_string(),
            severity: severity.to_string(),
            resolved: false,
            resolution_notes: String::new(),
        }
    }
}

/// Code metrics for one file touched in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub file_path: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub functions: Vec<FunctionMetrics>,
}

/// Per-function effort record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetrics {
    pub function_name: String,
    pub modification_type: ModificationType,
    #[serde(default)]
    pub lines_added: u32,
    #[serde(default)]
    pub lines_modified: u32,
    #[serde(default)]
    pub lines_deleted: u32,
    #[serde(default = "one")]
    pub complexity: u32,
    /// 0-100
    #[serde(default)]
    pub documentation_score: u32,
    #[serde(default)]
    pub has_docstring: bool,
    #[serde(default)]
    pub has_type_hints: bool,
    #[serde(default)]
    pub effort_score: f64,
}

impl FunctionMetrics {
    /// Complexity of pre-existing code the change had to work within.
    /// Brand-new functions carry none.
    pub fn context_complexity(&self) -> u32 {
        if self.modification_type == ModificationType::Added {
            0
        } else {
            self.complexity
        }
    }

    pub fn compute_effort_score(&self) -> f64 {
        f64::from(self.lines_added)
            + f64::from(self.lines_modified) * 0.5
            + f64::from(self.context_complexity()) * 0.1
    }
}

/// Caller-supplied description of a changed function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionChange {
    pub name: String,
    pub modification_type: ModificationType,
    #[serde(default)]
    pub lines_added: u32,
    #[serde(default)]
    pub lines_modified: u32,
    #[serde(default)]
    pub lines_deleted: u32,
}

// ============================================================================
// Session IDs
// ============================================================================

static LAST_ID_MICROS: AtomicI64 = AtomicI64::new(0);

/// Generate a session id from the name and a timestamp.
///
/// The timestamp component is strictly increasing within the process, so two
/// sessions started in the same microsecond still get distinct ids.
pub fn generate_session_id(name: &str, now: DateTime<Utc>) -> String {
    let wanted = now.timestamp_micros();
    let previous = LAST_ID_MICROS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(if wanted > last { wanted } else { last + 1 })
        })
        .unwrap_or_else(|last| last);
    let micros = if wanted > previous { wanted } else { previous + 1 };

    let stamp = DateTime::<Utc>::from_timestamp_micros(micros)
        .unwrap_or(now)
        .format("%Y%m%d_%H%M%S_%6f");
    format!("{}_{}", slugify(name), stamp)
}

/// Lowercase, underscores for separators, at most 30 chars
fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(30)
        .collect();
    if slug.is_empty() {
        "session".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample_session() -> Session {
        Session {
            id: "s1".to_string(),
            name: "Sample".to_string(),
            task_type: "testing".to_string(),
            status: SessionStatus::Active,
            start_time: Utc::now(),
            end_time: None,
            model_name: "test-model".to_string(),
            initial_estimate_minutes: Some(60.0),
            final_estimate_minutes: None,
            estimate_source: "manual".to_string(),
            developer: "dev".to_string(),
            project: "proj".to_string(),
            execution_context: ExecutionContext::Foreground,
            outcome: None,
            notes: String::new(),
            total_interactions: 0,
            avg_effectiveness: 0.0,
            code_metrics: Vec::new(),
        }
    }

    #[test]
    fn test_clamp_rating() {
        assert_eq!(clamp_rating(-3), 1);
        assert_eq!(clamp_rating(0), 1);
        assert_eq!(clamp_rating(3), 3);
        assert_eq!(clamp_rating(9), 5);
    }

    #[test]
    fn test_interaction_clamps_iterations() {
        let i = Interaction::new("s1", "p", "r", 7, 0, vec![]);
        assert_eq!(i.effectiveness_rating, 5);
        assert_eq!(i.iteration_count, 1);
    }

    #[test]
    fn test_session_ids_unique_and_readable() {
        let now = Utc::now();
        let ids: HashSet<String> = (0..200)
            .map(|_| generate_session_id("Add Login-Feature", now))
            .collect();
        assert_eq!(ids.len(), 200);
        assert!(ids.iter().all(|id| id.starts_with("add_login_feature_")));
    }

    #[test]
    fn test_slugify_truncates_and_defaults() {
        assert_eq!(slugify("!!!"), "session");
        assert_eq!(slugify(&"a".repeat(50)).len(), 30);
    }

    #[test]
    fn test_duration_only_for_completed() {
        let mut s = sample_session();
        assert_eq!(s.duration_minutes(), None);
        s.status = SessionStatus::Completed;
        s.end_time = Some(s.start_time + chrono::Duration::minutes(90));
        s.outcome = Some(Outcome::Success);
        assert_eq!(s.duration_minutes(), Some(90.0));
    }

    #[test]
    fn test_baseline_prefers_final_estimate() {
        let mut s = sample_session();
        assert_eq!(s.baseline_minutes(), Some(60.0));
        s.final_estimate_minutes = Some(45.0);
        assert_eq!(s.baseline_minutes(), Some(45.0));
    }

    #[test]
    fn test_annotate() {
        let mut s = sample_session();
        s.annotate("[first]");
        s.annotate("[second]");
        assert_eq!(s.notes, "[first] [second]");
    }

    #[test]
    fn test_legacy_session_keys() {
        let json = r#"{
            "id": "old_20250101_120000",
            "session_name": "Old work",
            "task_type": "debugging",
            "status": "completed",
            "start_time": "2025-01-01T12:00:00+00:00",
            "end_time": "2025-01-01T13:00:00+00:00",
            "human_time_estimate_minutes": 120.0,
            "outcome": "success"
        }"#;
        let s: Session = serde_json::from_str(json).unwrap();
        assert_eq!(s.name, "Old work");
        assert_eq!(s.initial_estimate_minutes, Some(120.0));
        assert_eq!(s.execution_context, ExecutionContext::Foreground);
        assert_eq!(s.model_name, "unknown");
        assert_eq!(s.duration_minutes(), Some(60.0));
    }

    #[test]
    fn test_effort_score() {
        let f = FunctionMetrics {
            function_name: "f".to_string(),
            modification_type: ModificationType::Modified,
            lines_added: 10,
            lines_modified: 4,
            lines_deleted: 2,
            complexity: 5,
            documentation_score: 0,
            has_docstring: false,
            has_type_hints: false,
            effort_score: 0.0,
        };
        assert!((f.compute_effort_score() - 12.5).abs() < 1e-9);

        let added = FunctionMetrics {
            modification_type: ModificationType::Added,
            ..f
        };
        assert_eq!(added.context_complexity(), 0);
        assert!((added.compute_effort_score() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("partial".parse::<Outcome>().unwrap(), Outcome::Partial);
        assert!("meh".parse::<Outcome>().is_err());
        assert_eq!(
            "background".parse::<ExecutionContext>().unwrap(),
            ExecutionContext::Background
        );
        assert!("refactored".parse::<ModificationType>().is_ok());
    }
}
