//! AI session tracker - measure what AI-assisted development actually buys you
//!
//! Record work sessions, the interactions inside them and the problems hit
//! along the way, then turn the history into ROI and effectiveness numbers.
//!
//! # Overview
//!
//! Everything lives in three JSON files inside a storage directory
//! (`.ai_sessions` by default). A session belongs to an execution context,
//! and each context holds at most one active session at a time: starting a
//! new one closes the previous one as `partial`.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`store`] | Atomic JSON persistence with corruption recovery |
//! | [`tracker`] | Session lifecycle: start, log, flag, end |
//! | [`stats`] | ROI, effectiveness distribution, idle gaps |
//! | [`report`] | Text rendering of a summary report |
//! | [`code_metrics`] | Complexity and doc-quality scan of changed functions |
//!
//! # Quick Start
//!
//! ```no_run
//! use ai_session_tracker::{Config, SessionTracker, StatisticsEngine};
//!
//! let config = Config::load();
//! let tracker = SessionTracker::from_config(&config);
//!
//! let started = tracker
//!     .start_session(
//!         "Add login form",
//!         "code_generation",
//!         "some-model",
//!         120.0,
//!         "manual",
//!         &config.developer(),
//!         &config.project(),
//!         "foreground",
//!     )
//!     .unwrap();
//!
//! tracker
//!     .log_interaction(&started.session_id, "Write the form", "Done", 4, None, None)
//!     .unwrap();
//! tracker
//!     .end_session(&started.session_id, "success", None, None)
//!     .unwrap();
//!
//! let engine = StatisticsEngine::from_config(&config);
//! let report = engine.session_report(tracker.store(), None).unwrap();
//! println!("Productivity: {:.1}x", report.roi.productivity_multiplier);
//! ```

pub mod code_metrics;
pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod stats;
pub mod store;
pub mod tracker;

pub use config::Config;
pub use error::{Result, TrackerError};
pub use models::{
    ExecutionContext, FileMetrics, FunctionChange, FunctionMetrics, Interaction, Issue,
    ModificationType, Outcome, Session, SessionStatus,
};
pub use stats::{RoiMetrics, SessionGap, StatisticsEngine, SummaryReport};
pub use store::{Collection, RecordStore, SessionMap};
pub use tracker::{
    CodeMetricsLogged, InteractionLogged, SessionEnded, SessionTracker, StartedSession,
};
