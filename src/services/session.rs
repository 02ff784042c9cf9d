//! Per-upload session lifecycle.
//!
//! A session moves through `Idle -> Parsing -> Ready -> Analyzing ->
//! Complete`, with `Failed` reachable from `Parsing` and `Analyzing`. Only
//! one analysis may be in flight per session. Every upload bumps the
//! session generation, and any completion that arrives carrying an older
//! generation is discarded instead of overwriting newer state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use moka::sync::Cache;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AnalysisConfig, AnalysisResult, ChartSet, Table};
use crate::services::sheet::charts_for_table;

/// A finished analysis together with what the export layer needs.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedAnalysis {
    pub result: AnalysisResult,
    pub file_name: String,
    pub config: AnalysisConfig,
    pub completed_at: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    Parsing,
    Ready {
        table: Arc<Table>,
    },
    Analyzing {
        table: Arc<Table>,
        previous: Option<Arc<CompletedAnalysis>>,
    },
    Complete {
        table: Arc<Table>,
        analysis: Arc<CompletedAnalysis>,
    },
    Failed {
        table: Option<Arc<Table>>,
        error: String,
        previous: Option<Arc<CompletedAnalysis>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Parsing,
    Ready,
    Analyzing,
    Complete,
    Failed,
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::Parsing => SessionStatus::Parsing,
            SessionState::Ready { .. } => SessionStatus::Ready,
            SessionState::Analyzing { .. } => SessionStatus::Analyzing,
            SessionState::Complete { .. } => SessionStatus::Complete,
            SessionState::Failed { .. } => SessionStatus::Failed,
        }
    }

    pub fn table(&self) -> Option<&Arc<Table>> {
        match self {
            SessionState::Ready { table }
            | SessionState::Analyzing { table, .. }
            | SessionState::Complete { table, .. } => Some(table),
            SessionState::Failed { table, .. } => table.as_ref(),
            SessionState::Idle | SessionState::Parsing => None,
        }
    }

    /// Most recent successful analysis, kept across a failed re-analysis.
    pub fn latest_analysis(&self) -> Option<&Arc<CompletedAnalysis>> {
        match self {
            SessionState::Complete { analysis, .. } => Some(analysis),
            SessionState::Analyzing { previous, .. } | SessionState::Failed { previous, .. } => {
                previous.as_ref()
            }
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SessionState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// A new upload is accepted in every state and drops the old table.
    pub fn start_parsing(&self) -> SessionState {
        SessionState::Parsing
    }

    pub fn finish_parsing(&self, outcome: Result<Arc<Table>, String>) -> Result<SessionState, AppError> {
        match self {
            SessionState::Parsing => Ok(match outcome {
                Ok(table) => SessionState::Ready { table },
                Err(error) => SessionState::Failed {
                    table: None,
                    error,
                    previous: None,
                },
            }),
            _ => Err(AppError::Superseded),
        }
    }

    pub fn start_analysis(&self) -> Result<(SessionState, Arc<Table>), AppError> {
        let (table, previous) = match self {
            SessionState::Analyzing { .. } => return Err(AppError::AnalysisInProgress),
            SessionState::Ready { table } => (table.clone(), None),
            SessionState::Complete { table, analysis } => (table.clone(), Some(analysis.clone())),
            SessionState::Failed {
                table: Some(table),
                previous,
                ..
            } => (table.clone(), previous.clone()),
            SessionState::Idle | SessionState::Parsing | SessionState::Failed { table: None, .. } => {
                return Err(AppError::NoTable)
            }
        };
        Ok((
            SessionState::Analyzing {
                table: table.clone(),
                previous,
            },
            table,
        ))
    }

    pub fn finish_analysis(
        &self,
        outcome: Result<Arc<CompletedAnalysis>, String>,
    ) -> Result<SessionState, AppError> {
        match self {
            SessionState::Analyzing { table, previous } => Ok(match outcome {
                Ok(analysis) => SessionState::Complete {
                    table: table.clone(),
                    analysis,
                },
                Err(error) => SessionState::Failed {
                    table: Some(table.clone()),
                    error,
                    previous: previous.clone(),
                },
            }),
            _ => Err(AppError::Superseded),
        }
    }
}

/// Proof that the holder started a transition; completions with a stale
/// ticket are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub session: Uuid,
    pub generation: u64,
}

#[derive(Debug)]
struct Session {
    state: SessionState,
    generation: u64,
    file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub status: SessionStatus,
    pub file_name: Option<String>,
    pub row_count: Option<usize>,
    pub column_count: Option<usize>,
    pub error: Option<String>,
    pub has_analysis: bool,
}

/// Idle sessions are dropped after this long unless configured otherwise.
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(60 * 60);
const MAX_SESSIONS: u64 = 1024;

pub struct SessionStore {
    sessions: Cache<Uuid, Arc<Mutex<Session>>>,
    charts: Cache<(Uuid, u64), Arc<ChartSet>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_idle_timeout(DEFAULT_SESSION_IDLE)
    }

    /// Sessions not touched for `idle` are evicted together with their
    /// table and analysis.
    pub fn with_idle_timeout(idle: Duration) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(MAX_SESSIONS)
                .time_to_idle(idle)
                .eviction_listener(|id: Arc<Uuid>, _, cause| {
                    tracing::debug!("Session {} evicted ({:?})", id, cause);
                })
                .build(),
            charts: Cache::builder()
                .max_capacity(256)
                .time_to_idle(idle)
                .build(),
        }
    }

    fn session(&self, id: Uuid) -> Result<Arc<Mutex<Session>>, AppError> {
        self.sessions.get(&id).ok_or(AppError::SessionNotFound(id))
    }

    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            Arc::new(Mutex::new(Session {
                state: SessionState::Idle,
                generation: 0,
                file_name: None,
            })),
        );
        tracing::info!("Created session {}", id);
        id
    }

    pub fn remove(&self, id: Uuid) -> Result<(), AppError> {
        let entry = self.sessions.remove(&id).ok_or(AppError::SessionNotFound(id))?;
        let generation = entry.lock().generation;
        self.charts.invalidate(&(id, generation));
        tracing::info!("Removed session {}", id);
        Ok(())
    }

    pub fn begin_parsing(&self, id: Uuid, file_name: &str) -> Result<Ticket, AppError> {
        let entry = self.session(id)?;
        let mut session = entry.lock();

        if session.state.status() == SessionStatus::Analyzing {
            tracing::warn!("Session {} replaced while an analysis was running", id);
        }
        self.charts.invalidate(&(id, session.generation));
        session.state = session.state.start_parsing();
        session.generation += 1;
        session.file_name = Some(file_name.to_string());

        Ok(Ticket {
            session: id,
            generation: session.generation,
        })
    }

    pub fn finish_parsing(
        &self,
        ticket: Ticket,
        outcome: Result<Table, AppError>,
    ) -> Result<Arc<Table>, AppError> {
        let entry = self.current(ticket)?;
        let mut session = entry.lock();
        check_generation(&session, ticket)?;

        let (state_outcome, result) = match outcome {
            Ok(table) => {
                let table = Arc::new(table);
                (Ok(table.clone()), Ok(table))
            }
            Err(err) => (Err(err.to_string()), Err(err)),
        };
        session.state = session.state.finish_parsing(state_outcome)?;
        result
    }

    /// Moves the session to `Analyzing` and hands back the table and file
    /// name to analyze.
    pub fn begin_analysis(&self, id: Uuid) -> Result<(Ticket, Arc<Table>, String), AppError> {
        let entry = self.session(id)?;
        let mut session = entry.lock();

        let (next, table) = session.state.start_analysis()?;
        session.state = next;
        Ok((
            Ticket {
                session: id,
                generation: session.generation,
            },
            table,
            session.file_name.clone().unwrap_or_default(),
        ))
    }

    pub fn finish_analysis(
        &self,
        ticket: Ticket,
        outcome: Result<CompletedAnalysis, AppError>,
    ) -> Result<Arc<CompletedAnalysis>, AppError> {
        let entry = self.current(ticket).map_err(|err| {
            tracing::info!("Discarding analysis for removed session {}", ticket.session);
            err
        })?;
        let mut session = entry.lock();
        if let Err(err) = check_generation(&session, ticket) {
            tracing::info!("Discarding analysis for replaced session {}", ticket.session);
            return Err(err);
        }

        let (state_outcome, result) = match outcome {
            Ok(analysis) => {
                let analysis = Arc::new(analysis);
                (Ok(analysis.clone()), Ok(analysis))
            }
            Err(err) => (Err(err.to_string()), Err(err)),
        };
        session.state = session.state.finish_analysis(state_outcome)?;
        result
    }

    pub fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot, AppError> {
        let entry = self.session(id)?;
        let session = entry.lock();
        let table = session.state.table();

        Ok(SessionSnapshot {
            id,
            status: session.state.status(),
            file_name: session.file_name.clone(),
            row_count: table.map(|t| t.row_count()),
            column_count: table.map(|t| t.column_count()),
            error: session.state.error().map(str::to_string),
            has_analysis: session.state.latest_analysis().is_some(),
        })
    }

    pub fn latest_analysis(&self, id: Uuid) -> Result<Arc<CompletedAnalysis>, AppError> {
        let entry = self.session(id)?;
        let session = entry.lock();
        session.state.latest_analysis().cloned().ok_or(AppError::NoAnalysis)
    }

    /// Chart series for the session's current table, computed once per
    /// upload.
    pub fn charts(&self, id: Uuid) -> Result<Arc<ChartSet>, AppError> {
        let (table, generation) = {
            let entry = self.session(id)?;
            let session = entry.lock();
            let table = session.state.table().cloned().ok_or(AppError::NoTable)?;
            (table, session.generation)
        };
        Ok(self
            .charts
            .get_with((id, generation), || Arc::new(charts_for_table(&table))))
    }

    /// Session a ticket was issued for; a removed or expired session
    /// counts as superseded.
    fn current(&self, ticket: Ticket) -> Result<Arc<Mutex<Session>>, AppError> {
        self.sessions.get(&ticket.session).ok_or(AppError::Superseded)
    }
}

fn check_generation(session: &Session, ticket: Ticket) -> Result<(), AppError> {
    if session.generation == ticket.generation {
        Ok(())
    } else {
        Err(AppError::Superseded)
    }
}
