use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::lock;
use crate::domain::{Material, NodeKind};
use crate::error::PolymixError;
use crate::error_log::ErrorLog;
use crate::inventory::{InventoryCategory, InventoryRegistrar, Registration};
use crate::resolver::{Outcome, Resolution, Session, expect_resolved};
use crate::rows::{NumberedRow, Row};
use crate::store::EntityStore;

pub const MAX_WORKERS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Source line of the row the event belongs to.
    pub line: Option<usize>,
    pub level: EventLevel,
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn info(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            line,
            level: EventLevel::Info,
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn error(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            line,
            level: EventLevel::Error,
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Uploaded,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowReport {
    pub line: usize,
    pub status: RowStatus,
    pub citation: Outcome,
    pub solvent: Outcome,
    pub polymer: Option<Outcome>,
    pub mixture: Option<Outcome>,
    pub mixture_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OutcomeCounts {
    pub created: usize,
    pub updated: usize,
    pub found: usize,
    pub cached: usize,
}

impl OutcomeCounts {
    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Found => self.found += 1,
            Outcome::Cached => self.cached += 1,
            Outcome::NotFound => {}
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub finished_at: String,
    pub workers: usize,
    pub rows: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub skipped_lines: Vec<usize>,
    pub citations: OutcomeCounts,
    pub polymers: OutcomeCounts,
    pub mixtures: OutcomeCounts,
    pub error_log: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub rows: usize,
    pub complete: usize,
    pub incomplete: Vec<IncompleteRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncompleteRow {
    pub line: usize,
    pub missing: Vec<&'static str>,
}

/// Validates rows without touching the store.
pub fn check_rows(rows: &[NumberedRow]) -> CheckResult {
    let incomplete: Vec<IncompleteRow> = rows
        .iter()
        .filter_map(|numbered| {
            let missing = numbered.row.missing_fields();
            (!missing.is_empty()).then_some(IncompleteRow {
                line: numbered.line,
                missing,
            })
        })
        .collect();
    CheckResult {
        rows: rows.len(),
        complete: rows.len() - incomplete.len(),
        incomplete,
    }
}

/// Drives rows through the resolvers and inventories.
pub struct Uploader<S: EntityStore> {
    session: Session<S>,
    inventories: InventoryRegistrar,
    error_log: ErrorLog,
}

impl<S: EntityStore> Uploader<S> {
    pub fn new(session: Session<S>, base_inventory: &str, error_log: ErrorLog) -> Self {
        let inventories = InventoryRegistrar::new(
            session.group_uid(),
            session.collection_uid(),
            base_inventory,
        );
        Self {
            session,
            inventories,
            error_log,
        }
    }

    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    pub fn inventories(&self) -> &InventoryRegistrar {
        &self.inventories
    }

    /// Uploads every row. With one worker rows go in file order; with more,
    /// rows are spread over a fixed pool with no ordering between them.
    ///
    /// The first store failure stops dispatching new rows and is returned
    /// once in-flight rows finish. Work already saved stays saved.
    pub fn run(
        &self,
        rows: &[NumberedRow],
        workers: usize,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, PolymixError> {
        let workers = workers.clamp(1, MAX_WORKERS);
        let started_at = Utc::now().to_rfc3339();
        let start = Instant::now();
        info!(rows = rows.len(), workers, "upload started");

        let mut reports = if workers == 1 {
            let mut reports = Vec::with_capacity(rows.len());
            for numbered in rows {
                reports.push(self.upload_row(numbered.line, &numbered.row, sink)?);
            }
            reports
        } else {
            self.run_pool(rows, workers, sink)?
        };
        reports.sort_by_key(|report| report.line);

        let mut summary = RunSummary {
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            workers,
            rows: rows.len(),
            uploaded: 0,
            skipped: 0,
            skipped_lines: Vec::new(),
            citations: OutcomeCounts::default(),
            polymers: OutcomeCounts::default(),
            mixtures: OutcomeCounts::default(),
            error_log: self.error_log.path().to_string(),
        };
        for report in &reports {
            summary.citations.add(report.citation);
            match report.status {
                RowStatus::Uploaded => summary.uploaded += 1,
                RowStatus::Skipped => {
                    summary.skipped += 1;
                    summary.skipped_lines.push(report.line);
                }
            }
            if let Some(outcome) = report.polymer {
                summary.polymers.add(outcome);
            }
            if let Some(outcome) = report.mixture {
                summary.mixtures.add(outcome);
            }
        }

        sink.event(ProgressEvent {
            line: None,
            level: EventLevel::Info,
            message: format!(
                "Finished: {} uploaded, {} skipped",
                summary.uploaded, summary.skipped
            ),
            elapsed: Some(start.elapsed()),
        });
        info!(
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            "upload finished"
        );
        Ok(summary)
    }

    fn run_pool(
        &self,
        rows: &[NumberedRow],
        workers: usize,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<RowReport>, PolymixError> {
        let (tx, rx) = crossbeam_channel::bounded::<&NumberedRow>(workers);
        let failed = AtomicBool::new(false);
        let first_error: Mutex<Option<PolymixError>> = Mutex::new(None);
        let reports: Mutex<Vec<RowReport>> = Mutex::new(Vec::with_capacity(rows.len()));

        let joined = thread::scope(|scope| {
            let (failed, first_error, reports) = (&failed, &first_error, &reports);
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let rx = rx.clone();
                    scope.spawn(move || {
                        for numbered in rx.iter() {
                            if failed.load(Ordering::SeqCst) {
                                break;
                            }
                            match self.upload_row(numbered.line, &numbered.row, sink) {
                                Ok(report) => lock(reports).push(report),
                                Err(err) => {
                                    debug!(worker, line = numbered.line, "worker stopping: {err}");
                                    failed.store(true, Ordering::SeqCst);
                                    lock(first_error).get_or_insert(err);
                                    break;
                                }
                            }
                        }
                    })
                })
                .collect();
            drop(rx);

            for numbered in rows {
                if failed.load(Ordering::SeqCst) || tx.send(numbered).is_err() {
                    break;
                }
            }
            drop(tx);

            handles
                .into_iter()
                .map(|handle| handle.join())
                .filter(Result::is_err)
                .count()
        });

        if let Some(err) = lock(&first_error).take() {
            return Err(err);
        }
        if joined > 0 {
            return Err(PolymixError::Worker(format!("{joined} upload worker(s) panicked")));
        }
        Ok(reports.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Resolves and registers everything one row describes.
    ///
    /// A solvent missing from the store is recorded in the error log and
    /// skips the rest of the row; any other failure is returned.
    pub fn upload_row(
        &self,
        line: usize,
        row: &Row,
        sink: &dyn ProgressSink,
    ) -> Result<RowReport, PolymixError> {
        let say = |message: String| sink.event(ProgressEvent::info(Some(line), message));

        let title = row.reference.clone().unwrap_or_default();
        let (citation, citation_outcome) = expect_resolved(
            self.session.resolve_citation(&title)?,
            NodeKind::Reference,
            &title,
        )?;
        say(format!("{} reference: {}", citation_outcome.verb(), citation.title()));

        let cas = row.solvent_cas.clone().unwrap_or_default();
        let solvent = match self.session.resolve_solvent(&cas)? {
            Resolution::NotFound => {
                let name = row.solvent.as_deref().unwrap_or_default();
                self.error_log.record(
                    Some(line),
                    &format!("ROW {line} -- Solvent not found: {name} ({cas})"),
                    sink,
                );
                return Ok(RowReport {
                    line,
                    status: RowStatus::Skipped,
                    citation: citation_outcome,
                    solvent: Outcome::NotFound,
                    polymer: None,
                    mixture: None,
                    mixture_name: None,
                });
            }
            resolution => expect_resolved(resolution, NodeKind::Material, &cas)?,
        };
        let (solvent, solvent_outcome) = solvent;
        say(format!("{} solvent: {}", solvent_outcome.verb(), solvent.name));
        self.register(InventoryCategory::Solvents, &solvent, &say)?;

        let (polymer, polymer_outcome) = expect_resolved(
            self.session.resolve_polymer(row, &citation)?,
            NodeKind::Material,
            row.polymer.as_deref().unwrap_or_default(),
        )?;
        say(format!("{} polymer: {}", polymer_outcome.verb(), polymer.name));
        self.register(InventoryCategory::Polymers, &polymer, &say)?;

        let (mixture, mixture_outcome) = expect_resolved(
            self.session
                .resolve_mixture(line, row, &polymer, &solvent, &citation)?,
            NodeKind::Material,
            &polymer.name,
        )?;
        say(format!("{} mixture: {}", mixture_outcome.verb(), mixture.name));
        self.register(InventoryCategory::Mixtures, &mixture, &say)?;

        Ok(RowReport {
            line,
            status: RowStatus::Uploaded,
            citation: citation_outcome,
            solvent: solvent_outcome,
            polymer: Some(polymer_outcome),
            mixture: Some(mixture_outcome),
            mixture_name: Some(mixture.name),
        })
    }

    fn register(
        &self,
        category: InventoryCategory,
        material: &Material,
        say: &dyn Fn(String),
    ) -> Result<Registration, PolymixError> {
        let registration = self
            .inventories
            .register(self.session.store(), category, material)?;
        if let Some(outcome) = registration.resolved {
            say(format!("{} inventory: {}", outcome.verb(), registration.inventory));
        }
        if registration.added {
            say(format!("Updated {category} inventory."));
        }
        Ok(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_flags_incomplete_rows() {
        let rows = vec![
            NumberedRow {
                line: 2,
                row: Row {
                    solvent_cas: Some("108-88-3".to_string()),
                    polymer: Some("PS".to_string()),
                    ..Row::default()
                },
            },
            NumberedRow {
                line: 3,
                row: Row::default(),
            },
        ];

        let result = check_rows(&rows);
        assert_eq!(result.rows, 2);
        assert_eq!(result.complete, 1);
        assert_eq!(result.incomplete.len(), 1);
        assert_eq!(result.incomplete[0].line, 3);
        assert_eq!(result.incomplete[0].missing, vec!["solvent_CAS", "polymer"]);
    }
}
