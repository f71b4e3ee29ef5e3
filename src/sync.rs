// Sync engine - profile reconciliation against the tabular store
use crate::constants;
use crate::diff;
use crate::index::{DataQualityWarning, IdentityIndex};
use crate::rate::{AdaptiveRateController, RateState};
use crate::schema::{identity_key, normalize_record, FieldId, ProfileRecord, Schema};
use crate::source::RecordSource;
use crate::store::{CellNote, ProfileStore, StoreError, StoreResult};
use crate::trackers::{MetricsTracker, SeenTracker};
use anyhow::Result;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Errors and Outcomes
// ============================================================================

#[derive(Error, Debug)]
pub enum SyncError {
    /// Record missing its identity field; skipped, never aborts the run
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Recoverable errors skip to the next record; fatal ones abort the run
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::InvalidRecord(_) => true,
            SyncError::Store(e) => e.is_recoverable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatus {
    New,
    Updated,
    Unchanged,
}

impl fmt::Display for UpsertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertStatus::New => write!(f, "NEW"),
            UpsertStatus::Updated => write!(f, "UPDATED"),
            UpsertStatus::Unchanged => write!(f, "UNCHANGED"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub status: UpsertStatus,
    /// Changed field ordinals in schema order
    pub changed_fields: Vec<FieldId>,
}

/// Where an existing record's new values land.
///
/// Some deployments prefer rows to keep their position; the authoritative
/// behavior is move-to-head, so that is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePlacement {
    #[default]
    MoveToHead,
    InPlace,
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub profiles_table: String,
    pub nick_list_table: String,
    pub dashboard_table: String,
    pub timing_log_table: String,
    /// Per-run record cutoff, 0 = unlimited
    pub max_records: usize,
    pub placement: UpdatePlacement,
    /// Value stamped into the SOURCE field of timing rows
    pub source_tag: String,
    pub base_min_delay: f64,
    pub base_max_delay: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            profiles_table: constants::PROFILES_TABLE.to_string(),
            nick_list_table: constants::NICK_LIST_TABLE.to_string(),
            dashboard_table: constants::DASHBOARD_TABLE.to_string(),
            timing_log_table: constants::TIMING_LOG_TABLE.to_string(),
            max_records: 0,
            placement: UpdatePlacement::MoveToHead,
            source_tag: "Online".to_string(),
            base_min_delay: constants::BASE_MIN_DELAY_SECS,
            base_max_delay: constants::BASE_MAX_DELAY_SECS,
        }
    }
}

// ============================================================================
// Run Stats and Logging
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub run_number: u64,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub new_profiles: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub data_quality_warnings: usize,
    pub started_at: String,
    pub finished_at: String,
}

/// Trait for reporting run progress
pub trait RunLogger: Send + Sync {
    fn on_run_start(&self, run_number: u64, indexed_profiles: usize);

    fn on_data_quality(&self, warning: &DataQualityWarning);

    fn on_record_synced(&self, ordinal: usize, identity: &str, outcome: &UpsertOutcome);

    fn on_record_failed(&self, ordinal: usize, identity: &str, error: &str);

    fn on_run_complete(&self, stats: &RunStats, rate: &RateState);

    /// Get a reference to self as Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Silent logger used when the caller does not attach one
pub struct NullLogger;

impl RunLogger for NullLogger {
    fn on_run_start(&self, _run_number: u64, _indexed_profiles: usize) {}
    fn on_data_quality(&self, _warning: &DataQualityWarning) {}
    fn on_record_synced(&self, _ordinal: usize, _identity: &str, _outcome: &UpsertOutcome) {}
    fn on_record_failed(&self, _ordinal: usize, _identity: &str, _error: &str) {}
    fn on_run_complete(&self, _stats: &RunStats, _rate: &RateState) {}
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// CLI-style logger: one line per record, summary at the end
pub struct CliLogger {
    verbose: bool,
}

impl CliLogger {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl RunLogger for CliLogger {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn on_run_start(&self, run_number: u64, indexed_profiles: usize) {
        eprintln!(
            "[Sync] Run {:03} | {} profiles indexed",
            run_number, indexed_profiles
        );
    }

    fn on_data_quality(&self, warning: &DataQualityWarning) {
        eprintln!(
            "[Index] duplicate identity '{}' (rows {} and {}), keeping the last one",
            warning.key, warning.duplicate_position, warning.kept_position
        );
    }

    fn on_record_synced(&self, ordinal: usize, identity: &str, outcome: &UpsertOutcome) {
        if self.verbose || outcome.status != UpsertStatus::Unchanged {
            eprintln!(
                "[{}] ✓ {} | {} | {} field(s) changed",
                ordinal,
                identity,
                outcome.status,
                outcome.changed_fields.len()
            );
        }
    }

    fn on_record_failed(&self, ordinal: usize, identity: &str, error: &str) {
        eprintln!("[{}] ✗ {} | FAILED | {}", ordinal, identity, error);
    }

    fn on_run_complete(&self, stats: &RunStats, rate: &RateState) {
        eprintln!(
            "[Sync] ✓ Run {:03} complete | {} processed | {} new | {} updated | {} unchanged | {} failed",
            stats.run_number, stats.processed, stats.new_profiles, stats.updated,
            stats.unchanged, stats.failed
        );
        if self.verbose {
            eprintln!(
                "[Rate] window {:.2}s-{:.2}s | penalty {} | batch hint {}",
                rate.min_delay, rate.max_delay, rate.consecutive_penalty, rate.batch_size_hint
            );
        }
    }
}

// ============================================================================
// Sync Engine
// ============================================================================

/// Reconciles incoming profile snapshots against the store.
///
/// Owns the identity index, rate controller and aggregate trackers for the
/// duration of one run; all of them are rebuilt from the store on the next
/// invocation. Strictly sequential: one record is fully reconciled before
/// the next begins, and every store mutation is paced by the controller.
pub struct SyncEngine {
    store: Arc<dyn ProfileStore>,
    schema: Schema,
    config: SyncConfig,
    index: IdentityIndex,
    rate: AdaptiveRateController,
    seen: SeenTracker,
    metrics: MetricsTracker,
    logger: Box<dyn RunLogger>,
    success_calls: usize,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ProfileStore>, schema: Schema, config: SyncConfig) -> Self {
        let rate = AdaptiveRateController::with_bounds(config.base_min_delay, config.base_max_delay);
        SyncEngine {
            store,
            schema,
            config,
            index: IdentityIndex::new(),
            rate,
            seen: SeenTracker::new(),
            metrics: MetricsTracker::new(),
            logger: Box::new(NullLogger),
            success_calls: 0,
        }
    }

    /// Set a logger for run events
    pub fn with_logger<L>(mut self, logger: L) -> Self
    where
        L: RunLogger + 'static,
    {
        self.logger = Box::new(logger);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rate_state(&self) -> &RateState {
        self.rate.state()
    }

    pub fn seen(&self) -> &SeenTracker {
        &self.seen
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    /// Wait out the controller's pacing delay before a store call
    async fn pace(&self) {
        let delay = self.rate.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Feed one store-call outcome into the rate controller
    fn observe<T>(&mut self, result: StoreResult<T>) -> Result<T, SyncError> {
        match result {
            Ok(value) => {
                self.success_calls += 1;
                self.rate.on_success();
                Ok(value)
            }
            Err(StoreError::QuotaExceeded) => {
                log::warn!("[Rate] store quota exceeded, widening backoff window");
                self.rate.on_rate_limited();
                Err(SyncError::Store(StoreError::QuotaExceeded))
            }
            Err(e) => Err(SyncError::Store(e)),
        }
    }

    /// Rebuild the identity index from a full store scan.
    ///
    /// Duplicate keys in pre-existing data are tolerated (last one wins)
    /// and returned as warnings.
    pub async fn rebuild_index(&mut self) -> Result<Vec<DataQualityWarning>, SyncError> {
        self.pace().await;
        let result = self.store.read_all(&self.config.profiles_table).await;
        let rows = self.observe(result)?;
        let (index, warnings) = IdentityIndex::build(&self.schema, rows);
        log::info!(
            "[Index] rebuilt: {} profiles, {} duplicate identities",
            index.len(),
            warnings.len()
        );
        self.index = index;
        for warning in &warnings {
            log::warn!(
                "[Index] duplicate identity '{}' at rows {} and {}, keeping last",
                warning.key,
                warning.duplicate_position,
                warning.kept_position
            );
        }
        Ok(warnings)
    }

    /// Reconcile one snapshot against the store.
    ///
    /// On a quota error mid-upsert nothing is rolled back; the index keeps
    /// the state of the last completed step and the next run's rebuild
    /// heals any resulting duplicate row.
    pub async fn upsert(&mut self, record: ProfileRecord) -> Result<UpsertOutcome, SyncError> {
        let raw_identity = record.identity(&self.schema).trim().to_string();
        if raw_identity.is_empty() {
            return Err(SyncError::InvalidRecord(
                "identity field is empty".to_string(),
            ));
        }
        let key = identity_key(&raw_identity);

        let mut incoming = record;
        normalize_record(&self.schema, &mut incoming, &constants::capture_timestamp());

        match self.index.lookup(&key).cloned() {
            None => {
                self.insert_new(&key, incoming).await?;
                // First observation: every field counts as changed
                let changed_fields: Vec<FieldId> = (0..self.schema.len()).collect();
                Ok(UpsertOutcome {
                    status: UpsertStatus::New,
                    changed_fields,
                })
            }
            Some(existing) => {
                let changed_fields = diff::diff(&self.schema, &existing.values, &incoming);
                let annotated_at = match self.config.placement {
                    UpdatePlacement::MoveToHead => {
                        self.move_to_head(
                            &key,
                            existing.position,
                            &existing.values,
                            &incoming,
                            &changed_fields,
                        )
                        .await?
                    }
                    UpdatePlacement::InPlace => {
                        self.update_in_place(
                            &key,
                            existing.position,
                            &existing.values,
                            &incoming,
                            &changed_fields,
                        )
                        .await?
                    }
                };
                log::debug!(
                    "[Sync] '{}' reconciled at row {} ({} changed)",
                    key,
                    annotated_at,
                    changed_fields.len()
                );
                let status = if changed_fields.is_empty() {
                    UpsertStatus::Unchanged
                } else {
                    UpsertStatus::Updated
                };
                Ok(UpsertOutcome {
                    status,
                    changed_fields,
                })
            }
        }
    }

    async fn insert_new(&mut self, key: &str, incoming: ProfileRecord) -> Result<(), SyncError> {
        let table = self.config.profiles_table.clone();
        self.pace().await;
        let result = self
            .store
            .insert_at_head(&table, incoming.values().to_vec())
            .await;
        self.observe(result)?;
        self.index.shift_for_insert(0);
        self.index.record(key.to_string(), 0, incoming);
        Ok(())
    }

    /// Head-insert the new values, annotate changed cells on the new row,
    /// then remove the stale row. Returns the annotated position (0).
    async fn move_to_head(
        &mut self,
        key: &str,
        old_position: usize,
        before: &ProfileRecord,
        incoming: &ProfileRecord,
        changed_fields: &[FieldId],
    ) -> Result<usize, SyncError> {
        let table = self.config.profiles_table.clone();

        self.pace().await;
        let result = self
            .store
            .insert_at_head(&table, incoming.values().to_vec())
            .await;
        self.observe(result)?;
        self.index.shift_for_insert(0);
        self.index.record(key.to_string(), 0, incoming.clone());
        let stale_position = old_position + 1;

        self.annotate_changes(&table, 0, before, incoming, changed_fields)
            .await?;

        self.pace().await;
        let result = self.store.delete_at(&table, stale_position).await;
        self.observe(result)?;
        self.index.shift_for_delete(stale_position);

        Ok(0)
    }

    /// Overwrite the existing row (no reordering) and annotate there
    async fn update_in_place(
        &mut self,
        key: &str,
        position: usize,
        before: &ProfileRecord,
        incoming: &ProfileRecord,
        changed_fields: &[FieldId],
    ) -> Result<usize, SyncError> {
        let table = self.config.profiles_table.clone();

        self.pace().await;
        let result = self
            .store
            .update_at(&table, position, incoming.values().to_vec())
            .await;
        self.observe(result)?;
        self.index.record(key.to_string(), position, incoming.clone());

        self.annotate_changes(&table, position, before, incoming, changed_fields)
            .await?;

        Ok(position)
    }

    /// One structured note per changed cell, prior and new value, never
    /// touching other cells' annotations
    async fn annotate_changes(
        &mut self,
        table: &str,
        position: usize,
        before: &ProfileRecord,
        incoming: &ProfileRecord,
        changed_fields: &[FieldId],
    ) -> Result<(), SyncError> {
        for &field in changed_fields {
            let field_name = self.schema.field_name(field).to_string();
            let note = CellNote {
                field: field_name.clone(),
                before: before.get(field).to_string(),
                after: incoming.get(field).to_string(),
                noted_at: constants::capture_timestamp(),
            };
            self.pace().await;
            let result = self
                .store
                .annotate_cell(table, position, &field_name, note)
                .await;
            self.observe(result)?;
        }
        Ok(())
    }

    /// Head-insert one timing row: [nick, timestamp, source, run number]
    async fn log_timing(
        &mut self,
        identity: &str,
        observed_at: &str,
        run_number: u64,
    ) -> Result<(), SyncError> {
        let table = self.config.timing_log_table.clone();
        let row = vec![
            identity.to_string(),
            observed_at.to_string(),
            self.config.source_tag.clone(),
            run_number.to_string(),
        ];
        self.pace().await;
        let result = self.store.insert_at_head(&table, row).await;
        self.observe(result)?;
        Ok(())
    }

    /// Flush seen-count entries touched this run to the NickList table
    async fn flush_seen(&mut self) -> Result<(), SyncError> {
        let table = self.config.nick_list_table.clone();
        let rows: Vec<Vec<String>> = self
            .seen
            .dirty_entries()
            .iter()
            .map(|entry| {
                vec![
                    entry.key.clone(),
                    entry.times_seen.to_string(),
                    entry.first_seen_at.clone(),
                    entry.last_seen_at.clone(),
                ]
            })
            .collect();
        for row in rows {
            let key = row[0].clone();
            self.pace().await;
            let result = self.store.append_or_overwrite_by_key(&table, &key, row).await;
            self.observe(result)?;
        }
        Ok(())
    }

    /// Publish the run summary to the Dashboard table, merge-by-name
    async fn flush_metrics(&mut self) -> Result<(), SyncError> {
        let table = self.config.dashboard_table.clone();
        let entries: Vec<(String, String)> = self
            .metrics
            .entries()
            .iter()
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect();
        for (name, value) in entries {
            self.pace().await;
            let result = self
                .store
                .append_or_overwrite_by_key(&table, &name, vec![name.clone(), value])
                .await;
            self.observe(result)?;
        }
        Ok(())
    }

    /// Drain a record source, reconciling each snapshot in order.
    ///
    /// Per-record failures never abort the run; setup errors and fatal
    /// store errors do. Returns the run summary that was also published to
    /// the Dashboard table.
    pub async fn run(&mut self, source: &mut dyn RecordSource) -> Result<RunStats> {
        let started_at = constants::capture_timestamp();

        // Setup phase: any store failure here aborts before records flow
        let warnings = self.rebuild_index().await?;
        for warning in &warnings {
            self.logger.on_data_quality(warning);
        }

        self.pace().await;
        let result = self.store.read_all(&self.config.nick_list_table).await;
        self.seen = SeenTracker::load(self.observe(result)?);

        self.pace().await;
        let result = self.store.read_all(&self.config.dashboard_table).await;
        let run_number = self.observe(result)?.len() as u64 + 1;

        let mut stats = RunStats {
            run_number,
            started_at,
            data_quality_warnings: warnings.len(),
            ..RunStats::default()
        };
        self.logger.on_run_start(run_number, self.index.len());

        let mut since_boundary = 0usize;
        loop {
            if self.config.max_records > 0 && stats.processed >= self.config.max_records {
                log::info!(
                    "[Sync] record cutoff reached ({}), stopping",
                    self.config.max_records
                );
                break;
            }

            let record = match source.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    // Source hiccup on one record: skip, log, continue
                    log::warn!("[Source] skipping record: {:#}", e);
                    continue;
                }
            };
            stats.processed += 1;
            let identity = record.identity(&self.schema).trim().to_string();

            match self.upsert(record).await {
                Ok(outcome) => {
                    stats.succeeded += 1;
                    match outcome.status {
                        UpsertStatus::New => stats.new_profiles += 1,
                        UpsertStatus::Updated => stats.updated += 1,
                        UpsertStatus::Unchanged => stats.unchanged += 1,
                    }
                    let observed_at = constants::capture_timestamp();
                    let key = identity_key(&identity);
                    self.seen.record(&key, &observed_at);
                    if let Err(e) = self.log_timing(&identity, &observed_at, run_number).await {
                        if !e.is_recoverable() {
                            return Err(e.into());
                        }
                        log::warn!("[Sync] timing row dropped for '{}': {}", identity, e);
                    }
                    self.logger
                        .on_record_synced(stats.processed, &identity, &outcome);
                }
                Err(e) if e.is_recoverable() => {
                    stats.failed += 1;
                    log::warn!("[Sync] record '{}' failed: {}", identity, e);
                    self.logger
                        .on_record_failed(stats.processed, &identity, &e.to_string());
                }
                Err(e) => return Err(e.into()),
            }

            since_boundary += 1;
            if since_boundary >= self.rate.state().batch_size_hint {
                self.rate.on_batch_boundary();
                since_boundary = 0;
            }
            self.rate.tune_after_sample(self.success_calls);
        }

        stats.finished_at = constants::capture_timestamp();

        self.metrics.publish([
            ("Run Number".to_string(), stats.run_number.to_string()),
            ("Profiles Processed".to_string(), stats.processed.to_string()),
            ("Succeeded".to_string(), stats.succeeded.to_string()),
            ("Failed".to_string(), stats.failed.to_string()),
            ("New".to_string(), stats.new_profiles.to_string()),
            ("Updated".to_string(), stats.updated.to_string()),
            ("Unchanged".to_string(), stats.unchanged.to_string()),
            ("Run Started".to_string(), stats.started_at.clone()),
            ("Run Finished".to_string(), stats.finished_at.clone()),
        ]);

        // Flushes are best-effort on quota errors; fatal errors propagate
        if let Err(e) = self.flush_seen().await {
            if !e.is_recoverable() {
                return Err(e.into());
            }
            log::warn!("[Sync] seen-count flush interrupted: {}", e);
        }
        if let Err(e) = self.flush_metrics().await {
            if !e.is_recoverable() {
                return Err(e.into());
            }
            log::warn!("[Sync] metrics flush interrupted: {}", e);
        }

        self.logger.on_run_complete(&stats, self.rate.state());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FIELD_AGE, FIELD_CITY, FIELD_NICK};
    use crate::store::MemoryStore;

    fn engine_with(store: Arc<MemoryStore>) -> SyncEngine {
        let config = SyncConfig {
            base_min_delay: 0.0,
            base_max_delay: 0.0,
            ..SyncConfig::default()
        };
        SyncEngine::new(store, Schema::profile_default(), config)
    }

    fn record(schema: &Schema, pairs: &[(&str, &str)]) -> ProfileRecord {
        ProfileRecord::from_pairs(
            schema,
            pairs.iter().map(|(n, v)| (*n, v.to_string())),
        )
    }

    #[tokio::test]
    async fn test_upsert_rejects_empty_identity() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine_with(store);
        let schema = engine.schema().clone();
        let bad = record(&schema, &[(FIELD_CITY, "Lahore")]);
        let err = engine.upsert(bad).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRecord(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_upsert_new_marks_all_fields_changed() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine_with(store.clone());
        let schema = engine.schema().clone();
        engine.rebuild_index().await.unwrap();

        let outcome = engine
            .upsert(record(&schema, &[(FIELD_NICK, "sara")]))
            .await
            .unwrap();
        assert_eq!(outcome.status, UpsertStatus::New);
        assert_eq!(outcome.changed_fields.len(), schema.len());
        assert_eq!(store.rows(constants::PROFILES_TABLE).len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_same_record_twice_is_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine_with(store.clone());
        let schema = engine.schema().clone();
        engine.rebuild_index().await.unwrap();

        let snapshot = record(&schema, &[(FIELD_NICK, "ali"), (FIELD_AGE, "22")]);
        engine.upsert(snapshot.clone()).await.unwrap();
        let second = engine.upsert(snapshot).await.unwrap();
        assert_eq!(second.status, UpsertStatus::Unchanged);
        assert!(second.changed_fields.is_empty());
        // Still exactly one row for the key
        assert_eq!(store.rows(constants::PROFILES_TABLE).len(), 1);
    }

    #[tokio::test]
    async fn test_in_place_placement_keeps_position() {
        let store = Arc::new(MemoryStore::new());
        let config = SyncConfig {
            placement: UpdatePlacement::InPlace,
            base_min_delay: 0.0,
            base_max_delay: 0.0,
            ..SyncConfig::default()
        };
        let mut engine = SyncEngine::new(store.clone(), Schema::profile_default(), config);
        let schema = engine.schema().clone();

        store.seed(
            constants::PROFILES_TABLE,
            vec![
                record(&schema, &[(FIELD_NICK, "zed")]).into_values(),
                record(&schema, &[(FIELD_NICK, "ali"), (FIELD_AGE, "22")]).into_values(),
            ],
        );
        engine.rebuild_index().await.unwrap();

        let outcome = engine
            .upsert(record(&schema, &[(FIELD_NICK, "ali"), (FIELD_AGE, "23")]))
            .await
            .unwrap();
        assert_eq!(outcome.status, UpsertStatus::Updated);

        let rows = store.rows(constants::PROFILES_TABLE);
        assert_eq!(rows.len(), 2);
        // ali stayed at row 1
        let nick = schema.identity_id();
        assert_eq!(rows[1].values[nick], "ali");
        let age = schema.field_id(FIELD_AGE).unwrap();
        assert_eq!(rows[1].values[age], "23");
    }
}
