use profilesync::{MemoryStore, ProfileRecord, Schema, SyncConfig, SyncEngine};
use std::sync::Arc;

/// Engine with zero pacing delays so tests run instantly
pub fn test_engine(store: Arc<MemoryStore>) -> SyncEngine {
    test_engine_with(store, SyncConfig::default())
}

pub fn test_engine_with(store: Arc<MemoryStore>, mut config: SyncConfig) -> SyncEngine {
    config.base_min_delay = 0.0;
    config.base_max_delay = 0.0;
    SyncEngine::new(store, Schema::profile_default(), config)
}

pub fn record(schema: &Schema, pairs: &[(&str, &str)]) -> ProfileRecord {
    ProfileRecord::from_pairs(
        schema,
        pairs.iter().map(|(name, value)| (*name, value.to_string())),
    )
}

/// Seed the profiles table with one row per pair list
pub fn seed_profiles(store: &MemoryStore, schema: &Schema, rows: &[&[(&str, &str)]]) {
    let seeded: Vec<Vec<String>> = rows
        .iter()
        .map(|pairs| record(schema, pairs).into_values())
        .collect();
    store.seed(profilesync::constants::PROFILES_TABLE, seeded);
}
