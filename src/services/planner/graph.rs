// Cross-database candidate search
//
// A candidate database serves every table either natively or through a
// replicated copy. The search returns the first structurally valid
// candidate; it does not rank by lag or by number of overrides.

use std::collections::{BTreeMap, HashSet};

use crate::models::{Freshness, LagClass, TableSchema};
use crate::services::registry::RegistrySnapshot;

/// A database able to serve the whole table set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDatabase {
    pub database: String,
    /// Table id -> replicated physical name, only for non-native tables
    pub overrides: BTreeMap<String, String>,
    /// Tables natively hosted on `database`
    pub original_count: usize,
    pub worst_lag: LagClass,
}

/// Check whether `target_db` can serve all of `tables`
///
/// Returns `None` as soon as one table has neither a native home nor a
/// sync on `target_db`.
pub fn evaluate_candidate(
    target_db: &str,
    tables: &[&TableSchema],
    snapshot: &RegistrySnapshot,
) -> Option<CandidateDatabase> {
    let mut overrides = BTreeMap::new();
    let mut original_count = 0;
    let mut worst_lag = LagClass::Seconds;

    for table in tables {
        if table.database == target_db {
            original_count += 1;
            continue;
        }

        let sync = snapshot
            .syncs_for(&table.id)
            .iter()
            .find(|s| s.target_database == target_db)?;

        overrides.insert(table.id.clone(), sync.target_physical_name.clone());
        worst_lag = worst_lag.max(sync.estimated_lag);
    }

    Some(CandidateDatabase {
        database: target_db.to_string(),
        overrides,
        original_count,
        worst_lag,
    })
}

/// Database ids in search order: hosts of the query's tables first (in
/// first-seen order), then every other configured database.
pub fn candidate_order<'a>(tables: &[&'a TableSchema], snapshot: &'a RegistrySnapshot) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();

    for table in tables {
        if seen.insert(table.database.as_str()) {
            order.push(table.database.as_str());
        }
    }
    for db in snapshot.databases() {
        if seen.insert(db.id.as_str()) {
            order.push(db.id.as_str());
        }
    }

    order
}

/// First cross-database candidate, regardless of lag
///
/// Candidates with no overrides are skipped: all tables being native is
/// the direct case, handled before this search.
pub fn find_any_candidate_ignoring_freshness(
    tables: &[&TableSchema],
    snapshot: &RegistrySnapshot,
) -> Option<CandidateDatabase> {
    candidate_order(tables, snapshot)
        .into_iter()
        .filter_map(|db| evaluate_candidate(db, tables, snapshot))
        .find(|c| !c.overrides.is_empty())
}

/// Rank of a lag class name: seconds=1, minutes=2, hours=3, unknown=0
pub fn lag_level(lag: &str) -> u8 {
    LagClass::from_str(lag).map_or(0, |l| l.level())
}

/// Whether a path lagging by `worst_lag` meets the caller's requirement
pub fn is_fresh_enough(required: Option<Freshness>, worst_lag: LagClass) -> bool {
    match required {
        None => true,
        Some(Freshness::Realtime) => false,
        Some(other) => other
            .as_lag()
            .map_or(false, |limit| worst_lag.level() <= limit.level()),
    }
}
