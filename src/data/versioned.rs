//! Optimistic concurrency control for mutable records.
//!
//! An update succeeds only if the caller's version equals the stored one;
//! the stored version then advances by exactly one and the new value is
//! written back into the caller's copy. No lock is held between the read
//! and the write: the check and the write happen together under the row's
//! lock, which is the only place a race can be decided.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

use super::StoreError;

/// A record with an identity and a version counter.
pub trait Versioned {
    fn id(&self) -> i64;
    fn version(&self) -> i32;
    fn set_version(&mut self, version: i32);
}

/// In-memory table of versioned rows keyed by id.
pub struct VersionedTable<T> {
    rows: DashMap<i64, T>,
    next_id: AtomicI64,
}

impl<T: Versioned + Clone> VersionedTable<T> {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Reserve the next row id.
    pub fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, row: T) {
        self.rows.insert(row.id(), row);
    }

    pub fn get(&self, id: i64) -> Option<T> {
        self.rows.get(&id).map(|r| r.value().clone())
    }

    pub fn remove(&self, id: i64) -> Option<T> {
        self.rows.remove(&id).map(|(_, row)| row)
    }

    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        self.rows
            .iter()
            .find(|r| predicate(r.value()))
            .map(|r| r.value().clone())
    }

    /// All rows ordered by id.
    pub fn rows(&self) -> Vec<T> {
        let mut rows: Vec<T> = self.rows.iter().map(|r| r.value().clone()).collect();
        rows.sort_by_key(|row| row.id());
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Conditional write: `SET ..., version = version + 1 WHERE id = $1 AND version = $2`.
    ///
    /// A missing row is reported as a conflict too, since it means the
    /// record changed (was deleted) after the caller read it.
    pub fn update(&self, row: &mut T) -> Result<(), StoreError> {
        let mut stored = self.rows.get_mut(&row.id()).ok_or(StoreError::EditConflict)?;
        if stored.version() != row.version() {
            return Err(StoreError::EditConflict);
        }

        let next = row.version() + 1;
        let mut updated = row.clone();
        updated.set_version(next);
        *stored = updated;
        row.set_version(next);
        Ok(())
    }
}

impl<T: Versioned + Clone> Default for VersionedTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
