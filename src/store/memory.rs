//! In-process credential store.
//!
//! Same contract as the PostgreSQL store: transactions stage their writes
//! and apply them on commit, so a dropped transaction leaves nothing
//! behind. Used by the test suite and for local runs without a database.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{CredentialStore, StoreResult, StoreTx};
use crate::models::{stored_now, Credential, CredentialKind, NewCredential};

struct Inner<M> {
    rows: DashMap<i64, Credential<M>>,
    next_id: AtomicI64,
    last_used_writes: AtomicUsize,
}

pub struct MemoryStore<K: CredentialKind> {
    inner: Arc<Inner<K::Metadata>>,
}

impl<K: CredentialKind> Clone for MemoryStore<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: CredentialKind> Default for MemoryStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CredentialKind> MemoryStore<K> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                rows: DashMap::new(),
                next_id: AtomicI64::new(1),
                last_used_writes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rows.is_empty()
    }

    /// Number of `last_used_at` writes applied so far.
    pub fn last_used_writes(&self) -> usize {
        self.inner.last_used_writes.load(Ordering::SeqCst)
    }

    /// Shift a stored `last_used_at` into the past. Returns whether the
    /// credential exists.
    pub fn backdate_last_used(&self, id: i64, by: chrono::Duration) -> bool {
        match self.inner.rows.get_mut(&id) {
            Some(mut row) => {
                row.last_used_at = row.last_used_at.map(|at| at - by);
                true
            }
            None => false,
        }
    }

    /// Overwrite a stored expiry. Returns whether the credential exists.
    pub fn set_expires_at(&self, id: i64, expires_at: Option<DateTime<Utc>>) -> bool {
        match self.inner.rows.get_mut(&id) {
            Some(mut row) => {
                row.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    fn sorted(mut rows: Vec<Credential<K::Metadata>>) -> Vec<Credential<K::Metadata>> {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }
}

#[async_trait]
impl<K: CredentialKind> CredentialStore<K> for MemoryStore<K> {
    type Tx = MemoryTx<K>;

    async fn begin(&self) -> StoreResult<MemoryTx<K>> {
        Ok(MemoryTx {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
            _kind: PhantomData,
        })
    }

    async fn get(&self, owner_id: i64, id: i64) -> StoreResult<Option<Credential<K::Metadata>>> {
        Ok(self
            .inner
            .rows
            .get(&id)
            .filter(|row| row.owner_id == owner_id)
            .map(|row| row.clone()))
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Credential<K::Metadata>>> {
        Ok(self.inner.rows.get(&id).map(|row| row.clone()))
    }

    async fn list(&self, owner_id: i64) -> StoreResult<Vec<Credential<K::Metadata>>> {
        let rows = self
            .inner
            .rows
            .iter()
            .filter(|row| row.owner_id == owner_id)
            .map(|row| row.clone())
            .collect();
        Ok(Self::sorted(rows))
    }

    async fn list_all(&self) -> StoreResult<Vec<Credential<K::Metadata>>> {
        let rows = self.inner.rows.iter().map(|row| row.clone()).collect();
        Ok(Self::sorted(rows))
    }

    async fn delete(&self, owner_id: i64, id: i64) -> StoreResult<bool> {
        Ok(self
            .inner
            .rows
            .remove_if(&id, |_, row| row.owner_id == owner_id)
            .is_some())
    }

    async fn delete_by_id(&self, id: i64) -> StoreResult<bool> {
        Ok(self.inner.rows.remove(&id).is_some())
    }

    async fn touch_last_used_by_id(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        match self.inner.rows.get_mut(&id) {
            Some(mut row) => {
                if row.last_used_at.map_or(true, |prev| prev < at) {
                    row.last_used_at = Some(at);
                    self.inner.last_used_writes.fetch_add(1, Ordering::SeqCst);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

enum Staged<M> {
    Insert(Credential<M>),
    Touch {
        id: i64,
        at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    },
}

pub struct MemoryTx<K: CredentialKind> {
    inner: Arc<Inner<K::Metadata>>,
    staged: Vec<Staged<K::Metadata>>,
    _kind: PhantomData<fn() -> K>,
}

fn is_stale(last_used_at: Option<DateTime<Utc>>, stale_before: DateTime<Utc>) -> bool {
    last_used_at.map_or(true, |prev| prev < stale_before)
}

#[async_trait]
impl<K: CredentialKind> StoreTx<K> for MemoryTx<K> {
    async fn insert(
        &mut self,
        new: NewCredential<K::Metadata>,
    ) -> StoreResult<Credential<K::Metadata>> {
        // Ids are consumed even if the transaction is dropped, like a sequence.
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let record = Credential {
            id,
            owner_id: new.owner_id,
            metadata: new.metadata,
            hashed_secret: new.hashed_secret,
            created_at: stored_now(),
            last_used_at: None,
            expires_at: new.expires_at,
        };
        self.staged.push(Staged::Insert(record.clone()));
        Ok(record)
    }

    async fn get(
        &mut self,
        owner_id: i64,
        id: i64,
    ) -> StoreResult<Option<Credential<K::Metadata>>> {
        let staged = self.staged.iter().find_map(|op| match op {
            Staged::Insert(row) if row.id == id && row.owner_id == owner_id => Some(row.clone()),
            _ => None,
        });
        if staged.is_some() {
            return Ok(staged);
        }
        Ok(self
            .inner
            .rows
            .get(&id)
            .filter(|row| row.owner_id == owner_id)
            .map(|row| row.clone()))
    }

    async fn touch_last_used(
        &mut self,
        id: i64,
        at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let would_write = self
            .inner
            .rows
            .get(&id)
            .is_some_and(|row| is_stale(row.last_used_at, stale_before));
        if would_write {
            self.staged.push(Staged::Touch {
                id,
                at,
                stale_before,
            });
        }
        Ok(would_write)
    }

    async fn commit(self) -> StoreResult<()> {
        for op in self.staged {
            match op {
                Staged::Insert(row) => {
                    self.inner.rows.insert(row.id, row);
                }
                Staged::Touch {
                    id,
                    at,
                    stale_before,
                } => {
                    // Re-checked under the entry lock; a concurrent commit may have won.
                    if let Some(mut row) = self.inner.rows.get_mut(&id) {
                        if is_stale(row.last_used_at, stale_before) {
                            row.last_used_at = Some(at);
                            self.inner.last_used_writes.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
