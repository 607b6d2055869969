//! Coordination store on RocksDB
//!
//! Column families:
//! - `iteration`: iteration (u32 BE) -> IterationState
//! - `rank`: iteration | vertex -> Probability
//! - `vote`: iteration | source | target -> Probability
//!
//! Probabilities are stored as the signed big-endian bytes of their unscaled
//! integer plus the scale.
//!
//! Keys start with the iteration so per-iteration reads are prefix scans.
//! RocksDB has no conditional write, so each column family gets a lock that
//! is held across the check and the write. The database lock file keeps a
//! second process out, which makes this store single-process.

use crate::common::{Error, Iteration, Probability, Result, Vertex};
use crate::store::{CoordinationStore, Flag, IterationState, RankRecord, VoteRecord};
use async_trait::async_trait;
use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const CF_ITERATION: &str = "iteration";
const CF_RANK: &str = "rank";
const CF_VOTE: &str = "vote";

pub struct RocksStore {
    db: DB,
    iteration_lock: Mutex<()>,
    rank_lock: Mutex<()>,
    vote_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create the store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, vec![CF_ITERATION, CF_RANK, CF_VOTE])?;
        Ok(Self::wrap(db))
    }

    /// Open an existing store without taking the write lock
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let opts = Options::default();
        let db = DB::open_cf_for_read_only(&opts, path, vec![CF_ITERATION, CF_RANK, CF_VOTE], false)?;
        Ok(Self::wrap(db))
    }

    fn wrap(db: DB) -> Self {
        Self {
            db,
            iteration_lock: Mutex::new(()),
            rank_lock: Mutex::new(()),
            vote_lock: Mutex::new(()),
        }
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Corrupted(format!("missing column family {}", name)))
    }

    fn guard(lock: &Mutex<()>) -> Result<MutexGuard<'_, ()>> {
        lock.lock()
            .map_err(|_| Error::Internal("rocksdb store lock poisoned".into()))
    }

    /// Visit every entry of `cf` whose key starts with `prefix`.
    fn scan_prefix(
        &self,
        cf_name: &str,
        prefix: &[u8],
        mut visit: impl FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            visit(&key[..], &value[..])?;
        }
        Ok(())
    }

    fn iteration_states(&self) -> Result<Vec<IterationState>> {
        let mut states = Vec::new();
        self.scan_prefix(CF_ITERATION, &[], |_, value| {
            states.push(decode(value)?);
            Ok(())
        })?;
        Ok(states)
    }

    fn get_state(&self, iteration: Iteration) -> Result<Option<IterationState>> {
        let cf = self.cf(CF_ITERATION)?;
        match self.db.get_cf(cf, iteration.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_flag(&self, iteration: Iteration, flag: Flag) -> Result<bool> {
        let _guard = Self::guard(&self.iteration_lock)?;
        let Some(mut state) = self.get_state(iteration)? else {
            return Ok(false);
        };
        if !flag.set(&mut state) {
            return Ok(false);
        }
        let cf = self.cf(CF_ITERATION)?;
        self.db.put_cf(cf, iteration.to_be_bytes(), encode(&state)?)?;
        Ok(true)
    }

    fn get_flag(&self, iteration: Iteration, flag: Flag) -> Result<bool> {
        self.get_state(iteration)?
            .map(|state| flag.get(&state))
            .ok_or(Error::UnknownIteration(iteration))
    }
}

#[async_trait]
impl CoordinationStore for RocksStore {
    async fn count_iteration_rows(&self) -> Result<u64> {
        Ok(self.iteration_states()?.len() as u64)
    }

    async fn insert_iteration_slots(&self, limit: Iteration) -> Result<u64> {
        let _guard = Self::guard(&self.iteration_lock)?;
        let cf = self.cf(CF_ITERATION)?;
        let mut batch = WriteBatch::default();
        let mut inserted = 0;
        for iteration in 1..=limit {
            if self.db.get_cf(cf, iteration.to_be_bytes())?.is_none() {
                batch.put_cf(cf, iteration.to_be_bytes(), encode(&IterationState::new(iteration))?);
                inserted += 1;
            }
        }
        self.db.write(batch)?;
        Ok(inserted)
    }

    async fn set_ready(&self, iteration: Iteration) -> Result<bool> {
        self.set_flag(iteration, Flag::Ready)
    }

    async fn set_mapped(&self, iteration: Iteration) -> Result<bool> {
        self.set_flag(iteration, Flag::Mapped)
    }

    async fn set_reduced(&self, iteration: Iteration) -> Result<bool> {
        self.set_flag(iteration, Flag::Reduced)
    }

    async fn is_mapped(&self, iteration: Iteration) -> Result<bool> {
        self.get_flag(iteration, Flag::Mapped)
    }

    async fn is_reduced(&self, iteration: Iteration) -> Result<bool> {
        self.get_flag(iteration, Flag::Reduced)
    }

    async fn all_mapped(&self) -> Result<bool> {
        Ok(self.iteration_states()?.iter().all(|s| s.mapped))
    }

    async fn all_reduced(&self) -> Result<bool> {
        Ok(self.iteration_states()?.iter().all(|s| s.reduced))
    }

    async fn next_ready(&self) -> Result<Option<Iteration>> {
        Ok(self
            .iteration_states()?
            .into_iter()
            .find(IterationState::is_map_ready)
            .map(|s| s.iteration))
    }

    async fn next_mapped(&self) -> Result<Option<Iteration>> {
        Ok(self
            .iteration_states()?
            .into_iter()
            .find(IterationState::is_reduce_ready)
            .map(|s| s.iteration))
    }

    async fn list_iterations(&self) -> Result<Vec<IterationState>> {
        self.iteration_states()
    }

    async fn count_rank_rows(&self, iteration: Iteration) -> Result<u64> {
        let mut count = 0;
        self.scan_prefix(CF_RANK, &iteration.to_be_bytes(), |_, _| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    async fn insert_initial_ranks(&self, vertices: &[Vertex], value: &Probability) -> Result<u64> {
        let _guard = Self::guard(&self.rank_lock)?;
        let cf = self.cf(CF_RANK)?;
        let encoded = encode_probability(value)?;
        let mut batch = WriteBatch::default();
        let mut seen = HashSet::new();
        for &vertex in vertices {
            let key = rank_key(0, vertex);
            if seen.insert(vertex) && self.db.get_cf(cf, key)?.is_none() {
                batch.put_cf(cf, key, &encoded);
            }
        }
        let inserted = batch.len() as u64;
        self.db.write(batch)?;
        Ok(inserted)
    }

    async fn get_ranks(&self, iteration: Iteration) -> Result<Vec<RankRecord>> {
        let mut ranks = Vec::new();
        self.scan_prefix(CF_RANK, &iteration.to_be_bytes(), |key, value| {
            ranks.push(RankRecord {
                vertex: decode_vertex(key, 4)?,
                value: decode_probability(value)?,
            });
            Ok(())
        })?;
        Ok(ranks)
    }

    async fn get_ranked_vertices(&self, iteration: Iteration) -> Result<HashSet<Vertex>> {
        let mut vertices = HashSet::new();
        self.scan_prefix(CF_RANK, &iteration.to_be_bytes(), |key, _| {
            vertices.insert(decode_vertex(key, 4)?);
            Ok(())
        })?;
        Ok(vertices)
    }

    async fn insert_rank(
        &self,
        vertex: Vertex,
        iteration: Iteration,
        value: &Probability,
    ) -> Result<()> {
        let _guard = Self::guard(&self.rank_lock)?;
        let cf = self.cf(CF_RANK)?;
        let key = rank_key(iteration, vertex);
        if self.db.get_cf(cf, key)?.is_some() {
            return Err(Error::AlreadyExists(format!(
                "rank of vertex {} at iteration {}",
                vertex, iteration
            )));
        }
        self.db.put_cf(cf, key, encode_probability(value)?)?;
        Ok(())
    }

    async fn get_votes(&self, iteration: Iteration) -> Result<Vec<VoteRecord>> {
        let mut votes = Vec::new();
        self.scan_prefix(CF_VOTE, &iteration.to_be_bytes(), |key, value| {
            votes.push(VoteRecord {
                source: decode_vertex(key, 4)?,
                target: decode_vertex(key, 12)?,
                value: decode_probability(value)?,
            });
            Ok(())
        })?;
        Ok(votes)
    }

    async fn get_vote_sources(&self, iteration: Iteration) -> Result<HashSet<Vertex>> {
        let mut sources = HashSet::new();
        self.scan_prefix(CF_VOTE, &iteration.to_be_bytes(), |key, _| {
            sources.insert(decode_vertex(key, 4)?);
            Ok(())
        })?;
        Ok(sources)
    }

    async fn insert_votes(
        &self,
        source: Vertex,
        targets: &[Vertex],
        iteration: Iteration,
        value: &Probability,
    ) -> Result<()> {
        let _guard = Self::guard(&self.vote_lock)?;
        let cf = self.cf(CF_VOTE)?;
        let encoded = encode_probability(value)?;
        let mut batch = WriteBatch::default();
        for &target in targets {
            let key = vote_key(iteration, source, target);
            if self.db.get_cf(cf, key)?.is_some() {
                return Err(Error::AlreadyExists(format!(
                    "vote {} -> {} at iteration {}",
                    source, target, iteration
                )));
            }
            batch.put_cf(cf, key, &encoded);
        }
        self.db.write(batch)?;
        Ok(())
    }
}

// === Encoding ===

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Internal(format!("Serialize error: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| Error::Corrupted(e.to_string()))
}

fn encode_probability(value: &Probability) -> Result<Vec<u8>> {
    let (digits, scale) = value.as_decimal().as_bigint_and_exponent();
    encode(&(digits.to_signed_bytes_be(), scale))
}

fn decode_probability(bytes: &[u8]) -> Result<Probability> {
    let (digits, scale): (Vec<u8>, i64) = decode(bytes)?;
    Ok(Probability::from_decimal(BigDecimal::new(
        BigInt::from_signed_bytes_be(&digits),
        scale,
    )))
}

/// Vertices are stored with the sign bit flipped so byte order matches
/// numeric order.
fn vertex_bytes(vertex: Vertex) -> [u8; 8] {
    ((vertex as u64) ^ (1 << 63)).to_be_bytes()
}

fn decode_vertex(key: &[u8], offset: usize) -> Result<Vertex> {
    let bytes: [u8; 8] = key
        .get(offset..offset + 8)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| Error::Corrupted(format!("short key of {} bytes", key.len())))?;
    Ok((u64::from_be_bytes(bytes) ^ (1 << 63)) as Vertex)
}

fn rank_key(iteration: Iteration, vertex: Vertex) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..4].copy_from_slice(&iteration.to_be_bytes());
    key[4..].copy_from_slice(&vertex_bytes(vertex));
    key
}

fn vote_key(iteration: Iteration, source: Vertex, target: Vertex) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..4].copy_from_slice(&iteration.to_be_bytes());
    key[4..12].copy_from_slice(&vertex_bytes(source));
    key[12..].copy_from_slice(&vertex_bytes(target));
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn p(s: &str) -> Probability {
        s.parse().unwrap()
    }

    #[test]
    fn test_vertex_encoding_preserves_order() {
        let encoded: Vec<[u8; 8]> = [-5i64, -1, 0, 1, 42].iter().map(|&v| vertex_bytes(v)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);

        let key = vote_key(3, -7, 9);
        assert_eq!(decode_vertex(&key, 4).unwrap(), -7);
        assert_eq!(decode_vertex(&key, 12).unwrap(), 9);
        assert!(decode_vertex(&key[..10], 4).is_err());
    }

    #[test]
    fn test_probability_encoding() {
        for value in ["0", "1", "0.333333333333333333333333333333", "0.000000000000000000000000000001"] {
            let encoded = encode_probability(&p(value)).unwrap();
            assert_eq!(decode_probability(&encoded).unwrap(), p(value));
        }
        let third = Probability::uniform(3);
        let decoded = decode_probability(&encode_probability(&third).unwrap()).unwrap();
        assert_eq!(decoded.to_string(), third.to_string());
        assert!(decode_probability(&[1, 2]).is_err());
    }

    #[tokio::test]
    async fn test_iteration_table() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("rank.db")).unwrap();

        assert_eq!(store.insert_iteration_slots(3).await.unwrap(), 3);
        assert_eq!(store.insert_iteration_slots(3).await.unwrap(), 0);
        assert_eq!(store.count_iteration_rows().await.unwrap(), 3);

        assert!(store.set_ready(1).await.unwrap());
        assert!(!store.set_ready(1).await.unwrap());
        assert!(!store.set_ready(9).await.unwrap());
        assert_eq!(store.next_ready().await.unwrap(), Some(1));

        assert!(store.set_mapped(1).await.unwrap());
        assert_eq!(store.next_mapped().await.unwrap(), Some(1));
        assert!(store.is_mapped(1).await.unwrap());
        assert!(!store.all_mapped().await.unwrap());
        assert!(store.is_reduced(9).await.is_err());
    }

    #[tokio::test]
    async fn test_ranks_are_scoped_by_iteration() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("rank.db")).unwrap();

        let seeded = store
            .insert_initial_ranks(&[3, -1, 2], &p("0.333"))
            .await
            .unwrap();
        assert_eq!(seeded, 3);
        assert_eq!(store.insert_initial_ranks(&[3], &p("0.333")).await.unwrap(), 0);

        store.insert_rank(2, 1, &p("0.4")).await.unwrap();
        assert!(store
            .insert_rank(2, 1, &p("0.5"))
            .await
            .unwrap_err()
            .is_already_exists());

        let ranks = store.get_ranks(0).await.unwrap();
        let vertices: Vec<Vertex> = ranks.iter().map(|r| r.vertex).collect();
        assert_eq!(vertices, vec![-1, 2, 3]);
        assert_eq!(store.count_rank_rows(1).await.unwrap(), 1);
        assert_eq!(
            store.get_ranked_vertices(1).await.unwrap(),
            HashSet::from([2])
        );
        assert_eq!(store.get_ranks(1).await.unwrap()[0].value, p("0.4"));
    }

    #[tokio::test]
    async fn test_votes_reject_duplicate_batch() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("rank.db")).unwrap();

        store.insert_votes(1, &[2, 3], 1, &p("0.25")).await.unwrap();
        let err = store.insert_votes(1, &[2, 3], 1, &p("0.25")).await.unwrap_err();
        assert!(err.is_already_exists());

        let votes = store.get_votes(1).await.unwrap();
        assert_eq!(votes.len(), 2);
        assert!(votes.iter().all(|v| v.source == 1 && v.value == p("0.25")));
        assert_eq!(store.get_vote_sources(1).await.unwrap(), HashSet::from([1]));
        assert!(store.get_votes(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rank.db");
        {
            let store = RocksStore::open(&path).unwrap();
            store.insert_iteration_slots(2).await.unwrap();
            store.set_ready(1).await.unwrap();
            store.insert_rank(5, 0, &p("1")).await.unwrap();
            store.flush().unwrap();
        }

        let store = RocksStore::open_read_only(&path).unwrap();
        assert_eq!(store.next_ready().await.unwrap(), Some(1));
        assert_eq!(store.get_ranks(0).await.unwrap()[0].value, p("1"));
    }
}
