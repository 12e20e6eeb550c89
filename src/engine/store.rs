use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

use super::EngineError;

/// The record store the reservation service reads from and commits to.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// All reservations matching `filter`, in no particular order.
    async fn find_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, EngineError>;

    /// Persist a new reservation and return it with its assigned id.
    async fn insert_reservation(&self, draft: NewReservation) -> Result<Reservation, EngineError>;

    /// Set the stored nights of `id` to `nights` and return the updated record.
    async fn update_reservation_nights(
        &self,
        id: Ulid,
        nights: u32,
    ) -> Result<Reservation, EngineError>;
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    /// Responds with the number of appends since the last compaction.
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<u64>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
}

/// Owns the log. Each wakeup drains every append already queued and commits
/// them with a single fsync before answering any of the senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut pending = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, batch);
                if let Some(WalCommand::Compact { events, response }) = pending {
                    let _ = response.send(wal.compact(&events));
                }
            }
            WalCommand::Compact { events, response } => {
                let _ = response.send(wal.compact(&events));
            }
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<(Event, oneshot::Sender<io::Result<u64>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let appended = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so stray bytes don't ride along
    // with the next batch.
    let flushed = wal.flush_sync();
    let result = appended.and(flushed);

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    let count = wal.appends_since_compact();
    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(count),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

struct WalHandle {
    tx: mpsc::Sender<WalCommand>,
    /// Writers hold it shared across append + apply; compaction holds it
    /// exclusively so its snapshot matches what the log has acknowledged.
    gate: RwLock<()>,
    compact_threshold: u64,
    compacting: AtomicBool,
}

/// DashMap-backed store with guest and unit indexes. Optionally durable
/// through a write-ahead log.
pub struct InMemoryStore {
    reservations: DashMap<Ulid, Reservation>,
    by_guest: DashMap<String, Vec<Ulid>>,
    by_unit: DashMap<String, Vec<Ulid>>,
    wal: Option<WalHandle>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Volatile store. Nothing survives the process.
    pub fn new() -> Self {
        Self {
            reservations: DashMap::new(),
            by_guest: DashMap::new(),
            by_unit: DashMap::new(),
            wal: None,
        }
    }

    /// Durable store backed by the log at `path`, replaying whatever it holds.
    /// Must be called inside a tokio runtime; the log writer runs as a task.
    pub fn open(path: &Path, compact_threshold: u64) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let mut store = Self::new();
        for event in &events {
            store.apply(event);
        }
        info!(
            "replayed {} events, {} reservations from {}",
            events.len(),
            store.len(),
            path.display()
        );

        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, rx));
        store.wal = Some(WalHandle {
            tx,
            gate: RwLock::new(()),
            compact_threshold,
            compacting: AtomicBool::new(false),
        });
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<Reservation> {
        self.reservations.get(id).map(|e| e.value().clone())
    }

    fn apply(&self, event: &Event) {
        match event {
            Event::ReservationCreated { reservation } => {
                let id = reservation.id;
                self.by_guest.entry(reservation.guest.clone()).or_default().push(id);
                self.by_unit.entry(reservation.unit.clone()).or_default().push(id);
                self.reservations.insert(id, reservation.clone());
            }
            Event::ReservationExtended { id, nights } => {
                if let Some(mut r) = self.reservations.get_mut(id) {
                    r.nights = *nights;
                }
            }
        }
    }

    /// Log `event` (if durable), then apply it in memory.
    async fn commit(&self, event: Event) -> Result<(), EngineError> {
        let Some(wal) = &self.wal else {
            self.apply(&event);
            return Ok(());
        };

        let appends = {
            let _shared = wal.gate.read().await;
            let (tx, rx) = oneshot::channel();
            wal.tx
                .send(WalCommand::Append { event: event.clone(), response: tx })
                .await
                .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
            let appends = rx
                .await
                .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
                .map_err(|e| EngineError::WalError(e.to_string()))?;
            self.apply(&event);
            appends
        };

        if appends >= wal.compact_threshold && !wal.compacting.swap(true, Ordering::AcqRel) {
            let result = self.compact().await;
            wal.compacting.store(false, Ordering::Release);
            if let Err(e) = result {
                // The log is still valid, just longer than it needs to be.
                warn!("WAL compaction failed: {e}");
            }
        }
        Ok(())
    }

    /// Rewrite the log as one `ReservationCreated` per live reservation.
    /// No-op for a volatile store.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };
        let _exclusive = wal.gate.write().await;

        let mut live: Vec<Reservation> =
            self.reservations.iter().map(|e| e.value().clone()).collect();
        live.sort_by_key(|r| r.id);
        let events: Vec<Event> = live
            .into_iter()
            .map(|reservation| Event::ReservationCreated { reservation })
            .collect();
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        wal.tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("compacted WAL to {count} reservations");
        Ok(())
    }

    fn collect(&self, ids: &[Ulid], filter: &ReservationFilter) -> Vec<Reservation> {
        ids.iter()
            .filter_map(|id| self.get(id))
            .filter(|r| filter.matches(r))
            .collect()
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn find_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, EngineError> {
        let index = match (&filter.guest, &filter.unit) {
            (Some(guest), _) => Some(self.by_guest.get(guest).map(|e| e.value().clone())),
            (None, Some(unit)) => Some(self.by_unit.get(unit).map(|e| e.value().clone())),
            (None, None) => None,
        };
        let mut found = match index {
            Some(ids) => self.collect(&ids.unwrap_or_default(), filter),
            None => self.reservations.iter().map(|e| e.value().clone()).collect(),
        };
        found.sort_by(|a, b| a.check_in.cmp(&b.check_in).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn insert_reservation(&self, draft: NewReservation) -> Result<Reservation, EngineError> {
        let reservation = draft.into_reservation(Ulid::new());
        self.commit(Event::ReservationCreated { reservation: reservation.clone() })
            .await?;
        Ok(reservation)
    }

    async fn update_reservation_nights(
        &self,
        id: Ulid,
        nights: u32,
    ) -> Result<Reservation, EngineError> {
        if !self.reservations.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.commit(Event::ReservationExtended { id, nights }).await?;
        self.get(&id).ok_or(EngineError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("innkeep_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn draft(guest: &str, unit: &str, day: u32, nights: u32) -> NewReservation {
        NewReservation {
            guest: guest.into(),
            unit: unit.into(),
            check_in: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            nights,
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_indexes() {
        let store = InMemoryStore::new();
        let a = store.insert_reservation(draft("alice", "101", 1, 2)).await.unwrap();
        let b = store.insert_reservation(draft("bob", "101", 5, 1)).await.unwrap();
        store.insert_reservation(draft("carol", "102", 1, 1)).await.unwrap();
        assert_ne!(a.id, b.id);

        let unit = store.find_reservations(&ReservationFilter::unit("101")).await.unwrap();
        assert_eq!(unit, vec![a.clone(), b]);

        let guest = store.find_reservations(&ReservationFilter::guest("alice")).await.unwrap();
        assert_eq!(guest, vec![a]);

        let all = store.find_reservations(&ReservationFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn find_with_both_fields_intersects() {
        let store = InMemoryStore::new();
        store.insert_reservation(draft("alice", "101", 1, 2)).await.unwrap();
        let filter = ReservationFilter {
            guest: Some("alice".into()),
            unit: Some("102".into()),
        };
        assert!(store.find_reservations(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_unknown_keys_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.find_reservations(&ReservationFilter::guest("nobody")).await.unwrap().is_empty());
        assert!(store.find_reservations(&ReservationFilter::unit("999")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_nights() {
        let store = InMemoryStore::new();
        let r = store.insert_reservation(draft("alice", "101", 1, 2)).await.unwrap();
        let updated = store.update_reservation_nights(r.id, 5).await.unwrap();
        assert_eq!(updated.nights, 5);
        assert_eq!(updated.check_in, r.check_in);
        assert_eq!(store.get(&r.id).unwrap().nights, 5);
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = InMemoryStore::new();
        let id = Ulid::new();
        let result = store.update_reservation_nights(id, 3).await;
        assert!(matches!(result, Err(EngineError::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn durable_store_replays() {
        let path = test_wal_path("replay.wal");
        let (a, b) = {
            let store = InMemoryStore::open(&path, 1000).unwrap();
            let a = store.insert_reservation(draft("alice", "101", 1, 2)).await.unwrap();
            let b = store.insert_reservation(draft("bob", "102", 1, 2)).await.unwrap();
            let a = store.update_reservation_nights(a.id, 4).await.unwrap();
            (a, b)
        };

        let store = InMemoryStore::open(&path, 1000).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&a.id), Some(a.clone()));
        assert_eq!(store.get(&b.id), Some(b));
        let unit = store.find_reservations(&ReservationFilter::unit("101")).await.unwrap();
        assert_eq!(unit, vec![a]);
    }

    #[tokio::test]
    async fn compact_preserves_state_and_shrinks_log() {
        let path = test_wal_path("compact.wal");
        let store = InMemoryStore::open(&path, 1_000_000).unwrap();
        let r = store.insert_reservation(draft("alice", "101", 1, 1)).await.unwrap();
        for nights in 2..20 {
            store.update_reservation_nights(r.id, nights).await.unwrap();
        }
        let before = std::fs::metadata(&path).unwrap().len();

        store.compact().await.unwrap();
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL ({after}) should be smaller than {before}");

        // Appends after compaction land behind the snapshot.
        let other = store.insert_reservation(draft("bob", "102", 1, 1)).await.unwrap();
        drop(store);

        let replayed = InMemoryStore::open(&path, 1_000_000).unwrap();
        assert_eq!(replayed.get(&r.id).unwrap().nights, 19);
        assert_eq!(replayed.get(&other.id), Some(other));
    }

    #[tokio::test]
    async fn threshold_triggers_compaction() {
        let path = test_wal_path("auto_compact.wal");
        let store = InMemoryStore::open(&path, 4).unwrap();
        let r = store.insert_reservation(draft("alice", "101", 1, 1)).await.unwrap();
        for nights in 2..=4 {
            store.update_reservation_nights(r.id, nights).await.unwrap();
        }
        drop(store);

        // Four appends hit the threshold; the log now holds a single snapshot.
        let events = Wal::replay(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Event::ReservationCreated { reservation } if reservation.nights == 4
        ));
    }

    #[tokio::test]
    async fn group_commit_concurrent_inserts() {
        let path = test_wal_path("group_commit.wal");
        let store = std::sync::Arc::new(InMemoryStore::open(&path, 1_000_000).unwrap());

        let mut handles = Vec::new();
        for i in 0..20 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.insert_reservation(draft(&format!("guest{i}"), &format!("unit{i}"), 1, 1))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.len(), 20);

        let replayed = InMemoryStore::open(&path, 1_000_000).unwrap();
        assert_eq!(replayed.len(), 20);
    }
}
