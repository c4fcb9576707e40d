mod bookings;
mod catalog;
mod conflict;
mod error;
mod queries;
mod rooms;

pub use conflict::{nights, total_price};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tracing::{debug, warn};

use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Non-append commands run after the batch they arrived behind.
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(cmd) = deferred {
                    handle_non_append(&mut wal, cmd);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    debug!("WAL writer for {} stopped", wal.path().display());
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        warn!("WAL flush of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

// ── Identity ─────────────────────────────────────────────

/// Monotonic per-tenant id sequence. Ids start at 1; 0 means "unset".
#[derive(Debug)]
pub(super) struct Sequence(AtomicU64);

impl Sequence {
    fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub(super) fn next(&self) -> Id {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Make sure ids handed out later never collide with `id`.
    fn observe(&self, id: Id) {
        self.0.fetch_max(id + 1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub(super) struct Sequences {
    pub(super) rooms: Sequence,
    pub(super) bookings: Sequence,
    menu_items: Sequence,
    inventory: Sequence,
    users: Sequence,
}

impl Sequences {
    fn new() -> Self {
        Self {
            rooms: Sequence::new(),
            bookings: Sequence::new(),
            menu_items: Sequence::new(),
            inventory: Sequence::new(),
            users: Sequence::new(),
        }
    }

    pub(super) fn catalog(&self, kind: CatalogKind) -> &Sequence {
        match kind {
            CatalogKind::MenuItem => &self.menu_items,
            CatalogKind::InventoryItem => &self.inventory,
            CatalogKind::User => &self.users,
        }
    }
}

// ── Engine ───────────────────────────────────────────────

/// One tenant's hotel state: the room registry, the bookings of every room
/// and the pass-through catalog, persisted through a single WAL.
pub struct Engine {
    pub(super) rooms: DashMap<Id, SharedRoomState>,
    /// Live room number → room id. Maintained under `registry_lock`.
    pub(super) room_numbers: DashMap<String, Id>,
    /// Reverse lookup: booking id → room id.
    pub(super) booking_to_room: DashMap<Id, Id>,
    pub(super) catalog: DashMap<(CatalogKind, Id), CatalogRecord>,
    /// Serializes room create/update/delete (room number uniqueness).
    pub(super) registry_lock: Mutex<()>,
    /// Serializes catalog writes (SKU/username uniqueness).
    pub(super) catalog_lock: Mutex<()>,
    pub(super) sequences: Sequences,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            room_numbers: DashMap::new(),
            booking_to_room: DashMap::new(),
            catalog: DashMap::new(),
            registry_lock: Mutex::new(()),
            catalog_lock: Mutex::new(()),
            sequences: Sequences::new(),
            wal_tx,
        };

        // We're the sole owner of these Arcs during replay, so try_write always
        // succeeds. Never use blocking_write here: this may run inside an async
        // context (lazy tenant creation).
        for event in &events {
            match event {
                Event::RoomCreated { room } => {
                    engine.sequences.rooms.observe(room.id);
                    engine.room_numbers.insert(room.room_number.clone(), room.id);
                    engine
                        .rooms
                        .insert(room.id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
                }
                Event::CatalogUpserted { record } => {
                    engine.sequences.catalog(record.kind()).observe(record.id());
                    engine.catalog.insert((record.kind(), record.id()), record.clone());
                }
                Event::CatalogDeleted { kind, id } => {
                    engine.catalog.remove(&(*kind, *id));
                }
                other => {
                    if let Event::BookingConfirmed { booking } = other {
                        engine.sequences.bookings.observe(booking.id);
                    }
                    let Some(room_id) = event_room_id(other) else { continue };
                    let Some(rs) = engine.get_room_state(&room_id) else {
                        warn!("replay: event for unknown room {room_id} skipped");
                        continue;
                    };
                    match rs.try_write() {
                        Ok(mut guard) => engine.apply_event(&mut guard, other),
                        Err(_) => warn!("replay: room {room_id} unexpectedly locked"),
                    }
                }
            }
        }

        // A compacted log lists rooms by id with their final numbers, so a
        // number can pass through several rooms during replay. Only live
        // rooms own a number once replay is done.
        engine.room_numbers.clear();
        for entry in engine.rooms.iter() {
            match entry.value().try_read() {
                Ok(rs) if !rs.deleted => {
                    engine.room_numbers.insert(rs.room.room_number.clone(), rs.room.id);
                }
                Ok(_) => {}
                Err(_) => warn!("replay: room {} unexpectedly locked", entry.key()),
            }
        }

        debug!(
            "replayed {} events: {} rooms, {} bookings",
            events.len(),
            engine.rooms.len(),
            engine.booking_to_room.len()
        );
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    pub fn get_room_state(&self, id: &Id) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_booking(&self, booking_id: &Id) -> Option<Id> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append then apply. State is only touched once the event is durable.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_event(rs, event);
        Ok(())
    }

    /// Apply a room-scoped event (caller holds the room's write lock).
    fn apply_event(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::RoomUpdated { room } => {
                if !rs.deleted {
                    self.room_numbers
                        .remove_if(&rs.room.room_number, |_, id| *id == room.id);
                    self.room_numbers.insert(room.room_number.clone(), room.id);
                }
                rs.room = room.clone();
            }
            Event::RoomDeleted { id } => {
                self.room_numbers.remove_if(&rs.room.room_number, |_, rid| rid == id);
                rs.deleted = true;
            }
            Event::BookingConfirmed { booking } => {
                self.booking_to_room.insert(booking.id, booking.room_id);
                rs.insert_booking(booking.clone());
            }
            Event::BookingStatusChanged { id, status, .. } => {
                if let Some(booking) = rs.booking_mut(*id) {
                    booking.status = *status;
                }
            }
            // Created rooms and catalog records live at the map level, not here.
            Event::RoomCreated { .. } | Event::CatalogUpserted { .. } | Event::CatalogDeleted { .. } => {}
        }
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state.
    ///
    /// Holds the registry and catalog locks plus a read lock on every room
    /// until the writer has swapped the file, so no append can slip in
    /// between the snapshot and the swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _registry = self.registry_lock.lock().await;
        let _catalog = self.catalog_lock.lock().await;

        let mut room_ids: Vec<Id> = self.rooms.iter().map(|e| *e.key()).collect();
        room_ids.sort_unstable();

        let mut guards = Vec::with_capacity(room_ids.len());
        for id in &room_ids {
            if let Some(rs) = self.get_room_state(id) {
                guards.push(rs.read_owned().await);
            }
        }

        let mut events = Vec::new();
        for guard in &guards {
            events.push(Event::RoomCreated {
                room: guard.room.clone(),
            });
            for booking in &guard.bookings {
                events.push(Event::BookingConfirmed {
                    booking: booking.clone(),
                });
            }
            if guard.deleted {
                events.push(Event::RoomDeleted { id: guard.room.id });
            }
        }

        let mut records: Vec<CatalogRecord> = self.catalog.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|r| (r.kind().table(), r.id()));
        events.extend(records.into_iter().map(|record| Event::CatalogUpserted { record }));

        let event_count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        debug!("WAL compacted to {event_count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// The room an event is scoped to (for events applied under a room lock).
fn event_room_id(event: &Event) -> Option<Id> {
    match event {
        Event::RoomUpdated { room } => Some(room.id),
        Event::RoomDeleted { id } => Some(*id),
        Event::BookingConfirmed { booking } => Some(booking.room_id),
        Event::BookingStatusChanged { room_id, .. } => Some(*room_id),
        Event::RoomCreated { .. } | Event::CatalogUpserted { .. } | Event::CatalogDeleted { .. } => None,
    }
}
