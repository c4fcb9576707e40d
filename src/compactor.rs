use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites a tenant's WAL once enough appends have
/// accumulated since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

/// Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("innkeep_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(path.clone()).unwrap();

        let room = engine
            .create_room(NewRoom {
                room_number: "101".into(),
                room_type: "double".into(),
                price: 100.0,
                status: RoomStatus::Available,
            })
            .await
            .unwrap();
        for i in 0..5 {
            let info = engine
                .create_booking(BookingRequest {
                    guest_name: format!("guest {i}"),
                    room_id: Some(room.id),
                    check_in: Some(0),
                    check_out: Some(86_400_000),
                })
                .await
                .unwrap();
            engine.cancel_booking(info.booking.id).await.unwrap();
        }
        assert_eq!(engine.wal_appends_since_compact().await, 11);

        assert!(!compact_if_needed(&engine, 100).await);
        assert!(compact_if_needed(&engine, 10).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        // Compacted log still rebuilds the same state.
        drop(engine);
        let reopened = Engine::new(path).unwrap();
        assert_eq!(reopened.find_room(room.id).await.unwrap(), room);
        let bookings = reopened.list_bookings().await;
        assert_eq!(bookings.len(), 5);
        assert!(bookings
            .iter()
            .all(|b| b.booking.status == BookingStatus::Cancelled));
    }
}
