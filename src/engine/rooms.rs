use std::cmp::Ordering;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn validate_room(room_number: &str, room_type: &str, price: f64) -> Result<(), EngineError> {
    if room_number.trim().is_empty() {
        return Err(EngineError::InvalidInput("room_number is required"));
    }
    if room_type.trim().is_empty() {
        return Err(EngineError::InvalidInput("type is required"));
    }
    if room_number.len() > MAX_NAME_LEN || room_type.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("room field too long"));
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(EngineError::InvalidInput("price must be a positive number"));
    }
    Ok(())
}

fn compare_rooms(a: &Room, b: &Room, key: RoomSortKey) -> Ordering {
    match key {
        RoomSortKey::Id => a.id.cmp(&b.id),
        RoomSortKey::RoomNumber => a.room_number.cmp(&b.room_number).then(a.id.cmp(&b.id)),
        RoomSortKey::Price => a.price.total_cmp(&b.price).then(a.id.cmp(&b.id)),
    }
}

impl Engine {
    /// Room lookup. Soft-deleted rooms are reported as not found.
    pub async fn find_room(&self, id: Id) -> Result<Room, EngineError> {
        let rs = self.get_room_state(&id).ok_or(EngineError::RoomNotFound(id))?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(id));
        }
        Ok(guard.room.clone())
    }

    /// All live rooms, by id unless a sort is given.
    pub async fn list_rooms(&self, sort: Option<RoomSort>) -> Vec<Room> {
        let states: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut rooms = Vec::with_capacity(states.len());
        for rs in states {
            let guard = rs.read().await;
            if !guard.deleted {
                rooms.push(guard.room.clone());
            }
        }

        let sort = sort.unwrap_or(RoomSort {
            key: RoomSortKey::Id,
            descending: false,
        });
        rooms.sort_by(|a, b| {
            let ord = compare_rooms(a, b, sort.key);
            if sort.descending { ord.reverse() } else { ord }
        });
        rooms
    }

    pub async fn create_room(&self, new_room: NewRoom) -> Result<Room, EngineError> {
        let NewRoom {
            room_number,
            room_type,
            price,
            status,
        } = new_room;
        validate_room(&room_number, &room_type, price)?;

        let _registry = self.registry_lock.lock().await;
        if self.rooms.len() >= MAX_ROOMS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if self.room_numbers.contains_key(&room_number) {
            return Err(EngineError::AlreadyExists {
                kind: "room",
                key: room_number,
            });
        }

        let room = Room {
            id: self.sequences.rooms.next(),
            room_number,
            room_type,
            price,
            status,
        };
        let event = Event::RoomCreated { room: room.clone() };
        self.wal_append(&event).await?;
        self.room_numbers.insert(room.room_number.clone(), room.id);
        self.rooms
            .insert(room.id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
        info!("room {} created (number {})", room.id, room.room_number);
        Ok(room)
    }

    /// Partial update: only fields present in `patch` change.
    pub async fn update_room(&self, id: Id, patch: RoomPatch) -> Result<Room, EngineError> {
        let _registry = self.registry_lock.lock().await;
        let rs = self.get_room_state(&id).ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(id));
        }
        if patch.is_empty() {
            return Ok(guard.room.clone());
        }

        let updated = patch.apply(&guard.room);
        validate_room(&updated.room_number, &updated.room_type, updated.price)?;
        if let Some(owner) = self.room_numbers.get(&updated.room_number)
            && *owner != id
        {
            return Err(EngineError::AlreadyExists {
                kind: "room",
                key: updated.room_number,
            });
        }

        let event = Event::RoomUpdated {
            room: updated.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(updated)
    }

    /// Soft delete. Deleting a missing or already deleted room is `RoomNotFound`.
    pub async fn delete_room(&self, id: Id) -> Result<(), EngineError> {
        let _registry = self.registry_lock.lock().await;
        let rs = self.get_room_state(&id).ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(id));
        }
        if guard.has_active_bookings() {
            return Err(EngineError::RoomInUse(id));
        }

        let event = Event::RoomDeleted { id };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("room {id} deleted");
        Ok(())
    }
}
