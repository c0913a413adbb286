use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::IVec;

use super::{BackendError, PersistenceApi};
use crate::editor::types::{
    Ack, Avatar, AvatarPayload, InventoryItem, Room, RoomPayload, ServerSnapshot,
    AVATAR_SCHEMA_VERSION, INVENTORY_SCHEMA_VERSION, ROOM_SCHEMA_VERSION,
};
use crate::logutil::escape_log;

const TREE_PRIMARY: &str = "roomkeeper";

/// Versioned envelope around every stored value.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord<T> {
    schema_version: u8,
    value: T,
}

/// Sled-backed stand-in for the remote source of truth.
///
/// Keys: `avatars:<handle>`, `rooms:<handle>`, `inventory:<handle>`,
/// `access:<handle>`. Values are bincode-encoded [`StoredRecord`]s.
pub struct SledBackend {
    _db: sled::Db,
    primary: sled::Tree,
}

impl SledBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let primary = db.open_tree(TREE_PRIMARY)?;
        Ok(Self { _db: db, primary })
    }

    fn avatar_key(handle: &str) -> Vec<u8> {
        format!("avatars:{}", handle.to_ascii_lowercase()).into_bytes()
    }

    fn room_key(handle: &str) -> Vec<u8> {
        format!("rooms:{}", handle.to_ascii_lowercase()).into_bytes()
    }

    fn inventory_key(handle: &str) -> Vec<u8> {
        format!("inventory:{}", handle.to_ascii_lowercase()).into_bytes()
    }

    fn access_key(handle: &str) -> Vec<u8> {
        format!("access:{}", handle.to_ascii_lowercase()).into_bytes()
    }

    fn serialize<T: Serialize>(value: &T, schema_version: u8) -> Result<Vec<u8>, BackendError> {
        Ok(bincode::serialize(&StoredRecord {
            schema_version,
            value,
        })?)
    }

    fn deserialize<T: DeserializeOwned>(
        bytes: IVec,
        entity: &'static str,
        expected: u8,
    ) -> Result<T, BackendError> {
        let record: StoredRecord<T> = bincode::deserialize(&bytes)?;
        if record.schema_version != expected {
            return Err(BackendError::SchemaMismatch {
                entity,
                expected,
                found: record.schema_version,
            });
        }
        Ok(record.value)
    }

    fn put<T: Serialize>(&self, key: Vec<u8>, value: &T, schema_version: u8) -> Result<(), BackendError> {
        let bytes = Self::serialize(value, schema_version)?;
        self.primary.insert(key, bytes)?;
        self.primary.flush()?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        key: Vec<u8>,
        entity: &'static str,
        expected: u8,
        handle: &str,
    ) -> Result<T, BackendError> {
        let Some(bytes) = self.primary.get(&key)? else {
            return Err(BackendError::NotFound(format!("{}: {}", entity, handle)));
        };
        Self::deserialize(bytes, entity, expected)
    }

    /// Write a complete snapshot for `handle`, replacing whatever is stored.
    pub fn seed(&self, handle: &str, snapshot: &ServerSnapshot) -> Result<(), BackendError> {
        self.put(Self::avatar_key(handle), &snapshot.avatar, AVATAR_SCHEMA_VERSION)?;
        self.put(Self::room_key(handle), &snapshot.room, ROOM_SCHEMA_VERSION)?;
        self.put(
            Self::inventory_key(handle),
            &snapshot.inventory,
            INVENTORY_SCHEMA_VERSION,
        )?;
        self.primary
            .insert(Self::access_key(handle), vec![snapshot.permission])?;
        self.primary.flush()?;
        Ok(())
    }

    pub fn contains(&self, handle: &str) -> Result<bool, BackendError> {
        Ok(self.primary.contains_key(Self::avatar_key(handle))?)
    }

    /// List every handle with a stored avatar.
    pub fn list_handles(&self) -> Result<Vec<String>, BackendError> {
        let mut handles = Vec::new();
        for entry in self.primary.scan_prefix(b"avatars:") {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(handle) = text.strip_prefix("avatars:") {
                handles.push(handle.to_string());
            }
        }
        Ok(handles)
    }

    fn load_snapshot(&self, handle: &str) -> Result<ServerSnapshot, BackendError> {
        let avatar: Avatar = self.get(
            Self::avatar_key(handle),
            "avatar",
            AVATAR_SCHEMA_VERSION,
            handle,
        )?;
        let room: Room = self.get(Self::room_key(handle), "room", ROOM_SCHEMA_VERSION, handle)?;
        let inventory: Vec<InventoryItem> = match self.get(
            Self::inventory_key(handle),
            "inventory",
            INVENTORY_SCHEMA_VERSION,
            handle,
        ) {
            Ok(items) => items,
            Err(BackendError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let permission = self
            .primary
            .get(Self::access_key(handle))?
            .and_then(|bytes| bytes.first().copied())
            .unwrap_or(0);
        Ok(ServerSnapshot {
            avatar,
            room,
            inventory,
            permission,
        })
    }
}

#[async_trait]
impl PersistenceApi for SledBackend {
    async fn fetch_initial_state(&self, handle: &str) -> Result<ServerSnapshot, BackendError> {
        self.load_snapshot(handle)
    }

    async fn save_avatar(&self, handle: &str, payload: &AvatarPayload) -> Result<Ack, BackendError> {
        // The animal is chosen at enrolment and never travels in a save.
        let mut avatar: Avatar = self.get(
            Self::avatar_key(handle),
            "avatar",
            AVATAR_SCHEMA_VERSION,
            handle,
        )?;
        avatar.equipped = payload.equipped.clone();
        avatar.colors = payload.colors.clone();
        self.put(Self::avatar_key(handle), &avatar, AVATAR_SCHEMA_VERSION)?;
        debug!("stored avatar for {}", escape_log(handle));
        Ok(Ack { saved_at: Utc::now() })
    }

    async fn save_room(&self, handle: &str, payload: &RoomPayload) -> Result<Ack, BackendError> {
        let room = Room {
            theme: payload.theme,
            wall: payload.wall.clone(),
            floor: payload.floor.clone(),
            placed_items: payload.placed_items.clone(),
        };
        self.put(Self::room_key(handle), &room, ROOM_SCHEMA_VERSION)?;
        debug!(
            "stored room for {} ({} items)",
            escape_log(handle),
            room.placed_items.len()
        );
        Ok(Ack { saved_at: Utc::now() })
    }

    async fn save_inventory(&self, handle: &str, items: &[InventoryItem]) -> Result<Ack, BackendError> {
        self.put(Self::inventory_key(handle), &items, INVENTORY_SCHEMA_VERSION)?;
        Ok(Ack { saved_at: Utc::now() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::types::{AnimalType, EquipSlot, PlacedItem};
    use tempfile::TempDir;

    #[tokio::test]
    async fn seed_fetch_and_save_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let backend = SledBackend::open(dir.path()).expect("open");

        let snapshot = ServerSnapshot::starter(AnimalType::Panda, true);
        backend.seed("Student-1", &snapshot).expect("seed");
        assert_eq!(backend.list_handles().unwrap(), vec!["student-1".to_string()]);

        let mut avatar = snapshot.avatar.clone();
        avatar.equipped.set(EquipSlot::Hat, Some("beret".into()));
        backend
            .save_avatar("student-1", &avatar.payload())
            .await
            .expect("save avatar");

        let mut room = snapshot.room.clone();
        room.placed_items.push(PlacedItem::new("desk", 20.0, 30.0));
        backend
            .save_room("student-1", &room.payload())
            .await
            .expect("save room");

        let fetched = backend.fetch_initial_state("student-1").await.unwrap();
        assert_eq!(fetched.avatar.animal, AnimalType::Panda);
        assert_eq!(fetched.avatar.equipped.hat.as_deref(), Some("beret"));
        assert_eq!(fetched.room, room);
        assert!(fetched.can_edit());
    }

    #[tokio::test]
    async fn missing_handle_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let backend = SledBackend::open(dir.path()).expect("open");
        let err = backend.fetch_initial_state("nobody").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn records_from_another_schema_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let backend = SledBackend::open(dir.path()).expect("open");
        backend
            .seed("maya", &ServerSnapshot::starter(AnimalType::Cat, true))
            .expect("seed");

        let stale = SledBackend::serialize(&Avatar::new(AnimalType::Cat), 9).unwrap();
        backend
            .primary
            .insert(SledBackend::avatar_key("maya"), stale)
            .unwrap();

        let err = backend.fetch_initial_state("maya").await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::SchemaMismatch {
                entity: "avatar",
                expected: 1,
                found: 9
            }
        ));
    }
}
