//! Read-only catalog of GSR locations.

use campus_gsr_core::{GsrError, Result, Room, RoomId};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Rooms keyed by ID, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct RoomCatalog {
    rooms: Vec<Room>,
    by_id: HashMap<RoomId, usize>,
}

impl RoomCatalog {
    /// Build from rooms. Locations in `location_blacklist` become inactive.
    #[must_use]
    pub fn new(rooms: Vec<Room>, location_blacklist: &HashSet<String>) -> Self {
        let rooms: Vec<Room> = rooms
            .into_iter()
            .map(|mut room| {
                if location_blacklist.contains(&room.lid) {
                    room.active = false;
                }
                room
            })
            .collect();
        let by_id = rooms.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
        Self { rooms, by_id }
    }

    /// Parse a JSON array of rooms.
    ///
    /// # Errors
    ///
    /// Returns [`GsrError::Invalid`] if the document is malformed.
    pub fn from_json(json: &str, location_blacklist: &HashSet<String>) -> Result<Self> {
        let rooms: Vec<Room> = serde_json::from_str(json)
            .map_err(|e| GsrError::Invalid(format!("Invalid room catalog: {e}")))?;
        Ok(Self::new(rooms, location_blacklist))
    }

    /// Read and parse a catalog file.
    ///
    /// # Errors
    ///
    /// Returns [`GsrError::Invalid`] if the file is unreadable or malformed.
    pub fn from_path(path: impl AsRef<Path>, location_blacklist: &HashSet<String>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| GsrError::Invalid(format!("Cannot read {}: {e}", path.display())))?;
        Self::from_json(&json, location_blacklist)
    }

    /// Room by ID, active or not.
    #[must_use]
    pub fn by_id(&self, id: RoomId) -> Option<&Room> {
        self.by_id.get(&id).and_then(|&i| self.rooms.get(i))
    }

    /// First room with the given external location ID.
    #[must_use]
    pub fn by_external_location_id(&self, lid: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.lid == lid)
    }

    /// Room with the given location and group IDs.
    #[must_use]
    pub fn by_external_ids(&self, lid: &str, gid: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.lid == lid && r.gid == gid)
    }

    /// First room with the given external group ID.
    #[must_use]
    pub fn by_external_group_id(&self, gid: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.gid == gid)
    }

    /// Active rooms in catalog order.
    pub fn active(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter().filter(|r| r.active)
    }
}
