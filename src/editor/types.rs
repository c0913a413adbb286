use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of placed items a room draft may hold.
pub const ROOM_ITEM_LIMIT: usize = 50;
/// Default undo depth.
pub const MAX_UNDO: usize = 10;

pub const AVATAR_SCHEMA_VERSION: u8 = 1;
pub const ROOM_SCHEMA_VERSION: u8 = 1;
pub const INVENTORY_SCHEMA_VERSION: u8 = 1;

/// Room coordinates are percentages of the room canvas.
pub const COORD_MIN: f32 = 0.0;
pub const COORD_MAX: f32 = 100.0;

pub type ItemId = String;
pub type PlacementId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Avatar,
    Room,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Avatar => "avatar",
            EntityKind::Room => "room",
        }
    }
}

// ============================================================================
// Avatar
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnimalType {
    Cat,
    Dog,
    Bunny,
    Bear,
    Fox,
    Owl,
    Panda,
    Penguin,
}

impl Default for AnimalType {
    fn default() -> Self {
        Self::Cat
    }
}

impl AnimalType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cat" => Some(Self::Cat),
            "dog" => Some(Self::Dog),
            "bunny" | "rabbit" => Some(Self::Bunny),
            "bear" => Some(Self::Bear),
            "fox" => Some(Self::Fox),
            "owl" => Some(Self::Owl),
            "panda" => Some(Self::Panda),
            "penguin" => Some(Self::Penguin),
            _ => None,
        }
    }
}

/// The fixed set of avatar equipment slots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    Hat,
    Glasses,
    Neck,
    Held,
}

impl EquipSlot {
    pub const ALL: [EquipSlot; 4] = [
        EquipSlot::Hat,
        EquipSlot::Glasses,
        EquipSlot::Neck,
        EquipSlot::Held,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hat" | "head" => Some(Self::Hat),
            "glasses" | "eyes" => Some(Self::Glasses),
            "neck" | "neckwear" => Some(Self::Neck),
            "held" | "hand" => Some(Self::Held),
            _ => None,
        }
    }
}

/// Slot -> item assignment. Every slot is always present, possibly empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Equipment {
    pub hat: Option<ItemId>,
    pub glasses: Option<ItemId>,
    pub neck: Option<ItemId>,
    pub held: Option<ItemId>,
}

impl Equipment {
    pub fn get(&self, slot: EquipSlot) -> Option<&str> {
        match slot {
            EquipSlot::Hat => self.hat.as_deref(),
            EquipSlot::Glasses => self.glasses.as_deref(),
            EquipSlot::Neck => self.neck.as_deref(),
            EquipSlot::Held => self.held.as_deref(),
        }
    }

    pub fn set(&mut self, slot: EquipSlot, item: Option<ItemId>) {
        let target = match slot {
            EquipSlot::Hat => &mut self.hat,
            EquipSlot::Glasses => &mut self.glasses,
            EquipSlot::Neck => &mut self.neck,
            EquipSlot::Held => &mut self.held,
        };
        *target = item;
    }

    /// Occupied slots in declaration order.
    pub fn occupied(&self) -> impl Iterator<Item = (EquipSlot, &str)> {
        EquipSlot::ALL
            .into_iter()
            .filter_map(move |slot| self.get(slot).map(|item| (slot, item)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvatarColors {
    pub primary: String,
    pub secondary: String,
    /// Set once the student picks colours instead of the animal's defaults.
    pub customized: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Avatar {
    pub animal: AnimalType,
    pub equipped: Equipment,
    pub colors: Option<AvatarColors>,
}

impl Avatar {
    pub fn new(animal: AnimalType) -> Self {
        Self {
            animal,
            equipped: Equipment::default(),
            colors: None,
        }
    }

    pub fn payload(&self) -> AvatarPayload {
        AvatarPayload {
            equipped: self.equipped.clone(),
            colors: self.colors.clone(),
        }
    }
}

/// Body of a `saveAvatar` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvatarPayload {
    pub equipped: Equipment,
    pub colors: Option<AvatarColors>,
}

// ============================================================================
// Room
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoomTheme {
    Classroom,
    Cozy,
    Garden,
    Space,
    Ocean,
    Castle,
}

impl Default for RoomTheme {
    fn default() -> Self {
        Self::Classroom
    }
}

impl RoomTheme {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "classroom" => Some(Self::Classroom),
            "cozy" => Some(Self::Cozy),
            "garden" => Some(Self::Garden),
            "space" => Some(Self::Space),
            "ocean" => Some(Self::Ocean),
            "castle" => Some(Self::Castle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    Color,
    Pattern,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatternEncoding {
    Css,
    Image,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternMeta {
    pub encoding: PatternEncoding,
    pub payload: String,
}

/// Wall or floor finish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub kind: SurfaceKind,
    pub value: String,
    pub pattern_meta: Option<PatternMeta>,
}

impl SurfaceConfig {
    pub fn color(value: impl Into<String>) -> Self {
        Self {
            kind: SurfaceKind::Color,
            value: value.into(),
            pattern_meta: None,
        }
    }

    pub fn pattern(value: impl Into<String>, meta: PatternMeta) -> Self {
        Self {
            kind: SurfaceKind::Pattern,
            value: value.into(),
            pattern_meta: Some(meta),
        }
    }
}

/// Quarter-turn rotation of a placed item. Serialized as degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "u16", try_from = "u16")]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Next clockwise quarter turn, wrapping 270 back to 0.
    pub fn next(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }
}

impl From<Rotation> for u16 {
    fn from(r: Rotation) -> Self {
        r.degrees()
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(format!("unsupported rotation {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: clamp_coord(x),
            y: clamp_coord(y),
        }
    }
}

/// Clamp a coordinate into the room canvas. NaN lands on the origin.
pub fn clamp_coord(v: f32) -> f32 {
    if v.is_nan() {
        COORD_MIN
    } else {
        v.clamp(COORD_MIN, COORD_MAX)
    }
}

/// Stacking order follows depth: lower on the canvas draws on top.
pub fn z_index_for(y: f32) -> i32 {
    (clamp_coord(y) * 10.0).floor() as i32
}

/// An inventory item placed on the room canvas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacedItem {
    pub id: PlacementId,
    pub item_id: ItemId,
    pub x: f32,
    pub y: f32,
    pub z_index: i32,
    pub rotation: Option<Rotation>,
}

impl PlacedItem {
    pub fn new(item_id: impl Into<ItemId>, x: f32, y: f32) -> Self {
        let pos = Position::new(x, y);
        Self {
            id: Uuid::new_v4().to_string(),
            item_id: item_id.into(),
            x: pos.x,
            y: pos.y,
            z_index: z_index_for(pos.y),
            rotation: None,
        }
    }

    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
        }
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        let pos = Position::new(x, y);
        self.x = pos.x;
        self.y = pos.y;
        self.z_index = z_index_for(pos.y);
    }

    pub fn rotate(&mut self) -> Rotation {
        let next = self.rotation.unwrap_or(Rotation::Deg0).next();
        self.rotation = Some(next);
        next
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub theme: RoomTheme,
    pub wall: SurfaceConfig,
    pub floor: SurfaceConfig,
    pub placed_items: Vec<PlacedItem>,
}

impl Default for Room {
    fn default() -> Self {
        Self {
            theme: RoomTheme::default(),
            wall: SurfaceConfig::color("#f5efe6"),
            floor: SurfaceConfig::color("#c8a27a"),
            placed_items: Vec::new(),
        }
    }
}

impl Room {
    pub fn find(&self, placement_id: &str) -> Option<&PlacedItem> {
        self.placed_items.iter().find(|p| p.id == placement_id)
    }

    pub fn find_mut(&mut self, placement_id: &str) -> Option<&mut PlacedItem> {
        self.placed_items.iter_mut().find(|p| p.id == placement_id)
    }

    /// How many placements reference `item_id`.
    pub fn count_of(&self, item_id: &str) -> usize {
        self.placed_items
            .iter()
            .filter(|p| p.item_id == item_id)
            .count()
    }

    pub fn payload(&self) -> RoomPayload {
        RoomPayload {
            theme: self.theme,
            wall: self.wall.clone(),
            floor: self.floor.clone(),
            placed_items: self.placed_items.clone(),
        }
    }
}

/// Body of a `saveRoom` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomPayload {
    pub theme: RoomTheme,
    pub wall: SurfaceConfig,
    pub floor: SurfaceConfig,
    pub placed_items: Vec<PlacedItem>,
}

/// A committed value captured for undo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EntitySnapshot {
    Avatar(Avatar),
    Room(Room),
}

impl EntitySnapshot {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntitySnapshot::Avatar(_) => EntityKind::Avatar,
            EntitySnapshot::Room(_) => EntityKind::Room,
        }
    }
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Hat,
    Glasses,
    Neck,
    Held,
    Furniture,
    Decor,
    Plant,
    Other,
}

impl ItemCategory {
    /// Equip slot served by this category, if it is wearable.
    pub fn slot(&self) -> Option<EquipSlot> {
        match self {
            ItemCategory::Hat => Some(EquipSlot::Hat),
            ItemCategory::Glasses => Some(EquipSlot::Glasses),
            ItemCategory::Neck => Some(EquipSlot::Neck),
            ItemCategory::Held => Some(EquipSlot::Held),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

/// What the client knows about an item when it has no ledger entry for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemDescriptor {
    pub item_id: ItemId,
    pub display_name: String,
    pub category: ItemCategory,
    pub unit_cost: u32,
    pub rarity: Rarity,
}

impl ItemDescriptor {
    /// Degraded stand-in used when full metadata was never cached.
    pub fn placeholder(item_id: impl Into<ItemId>) -> Self {
        let item_id = item_id.into();
        Self {
            display_name: item_id.clone(),
            item_id,
            category: ItemCategory::Other,
            unit_cost: 0,
            rarity: Rarity::Common,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryItem {
    pub id: ItemId,
    pub display_name: String,
    pub category: ItemCategory,
    pub unit_cost: u32,
    pub rarity: Rarity,
    pub quantity: u32,
    /// Equip-only items are owned or not; their quantity is never consumed.
    pub stackable: bool,
    pub acquired_at: Option<DateTime<Utc>>,
}

impl InventoryItem {
    pub fn new(descriptor: ItemDescriptor, quantity: u32) -> Self {
        Self {
            id: descriptor.item_id,
            display_name: descriptor.display_name,
            category: descriptor.category,
            unit_cost: descriptor.unit_cost,
            rarity: descriptor.rarity,
            quantity,
            stackable: true,
            acquired_at: None,
        }
    }

    pub fn equip_only(descriptor: ItemDescriptor) -> Self {
        Self {
            stackable: false,
            ..Self::new(descriptor, 1)
        }
    }

    pub fn descriptor(&self) -> ItemDescriptor {
        ItemDescriptor {
            item_id: self.id.clone(),
            display_name: self.display_name.clone(),
            category: self.category,
            unit_cost: self.unit_cost,
            rarity: self.rarity,
        }
    }
}

// ============================================================================
// Collaborator shapes
// ============================================================================

/// Everything the page-data fetch hands the core on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSnapshot {
    pub avatar: Avatar,
    pub room: Room,
    pub inventory: Vec<InventoryItem>,
    /// Access-control answer; any non-zero value grants edit rights.
    pub permission: u8,
}

impl ServerSnapshot {
    pub fn can_edit(&self) -> bool {
        self.permission != 0
    }

    /// Fresh student: bare avatar, default room, empty inventory.
    pub fn starter(animal: AnimalType, can_edit: bool) -> Self {
        Self {
            avatar: Avatar::new(animal),
            room: Room::default(),
            inventory: Vec::new(),
            permission: u8::from(can_edit),
        }
    }
}

/// Positive acknowledgement from the persistence collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    pub saved_at: DateTime<Utc>,
}

impl Ack {
    pub fn now() -> Self {
        Self {
            saved_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_index_tracks_depth() {
        let item = PlacedItem::new("desk", 10.0, 42.37);
        assert_eq!(item.z_index, 423);

        let mut moved = item.clone();
        moved.set_position(10.0, 99.99);
        assert_eq!(moved.z_index, 999);
        assert_ne!(item.id, PlacedItem::new("desk", 0.0, 0.0).id);
    }

    #[test]
    fn coordinates_are_clamped() {
        let item = PlacedItem::new("lamp", -5.0, 250.0);
        assert_eq!(item.x, 0.0);
        assert_eq!(item.y, 100.0);
        assert_eq!(item.z_index, 1000);

        let nan = PlacedItem::new("lamp", f32::NAN, 3.0);
        assert_eq!(nan.x, 0.0);
    }

    #[test]
    fn rotation_cycles_quarter_turns() {
        let mut item = PlacedItem::new("chair", 1.0, 1.0);
        assert_eq!(item.rotation, None);
        assert_eq!(item.rotate(), Rotation::Deg90);
        assert_eq!(item.rotate(), Rotation::Deg180);
        assert_eq!(item.rotate(), Rotation::Deg270);
        assert_eq!(item.rotate(), Rotation::Deg0);
    }

    #[test]
    fn rotation_serializes_as_degrees() {
        let json = serde_json::to_string(&Rotation::Deg270).unwrap();
        assert_eq!(json, "270");
        let parsed: Rotation = serde_json::from_str("90").unwrap();
        assert_eq!(parsed, Rotation::Deg90);
        assert!(serde_json::from_str::<Rotation>("45").is_err());
    }

    #[test]
    fn equipment_slots_are_independent() {
        let mut eq = Equipment::default();
        eq.set(EquipSlot::Hat, Some("top_hat_01".into()));
        eq.set(EquipSlot::Held, Some("wand".into()));
        assert_eq!(eq.get(EquipSlot::Hat), Some("top_hat_01"));
        assert_eq!(eq.get(EquipSlot::Glasses), None);
        let occupied: Vec<_> = eq.occupied().collect();
        assert_eq!(
            occupied,
            vec![(EquipSlot::Hat, "top_hat_01"), (EquipSlot::Held, "wand")]
        );
    }

    #[test]
    fn starter_snapshot_maps_permission_flag() {
        assert!(ServerSnapshot::starter(AnimalType::Fox, true).can_edit());
        assert!(!ServerSnapshot::starter(AnimalType::Fox, false).can_edit());
    }
}
