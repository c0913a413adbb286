//! Which editor panel is open, and the in-progress drag.

use serde::{Deserialize, Serialize};

use super::permission::PermissionGate;
use super::types::{EntityKind, ItemDescriptor, ItemId, PlacementId, Position};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditorMode {
    Closed,
    EditingAvatar,
    /// `arranging` is the bulk arrangement sub-mode of the room editor.
    EditingRoom { arranging: bool },
}

impl Default for EditorMode {
    fn default() -> Self {
        Self::Closed
    }
}

impl EditorMode {
    pub fn for_entity(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Avatar => EditorMode::EditingAvatar,
            EntityKind::Room => EditorMode::EditingRoom { arranging: false },
        }
    }

    /// Entity being edited, if any.
    pub fn entity(&self) -> Option<EntityKind> {
        match self {
            EditorMode::Closed => None,
            EditorMode::EditingAvatar => Some(EntityKind::Avatar),
            EditorMode::EditingRoom { .. } => Some(EntityKind::Room),
        }
    }

    pub fn is_arranging(&self) -> bool {
        matches!(self, EditorMode::EditingRoom { arranging: true })
    }
}

/// Where a dragged item came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragOrigin {
    /// Fresh unit pulled from the inventory tray
    Inventory,
    /// Existing placement being repositioned
    Placed {
        placement_id: PlacementId,
        original_position: Position,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragState {
    pub item: ItemDescriptor,
    pub origin: DragOrigin,
}

impl DragState {
    pub fn from_inventory(item: ItemDescriptor) -> Self {
        Self {
            item,
            origin: DragOrigin::Inventory,
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item.item_id
    }

    pub fn source_is_inventory(&self) -> bool {
        matches!(self.origin, DragOrigin::Inventory)
    }

    pub fn original_position(&self) -> Option<Position> {
        match &self.origin {
            DragOrigin::Inventory => None,
            DragOrigin::Placed {
                original_position, ..
            } => Some(*original_position),
        }
    }
}

/// A completed open/switch/close. `left` names the entity whose editor was
/// closed so the surface can decide whether to save or discard it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: EditorMode,
    pub to: EditorMode,
    pub left: Option<EntityKind>,
}

#[derive(Debug, Clone, Default)]
pub struct UIModeController {
    mode: EditorMode,
    dragging: Option<DragState>,
}

impl UIModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn active_entity(&self) -> Option<EntityKind> {
        self.mode.entity()
    }

    /// Open (or switch directly to) the editor for `kind`. Returns `None`
    /// when editing is not permitted or the editor is already open.
    pub fn open(&mut self, kind: EntityKind, gate: &PermissionGate) -> Option<ModeTransition> {
        if !gate.allows("open editor") {
            return None;
        }
        if self.mode.entity() == Some(kind) {
            return None;
        }
        Some(self.transition_to(EditorMode::for_entity(kind)))
    }

    pub fn close(&mut self) -> Option<ModeTransition> {
        if self.mode == EditorMode::Closed {
            return None;
        }
        Some(self.transition_to(EditorMode::Closed))
    }

    /// Toggle bulk arrangement; only meaningful in the room editor.
    pub fn set_arranging(&mut self, arranging: bool) -> bool {
        match self.mode {
            EditorMode::EditingRoom { .. } => {
                self.mode = EditorMode::EditingRoom { arranging };
                true
            }
            _ => false,
        }
    }

    pub fn start_drag(&mut self, drag: DragState) {
        self.dragging = Some(drag);
    }

    /// Clear the drag whether or not the drop landed.
    pub fn end_drag(&mut self) -> Option<DragState> {
        self.dragging.take()
    }

    pub fn dragging(&self) -> Option<&DragState> {
        self.dragging.as_ref()
    }

    fn transition_to(&mut self, to: EditorMode) -> ModeTransition {
        let from = self.mode;
        self.mode = to;
        self.dragging = None;
        ModeTransition {
            from,
            to,
            left: from.entity(),
        }
    }
}

/// Toggle semantics for equipping: picking the item already in the slot
/// takes it off.
pub fn toggle_equip(current: Option<&str>, item_id: &str) -> Option<ItemId> {
    if current == Some(item_id) {
        None
    } else {
        Some(item_id.to_string())
    }
}
