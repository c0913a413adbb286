//! Scripted edits for the command line.
//!
//! A script is a JSON array of operations, each tagged by `op`:
//!
//! ```json
//! [
//!   { "op": "open", "entity": "room" },
//!   { "op": "place", "item_id": "desk", "x": 40, "y": 60 },
//!   { "op": "rotate", "target": "#0" },
//!   { "op": "equip", "slot": "hat", "item_id": "top_hat_01" }
//! ]
//! ```
//!
//! Placement targets are either a placement id or `#N`, the N-th item
//! currently placed in the room draft.

use serde::{Deserialize, Serialize};

use super::errors::{EditorError, EditorResult};
use super::session::EditorSession;
use super::types::{
    EntityKind, EquipSlot, InventoryItem, ItemDescriptor, PlacementId, RoomTheme, SurfaceConfig,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditCommand {
    Open { entity: EntityKind },
    Close,
    Arrange { enabled: bool },
    Equip { slot: EquipSlot, item_id: String },
    Unequip { slot: EquipSlot },
    SetColors { primary: String, secondary: String },
    ResetColors,
    Place { item_id: String, x: f32, y: f32 },
    Move { target: String, x: f32, y: f32 },
    Rotate { target: String },
    Remove { target: String },
    ClearRoom,
    SetTheme { theme: RoomTheme },
    SetWall { surface: SurfaceConfig },
    SetFloor { surface: SurfaceConfig },
    Acquire { item: ItemDescriptor, quantity: Option<u32> },
    Undo,
    Discard { entity: EntityKind },
}

impl EditCommand {
    /// Apply to `session`, returning a one-line description of what happened.
    pub fn apply(&self, session: &mut EditorSession) -> EditorResult<String> {
        let line = match self {
            EditCommand::Open { entity } => match session.open_editor(*entity) {
                Some(switch) if switch.left_dirty => format!(
                    "opened {} editor (left {:?} with unsaved edits)",
                    entity.label(),
                    switch.transition.left
                ),
                Some(_) => format!("opened {} editor", entity.label()),
                None => format!("{} editor not opened", entity.label()),
            },
            EditCommand::Close => match session.close_editor() {
                Some(_) => "closed editor".to_string(),
                None => "no editor open".to_string(),
            },
            EditCommand::Arrange { enabled } => {
                format!("arranging={} applied={}", enabled, session.set_arranging(*enabled))
            }
            EditCommand::Equip { slot, item_id } => {
                session.equip(*slot, item_id);
                let now = session.avatar().draft().equipped.get(*slot).unwrap_or("-");
                format!("{:?} slot: {}", slot, now)
            }
            EditCommand::Unequip { slot } => {
                session.unequip(*slot);
                format!("{:?} slot cleared", slot)
            }
            EditCommand::SetColors { primary, secondary } => {
                session.set_colors(primary, secondary);
                format!("colors {} / {}", primary, secondary)
            }
            EditCommand::ResetColors => {
                session.reset_colors();
                "colors reset".to_string()
            }
            EditCommand::Place { item_id, x, y } => match session.place_item(item_id, *x, *y)? {
                Some(id) => format!("placed {} as {} (stock left: {})", item_id, id, session.quantity(item_id)),
                None => format!("{} not placed", item_id),
            },
            EditCommand::Move { target, x, y } => {
                let id = resolve_target(session, target)?;
                session.move_item(&id, *x, *y)?;
                format!("moved {} to ({}, {})", id, x, y)
            }
            EditCommand::Rotate { target } => {
                let id = resolve_target(session, target)?;
                session.rotate_item(&id)?;
                let rotation = session
                    .room()
                    .draft()
                    .find(&id)
                    .and_then(|placed| placed.rotation)
                    .map(|r| r.degrees())
                    .unwrap_or(0);
                format!("rotated {} to {} degrees", id, rotation)
            }
            EditCommand::Remove { target } => {
                let id = resolve_target(session, target)?;
                session.remove_item(&id)?;
                format!("removed {}", id)
            }
            EditCommand::ClearRoom => format!("cleared {} items", session.clear_room()),
            EditCommand::SetTheme { theme } => {
                session.set_theme(*theme);
                format!("theme {:?}", theme)
            }
            EditCommand::SetWall { surface } => {
                session.set_wall(surface.clone());
                format!("wall {}", surface.value)
            }
            EditCommand::SetFloor { surface } => {
                session.set_floor(surface.clone());
                format!("floor {}", surface.value)
            }
            EditCommand::Acquire { item, quantity } => {
                let mut change = None;
                for _ in 0..quantity.unwrap_or(1).max(1) {
                    change = Some(session.acquire(InventoryItem::new(item.clone(), 1)));
                }
                format!("acquired {} ({:?})", item.item_id, change)
            }
            EditCommand::Undo => match session.undo() {
                Some(kind) => format!("undid last {} edit", kind.label()),
                None => "nothing to undo".to_string(),
            },
            EditCommand::Discard { entity } => {
                session.discard(*entity);
                format!("discarded {} draft", entity.label())
            }
        };
        Ok(line)
    }
}

fn resolve_target(session: &EditorSession, target: &str) -> EditorResult<PlacementId> {
    let placed = &session.room().draft().placed_items;
    if let Some(index) = target.strip_prefix('#') {
        return index
            .parse::<usize>()
            .ok()
            .and_then(|i| placed.get(i))
            .map(|item| item.id.clone())
            .ok_or_else(|| EditorError::PlacementNotFound(target.to_string()));
    }
    Ok(target.to_string())
}

/// Parse a script body.
pub fn parse_script(content: &str, max_bytes: usize) -> Result<Vec<EditCommand>, crate::validation::ScriptError> {
    crate::validation::secure_json_parse(content, max_bytes)
}
