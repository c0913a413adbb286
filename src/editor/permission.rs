use log::debug;

use crate::metrics;

/// Single source of truth for whether the viewer may edit.
///
/// Denials are silent to the caller; they are counted and logged on the
/// `security` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionGate {
    can_edit: bool,
}

impl PermissionGate {
    pub fn new(can_edit: bool) -> Self {
        Self { can_edit }
    }

    /// Map the page-data access flag; any non-zero value grants editing.
    pub fn from_flag(flag: u8) -> Self {
        Self::new(flag != 0)
    }

    pub fn can_edit(&self) -> bool {
        self.can_edit
    }

    /// Returns true when the value actually changed.
    pub fn set(&mut self, can_edit: bool) -> bool {
        let changed = self.can_edit != can_edit;
        self.can_edit = can_edit;
        changed
    }

    /// Gate a mutating operation, recording the denial when it is refused.
    pub fn allows(&self, operation: &str) -> bool {
        if !self.can_edit {
            metrics::inc_denied_edits();
            debug!(target: "security", "edit denied: {} attempted without edit permission", operation);
        }
        self.can_edit
    }
}
