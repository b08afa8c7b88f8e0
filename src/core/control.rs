//! Controls and the per-page control table
//!
//! A page's content is a flat table of controls keyed by ID, where each control
//! records its parent and the ordered IDs of its children. IDs are decimal
//! strings handed out by a counter that starts at `"0"`, the root control.

use crate::core::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// ID of the root control every page starts with
pub const ROOT_CONTROL_ID: &str = "0";

/// Control type of the root control
pub const ROOT_CONTROL_TYPE: &str = "page";

/// A single node of a page's content tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    pub id: String,
    #[serde(rename = "type")]
    pub control_type: String,
    /// Empty for the root control
    #[serde(rename = "parentID")]
    pub parent_id: String,
    #[serde(rename = "childIDs")]
    pub child_ids: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl Control {
    pub fn new(
        id: impl Into<String>,
        control_type: impl Into<String>,
        parent_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            control_type: control_type.into(),
            parent_id: parent_id.into(),
            child_ids: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty()
    }
}

/// ID allocator and control map of one page
///
/// The table is not synchronized itself; the owning page wraps it in a single
/// lock so allocation and insertion happen together.
#[derive(Debug, Clone)]
pub struct ControlTable {
    next_id: u64,
    controls: HashMap<String, Control>,
}

impl ControlTable {
    /// Create a table holding only the root control
    pub fn new() -> Self {
        let mut table = Self {
            next_id: 0,
            controls: HashMap::new(),
        };
        let root_id = table.allocate_id();
        table
            .controls
            .insert(root_id.clone(), Control::new(root_id, ROOT_CONTROL_TYPE, ""));
        table
    }

    fn allocate_id(&mut self) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        id
    }

    /// Insert a new control under `parent_id`
    ///
    /// The parent is checked before an ID is allocated: a failed insert leaves
    /// both the allocator and the map untouched.
    pub fn insert(
        &mut self,
        control_type: &str,
        parent_id: &str,
        attrs: BTreeMap<String, String>,
    ) -> HubResult<Control> {
        if !self.controls.contains_key(parent_id) {
            return Err(HubError::ParentNotFound {
                parent_id: parent_id.to_string(),
            });
        }

        let id = self.allocate_id();
        let mut control = Control::new(id.clone(), control_type, parent_id);
        control.attrs = attrs;

        if let Some(parent) = self.controls.get_mut(parent_id) {
            parent.child_ids.push(id.clone());
        }
        self.controls.insert(id, control.clone());

        Ok(control)
    }

    /// Merge attributes into an existing control
    pub fn set_attrs(
        &mut self,
        control_id: &str,
        attrs: BTreeMap<String, String>,
    ) -> HubResult<Control> {
        let control = self
            .controls
            .get_mut(control_id)
            .ok_or_else(|| HubError::ControlNotFound {
                control_id: control_id.to_string(),
            })?;

        control.attrs.extend(attrs);
        Ok(control.clone())
    }

    /// Remove a control and its whole subtree
    ///
    /// Returns the removed IDs (subtree root first) and the updated parent.
    pub fn remove(&mut self, control_id: &str) -> HubResult<(Vec<String>, Control)> {
        let control = self
            .controls
            .get(control_id)
            .ok_or_else(|| HubError::ControlNotFound {
                control_id: control_id.to_string(),
            })?;

        if control.is_root() {
            return Err(HubError::rejected("the root control cannot be removed"));
        }
        let parent_id = control.parent_id.clone();

        let mut removed = Vec::new();
        let mut pending = vec![control_id.to_string()];
        while let Some(id) = pending.pop() {
            if let Some(ctl) = self.controls.remove(&id) {
                pending.extend(ctl.child_ids.iter().rev().cloned());
                removed.push(id);
            }
        }

        let parent = self
            .controls
            .get_mut(&parent_id)
            .ok_or_else(|| HubError::ParentNotFound {
                parent_id: parent_id.clone(),
            })?;
        parent.child_ids.retain(|id| id != control_id);

        Ok((removed, parent.clone()))
    }

    pub fn get(&self, control_id: &str) -> Option<&Control> {
        self.controls.get(control_id)
    }

    pub fn contains(&self, control_id: &str) -> bool {
        self.controls.contains_key(control_id)
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

impl Default for ControlTable {
    fn default() -> Self {
        Self::new()
    }
}
