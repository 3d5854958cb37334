//! In-memory viewport group registry.

use crate::engine::ViewportGroups;
use parking_lot::{Mutex, RwLock};

/// A fixed registry of viewport groups that records render requests.
#[derive(Debug, Default)]
pub struct InMemoryViewportGroups {
    groups: RwLock<Vec<(String, Vec<String>)>>,
    renders: Mutex<Vec<Vec<String>>>,
}

impl InMemoryViewportGroups {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with one group holding the given viewports.
    #[must_use]
    pub fn with_group(group_id: &str, viewport_ids: &[&str]) -> Self {
        let groups = Self::new();
        groups.add_group(group_id, viewport_ids);
        groups
    }

    /// Adds a group, replacing the viewports of an existing one.
    pub fn add_group(&self, group_id: &str, viewport_ids: &[&str]) {
        let viewports = viewport_ids.iter().map(|v| (*v).to_string()).collect();
        let mut groups = self.groups.write();
        match groups.iter_mut().find(|(id, _)| id == group_id) {
            Some((_, existing)) => *existing = viewports,
            None => groups.push((group_id.to_string(), viewports)),
        }
    }

    /// Returns every render request so far.
    #[must_use]
    pub fn renders(&self) -> Vec<Vec<String>> {
        self.renders.lock().clone()
    }

    /// Forgets recorded render requests.
    pub fn clear_renders(&self) {
        self.renders.lock().clear();
    }
}

impl ViewportGroups for InMemoryViewportGroups {
    fn group_ids(&self) -> Vec<String> {
        self.groups.read().iter().map(|(id, _)| id.clone()).collect()
    }

    fn viewport_ids(&self, group_id: &str) -> Vec<String> {
        self.groups
            .read()
            .iter()
            .find(|(id, _)| id == group_id)
            .map(|(_, viewports)| viewports.clone())
            .unwrap_or_default()
    }

    fn render_viewports(&self, viewport_ids: &[String]) {
        self.renders.lock().push(viewport_ids.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_keep_registration_order() {
        let groups = InMemoryViewportGroups::with_group("default", &["axial"]);
        groups.add_group("mpr", &["sagittal", "coronal"]);
        groups.add_group("default", &["axial", "3d"]);

        assert_eq!(groups.group_ids(), vec!["default", "mpr"]);
        assert_eq!(groups.viewport_ids("default"), vec!["axial", "3d"]);
        assert!(groups.viewport_ids("missing").is_empty());
    }

    #[test]
    fn renders_are_recorded() {
        let groups = InMemoryViewportGroups::new();
        groups.render_viewports(&["a".to_string()]);
        assert_eq!(groups.renders(), vec![vec!["a".to_string()]]);
        groups.clear_renders();
        assert!(groups.renders().is_empty());
    }
}
