//! Seam between the pose computation and the host's skeleton

use crate::core::Pose;
use std::collections::HashMap;
use tracing::warn;

/// Visibility edge reported to the host
#[derive(Debug, Clone, PartialEq)]
pub enum SubjectEvent {
    /// Subject went from visible to hidden
    Hidden { subject: String, zero_segments: usize },
    /// Subject went from hidden to visible
    Shown { subject: String, zero_segments: usize },
}

/// Callback function type for visibility events
pub type EventCallback = Box<dyn Fn(SubjectEvent) + Send>;

/// Host-side skeleton the pipeline drives.
///
/// The host owns the hierarchy walk. During `traverse` it calls `resolve`
/// once per bone below (and including) `root`, parents before children,
/// passing the bone name and its parent's name. A `Some` pose is applied to
/// the bone; `None` leaves the bone where it was.
pub trait SkeletonSink {
    fn traverse(&mut self, root: &str, resolve: &mut dyn FnMut(&str, Option<&str>) -> Option<Pose>);

    /// Subject became hidden
    fn on_hiding(&mut self, _event: &SubjectEvent) {}

    /// Subject became visible
    fn on_showing(&mut self, _event: &SubjectEvent) {}
}

/// Minimal in-memory bone hierarchy.
///
/// Useful for hosts without a scene graph of their own and for replaying
/// captures offline; keeps the last pose applied to each bone.
#[derive(Default)]
pub struct BoneTree {
    children: HashMap<String, Vec<String>>,
    parents: HashMap<String, String>,
    poses: HashMap<String, Pose>,
    event_callbacks: Vec<EventCallback>,
    hidden: bool,
}

impl BoneTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `bone` below `parent` (or as a root when `parent` is `None`).
    ///
    /// Re-adding a bone under a new parent moves it. Edges that would put a
    /// bone below itself are ignored.
    pub fn add_bone(&mut self, bone: &str, parent: Option<&str>) -> &mut Self {
        self.children.entry(bone.to_string()).or_default();
        let Some(parent) = parent else {
            return self;
        };
        if self.parent(bone) == Some(parent) {
            return self;
        }
        if self.is_ancestor(bone, parent) {
            warn!(bone, parent, "ignoring bone edge that would form a cycle");
            return self;
        }

        if let Some(previous) = self.parents.insert(bone.to_string(), parent.to_string()) {
            if let Some(siblings) = self.children.get_mut(&previous) {
                siblings.retain(|child| child != bone);
            }
        }
        self.children
            .entry(parent.to_string())
            .or_default()
            .push(bone.to_string());
        self
    }

    /// True when `ancestor` is `bone` or lies on the path from `bone` to its root
    fn is_ancestor(&self, ancestor: &str, bone: &str) -> bool {
        let mut current = Some(bone);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.parent(name);
        }
        false
    }

    /// Build a tree from `(bone, parent)` rows
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        let mut tree = Self::new();
        for (bone, parent) in edges {
            tree.add_bone(bone, parent);
        }
        tree
    }

    /// Register a callback for visibility events
    pub fn on_event(&mut self, callback: EventCallback) {
        self.event_callbacks.push(callback);
    }

    pub fn pose(&self, bone: &str) -> Option<&Pose> {
        self.poses.get(bone)
    }

    pub fn parent(&self, bone: &str) -> Option<&str> {
        self.parents.get(bone).map(String::as_str)
    }

    pub fn contains(&self, bone: &str) -> bool {
        self.children.contains_key(bone)
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn visit(&mut self, bone: &str, resolve: &mut dyn FnMut(&str, Option<&str>) -> Option<Pose>) {
        let parent = self.parents.get(bone).cloned();
        if let Some(pose) = resolve(bone, parent.as_deref()) {
            self.poses.insert(bone.to_string(), pose);
        }
        let children = self.children.get(bone).cloned().unwrap_or_default();
        for child in children {
            self.visit(&child, resolve);
        }
    }

    fn emit(&self, event: &SubjectEvent) {
        for callback in &self.event_callbacks {
            callback(event.clone());
        }
    }
}

impl SkeletonSink for BoneTree {
    fn traverse(&mut self, root: &str, resolve: &mut dyn FnMut(&str, Option<&str>) -> Option<Pose>) {
        if self.contains(root) {
            self.visit(root, resolve);
        }
    }

    fn on_hiding(&mut self, event: &SubjectEvent) {
        self.hidden = true;
        self.emit(event);
    }

    fn on_showing(&mut self, event: &SubjectEvent) {
        self.hidden = false;
        self.emit(event);
    }
}

impl std::fmt::Debug for BoneTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoneTree")
            .field("bones", &self.children.len())
            .field("posed", &self.poses.len())
            .field("hidden", &self.hidden)
            .finish()
    }
}
