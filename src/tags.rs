//! Tag registry: tag name -> set of entity ids, one registry per axis.
//!
//! The reserved tags `all` and `end` are never stored here; the table
//! computes them from its current extent.

use std::collections::HashMap;

// member sets are plain id sets
use roaring::RoaringTreemap;

use crate::construct::{EntityId, NameHasher};
use crate::error::{Result, TableError};

pub const ALL: &str = "all";
pub const END: &str = "end";

pub fn is_reserved(name: &str) -> bool {
    name == ALL || name == END
}

/// Rejects names that could be confused with another kind of specifier.
pub fn validate_tag_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "tag names can't be empty"
    } else if is_reserved(name) {
        "\"all\" and \"end\" are reserved"
    } else if name.starts_with('-') {
        "tag names can't start with a dash"
    } else if name.starts_with(|c: char| c.is_ascii_digit()) || name.parse::<i64>().is_ok() {
        "tag names can't look like an index"
    } else {
        return Ok(());
    };
    Err(TableError::BadTagName {
        name: name.to_string(),
        reason,
    })
}

#[derive(Debug, Default)]
pub struct TagRegistry {
    tags: HashMap<String, RoaringTreemap, NameHasher>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    /// Declares an empty tag unless it already exists.
    pub fn add_tag(&mut self, name: &str) -> Result<()> {
        validate_tag_name(name)?;
        self.tags.entry(name.to_string()).or_default();
        Ok(())
    }
    pub fn tag_entity(&mut self, name: &str, entity: EntityId) -> Result<()> {
        validate_tag_name(name)?;
        self.tags.entry(name.to_string()).or_default().insert(entity);
        Ok(())
    }
    pub fn untag_entity(&mut self, name: &str, entity: EntityId) {
        if let Some(members) = self.tags.get_mut(name) {
            members.remove(entity);
        }
    }
    pub fn forget_tag(&mut self, name: &str) {
        self.tags.remove(name);
    }
    /// `None` when the tag was never declared.
    pub fn entities(&self, name: &str) -> Option<&RoaringTreemap> {
        self.tags.get(name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }
    pub fn has_tag(&self, name: &str, entity: EntityId) -> bool {
        self.tags.get(name).is_some_and(|m| m.contains(entity))
    }
    pub fn purge_entity(&mut self, entity: EntityId) {
        for members in self.tags.values_mut() {
            members.remove(entity);
        }
    }
    pub fn tags_of(&self, entity: EntityId) -> Vec<String> {
        let mut tags: Vec<String> = self
            .tags
            .iter()
            .filter(|(_, members)| members.contains(entity))
            .map(|(name, _)| name.clone())
            .collect();
        tags.sort_unstable();
        tags
    }
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tags.keys().cloned().collect();
        names.sort_unstable();
        names
    }
    pub fn len(&self) -> usize {
        self.tags.len()
    }
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
