//! Point annotations with comments and pre/post-synaptic partner links

use crate::error::{CremiError, Result};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Annotation type of a presynaptic site
pub const PRESYNAPTIC_SITE: &str = "presynaptic_site";

/// Annotation type of a postsynaptic site
pub const POSTSYNAPTIC_SITE: &str = "postsynaptic_site";

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    kind: String,
    location: [f64; 3],
}

/// Borrowed view of one annotation, handed to sort keys and iterators
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationView<'a> {
    pub id: u64,
    pub kind: &'a str,
    /// Location in world units, relative to the set's offset
    pub location: [f64; 3],
    /// Comment, empty if the annotation has none
    pub comment: &'a str,
}

/// An ordered collection of point annotations.
///
/// Annotations keep their insertion order, which is also the order they are
/// serialized in. Comments and partner links may only reference ids that
/// have been added before.
///
/// ```
/// use cremi::AnnotationSet;
///
/// let mut annotations = AnnotationSet::new();
/// annotations.add_annotation(1, "presynaptic_site", [10.0, 20.0, 30.0]);
/// annotations.add_annotation(2, "postsynaptic_site", [15.0, 20.0, 30.0]);
/// annotations.set_pre_post_partners(1, 2).unwrap();
/// annotations.add_comment(1, "near vesicle cluster").unwrap();
///
/// assert_eq!(annotations.ids(), &[1, 2]);
/// assert!(annotations.add_comment(3, "unknown").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationSet {
    ids: Vec<u64>,
    entries: HashMap<u64, Entry>,
    comments: HashMap<u64, String>,
    pre_post_partners: Vec<(u64, u64)>,
    offset: [f64; 3],
}

impl AnnotationSet {
    /// Create an empty set with zero offset
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set with the given offset
    pub fn with_offset(offset: [f64; 3]) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    pub fn offset(&self) -> [f64; 3] {
        self.offset
    }

    pub fn set_offset(&mut self, offset: [f64; 3]) {
        self.offset = offset;
    }

    /// Add an annotation.
    ///
    /// `kind` is usually [`PRESYNAPTIC_SITE`] or [`POSTSYNAPTIC_SITE`];
    /// `location` is relative to the offset. Adding an id again replaces its
    /// type and location but also appends the id to the order a second time.
    pub fn add_annotation(&mut self, id: u64, kind: impl Into<String>, location: [f64; 3]) {
        self.ids.push(id);
        self.entries.insert(
            id,
            Entry {
                kind: kind.into(),
                location,
            },
        );
    }

    /// Set or replace the comment of an existing annotation
    pub fn add_comment(&mut self, id: u64, comment: impl Into<String>) -> Result<()> {
        self.check(id)?;
        self.comments.insert(id, comment.into());
        Ok(())
    }

    /// Mark two existing annotations as pre- and post-synaptic partners
    pub fn set_pre_post_partners(&mut self, pre_id: u64, post_id: u64) -> Result<()> {
        self.check(pre_id)?;
        self.check(post_id)?;
        self.pre_post_partners.push((pre_id, post_id));
        Ok(())
    }

    /// Ids of all annotations, in order
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Types of all annotations, aligned with [`ids`](Self::ids)
    pub fn types(&self) -> Vec<&str> {
        self.ids
            .iter()
            .map(|id| self.entries[id].kind.as_str())
            .collect()
    }

    /// Locations of all annotations, aligned with [`ids`](Self::ids)
    pub fn locations(&self) -> Vec<[f64; 3]> {
        self.ids.iter().map(|id| self.entries[id].location).collect()
    }

    /// Type and location of an annotation
    pub fn get_annotation(&self, id: u64) -> Result<(&str, [f64; 3])> {
        let entry = self
            .entries
            .get(&id)
            .ok_or(CremiError::AnnotationNotFound(id))?;
        Ok((&entry.kind, entry.location))
    }

    pub fn comment(&self, id: u64) -> Option<&str> {
        self.comments.get(&id).map(String::as_str)
    }

    pub fn comments(&self) -> &HashMap<u64, String> {
        &self.comments
    }

    pub fn pre_post_partners(&self) -> &[(u64, u64)] {
        &self.pre_post_partners
    }

    /// Number of entries in the id order
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Iterate over the annotations in order
    pub fn iter(&self) -> impl Iterator<Item = AnnotationView<'_>> + '_ {
        self.ids.iter().map(move |&id| self.view(id))
    }

    /// Sort by id in place
    pub fn sort(&mut self, reverse: bool) {
        self.sort_by_key(|a| a.id, reverse);
    }

    /// Sorted copy by id; `self` is left untouched
    pub fn sorted(&self, reverse: bool) -> Self {
        self.sorted_by_key(|a| a.id, reverse)
    }

    /// Sort in place by a key computed once per annotation.
    ///
    /// The sort is stable. With `reverse`, keys are ordered descending while
    /// annotations with equal keys keep their relative order.
    pub fn sort_by_key<K, F>(&mut self, mut key_fn: F, reverse: bool)
    where
        K: Ord,
        F: FnMut(&AnnotationView<'_>) -> K,
    {
        let mut keyed: Vec<(K, u64)> = self
            .ids
            .iter()
            .map(|&id| (key_fn(&self.view(id)), id))
            .collect();
        if reverse {
            keyed.sort_by(|a, b| b.0.cmp(&a.0));
        } else {
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
        }
        self.ids = keyed.into_iter().map(|(_, id)| id).collect();
    }

    /// Sorted copy by a key; `self` is left untouched
    pub fn sorted_by_key<K, F>(&self, key_fn: F, reverse: bool) -> Self
    where
        K: Ord,
        F: FnMut(&AnnotationView<'_>) -> K,
    {
        let mut clone = self.clone();
        clone.sort_by_key(key_fn, reverse);
        clone
    }

    /// Sort in place with a comparator, e.g. for float keys via `total_cmp`
    pub fn sort_by<F>(&mut self, mut compare: F, reverse: bool)
    where
        F: FnMut(&AnnotationView<'_>, &AnnotationView<'_>) -> Ordering,
    {
        let mut ids = std::mem::take(&mut self.ids);
        ids.sort_by(|&a, &b| {
            let ordering = compare(&self.view(a), &self.view(b));
            if reverse {
                ordering.reverse()
            } else {
                ordering
            }
        });
        self.ids = ids;
    }

    /// Sorted copy with a comparator; `self` is left untouched
    pub fn sorted_by<F>(&self, compare: F, reverse: bool) -> Self
    where
        F: FnMut(&AnnotationView<'_>, &AnnotationView<'_>) -> Ordering,
    {
        let mut clone = self.clone();
        clone.sort_by(compare, reverse);
        clone
    }

    fn view(&self, id: u64) -> AnnotationView<'_> {
        let entry = &self.entries[&id];
        AnnotationView {
            id,
            kind: &entry.kind,
            location: entry.location,
            comment: self.comment(id).unwrap_or(""),
        }
    }

    fn check(&self, id: u64) -> Result<()> {
        if self.entries.contains_key(&id) {
            Ok(())
        } else {
            Err(CremiError::AnnotationNotFound(id))
        }
    }
}
