//! Confidence levels of neuron ids

use crate::error::{CremiError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Number of levels a fresh [`Confidences`] starts with
pub const DEFAULT_CONFIDENCE_LEVELS: usize = 2;

/// Grouping of neuron ids by confidence level.
///
/// Stored as a flat stream `[level, count, id_1 .. id_count, level, ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confidences {
    num_levels: usize,
    levels: BTreeMap<u64, BTreeSet<u64>>,
}

impl Confidences {
    pub fn new(num_levels: usize) -> Self {
        Self {
            num_levels,
            levels: BTreeMap::new(),
        }
    }

    /// Number of levels; grows to cover every level ids were added to
    pub fn num_levels(&self) -> usize {
        self.num_levels
    }

    pub fn add(&mut self, level: u64, id: u64) {
        self.add_all(level, [id]);
    }

    pub fn add_all(&mut self, level: u64, ids: impl IntoIterator<Item = u64>) {
        self.num_levels = self.num_levels.max((level as usize).saturating_add(1));
        self.levels.entry(level).or_default().extend(ids);
    }

    /// Ids at a level, `None` if nothing was added to it
    pub fn ids(&self, level: u64) -> Option<&BTreeSet<u64>> {
        self.levels.get(&level)
    }

    /// Levels that hold ids, ascending, with their ids
    pub fn levels(&self) -> impl Iterator<Item = (u64, &BTreeSet<u64>)> {
        self.levels.iter().map(|(&level, ids)| (level, ids))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Parse a flat `[level, count, ids...]*` stream
    pub fn from_stream(stream: &[u64]) -> Result<Self> {
        let mut confidences = Self::default();
        let mut i = 0;
        while i < stream.len() {
            let level = stream[i];
            let count = *stream.get(i + 1).ok_or_else(|| {
                CremiError::InvalidFormat(format!("confidence level {} has no id count", level))
            })? as usize;
            let start = i + 2;
            let end = start.checked_add(count).unwrap_or(usize::MAX);
            let ids = stream.get(start..end).ok_or_else(|| {
                CremiError::InvalidFormat(format!(
                    "confidence level {} announces {} ids, stream has {}",
                    level,
                    count,
                    stream.len() - start
                ))
            })?;
            confidences.add_all(level, ids.iter().copied());
            i = end;
        }
        Ok(confidences)
    }

    /// Encode as a flat stream, levels ascending, ids ascending
    pub fn to_stream(&self) -> Vec<u64> {
        let mut stream = Vec::new();
        for (&level, ids) in &self.levels {
            stream.push(level);
            stream.push(ids.len() as u64);
            stream.extend(ids.iter().copied());
        }
        stream
    }
}

impl Default for Confidences {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_LEVELS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream() {
        let confidences = Confidences::from_stream(&[0, 2, 17, 4, 1, 1, 9, 0, 1, 3]).unwrap();
        assert_eq!(
            confidences.ids(0).unwrap(),
            &BTreeSet::from([3, 4, 17])
        );
        assert_eq!(confidences.ids(1).unwrap(), &BTreeSet::from([9]));
        assert_eq!(confidences.ids(2), None);
        assert_eq!(confidences.num_levels(), 2);
    }

    #[test]
    fn test_empty_level_and_stream() {
        assert!(Confidences::from_stream(&[]).unwrap().is_empty());

        let confidences = Confidences::from_stream(&[3, 0]).unwrap();
        assert!(confidences.ids(3).unwrap().is_empty());
        assert_eq!(confidences.num_levels(), 4);
    }

    #[test]
    fn test_truncated_stream() {
        assert!(matches!(
            Confidences::from_stream(&[1]),
            Err(CremiError::InvalidFormat(_))
        ));
        assert!(matches!(
            Confidences::from_stream(&[1, 3, 5, 6]),
            Err(CremiError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_stream_encoding() {
        let mut confidences = Confidences::default();
        confidences.add_all(1, [8, 2]);
        confidences.add(0, 5);
        assert_eq!(confidences.to_stream(), vec![0, 1, 5, 1, 2, 2, 8]);
        assert_eq!(
            Confidences::from_stream(&confidences.to_stream()).unwrap(),
            confidences
        );
    }
}
