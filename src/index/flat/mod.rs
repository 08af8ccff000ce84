#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::IndexError;
use crate::database::LogEntryId;
use crate::embeddings::{EmbeddingVector, dot_product};

/// Whether the index has fixed its vector dimension yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    #[default]
    Unbound,
    Bound { dimension: usize },
}

impl IndexState {
    #[inline]
    pub fn dimension(self) -> Option<usize> {
        match self {
            Self::Unbound => None,
            Self::Bound { dimension } => Some(dimension),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub log_id: LogEntryId,
    pub score: f32,
}

/// Brute-force inner-product index with its position to id map.
///
/// Vectors are stored row-major in one buffer; `ids[i]` owns row `i`, and
/// `positions` is the reverse of `ids`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    state: IndexState,
    data: Vec<f32>,
    ids: Vec<LogEntryId>,
    positions: HashMap<LogEntryId, usize>,
}

impl FlatIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from persisted parts, checking that they agree
    pub fn from_parts(
        state: IndexState,
        data: Vec<f32>,
        ids: Vec<LogEntryId>,
    ) -> Result<Self, IndexError> {
        let dimension = state.dimension().unwrap_or(0);
        let expected = dimension.checked_mul(ids.len()).ok_or_else(|| {
            IndexError::IndexCorrupt(format!(
                "{} ids x {} dimensions overflows the index size",
                ids.len(),
                dimension
            ))
        })?;

        if data.len() != expected {
            return Err(IndexError::IndexCorrupt(format!(
                "index holds {} values, expected {} ids x {} dimensions",
                data.len(),
                ids.len(),
                dimension
            )));
        }
        if state == IndexState::Unbound && !ids.is_empty() {
            return Err(IndexError::IndexCorrupt(format!(
                "{} ids stored without a dimension",
                ids.len()
            )));
        }

        let mut positions = HashMap::with_capacity(ids.len());
        for (position, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), position).is_some() {
                return Err(IndexError::IndexCorrupt(format!(
                    "id {} appears more than once",
                    id
                )));
            }
        }

        Ok(Self {
            state,
            data,
            ids,
            positions,
        })
    }

    #[inline]
    pub fn state(&self) -> IndexState {
        self.state
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.state.dimension()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in position order
    #[inline]
    pub fn ids(&self) -> &[LogEntryId] {
        &self.ids
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn contains(&self, log_id: &str) -> bool {
        self.positions.contains_key(log_id)
    }

    #[inline]
    pub fn position_of(&self, log_id: &str) -> Option<usize> {
        self.positions.get(log_id).copied()
    }

    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let dimension = self.dimension()?;
        let start = position.checked_mul(dimension)?;
        let end = start.checked_add(dimension)?;
        self.data.get(start..end)
    }

    /// Append vectors in order. Every vector is validated before anything is
    /// inserted, so a rejected batch leaves the index untouched. Ids already
    /// present, or repeated within the batch, are skipped.
    ///
    /// Returns the number of vectors appended.
    pub fn add(&mut self, entries: Vec<(LogEntryId, EmbeddingVector)>) -> Result<usize, IndexError> {
        let Some((_, first)) = entries.first() else {
            return Ok(0);
        };

        let dimension = self.dimension().unwrap_or(first.len());
        for (log_id, vector) in &entries {
            validate_vector(log_id, vector, dimension)?;
        }

        let mut seen = HashSet::with_capacity(entries.len());
        let mut added = 0;
        for (log_id, vector) in entries {
            if self.positions.contains_key(&log_id) || !seen.insert(log_id.clone()) {
                continue;
            }
            self.positions.insert(log_id.clone(), self.ids.len());
            self.ids.push(log_id);
            self.data.extend_from_slice(&vector);
            added += 1;
        }

        if added > 0 {
            self.state = IndexState::Bound { dimension };
        }
        Ok(added)
    }

    /// Up to `k` hits ordered by descending inner product. Ties keep
    /// insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let Some(dimension) = self.dimension() else {
            return Ok(Vec::new());
        };
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(dimension)
            .map(|row| dot_product(row, query))
            .enumerate()
            .collect();

        scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| SearchHit {
                log_id: self.ids[position].clone(),
                score,
            })
            .collect())
    }

    /// Drop the vectors of `log_ids`, compacting the remaining positions.
    /// The dimension stays bound. Returns the number removed.
    pub fn remove(&mut self, log_ids: &[LogEntryId]) -> usize {
        let doomed: HashSet<&str> = log_ids
            .iter()
            .map(String::as_str)
            .filter(|id| self.positions.contains_key(*id))
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        let dimension = self.dimension().unwrap_or(0);
        let mut data = Vec::with_capacity(self.data.len());
        let mut ids = Vec::with_capacity(self.ids.len() - doomed.len());
        for (id, row) in self.ids.iter().zip(self.data.chunks_exact(dimension.max(1))) {
            if !doomed.contains(id.as_str()) {
                ids.push(id.clone());
                data.extend_from_slice(row);
            }
        }

        let removed = self.ids.len() - ids.len();
        self.positions = ids
            .iter()
            .enumerate()
            .map(|(position, id)| (id.clone(), position))
            .collect();
        self.ids = ids;
        self.data = data;
        removed
    }
}

fn validate_vector(log_id: &str, vector: &[f32], dimension: usize) -> Result<(), IndexError> {
    if vector.is_empty() {
        return Err(IndexError::InvalidVector(format!(
            "vector for {} is empty",
            log_id
        )));
    }
    if vector.len() != dimension {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(IndexError::InvalidVector(format!(
            "vector for {} contains non-finite values",
            log_id
        )));
    }
    Ok(())
}
