use crate::types::{ChunkIndex, RowIndex, RowIndexed};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk size must be at least 1 (got {0})")]
    InvalidChunkSize(usize),
}

/// Contiguous run of rows. `end_row` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<T> {
    pub index: ChunkIndex,
    pub start_row: RowIndex,
    pub end_row: RowIndex,
    pub rows: Vec<T>,
}

impl<T> Chunk<T> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Same boundaries, different row payload. Stops at the first row `f` rejects.
    pub fn try_map_rows<U, E>(
        &self,
        f: impl FnMut(&T) -> Result<U, E>,
    ) -> Result<Chunk<U>, E> {
        Ok(Chunk {
            index: self.index,
            start_row: self.start_row,
            end_row: self.end_row,
            rows: self.rows.iter().map(f).collect::<Result<_, _>>()?,
        })
    }
}

/// Partition `rows` into groups of `max_size`, keeping order. The last group may be smaller.
pub fn chunk<T: RowIndexed + Clone>(
    rows: &[T],
    max_size: usize,
) -> Result<Vec<Chunk<T>>, ChunkError> {
    if max_size < 1 {
        return Err(ChunkError::InvalidChunkSize(max_size));
    }
    Ok(rows
        .chunks(max_size)
        .enumerate()
        .filter_map(|(index, group)| {
            let first = group.first()?;
            let last = group.last()?;
            Some(Chunk {
                index,
                start_row: first.row_index(),
                end_row: last.row_index(),
                rows: group.to_vec(),
            })
        })
        .collect())
}
