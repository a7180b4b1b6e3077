use formpost_core::{chunk, Chunk, ChunkError, Row};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| Row::new(i, vec![("Name".to_string(), format!("person {i}"))]))
        .collect()
}

#[test]
fn five_rows_by_two_gives_two_two_one() {
    let chunks = chunk(&rows(5), 2).unwrap();

    let sizes: Vec<usize> = chunks.iter().map(Chunk::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    let bounds: Vec<(usize, usize, usize)> = chunks
        .iter()
        .map(|c| (c.index, c.start_row, c.end_row))
        .collect();
    assert_eq!(bounds, vec![(0, 0, 1), (1, 2, 3), (2, 4, 4)]);
}

#[test]
fn zero_chunk_size_is_rejected() {
    assert_eq!(
        chunk(&rows(3), 0).unwrap_err(),
        ChunkError::InvalidChunkSize(0)
    );
}

#[test]
fn empty_dataset_gives_no_chunks() {
    assert!(chunk(&rows(0), 50).unwrap().is_empty());
}

#[test]
fn chunk_bounds_follow_row_indices_not_positions() {
    // A filtered dataset keeps its original indices.
    let filtered: Vec<Row> = rows(10).into_iter().filter(|r| r.index() % 3 == 0).collect();
    let chunks = chunk(&filtered, 2).unwrap();
    assert_eq!(chunks[0].start_row, 0);
    assert_eq!(chunks[0].end_row, 3);
    assert_eq!(chunks[1].start_row, 6);
    assert_eq!(chunks[1].end_row, 9);
}

proptest! {
    #[test]
    fn chunks_partition_row_indices_exactly(count in 0usize..200, size in 1usize..40) {
        let data = rows(count);
        let chunks = chunk(&data, size).unwrap();

        let flattened: Vec<usize> = chunks
            .iter()
            .flat_map(|c| c.rows.iter().map(Row::index))
            .collect();
        prop_assert_eq!(flattened, (0..count).collect::<Vec<_>>());

        for (position, c) in chunks.iter().enumerate() {
            prop_assert_eq!(c.index, position);
            prop_assert!(!c.is_empty());
            prop_assert!(c.len() <= size);
            if position + 1 < chunks.len() {
                prop_assert_eq!(c.len(), size);
            }
        }
    }

    #[test]
    fn chunk_layout_is_deterministic(count in 0usize..120, size in 1usize..20) {
        let data = rows(count);
        prop_assert_eq!(chunk(&data, size).unwrap(), chunk(&data, size).unwrap());
    }
}
