//! Row- and query-granularity partitioning of rows across machines.

use crate::error::LoadError;
use crate::random::Random;

/// Decides, one row at a time, whether a line belongs to this machine.
///
/// The filter must see line indices in a single ascending pass; each
/// decision consumes RNG draws in the same order on every machine, which
/// is what makes the partition consistent under a shared seed.
pub(crate) enum PartitionFilter<'a> {
    /// Sample unit is one row.
    ByRow { rank: usize, num_machines: usize },
    /// Sample unit is a whole query group; the decision made at a group's
    /// first row is carried across the rest of the group.
    ByQuery {
        rank: usize,
        num_machines: usize,
        boundaries: &'a [u32],
        num_queries: usize,
        qid: isize,
        is_query_used: bool,
    },
}

impl<'a> PartitionFilter<'a> {
    pub fn by_row(rank: usize, num_machines: usize) -> Self {
        Self::ByRow { rank, num_machines }
    }

    pub fn by_query(rank: usize, num_machines: usize, boundaries: &'a [u32]) -> Self {
        Self::ByQuery {
            rank,
            num_machines,
            boundaries,
            num_queries: boundaries.len().saturating_sub(1),
            qid: -1,
            is_query_used: false,
        }
    }

    /// Whether `line_idx` stays on this machine.
    pub fn should_keep(&mut self, random: &mut Random, line_idx: usize) -> Result<bool, LoadError> {
        match self {
            Self::ByRow { rank, num_machines } => {
                Ok(random.next_int(0, *num_machines) == *rank)
            }
            Self::ByQuery {
                rank,
                num_machines,
                boundaries,
                num_queries,
                qid,
                is_query_used,
            } => {
                if *qid >= *num_queries as isize {
                    return Err(LoadError::QueryOutOfRange);
                }
                if line_idx >= boundaries[(*qid + 1) as usize] as usize {
                    *is_query_used = random.next_int(0, *num_machines) == *rank;
                    *qid += 1;
                }
                Ok(*is_query_used)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_row_is_deterministic() {
        let mut keep_a = Vec::new();
        let mut rng = Random::new(42);
        let mut filter = PartitionFilter::by_row(1, 3);
        for i in 0..100 {
            if filter.should_keep(&mut rng, i).unwrap() {
                keep_a.push(i);
            }
        }

        let mut keep_b = Vec::new();
        let mut rng = Random::new(42);
        let mut filter = PartitionFilter::by_row(1, 3);
        for i in 0..100 {
            if filter.should_keep(&mut rng, i).unwrap() {
                keep_b.push(i);
            }
        }
        assert_eq!(keep_a, keep_b);
        assert!(!keep_a.is_empty());
        assert!(keep_a.len() < 100);
    }

    #[test]
    fn test_ranks_cover_all_rows_exactly_once() {
        let num_machines = 3;
        let mut seen = vec![0u32; 50];
        for rank in 0..num_machines {
            let mut rng = Random::new(7);
            let mut filter = PartitionFilter::by_row(rank, num_machines);
            for (i, slot) in seen.iter_mut().enumerate() {
                if filter.should_keep(&mut rng, i).unwrap() {
                    *slot += 1;
                }
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_by_query_keeps_whole_groups() {
        // 10 groups of 10 rows.
        let boundaries: Vec<u32> = (0..=10).map(|q| q * 10).collect();
        let mut rng = Random::new(42);
        let mut filter = PartitionFilter::by_query(0, 3, &boundaries);
        let mut kept = Vec::new();
        for i in 0..100 {
            if filter.should_keep(&mut rng, i).unwrap() {
                kept.push(i);
            }
        }
        // Every kept row's whole group must be kept.
        for &row in &kept {
            let group_start = row / 10 * 10;
            for r in group_start..group_start + 10 {
                assert!(kept.contains(&r), "group of row {row} split");
            }
        }
    }

    #[test]
    fn test_by_query_overflow_is_fatal() {
        // Boundaries declare 2 groups over 6 rows; feed 8 rows.
        let boundaries = vec![0u32, 3, 6];
        let mut rng = Random::new(1);
        let mut filter = PartitionFilter::by_query(0, 2, &boundaries);
        let mut result = Ok(false);
        for i in 0..8 {
            result = filter.should_keep(&mut rng, i);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(LoadError::QueryOutOfRange)));
    }
}
