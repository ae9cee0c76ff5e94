//! Properties of the shard plan

use paginated_fetcher::pagination::calculate_shards;
use proptest::prelude::*;

proptest! {
    #[test]
    fn shards_partition_the_remaining_range(
        page_size in 1usize..50,
        first_fraction in 0usize..=100,
        total in 0usize..2_000,
    ) {
        let first = (page_size * first_fraction / 100).min(total);
        let shards = calculate_shards(first, total, page_size);

        let mut cursor = first;
        for (i, shard) in shards.iter().enumerate() {
            prop_assert_eq!(shard.start_index, cursor);
            prop_assert_eq!(shard.shard_index, i + 2);
            prop_assert!(shard.page_size >= 1);
            prop_assert!(shard.page_size <= page_size);
            cursor = shard.end();
        }
        prop_assert_eq!(cursor, total);
        prop_assert_eq!(shards.len(), (total - first).div_ceil(page_size));
    }

    #[test]
    fn only_last_shard_may_be_short(
        page_size in 1usize..50,
        total in 1usize..2_000,
    ) {
        let first = page_size.min(total);
        let shards = calculate_shards(first, total, page_size);

        if let Some((_, full)) = shards.split_last() {
            prop_assert!(full.iter().all(|shard| shard.page_size == page_size));
        }
    }

    #[test]
    fn covered_total_needs_no_shards(
        page_size in 1usize..50,
        total in 0usize..50,
    ) {
        prop_assume!(total <= page_size);
        prop_assert!(calculate_shards(total, total, page_size).is_empty());
    }
}

#[test]
fn zero_page_size_plans_nothing() {
    assert!(calculate_shards(0, 100, 0).is_empty());
}

#[test]
fn first_page_larger_than_total_plans_nothing() {
    assert!(calculate_shards(10, 4, 10).is_empty());
}
