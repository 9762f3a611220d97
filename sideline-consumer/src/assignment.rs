//! Static partition sharding across consumer peers.

use sideline_core::PartitionId;

/// Returns the subset of `partitions` owned by `consumer_index` out of
/// `num_consumers` peers.
///
/// The sorted partition list is split into `num_consumers` contiguous
/// ranges of sizes as equal as possible, with the extras going to the
/// lowest-indexed consumers. With 5 partitions and 2 consumers, index 0
/// owns `{0, 1, 2}` and index 1 owns `{3, 4}`.
///
/// This is a pure function; ownership is decided by shard identity alone,
/// with no broker coordination.
///
/// # Panics
/// Panics if `num_consumers` is zero, `consumer_index` is out of range,
/// or `partitions` is not sorted ascending.
#[must_use]
pub fn assign_partitions(
    partitions: &[PartitionId],
    num_consumers: u32,
    consumer_index: u32,
) -> Vec<PartitionId> {
    assert!(num_consumers >= 1, "num_consumers must be positive");
    assert!(
        consumer_index < num_consumers,
        "consumer_index {consumer_index} out of range for {num_consumers} consumers"
    );
    assert!(
        partitions.windows(2).all(|pair| pair[0] < pair[1]),
        "partitions must be sorted ascending without duplicates"
    );

    let base = partitions.len() / num_consumers as usize;
    let extra = partitions.len() % num_consumers as usize;
    let index = consumer_index as usize;

    let start = index * base + index.min(extra);
    let count = base + usize::from(index < extra);

    partitions[start..start + count].to_vec()
}
