//! Proptest strategies for handler graphs.

use proptest::prelude::*;

/// Acyclic dependency lists: entry `i` only names handlers with a lower index.
pub fn dependency_dag_strategy(max_handlers: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_handlers).prop_flat_map(|count| {
        (0..count)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i.min(3)).boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

/// A dependency ring over `2..=max_len` handlers; every member waits on the next.
pub fn cycle_length_strategy(max_len: usize) -> impl Strategy<Value = usize> {
    2..=max_len
}

/// Interleaved register (`true`) and unregister (`false`) operations
pub fn registry_ops_strategy() -> impl Strategy<Value = Vec<bool>> {
    proptest::collection::vec(any::<bool>(), 1..64)
}
