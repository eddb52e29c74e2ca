/// Workloads the `memtier` binary can run against a cache built from the effective config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sequential fill of `count` string values of `value_len` bytes each, cost = length.
    Bench { count: usize, value_len: usize },
    /// `threads` workers each doing `ops` mixed upsert/get/remove calls over `keys` shared keys.
    Stress { threads: usize, ops: usize, keys: usize },
    /// Print the effective configuration.
    Config,
}
