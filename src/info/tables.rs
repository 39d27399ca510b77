use std::collections::BTreeMap;
use std::sync::LazyLock;

/// INFO field -> (metric name, description), exported as gauges.
pub static GAUGE_METRICS: LazyLock<BTreeMap<&'static str, (&'static str, &'static str)>> =
    LazyLock::new(|| {
        let mut m = BTreeMap::new();

        // # Server
        m.insert(
            "uptime_in_seconds",
            (
                "uptime_in_seconds",
                "Number of seconds since Kvrocks server start",
            ),
        );
        m.insert("process_id", ("process_id", "PID of the server process"));

        // # Clients
        m.insert(
            "connected_clients",
            (
                "connected_clients",
                "Number of client connections (excluding connections from replicas)",
            ),
        );
        m.insert(
            "blocked_clients",
            (
                "blocked_clients",
                "Number of clients pending on a blocking call",
            ),
        );
        m.insert(
            "monitor_clients",
            ("monitor_clients", "Number of clients in monitor mode"),
        );

        // # Memory
        m.insert(
            "used_memory",
            (
                "memory_used_bytes",
                "Total number of bytes allocated by Kvrocks",
            ),
        );
        m.insert(
            "used_memory_rss",
            (
                "memory_used_rss_bytes",
                "Number of bytes that Kvrocks allocated as seen by the operating system (a.k.a resident set size)",
            ),
        );
        m.insert(
            "used_memory_lua",
            (
                "memory_used_lua_bytes",
                "Number of bytes used by the Lua engine",
            ),
        );

        // # Persistence
        m.insert(
            "loading",
            ("loading", "Flag indicating if the load of a dump file is on-going"),
        );

        // # Stats
        m.insert(
            "pubsub_channels",
            (
                "pubsub_channels",
                "Global number of pub/sub channels with client subscriptions",
            ),
        );
        m.insert(
            "pubsub_patterns",
            (
                "pubsub_patterns",
                "Global number of pub/sub pattern with client subscriptions",
            ),
        );
        m.insert(
            "keyspace_hits",
            (
                "keyspace_hits",
                "Number of successful lookup of keys in the main dictionary",
            ),
        );
        m.insert(
            "keyspace_misses",
            (
                "keyspace_misses",
                "Number of failed lookup of keys in the main dictionary",
            ),
        );

        // # Replication
        m.insert(
            "connected_slaves",
            ("connected_slaves", "Number of connected replicas"),
        );
        m.insert(
            "master_repl_offset",
            (
                "master_repl_offset",
                "The server's current replication offset",
            ),
        );
        m.insert(
            "sync_full",
            (
                "replica_resyncs_full",
                "The number of full resyncs with replicas",
            ),
        );
        m.insert(
            "sync_partial_ok",
            (
                "replica_partial_resync_accepted",
                "The number of accepted partial resync requests",
            ),
        );
        m.insert(
            "sync_partial_err",
            (
                "replica_partial_resync_denied",
                "The number of denied partial resync requests",
            ),
        );

        // # Keyspace
        m.insert(
            "sequence",
            ("sequence", "The latest sequence number of the storage"),
        );
        m.insert(
            "used_db_size",
            ("used_db_size", "The size of the database in bytes"),
        );
        m.insert(
            "max_db_size",
            (
                "max_db_size",
                "The max size of the database in bytes, 0 means unlimited",
            ),
        );
        m.insert(
            "disk_capacity",
            ("disk_capacity_bytes", "The capacity of the data disk"),
        );
        m.insert(
            "used_disk_size",
            ("used_disk_size", "The used size of the data disk"),
        );

        // # RocksDB
        m.insert(
            "all_mem_tables",
            (
                "all_mem_tables",
                "Approximate size of active, unflushed immutable and pinned immutable memtables in bytes",
            ),
        );
        m.insert(
            "cur_mem_tables",
            (
                "cur_mem_tables",
                "Approximate size of active and unflushed immutable memtables in bytes",
            ),
        );
        m.insert(
            "snapshots",
            ("snapshots", "Number of unreleased snapshots of the database"),
        );
        m.insert(
            "num_immutable_tables",
            (
                "num_immutable_tables",
                "Number of immutable memtables that have not yet been flushed",
            ),
        );
        m.insert(
            "num_running_flushes",
            ("num_running_flushes", "Number of currently running flushes"),
        );
        m.insert(
            "memtable_flush_pending",
            (
                "memtable_flush_pending",
                "1 if a memtable flush is pending, otherwise 0",
            ),
        );
        m.insert(
            "compaction_pending",
            (
                "compaction_pending",
                "1 if at least one compaction is pending, otherwise 0",
            ),
        );
        m.insert(
            "num_running_compactions",
            (
                "num_running_compactions",
                "Number of currently running compactions",
            ),
        );
        m.insert(
            "num_live_versions",
            (
                "num_live_versions",
                "Number of live versions, more live versions often mean more SST files are held from being deleted",
            ),
        );
        m.insert(
            "num_superversion",
            ("num_superversion", "Number of super versions"),
        );
        m.insert(
            "num_background_errors",
            (
                "num_background_errors",
                "Accumulated number of background errors",
            ),
        );
        m.insert(
            "flush_count",
            ("flush_count", "Number of memtable flushes"),
        );
        m.insert(
            "compaction_count",
            ("compaction_count", "Number of compactions"),
        );
        m.insert(
            "instantaneous_ops_per_sec",
            (
                "instantaneous_ops_per_sec",
                "Number of commands processed per second",
            ),
        );
        m.insert(
            "is_bgsaving",
            ("is_bgsaving", "Flag indicating if a bgsave is on-going"),
        );
        m.insert(
            "is_compacting",
            (
                "is_compacting",
                "Flag indicating if a manual compaction is on-going",
            ),
        );
        m.insert("put_per_sec", ("put_per_sec", "Number of puts per second"));
        m.insert("get_per_sec", ("get_per_sec", "Number of gets per second"));
        m.insert(
            "seek_per_sec",
            ("seek_per_sec", "Number of seeks per second"),
        );
        m.insert(
            "next_per_sec",
            ("next_per_sec", "Number of iterator nexts per second"),
        );
        m.insert(
            "prev_per_sec",
            ("prev_per_sec", "Number of iterator prevs per second"),
        );

        m
    });

/// Host level gauges, only exported when system metrics are enabled.
pub static SYSTEM_METRICS: LazyLock<BTreeMap<&'static str, (&'static str, &'static str)>> =
    LazyLock::new(|| {
        let mut m = BTreeMap::new();

        m.insert(
            "total_system_memory",
            (
                "total_system_memory_bytes",
                "The total amount of memory that the Kvrocks host has",
            ),
        );

        m
    });

/// INFO field -> (metric name, description), exported as counters.
pub static COUNTER_METRICS: LazyLock<BTreeMap<&'static str, (&'static str, &'static str)>> =
    LazyLock::new(|| {
        let mut m = BTreeMap::new();

        m.insert(
            "total_connections_received",
            (
                "connections_received_total",
                "Total number of connections accepted by the server",
            ),
        );
        m.insert(
            "total_commands_processed",
            (
                "commands_processed_total",
                "Total number of commands processed by the server",
            ),
        );
        m.insert(
            "rejected_connections",
            (
                "rejected_connections_total",
                "Number of connections rejected because of maxclients limit",
            ),
        );
        m.insert(
            "total_net_input_bytes",
            (
                "net_input_bytes_total",
                "The total number of bytes read from the network",
            ),
        );
        m.insert(
            "total_net_output_bytes",
            (
                "net_output_bytes_total",
                "The total number of bytes written to the network",
            ),
        );
        m.insert(
            "used_cpu_sys",
            (
                "cpu_sys_seconds_total",
                "System CPU consumed by the Kvrocks server in seconds",
            ),
        );
        m.insert(
            "used_cpu_user",
            (
                "cpu_user_seconds_total",
                "User CPU consumed by the Kvrocks server in seconds",
            ),
        );

        m
    });

/// Per column family RocksDB fields, formatted like `estimate_keys[default]:0`,
/// with their descriptions.
pub const ROCKSDB_FAMILIES: [(&str, &str); 10] = [
    (
        "block_cache_usage",
        "The number of bytes used by the data block cache",
    ),
    (
        "block_cache_pinned_usage",
        "The number of bytes used by the pinned block cache",
    ),
    (
        "index_and_filter_cache_usage",
        "The number of bytes used by the index and filter block cache",
    ),
    ("estimate_keys", "The estimate keys"),
    (
        "level0_file_limit_slowdown",
        "Number of times writes were slowed down by too many level0 files",
    ),
    (
        "level0_file_limit_stop",
        "Number of times writes were stopped by too many level0 files",
    ),
    (
        "pending_compaction_bytes_slowdown",
        "Number of times writes were slowed down by too many pending compaction bytes",
    ),
    (
        "pending_compaction_bytes_stop",
        "Number of times writes were stopped by too many pending compaction bytes",
    ),
    (
        "memtable_count_limit_slowdown",
        "Number of times writes were slowed down by too many memtables",
    ),
    (
        "memtable_count_limit_stop",
        "Number of times writes were stopped by too many memtables",
    ),
];

/// Fields whose values label `instance_info`, as (label, field).
pub const INSTANCE_INFO_FIELDS: [(&str, &str); 7] = [
    ("role", "role"),
    ("version", "kvrocks_version"),
    ("git_sha1", "kvrocks_git_sha1"),
    ("os", "os"),
    ("tcp_port", "tcp_port"),
    ("gcc_version", "gcc_version"),
    ("process_id", "process_id"),
];

/// Fields whose values label `slave_info`, as (label, field).
pub const SLAVE_INFO_FIELDS: [(&str, &str); 3] = [
    ("master_host", "master_host"),
    ("master_port", "master_port"),
    ("read_only", "slave_read_only"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_field_is_both_gauge_and_counter() {
        for key in GAUGE_METRICS.keys().chain(SYSTEM_METRICS.keys()) {
            assert!(!COUNTER_METRICS.contains_key(key), "{key}");
        }
    }

    #[test]
    fn counters_end_with_total() {
        for (name, _desc) in COUNTER_METRICS.values() {
            assert!(name.ends_with("_total"), "{name}");
        }
    }
}
