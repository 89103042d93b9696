//! Exported metric descriptors. Names and labels are a compatibility
//! contract with existing dashboards; do not rename.

use fleet_metrics::Desc;

// ── Database family ────────────────────────────────────────────────

pub const RDS_INFO: Desc = Desc::gauge(
    "aws_rds_info",
    "RDS instance info",
    &[
        "region",
        "availability_zone",
        "endpoint",
        "ipv4",
        "port",
        "engine",
        "engine_version",
        "instance_type",
        "storage_type",
        "secondary_availability_zone",
        "cluster_id",
        "source_instance_id",
    ],
);
pub const RDS_STATUS: Desc = Desc::gauge("aws_rds_status", "Status of the RDS instance", &["status"]);
pub const RDS_ALLOCATED_STORAGE: Desc =
    Desc::gauge("aws_rds_allocated_storage_gibibytes", "Allocated storage size", &[]);
pub const RDS_STORAGE_AUTOSCALING_THRESHOLD: Desc = Desc::gauge(
    "aws_rds_storage_autoscaling_threshold_gibibytes",
    "Storage autoscaling threshold",
    &[],
);
pub const RDS_PROVISIONED_IOPS: Desc =
    Desc::gauge("aws_rds_storage_provisioned_iops", "Number of provisioned IOPs", &[]);
pub const RDS_BACKUP_RETENTION: Desc =
    Desc::gauge("aws_rds_backup_retention_period_days", "Backup retention period", &[]);
pub const RDS_READ_REPLICA_INFO: Desc =
    Desc::gauge("aws_rds_read_replica_info", "Read replica info", &["replica_instance_id"]);

pub const RDS_CPU_CORES: Desc = Desc::gauge("aws_rds_cpu_cores", "The number of virtual CPUs", &[]);
pub const RDS_CPU_USAGE: Desc = Desc::gauge(
    "aws_rds_cpu_usage_percent",
    "The percentage of the CPU spent in each mode",
    &["mode"],
);
pub const RDS_IO_OPS: Desc = Desc::gauge(
    "aws_rds_io_ops_per_second",
    "The number of I/O transactions per second",
    &["device", "operation"],
);
pub const RDS_IO_BYTES: Desc = Desc::gauge(
    "aws_rds_io_bytes_per_second",
    "The number of bytes read or written per second",
    &["device", "operation"],
);
pub const RDS_IO_LATENCY: Desc = Desc::gauge(
    "aws_rds_io_latency_seconds",
    "The average elapsed time between the submission of an I/O request and its completion (Amazon Aurora only)",
    &["device", "operation"],
);
pub const RDS_IO_AWAIT: Desc = Desc::gauge(
    "aws_rds_io_await_seconds",
    "The number of seconds required to respond to requests, including queue time and service time",
    &["device"],
);
pub const RDS_IO_UTIL: Desc = Desc::gauge(
    "aws_rds_io_util_percent",
    "The percentage of CPU time during which requests were issued.",
    &["device"],
);
pub const RDS_FS_TOTAL: Desc = Desc::gauge(
    "aws_rds_fs_total_bytes",
    "The total number of disk space available for the file system",
    &["mount_point"],
);
pub const RDS_FS_USED: Desc = Desc::gauge(
    "aws_rds_fs_used_bytes",
    "The amount of disk space used by files in the file system",
    &["mount_point"],
);
pub const RDS_MEM_TOTAL: Desc = Desc::gauge("aws_rds_memory_total_bytes", "The total amount of memory", &[]);
pub const RDS_MEM_CACHED: Desc =
    Desc::gauge("aws_rds_memory_cached_bytes", "The amount of memory used as page cache", &[]);
pub const RDS_MEM_FREE: Desc = Desc::gauge("aws_rds_memory_free_bytes", "The amount of unassigned memory", &[]);
pub const RDS_NET_RX: Desc = Desc::gauge(
    "aws_rds_net_rx_bytes_per_second",
    "The number of bytes received per second",
    &["interface"],
);
pub const RDS_NET_TX: Desc = Desc::gauge(
    "aws_rds_net_tx_bytes_per_second",
    "The number of bytes transmitted per second",
    &["interface"],
);

pub const RDS_LOG_MESSAGES: Desc = Desc::counter(
    "aws_rds_log_messages_total",
    "Number of messages grouped by the automatically extracted repeated pattern",
    &["level", "pattern_hash", "sample"],
);

// ── Cache family ───────────────────────────────────────────────────

pub const CACHE_INFO: Desc = Desc::gauge(
    "aws_elasticache_info",
    "Elasticache instance info",
    &[
        "region",
        "availability_zone",
        "endpoint",
        "ipv4",
        "port",
        "engine",
        "engine_version",
        "instance_type",
        "cluster_id",
    ],
);
pub const CACHE_STATUS: Desc =
    Desc::gauge("aws_elasticache_status", "Status of the Elasticache instance", &["status"]);

// ── Process ────────────────────────────────────────────────────────

pub const AGENT_INFO: Desc = Desc::gauge("aws_agent_info", "Agent build info", &["version"]);
