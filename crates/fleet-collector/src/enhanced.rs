//! Enhanced monitoring (host telemetry) sample decoding.
//!
//! A sample is one JSON document as published by the database host's
//! monitoring agent. Memory and filesystem sizes arrive in KiB, device
//! throughput in KB/s and latencies in milliseconds; exported gauges use
//! bytes and seconds.

use serde::Deserialize;

use fleet_metrics::Metric;

use crate::descs::*;

/// Device name reported for the Aurora shared storage volume.
const AURORA_DEVICE: &str = "aurora-data";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OsMetrics {
    #[serde(rename = "numVCPUs")]
    num_vcpus: u32,
    cpu_utilization: CpuUtilization,
    memory: Memory,
    #[serde(rename = "physicalDeviceIO")]
    physical_device_io: Vec<PhysicalDeviceIo>,
    #[serde(rename = "diskIO")]
    disk_io: Vec<AuroraDiskIo>,
    file_sys: Vec<FileSys>,
    network: Vec<NetInterface>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CpuUtilization {
    guest: f64,
    irq: f64,
    system: f64,
    wait: f64,
    user: f64,
    steal: f64,
    nice: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Memory {
    total: i64,
    cached: i64,
    free: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PhysicalDeviceIo {
    device: String,
    #[serde(rename = "readIOsPS")]
    read_ios_ps: f64,
    #[serde(rename = "writeIOsPS")]
    write_ios_ps: f64,
    #[serde(rename = "readKbPS")]
    read_kb_ps: f64,
    #[serde(rename = "writeKbPS")]
    write_kb_ps: f64,
    /// Milliseconds.
    #[serde(rename = "await")]
    await_ms: f64,
    util: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AuroraDiskIo {
    device: String,
    read_latency: Option<f64>,
    write_latency: Option<f64>,
    #[serde(rename = "readIOsPS")]
    read_ios_ps: Option<f64>,
    #[serde(rename = "writeIOsPS")]
    write_ios_ps: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FileSys {
    mount_point: String,
    total: i64,
    used: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NetInterface {
    interface: String,
    rx: f64,
    tx: f64,
}

/// Decode one sample into host gauges.
pub fn decode_sample(payload: &str) -> Result<Vec<Metric>, serde_json::Error> {
    let m: OsMetrics = serde_json::from_str(payload)?;
    let mut out = Vec::new();

    out.push(RDS_CPU_CORES.sample(f64::from(m.num_vcpus), &[]));
    let cpu = &m.cpu_utilization;
    for (mode, value) in [
        ("guest", cpu.guest),
        ("irq", cpu.irq),
        ("nice", cpu.nice),
        ("steal", cpu.steal),
        ("system", cpu.system),
        ("user", cpu.user),
        ("wait", cpu.wait),
    ] {
        out.push(RDS_CPU_USAGE.sample(value, &[mode]));
    }

    out.push(RDS_MEM_TOTAL.sample(kib(m.memory.total), &[]));
    out.push(RDS_MEM_CACHED.sample(kib(m.memory.cached), &[]));
    out.push(RDS_MEM_FREE.sample(kib(m.memory.free), &[]));

    for io in &m.physical_device_io {
        let dev = io.device.as_str();
        out.push(RDS_IO_OPS.sample(io.read_ios_ps, &[dev, "read"]));
        out.push(RDS_IO_OPS.sample(io.write_ios_ps, &[dev, "write"]));
        out.push(RDS_IO_BYTES.sample(io.read_kb_ps * 1000.0, &[dev, "read"]));
        out.push(RDS_IO_BYTES.sample(io.write_kb_ps * 1000.0, &[dev, "write"]));
        out.push(RDS_IO_AWAIT.sample(io.await_ms / 1000.0, &[dev]));
        out.push(RDS_IO_UTIL.sample(io.util, &[dev]));
    }

    // Only the unnamed entry is the shared storage volume.
    for io in m.disk_io.iter().filter(|io| io.device.is_empty()) {
        if let (Some(r), Some(w)) = (io.read_ios_ps, io.write_ios_ps) {
            out.push(RDS_IO_OPS.sample(r, &[AURORA_DEVICE, "read"]));
            out.push(RDS_IO_OPS.sample(w, &[AURORA_DEVICE, "write"]));
        }
        if let (Some(r), Some(w)) = (io.read_latency, io.write_latency) {
            out.push(RDS_IO_LATENCY.sample(r / 1000.0, &[AURORA_DEVICE, "read"]));
            out.push(RDS_IO_LATENCY.sample(w / 1000.0, &[AURORA_DEVICE, "write"]));
        }
    }

    for fs in &m.file_sys {
        out.push(RDS_FS_TOTAL.sample(kib(fs.total), &[&fs.mount_point]));
        out.push(RDS_FS_USED.sample(kib(fs.used), &[&fs.mount_point]));
    }
    for iface in &m.network {
        out.push(RDS_NET_RX.sample(iface.rx, &[&iface.interface]));
        out.push(RDS_NET_TX.sample(iface.tx, &[&iface.interface]));
    }

    Ok(out)
}

fn kib(v: i64) -> f64 {
    (v * 1000) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "engine": "POSTGRES",
        "numVCPUs": 2,
        "cpuUtilization": {"guest": 0, "irq": 0.01, "system": 1.5, "wait": 0.2, "idle": 95, "user": 3.1, "steal": 0.1, "nice": 0, "total": 5},
        "memory": {"total": 4000000, "cached": 1500000, "free": 500000, "active": 1},
        "physicalDeviceIO": [
            {"device": "nvme1n1", "readIOsPS": 10, "writeIOsPS": 20, "readKbPS": 4, "writeKbPS": 8, "await": 2.5, "util": 1.2}
        ],
        "diskIO": [
            {"device": "", "readLatency": 1.5, "writeLatency": 3, "readIOsPS": 100, "writeIOsPS": 200},
            {"device": "rdsdev", "readLatency": 9, "writeLatency": 9, "readIOsPS": 9, "writeIOsPS": 9}
        ],
        "fileSys": [{"mountPoint": "/rdsdbdata", "total": 100, "used": 40, "name": "rdsfilesys"}],
        "network": [{"interface": "eth0", "rx": 1024.5, "tx": 2048}]
    }"#;

    fn find<'a>(metrics: &'a [Metric], name: &str, labels: &[(&str, &str)]) -> Option<&'a Metric> {
        metrics
            .iter()
            .find(|m| m.name == name && labels.iter().all(|(k, v)| m.label(k) == Some(*v)))
    }

    #[test]
    fn decodes_and_converts_units() {
        let metrics = decode_sample(SAMPLE).unwrap();

        assert_eq!(find(&metrics, "aws_rds_cpu_cores", &[]).unwrap().value, 2.0);
        assert_eq!(
            find(&metrics, "aws_rds_cpu_usage_percent", &[("mode", "user")]).unwrap().value,
            3.1
        );
        assert_eq!(
            find(&metrics, "aws_rds_memory_total_bytes", &[]).unwrap().value,
            4_000_000_000.0
        );
        assert_eq!(
            find(&metrics, "aws_rds_io_bytes_per_second", &[("device", "nvme1n1"), ("operation", "write")])
                .unwrap()
                .value,
            8000.0
        );
        assert_eq!(
            find(&metrics, "aws_rds_io_await_seconds", &[("device", "nvme1n1")]).unwrap().value,
            0.0025
        );
        assert_eq!(
            find(&metrics, "aws_rds_fs_used_bytes", &[("mount_point", "/rdsdbdata")]).unwrap().value,
            40_000.0
        );
        assert_eq!(
            find(&metrics, "aws_rds_net_tx_bytes_per_second", &[("interface", "eth0")]).unwrap().value,
            2048.0
        );
    }

    #[test]
    fn aurora_volume_is_reported_as_named_device() {
        let metrics = decode_sample(SAMPLE).unwrap();
        assert_eq!(
            find(&metrics, "aws_rds_io_latency_seconds", &[("device", "aurora-data"), ("operation", "write")])
                .unwrap()
                .value,
            0.003
        );
        assert_eq!(
            find(&metrics, "aws_rds_io_ops_per_second", &[("device", "aurora-data"), ("operation", "read")])
                .unwrap()
                .value,
            100.0
        );
        assert!(metrics.iter().all(|m| m.label("device") != Some("rdsdev")));
    }

    #[test]
    fn device_throughput_reads_kbps_fields() {
        let payload = r#"{"physicalDeviceIO": [{"device": "d", "readKbPS": 4, "writeKbPS": 8}]}"#;
        let metrics = decode_sample(payload).unwrap();
        let bytes = |op| {
            find(&metrics, "aws_rds_io_bytes_per_second", &[("device", "d"), ("operation", op)])
                .unwrap()
                .value
        };
        assert_eq!(bytes("read"), 4000.0);
        assert_eq!(bytes("write"), 8000.0);
    }

    #[test]
    fn aurora_volume_needs_both_directions() {
        let payload = r#"{"diskIO": [{"device": "", "readLatency": 1.0, "readIOsPS": 5}]}"#;
        let metrics = decode_sample(payload).unwrap();
        assert!(metrics.iter().all(|m| m.label("device") != Some("aurora-data")));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(decode_sample("{not json").is_err());
        assert!(decode_sample(r#"{"numVCPUs": "two"}"#).is_err());
    }
}
