use crate::report::{Report, REPORT_KEYS};
use prometheus::core::Collector;
use prometheus::{opts, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub hwprobe_metric_present: GaugeVec,
    pub hwprobe_report_keys: Gauge,
    pub hwprobe_disk_paths_requested: Gauge,
    pub hwprobe_disk_paths_reported: Gauge,
    pub hwprobe_probe_duration_seconds: Gauge,
    pub hwprobe_last_probe_timestamp_seconds: Gauge,
    pub hwprobe_publish_success: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let hwprobe_metric_present = GaugeVec::new(
            opts!(
                "hwprobe_metric_present",
                "1 when the metric family made it into the last report, 0 otherwise"
            ),
            &["metric"],
        )?;
        let hwprobe_report_keys = Gauge::with_opts(opts!(
            "hwprobe_report_keys",
            "Number of keys in the last report"
        ))?;
        let hwprobe_disk_paths_requested = Gauge::with_opts(opts!(
            "hwprobe_disk_paths_requested",
            "Number of disk paths requested by configuration"
        ))?;
        let hwprobe_disk_paths_reported = Gauge::with_opts(opts!(
            "hwprobe_disk_paths_reported",
            "Number of disk paths with usage in the last report"
        ))?;
        let hwprobe_probe_duration_seconds = Gauge::with_opts(opts!(
            "hwprobe_probe_duration_seconds",
            "Wall time spent collecting the last report"
        ))?;
        let hwprobe_last_probe_timestamp_seconds = Gauge::with_opts(opts!(
            "hwprobe_last_probe_timestamp_seconds",
            "Unix time of the last probe"
        ))?;
        let hwprobe_publish_success = Gauge::with_opts(opts!(
            "hwprobe_publish_success",
            "1 when the last report reached the broker"
        ))?;

        register(&registry, &hwprobe_metric_present)?;
        register(&registry, &hwprobe_report_keys)?;
        register(&registry, &hwprobe_disk_paths_requested)?;
        register(&registry, &hwprobe_disk_paths_reported)?;
        register(&registry, &hwprobe_probe_duration_seconds)?;
        register(&registry, &hwprobe_last_probe_timestamp_seconds)?;
        register(&registry, &hwprobe_publish_success)?;

        Ok(Self {
            registry,
            hwprobe_metric_present,
            hwprobe_report_keys,
            hwprobe_disk_paths_requested,
            hwprobe_disk_paths_reported,
            hwprobe_probe_duration_seconds,
            hwprobe_last_probe_timestamp_seconds,
            hwprobe_publish_success,
        })
    }

    pub fn update_from_report(&self, report: &Report, disk_paths_requested: usize, took: Duration) {
        let present = report.present_keys();
        for key in REPORT_KEYS {
            let value = if present.contains(&key) { 1.0 } else { 0.0 };
            self.hwprobe_metric_present
                .with_label_values(&[key])
                .set(value);
        }
        self.hwprobe_report_keys.set(present.len() as f64);
        self.hwprobe_disk_paths_requested
            .set(disk_paths_requested as f64);
        self.hwprobe_disk_paths_reported
            .set(report.disk.as_ref().map_or(0, |d| d.len()) as f64);
        self.hwprobe_probe_duration_seconds.set(took.as_secs_f64());
        self.hwprobe_last_probe_timestamp_seconds
            .set(now_unix() as f64);
    }

    pub fn set_publish_success(&self, success: bool) {
        self.hwprobe_publish_success
            .set(if success { 1.0 } else { 0.0 });
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }

    /// Writes next to the target and renames, so the collector never reads a
    /// half-written file.
    pub fn write_textfile(&self, path: &Path) -> io::Result<()> {
        let body = self
            .encode_metrics()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
