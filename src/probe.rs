use crate::collectors::os;
use crate::collectors::system::collect_system;
use crate::collectors::SystemSnapshot;
use crate::config::{ProbeConfig, ToolsConfig};
use crate::platform::{OsFamily, Platform};
use crate::report::Report;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub tools: ToolsConfig,
    pub command_timeout: Duration,
}

impl From<&ProbeConfig> for ProbeSettings {
    fn from(cfg: &ProbeConfig) -> Self {
        Self {
            tools: cfg.tools.clone(),
            command_timeout: cfg.command_timeout,
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::from(&ProbeConfig::default())
    }
}

pub async fn aggregate(
    disk_paths: &[String],
    embedded_board: bool,
    settings: &ProbeSettings,
) -> Report {
    let platform = Platform::classify(embedded_board);
    aggregate_for(&platform, disk_paths, settings).await
}

pub async fn aggregate_for(
    platform: &Platform,
    disk_paths: &[String],
    settings: &ProbeSettings,
) -> Report {
    let linux = platform.family == OsFamily::Linux;
    let tools = &settings.tools;
    let timeout = settings.command_timeout;

    let (cpu_usage, updates, rpi_cpu_tmp, users, snapshot) = tokio::join!(
        async {
            if linux {
                os::cpu_usage(tools, timeout).await
            } else {
                None
            }
        },
        async {
            if linux {
                os::pending_updates(tools, timeout).await
            } else {
                None
            }
        },
        async {
            if platform.is_embedded_board {
                os::board_cpu_temperature(tools, timeout).await
            } else {
                None
            }
        },
        os::logged_in_users(platform.family, tools, timeout),
        snapshot(platform.family, disk_paths),
    );

    let reboot_required = linux.then(|| os::reboot_required(&tools.reboot_required_file));

    let report = Report {
        cpu_usage,
        reboot_required,
        updates,
        load: snapshot.load,
        users_processes: snapshot.users_processes,
        rpi_cpu_tmp,
        ram: snapshot.ram,
        disk: snapshot.disk,
        swap: snapshot.swap,
        uptime: snapshot.uptime,
        users,
        temp_sensors: snapshot.temp_sensors,
        fan_sensors: snapshot.fan_sensors,
    };
    debug!(
        family = platform.family.as_str(),
        embedded_board = platform.is_embedded_board,
        keys = ?report.present_keys(),
        "probe report assembled"
    );
    report
}

async fn snapshot(family: OsFamily, disk_paths: &[String]) -> SystemSnapshot {
    let paths = disk_paths.to_vec();
    match tokio::task::spawn_blocking(move || collect_system(family, &paths)).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(error = %err, "system snapshot worker failed");
            SystemSnapshot::default()
        }
    }
}
