use crate::collectors::{round_to, sensors, SystemSnapshot};
use crate::platform::OsFamily;
use crate::report::{DiskUsage, LoadAverage, MemoryStat, SwapStat};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
#[cfg(not(unix))]
use sysinfo::DiskExt;
use sysinfo::{System, SystemExt};
use tracing::debug;

/// Reads every in-process metric. Blocking; run it off the async executor.
pub fn collect_system(family: OsFamily, disk_paths: &[String]) -> SystemSnapshot {
    let mut system = System::new();
    system.refresh_memory();
    #[cfg(not(unix))]
    {
        system.refresh_disks_list();
        system.refresh_disks();
    }

    let (load, users_processes) = if family.is_unix_like() {
        system.refresh_processes();
        (Some(load_average(&system)), active_processes(&system))
    } else {
        (None, None)
    };

    let ram = memory(&system);
    let swap = Some(swap(&system));
    let disk = Some(disk_usages(disk_paths, &system));
    let uptime = uptime(&system);
    let temp_sensors = sensors::temperature_sensors(&mut system);
    let fan_sensors = sensors::fan_sensors();

    SystemSnapshot {
        load,
        users_processes,
        ram,
        disk,
        swap,
        uptime,
        temp_sensors,
        fan_sensors,
    }
}

fn load_average(system: &System) -> LoadAverage {
    let avg = system.load_average();
    load_from_triple(avg.one, avg.five, avg.fifteen)
}

pub fn load_from_triple(one: f64, five: f64, fifteen: f64) -> LoadAverage {
    LoadAverage {
        one: round_to(one, 2),
        five: round_to(five, 2),
        fifteen: round_to(fifteen, 2),
    }
}

fn active_processes(system: &System) -> Option<u64> {
    let own = sysinfo::get_current_pid().ok();
    let count = system
        .processes()
        .keys()
        .filter(|pid| Some(**pid) != own)
        .count() as u64;
    if count == 0 {
        debug!("process table is empty");
        return None;
    }
    Some(count)
}

fn memory(system: &System) -> Option<MemoryStat> {
    memory_from(
        system.total_memory(),
        system.available_memory(),
        system.used_memory(),
        system.free_memory(),
    )
}

pub fn memory_from(total: u64, available: u64, used: u64, free: u64) -> Option<MemoryStat> {
    if total == 0 {
        debug!("memory statistics unavailable");
        return None;
    }
    let percent = round_to(
        total.saturating_sub(available) as f64 / total as f64 * 100.0,
        1,
    );
    Some(MemoryStat {
        total,
        available,
        percent,
        used,
        free,
    })
}

fn swap(system: &System) -> SwapStat {
    swap_from(system.total_swap(), system.used_swap(), system.free_swap())
}

pub fn swap_from(total: u64, used: u64, free: u64) -> SwapStat {
    let percent = if total > 0 {
        round_to(used as f64 / total as f64 * 100.0, 1)
    } else {
        0.0
    };
    SwapStat {
        total,
        used,
        free,
        percent,
    }
}

fn uptime(system: &System) -> Option<u64> {
    let boot = system.boot_time();
    if boot == 0 {
        debug!("boot time unavailable");
        return None;
    }
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(now.saturating_sub(boot))
}

pub fn disk_usages(paths: &[String], system: &System) -> BTreeMap<String, DiskUsage> {
    let mut out = BTreeMap::new();
    for path in paths {
        match disk_usage(path, system) {
            Some(usage) => {
                out.insert(path.clone(), usage);
            }
            None => debug!(path = %path, "disk usage unavailable"),
        }
    }
    out
}

#[cfg(unix)]
fn disk_usage(path: &str, _system: &System) -> Option<DiskUsage> {
    let stat = match nix::sys::statvfs::statvfs(path) {
        Ok(stat) => stat,
        Err(err) => {
            debug!(path = %path, error = %err, "statvfs failed");
            return None;
        }
    };
    let frsize = stat.fragment_size() as u64;
    let blocks = stat.blocks() as u64;
    let total = blocks * frsize;
    let used = blocks.saturating_sub(stat.blocks_free() as u64) * frsize;
    let free = stat.blocks_available() as u64 * frsize;
    Some(disk_usage_from(total, used, free))
}

#[cfg(not(unix))]
fn disk_usage(path: &str, system: &System) -> Option<DiskUsage> {
    let target = match std::fs::canonicalize(path) {
        Ok(target) => target,
        Err(err) => {
            debug!(path = %path, error = %err, "cannot resolve path");
            return None;
        }
    };
    let disk = system
        .disks()
        .iter()
        .filter(|d| target.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())?;
    let total = disk.total_space();
    let free = disk.available_space();
    Some(disk_usage_from(total, total.saturating_sub(free), free))
}

/// `percent` is relative to the space usable by unprivileged users, so
/// reserved blocks do not count as free.
pub fn disk_usage_from(total: u64, used: u64, free: u64) -> DiskUsage {
    let usable = used + free;
    let percent = if usable > 0 {
        round_to(used as f64 / usable as f64 * 100.0, 1)
    } else {
        0.0
    };
    DiskUsage {
        total,
        used,
        free,
        percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_triple_keeps_fifteen_minute_value_as_third() {
        let load = load_from_triple(0.10, 0.25, 0.40);
        assert_eq!(
            load,
            LoadAverage {
                one: 0.1,
                five: 0.25,
                fifteen: 0.4,
            }
        );
        let value = serde_json::to_value(load).unwrap();
        assert_eq!(value, serde_json::json!({"1m": 0.1, "5m": 0.25, "10m": 0.4}));
    }

    #[test]
    fn load_is_rounded_to_two_places() {
        let load = load_from_triple(1.23456, 0.006, 12.3449);
        assert_eq!(load.one, 1.23);
        assert_eq!(load.five, 0.01);
        assert_eq!(load.fifteen, 12.34);
    }

    #[test]
    fn memory_percent_uses_available() {
        let stat = memory_from(8_000, 2_000, 5_000, 1_000).unwrap();
        assert_eq!(stat.percent, 75.0);
        assert_eq!(stat.used, 5_000);
        assert!(memory_from(0, 0, 0, 0).is_none());
    }

    #[test]
    fn swap_without_device_is_zero_percent() {
        let stat = swap_from(0, 0, 0);
        assert_eq!(stat.percent, 0.0);
        assert_eq!(swap_from(4_000, 1_000, 3_000).percent, 25.0);
    }

    #[test]
    fn disk_percent_ignores_reserved_blocks() {
        let usage = disk_usage_from(1_000, 450, 500);
        assert_eq!(usage.percent, 47.4);
        assert!(usage.used + usage.free <= usage.total);
        assert_eq!(disk_usage_from(0, 0, 0).percent, 0.0);
    }

    #[test]
    fn invalid_path_only_drops_itself() {
        let system = System::new();
        let paths = vec![
            ".".to_string(),
            "/nonexistent/hwprobe/path".to_string(),
        ];
        let usages = disk_usages(&paths, &system);
        assert!(!usages.contains_key("/nonexistent/hwprobe/path"));
        #[cfg(unix)]
        assert!(usages.contains_key("."));
    }

    #[cfg(unix)]
    #[test]
    fn root_usage_is_consistent() {
        let system = System::new();
        let usages = disk_usages(&["/".to_string()], &system);
        let root = usages["/"];
        assert!(root.total > 0);
        assert!(root.used + root.free <= root.total);
        assert!((0.0..=100.0).contains(&root.percent));
    }

    #[test]
    fn snapshot_always_has_core_metrics() {
        let snapshot = collect_system(OsFamily::Other, &[]);
        assert!(snapshot.ram.is_some());
        assert!(snapshot.swap.is_some());
        assert!(snapshot.uptime.is_some());
        assert_eq!(snapshot.disk, Some(BTreeMap::new()));
        assert!(snapshot.load.is_none());
        assert!(snapshot.users_processes.is_none());
    }
}
