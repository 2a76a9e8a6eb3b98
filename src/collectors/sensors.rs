use crate::collectors::non_empty;
use crate::report::{FanReading, TempReading};
use std::collections::BTreeMap;
#[cfg(target_os = "linux")]
use std::path::Path;
use sysinfo::System;
#[cfg(not(target_os = "linux"))]
use sysinfo::{ComponentExt, SystemExt};
use tracing::debug;

#[cfg(target_os = "linux")]
const HWMON_ROOT: &str = "/sys/class/hwmon";
#[cfg(target_os = "linux")]
const THERMAL_ROOT: &str = "/sys/class/thermal";

#[cfg(target_os = "linux")]
pub fn temperature_sensors(_system: &mut System) -> Option<BTreeMap<String, Vec<TempReading>>> {
    let hwmon = linux::hwmon_temperatures(Path::new(HWMON_ROOT));
    if !hwmon.is_empty() {
        return Some(hwmon);
    }
    let zones = linux::thermal_zone_temperatures(Path::new(THERMAL_ROOT));
    debug!(zones = zones.len(), "no hwmon temperatures, using thermal zones");
    non_empty(zones)
}

#[cfg(not(target_os = "linux"))]
pub fn temperature_sensors(system: &mut System) -> Option<BTreeMap<String, Vec<TempReading>>> {
    system.refresh_components_list();
    let mut groups: BTreeMap<String, Vec<TempReading>> = BTreeMap::new();
    for component in system.components() {
        let current = component.temperature() as f64;
        if !current.is_finite() || current <= 0.0 {
            continue;
        }
        let (group, label) = split_component_label(component.label());
        let (high, critical) = fill_thresholds(None, component.critical().map(|v| v as f64));
        groups.entry(group).or_default().push(TempReading {
            label,
            current,
            high,
            critical,
        });
    }
    non_empty(groups)
}

#[cfg(target_os = "linux")]
pub fn fan_sensors() -> Option<BTreeMap<String, Vec<FanReading>>> {
    non_empty(linux::hwmon_fans(Path::new(HWMON_ROOT)))
}

#[cfg(not(target_os = "linux"))]
pub fn fan_sensors() -> Option<BTreeMap<String, Vec<FanReading>>> {
    debug!("fan sensors not supported on this platform");
    None
}

pub fn fill_thresholds(high: Option<f64>, critical: Option<f64>) -> (Option<f64>, Option<f64>) {
    match (high, critical) {
        (Some(h), None) => (Some(h), Some(h)),
        (None, Some(c)) => (Some(c), Some(c)),
        other => other,
    }
}

#[cfg_attr(target_os = "linux", allow(dead_code))]
pub fn split_component_label(label: &str) -> (String, String) {
    let label = label.trim();
    match label.split_once(char::is_whitespace) {
        Some((group, rest)) => (group.to_string(), rest.trim().to_string()),
        None => (label.to_string(), String::new()),
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::fill_thresholds;
    use crate::report::{FanReading, TempReading};
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};

    pub fn hwmon_temperatures(root: &Path) -> BTreeMap<String, Vec<TempReading>> {
        let mut groups: BTreeMap<String, Vec<TempReading>> = BTreeMap::new();
        for chip in chip_dirs(root) {
            let name = chip_name(&chip);
            for (dir, prefix) in channels(&chip, "temp") {
                let Some(current) = read_milli(&dir.join(format!("{prefix}_input"))) else {
                    continue;
                };
                let (high, critical) = fill_thresholds(
                    read_milli(&dir.join(format!("{prefix}_max"))),
                    read_milli(&dir.join(format!("{prefix}_crit"))),
                );
                groups.entry(name.clone()).or_default().push(TempReading {
                    label: read_trimmed(&dir.join(format!("{prefix}_label"))).unwrap_or_default(),
                    current,
                    high,
                    critical,
                });
            }
        }
        groups
    }

    pub fn hwmon_fans(root: &Path) -> BTreeMap<String, Vec<FanReading>> {
        let mut groups: BTreeMap<String, Vec<FanReading>> = BTreeMap::new();
        for chip in chip_dirs(root) {
            let name = chip_name(&chip);
            for (dir, prefix) in channels(&chip, "fan") {
                let Some(current) = read_trimmed(&dir.join(format!("{prefix}_input")))
                    .and_then(|raw| raw.parse::<f64>().ok())
                else {
                    continue;
                };
                groups.entry(name.clone()).or_default().push(FanReading {
                    label: read_trimmed(&dir.join(format!("{prefix}_label"))).unwrap_or_default(),
                    current,
                });
            }
        }
        groups
    }

    pub fn thermal_zone_temperatures(root: &Path) -> BTreeMap<String, Vec<TempReading>> {
        let Ok(entries) = fs::read_dir(root) else {
            return BTreeMap::new();
        };
        let mut zones: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|v| v.to_str())
                    .is_some_and(|n| n.starts_with("thermal_zone"))
            })
            .collect();
        zones.sort();

        let mut groups: BTreeMap<String, Vec<TempReading>> = BTreeMap::new();
        for zone in zones {
            let Some(current) = read_milli(&zone.join("temp")) else {
                continue;
            };
            if current <= 0.0 {
                continue;
            }
            let name = read_trimmed(&zone.join("type")).unwrap_or_else(|| {
                zone.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            });
            let (high, critical) = trip_points(&zone);
            let (high, critical) = fill_thresholds(high, critical);
            groups.entry(name).or_default().push(TempReading {
                label: String::new(),
                current,
                high,
                critical,
            });
        }
        groups
    }

    fn trip_points(zone: &Path) -> (Option<f64>, Option<f64>) {
        let mut high = None;
        let mut critical = None;
        for index in 0.. {
            let Some(kind) = read_trimmed(&zone.join(format!("trip_point_{index}_type"))) else {
                break;
            };
            let temp = read_milli(&zone.join(format!("trip_point_{index}_temp")));
            match kind.as_str() {
                "critical" => critical = critical.or(temp),
                "high" | "hot" => high = high.or(temp),
                _ => {}
            }
        }
        (high, critical)
    }

    fn chip_dirs(root: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(root) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        dirs.sort();
        dirs
    }

    fn chip_name(chip: &Path) -> String {
        read_trimmed(&chip.join("name"))
            .or_else(|| read_trimmed(&chip.join("device").join("name")))
            .unwrap_or_else(|| {
                chip.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            })
    }

    fn channels(chip: &Path, kind: &str) -> Vec<(PathBuf, String)> {
        let mut found = Vec::new();
        for dir in [chip.to_path_buf(), chip.join("device")] {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                let Some(name) = file_name.to_str() else {
                    continue;
                };
                let Some(prefix) = name.strip_suffix("_input") else {
                    continue;
                };
                let Some(index) = prefix
                    .strip_prefix(kind)
                    .and_then(|n| n.parse::<u32>().ok())
                else {
                    continue;
                };
                found.push((index, dir.clone(), prefix.to_string()));
            }
            if !found.is_empty() {
                break;
            }
        }
        found.sort_by_key(|(index, _, _)| *index);
        found
            .into_iter()
            .map(|(_, dir, prefix)| (dir, prefix))
            .collect()
    }

    fn read_trimmed(path: &Path) -> Option<String> {
        let raw = fs::read_to_string(path).ok()?;
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn read_milli(path: &Path) -> Option<f64> {
        let value = read_trimmed(path)?.parse::<f64>().ok()?;
        Some(value / 1000.0)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_mirror_each_other() {
        assert_eq!(fill_thresholds(None, None), (None, None));
        assert_eq!(fill_thresholds(Some(80.0), None), (Some(80.0), Some(80.0)));
        assert_eq!(fill_thresholds(None, Some(95.0)), (Some(95.0), Some(95.0)));
        assert_eq!(
            fill_thresholds(Some(80.0), Some(95.0)),
            (Some(80.0), Some(95.0))
        );
    }

    #[test]
    fn component_labels_split_into_group() {
        assert_eq!(
            split_component_label("coretemp Package id 0"),
            ("coretemp".to_string(), "Package id 0".to_string())
        );
        assert_eq!(
            split_component_label("acpitz"),
            ("acpitz".to_string(), String::new())
        );
    }
}
