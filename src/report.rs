use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_yes_no"
    )]
    pub reboot_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates: Option<PendingUpdates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadAverage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users_processes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpi_cpu_tmp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram: Option<MemoryStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<BTreeMap<String, DiskUsage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap: Option<SwapStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_sensors: Option<BTreeMap<String, Vec<TempReading>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_sensors: Option<BTreeMap<String, Vec<FanReading>>>,
}

pub const REPORT_KEYS: [&str; 13] = [
    "cpu_usage",
    "reboot_required",
    "updates",
    "load",
    "users_processes",
    "rpi_cpu_tmp",
    "ram",
    "disk",
    "swap",
    "uptime",
    "users",
    "temp_sensors",
    "fan_sensors",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingUpdates {
    pub security_packages: String,
    pub packages_updates: String,
}

/// The third value is the OS 15-minute average; subscribers know it as `10m`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadAverage {
    #[serde(rename = "1m")]
    pub one: f64,
    #[serde(rename = "5m")]
    pub five: f64,
    #[serde(rename = "10m")]
    pub fifteen: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryStat {
    pub total: u64,
    pub available: u64,
    pub percent: f64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwapStat {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempReading {
    pub label: String,
    pub current: f64,
    pub high: Option<f64>,
    pub critical: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanReading {
    pub label: String,
    pub current: f64,
}

impl Report {
    pub fn present_keys(&self) -> Vec<&'static str> {
        let flags = [
            self.cpu_usage.is_some(),
            self.reboot_required.is_some(),
            self.updates.is_some(),
            self.load.is_some(),
            self.users_processes.is_some(),
            self.rpi_cpu_tmp.is_some(),
            self.ram.is_some(),
            self.disk.is_some(),
            self.swap.is_some(),
            self.uptime.is_some(),
            self.users.is_some(),
            self.temp_sensors.is_some(),
            self.fan_sensors.is_some(),
        ];
        REPORT_KEYS
            .iter()
            .zip(flags)
            .filter_map(|(key, present)| present.then_some(*key))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn serialize_yes_no<S: Serializer>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(true) => serializer.serialize_str("Yes"),
        Some(false) => serializer.serialize_str("No"),
        None => serializer.serialize_none(),
    }
}
