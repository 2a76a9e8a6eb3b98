pub mod command;
pub mod os;
pub mod sensors;
pub mod system;

use crate::report::{DiskUsage, FanReading, LoadAverage, MemoryStat, SwapStat, TempReading};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    pub load: Option<LoadAverage>,
    pub users_processes: Option<u64>,
    pub ram: Option<MemoryStat>,
    pub disk: Option<BTreeMap<String, DiskUsage>>,
    pub swap: Option<SwapStat>,
    pub uptime: Option<u64>,
    pub temp_sensors: Option<BTreeMap<String, Vec<TempReading>>>,
    pub fan_sensors: Option<BTreeMap<String, Vec<FanReading>>>,
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

pub fn parse_decimal(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    let value = match trimmed.parse::<f64>() {
        Ok(v) => v,
        Err(_) => trimmed.replace(',', ".").parse::<f64>().ok()?,
    };
    value.is_finite().then_some(value)
}

pub(crate) fn non_empty<K, V>(map: BTreeMap<K, V>) -> Option<BTreeMap<K, V>> {
    (!map.is_empty()).then_some(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to(0.125, 2), 0.13);
        assert_eq!(round_to(3.14159, 2), 3.14);
        assert_eq!(round_to(42.06, 1), 42.1);
        assert_eq!(round_to(0.4, 2), 0.4);
    }

    #[test]
    fn decimal_accepts_comma() {
        assert_eq!(parse_decimal(" 96.96 "), Some(96.96));
        assert_eq!(parse_decimal("96,96"), Some(96.96));
        assert_eq!(parse_decimal("%idle"), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal(""), None);
    }
}
