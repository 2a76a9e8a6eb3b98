use crate::collectors::command::run_tool;
use crate::collectors::{parse_decimal, round_to};
use crate::config::ToolsConfig;
use crate::platform::OsFamily;
use crate::report::PendingUpdates;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const UTMP_RECORD_SIZE: usize = 384;
const UTMP_USER_OFFSET: usize = 44;
const UTMP_USER_SIZE: usize = 32;
const UTMP_USER_PROCESS: i16 = 7;

pub async fn cpu_usage(tools: &ToolsConfig, timeout: Duration) -> Option<f64> {
    let stdout = run_tool(&tools.mpstat, &[], timeout).await?;
    let used = parse_mpstat_used(&stdout);
    if used.is_none() {
        debug!(tool = %tools.mpstat, "unrecognised mpstat output");
    }
    used
}

pub fn parse_mpstat_used(stdout: &[u8]) -> Option<f64> {
    let text = String::from_utf8_lossy(stdout);
    let idle = parse_decimal(text.split_whitespace().last()?)?;
    if !(0.0..=100.0).contains(&idle) {
        return None;
    }
    Some(round_to(100.0 - idle, 2))
}

pub fn reboot_required(sentinel: &Path) -> bool {
    sentinel.is_file()
}

pub async fn pending_updates(tools: &ToolsConfig, timeout: Duration) -> Option<PendingUpdates> {
    if !tools.update_notifier_dir.is_dir() {
        debug!(dir = %tools.update_notifier_dir.display(), "update-notifier not installed");
        return None;
    }
    let stdout = run_tool(&tools.apt_check, &["--human-readable"], timeout).await?;
    Some(parse_apt_check(&stdout))
}

/// First line carries the normal update count, second line the security one.
/// A missing or digit-less line means zero.
pub fn parse_apt_check(stdout: &[u8]) -> PendingUpdates {
    let text = String::from_utf8_lossy(stdout);
    let mut lines = text.split('\n');
    let packages_updates = digits_or_zero(lines.next());
    let security_packages = digits_or_zero(lines.next());
    PendingUpdates {
        security_packages,
        packages_updates,
    }
}

fn digits_or_zero(line: Option<&str>) -> String {
    let digits: String = line
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        "0".to_string()
    } else {
        digits
    }
}

pub async fn board_cpu_temperature(tools: &ToolsConfig, timeout: Duration) -> Option<f64> {
    let stdout = run_tool(&tools.vcgencmd, &["measure_temp"], timeout).await?;
    parse_measure_temp(&stdout)
}

pub fn parse_measure_temp(stdout: &[u8]) -> Option<f64> {
    let text = String::from_utf8_lossy(stdout);
    let start = text.find('=')? + 1;
    let end = text.rfind('\'')?;
    if end <= start {
        return None;
    }
    parse_decimal(&text[start..end])
}

pub async fn logged_in_users(
    family: OsFamily,
    tools: &ToolsConfig,
    timeout: Duration,
) -> Option<usize> {
    if family == OsFamily::Linux {
        match fs::read(&tools.utmp) {
            Ok(raw) => return Some(count_distinct_users(parse_utmp_users(&raw))),
            Err(err) if err.kind() == ErrorKind::NotFound => return Some(0),
            Err(err) => {
                debug!(
                    path = %tools.utmp.display(),
                    error = %err,
                    "utmp unreadable, falling back to who"
                );
            }
        }
    }

    let stdout = run_tool(&tools.who, &[], timeout).await?;
    Some(count_distinct_users(parse_who_users(&stdout)))
}

/// Usernames of USER_PROCESS records in a glibc utmp file. A trailing
/// partial record is ignored.
pub fn parse_utmp_users(raw: &[u8]) -> Vec<String> {
    raw.chunks_exact(UTMP_RECORD_SIZE)
        .filter(|record| i16::from_ne_bytes([record[0], record[1]]) == UTMP_USER_PROCESS)
        .filter_map(|record| {
            let field = &record[UTMP_USER_OFFSET..UTMP_USER_OFFSET + UTMP_USER_SIZE];
            let len = field.iter().position(|b| *b == 0).unwrap_or(field.len());
            let name = String::from_utf8_lossy(&field[..len]).trim().to_string();
            (!name.is_empty()).then_some(name)
        })
        .collect()
}

pub fn parse_who_users(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

pub fn count_distinct_users<I, S>(names: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    for name in names {
        seen.insert(name.as_ref().to_string());
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn utmp_record(kind: i16, user: &str) -> Vec<u8> {
        let mut record = vec![0_u8; UTMP_RECORD_SIZE];
        record[..2].copy_from_slice(&kind.to_ne_bytes());
        record[UTMP_USER_OFFSET..UTMP_USER_OFFSET + user.len()].copy_from_slice(user.as_bytes());
        record
    }

    fn tools_in(dir: &Path) -> ToolsConfig {
        ToolsConfig {
            mpstat: dir.join("missing-mpstat").display().to_string(),
            vcgencmd: dir.join("missing-vcgencmd").display().to_string(),
            who: dir.join("missing-who").display().to_string(),
            apt_check: dir.join("missing-apt-check").display().to_string(),
            update_notifier_dir: dir.join("update-notifier"),
            reboot_required_file: dir.join("reboot-required"),
            utmp: dir.join("utmp"),
        }
    }

    #[test]
    fn mpstat_idle_becomes_used_percent() {
        let out = b"Linux 6.1.0 (host) \t10/18/2026 \t_x86_64_\t(8 CPU)\n\n\
12:00:00 PM  CPU    %usr   %nice    %sys %iowait    %irq   %soft  %steal  %guest  %gnice   %idle\n\
12:00:00 PM  all    2.15    0.00    0.80    0.05    0.00    0.04    0.00    0.00    0.00   96.96\n";
        assert_eq!(parse_mpstat_used(out), Some(3.04));
    }

    #[test]
    fn mpstat_accepts_decimal_comma() {
        assert_eq!(parse_mpstat_used(b"all 1,00 0,00 87,5\n"), Some(12.5));
    }

    #[test]
    fn mpstat_garbage_is_absent() {
        assert_eq!(parse_mpstat_used(b""), None);
        assert_eq!(parse_mpstat_used(b"command failed\n"), None);
        assert_eq!(parse_mpstat_used(b"idle 250.0"), None);
    }

    #[test]
    fn apt_check_lines_reduce_to_digits() {
        let updates = parse_apt_check(b"5 updates\n2 security updates\n");
        assert_eq!(updates.packages_updates, "5");
        assert_eq!(updates.security_packages, "2");
    }

    #[test]
    fn apt_check_modern_wording() {
        let out = b"12 updates can be applied immediately.\n\
3 of these updates are standard security updates.\n\
To see these additional updates run: apt list --upgradable\n";
        let updates = parse_apt_check(out);
        assert_eq!(updates.packages_updates, "12");
        assert_eq!(updates.security_packages, "3");
    }

    #[test]
    fn apt_check_up_to_date_host_reports_zero() {
        let updates = parse_apt_check(b"0 updates can be applied immediately.\n");
        assert_eq!(updates.packages_updates, "0");
        assert_eq!(updates.security_packages, "0");
    }

    #[test]
    fn apt_check_without_security_line_reports_zero() {
        let out = b"5 updates can be applied immediately.\n\
To see these additional updates run: apt list --upgradable\n";
        let updates = parse_apt_check(out);
        assert_eq!(updates.packages_updates, "5");
        assert_eq!(updates.security_packages, "0");
    }

    #[test]
    fn apt_check_empty_output_reports_zero() {
        let updates = parse_apt_check(b"");
        assert_eq!(updates.packages_updates, "0");
        assert_eq!(updates.security_packages, "0");
    }

    #[test]
    fn measure_temp_extracts_number() {
        assert_eq!(parse_measure_temp(b"temp=42.9'C\n"), Some(42.9));
        assert_eq!(parse_measure_temp(b"temp=-3.0'C"), Some(-3.0));
    }

    #[test]
    fn measure_temp_malformed_is_absent() {
        assert_eq!(parse_measure_temp(b"error=1 error_msg=\"Command not registered\""), None);
        assert_eq!(parse_measure_temp(b"temp='C"), None);
        assert_eq!(parse_measure_temp(b""), None);
    }

    #[test]
    fn distinct_users_collapse_terminals() {
        assert_eq!(count_distinct_users(["alice", "alice", "bob"]), 2);
        assert_eq!(count_distinct_users(Vec::<String>::new()), 0);
    }

    #[test]
    fn utmp_keeps_only_user_processes() {
        let mut raw = Vec::new();
        raw.extend(utmp_record(UTMP_USER_PROCESS, "alice"));
        raw.extend(utmp_record(UTMP_USER_PROCESS, "alice"));
        raw.extend(utmp_record(2, "reboot"));
        raw.extend(utmp_record(UTMP_USER_PROCESS, "bob"));
        raw.extend(utmp_record(8, "LOGIN"));
        raw.extend([0_u8; 17]);

        let users = parse_utmp_users(&raw);
        assert_eq!(users, vec!["alice", "alice", "bob"]);
        assert_eq!(count_distinct_users(users), 2);
    }

    #[test]
    fn who_output_first_column() {
        let out = b"alice    pts/0        2026-10-18 09:00 (10.0.0.5)\n\
alice    pts/1        2026-10-18 09:05 (10.0.0.5)\n\
bob      tty1         2026-10-18 08:12\n";
        assert_eq!(count_distinct_users(parse_who_users(out)), 2);
    }

    #[test]
    fn reboot_sentinel_must_be_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = dir.path().join("reboot-required");
        assert!(!reboot_required(&sentinel));
        assert!(!reboot_required(dir.path()));
        fs::write(&sentinel, b"*** System restart required ***\n").unwrap();
        assert!(reboot_required(&sentinel));
    }

    #[tokio::test]
    async fn updates_absent_without_notifier_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tools_in(dir.path());
        assert_eq!(pending_updates(&tools, Duration::from_secs(1)).await, None);
    }

    #[tokio::test]
    async fn updates_absent_when_tool_missing() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tools_in(dir.path());
        fs::create_dir(&tools.update_notifier_dir).unwrap();
        assert_eq!(pending_updates(&tools, Duration::from_secs(1)).await, None);
    }

    #[tokio::test]
    async fn missing_tools_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tools_in(dir.path());
        let timeout = Duration::from_secs(1);
        assert_eq!(cpu_usage(&tools, timeout).await, None);
        assert_eq!(board_cpu_temperature(&tools, timeout).await, None);
        assert_eq!(logged_in_users(OsFamily::Darwin, &tools, timeout).await, None);
    }

    #[tokio::test]
    async fn linux_users_read_from_utmp() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tools_in(dir.path());
        let timeout = Duration::from_secs(1);
        assert_eq!(logged_in_users(OsFamily::Linux, &tools, timeout).await, Some(0));

        let mut raw = utmp_record(UTMP_USER_PROCESS, "alice");
        raw.extend(utmp_record(UTMP_USER_PROCESS, "alice"));
        raw.extend(utmp_record(UTMP_USER_PROCESS, "bob"));
        fs::write(&tools.utmp, raw).unwrap();
        assert_eq!(logged_in_users(OsFamily::Linux, &tools, timeout).await, Some(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn apt_check_script_is_parsed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut tools = tools_in(dir.path());
        fs::create_dir(&tools.update_notifier_dir).unwrap();
        let script: PathBuf = tools.update_notifier_dir.join("apt-check");
        fs::write(&script, "#!/bin/sh\nprintf '5 updates\\n2 security updates\\n'\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        tools.apt_check = script.display().to_string();

        let updates = pending_updates(&tools, Duration::from_secs(5)).await.unwrap();
        assert_eq!(updates.packages_updates, "5");
        assert_eq!(updates.security_packages, "2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn updates_present_on_up_to_date_host() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut tools = tools_in(dir.path());
        fs::create_dir(&tools.update_notifier_dir).unwrap();
        let script = tools.update_notifier_dir.join("apt-check");
        fs::write(
            &script,
            "#!/bin/sh\necho '0 updates can be applied immediately.'\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        tools.apt_check = script.display().to_string();

        let updates = pending_updates(&tools, Duration::from_secs(5)).await;
        assert_eq!(
            updates,
            Some(PendingUpdates {
                security_packages: "0".to_string(),
                packages_updates: "0".to_string(),
            })
        );
    }
}
