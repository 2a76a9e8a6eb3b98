use std::fs;
use std::path::Path;
use tracing::debug;

const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";
const VIDEOCORE_DEVICE: &str = "/dev/vchiq";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Darwin,
    Other,
}

impl OsFamily {
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    pub fn from_os_name(name: &str) -> Self {
        match name {
            "linux" => Self::Linux,
            "macos" | "darwin" => Self::Darwin,
            _ => Self::Other,
        }
    }

    pub fn is_unix_like(self) -> bool {
        matches!(self, Self::Linux | Self::Darwin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub family: OsFamily,
    pub is_embedded_board: bool,
}

impl Platform {
    pub fn classify(embedded_board: bool) -> Self {
        Self {
            family: OsFamily::current(),
            is_embedded_board: embedded_board,
        }
    }
}

pub fn detect_embedded_board() -> bool {
    detect_embedded_board_at(Path::new(DEVICE_TREE_MODEL), Path::new(VIDEOCORE_DEVICE))
}

fn detect_embedded_board_at(model_path: &Path, videocore: &Path) -> bool {
    if let Ok(raw) = fs::read(model_path) {
        let model = String::from_utf8_lossy(&raw);
        let model = model.trim_end_matches('\0').trim();
        debug!(model = %model, "device-tree model");
        if model.contains("Raspberry Pi") {
            return true;
        }
    }
    videocore.exists()
}
