use std::path::{Path, PathBuf};

/// Application directory name used under the platform config/data roots.
pub const APP_DIR: &str = "radio-gaga";

/// Default audio backend.  ffplay ships with every FFmpeg build.
pub const DEFAULT_PLAYER: &str = "ffplay";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/radio-gaga/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// Platform config directory:
/// - Linux: `$XDG_CONFIG_HOME/radio-gaga` or `~/.config/radio-gaga`
/// - macOS: `~/Library/Application Support/radio-gaga`
/// - Windows: `%APPDATA%/radio-gaga`
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return PathBuf::from(xdg).join(APP_DIR);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(not(target_os = "linux"))]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

#[cfg(unix)]
fn exe_names(name: &str) -> Vec<String> {
    vec![name.to_string()]
}

#[cfg(windows)]
fn exe_names(name: &str) -> Vec<String> {
    if name.to_ascii_lowercase().ends_with(".exe") {
        vec![name.to_string()]
    } else {
        vec![format!("{}.exe", name), name.to_string()]
    }
}

fn find_beside_exe(names: &[String]) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    for name in names {
        let p = dir.join(name);
        if p.is_file() {
            return Some(p);
        }
        let p = dir.join("external").join(name);
        if p.is_file() {
            return Some(p);
        }
    }
    None
}

fn find_on_path(names: &[String]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        for name in names {
            let p = dir.join(name);
            if p.is_file() {
                return Some(p);
            }
        }
    }
    None
}

/// Resolve the player binary.
///
/// A configured value containing a path separator is taken literally (it must
/// exist).  A bare name is searched beside the current exe, then on `PATH`.
pub fn find_player_binary(configured: Option<&str>) -> Option<PathBuf> {
    let wanted = configured.unwrap_or(DEFAULT_PLAYER);
    let as_path = Path::new(wanted);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }

    let names = exe_names(wanted);
    find_beside_exe(&names).or_else(|| find_on_path(&names))
}
