use std::{
    env,
    path::{Path, PathBuf},
};

// Linux: /home/<user>/.config/lnswap/
// Windows: C:\Users\<user>\AppData\Roaming\lnswap\config\
// OSX: /Users/<user>/Library/Application Support/lnswap/
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lnswap")
        .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    config_dir()
        .map(|dir| Path::join(&dir, "lnswap.toml"))
        .ok_or_else(|| anyhow::anyhow!("Could not generate default configuration path"))
}

/// Returns `/Users/[username]/Library/Application Support/Lnd/` for macos.
/// Returns `%LOCALAPPDATA%/Lnd for windows.
/// Returns `~/.lnd` if $HOME exists for linux.
fn lnd_default_dir() -> Option<PathBuf> {
    if cfg!(target_os = "macos") || cfg!(target_os = "windows") {
        directories::ProjectDirs::from("", "", "Lnd")
            .map(|proj_dirs| proj_dirs.data_dir().to_path_buf())
    } else if cfg!(target_os = "linux") {
        directories::UserDirs::new().map(|d| d.home_dir().to_path_buf().join(".lnd"))
    } else {
        None
    }
}

/// Returns the directory used by lnd, `$LND_DIR` takes precedence.
pub fn lnd_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var("LND_DIR") {
        return Some(PathBuf::from(dir));
    }
    lnd_default_dir()
}
