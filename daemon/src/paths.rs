/// Canonical location of the ReLinked VR settings file on Windows.
///
/// The file lives under %LOCALAPPDATA%\ReLinked VR\:
///   - RLVRSettings.json  Written by the settings UI, read once by the daemon.
use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR_NAME: &str = "ReLinked VR";
pub const SETTINGS_FILE_NAME: &str = "RLVRSettings.json";

/// Returns the ReLinked VR data directory: %LOCALAPPDATA%\ReLinked VR\
pub fn app_data_dir() -> Result<PathBuf> {
    let local_appdata = std::env::var_os("LOCALAPPDATA")
        .context("LOCALAPPDATA environment variable not set")?;
    Ok(PathBuf::from(local_appdata).join(APP_DIR_NAME))
}

/// Returns the full path to the settings file: %LOCALAPPDATA%\ReLinked VR\RLVRSettings.json
pub fn settings_file_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(SETTINGS_FILE_NAME))
}
