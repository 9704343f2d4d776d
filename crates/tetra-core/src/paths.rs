use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "tetracrypt";
pub const APP_NAME: &str = "tetracrypt";
pub const DATA_DIR_ENV: &str = "TETRACRYPT_DATA_DIR";

pub const CONFIG_FILE: &str = "config.json";
pub const VAULT_FILE: &str = "profiles.vault";
pub const AUDIT_FILE: &str = "audit.log";

pub fn data_dir() -> std::io::Result<PathBuf> {
    if let Ok(override_path) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "cannot determine data directory")
    })?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn config_path() -> std::io::Result<PathBuf> {
    Ok(data_dir()?.join(CONFIG_FILE))
}

pub fn vault_path() -> std::io::Result<PathBuf> {
    Ok(data_dir()?.join(VAULT_FILE))
}

pub fn audit_log_path() -> std::io::Result<PathBuf> {
    Ok(data_dir()?.join(AUDIT_FILE))
}
