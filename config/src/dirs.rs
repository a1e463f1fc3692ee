use directories::ProjectDirs;
use std::{
    env,
    path::PathBuf,
};

pub(crate) const PROJECT_NAME: &str = "ZEROTRUST_EXPORTER";

lazy_static::lazy_static! {
    static ref CONFIG_FOLDER: Option<PathBuf> = env::var(format!("{PROJECT_NAME}_CONFIG"))
        .ok()
        .map(PathBuf::from);
}

/// Directory searched for `config.yaml`. `ZEROTRUST_EXPORTER_CONFIG` overrides the platform default.
pub fn get_config_dir() -> PathBuf {
    if let Some(dir) = CONFIG_FOLDER.clone() {
        dir
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "zerotrust", "zerotrust-exporter")
}
