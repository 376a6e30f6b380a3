use std::env;
use std::path::{Path, PathBuf};

/// Runtime settings. There is no config file: everything comes from the
/// environment, with XDG defaults for the data directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub imgbb_api_key: Option<String>,
    pub google_client_id: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = env::var_os("HIRE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_data_dir);
        Self {
            data_dir,
            imgbb_api_key: non_empty_var("IMGBB_API_KEY"),
            google_client_id: non_empty_var("HIRE_GOOGLE_CLIENT_ID"),
        }
    }

    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            imgbb_api_key: None,
            google_client_id: None,
        }
    }

    fn default_data_dir() -> PathBuf {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "hire") {
            proj_dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from(".")
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("hire.db")
    }

    /// Where a remembered session token is kept between invocations.
    pub fn session_file(&self) -> PathBuf {
        self.data_dir.join("session")
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_live_under_data_dir() {
        let config = Config::with_data_dir(Path::new("/tmp/hire-test"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/hire-test/hire.db"));
        assert_eq!(config.session_file(), PathBuf::from("/tmp/hire-test/session"));
        assert!(config.imgbb_api_key.is_none());
    }
}
