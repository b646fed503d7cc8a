//! Library configuration.
//!
//! The config is stored as JSON in the platform config directory, see [`Config::load_from_disk`].

use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

/// A repository source as written in the config file.
///
/// Order matters, repositories later in the list take precedence when the same item is listed more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RepositoryConfig {
	/// A JSON array of items.
	Json { name: String, location: String },
	/// A `.tar.gz` archive with one JSON item document per entry.
	Archive { name: String, location: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	download_dir: PathBuf,
	install_dir: PathBuf,
	data_dir: PathBuf,
	https_only: bool,
	#[serde(default)]
	repositories: Vec<RepositoryConfig>,
}

fn home_dir() -> PathBuf {
	std::env::var("HOME").map(PathBuf::from).unwrap_or_default()
}

fn cache_home() -> PathBuf {
	#[cfg(target_os = "windows")]
	let path = std::env::var("LOCALAPPDATA").map(PathBuf::from).unwrap_or_default();

	#[cfg(not(target_os = "windows"))]
	let path = if let Ok(e) = std::env::var("XDG_CACHE_HOME") {
		PathBuf::from(e)
	} else {
		home_dir().join(".cache")
	};

	path
}

fn data_home() -> PathBuf {
	#[cfg(target_os = "windows")]
	let path = std::env::var("APPDATA").map(PathBuf::from).unwrap_or_default();

	#[cfg(not(target_os = "windows"))]
	let path = if let Ok(e) = std::env::var("XDG_DATA_HOME") {
		PathBuf::from(e)
	} else {
		home_dir().join(".local/share")
	};

	path
}

fn config_home() -> PathBuf {
	#[cfg(target_os = "windows")]
	let path = std::env::var("APPDATA").map(PathBuf::from).unwrap_or_default();

	#[cfg(not(target_os = "windows"))]
	let path = if let Ok(e) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(e)
	} else {
		home_dir().join(".config")
	};

	path
}

impl Default for Config {
	fn default() -> Self {
		Self {
			download_dir: cache_home().join("depot-rs").join("downloads"),
			install_dir: data_home().join("depot-rs").join("installed"),
			data_dir: data_home().join("depot-rs").join("data"),
			https_only: true,
			repositories: Vec::new(),
		}
	}
}

impl Config {
	/// Creates a config with every directory placed under `root`.
	///
	/// Useful for portable setups and testing. `https_only` is disabled so local repositories can be used.
	pub fn in_directory(root: impl AsRef<Path>) -> Self {
		let root = root.as_ref();
		Self {
			download_dir: root.join("downloads"),
			install_dir: root.join("installed"),
			data_dir: root.join("data"),
			https_only: false,
			repositories: Vec::new(),
		}
	}

	/// Path of the config file.
	pub fn config_file_path() -> PathBuf {
		config_home().join("depot-rs").join("config.json")
	}

	/// Reads the config file from [`Config::config_file_path`].
	///
	/// # Errors
	/// - [`IO`](crate::Error::IO) when the file can't be read, including when it doesn't exist.
	/// - [`SerdeJSON`](crate::Error::SerdeJSON) when the file isn't a valid config.
	pub fn load_from_disk() -> crate::Result<Self> {
		Self::load_from_file(Self::config_file_path())
	}

	pub fn load_from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
		let path = path.as_ref();
		log::debug!("Reading config from {}", path.display());
		let data = std::fs::read_to_string(path)?;
		Ok(serde_json::from_str(&data)?)
	}

	/// Writes the config to [`Config::config_file_path`], creating the directory if needed.
	pub fn save_to_disk(&self) -> crate::Result<()> {
		self.save_to_file(Self::config_file_path())
	}

	pub fn save_to_file(&self, path: impl AsRef<Path>) -> crate::Result<()> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		log::debug!("Writing config to {}", path.display());
		std::fs::write(path, serde_json::to_string_pretty(self)?)?;
		Ok(())
	}

	pub fn download_dir(&self) -> &Path {
		&self.download_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_download_dir(&mut self, download_dir: PathBuf) -> bool {
		if download_dir.is_dir() {
			self.download_dir = download_dir;
			true
		} else {
			false
		}
	}

	pub fn install_dir(&self) -> &Path {
		&self.install_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_install_dir(&mut self, install_dir: PathBuf) -> bool {
		if install_dir.is_dir() {
			self.install_dir = install_dir;
			true
		} else {
			false
		}
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_data_dir(&mut self, data_dir: PathBuf) -> bool {
		if data_dir.is_dir() {
			self.data_dir = data_dir;
			true
		} else {
			false
		}
	}

	/// Where the merged item database is persisted.
	pub fn database_path(&self) -> PathBuf {
		self.data_dir.join("metadb.json")
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}

	pub fn repositories(&self) -> &[RepositoryConfig] {
		&self.repositories
	}
	pub fn add_repository(&mut self, repository: RepositoryConfig) {
		self.repositories.push(repository);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn config_round_trips_through_file() {
		let dir = tempfile::tempdir().expect("failed to create temp dir.");
		let mut config = Config::in_directory(dir.path());
		config.add_repository(RepositoryConfig::Json { name: "main".into(), location: "https://example.com/items.json".into() });
		config.add_repository(RepositoryConfig::Archive { name: "extra".into(), location: "/srv/extra.tar.gz".into() });

		let path = dir.path().join("nested").join("config.json");
		config.save_to_file(&path).expect("failed to save config.");
		let loaded = Config::load_from_file(&path).expect("failed to load config.");

		assert_eq!(loaded.repositories(), config.repositories());
		assert_eq!(loaded.install_dir(), dir.path().join("installed"));
		assert_eq!(loaded.database_path(), dir.path().join("data").join("metadb.json"));
		assert!(!loaded.https_only());
	}

	#[test]
	fn setters_reject_missing_directories() {
		let dir = tempfile::tempdir().expect("failed to create temp dir.");
		let mut config = Config::in_directory(dir.path());

		assert!(!config.set_download_dir(dir.path().join("does-not-exist")));
		assert_eq!(config.download_dir(), dir.path().join("downloads"));

		assert!(config.set_download_dir(dir.path().to_path_buf()));
		assert_eq!(config.download_dir(), dir.path());
	}
}
