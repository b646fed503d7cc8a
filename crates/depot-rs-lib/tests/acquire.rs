use std::sync::Arc;
use std::time::Duration;

use depot_rs::{DownloadManager, Item, ItemSet, ProgressState};
use depot_rs::metadb::progress::ProgressEvent;
use depot_rs_test_utils::*;

fn init_logging() {
	let _ = env_logger::builder().is_test(true).try_init();
}

fn manager(config: &depot_rs::Config, fetcher: &FakeFetcher, installer: &RecordingInstaller) -> DownloadManager {
	DownloadManager::new(config.download_dir(), config.install_dir(), fetcher.clone(), installer.clone())
}

/// Every file left under the download directory.
fn scratch_files(config: &depot_rs::Config) -> Vec<std::path::PathBuf> {
	fn walk(dir: &std::path::Path, out: &mut Vec<std::path::PathBuf>) {
		let Ok(entries) = std::fs::read_dir(dir) else { return };
		for entry in entries.flatten() {
			let path = entry.path();
			if path.is_dir() {
				walk(&path, out);
			} else {
				out.push(path);
			}
		}
	}
	let mut out = Vec::new();
	walk(config.download_dir(), &mut out);
	out
}

fn state(set: &ItemSet, id: &str) -> ProgressState {
	set.get(id).expect("item should exist.").progress().state()
}

#[tokio::test]
async fn end_to_end_installs_dependency_closure() {
	init_logging();
	let (config, _dir) = temp_config().expect("failed to create temp config.");
	let set = resolved_set(vec![
		item("pkgA", Some("http://x/pkgA.zip"), &["pkgB"]).unwrap(),
		item("pkgB", Some("http://x/pkgB.zip"), &[]).unwrap(),
	]).unwrap();
	let fetcher = FakeFetcher::new()
		.serve("http://x/pkgA.zip", "a")
		.serve("http://x/pkgB.zip", "b");
	let installer = RecordingInstaller::new();
	let manager = manager(&config, &fetcher, &installer);

	assert!(manager.acquire(&set, set.get("pkgA").unwrap()).await);

	assert_eq!(state(&set, "pkgA"), ProgressState::Installed);
	assert_eq!(state(&set, "pkgB"), ProgressState::Installed);
	assert!(config.install_dir().join("pkgA").join("pkgA.zip").exists());
	assert!(config.install_dir().join("pkgB").join("pkgB.zip").exists());
	assert_eq!(set.get("pkgB").unwrap().install_path(), Some(config.install_dir().join("pkgB")));
	assert!(scratch_files(&config).is_empty(), "scratch files left: {:?}", scratch_files(&config));
	assert!(!manager.is_in_progress("pkgA"));
}

#[tokio::test]
async fn diamond_acquires_shared_dependency_once() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![
		item("A", Some("http://x/A.zip"), &["B", "C"]).unwrap(),
		item("B", Some("http://x/B.zip"), &["D"]).unwrap(),
		item("C", Some("http://x/C.zip"), &["D"]).unwrap(),
		item("D", Some("http://x/D.zip"), &[]).unwrap(),
	]).unwrap();
	let fetcher = FakeFetcher::new()
		.serve("http://x/A.zip", "a")
		.serve("http://x/B.zip", "b")
		.serve("http://x/C.zip", "c")
		.serve("http://x/D.zip", "d");
	let installer = RecordingInstaller::new();

	assert!(manager(&config, &fetcher, &installer).acquire(&set, set.get("A").unwrap()).await);

	assert_eq!(fetcher.calls("http://x/D.zip"), 1);
	assert_eq!(installer.install_count("D"), 1);
	assert_eq!(fetcher.total_calls(), 4);
}

#[tokio::test]
async fn cyclic_dependencies_terminate() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![
		item("A", Some("http://x/A.zip"), &["B"]).unwrap(),
		item("B", Some("http://x/B.zip"), &["A"]).unwrap(),
	]).unwrap();
	let fetcher = FakeFetcher::new()
		.serve("http://x/A.zip", "a")
		.serve("http://x/B.zip", "b");
	let installer = RecordingInstaller::new();

	assert!(manager(&config, &fetcher, &installer).acquire(&set, set.get("A").unwrap()).await);
	assert_eq!(fetcher.total_calls(), 2);
}

#[tokio::test]
async fn installed_closure_is_a_no_op() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![
		item("pkgA", Some("http://x/pkgA.zip"), &["pkgB"]).unwrap(),
		item("pkgB", Some("http://x/pkgB.zip"), &[]).unwrap(),
	]).unwrap();
	let fetcher = FakeFetcher::new()
		.serve("http://x/pkgA.zip", "a")
		.serve("http://x/pkgB.zip", "b");
	let installer = RecordingInstaller::new();
	let manager = manager(&config, &fetcher, &installer);

	assert!(manager.acquire(&set, set.get("pkgA").unwrap()).await);
	std::fs::remove_dir_all(config.download_dir()).unwrap();

	assert!(manager.acquire(&set, set.get("pkgA").unwrap()).await);
	assert_eq!(fetcher.total_calls(), 2);
	assert_eq!(installer.installed().len(), 2);
	assert!(!config.download_dir().exists(), "download directory should not be recreated");
}

#[tokio::test]
async fn failed_dependency_fails_acquisition_but_not_siblings() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![
		item("pkgA", Some("http://x/pkgA.zip"), &["pkgB", "pkgC"]).unwrap(),
		item("pkgB", Some("http://x/pkgB.zip"), &[]).unwrap(),
		item("pkgC", Some("http://x/pkgC.zip"), &[]).unwrap(),
	]).unwrap();
	let fetcher = FakeFetcher::new()
		.serve("http://x/pkgA.zip", "a")
		.fail("http://x/pkgB.zip", "connection reset")
		.serve("http://x/pkgC.zip", "c");
	let installer = RecordingInstaller::new();

	assert!(!manager(&config, &fetcher, &installer).acquire(&set, set.get("pkgA").unwrap()).await);

	assert_eq!(state(&set, "pkgB"), ProgressState::Failed);
	assert_eq!(state(&set, "pkgC"), ProgressState::Installed);
	assert!(config.install_dir().join("pkgC").exists());
	assert!(!config.install_dir().join("pkgB").exists());
	assert!(scratch_files(&config).is_empty(), "partial download should be removed");
}

#[tokio::test]
async fn failed_install_is_isolated_and_cleaned() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![
		item("pkgA", Some("http://x/pkgA.zip"), &["pkgB"]).unwrap(),
		item("pkgB", Some("http://x/pkgB.zip"), &[]).unwrap(),
	]).unwrap();
	let fetcher = FakeFetcher::new()
		.serve("http://x/pkgA.zip", "a")
		.serve("http://x/pkgB.zip", "b");
	let installer = RecordingInstaller::new().fail_on("pkgB");

	assert!(!manager(&config, &fetcher, &installer).acquire(&set, set.get("pkgA").unwrap()).await);

	assert_eq!(state(&set, "pkgA"), ProgressState::Installed);
	assert_eq!(state(&set, "pkgB"), ProgressState::Failed);
	assert!(!config.install_dir().join("pkgB").exists());
	assert!(scratch_files(&config).is_empty());
}

#[tokio::test]
async fn failed_item_is_retried() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![item("pkgA", Some("http://x/pkgA.zip"), &[]).unwrap()]).unwrap();
	let installer = RecordingInstaller::new();

	let failing = FakeFetcher::new().fail("http://x/pkgA.zip", "offline");
	assert!(!manager(&config, &failing, &installer).acquire(&set, set.get("pkgA").unwrap()).await);
	assert_eq!(state(&set, "pkgA"), ProgressState::Failed);

	let working = FakeFetcher::new().serve("http://x/pkgA.zip", "a");
	assert!(manager(&config, &working, &installer).acquire(&set, set.get("pkgA").unwrap()).await);
	assert_eq!(state(&set, "pkgA"), ProgressState::Installed);
}

#[tokio::test]
async fn placeholder_dependency_fails() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![item("pkgA", Some("http://x/pkgA.zip"), &["ghost"]).unwrap()]).unwrap();
	let fetcher = FakeFetcher::new().serve("http://x/pkgA.zip", "a");
	let installer = RecordingInstaller::new();

	assert!(!manager(&config, &fetcher, &installer).acquire(&set, set.get("pkgA").unwrap()).await);
	assert_eq!(state(&set, "ghost"), ProgressState::Failed);
	assert_eq!(state(&set, "pkgA"), ProgressState::Installed);
}

#[tokio::test]
async fn unknown_dependency_in_unresolved_set_fails() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = ItemSet::new(vec![item("pkgA", Some("http://x/pkgA.zip"), &["nowhere"]).unwrap()]);
	let fetcher = FakeFetcher::new().serve("http://x/pkgA.zip", "a");
	let installer = RecordingInstaller::new();

	assert!(!manager(&config, &fetcher, &installer).acquire(&set, set.get("pkgA").unwrap()).await);
}

#[tokio::test]
async fn concurrent_acquisitions_share_work() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![
		item("app1", Some("http://x/app1.zip"), &["lib"]).unwrap(),
		item("app2", Some("http://x/app2.zip"), &["lib"]).unwrap(),
		item("lib", Some("http://x/lib.zip"), &[]).unwrap(),
	]).unwrap();
	let fetcher = FakeFetcher::new()
		.serve("http://x/app1.zip", "1")
		.serve("http://x/app2.zip", "2")
		.serve("http://x/lib.zip", "l")
		.with_delay(Duration::from_millis(50));
	let installer = RecordingInstaller::new();
	let manager = manager(&config, &fetcher, &installer);

	let (first, second) = tokio::join!(
		manager.acquire(&set, set.get("app1").unwrap()),
		manager.acquire(&set, set.get("app2").unwrap()),
	);

	assert!(first && second);
	assert_eq!(fetcher.calls("http://x/lib.zip"), 1);
	assert_eq!(installer.install_count("lib"), 1);
	assert_eq!(state(&set, "lib"), ProgressState::Installed);
}

#[tokio::test]
async fn progress_is_reported() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![item("pkgA", Some("http://x/pkgA.zip"), &[]).unwrap()]).unwrap();
	let fetcher = FakeFetcher::new().serve("http://x/pkgA.zip", "a");
	let installer = RecordingInstaller::new();

	let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
	let sink = events.clone();
	let _subscription = set.get("pkgA").unwrap().progress().subscribe(move |e| sink.lock().unwrap().push(*e));

	assert!(manager(&config, &fetcher, &installer).acquire(&set, set.get("pkgA").unwrap()).await);

	assert_eq!(*events.lock().unwrap(), vec![
		ProgressEvent::State(ProgressState::DownloadInProgress),
		ProgressEvent::Percentage(50),
		ProgressEvent::Percentage(100),
		ProgressEvent::State(ProgressState::Downloaded),
		ProgressEvent::State(ProgressState::InstallInProgress),
		ProgressEvent::State(ProgressState::Installed),
	]);
}

#[tokio::test]
async fn remove_not_installed_is_a_no_op() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![item("pkgA", Some("http://x/pkgA.zip"), &[]).unwrap()]).unwrap();
	let fetcher = FakeFetcher::new();
	let installer = RecordingInstaller::new();

	manager(&config, &fetcher, &installer).remove(set.get("pkgA").unwrap()).await.expect("remove should succeed.");
	assert_eq!(state(&set, "pkgA"), ProgressState::NotStarted);
	assert!(!config.install_dir().exists());
}

#[tokio::test]
async fn remove_deletes_only_that_item() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![
		item("pkgA", Some("http://x/pkgA.zip"), &["pkgB"]).unwrap(),
		item("pkgB", Some("http://x/pkgB.zip"), &[]).unwrap(),
	]).unwrap();
	let fetcher = FakeFetcher::new()
		.serve("http://x/pkgA.zip", "a")
		.serve("http://x/pkgB.zip", "b");
	let installer = RecordingInstaller::new();
	let manager = manager(&config, &fetcher, &installer);

	assert!(manager.acquire(&set, set.get("pkgA").unwrap()).await);
	manager.remove(set.get("pkgA").unwrap()).await.expect("remove should succeed.");

	assert!(!config.install_dir().join("pkgA").exists());
	assert_eq!(state(&set, "pkgA"), ProgressState::NotStarted);
	assert!(set.get("pkgA").unwrap().install_path().is_none());
	assert!(config.install_dir().join("pkgB").exists());
	assert_eq!(state(&set, "pkgB"), ProgressState::Installed);
}

#[tokio::test]
async fn ids_escaping_the_install_directory_are_refused() {
	init_logging();
	let (config, dir) = temp_config().unwrap();
	let victim = dir.path().join("victim");
	std::fs::create_dir_all(&victim).unwrap();
	std::fs::write(victim.join("precious.txt"), b"keep").unwrap();

	/* Listings are deserialized without going through Item::new */
	let escaping: Item = serde_json::from_value(serde_json::json!({
		"id": "../victim",
		"download": "http://x/victim.zip",
	})).unwrap();
	let set = ItemSet::new(vec![escaping]);
	let fetcher = FakeFetcher::new().serve("http://x/victim.zip", "v");
	let installer = RecordingInstaller::new().fail_on("../victim");
	let manager = manager(&config, &fetcher, &installer);

	assert!(!manager.acquire(&set, set.get("../victim").unwrap()).await);
	assert_eq!(state(&set, "../victim"), ProgressState::Failed);
	assert_eq!(fetcher.total_calls(), 0);
	assert!(victim.join("precious.txt").exists());
	assert!(manager.get_install_path("../victim").is_err());
}

#[tokio::test]
async fn removal_never_leaves_the_install_directory() {
	init_logging();
	let (config, dir) = temp_config().unwrap();
	let victim = dir.path().join("victim");
	std::fs::create_dir_all(&victim).unwrap();
	std::fs::write(victim.join("precious.txt"), b"keep").unwrap();

	let escaping: Item = serde_json::from_value(serde_json::json!({
		"id": "../victim",
		"install_path": victim,
	})).unwrap();
	assert!(escaping.is_installed());

	let manager = manager(&config, &FakeFetcher::new(), &RecordingInstaller::new());
	assert!(matches!(manager.remove(&escaping).await, Err(depot_rs::Error::InvalidArgument(_))));
	assert!(victim.join("precious.txt").exists());
	assert!(escaping.is_installed());
}

#[tokio::test]
async fn listeners_can_query_the_manager() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![item("pkgA", Some("http://x/pkgA.zip"), &[]).unwrap()]).unwrap();
	let fetcher = FakeFetcher::new().serve("http://x/pkgA.zip", "a");
	let installer = RecordingInstaller::new();
	let manager = Arc::new(manager(&config, &fetcher, &installer));

	let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
	let observer = manager.clone();
	let sink = seen.clone();
	let _subscription = set.get("pkgA").unwrap().progress().subscribe(move |event| {
		if let ProgressEvent::State(state) = event {
			sink.lock().unwrap().push((*state, observer.is_in_progress("pkgA")));
		}
	});

	assert!(manager.acquire(&set, set.get("pkgA").unwrap()).await);

	let seen = seen.lock().unwrap();
	assert_eq!(seen.first(), Some(&(ProgressState::DownloadInProgress, true)));
	assert_eq!(seen.last(), Some(&(ProgressState::Installed, true)));
	assert!(!manager.is_in_progress("pkgA"));
}

#[tokio::test]
async fn directory_creation_failure_is_isolated() {
	init_logging();
	let (config, _dir) = temp_config().unwrap();
	let set = resolved_set(vec![
		item("pkgA", Some("http://x/pkgA.zip"), &["pkgB", "pkgC", "pkgD"]).unwrap(),
		item("pkgB", Some("http://x/pkgB.zip"), &[]).unwrap(),
		item("pkgC", Some("http://x/pkgC.zip"), &[]).unwrap(),
		item("pkgD", Some("http://x/pkgD.zip"), &[]).unwrap(),
	]).unwrap();
	let fetcher = FakeFetcher::new()
		.serve("http://x/pkgA.zip", "a")
		.serve("http://x/pkgB.zip", "b")
		.serve("http://x/pkgC.zip", "c")
		.serve("http://x/pkgD.zip", "d");
	let installer = RecordingInstaller::new();

	/* Regular files where the per item directories have to go */
	std::fs::create_dir_all(config.download_dir()).unwrap();
	std::fs::write(config.download_dir().join("pkgB"), b"in the way").unwrap();
	std::fs::create_dir_all(config.install_dir()).unwrap();
	std::fs::write(config.install_dir().join("pkgC"), b"in the way").unwrap();

	assert!(!manager(&config, &fetcher, &installer).acquire(&set, set.get("pkgA").unwrap()).await);

	assert_eq!(state(&set, "pkgB"), ProgressState::Failed);
	assert_eq!(state(&set, "pkgC"), ProgressState::Failed);
	assert_eq!(state(&set, "pkgD"), ProgressState::Installed);
	assert_eq!(state(&set, "pkgA"), ProgressState::Installed);
	assert_eq!(fetcher.calls("http://x/pkgB.zip"), 0);
	assert_eq!(installer.install_count("pkgC"), 0);
	assert!(config.install_dir().join("pkgC").is_file());
}
