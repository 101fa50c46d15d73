use super::VerifiedArtifact;
use crate::error::InstallError;
use std::fs;
use std::path::{Path, PathBuf};

/// Opens install transactions for a package.
pub trait PackageInstaller: Send + Sync {
    fn begin(&self, package: &str) -> Result<Box<dyn InstallSession>, InstallError>;
}

/// One multi-file install transaction. Either `commit` or `abandon` is
/// called exactly once.
pub trait InstallSession: Send {
    fn write_entry(&mut self, name: &str, source: &Path) -> Result<(), InstallError>;

    fn commit(self: Box<Self>) -> Result<(), InstallError>;

    fn abandon(self: Box<Self>);
}

/// Entry name for the artifact at `index`: the last path segment of its URL,
/// or `file_<index>.apk` / `file_<index>.pkg` when the URL has none.
pub fn entry_name(url: &str, kind: &str, index: usize) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| {
            let suffix = if kind.eq_ignore_ascii_case("apk") {
                "apk"
            } else {
                "pkg"
            };
            format!("file_{index}.{suffix}")
        })
}

/// Install every artifact for `package` in a single transaction.
///
/// The transaction is committed once after all entries are written and
/// abandoned on the first failure. Every artifact's local file is deleted
/// before returning, whatever the outcome.
pub fn install_all(
    installer: &dyn PackageInstaller,
    package: &str,
    artifacts: &[VerifiedArtifact],
) -> Result<(), InstallError> {
    if artifacts.is_empty() {
        return Err(InstallError::NoFilesToInstall);
    }
    let result = write_and_commit(installer, package, artifacts);
    for artifact in artifacts {
        artifact.discard();
    }
    match &result {
        Ok(()) => tracing::info!(package, files = artifacts.len(), "install committed"),
        Err(e) => tracing::warn!(package, "install failed: {e}"),
    }
    result
}

fn write_and_commit(
    installer: &dyn PackageInstaller,
    package: &str,
    artifacts: &[VerifiedArtifact],
) -> Result<(), InstallError> {
    let mut session = installer.begin(package)?;
    for (index, artifact) in artifacts.iter().enumerate() {
        let name = entry_name(&artifact.source_url, &artifact.kind, index);
        if let Err(e) = session.write_entry(&name, &artifact.local_path) {
            session.abandon();
            return Err(e);
        }
    }
    session.commit()
}

/// Installer that stages sessions on disk and publishes each committed
/// package as `<root>/<package>/`.
#[derive(Debug, Clone)]
pub struct DirectoryInstaller {
    root: PathBuf,
}

impl DirectoryInstaller {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.root.join(package)
    }
}

impl PackageInstaller for DirectoryInstaller {
    fn begin(&self, package: &str) -> Result<Box<dyn InstallSession>, InstallError> {
        if package.is_empty() || package.contains(['/', '\\']) || package.starts_with('.') {
            return Err(InstallError::Session {
                package: package.to_string(),
                message: "invalid package name".into(),
            });
        }
        let staging = self
            .root
            .join(".sessions")
            .join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&staging)?;
        tracing::debug!(package, staging = %staging.display(), "install session opened");
        Ok(Box::new(DirectorySession {
            package: package.to_string(),
            staging,
            target: self.package_dir(package),
        }))
    }
}

struct DirectorySession {
    package: String,
    staging: PathBuf,
    target: PathBuf,
}

impl InstallSession for DirectorySession {
    fn write_entry(&mut self, name: &str, source: &Path) -> Result<(), InstallError> {
        let dest = self.staging.join(name);
        fs::copy(source, &dest).map_err(|e| InstallError::Session {
            package: self.package.clone(),
            message: format!("write {name}: {e}"),
        })?;
        fs::File::open(&dest)?.sync_all()?;
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), InstallError> {
        if self.target.exists() {
            fs::remove_dir_all(&self.target)?;
        }
        if let Some(parent) = self.target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&self.staging, &self.target).map_err(|e| InstallError::Session {
            package: self.package.clone(),
            message: format!("commit: {e}"),
        })
    }

    fn abandon(self: Box<Self>) {
        let _ = fs::remove_dir_all(&self.staging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    fn artifact(dir: &Path, name: &str, url: &str, body: &[u8]) -> VerifiedArtifact {
        let local_path = dir.join(name);
        fs::write(&local_path, body).unwrap();
        VerifiedArtifact {
            source_url: url.into(),
            kind: "apk".into(),
            expected_sha256: None,
            actual_sha256: String::new(),
            byte_length: body.len() as u64,
            local_path,
            download_duration: Duration::ZERO,
        }
    }

    #[test]
    fn entry_name_uses_last_segment() {
        assert_eq!(
            entry_name("https://cdn.example.com/builds/base.apk?sig=1", "apk", 0),
            "base.apk"
        );
    }

    #[test]
    fn entry_name_falls_back_by_kind() {
        assert_eq!(entry_name("https://cdn.example.com/", "apk", 2), "file_2.apk");
        assert_eq!(entry_name("https://cdn.example.com/", "obb", 3), "file_3.pkg");
        assert_eq!(entry_name("not a url", "APK", 0), "file_0.apk");
    }

    #[test]
    fn empty_input_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let installer = DirectoryInstaller::new(tmp.path());
        let err = install_all(&installer, "com.example", &[]).unwrap_err();
        assert!(matches!(err, InstallError::NoFilesToInstall));
        assert_eq!(err.to_string(), "no_files_to_install");
    }

    #[test]
    fn commit_publishes_all_entries_and_removes_downloads() {
        let tmp = TempDir::new().unwrap();
        let downloads = tmp.path().join("dl");
        fs::create_dir_all(&downloads).unwrap();
        let files = vec![
            artifact(&downloads, "a.part", "https://x/base.apk", b"base"),
            artifact(&downloads, "b.part", "https://x/", b"split"),
        ];
        let installer = DirectoryInstaller::new(tmp.path().join("packages"));

        install_all(&installer, "com.example", &files).unwrap();

        let dir = installer.package_dir("com.example");
        assert_eq!(fs::read(dir.join("base.apk")).unwrap(), b"base");
        assert_eq!(fs::read(dir.join("file_1.apk")).unwrap(), b"split");
        assert!(files.iter().all(|f| !f.local_path.exists()));
    }

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
    }

    struct RecordingSession {
        events: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
    }

    impl PackageInstaller for Recorder {
        fn begin(&self, package: &str) -> Result<Box<dyn InstallSession>, InstallError> {
            self.events.lock().unwrap().push(format!("begin {package}"));
            Ok(Box::new(RecordingSession {
                events: Arc::clone(&self.events),
                fail_on: self.fail_on.clone(),
            }))
        }
    }

    impl InstallSession for RecordingSession {
        fn write_entry(&mut self, name: &str, _source: &Path) -> Result<(), InstallError> {
            if self.fail_on.as_deref() == Some(name) {
                return Err(InstallError::Session {
                    package: "p".into(),
                    message: "disk full".into(),
                });
            }
            self.events.lock().unwrap().push(format!("write {name}"));
            Ok(())
        }

        fn commit(self: Box<Self>) -> Result<(), InstallError> {
            self.events.lock().unwrap().push("commit".into());
            Ok(())
        }

        fn abandon(self: Box<Self>) {
            self.events.lock().unwrap().push("abandon".into());
        }
    }

    #[test]
    fn failed_write_abandons_without_commit_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let files = vec![
            artifact(tmp.path(), "a.part", "https://x/one.apk", b"1"),
            artifact(tmp.path(), "b.part", "https://x/two.apk", b"2"),
        ];
        let installer = Recorder {
            fail_on: Some("two.apk".into()),
            ..Recorder::default()
        };

        let err = install_all(&installer, "p", &files).unwrap_err();
        assert!(err.to_string().contains("disk full"));
        let events = installer.events.lock().unwrap().clone();
        assert_eq!(events, vec!["begin p", "write one.apk", "abandon"]);
        assert!(files.iter().all(|f| !f.local_path.exists()));
    }

    #[test]
    fn commit_happens_once_after_all_writes() {
        let tmp = TempDir::new().unwrap();
        let files = vec![
            artifact(tmp.path(), "a.part", "https://x/one.apk", b"1"),
            artifact(tmp.path(), "b.part", "https://x/two.apk", b"2"),
        ];
        let installer = Recorder::default();

        install_all(&installer, "p", &files).unwrap();
        let events = installer.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["begin p", "write one.apk", "write two.apk", "commit"]
        );
    }
}
