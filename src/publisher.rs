use console::style;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::kodo::{ObjectStore, PublishError, Result, UploadResult};

/// A local file paired with the key it is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub local_path: PathBuf,
    pub remote_key: String,
}

/// Per-run tally of upload outcomes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub uploaded: usize,
    pub failed: usize,
}

impl Report {
    pub fn total(&self) -> usize {
        self.uploaded + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Lazily walk every regular file under `root`
///
/// Traversal errors are yielded in place so one unreadable directory does not
/// end the walk. Symlinks are followed and reported as their target's type; a
/// link back to an ancestor yields a loop error instead of recursing.
pub fn enumerate(root: &Path) -> impl Iterator<Item = Result<PathBuf>> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(Ok(entry.into_path())),
            Ok(_) => None,
            Err(e) => Some(Err(PublishError::from(e))),
        })
}

/// Build the remote key for `local_path`
///
/// The path relative to `root` is joined to `prefix` with forward slashes,
/// whatever separator the host uses. An empty prefix adds no leading slash.
pub fn derive_remote_key(root: &Path, prefix: &str, local_path: &Path) -> Result<String> {
    let relative = local_path
        .strip_prefix(root)
        .map_err(|_| PublishError::OutsideRoot {
            path: local_path.to_path_buf(),
        })?;

    let relative = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_str().ok_or_else(|| {
                PublishError::NonUtf8Path {
                    path: local_path.to_path_buf(),
                }
            })),
            _ => None,
        })
        .collect::<Result<Vec<_>>>()?
        .join("/");

    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        Ok(relative)
    } else {
        Ok(format!("{}/{}", prefix, relative))
    }
}

/// Uploads a directory tree to a bucket, one file at a time
pub struct Publisher<S> {
    config: Config,
    store: S,
}

impl<S: ObjectStore> Publisher<S> {
    pub fn new(config: Config, store: S) -> Self {
        Self { config, store }
    }

    /// Enumerate `root` and pair each file with its remote key, uploading nothing
    pub fn plan<'a>(
        &'a self,
        root: &'a Path,
    ) -> Result<impl Iterator<Item = Result<UploadJob>> + 'a> {
        ensure_directory(root)?;

        Ok(enumerate(root).map(move |entry| {
            let local_path = entry?;
            let remote_key = derive_remote_key(root, &self.config.prefix, &local_path)?;
            Ok(UploadJob {
                local_path,
                remote_key,
            })
        }))
    }

    /// Print what `publish` would upload; entries that cannot be planned count as failures
    pub fn dry_run<W: Write>(&self, root: &Path, out: &mut W) -> Result<Report> {
        let mut report = Report::default();

        for job in self.plan(root)? {
            match job {
                Ok(job) => {
                    report.uploaded += 1;
                    writeln!(
                        out,
                        "  {} {} → {}",
                        style("WOULD UPLOAD").green().bold(),
                        job.local_path.display(),
                        job.remote_key
                    )
                    .map_err(PublishError::Output)?;
                }
                Err(e) => {
                    report.failed += 1;
                    writeln!(
                        out,
                        "  {} {}: {}",
                        style("WOULD FAIL").red().bold(),
                        failed_path(root, &e).display(),
                        e
                    )
                    .map_err(PublishError::Output)?;
                }
            }
        }

        Ok(report)
    }

    /// Sign a token for the job's key and hand the file to the store
    pub async fn upload(&self, job: &UploadJob) -> Result<UploadResult> {
        let token = self.config.credentials.upload_token(
            &self.config.bucket,
            &job.remote_key,
            self.config.token_ttl,
        )?;

        self.store
            .put_file(&token, &job.remote_key, &job.local_path)
            .await?
            .into_result()
    }

    /// Upload every file under `root`, writing one line per file to `out`
    ///
    /// A failure for one file is reported and counted, then the walk moves
    /// on. Only a missing root or a broken output stream stops the run.
    pub async fn publish<W: Write>(&self, root: &Path, out: &mut W) -> Result<Report> {
        let mut report = Report::default();

        for job in self.plan(root)? {
            let job = match job {
                Ok(job) => job,
                Err(e) => {
                    let path = failed_path(root, &e);
                    warn!("Skipping {}: {}", path.display(), e);
                    report.failed += 1;
                    write_failure(out, &path, &e)?;
                    continue;
                }
            };

            match self.upload(&job).await {
                Ok(_) => {
                    report.uploaded += 1;
                    write_success(out, &job)?;
                }
                Err(e) => {
                    warn!("Upload failed for {}: {}", job.local_path.display(), e);
                    report.failed += 1;
                    write_failure(out, &job.local_path, &e)?;
                }
            }
        }

        info!(
            "Published {} file(s): {} uploaded, {} failed",
            report.total(),
            report.uploaded,
            report.failed
        );

        Ok(report)
    }
}

fn ensure_directory(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(PublishError::NotADirectory {
            path: root.to_path_buf(),
        })
    }
}

/// Path to name in the report line for an entry that could not be planned
fn failed_path(root: &Path, error: &PublishError) -> PathBuf {
    match error {
        PublishError::Walk(walk) => walk.path().unwrap_or(root).to_path_buf(),
        PublishError::OutsideRoot { path } | PublishError::NonUtf8Path { path } => path.clone(),
        _ => root.to_path_buf(),
    }
}

fn write_success<W: Write>(out: &mut W, job: &UploadJob) -> Result<()> {
    writeln!(
        out,
        "{} {} → {}",
        style("✓").green(),
        job.local_path.display(),
        style(&job.remote_key).cyan()
    )
    .map_err(PublishError::Output)
}

fn write_failure<W: Write>(out: &mut W, path: &Path, error: &PublishError) -> Result<()> {
    writeln!(
        out,
        "{} {}: {}",
        style("✗").red(),
        style(path.display()).red(),
        error
    )
    .map_err(PublishError::Output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kodo::Credentials;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE};
    use std::collections::BTreeSet;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Records every call and rejects keys listed in `reject`
    #[derive(Default)]
    struct MockStore {
        calls: Mutex<Vec<(String, String, PathBuf)>>,
        reject: Vec<&'static str>,
        io_fail: Vec<&'static str>,
    }

    impl ObjectStore for MockStore {
        async fn put_file(
            &self,
            token: &str,
            key: &str,
            local_path: &Path,
        ) -> Result<UploadResult> {
            self.calls.lock().unwrap().push((
                token.to_string(),
                key.to_string(),
                local_path.to_path_buf(),
            ));

            if self.io_fail.iter().any(|k| *k == key) {
                return Err(PublishError::io(
                    local_path,
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
                ));
            }

            if self.reject.iter().any(|k| *k == key) {
                Ok(UploadResult {
                    status_code: 403,
                    body: "forbidden by mock".to_string(),
                })
            } else {
                Ok(UploadResult {
                    status_code: 200,
                    body: format!(r#"{{"key":"{}"}}"#, key),
                })
            }
        }
    }

    fn config(prefix: &str) -> Config {
        Config {
            credentials: Credentials::new("ak", "sk"),
            bucket: "ifindu".to_string(),
            prefix: prefix.to_string(),
            upload_host: "http://127.0.0.1:9".to_string(),
            token_ttl: Duration::from_secs(60),
        }
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.txt"), "beta").unwrap();
        dir
    }

    fn lines(out: &[u8]) -> Vec<String> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .lines()
            .map(|line| console::strip_ansi_codes(line).to_string())
            .collect()
    }

    #[test]
    fn test_derive_remote_key() {
        let root = Path::new("dist");
        let nested = root.join("assets").join("js").join("app.js");

        assert_eq!(
            derive_remote_key(root, "", &nested).unwrap(),
            "assets/js/app.js"
        );
        assert_eq!(
            derive_remote_key(root, "site", &nested).unwrap(),
            "site/assets/js/app.js"
        );
        assert_eq!(
            derive_remote_key(root, "site/", &root.join("index.html")).unwrap(),
            "site/index.html"
        );
        assert_eq!(
            derive_remote_key(Path::new("dist/"), "", Path::new("dist/index.html")).unwrap(),
            "index.html"
        );
    }

    #[test]
    fn test_derive_remote_key_outside_root() {
        let err = derive_remote_key(Path::new("dist"), "", Path::new("src/main.rs")).unwrap_err();
        assert!(matches!(err, PublishError::OutsideRoot { .. }));
    }

    #[test]
    fn test_enumerate_regular_files_only() {
        let dir = fixture();
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let files: Vec<PathBuf> = enumerate(dir.path()).map(|f| f.unwrap()).collect();

        assert_eq!(
            files,
            vec![dir.path().join("a.txt"), dir.path().join("sub").join("b.txt")]
        );
    }

    #[test]
    fn test_plan_keys_are_stable() {
        let dir = fixture();
        let publisher = Publisher::new(config(""), MockStore::default());

        let keys = || {
            publisher
                .plan(dir.path())
                .unwrap()
                .map(|job| job.unwrap().remote_key)
                .collect::<BTreeSet<_>>()
        };

        let first = keys();
        assert_eq!(
            first,
            BTreeSet::from(["a.txt".to_string(), "sub/b.txt".to_string()])
        );
        assert_eq!(first, keys());
        assert!(first.iter().all(|key| !key.contains('\\')));
    }

    #[test]
    fn test_plan_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let publisher = Publisher::new(config(""), MockStore::default());
        let missing = dir.path().join("dist");

        assert!(matches!(
            publisher.plan(&missing).err(),
            Some(PublishError::NotADirectory { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_empty_root_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let publisher = Publisher::new(config(""), MockStore::default());
        let mut out = Vec::new();

        let report = publisher.publish(dir.path(), &mut out).await.unwrap();

        assert_eq!(report, Report::default());
        assert!(out.is_empty());
        assert!(publisher.store.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_all_succeed() {
        let dir = fixture();
        let publisher = Publisher::new(config("static"), MockStore::default());
        let mut out = Vec::new();

        let report = publisher.publish(dir.path(), &mut out).await.unwrap();

        assert_eq!(report.uploaded, 2);
        assert!(report.is_success());

        let lines = lines(&out);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("✓"));
        assert!(lines[0].contains(&dir.path().join("a.txt").display().to_string()));
        assert!(lines[0].contains("static/a.txt"));
        assert!(lines[1].contains(&dir.path().join("sub").join("b.txt").display().to_string()));
        assert!(lines[1].contains("static/sub/b.txt"));
    }

    #[tokio::test]
    async fn test_publish_signs_token_per_key() {
        let dir = fixture();
        let publisher = Publisher::new(config(""), MockStore::default());

        publisher.publish(dir.path(), &mut Vec::new()).await.unwrap();

        let calls = publisher.store.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        for (token, key, _) in calls.iter() {
            assert!(token.starts_with("ak:"));
            let policy = token.rsplit(':').next().unwrap();
            let json = URL_SAFE.decode(policy).unwrap();
            let policy: serde_json::Value = serde_json::from_slice(&json).unwrap();
            assert_eq!(policy["scope"], format!("ifindu:{}", key));
        }
    }

    #[tokio::test]
    async fn test_publish_continues_past_rejection() {
        let dir = fixture();
        fs::write(dir.path().join("c.txt"), "gamma").unwrap();
        let store = MockStore {
            reject: vec!["a.txt"],
            ..Default::default()
        };
        let publisher = Publisher::new(config(""), store);
        let mut out = Vec::new();

        let report = publisher.publish(dir.path(), &mut out).await.unwrap();

        assert_eq!(report, Report { uploaded: 2, failed: 1 });
        assert!(!report.is_success());

        let lines = lines(&out);
        let failures: Vec<&String> = lines.iter().filter(|l| l.contains("✗")).collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains(&dir.path().join("a.txt").display().to_string()));
        assert!(failures[0].contains("forbidden by mock"));
        assert_eq!(lines.iter().filter(|l| l.contains("✓")).count(), 2);
        assert_eq!(publisher.store.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_publish_continues_past_io_error() {
        let dir = fixture();
        let store = MockStore {
            io_fail: vec!["a.txt"],
            ..Default::default()
        };
        let publisher = Publisher::new(config(""), store);
        let mut out = Vec::new();

        let report = publisher.publish(dir.path(), &mut out).await.unwrap();

        assert_eq!(report, Report { uploaded: 1, failed: 1 });
        let lines = lines(&out);
        assert!(lines[0].contains("permission denied"));
        assert!(lines[1].contains("sub/b.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_uploads_symlinked_file() {
        let dir = fixture();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("real.js"), "export {}").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("real.js"),
            dir.path().join("linked.js"),
        )
        .unwrap();

        let files: Vec<PathBuf> = enumerate(dir.path()).map(|f| f.unwrap()).collect();
        assert!(files.contains(&dir.path().join("linked.js")));

        let publisher = Publisher::new(config(""), MockStore::default());
        let mut out = Vec::new();
        let report = publisher.publish(dir.path(), &mut out).await.unwrap();

        assert_eq!(report, Report { uploaded: 3, failed: 0 });
        let linked = dir.path().join("linked.js").display().to_string();
        let line = lines(&out)
            .into_iter()
            .find(|l| l.contains(&linked))
            .unwrap();
        assert!(line.contains("✓"));
        assert!(line.contains("→ linked.js"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_continues_past_walk_error() {
        let dir = fixture();
        // Sorts between a.txt and sub/, pointing back at the root
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let publisher = Publisher::new(config(""), MockStore::default());
        let mut out = Vec::new();
        let report = publisher.publish(dir.path(), &mut out).await.unwrap();

        assert_eq!(report, Report { uploaded: 2, failed: 1 });

        let lines = lines(&out);
        assert_eq!(lines.len(), 3);
        let failures: Vec<&String> = lines.iter().filter(|l| l.contains("✗")).collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains(&dir.path().join("loop").display().to_string()));
        assert!(lines[2].contains("✓"));
        assert!(lines[2].contains("sub/b.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_derive_remote_key_rejects_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = Path::new("dist");
        let local = root.join(OsStr::from_bytes(b"bad\xff.js"));

        let err = derive_remote_key(root, "", &local).unwrap_err();
        assert!(matches!(err, PublishError::NonUtf8Path { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_reports_non_utf8_name() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = fixture();
        fs::write(dir.path().join(OsStr::from_bytes(b"\xffbad.txt")), "x").unwrap();

        let publisher = Publisher::new(config(""), MockStore::default());
        let mut out = Vec::new();
        let report = publisher.publish(dir.path(), &mut out).await.unwrap();

        assert_eq!(report, Report { uploaded: 2, failed: 1 });
        let lines = lines(&out);
        let failures: Vec<&String> = lines.iter().filter(|l| l.contains("✗")).collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("not valid UTF-8"));
        assert_eq!(publisher.store.calls.lock().unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_dry_run_counts_unplannable_entries() {
        let dir = fixture();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let publisher = Publisher::new(config("static"), MockStore::default());
        let mut out = Vec::new();
        let report = publisher.dry_run(dir.path(), &mut out).unwrap();

        assert_eq!(report, Report { uploaded: 2, failed: 1 });
        assert!(!report.is_success());

        let lines = lines(&out);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("WOULD UPLOAD"));
        assert!(lines[0].contains("→ static/a.txt"));
        assert!(lines[1].contains("WOULD FAIL"));
        assert!(lines[1].contains(&dir.path().join("loop").display().to_string()));
        assert!(lines[2].contains("→ static/sub/b.txt"));
        assert!(publisher.store.calls.lock().unwrap().is_empty());
    }
}
