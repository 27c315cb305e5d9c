//! Path normalisation and the target-directory cleaning guard.
//!
//! Before extracting an update the previous install is removed, but only
//! from directories the helper can prove it owns: anything nested under the
//! safe root, or a folder whose base name is the extension's install folder
//! name. Every other existing directory is left untouched.

use crate::error::{HelperError, Result};
use crate::helper_dirs;
use std::path::{Component, Path, PathBuf};

/// Reason reported when `check_install_dir` receives an empty path.
pub const EMPTY_PATH_TEXT: &str = "path is empty";

/// Reason reported when the install directory is missing or not a folder.
pub const NOT_A_DIRECTORY_TEXT: &str = "directory does not exist or is not a folder";

/// Expand environment variables and a leading `~` in a user-supplied path.
///
/// Unknown variables are left as written. Empty input yields empty output.
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let expanded = expand_vars_with(raw, |name| std::env::var(name).ok());
    expand_user(&expanded, &helper_dirs::home_dir())
}

/// `$NAME`, `${NAME}` and, on Windows, `%NAME%` substitution.
fn expand_vars_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(['$', '%']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let (name, consumed) = if let Some(braced) = tail.strip_prefix("${") {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 3),
                None => ("", 0),
            }
        } else if let Some(plain) = tail.strip_prefix('$') {
            let end = plain
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(plain.len());
            (&plain[..end], end + 1)
        } else if cfg!(windows) {
            let percent = &tail[1..];
            match percent.find('%') {
                Some(end) => (&percent[..end], end + 2),
                None => ("", 0),
            }
        } else {
            ("", 0)
        };

        match (consumed, lookup(name)) {
            (0, _) => {
                out.push_str(&tail[..1]);
                rest = &tail[1..];
            }
            (_, Some(value)) if !name.is_empty() => {
                out.push_str(&value);
                rest = &tail[consumed..];
            }
            _ => {
                out.push_str(&tail[..consumed]);
                rest = &tail[consumed..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Replace a leading `~` (alone or followed by a separator) with `home`.
fn expand_user(path: &str, home: &Path) -> String {
    if path == "~" {
        return home.to_string_lossy().into_owned();
    }
    match path
        .strip_prefix("~/")
        .or_else(|| path.strip_prefix("~\\").filter(|_| cfg!(windows)))
    {
        Some(rest) => home.join(rest).to_string_lossy().into_owned(),
        None => path.to_owned(),
    }
}

/// Outcome of validating an install directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallDirCheck {
    /// Normalised path (empty when the input was empty).
    pub path: String,
    /// Why the directory was rejected, `None` when it is usable.
    pub problem: Option<&'static str>,
}

impl InstallDirCheck {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problem.is_none()
    }
}

/// Check that `raw` names an existing directory after normalisation.
#[must_use]
pub fn validate_install_dir(raw: &str) -> InstallDirCheck {
    let path = normalize_path(raw);
    let problem = if path.is_empty() {
        Some(EMPTY_PATH_TEXT)
    } else if Path::new(&path).is_dir() {
        None
    } else {
        Some(NOT_A_DIRECTORY_TEXT)
    };
    InstallDirCheck { path, problem }
}

/// Directory the update is extracted into.
#[must_use]
pub fn resolve_target_dir(target_dir: Option<&str>) -> PathBuf {
    match target_dir.filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(normalize_path(dir)),
        None => helper_dirs::default_target_dir(),
    }
}

/// Which existing directories may be wiped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanPolicy {
    /// Anything at or below this directory may be cleaned.
    pub safe_root: PathBuf,
    /// A directory with this base name (case-insensitive) may be cleaned.
    pub allowed_name: String,
}

impl CleanPolicy {
    /// Policy derived from the helper home, recomputed on each call.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            safe_root: helper_dirs::safe_root(),
            allowed_name: helper_dirs::ALLOWED_DIR_NAME.to_owned(),
        }
    }

    /// Whether `dir` may have its contents removed.
    ///
    /// Relative paths are never allowed: they cannot be compared with the
    /// safe root. Existing paths are compared after symlinks are resolved, so
    /// a link under the safe root does not extend it to the link's target.
    #[must_use]
    pub fn permits(&self, dir: &Path) -> bool {
        if !dir.is_absolute() {
            return false;
        }
        let dir = resolve_existing(dir);
        if dir.starts_with(resolve_existing(&self.safe_root)) {
            return true;
        }
        dir.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.eq_ignore_ascii_case(&self.allowed_name))
    }
}

/// Canonical form of `path` when it exists, lexical form otherwise.
fn resolve_existing(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| lexical_normalize(path))
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// What [`ensure_clean_target_dir`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    /// The directory did not exist and was created.
    Created,
    /// The directory existed and this many entries were removed from it.
    Cleaned { removed: usize },
    /// The directory existed but is not one the helper may wipe.
    Skipped,
}

/// Make `dir` exist and, when `policy` permits, empty it.
///
/// Subdirectories are removed recursively; symlinks are removed as entries
/// and never followed.
///
/// # Errors
///
/// Returns [`HelperError::Cleanup`] on the first entry that cannot be
/// removed, or an I/O error if the directory cannot be created.
pub fn ensure_clean_target_dir(dir: &Path, policy: &CleanPolicy) -> Result<CleanOutcome> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        return Ok(CleanOutcome::Created);
    }

    if !policy.permits(dir) {
        tracing::info!(dir = %dir.display(), "skip_clean: directory is not owned by the helper");
        return Ok(CleanOutcome::Skipped);
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| HelperError::Cleanup(format!("cannot list {}: {e}", dir.display())))?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| HelperError::Cleanup(e.to_string()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| HelperError::Cleanup(format!("{}: {e}", path.display())))?;

        let result = if file_type.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        result.map_err(|e| HelperError::Cleanup(format!("{}: {e}", path.display())))?;
        removed += 1;
    }

    tracing::debug!(dir = %dir.display(), removed, "target directory cleaned");
    Ok(CleanOutcome::Cleaned { removed })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::fs;

    fn policy_for(root: &Path) -> CleanPolicy {
        CleanPolicy {
            safe_root: root.join(".cjt-helper"),
            allowed_name: "cjt-helper".to_owned(),
        }
    }

    fn populate(dir: &Path) {
        fs::create_dir_all(dir.join("nested/deeper")).unwrap();
        fs::write(dir.join("manifest.json"), "{}").unwrap();
        fs::write(dir.join("nested/deeper/a.js"), "a").unwrap();
    }

    #[test]
    fn expand_vars_substitutes_known_names() {
        let lookup = |name: &str| (name == "APPDIR").then(|| "/opt/app".to_owned());
        assert_eq!(expand_vars_with("$APPDIR/x", lookup), "/opt/app/x");
        assert_eq!(expand_vars_with("${APPDIR}x", lookup), "/opt/appx");
        assert_eq!(expand_vars_with("$MISSING/x", lookup), "$MISSING/x");
        assert_eq!(expand_vars_with("cost $", lookup), "cost $");
        assert_eq!(expand_vars_with("${open", lookup), "${open");
    }

    #[test]
    fn expand_user_only_touches_leading_tilde() {
        let home = Path::new("/home/u");
        assert_eq!(expand_user("~", home), "/home/u");
        assert_eq!(
            expand_user("~/ext/cjt-helper", home),
            Path::new("/home/u").join("ext/cjt-helper").to_string_lossy()
        );
        assert_eq!(expand_user("/a/~/b", home), "/a/~/b");
        assert_eq!(expand_user("~other/x", home), "~other/x");
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn validate_rejects_empty_path() {
        let check = validate_install_dir("");
        assert!(!check.is_ok());
        assert_eq!(check.path, "");
        assert_eq!(check.problem, Some(EMPTY_PATH_TEXT));
    }

    #[test]
    fn validate_rejects_missing_directory_with_normalized_path() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let check = validate_install_dir(missing.to_str().unwrap());
        assert!(!check.is_ok());
        assert_eq!(check.path, missing.to_string_lossy());
        assert_eq!(check.problem, Some(NOT_A_DIRECTORY_TEXT));
    }

    #[test]
    fn validate_rejects_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(!validate_install_dir(file.to_str().unwrap()).is_ok());
    }

    #[test]
    fn validate_accepts_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let check = validate_install_dir(tmp.path().to_str().unwrap());
        assert!(check.is_ok());
        assert_eq!(check.path, tmp.path().to_string_lossy());
    }

    #[test]
    fn resolve_target_defaults_when_absent_or_empty() {
        assert_eq!(resolve_target_dir(None), helper_dirs::default_target_dir());
        assert_eq!(resolve_target_dir(Some("")), helper_dirs::default_target_dir());
        assert_eq!(resolve_target_dir(Some("/tmp/t1")), PathBuf::from("/tmp/t1"));
    }

    #[test]
    fn lexical_normalize_resolves_parent_segments() {
        assert_eq!(
            lexical_normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(lexical_normalize(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[test]
    fn missing_target_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("somewhere/else/target");
        let outcome = ensure_clean_target_dir(&dir, &policy_for(tmp.path())).unwrap();
        assert_eq!(outcome, CleanOutcome::Created);
        assert!(dir.is_dir());
    }

    #[test]
    fn directory_under_safe_root_is_emptied() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_for(tmp.path());
        let dir = policy.safe_root.join("auto-update");
        populate(&dir);

        let outcome = ensure_clean_target_dir(&dir, &policy).unwrap();
        assert_eq!(outcome, CleanOutcome::Cleaned { removed: 2 });
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn safe_root_itself_may_be_cleaned() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_for(tmp.path());
        populate(&policy.safe_root);
        assert!(policy.permits(&policy.safe_root));
    }

    #[test]
    fn unrecognised_directory_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Documents");
        populate(&dir);

        let outcome = ensure_clean_target_dir(&dir, &policy_for(tmp.path())).unwrap();
        assert_eq!(outcome, CleanOutcome::Skipped);
        assert!(dir.join("manifest.json").exists());
        assert!(dir.join("nested/deeper/a.js").exists());
    }

    #[test]
    fn allowed_name_matches_case_insensitively_anywhere() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("extensions/CJT-Helper");
        populate(&dir);

        let outcome = ensure_clean_target_dir(&dir, &policy_for(tmp.path())).unwrap();
        assert_eq!(outcome, CleanOutcome::Cleaned { removed: 2 });
    }

    #[test]
    fn similar_names_are_not_allowed() {
        let policy = policy_for(Path::new("/home/u"));
        assert!(!policy.permits(Path::new("/opt/cjt-helper-old")));
        assert!(!policy.permits(Path::new("/opt/my-cjt-helper")));
        assert!(policy.permits(Path::new("/opt/cjt-helper")));
        assert!(policy.permits(Path::new("/opt/cjt-helper/")));
    }

    #[test]
    fn parent_traversal_out_of_safe_root_is_not_allowed() {
        let policy = policy_for(Path::new("/home/u"));
        assert!(policy.permits(Path::new("/home/u/.cjt-helper/auto-update")));
        assert!(!policy.permits(Path::new("/home/u/.cjt-helper/../Documents")));
        assert!(!policy.permits(Path::new("/home/u/.cjt-helper-evil")));
    }

    #[test]
    fn relative_paths_are_never_cleaned() {
        let policy = policy_for(Path::new("/home/u"));
        assert!(!policy.permits(Path::new("cjt-helper")));
        assert!(!policy.permits(Path::new(".cjt-helper/auto-update")));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_is_unlinked_not_traversed() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_for(tmp.path());
        let outside = tmp.path().join("precious");
        populate(&outside);

        let dir = policy.safe_root.join("auto-update");
        fs::create_dir_all(&dir).unwrap();
        std::os::unix::fs::symlink(&outside, dir.join("link")).unwrap();

        let outcome = ensure_clean_target_dir(&dir, &policy).unwrap();
        assert_eq!(outcome, CleanOutcome::Cleaned { removed: 1 });
        assert!(fs::symlink_metadata(dir.join("link")).is_err());
        assert!(outside.join("manifest.json").exists());
        assert!(outside.join("nested/deeper/a.js").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_target_outside_safe_root_is_not_cleaned() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_for(tmp.path());
        let outside = tmp.path().join("precious");
        populate(&outside);
        fs::create_dir_all(&policy.safe_root).unwrap();
        let link = policy.safe_root.join("auto-update");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        assert!(!policy.permits(&link));
        let outcome = ensure_clean_target_dir(&link, &policy).unwrap();
        assert_eq!(outcome, CleanOutcome::Skipped);
        assert!(outside.join("manifest.json").exists());
        assert!(outside.join("nested/deeper/a.js").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failed_removal_aborts_the_clean() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_for(tmp.path());
        let dir = policy.safe_root.join("auto-update");
        fs::create_dir_all(&dir).unwrap();
        for name in ["a.js", "b.js", "c.js"] {
            fs::write(dir.join(name), name).unwrap();
        }

        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();
        if fs::write(dir.join("canary"), "").is_ok() {
            // Privileged users ignore directory permissions.
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = ensure_clean_target_dir(&dir, &policy);
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, HelperError::Cleanup(_)), "got {err:?}");
        // The first failure stops the walk, so nothing else was touched.
        for name in ["a.js", "b.js", "c.js"] {
            assert_eq!(fs::read_to_string(dir.join(name)).unwrap(), name);
        }
    }
}
