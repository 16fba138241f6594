use super::Node;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The modification time of `path`, or `None` if it is missing.
///
pub fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Something that takes part in a needs-update comparison: a plain file, or a node.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    File(PathBuf),
    Node {
        target: Option<PathBuf>,
        changed: bool,
    },
}

impl Artifact {
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Artifact::File(path.into())
    }

    pub fn of(node: &Node) -> Self {
        Artifact::Node {
            target: node.target().map(Path::to_path_buf),
            changed: node.changed(),
        }
    }

    fn timestamp(&self) -> Option<SystemTime> {
        match self {
            Artifact::File(path) => modified(path),
            Artifact::Node {
                target: Some(path), ..
            } => modified(path),
            Artifact::Node { target: None, .. } => None,
        }
    }

    /// True if this artifact has to be rebuilt from `deps`.
    ///
    /// That is the case when it does not exist, when any dependency is missing or newer than it,
    /// or when a dependency node was explicitly marked as changed. A node dependency that never
    /// declared a target only contributes its changed flag.
    ///
    pub fn needs_update(&self, deps: &[Artifact]) -> bool {
        let Some(built_at) = self.timestamp() else {
            return true;
        };
        deps.iter().any(|dep| match dep {
            Artifact::Node { changed: true, .. } => true,
            Artifact::Node { target: None, .. } => false,
            dep => dep.timestamp().map_or(true, |t| t > built_at),
        })
    }
}

impl From<&Path> for Artifact {
    fn from(value: &Path) -> Self {
        Artifact::File(value.to_path_buf())
    }
}

impl From<PathBuf> for Artifact {
    fn from(value: PathBuf) -> Self {
        Artifact::File(value)
    }
}

impl From<&str> for Artifact {
    fn from(value: &str) -> Self {
        Artifact::File(value.into())
    }
}

impl From<&Node> for Artifact {
    fn from(value: &Node) -> Self {
        Artifact::of(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use std::time::Duration;

    fn touch(file: &assert_fs::fixture::ChildPath, at: SystemTime) {
        file.write_str("").unwrap();
        std::fs::File::options()
            .write(true)
            .open(file.path())
            .unwrap()
            .set_modified(at)
            .unwrap();
    }

    #[test]
    fn missing_targets_need_updating() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = Artifact::file(dir.path().join("a.o"));
        assert!(target.needs_update(&[]));
    }

    #[test]
    fn missing_dependencies_force_an_update() {
        let dir = assert_fs::TempDir::new().unwrap();
        let out = dir.child("a.o");
        touch(&out, SystemTime::now());
        let target = Artifact::file(out.path());
        assert!(!target.needs_update(&[]));
        assert!(target.needs_update(&[Artifact::file(dir.path().join("a.c"))]));
    }

    #[test]
    fn newer_dependencies_force_an_update() {
        let dir = assert_fs::TempDir::new().unwrap();
        let now = SystemTime::now();
        let (out, src, header) = (dir.child("a.o"), dir.child("a.c"), dir.child("a.h"));
        touch(&out, now);
        touch(&src, now - Duration::from_secs(60));
        touch(&header, now - Duration::from_secs(120));

        let target = Artifact::file(out.path());
        let deps = [Artifact::file(src.path()), Artifact::file(header.path())];
        assert!(!target.needs_update(&deps));

        touch(&header, now + Duration::from_secs(60));
        assert!(target.needs_update(&deps));
    }

    #[test]
    fn changed_nodes_force_an_update() {
        let dir = assert_fs::TempDir::new().unwrap();
        let out = dir.child("a.o");
        touch(&out, SystemTime::now());
        let target = Artifact::file(out.path());

        let quiet = Artifact::Node {
            target: None,
            changed: false,
        };
        let loud = Artifact::Node {
            target: None,
            changed: true,
        };
        assert!(!target.needs_update(&[quiet.clone()]));
        assert!(target.needs_update(&[quiet, loud]));
    }

    #[test]
    fn node_targets_are_compared_by_timestamp() {
        let dir = assert_fs::TempDir::new().unwrap();
        let now = SystemTime::now();
        let (out, lib) = (dir.child("app"), dir.child("libcore.a"));
        touch(&out, now);
        touch(&lib, now + Duration::from_secs(5));

        let target = Artifact::file(out.path());
        let dep = Artifact::Node {
            target: Some(lib.path().to_path_buf()),
            changed: false,
        };
        assert!(target.needs_update(&[dep]));
    }
}
