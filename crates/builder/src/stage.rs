//! Worker side of stage execution

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use osforge_errors::{Error, ProtocolError, StageError};
use osforge_host::{read_payload, FdSet, Reply, Service, SignalSink};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Method name used by the orchestrator
pub const RUN_METHOD: &str = "run";

/// Identity of the stage being run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMeta {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Inline call arguments
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RunArgs {
    pub tree: PathBuf,
    pub meta: StageMeta,
    pub sources: PathBuf,
}

/// Descriptor payload: options plus the resolved source items
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct StagePayload {
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub items: BTreeMap<String, PathBuf>,
}

/// Everything a stage worker gets to see
#[derive(Debug, Clone)]
pub struct StageRequest {
    /// Tree being built; the only place a stage may write
    pub tree: PathBuf,
    pub meta: StageMeta,
    /// Root of the source cache
    pub sources: PathBuf,
    pub options: Map<String, Value>,
    /// Cached file for each source item the stage references
    pub items: BTreeMap<String, PathBuf>,
}

impl StageRequest {
    /// Deserialize the options into a stage-specific type.
    ///
    /// # Errors
    /// `StageError::InvalidOptions` if they do not match `T`.
    pub fn options_as<T: DeserializeOwned>(&self) -> Result<T, StageError> {
        serde_json::from_value(Value::Object(self.options.clone())).map_err(|e| {
            StageError::InvalidOptions {
                stage: self.meta.type_name.clone(),
                message: e.to_string(),
            }
        })
    }

    /// Resolve `path` inside the tree.
    ///
    /// # Errors
    /// `StageError::PathEscape` if it could leave the tree.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StageError> {
        resolve_in_tree(&self.tree, path)
    }

    /// Cached file of source item `checksum`.
    ///
    /// # Errors
    /// `StageError::MissingSourceItem` if the stage was not given it.
    pub fn item(&self, checksum: &str) -> Result<&Path, StageError> {
        self.items
            .get(checksum)
            .map(PathBuf::as_path)
            .ok_or_else(|| StageError::MissingSourceItem {
                checksum: checksum.to_string(),
            })
    }
}

/// Most symlinks followed while resolving one path
const MAX_SYMLINKS: usize = 40;

enum Step {
    Enter(OsString),
    Up,
}

/// Join `path` onto `tree`, rejecting anything that walks upwards.
/// Absolute paths are taken relative to the tree root.
///
/// Symlinks already in the tree are followed as if the tree were the
/// filesystem root: absolute targets restart at the tree and `..` stops
/// there, so the result never names anything outside it.
///
/// # Errors
/// `StageError::PathEscape` for `..` components, unreadable links and
/// symlink loops.
pub fn resolve_in_tree(tree: &Path, path: &str) -> Result<PathBuf, StageError> {
    let escape = || StageError::PathEscape {
        path: path.to_string(),
    };

    let mut pending = Vec::new();
    for component in Path::new(path).components().rev() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => pending.push(Step::Enter(part.to_os_string())),
            Component::ParentDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    let mut resolved = tree.to_path_buf();
    let mut depth = 0usize;
    let mut links = 0usize;
    while let Some(step) = pending.pop() {
        let part = match step {
            Step::Up => {
                if depth > 0 {
                    resolved.pop();
                    depth -= 1;
                }
                continue;
            }
            Step::Enter(part) => part,
        };

        resolved.push(&part);
        let is_link = std::fs::symlink_metadata(&resolved)
            .is_ok_and(|meta| meta.file_type().is_symlink());
        if !is_link {
            depth += 1;
            continue;
        }

        links += 1;
        if links > MAX_SYMLINKS {
            return Err(escape());
        }
        let target = std::fs::read_link(&resolved).map_err(|_| escape())?;
        resolved.pop();
        if target.has_root() {
            resolved = tree.to_path_buf();
            depth = 0;
        }
        for component in target.components().rev() {
            match component {
                Component::Normal(part) => pending.push(Step::Enter(part.to_os_string())),
                Component::ParentDir => pending.push(Step::Up),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
    }
    Ok(resolved)
}

/// Successful stage reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl StageOutput {
    #[must_use]
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A stage error together with whatever output was produced before it
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub error: StageError,
    pub output: String,
}

impl StageFailure {
    #[must_use]
    pub fn new(error: StageError, output: impl Into<String>) -> Self {
        Self {
            error,
            output: output.into(),
        }
    }
}

impl From<StageError> for StageFailure {
    fn from(error: StageError) -> Self {
        Self::new(error, String::new())
    }
}

/// A stage type implementation
#[async_trait]
pub trait StageWorker: Send + Sync {
    /// Stage type, e.g. `org.osforge.mkdir`
    fn name(&self) -> &str;

    /// # Errors
    /// Returns the failure to report for this stage.
    async fn run(&self, request: &StageRequest) -> Result<StageOutput, StageFailure>;
}

/// Serves a [`StageWorker`] over the host protocol
pub struct StageService<W> {
    worker: W,
}

impl<W: StageWorker> StageService<W> {
    #[must_use]
    pub fn new(worker: W) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl<W: StageWorker> Service for StageService<W> {
    async fn dispatch(
        &self,
        method: &str,
        args: Value,
        mut fds: FdSet,
        _signals: &SignalSink<'_>,
    ) -> Result<Reply, Error> {
        if method != RUN_METHOD {
            return Err(ProtocolError::UnknownMethod {
                method: method.to_string(),
            }
            .into());
        }

        let args: RunArgs = serde_json::from_value(args)?;
        let payload: StagePayload = serde_json::from_value(read_payload(fds.steal(0)?)?)?;
        let request = StageRequest {
            tree: args.tree,
            meta: args.meta,
            sources: args.sources,
            options: payload.options,
            items: payload.items,
        };

        tracing::debug!(stage = self.worker.name(), id = %request.meta.id, "running stage");
        match self.worker.run(&request).await {
            Ok(output) => Ok(Reply::new(serde_json::to_value(output)?)),
            Err(failure) => Err(Error::Remote(
                Error::from(failure.error)
                    .envelope()
                    .with_detail("output", failure.output),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_stay_in_tree() {
        let tree = Path::new("/build/tree");
        assert_eq!(
            resolve_in_tree(tree, "etc/hostname").unwrap(),
            tree.join("etc/hostname")
        );
        assert_eq!(
            resolve_in_tree(tree, "/usr/./bin").unwrap(),
            tree.join("usr/bin")
        );
        assert_eq!(resolve_in_tree(tree, "").unwrap(), tree);

        for escape in ["../etc", "usr/../../root", "/.."] {
            assert!(matches!(
                resolve_in_tree(tree, escape),
                Err(StageError::PathEscape { .. })
            ));
        }
    }

    #[test]
    fn test_symlinks_resolve_inside_tree() {
        use std::os::unix::fs::symlink;

        let host = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();
        let root = tree.path();
        std::fs::create_dir_all(root.join("usr/bin")).unwrap();
        symlink("usr/bin", root.join("bin")).unwrap();
        symlink(host.path(), root.join("etc")).unwrap();
        symlink("../../../..", root.join("usr/up")).unwrap();
        symlink("loop", root.join("loop")).unwrap();

        assert_eq!(
            resolve_in_tree(root, "bin/sh").unwrap(),
            root.join("usr/bin/sh")
        );

        let hostname = resolve_in_tree(root, "etc/hostname").unwrap();
        assert!(hostname.starts_with(root));
        assert_eq!(
            hostname,
            root.join(host.path().strip_prefix("/").unwrap())
                .join("hostname")
        );

        assert_eq!(resolve_in_tree(root, "usr/up/var").unwrap(), root.join("var"));
        assert!(matches!(
            resolve_in_tree(root, "loop/x"),
            Err(StageError::PathEscape { .. })
        ));
    }

    #[test]
    fn test_invalid_options_name_the_stage() {
        #[derive(Deserialize)]
        #[allow(dead_code)]
        struct Options {
            paths: Vec<String>,
        }

        let request = StageRequest {
            tree: PathBuf::from("/t"),
            meta: StageMeta {
                id: "abc".into(),
                type_name: "org.osforge.mkdir".into(),
            },
            sources: PathBuf::from("/s"),
            options: Map::new(),
            items: BTreeMap::new(),
        };
        match request.options_as::<Options>() {
            Err(StageError::InvalidOptions { stage, .. }) => assert_eq!(stage, "org.osforge.mkdir"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert!(matches!(
            request.item("sha256:00"),
            Err(StageError::MissingSourceItem { .. })
        ));
    }
}
