use std::env;
use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR_STR};

use url::Url;

/// Why a `cmd://` uri could not be turned into an executable path.
#[derive(Debug)]
pub enum ResolveError {
    InvalidUri { uri: String, source: url::ParseError },
    /// `~` was used but the home directory is unknown
    HomeDir,
    WorkingDir(std::io::Error),
    CommandNotFound {
        command: String,
        source: which::Error,
    },
    /// A bare command name followed by a path, e.g. `cmd://sh/extra`
    DirectReferenceWithPath { uri: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::InvalidUri { uri, source } => write!(f, "invalid uri '{uri}': {source}"),
            ResolveError::HomeDir => write!(f, "failed to resolve user home directory"),
            ResolveError::WorkingDir(err) => {
                write!(f, "failed to resolve current working directory: {err}")
            }
            ResolveError::CommandNotFound { command, source } => {
                write!(f, "failed to find '{command}' on path: {source}")
            }
            ResolveError::DirectReferenceWithPath { uri } => write!(
                f,
                "direct command reference cannot contain additional path parts: '{uri}'"
            ),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::InvalidUri { source, .. } => Some(source),
            ResolveError::WorkingDir(err) => Some(err),
            ResolveError::CommandNotFound { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Resolve a provisioner uri to the executable it names.
///
/// The host decides where the path is rooted:
///
/// | uri | resolves to |
/// |---|---|
/// | `cmd:///usr/bin/x` | `/usr/bin/x` |
/// | `cmd://~/bin/x` | `$HOME/bin/x` |
/// | `cmd://./bin/x` | `<cwd>/bin/x` |
/// | `cmd://../bin/x` | `<parent of cwd>/bin/x` |
/// | `cmd://python3` | `python3` looked up on `PATH` |
pub fn resolve(uri: &str) -> Result<PathBuf, ResolveError> {
    resolve_with(uri, env::current_dir, dirs::home_dir)
}

/// [`resolve`] against explicit working and home directories.
fn resolve_with(
    uri: &str,
    current_dir: impl FnOnce() -> std::io::Result<PathBuf>,
    home_dir: impl FnOnce() -> Option<PathBuf>,
) -> Result<PathBuf, ResolveError> {
    let parsed = Url::parse(uri).map_err(|source| ResolveError::InvalidUri {
        uri: uri.to_string(),
        source,
    })?;
    let base = match parsed.host_str().unwrap_or("") {
        "" => PathBuf::from(MAIN_SEPARATOR_STR),
        "~" => home_dir().ok_or(ResolveError::HomeDir)?,
        "." => current_dir().map_err(ResolveError::WorkingDir)?,
        ".." => {
            let cwd = current_dir().map_err(ResolveError::WorkingDir)?;
            cwd.parent().map(Path::to_path_buf).unwrap_or(cwd)
        }
        command => {
            if !parsed.path().is_empty() {
                return Err(ResolveError::DirectReferenceWithPath {
                    uri: uri.to_string(),
                });
            }
            return which::which(command).map_err(|source| ResolveError::CommandNotFound {
                command: command.to_string(),
                source,
            });
        }
    };
    Ok(parsed
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(base, |path, segment| path.join(segment)))
}
