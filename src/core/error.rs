//! Error types for polyvcs with contextual messages
//!
//! Every backend reports failures through [`VcsError`]. Callers branch on
//! [`VcsError::kind`] (or [`VcsError::is_not_found`]) instead of matching on
//! tool output; the raw diagnostic text of the failing tool is always kept in
//! the error so it can be shown to a human.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Coarse classification shared by every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  /// Revision, branch, tag, commit or path does not exist
  NotFound,
  /// Unsafe revision specifier or malformed options
  InvalidArgument,
  /// Subprocess or native library failure not otherwise classified
  ExternalToolFailure,
  /// Operation not offered by this backend or VCS type
  Unsupported,
  /// Tool or on-disk output could not be decoded
  Parse,
  /// Local I/O failure
  Io,
  /// Configuration file problems
  Config,
}

/// Main error type for polyvcs
#[derive(Debug)]
pub enum VcsError {
  /// Something the caller asked for does not exist
  NotFound(NotFound),

  /// The caller passed something unusable
  InvalidArgument { message: String },

  /// Subprocess failures
  Tool(ToolError),

  /// Capability missing on this backend
  Unsupported { operation: &'static str, backend: String },

  /// Repository on-disk format this backend cannot read
  UnsupportedFormat { path: PathBuf, requirement: String },

  /// No opener/cloner registered for a VCS type
  UnknownVcsType { vcs_type: String },

  /// Clone target already exists
  DestinationExists { path: PathBuf, output: String },

  /// Output that could not be decoded
  Parse { what: String, reason: String },

  /// Error reported by the native git library
  Native { message: String },

  /// Configuration errors
  Config(ConfigError),

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

/// What was not found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
  Revision { spec: String },
  Branch { name: String },
  Tag { name: String },
  Commit { id: String },
  Path { path: String },
  Repository { path: PathBuf },
}

/// Subprocess errors; all of them carry the command line
#[derive(Debug)]
pub enum ToolError {
  /// Non-zero exit
  CommandFailed {
    command: String,
    status: Option<i32>,
    output: String,
  },
  /// Process could not be started
  Spawn { command: String, source: io::Error },
  /// Process killed after running past the configured limit
  Timeout { command: String, after: Duration },
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// File exists but is not valid TOML for our schema
  Parse { path: PathBuf, message: String },
  /// A field holds an unusable value
  Invalid { field: String, message: String },
}

impl VcsError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    VcsError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    VcsError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  pub fn invalid_argument(msg: impl Into<String>) -> Self {
    VcsError::InvalidArgument { message: msg.into() }
  }

  pub fn parse(what: impl Into<String>, reason: impl fmt::Display) -> Self {
    VcsError::Parse {
      what: what.into(),
      reason: reason.to_string(),
    }
  }

  pub fn unsupported(operation: &'static str, backend: impl Into<String>) -> Self {
    VcsError::Unsupported {
      operation,
      backend: backend.into(),
    }
  }

  /// Wrap an error coming out of the native git library
  pub fn native(err: impl fmt::Display) -> Self {
    VcsError::Native { message: err.to_string() }
  }

  pub fn revision_not_found(spec: impl Into<String>) -> Self {
    VcsError::NotFound(NotFound::Revision { spec: spec.into() })
  }

  pub fn commit_not_found(id: impl Into<String>) -> Self {
    VcsError::NotFound(NotFound::Commit { id: id.into() })
  }

  pub fn path_not_found(path: impl Into<String>) -> Self {
    VcsError::NotFound(NotFound::Path { path: path.into() })
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      VcsError::Message { message, context, help } => VcsError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      VcsError::Io(err) => VcsError::Message {
        message: format!("I/O error: {}", err),
        context: Some(ctx_str),
        help: None,
      },
      _ => self,
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      VcsError::NotFound(_) => ErrorKind::NotFound,
      VcsError::InvalidArgument { .. } | VcsError::DestinationExists { .. } => ErrorKind::InvalidArgument,
      VcsError::Tool(_) | VcsError::Native { .. } => ErrorKind::ExternalToolFailure,
      VcsError::Unsupported { .. } | VcsError::UnsupportedFormat { .. } | VcsError::UnknownVcsType { .. } => {
        ErrorKind::Unsupported
      }
      VcsError::Parse { .. } => ErrorKind::Parse,
      VcsError::Config(_) => ErrorKind::Config,
      VcsError::Io(_) | VcsError::Message { .. } => ErrorKind::Io,
    }
  }

  pub fn is_not_found(&self) -> bool {
    self.kind() == ErrorKind::NotFound
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      VcsError::NotFound(NotFound::Revision { .. }) => {
        Some("Check the spelling, or fetch the revision if it lives in another clone.".to_string())
      }
      VcsError::Tool(ToolError::Spawn { .. }) => {
        Some("Make sure the tool is installed and on PATH, or set `binary` in polyvcs.toml.".to_string())
      }
      VcsError::Tool(ToolError::Timeout { .. }) => {
        Some("Raise `exec.timeout_secs` in polyvcs.toml (0 disables the limit).".to_string())
      }
      VcsError::UnsupportedFormat { .. } => {
        Some("Open it with the hg command backend ([hg] backend = \"cmd\").".to_string())
      }
      VcsError::UnknownVcsType { .. } => Some("Register a backend for this type first (\"git\" and \"hg\" are built in).".to_string()),
      VcsError::DestinationExists { path, .. } => Some(format!("Remove {} or clone somewhere else.", path.display())),
      VcsError::Config(e) => e.help_message(),
      VcsError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }
}

impl NotFound {
  pub fn what(&self) -> &str {
    match self {
      NotFound::Revision { spec } => spec,
      NotFound::Branch { name } | NotFound::Tag { name } => name,
      NotFound::Commit { id } => id,
      NotFound::Path { path } => path,
      NotFound::Repository { path } => path.to_str().unwrap_or_default(),
    }
  }
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::Parse { .. } => Some("Accepted tables are [git], [hg] and [exec].".to_string()),
      ConfigError::Invalid { field, .. } => Some(format!("Fix or remove `{}`; defaults apply when it is absent.", field)),
    }
  }
}

impl fmt::Display for VcsError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VcsError::NotFound(e) => write!(f, "{}", e),
      VcsError::InvalidArgument { message } => write!(f, "Invalid argument: {}", message),
      VcsError::Tool(e) => write!(f, "{}", e),
      VcsError::Unsupported { operation, backend } => {
        write!(f, "Operation '{}' is not supported by the {} backend", operation, backend)
      }
      VcsError::UnsupportedFormat { path, requirement } => {
        write!(f, "Repository at {} requires '{}'", path.display(), requirement)
      }
      VcsError::UnknownVcsType { vcs_type } => write!(f, "Unknown VCS type: {}", vcs_type),
      VcsError::DestinationExists { path, output } => {
        write!(f, "Clone destination already exists: {}\n{}", path.display(), output)
      }
      VcsError::Parse { what, reason } => write!(f, "Failed to parse {}: {}", what, reason),
      VcsError::Native { message } => write!(f, "Git library error: {}", message),
      VcsError::Config(e) => write!(f, "{}", e),
      VcsError::Io(e) => write!(f, "I/O error: {}", e),
      VcsError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl fmt::Display for NotFound {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      NotFound::Revision { spec } => write!(f, "Revision not found: {}", spec),
      NotFound::Branch { name } => write!(f, "Branch not found: {}", name),
      NotFound::Tag { name } => write!(f, "Tag not found: {}", name),
      NotFound::Commit { id } => write!(f, "Commit not found: {}", id),
      NotFound::Path { path } => write!(f, "File does not exist: {}", path),
      NotFound::Repository { path } => write!(f, "Repository not found at: {}", path.display()),
    }
  }
}

impl fmt::Display for ToolError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ToolError::CommandFailed { command, status, output } => {
        match status {
          Some(code) => write!(f, "Command failed (exit {}): {}", code, command)?,
          None => write!(f, "Command terminated by signal: {}", command)?,
        }
        if !output.is_empty() {
          write!(f, "\n{}", output.trim_end())?;
        }
        Ok(())
      }
      ToolError::Spawn { command, source } => write!(f, "Failed to run `{}`: {}", command, source),
      ToolError::Timeout { command, after } => {
        write!(f, "Command timed out after {}s: {}", after.as_secs(), command)
      }
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::Parse { path, message } => write!(f, "Invalid config {}: {}", path.display(), message),
      ConfigError::Invalid { field, message } => write!(f, "Invalid config value for {}: {}", field, message),
    }
  }
}

impl std::error::Error for VcsError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      VcsError::Io(e) => Some(e),
      VcsError::Tool(ToolError::Spawn { source, .. }) => Some(source),
      _ => None,
    }
  }
}

impl From<io::Error> for VcsError {
  fn from(err: io::Error) -> Self {
    VcsError::Io(err)
  }
}

impl From<NotFound> for VcsError {
  fn from(err: NotFound) -> Self {
    VcsError::NotFound(err)
  }
}

impl From<ToolError> for VcsError {
  fn from(err: ToolError) -> Self {
    VcsError::Tool(err)
  }
}

impl From<ConfigError> for VcsError {
  fn from(err: ConfigError) -> Self {
    VcsError::Config(err)
  }
}

impl From<String> for VcsError {
  fn from(msg: String) -> Self {
    VcsError::message(msg)
  }
}

impl From<&str> for VcsError {
  fn from(msg: &str) -> Self {
    VcsError::message(msg)
  }
}

impl From<toml_edit::ser::Error> for VcsError {
  fn from(err: toml_edit::ser::Error) -> Self {
    VcsError::message(format!("TOML serialization error: {}", err))
  }
}

impl From<std::str::Utf8Error> for VcsError {
  fn from(err: std::str::Utf8Error) -> Self {
    VcsError::parse("UTF-8 text", err)
  }
}

impl From<chrono::ParseError> for VcsError {
  fn from(err: chrono::ParseError) -> Self {
    VcsError::parse("timestamp", err)
  }
}

impl From<std::num::ParseIntError> for VcsError {
  fn from(err: std::num::ParseIntError) -> Self {
    VcsError::parse("integer", err)
  }
}

/// Result type alias for polyvcs
pub type VcsResult<T> = Result<T, VcsError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> VcsResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> VcsResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<VcsError>,
{
  fn context(self, ctx: impl Into<String>) -> VcsResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> VcsResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}
