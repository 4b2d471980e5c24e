use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Where a lookup was performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The process environment
    Ambient,
    Project,
    TestCase,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambient => write!(f, "environment"),
            Self::Project => write!(f, "project"),
            Self::TestCase => write!(f, "test case"),
        }
    }
}

/// A resolver could not produce a value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no {kind} {name} in {scope}")]
    NotFound {
        kind: &'static str,
        name: String,
        scope: ScopeKind,
    },

    #[error("{kind} {name} in {scope} is not a string")]
    TypeMismatch {
        kind: &'static str,
        name: String,
        scope: ScopeKind,
    },

    #[error("can't use {0} resolver outside test case scope")]
    OutsideTestCase(&'static str),

    #[error("{0}")]
    Custom(String),
}

/// The container engine rejected a call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("no such image: {0}")]
    NoSuchImage(String),

    #[error("{action} failed: {message}")]
    Failed { action: String, message: String },
}

impl EngineError {
    pub fn failed(action: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Failed {
            action: action.into(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Container,
    Network,
    Image,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Network => write!(f, "network"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// One resource that could not be removed during teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub kind: ResourceKind,
    pub id: String,
    pub error: EngineError,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.id, self.error)
    }
}

/// Every removal failure collected by a teardown sweep
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{} resource(s) failed to clean up: {}", .failures.len(), join_failures(.failures))]
pub struct AggregateError {
    pub failures: Vec<CleanupFailure>,
}

impl AggregateError {
    pub fn push(&mut self, kind: ResourceKind, id: impl Into<String>, error: EngineError) {
        self.failures.push(CleanupFailure {
            kind,
            id: id.into(),
            error,
        });
    }

    pub fn merge(&mut self, other: AggregateError) {
        self.failures.extend(other.failures);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Ok(())` when nothing failed
    pub fn into_result(self) -> std::result::Result<(), AggregateError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

fn join_failures(failures: &[CleanupFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to resolve {field}: {source}")]
    Resolve {
        field: String,
        #[source]
        source: ResolveError,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to process '{hook}' hook: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to build image: {0}")]
    ImageBuild(Arc<Error>),

    #[error("failed to run container {name}: {source}")]
    Container {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to create network {name}: {source}")]
    Network {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("probe container {container} published no host port")]
    NoFreePort { container: String },

    #[error("{scope} environment is {state}, expected {expected}")]
    InvalidState {
        scope: ScopeKind,
        state: &'static str,
        expected: &'static str,
    },

    #[error(transparent)]
    Cleanup(#[from] AggregateError),
}

impl Error {
    pub(crate) fn resolve(field: impl Into<String>, source: ResolveError) -> Self {
        Self::Resolve {
            field: field.into(),
            source,
        }
    }

    pub(crate) fn hook(hook: &'static str, source: anyhow::Error) -> Self {
        Self::Hook { hook, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
