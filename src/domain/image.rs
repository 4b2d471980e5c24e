use super::resolver::{Resolver, StringsMap, resolve_map};
use crate::domain::engine::BuildImageParams;
use crate::error::Error;
use crate::services::{ProjectEnv, TestCaseEnv};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// How to build an image from a Dockerfile
#[derive(Debug, Clone, Default)]
pub struct ImageDesc {
    pub dockerfile: PathBuf,
    pub context_dir: PathBuf,
    pub labels: StringsMap,
    pub build_args: StringsMap,
}

impl ImageDesc {
    pub fn new(dockerfile: impl Into<PathBuf>, context_dir: impl Into<PathBuf>) -> Self {
        Self {
            dockerfile: dockerfile.into(),
            context_dir: context_dir.into(),
            ..Self::default()
        }
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<Resolver>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn build_arg(mut self, key: impl Into<String>, value: impl Into<Resolver>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    fn build(
        &self,
        project: &ProjectEnv,
        test_case: Option<&TestCaseEnv<'_>>,
    ) -> Result<String, Error> {
        let labels = resolve_map(&self.labels, "image label", project, test_case)?;
        let build_args = resolve_map(&self.build_args, "build arg", project, test_case)?;

        info!(dockerfile = ?self.dockerfile, "Building image");
        let image = project.client().build_image(&BuildImageParams {
            dockerfile: self.dockerfile.clone(),
            context_dir: self.context_dir.clone(),
            labels,
            build_args,
        })?;
        info!(%image, "Built image");

        Ok(image)
    }
}

/// Build-once state shared by every clone of a `ImageResolver::Build`
pub struct BuildOnce {
    desc: ImageDesc,
    result: OnceLock<Result<String, Arc<Error>>>,
}

impl BuildOnce {
    fn resolve(
        &self,
        project: &ProjectEnv,
        test_case: Option<&TestCaseEnv<'_>>,
    ) -> Result<String, Error> {
        self.result
            .get_or_init(|| self.desc.build(project, test_case).map_err(Arc::new))
            .clone()
            .map_err(Error::ImageBuild)
    }

    /// Whether the build already ran, successfully or not
    pub fn is_built(&self) -> bool {
        self.result.get().is_some()
    }
}

impl fmt::Debug for BuildOnce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOnce")
            .field("dockerfile", &self.desc.dockerfile)
            .field("result", &self.result.get())
            .finish()
    }
}

/// Where a container's image comes from
#[derive(Debug, Clone)]
pub enum ImageResolver {
    /// A reference pulled from a registry if missing locally
    External(String),
    /// Built on first resolution; the outcome, including a failure, is kept
    /// for the lifetime of the process
    Build(Arc<BuildOnce>),
}

impl ImageResolver {
    pub fn external(reference: impl Into<String>) -> Self {
        Self::External(reference.into())
    }

    pub fn build(desc: ImageDesc) -> Self {
        Self::Build(Arc::new(BuildOnce {
            desc,
            result: OnceLock::new(),
        }))
    }

    pub fn resolve(
        &self,
        project: &ProjectEnv,
        test_case: Option<&TestCaseEnv<'_>>,
    ) -> Result<String, Error> {
        match self {
            Self::External(reference) => Ok(reference.clone()),
            Self::Build(once) => once.resolve(project, test_case),
        }
    }
}

impl Default for ImageResolver {
    fn default() -> Self {
        Self::external("alpine:latest")
    }
}

impl From<&str> for ImageResolver {
    fn from(reference: &str) -> Self {
        Self::external(reference)
    }
}
