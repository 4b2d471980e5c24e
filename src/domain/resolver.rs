use crate::error::{Error, ResolveError, ScopeKind};
use crate::services::{ProjectEnv, TestCaseEnv};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type ResolveFn =
    dyn Fn(&ProjectEnv, Option<&TestCaseEnv<'_>>) -> Result<String, ResolveError> + Send + Sync;

/// Lazily computed string value.
///
/// Every descriptor field whose value may only be known at provisioning time
/// (env vars, labels, ports...) holds a `Resolver`. It is invoked with the
/// project scope and, when provisioning a test case, the test-case scope.
#[derive(Clone)]
pub struct Resolver {
    label: Arc<str>,
    resolve: Arc<ResolveFn>,
}

impl Resolver {
    /// Always yields `value`
    pub fn value(value: impl Into<String>) -> Self {
        let value = value.into();
        Self::labeled(format!("{value:?}"), move |_, _| Ok(value.clone()))
    }

    /// Reads `name` from the process environment at resolution time
    pub fn env(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::labeled(format!("env({name})"), move |_, _| {
            std::env::var(&name).map_err(|_| ResolveError::NotFound {
                kind: "env variable",
                name: name.clone(),
                scope: ScopeKind::Ambient,
            })
        })
    }

    /// Reads a string variable from the project scope
    pub fn project_var(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::labeled(format!("project_var({key})"), move |project, _| {
            project.variables().get_string(&key)
        })
    }

    /// Reads a string variable from the test-case scope
    pub fn test_case_var(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::labeled(format!("test_case_var({key})"), move |_, test_case| {
            match test_case {
                Some(test_case) => test_case.variables().get_string(&key),
                None => Err(ResolveError::OutsideTestCase("TestCaseVariable")),
            }
        })
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&ProjectEnv, Option<&TestCaseEnv<'_>>) -> Result<String, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        Self::labeled("fn".to_string(), f)
    }

    fn labeled<F>(label: String, f: F) -> Self
    where
        F: Fn(&ProjectEnv, Option<&TestCaseEnv<'_>>) -> Result<String, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            label: label.into(),
            resolve: Arc::new(f),
        }
    }

    pub fn resolve(
        &self,
        project: &ProjectEnv,
        test_case: Option<&TestCaseEnv<'_>>,
    ) -> Result<String, ResolveError> {
        (self.resolve)(project, test_case)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl From<&str> for Resolver {
    fn from(value: &str) -> Self {
        Self::value(value)
    }
}

impl From<String> for Resolver {
    fn from(value: String) -> Self {
        Self::value(value)
    }
}

/// Named resolvers, e.g. labels or build args
pub type StringsMap = BTreeMap<String, Resolver>;

/// Resolves every entry, naming the first key that fails as `"{what} {key}"`
pub(crate) fn resolve_map(
    map: &StringsMap,
    what: &str,
    project: &ProjectEnv,
    test_case: Option<&TestCaseEnv<'_>>,
) -> Result<BTreeMap<String, String>, Error> {
    map.iter()
        .map(|(key, resolver)| {
            resolver
                .resolve(project, test_case)
                .map(|value| (key.clone(), value))
                .map_err(|e| Error::resolve(format!("{what} {key}"), e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProjectEnvDesc;
    use crate::test_support::MockEngine;
    use serial_test::serial;

    fn project() -> ProjectEnv {
        ProjectEnv::new(ProjectEnvDesc::default(), Arc::new(MockEngine::new()))
    }

    #[test]
    fn constant_value() {
        let project = project();
        let r = Resolver::from("alpine");
        assert_eq!(r.resolve(&project, None).unwrap(), "alpine");
        assert_eq!(format!("{r:?}"), "\"alpine\"");
    }

    #[test]
    #[serial]
    fn env_lookup() {
        let project = project();
        unsafe {
            std::env::set_var("TESTENV_RESOLVER_PRESENT", "yes");
            std::env::remove_var("TESTENV_RESOLVER_MISSING");
        }

        let present = Resolver::env("TESTENV_RESOLVER_PRESENT");
        assert_eq!(present.resolve(&project, None).unwrap(), "yes");

        let missing = Resolver::env("TESTENV_RESOLVER_MISSING");
        assert_eq!(
            missing.resolve(&project, None).unwrap_err(),
            ResolveError::NotFound {
                kind: "env variable",
                name: "TESTENV_RESOLVER_MISSING".into(),
                scope: ScopeKind::Ambient,
            }
        );

        unsafe {
            std::env::remove_var("TESTENV_RESOLVER_PRESENT");
        }
    }

    #[test]
    fn project_var_not_found() {
        let project = project();
        let err = Resolver::project_var("PG_PORT")
            .resolve(&project, None)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { ref name, .. } if name == "PG_PORT"));
    }

    #[test]
    fn project_var_type_mismatch() {
        let project = project();
        project.set("PG_PORT", 5432u16);
        let err = Resolver::project_var("PG_PORT")
            .resolve(&project, None)
            .unwrap_err();
        assert!(matches!(err, ResolveError::TypeMismatch { .. }));
    }

    #[test]
    fn project_var_exact_value() {
        let project = project();
        project.set("PG_PORT", "49153".to_string());
        let r = Resolver::project_var("PG_PORT");
        assert_eq!(r.resolve(&project, None).unwrap(), "49153");

        // repeated calls see the current value
        project.set("PG_PORT", "49154".to_string());
        assert_eq!(r.resolve(&project, None).unwrap(), "49154");
    }

    #[test]
    fn project_var_visible_from_test_case() {
        let project = project();
        project.set("HOST", "db.local");
        let test_case = project.new_test_case();

        let r = Resolver::project_var("HOST");
        assert_eq!(r.resolve(&project, Some(&test_case)).unwrap(), "db.local");
    }

    #[test]
    fn test_case_var_requires_test_case() {
        let project = project();
        let r = Resolver::test_case_var("TOKEN");
        assert_eq!(
            r.resolve(&project, None).unwrap_err(),
            ResolveError::OutsideTestCase("TestCaseVariable")
        );

        let test_case = project.new_test_case();
        test_case.set("TOKEN", "abc");
        assert_eq!(r.resolve(&project, Some(&test_case)).unwrap(), "abc");
    }

    #[test]
    fn resolve_map_names_failing_key() {
        let project = project();
        let mut map = StringsMap::new();
        map.insert("ok".into(), "1".into());
        map.insert("broken".into(), Resolver::project_var("MISSING"));

        let err = resolve_map(&map, "label", &project, None).unwrap_err();
        match err {
            Error::Resolve { field, .. } => assert_eq!(field, "label broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn custom_resolver_composes() {
        let project = project();
        project.set("PORT", "8080");
        let port = Resolver::project_var("PORT");
        let url = Resolver::from_fn(move |project, test_case| {
            Ok(format!("http://localhost:{}", port.resolve(project, test_case)?))
        });
        assert_eq!(url.resolve(&project, None).unwrap(), "http://localhost:8080");
    }
}
