use testenv::domain::{
    ContainerDesc, NetworkDesc, NetworkResolver, PortBinding, PortProtocol, ProjectEnvDesc,
    Resolver, TestCaseEnvDesc,
};
use testenv::error::{Error, ResolveError, ScopeKind};
use testenv::services::{ProjectEnv, ScopeState};
use testenv::test_support::{FIRST_EPHEMERAL_PORT, MockEngine};
use std::sync::Arc;

fn project(desc: ProjectEnvDesc) -> (ProjectEnv, Arc<MockEngine>) {
    let engine = Arc::new(MockEngine::new());
    (ProjectEnv::new(desc, engine.clone()), engine)
}

#[test]
fn test_single_network_single_container_lifecycle() {
    let (project, engine) = project(
        ProjectEnvDesc::new().network("N1", NetworkDesc::new()).container(
            "C1",
            ContainerDesc::new("alpine:latest")
                .expose("9999")
                .network(NetworkResolver::project("N1")),
        ),
    );

    project.run().unwrap();

    assert_eq!(engine.created_networks().len(), 1);
    let created = engine.created_containers();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].image, "alpine:latest");
    assert_eq!(created[0].exposed_ports, vec!["9999"]);
    assert_eq!(created[0].networks[0].network_id, project.network("N1").unwrap().id);

    let c1 = project.container("C1").unwrap();
    assert_eq!(
        c1.host_port("9999", PortProtocol::Tcp),
        Some(FIRST_EPHEMERAL_PORT.to_string())
    );

    project.close().unwrap();

    let commands = engine.get_commands();
    let container_removed = commands
        .iter()
        .position(|c| *c == format!("remove_container:{}", c1.id()))
        .expect("container removed");
    let network_removed = commands
        .iter()
        .position(|c| c.starts_with("remove_network:"))
        .expect("network removed");
    assert!(container_removed < network_removed);
    assert_eq!(engine.live_containers(), 0);
    assert_eq!(engine.live_networks(), 0);
    assert_eq!(project.state(), ScopeState::Closed);
}

#[test]
fn test_host_port_lookup_by_protocol() {
    let (project, _) = project(ProjectEnvDesc::new().container(
        "dns",
        ContainerDesc::new("coredns/coredns:latest")
            .port_binding(PortBinding::new("127.0.0.1", "5353", "53/udp"))
            .expose("8080"),
    ));
    project.run().unwrap();

    let dns = project.container("dns").unwrap();
    assert_eq!(dns.host_port("53", PortProtocol::Udp), Some("5353".into()));
    assert_eq!(dns.host_port("53", PortProtocol::Tcp), None);
    assert!(dns.host_port("8080", PortProtocol::Tcp).is_some());
    assert_eq!(dns.host_port("9090", PortProtocol::Tcp), None);
}

#[test]
fn test_case_network_resolver_requires_test_case_scope() {
    let (project, _) = project(
        ProjectEnvDesc::new()
            .network("shared", NetworkDesc::new())
            .test_case(TestCaseEnvDesc::new().network("private", NetworkDesc::new())),
    );
    project.run().unwrap();

    let err = NetworkResolver::test_case("private")
        .resolve(&project, None)
        .unwrap_err();
    assert_eq!(err, ResolveError::OutsideTestCase("TestCaseNetwork"));

    let shared = project.network("shared").unwrap().id;
    assert_eq!(
        NetworkResolver::project("shared").resolve(&project, None).unwrap(),
        shared
    );

    let test_case = project.new_test_case();
    test_case.run().unwrap();
    assert_eq!(
        NetworkResolver::project("shared")
            .resolve(&project, Some(&test_case))
            .unwrap(),
        shared
    );
    assert_eq!(
        NetworkResolver::test_case("private")
            .resolve(&project, Some(&test_case))
            .unwrap(),
        test_case.network("private").unwrap().id
    );
}

#[test]
fn test_project_variable_resolution() {
    let (project, _) = project(ProjectEnvDesc::new());
    let resolver = Resolver::project_var("PORT");

    assert_eq!(
        resolver.resolve(&project, None).unwrap_err(),
        ResolveError::NotFound {
            kind: "variable",
            name: "PORT".into(),
            scope: ScopeKind::Project,
        }
    );

    project.set("PORT", 5432_u16);
    assert!(matches!(
        resolver.resolve(&project, None),
        Err(ResolveError::TypeMismatch { .. })
    ));

    project.set("PORT", "5432".to_string());
    assert_eq!(resolver.resolve(&project, None).unwrap(), "5432");
}

#[test]
fn test_missing_image_is_pulled_once() {
    let (project, engine) = project(
        ProjectEnvDesc::new().container("db", ContainerDesc::new("postgres:16")),
    );
    engine.add_missing_image("postgres:16");

    project.run().unwrap();

    let commands = engine.get_commands();
    assert_eq!(
        commands
            .iter()
            .filter(|c| *c == "pull_image:postgres:16")
            .count(),
        1
    );
    assert_eq!(
        commands
            .iter()
            .filter(|c| *c == "create_container:postgres:16")
            .count(),
        2
    );
    assert!(project.container("db").is_some());
}

#[test]
fn test_unresolvable_env_names_the_field() {
    let (project, engine) = project(ProjectEnvDesc::new().container(
        "app",
        ContainerDesc::new("alpine:latest").env("TOKEN", Resolver::project_var("TOKEN")),
    ));

    let err = project.run().unwrap_err();
    match &err {
        Error::Container { name, source } => {
            assert_eq!(name, "app");
            assert!(matches!(**source, Error::Resolve { ref field, .. } if field == "env TOKEN"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // resolution fails before the engine is asked for anything
    assert!(engine.created_containers().is_empty());
}

#[test]
fn test_case_container_joins_extra_network_with_alias() {
    let (project, engine) = project(
        ProjectEnvDesc::new()
            .network("shared", NetworkDesc::new())
            .test_case(
                TestCaseEnvDesc::new()
                    .network("private", NetworkDesc::new())
                    .container(
                        "api",
                        ContainerDesc::new("alpine:latest")
                            .network(NetworkResolver::test_case("private"))
                            .network_with_alias(NetworkResolver::project("shared"), "server"),
                    ),
            ),
    );
    project.run().unwrap();

    let test_case = project.new_test_case();
    test_case.run().unwrap();

    let api = test_case.container("api").unwrap();
    let created = engine.created_containers();
    assert_eq!(
        created[0].networks[0].network_id,
        test_case.network("private").unwrap().id
    );
    assert!(created[0].networks[0].aliases.is_empty());

    let connections = engine.connections();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].network_id, project.network("shared").unwrap().id);
    assert_eq!(connections[0].container_id, api.id());
    assert_eq!(connections[0].aliases, vec!["server"]);

    test_case.close().unwrap();
    project.close().unwrap();
}
