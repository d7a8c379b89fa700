//! Process-wide roots. Runs as its own test binary so `configure` sees a
//! fresh process.

use burrow_kernel::roots::{self, Role, RootSpec, RootsConfig, RootsError};
use burrow_kernel::StaticBundle;

#[tokio::test]
async fn configure_then_get() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("icon.txt"), b"from disk").unwrap();

    let config_path = dir.path().join("roots.ron");
    std::fs::write(
        &config_path,
        format!(
            "(roots: {{ Temp: Memory, UserHome: Local(path: {:?}) }}, resource_dirs: [{:?}])",
            dir.path().to_string_lossy(),
            dir.path().to_string_lossy(),
        ),
    )
    .unwrap();

    let config = RootsConfig::load(&config_path).unwrap();
    assert_eq!(config.spec(Role::Temp), RootSpec::Memory);
    roots::configure(config.clone()).unwrap();

    let temp = roots::get(Role::Temp);
    assert_eq!(temp.vfs().name(), "memory");
    temp.child("scratch").write_all(b"x").await.unwrap();
    // Same instance on every call.
    assert!(roots::get(Role::Temp).child("scratch").exists().await.unwrap());

    let home = roots::get(Role::UserHome);
    assert_eq!(home.child("icon.txt").read_string().await.unwrap(), "from disk");

    let resources = roots::get(Role::Resources);
    assert_eq!(resources.child("icon.txt").read_string().await.unwrap(), "from disk");
    assert!(!resources.child("late.txt").exists().await.unwrap());
    roots::attach_resources(StaticBundle::new().with("late.txt", b"late".as_slice()));
    assert_eq!(resources.child("late.txt").read_string().await.unwrap(), "late");

    assert!(matches!(
        roots::configure(config),
        Err(RootsError::AlreadyConfigured)
    ));
}
