use std::path::PathBuf;

use mockall::Sequence;

use super::*;

struct TempDir(PathBuf);

impl TempDir {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("darwin-bclm-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn daemon(&self) -> LaunchDaemon {
        let program = self.0.join("bclm");
        fs::write(&program, "").unwrap();
        LaunchDaemon::new(Thresholds::new(85).unwrap())
            .with_plist_dir(&self.0)
            .with_program(program)
            .with_log_path(self.0.join("bclm.log"))
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

#[test]
fn test_default_descriptor_locations() {
    let daemon = LaunchDaemon::default();
    assert_eq!(daemon.label, "com.bclm.maintain");
    assert_eq!(daemon.plist_path, PathBuf::from("/Library/LaunchDaemons/com.bclm.maintain.plist"));
    assert_eq!(daemon.legacy_plist_path, PathBuf::from("/Library/LaunchDaemons/com.bclm.persist.plist"));
    assert_eq!(daemon.program, PathBuf::from("/usr/local/bin/bclm"));
    assert_eq!(daemon.interval_secs, 60);
    assert_eq!(daemon.thresholds.target(), 80);
}

#[test]
fn test_descriptor_file_follows_label() {
    let daemon = LaunchDaemon::default().with_label("com.example.charge").with_plist_dir("/tmp/agents");
    assert_eq!(daemon.plist_path, PathBuf::from("/tmp/agents/com.example.charge.plist"));
    assert_eq!(daemon.legacy_plist_path, PathBuf::from("/tmp/agents/com.bclm.persist.plist"));
    assert!(daemon.render().contains("<string>com.example.charge</string>"));

    let relabeled = LaunchDaemon::default().with_plist_dir("/tmp/agents").with_label("com.example.other");
    assert_eq!(relabeled.plist_path, PathBuf::from("/tmp/agents/com.example.other.plist"));
}

#[test]
fn test_render_contains_schedule() {
    let plist = LaunchDaemon::new(Thresholds::new(70).unwrap()).with_interval_secs(120).unwrap().render();

    assert!(plist.contains("<string>com.bclm.maintain</string>"));
    assert!(plist.contains("<string>/usr/local/bin/bclm</string>\n        <string>maintain</string>\n        <string>70</string>\n        <string>--once</string>"));
    assert!(plist.contains("<key>StartInterval</key>\n    <integer>120</integer>"));
    assert!(plist.contains("<key>RunAtLoad</key>\n    <true/>"));
    assert!(plist.contains("<key>SuccessfulExit</key>\n        <false/>"));
    assert_eq!(plist.matches("<string>/var/log/bclm.log</string>").count(), 2);
}

#[test]
fn test_render_escapes_paths() {
    let plist = LaunchDaemon::default().with_program("/opt/a&b/<bclm>").render();
    assert!(plist.contains("<string>/opt/a&amp;b/&lt;bclm&gt;</string>"));
}

#[test]
fn test_zero_interval_rejected() {
    assert!(matches!(LaunchDaemon::default().with_interval_secs(0), Err(Error::InvalidArgument { .. })));
}

#[test]
fn test_install_writes_and_loads() {
    let tmp = TempDir::new("install");
    let daemon = tmp.daemon();

    let mut launchctl = MockLaunchctl::new();
    launchctl.expect_unload().never();
    let expected = daemon.plist_path.clone();
    launchctl.expect_load().withf(move |plist| plist == expected).times(1).returning(|_| Ok(()));

    assert_eq!(daemon.status(), DaemonStatus::NotInstalled);
    daemon.install(&launchctl).unwrap();

    let written = fs::read_to_string(&daemon.plist_path).unwrap();
    assert_eq!(written, daemon.render());
    assert!(written.contains("<string>85</string>"));
    assert_eq!(daemon.status(), DaemonStatus::Maintain);
    assert!(!daemon.plist_path.with_extension("plist.tmp").exists());
}

#[test]
fn test_install_replaces_legacy_descriptor() {
    let tmp = TempDir::new("legacy");
    let daemon = tmp.daemon();
    fs::write(&daemon.legacy_plist_path, "<plist/>").unwrap();
    assert_eq!(daemon.status(), DaemonStatus::Legacy);

    let mut seq = Sequence::new();
    let mut launchctl = MockLaunchctl::new();
    launchctl
        .expect_unload()
        .withf({
            let legacy = daemon.legacy_plist_path.clone();
            move |plist| plist == legacy
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(Error::daemon("not loaded")));
    launchctl.expect_load().times(1).in_sequence(&mut seq).returning(|_| Ok(()));

    daemon.install(&launchctl).unwrap();
    assert!(!daemon.legacy_plist_path.exists());
    assert_eq!(daemon.status(), DaemonStatus::Maintain);
}

#[test]
fn test_install_requires_program() {
    let tmp = TempDir::new("noprogram");
    let daemon = tmp.daemon().with_program(tmp.0.join("missing"));

    let mut launchctl = MockLaunchctl::new();
    launchctl.expect_load().never();

    let err = daemon.install(&launchctl).unwrap_err();
    assert!(err.to_string().contains("bclm not found"), "{err}");
    assert!(!daemon.plist_path.exists());
}

#[test]
fn test_load_failure_propagates() {
    let tmp = TempDir::new("loadfail");
    let daemon = tmp.daemon();

    let mut launchctl = MockLaunchctl::new();
    launchctl.expect_load().returning(|_| Err(Error::daemon("launchctl load exited with 1")));

    assert!(matches!(daemon.install(&launchctl), Err(Error::Daemon(_))));
}

#[test]
fn test_uninstall_removes_both_descriptors() {
    let tmp = TempDir::new("uninstall");
    let daemon = tmp.daemon();
    fs::write(&daemon.plist_path, daemon.render()).unwrap();
    fs::write(&daemon.legacy_plist_path, "<plist/>").unwrap();

    let mut launchctl = MockLaunchctl::new();
    launchctl.expect_unload().times(2).returning(|_| Ok(()));

    daemon.uninstall(&launchctl).unwrap();
    assert_eq!(daemon.status(), DaemonStatus::NotInstalled);

    // Nothing left to unload the second time
    let mut launchctl = MockLaunchctl::new();
    launchctl.expect_unload().never();
    daemon.uninstall(&launchctl).unwrap();
}

#[test]
fn test_status_display() {
    assert_eq!(DaemonStatus::NotInstalled.to_string(), "not installed");
    assert_eq!(DaemonStatus::Maintain.to_string(), "installed (com.bclm.maintain)");
    assert_eq!(serde_json::to_value(DaemonStatus::NotInstalled).unwrap(), "not_installed");
}
