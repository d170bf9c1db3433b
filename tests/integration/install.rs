#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::write_manifest;
use tempfile::tempdir;
use upstart::{
    error::{InstallError, JobError},
    install::JobInstaller,
    job::JobBuilder,
};

#[test]
fn install_writes_conf_file() {
    let temp = tempdir().expect("failed to create tempdir");
    let installer = JobInstaller::new(temp.path().join("init"));

    let mut job = JobBuilder::new();
    job.description("Test description")
        .unwrap()
        .author("Dustin Oprea")
        .unwrap()
        .run("my_daemon")
        .unwrap();

    let path = installer.install("my-daemon", &job).expect("install job");
    assert_eq!(path, temp.path().join("init/my-daemon.conf"));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "description \"Test description\"\nauthor \"Dustin Oprea\"\nexec my_daemon\n"
    );
    assert!(installer.is_installed("my-daemon").unwrap());
}

#[test]
fn incomplete_job_is_not_written() {
    let temp = tempdir().expect("failed to create tempdir");
    let installer = JobInstaller::new(temp.path());

    let mut job = JobBuilder::new();
    job.description("nothing to run").unwrap();

    let err = installer.install("empty", &job).unwrap_err();
    assert!(matches!(err, InstallError::Job(JobError::IncompleteDocument)));
    assert!(!temp.path().join("empty.conf").exists());
}

#[test]
fn invalid_names_are_rejected() {
    let temp = tempdir().expect("failed to create tempdir");
    let installer = JobInstaller::new(temp.path());
    let mut job = JobBuilder::new();
    job.run("daemon").unwrap();

    for name in ["", "../escape", "/etc/init/abs", ".hidden"] {
        assert!(
            matches!(installer.install(name, &job), Err(InstallError::InvalidJobName(_))),
            "name {name:?} should be rejected"
        );
    }
}

#[test]
fn manual_override_and_uninstall() {
    let temp = tempdir().expect("failed to create tempdir");
    let installer = JobInstaller::new(temp.path());
    let mut job = JobBuilder::new();
    job.run("daemon").unwrap();
    installer.install("svc", &job).unwrap();

    installer.set_manual("svc", true).unwrap();
    let override_path = temp.path().join("svc.override");
    assert_eq!(fs::read_to_string(&override_path).unwrap(), "manual\n");

    installer.set_manual("svc", false).unwrap();
    assert!(!override_path.exists());

    installer.set_manual("svc", true).unwrap();
    installer.uninstall("svc").unwrap();
    assert!(!temp.path().join("svc.conf").exists());
    assert!(!override_path.exists());

    assert!(matches!(
        installer.uninstall("svc"),
        Err(InstallError::NotInstalled(name)) if name == "svc"
    ));
}

#[test]
fn install_manifest_uses_file_stem() {
    let temp = tempdir().expect("failed to create tempdir");
    let manifest = write_manifest(
        temp.path(),
        "web.yaml",
        "description: Web\nstart_on:\n  started: network\nrun: /usr/sbin/web\n",
    );
    let installer = JobInstaller::new(temp.path().join("init"));

    let path = installer.install_manifest(&manifest).expect("install manifest");
    assert_eq!(path, temp.path().join("init/web.conf"));
    assert_eq!(
        fs::read_to_string(path).unwrap(),
        "description \"Web\"\nstart on started network\nexec /usr/sbin/web\n"
    );
}

#[test]
fn install_manifest_prefers_declared_name() {
    let temp = tempdir().expect("failed to create tempdir");
    let manifest = write_manifest(temp.path(), "whatever.yaml", "name: api\nrun: /usr/sbin/api\n");
    let installer = JobInstaller::new(temp.path());

    let path = installer.install_manifest(&manifest).expect("install manifest");
    assert_eq!(path, temp.path().join("api.conf"));
}

#[test]
fn broken_manifest_surfaces_manifest_error() {
    let temp = tempdir().expect("failed to create tempdir");
    let manifest = write_manifest(temp.path(), "broken.yaml", "description: [unterminated\n");
    let installer = JobInstaller::new(temp.path());

    assert!(matches!(
        installer.install_manifest(&manifest),
        Err(InstallError::Manifest(_))
    ));
}
