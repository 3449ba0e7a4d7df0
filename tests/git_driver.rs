//! Git driver against a local bare repository

use scm_agent::repository;
use scm_agent::{AgentConfig, LocalHost, Remote, RemoteKind, ScmContext};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, home: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@localhost"])
        .args(args)
        .current_dir(dir)
        .env("HOME", home)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?}: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Bare `origin.git` with one commit on `main`; returns its path and SHA.
fn origin(root: &Path) -> (std::path::PathBuf, String) {
    let home = root.join("seed-home");
    let origin = root.join("origin.git");
    let seed = root.join("seed");
    std::fs::create_dir_all(&home).unwrap();
    std::fs::create_dir_all(&origin).unwrap();
    std::fs::create_dir_all(&seed).unwrap();

    git(&origin, &home, &["init", "--bare"]);
    git(&origin, &home, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(&seed, &home, &["init"]);
    git(&seed, &home, &["checkout", "-b", "main"]);
    std::fs::write(seed.join("README.md"), "hello\n").unwrap();
    git(&seed, &home, &["add", "README.md"]);
    git(&seed, &home, &["commit", "-m", "initial"]);
    let origin_str = origin.display().to_string();
    git(&seed, &home, &["push", origin_str.as_str(), "main"]);
    let sha = git(&seed, &home, &["rev-parse", "HEAD"]);
    (origin, sha)
}

fn context(work_dir: &Path) -> (Arc<LocalHost>, ScmContext) {
    let config = AgentConfig {
        work_dir: Some(work_dir.to_path_buf()),
        ..Default::default()
    };
    let host = Arc::new(LocalHost::new(config.clone()));
    let ctx = ScmContext::new(config, host.clone()).unwrap();
    (host, ctx)
}

#[tokio::test]
async fn test_fetch_and_head() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let temp_dir = TempDir::new().unwrap();
    let (origin, sha) = origin(temp_dir.path());
    let (host, ctx) = context(&temp_dir.path().join("work"));
    let dest = temp_dir.path().join("wc");

    let mut scm = repository::create(
        &dest,
        Remote::new(origin.display().to_string(), RemoteKind::Git),
        &ctx,
        None,
    )
    .await
    .unwrap();
    scm.fetch().await.unwrap();

    assert!(dest.join("README.md").is_file());
    assert_eq!(scm.head().await.unwrap(), sha);

    let activities = host.activities();
    assert!(activities.iter().any(|a| a.starts_with("[GIT] Cloning:")));
    assert!(activities.iter().any(|a| a.ends_with("/.gitconfig.")));
}

#[tokio::test]
async fn test_fetch_replaces_working_copy() {
    if !git_available() {
        return;
    }
    let temp_dir = TempDir::new().unwrap();
    let (origin, _sha) = origin(temp_dir.path());
    let (_host, ctx) = context(&temp_dir.path().join("work"));
    let dest = temp_dir.path().join("wc");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("stale.txt"), "old").unwrap();

    let remote = Remote::new(origin.display().to_string(), RemoteKind::Git).with_branch("main");
    let mut scm = repository::create(&dest, remote, &ctx, None).await.unwrap();
    scm.fetch().await.unwrap();

    assert!(!dest.join("stale.txt").exists());
    assert!(dest.join("README.md").is_file());
}

#[tokio::test]
async fn test_branch_commit_push() {
    if !git_available() {
        return;
    }
    let temp_dir = TempDir::new().unwrap();
    let (origin, sha) = origin(temp_dir.path());
    let (_host, ctx) = context(&temp_dir.path().join("work"));
    let dest = temp_dir.path().join("wc");

    let mut scm = repository::create(
        &dest,
        Remote::new(origin.display().to_string(), RemoteKind::Git),
        &ctx,
        None,
    )
    .await
    .unwrap();
    scm.fetch().await.unwrap();

    scm.branch("feature").await.unwrap();
    let home = temp_dir.path().join("seed-home");
    assert_eq!(
        git(&dest, &home, &["rev-parse", "--abbrev-ref", "HEAD"]),
        "feature"
    );

    std::fs::write(dest.join("notes.txt"), "notes\n").unwrap();
    scm.commit(&["notes.txt".to_string()], "Add notes").await.unwrap();

    let head = scm.head().await.unwrap();
    assert_ne!(head, sha);
    assert_eq!(git(&origin, &home, &["rev-parse", "feature"]), head);

    // Switching back to an existing branch does not create it again.
    scm.branch("main").await.unwrap();
    assert_eq!(scm.head().await.unwrap(), sha);
}

#[tokio::test]
async fn test_fetch_unknown_repository_fails() {
    if !git_available() {
        return;
    }
    let temp_dir = TempDir::new().unwrap();
    let (host, ctx) = context(&temp_dir.path().join("work"));

    let mut scm = repository::create(
        temp_dir.path().join("wc"),
        Remote::new(
            temp_dir.path().join("missing.git").display().to_string(),
            RemoteKind::Git,
        ),
        &ctx,
        None,
    )
    .await
    .unwrap();

    let err = scm.fetch().await.unwrap_err();
    assert_eq!(err.code(), "EXEC_FAILED");
    assert!(
        host.activities()
            .iter()
            .any(|a| a.contains("failed: exit status"))
    );
}
