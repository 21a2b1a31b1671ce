use codepipe::{Config, ConnectionId, Language, SessionManager};
use tokio::sync::mpsc;

use super::{
    collect_all, fixture_source, interpreter_available, relative_to_cwd, workspace_files,
};

async fn default_manager(workspace: &std::path::Path) -> SessionManager {
    SessionManager::new(Config::default().with_workspace_dir(workspace))
        .await
        .expect("Failed to create manager")
}

#[tokio::test]
async fn test_python_hello() {
    if !interpreter_available("python3") {
        eprintln!("python3 not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let manager = default_manager(dir.path()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    manager
        .run(
            &ConnectionId::new(),
            Language::Python,
            &fixture_source("hello.py"),
            tx,
        )
        .await
        .unwrap();

    let output = collect_all(&mut rx).await;
    assert_eq!(output, "hi\n\r\nProcess exited with code 0\r\n");
    assert_eq!(workspace_files(dir.path()), 0);
}

#[tokio::test]
async fn test_python_syntax_error() {
    if !interpreter_available("python3") {
        eprintln!("python3 not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let manager = default_manager(dir.path()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    manager
        .run_tagged(
            &ConnectionId::new(),
            "py",
            &fixture_source("syntax_error.py"),
            tx,
        )
        .await
        .unwrap();

    let output = collect_all(&mut rx).await;
    assert!(output.contains("\x1b[31m"), "got {output:?}");
    assert!(output.contains("SyntaxError"), "got {output:?}");
    assert!(output.contains("\r\nProcess exited with code "));
    assert!(!output.ends_with("\r\nProcess exited with code 0\r\n"));
}

#[tokio::test]
async fn test_python_reads_input() {
    if !interpreter_available("python3") {
        eprintln!("python3 not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let manager = default_manager(dir.path()).await;
    let connection = ConnectionId::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    manager
        .run(
            &connection,
            Language::Python,
            &fixture_source("double.py"),
            tx,
        )
        .await
        .unwrap();
    assert!(manager.send_input(&connection, "3\n"));

    let output = collect_all(&mut rx).await;
    assert_eq!(output, "6\n\r\nProcess exited with code 0\r\n");
}

#[tokio::test]
async fn test_javascript_hello() {
    if !interpreter_available("node") {
        eprintln!("node not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let manager = default_manager(dir.path()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    manager
        .run_tagged(
            &ConnectionId::new(),
            "javascript",
            &fixture_source("hello.js"),
            tx,
        )
        .await
        .unwrap();

    let output = collect_all(&mut rx).await;
    assert_eq!(output, "hi\n\r\nProcess exited with code 0\r\n");
}

#[tokio::test]
async fn test_default_config_with_relative_workspace() {
    if !interpreter_available("python3") {
        eprintln!("python3 not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    // Same shape as the shipped `workspace_dir = "workspace"`
    let workspace = relative_to_cwd(&dir.path().join("workspace"));
    let manager = default_manager(&workspace).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    manager
        .run_tagged(
            &ConnectionId::new(),
            "python",
            &fixture_source("hello.py"),
            tx,
        )
        .await
        .unwrap();

    let output = collect_all(&mut rx).await;
    assert_eq!(output, "hi\n\r\nProcess exited with code 0\r\n");
    assert_eq!(workspace_files(&dir.path().join("workspace")), 0);
}
