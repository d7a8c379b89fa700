//! Process executor tests against a real local directory.

#![cfg(unix)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use burrow_kernel::{CapturingHandler, ErrorKind, LocalBackend, ProcessHandler, Vfs};

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

/// Records the order of callbacks across both streams.
#[derive(Default)]
struct OrderedHandler {
    events: Vec<(char, Vec<u8>)>,
}

#[async_trait]
impl ProcessHandler for OrderedHandler {
    async fn on_out(&mut self, data: Vec<u8>) {
        self.events.push(('o', data));
    }

    async fn on_err(&mut self, data: Vec<u8>) {
        // Handlers may await; the pump must keep going meanwhile.
        tokio::task::yield_now().await;
        self.events.push(('e', data));
    }
}

#[tokio::test]
async fn exec_reports_streams_and_code() {
    let dir = TempDir::new().unwrap();
    let local = LocalBackend::new(dir.path());

    let mut handler = CapturingHandler::new();
    let code = local
        .exec("", &sh("printf out1; printf err1 >&2"), &HashMap::new(), &mut handler)
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert_eq!(handler.out_string(), "out1");
    assert_eq!(handler.err_string(), "err1");
    assert_eq!(handler.out_chunks, 1);
    assert_eq!(handler.err_chunks, 1);
}

#[tokio::test]
async fn exec_silent_failure_has_no_callbacks() {
    let dir = TempDir::new().unwrap();
    let local = LocalBackend::new(dir.path());

    let mut handler = OrderedHandler::default();
    let code = local
        .exec("", &sh("exit 2"), &HashMap::new(), &mut handler)
        .await
        .unwrap();
    assert_eq!(code, 2);
    assert!(handler.events.is_empty());
}

#[tokio::test]
async fn exec_runs_in_subdirectory() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/file.txt"), b"contents").unwrap();
    let local: Arc<dyn Vfs> = Arc::new(LocalBackend::new(dir.path()));

    let mut handler = CapturingHandler::new();
    let code = local
        .exec("sub", &sh("cat file.txt"), &HashMap::new(), &mut handler)
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert_eq!(handler.out, b"contents");
}

#[tokio::test]
async fn exec_preserves_per_stream_order() {
    let dir = TempDir::new().unwrap();
    let local = LocalBackend::new(dir.path());

    let mut handler = OrderedHandler::default();
    let script = "for i in 1 2 3 4 5; do echo o$i; echo e$i >&2; sleep 0.01; done";
    let code = local
        .exec("", &sh(script), &HashMap::new(), &mut handler)
        .await
        .unwrap();
    assert_eq!(code, 0);

    let collect = |tag: char| -> String {
        handler
            .events
            .iter()
            .filter(|(t, _)| *t == tag)
            .map(|(_, d)| String::from_utf8_lossy(d).into_owned())
            .collect()
    };
    assert_eq!(collect('o'), "o1\no2\no3\no4\no5\n");
    assert_eq!(collect('e'), "e1\ne2\ne3\ne4\ne5\n");
}

#[tokio::test]
async fn exec_missing_program_fails_to_spawn() {
    let dir = TempDir::new().unwrap();
    let local = LocalBackend::new(dir.path());

    let mut handler = CapturingHandler::new();
    let err = local
        .exec(
            "",
            &["no_such_program_for_burrow".to_string()],
            &HashMap::new(),
            &mut handler,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SpawnFailed);
}

#[tokio::test]
async fn exec_passes_environment() {
    let dir = TempDir::new().unwrap();
    let local = LocalBackend::new(dir.path());
    let env = HashMap::from([("BURROW_GREETING".to_string(), "hi".to_string())]);

    let mut handler = CapturingHandler::new();
    local
        .exec("", &sh("printf %s \"$BURROW_GREETING\""), &env, &mut handler)
        .await
        .unwrap();
    assert_eq!(handler.out_string(), "hi");
}
