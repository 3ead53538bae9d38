//! Runs real shell scripts through `Interpreter::plain("bash")`.

use std::io::Write;
use std::time::Duration;

use script_host::{run_process, Interpreter, ScriptHostError};

fn write_script(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new()
        .suffix(".sh")
        .tempfile()
        .expect("create temp script");
    writeln!(f, "#!/bin/bash").expect("write shebang");
    write!(f, "{body}").expect("write body");
    f
}

#[tokio::test]
async fn test_script_receives_arguments() {
    let script = write_script("echo \"$1=$2\"\n");
    let request = Interpreter::plain("bash")
        .command_for(script.path(), vec!["-Name".to_string(), "vm01".to_string()])
        .expect("build request");

    let output = run_process(&request).await.expect("run script");
    assert!(output.succeeded());
    assert_eq!(output.stdout.trim(), "-Name=vm01");
}

#[tokio::test]
async fn test_script_reads_json_from_stdin() {
    let script = write_script("cat\n");
    let request = Interpreter::plain("bash")
        .command_for(script.path(), vec![])
        .expect("build request")
        .stdin(br#"{"ItemName":"vm01"}"#.to_vec());

    let output = run_process(&request).await.expect("run script");
    let parsed: serde_json::Value = serde_json::from_str(&output.stdout).expect("json echo");
    assert_eq!(parsed["ItemName"], "vm01");
}

#[tokio::test]
async fn test_script_exit_code_and_stderr() {
    let script = write_script("echo boom >&2\nexit 3\n");
    let request = Interpreter::plain("bash")
        .command_for(script.path(), vec![])
        .expect("build request");

    let output = run_process(&request).await.expect("run script");
    assert_eq!(output.exit_code, 3);
    assert!(output.stderr.contains("boom"));
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn test_script_timeout() {
    let script = write_script("sleep 10\n");
    let request = Interpreter::plain("bash")
        .command_for(script.path(), vec![])
        .expect("build request")
        .timeout(Some(Duration::from_millis(150)));

    let result = run_process(&request).await;
    assert!(matches!(result, Err(ScriptHostError::Timeout { .. })));
}

#[tokio::test]
async fn test_bash_is_available() {
    assert!(Interpreter::plain("bash").is_available().await);
}
