use std::process::Command;

#[test]
fn test_chorus_version() {
    let output = Command::new("cargo")
        .args(["run", "--bin", "chorus", "--", "--version"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0.1.0"));
}

#[test]
fn test_chorus_help() {
    let output = Command::new("cargo")
        .args(["run", "--bin", "chorus", "--", "--help"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("stream"));
    assert!(stdout.contains("ask"));
}

#[test]
fn test_chorus_ask_without_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("chorus.toml");
    std::fs::write(
        &config,
        "default_provider = \"anthropic\"\n[providers.anthropic]\napi_key_env = \"CHORUS_TEST_NO_SUCH_KEY\"\n",
    )
    .unwrap();

    let output = Command::new("cargo")
        .args(["run", "--bin", "chorus", "--", "--config"])
        .arg(&config)
        .args(["ask", "hello"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not configured"));
}

#[test]
#[ignore] // Requires a local AI server on localhost:1234
fn test_chorus_stream_local() {
    let output = Command::new("cargo")
        .args(["run", "--bin", "chorus", "--", "stream", "--provider", "local", "Say hi"])
        .output()
        .unwrap();

    assert!(output.status.success());
}
