use std::fs;
use std::process::Command;

fn noisegif() -> Command {
    Command::new(env!("CARGO_BIN_EXE_noisegif"))
}

#[test]
fn writes_a_small_gif() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tiny.gif");
    let status = noisegif()
        .args(&["-W", "16", "-H", "16", "-b", "4", "-n", "3", "-d", "50", "--quiet", "-o"])
        .arg(&out)
        .status().unwrap();
    assert!(status.success());
    assert!(fs::read(&out).unwrap().starts_with(b"GIF89a"));
}

#[test]
fn directory_gets_default_name() {
    let dir = tempfile::tempdir().unwrap();
    let status = noisegif()
        .args(&["-r", "8x8", "-n", "2", "-q", "low", "--seconds", "0.5", "--quiet", "-o"])
        .arg(dir.path())
        .status().unwrap();
    assert!(status.success());
    assert!(dir.path().join("GIFHD.gif").exists());
}

#[test]
fn milliseconds_with_quality_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("mixed.gif");
    let res = noisegif()
        .args(&["-r", "8x8", "-n", "2", "-q", "high", "-d", "50", "--quiet", "-o"])
        .arg(&out)
        .output().unwrap();
    assert!(!res.status.success());
    assert!(String::from_utf8_lossy(&res.stderr).contains("seconds"));
    assert!(!out.exists());
}
