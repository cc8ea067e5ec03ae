//! Integration tests for the exclusive session guard and startup exit codes.
//!
//! Verifies:
//! 1. A held application directory lock rejects a second holder.
//! 2. A second `nchat` process on the same directory exits with code 1,
//!    prints the lock error, and leaves the profiles untouched.
//! 3. Incompatible profile versions and missing profiles exit with code 1.
//! 4. `--remove` deletes a profile and its cache snapshot.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use nchat::lock::{DirLock, LockError};
use nchat::profile::AppDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn nchat(confdir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_nchat"));
    cmd.arg("-d").arg(confdir).env_remove("NCHAT_LOG");
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.stdin(Stdio::null()).output().unwrap()
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn wait_for(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !path.exists() {
        assert!(Instant::now() < deadline, "{} never appeared", path.display());
        std::thread::sleep(Duration::from_millis(20));
    }
}

// ---------------------------------------------------------------------------
// In-process guard
// ---------------------------------------------------------------------------

#[test]
fn held_directory_lock_rejects_second_holder() {
    let dir = tempfile::tempdir().unwrap();

    let mut first = DirLock::try_acquire(dir.path()).unwrap();
    assert!(first.is_locked());

    let second = DirLock::try_acquire(dir.path());
    assert!(matches!(second, Err(LockError::Contended { .. })));

    first.release();
    assert!(!first.is_locked());
    let third = DirLock::try_acquire(dir.path()).unwrap();
    assert!(third.is_locked());
}

// ---------------------------------------------------------------------------
// Two processes
// ---------------------------------------------------------------------------

#[test]
fn second_process_exits_with_lock_error() {
    let dir = tempfile::tempdir().unwrap();
    let profiles = dir.path().join("profiles");

    let mut first = nchat(dir.path())
        .args(["--setup", "--protocol", "Dummy"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    wait_for(&profiles.join("Dummy_0"));
    let before = listing(&profiles);

    let second = run(&mut nchat(dir.path()));
    assert_eq!(second.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&second.stderr);
    assert!(stderr.contains("locked by another process"), "{stderr}");
    assert_eq!(listing(&profiles), before);

    // End of input makes the first process quit normally.
    let mut stdin = first.stdin.take().unwrap();
    stdin.write_all(b"profiles\n").unwrap();
    drop(stdin);
    let status = first.wait().unwrap();
    assert!(status.success());

    // With the first process gone the directory is free again.
    let lock = DirLock::try_acquire(dir.path()).unwrap();
    assert!(lock.is_locked());
}

// ---------------------------------------------------------------------------
// Startup exit codes
// ---------------------------------------------------------------------------

#[test]
fn incompatible_version_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let profiles = dir.path().join("profiles");
    std::fs::create_dir_all(&profiles).unwrap();
    std::fs::write(profiles.join("version"), "99\n").unwrap();

    let output = run(&mut nchat(dir.path()));
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("version 99"));
}

#[test]
fn no_profiles_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();

    let output = run(&mut nchat(dir.path()));
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--setup"));
}

#[test]
fn remove_deletes_profile_and_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let app_dir = AppDir::new(dir.path());
    app_dir.ensure().unwrap();
    std::fs::create_dir_all(app_dir.profiles_dir().join("Dummy_0")).unwrap();
    std::fs::create_dir_all(app_dir.cache_dir()).unwrap();
    std::fs::write(app_dir.cache_dir().join("Dummy_0.bin"), b"stale").unwrap();

    let output = run(nchat(dir.path()).args(["--remove", "Dummy_0"]));
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(app_dir.list_profiles().unwrap().is_empty());
    assert!(!app_dir.cache_dir().join("Dummy_0.bin").exists());
}
