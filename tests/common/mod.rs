#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub fn gitsync_bin() -> &'static str {
    env!("CARGO_BIN_EXE_gitsync")
}

pub fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("127.0.0.1:{port}")
}

// ─── git fixtures ─────────────────────────────────────────────────────────────

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = git_output(dir, args);
    assert_ok(&output, &format!("git {}", args.join(" ")));
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn git_output(dir: &Path, args: &[&str]) -> Output {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .output()
        .expect("run git")
}

/// `git init` on `main` with a local identity so commits work on bare CI
/// machines.
pub fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).expect("create repo dir");
    git(dir, &["init", "--quiet", "--initial-branch=main"]);
    configure_identity(dir);
}

pub fn configure_identity(dir: &Path) {
    git(dir, &["config", "user.name", "Sync Test"]);
    git(dir, &["config", "user.email", "sync@test.invalid"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

pub fn init_bare(dir: &Path) {
    std::fs::create_dir_all(dir).expect("create bare dir");
    git(dir, &["init", "--quiet", "--bare", "--initial-branch=main"]);
}

pub fn clone(remote: &Path, dest: &Path) {
    let parent = dest.parent().expect("clone destination has a parent");
    git(
        parent,
        &[
            "clone",
            "--quiet",
            remote.to_str().unwrap(),
            dest.to_str().unwrap(),
        ],
    );
    configure_identity(dest);
}

pub fn commit_file(repo: &Path, relative: &str, content: &str, message: &str) {
    let path = repo.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(&path, content).expect("write file");
    git(repo, &["add", "--", relative]);
    git(repo, &["commit", "--quiet", "-m", message]);
}

/// Working repo with one commit on `main`, pushed to a bare `origin` with
/// upstream tracking set.
pub fn repo_with_remote(root: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let remote = root.join("remote.git");
    let work = root.join("work");
    init_bare(&remote);
    init_repo(&work);
    commit_file(&work, "files/readme.md", "# notes\n", "initial");
    git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
    git(&work, &["push", "--quiet", "-u", "origin", "main"]);
    (work, remote)
}

// ─── server process ───────────────────────────────────────────────────────────

pub fn spawn_server(repo: &Path, addr: &str, extra_args: &[&str]) -> Child {
    let mut cmd = Command::new(gitsync_bin());
    cmd.args(["serve", "--listen", addr, "--repo", repo.to_str().unwrap()]);
    let has_explicit_log_level = extra_args.iter().copied().any(|arg| arg == "--log-level");
    if !has_explicit_log_level {
        cmd.args(["--log-level", "warn"]);
    }
    cmd.args(extra_args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gitsync serve")
}

pub fn wait_for_server(addr: &str, child: &mut Child) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            let _ = child.wait();
            panic!("server failed to start before deadline");
        }
        if let Ok(Some(status)) = child.try_wait() {
            panic!("server exited early with {status}");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// Minimal HTTP/1.1 request over a fresh connection. Returns status code and
/// body.
pub fn http_request(addr: &str, method: &str, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("set read timeout");
    write!(
        stream,
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    )
    .expect("write request");

    let mut raw = String::new();
    stream.read_to_string(&mut raw).expect("read response");

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or_else(|| panic!("malformed response: {raw:?}"));
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

pub fn http_get(addr: &str, path: &str) -> (u16, String) {
    http_request(addr, "GET", path)
}

#[cfg(unix)]
pub fn send_signal(child: &Child, signal: libc::c_int) {
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, signal) };
    assert_eq!(rc, 0, "failed to send signal {signal}");
}

pub fn wait_for_exit(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().expect("try_wait") {
            return status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            let _ = child.wait();
            panic!("server did not exit within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

pub fn assert_ok(output: &Output, context: &str) {
    assert!(
        output.status.success(),
        "{context} failed (status {:?})\nstdout:\n{}\nstderr:\n{}",
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}
