//! Exit-code contract of the `radio-gaga` binary.
//!
//! None of these reach the dashboard: they stop at config resolution, stream
//! lookup, player discovery or batch play, so they run without a terminal or
//! network.

use std::path::Path;
use std::process::{Command, Output};

fn radio_gaga(args: &[&str], home: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_radio-gaga"))
        .args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env_remove("RADIO_GAGA_CONFIG")
        .env_remove("UPDATE_INTERVAL")
        .output()
        .expect("failed to run radio-gaga")
}

fn write_config(dir: &Path, player: &str) -> String {
    let path = dir.join("radio.toml");
    let body = format!(
        r#"
[[streams]]
name = "NTS1"
url = "http://127.0.0.1:9/stream"

[[streams]]
name = "Dublab"
url = "http://127.0.0.1:9/dublab"

[player]
binary = "{}"
"#,
        player
    );
    std::fs::write(&path, body).unwrap();
    path.display().to_string()
}

#[test]
fn list_prints_streams() {
    let home = tempfile::tempdir().unwrap();
    let config = write_config(home.path(), "/nonexistent/player");
    let out = radio_gaga(&["--config", &config, "--list"], home.path());
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("NTS1"));
    assert!(stdout.contains("Dublab"));
}

#[test]
fn missing_explicit_config_is_config_error() {
    let home = tempfile::tempdir().unwrap();
    let missing = home.path().join("nope.toml");
    let out = radio_gaga(&["--config", missing.to_str().unwrap(), "--list"], home.path());
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn unknown_stream_is_config_error() {
    let home = tempfile::tempdir().unwrap();
    let config = write_config(home.path(), "/nonexistent/player");
    let out = radio_gaga(&["--config", &config, "--play", "KEXP"], home.path());
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Dublab"));
}

#[test]
fn missing_player_is_no_backend() {
    let home = tempfile::tempdir().unwrap();
    let config = write_config(home.path(), "/nonexistent/player");
    let out = radio_gaga(&["--config", &config, "--play", "nts1"], home.path());
    assert_eq!(out.status.code(), Some(3));
}

#[cfg(unix)]
#[test]
fn batch_play_returns_when_player_exits() {
    let home = tempfile::tempdir().unwrap();
    let script = home.path().join("player.sh");
    make_executable(&script, "#!/bin/sh\nexit 0\n");
    let config = write_config(home.path(), script.to_str().unwrap());
    let out = radio_gaga(&["--config", &config, "--play", "Dublab"], home.path());
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Playing Dublab"));
}

#[cfg(unix)]
fn make_executable(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(unix)]
fn batch_play_stops_player_on(signal: nix::sys::signal::Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    use std::time::{Duration, Instant};

    let home = tempfile::tempdir().unwrap();
    let pid_file = home.path().join("player.pid");
    let script = home.path().join("player.sh");
    make_executable(
        &script,
        &format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
    );
    let config = write_config(home.path(), script.to_str().unwrap());

    let mut ui = Command::new(env!("CARGO_BIN_EXE_radio-gaga"))
        .args(["--config", &config, "--play", "Dublab"])
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("XDG_DATA_HOME", home.path().join(".local/share"))
        .env_remove("RADIO_GAGA_CONFIG")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .expect("failed to run radio-gaga");

    let started = Instant::now();
    let player_pid = loop {
        if let Some(pid) = std::fs::read_to_string(&pid_file)
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok())
        {
            break pid;
        }
        assert!(started.elapsed() < Duration::from_secs(10), "player never started");
        std::thread::sleep(Duration::from_millis(50));
    };
    // let the player exec into sleep
    std::thread::sleep(Duration::from_millis(200));

    kill(Pid::from_raw(ui.id() as i32), signal).unwrap();

    let status = loop {
        if let Some(status) = ui.try_wait().unwrap() {
            break status;
        }
        if started.elapsed() > Duration::from_secs(20) {
            let _ = ui.kill();
            let _ = kill(Pid::from_raw(player_pid), nix::sys::signal::Signal::SIGKILL);
            panic!("radio-gaga did not exit after {:?}", signal);
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    let player_alive = kill(Pid::from_raw(player_pid), None).is_ok();
    if player_alive {
        let _ = kill(Pid::from_raw(player_pid), nix::sys::signal::Signal::SIGKILL);
    }
    assert_eq!(status.code(), Some(0));
    assert!(!player_alive, "player outlived radio-gaga after {:?}", signal);
}

#[cfg(unix)]
#[test]
fn batch_play_stops_player_on_hangup() {
    batch_play_stops_player_on(nix::sys::signal::Signal::SIGHUP);
}

#[cfg(unix)]
#[test]
fn batch_play_stops_player_on_quit() {
    batch_play_stops_player_on(nix::sys::signal::Signal::SIGQUIT);
}
