use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn write_executable(path: &Path, content: &str) -> PathBuf {
    fs::write(path, content).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("set perms");
    path.to_path_buf()
}

/// Stub fail2ban-client/systemctl that append their argv to `calls.log`.
fn setup() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    let calls = root.join("calls.log");

    let client = write_executable(
        &root.join("fail2ban-client"),
        &format!(
            "#!/bin/sh\necho \"fail2ban-client $*\" >> '{calls}'\n\
case \"$1\" in\n\
  status) printf 'Status for the jail: opensips-brute-force\\n|- Filter\\n|  |- Currently failed: 0\\n`- Actions\\n   |- Currently banned: 1\\n   |- Total banned: 2\\n   `- Banned IP list: 203.0.113.7\\n' ;;\n\
esac\nexit 0\n",
            calls = calls.display()
        ),
    );
    let systemctl = write_executable(
        &root.join("systemctl"),
        &format!(
            "#!/bin/sh\necho \"systemctl $*\" >> '{calls}'\n\
if [ \"$1\" = is-active ]; then echo active; fi\nexit 0\n",
            calls = calls.display()
        ),
    );

    let jail_conf = root.join("jail.conf");
    fs::write(&jail_conf, "[opensips-brute-force]\nenabled = true\nignoreip = 127.0.0.1\n")
        .expect("write jail.conf");

    let config = root.join("warden.toml");
    fs::write(
        &config,
        format!(
            "[jail]\nclient = '{}'\nsystemctl = '{}'\n\n\
[privilege]\nescalate = []\n\n\
[whitelist]\ndatabase = '{}'\njail_config = '{}'\n\n\
[logging]\nfile = '{}'\n",
            client.display(),
            systemctl.display(),
            root.join("whitelist.db").display(),
            jail_conf.display(),
            root.join("warden.log").display()
        ),
    )
    .expect("write config");

    (dir, config)
}

fn warden(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_f2b-warden"))
        .arg("--config")
        .arg(config)
        .args(["--actor", "tester"])
        .args(args)
        .env_remove("FAIL2BAN_SYNC_SCRIPT_PATH")
        .output()
        .expect("run f2b-warden")
}

fn calls(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("calls.log")).unwrap_or_default()
}

#[test]
fn status_json_reports_bans() {
    let (dir, config) = setup();
    let out = warden(&config, &["status", "--json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let status: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(status["jail_name"], "opensips-brute-force");
    assert_eq!(status["enabled"], true);
    assert_eq!(status["currently_banned"], 1);
    assert_eq!(status["banned_ips"][0], "203.0.113.7");
    assert!(calls(&dir).contains("fail2ban-client status opensips-brute-force"));
}

#[test]
fn whitelist_add_patches_config_and_restarts() {
    let (dir, config) = setup();
    let out = warden(&config, &["whitelist", "add", "10.0.0.1", "--comment", "office"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let jail = fs::read_to_string(dir.path().join("jail.conf")).unwrap();
    assert!(jail.contains("ignoreip = 10.0.0.1\n# whitelist: 10.0.0.1 - office\n"));
    assert!(calls(&dir).contains("systemctl restart fail2ban"));

    let diff = warden(&config, &["whitelist", "diff"]);
    assert!(diff.status.success());

    let list = warden(&config, &["whitelist", "list", "--json"]);
    let entries: serde_json::Value = serde_json::from_slice(&list.stdout).expect("json");
    assert_eq!(entries[0]["ip_or_cidr"], "10.0.0.1");
    assert_eq!(entries[0]["created_by"], "tester");
}

#[test]
fn invalid_ban_fails_without_calling_client() {
    let (dir, config) = setup();
    let out = warden(&config, &["ban", "not-an-ip"]);
    assert!(!out.status.success());
    assert!(!calls(&dir).contains("banip"));
}

#[test]
fn unban_all_requires_confirmation() {
    let (dir, config) = setup();
    let out = warden(&config, &["unban-all"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("--yes-i-know"));
    assert!(!calls(&dir).contains("unban"));

    let out = warden(&config, &["unban-all", "--yes-i-know"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(calls(&dir).contains("fail2ban-client set opensips-brute-force unban --all"));
}
