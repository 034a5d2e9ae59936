use assert_cmd::Command;
use tempfile::{tempdir, TempDir};

fn shelf(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("shelf").unwrap();
    cmd.current_dir(config_dir.path())
        .env("SHELF_ENV", "local")
        .env("SHELF_CONFIG_DIR", config_dir.path())
        .env_remove("SHELF_AUTH__JWT_SECRET")
        .env_remove("SHELF_CATALOG__DATA_FILE");
    cmd
}

#[test]
fn check_config_summarizes_defaults() {
    let dir = tempdir().unwrap();
    let output = shelf(&dir).arg("check-config").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("users: admin, user1"));
    assert!(stdout.contains("catalog: in-memory seed"));
}

#[test]
fn check_config_reads_the_catalog_file() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("books.csv");
    std::fs::write(&data, "ID,Title,Author,Main Genre,Rating\n1,A,B,C,4.0\n").unwrap();
    std::fs::write(
        dir.path().join("base.toml"),
        format!("[catalog]\ndata_file = {:?}\n", data.display().to_string()),
    )
    .unwrap();

    let output = shelf(&dir).arg("check-config").output().unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().contains("(1 books)"));
}

#[test]
fn token_is_printed_for_known_user() {
    let dir = tempdir().unwrap();
    let output = shelf(&dir)
        .args(["token", "--user", "admin"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let token = String::from_utf8(output.stdout).unwrap();
    assert_eq!(token.trim().split('.').count(), 3);
}

#[test]
fn token_for_unknown_user_fails() {
    let dir = tempdir().unwrap();
    shelf(&dir)
        .args(["token", "--user", "ghost"])
        .assert()
        .failure();
}

#[test]
fn production_refuses_the_development_secret() {
    let dir = tempdir().unwrap();
    shelf(&dir)
        .env("SHELF_ENV", "production")
        .arg("check-config")
        .assert()
        .failure();
}
