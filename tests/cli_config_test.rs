use std::process::Command;
use tempfile::TempDir;

fn fsindex(dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_fsindex"));
    command.current_dir(dir);
    // Keep the host's settings out of the way.
    command.env_remove("FSINDEX_CONFIG");
    command
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();

    let output = fsindex(temp_dir.path())
        .arg("init")
        .output()
        .expect("Failed to run init command");
    assert!(output.status.success());

    let config_path = temp_dir.path().join(".fsindex/settings.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[indexing]"));
    assert!(content.contains("[watch]"));
    assert!(content.contains("debounce_ms = 2000"));

    // A second init without --force refuses to overwrite.
    let again = fsindex(temp_dir.path()).arg("init").output().unwrap();
    assert!(!again.status.success());

    let forced = fsindex(temp_dir.path())
        .args(["init", "--force"])
        .output()
        .unwrap();
    assert!(forced.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".fsindex");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("settings.toml"),
        "version = 2\n[search]\nlimit = 33\n",
    )
    .unwrap();

    let output = fsindex(temp_dir.path())
        .arg("config")
        .output()
        .expect("Failed to run config command");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("limit = 33"));
}

#[test]
fn test_index_then_search_json() {
    let temp_dir = TempDir::new().unwrap();
    let tree = temp_dir.path().join("tree");
    std::fs::create_dir_all(tree.join("logs")).unwrap();
    std::fs::write(tree.join("logs/build.log"), "x").unwrap();

    let config_path = temp_dir.path().join("settings.toml");
    std::fs::write(
        &config_path,
        format!(
            "index_path = {:?}\n[indexing]\nroots = [{:?}]\n",
            temp_dir.path().join("index"),
            tree
        ),
    )
    .unwrap();

    let index = fsindex(temp_dir.path())
        .arg("--config")
        .arg(&config_path)
        .arg("index")
        .output()
        .unwrap();
    assert!(index.status.success(), "{}", String::from_utf8_lossy(&index.stderr));

    let search = fsindex(temp_dir.path())
        .arg("--config")
        .arg(&config_path)
        .args(["search", "buidl", "--json"])
        .output()
        .unwrap();
    assert!(search.status.success());

    let results: serde_json::Value = serde_json::from_slice(&search.stdout).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["file_name"], "build.log");
}
