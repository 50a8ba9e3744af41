use std::process::Command;
use tempfile::TempDir;

fn folio(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_folio"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run folio")
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().to_str().unwrap();

    let output = folio(&["--src-dir", src, "init"]);
    assert!(output.status.success());

    let config_path = temp_dir.path().join("folio.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("theme = \"default\""));
    assert!(content.contains("[watch]"));
    assert!(content.contains("debounce_ms = 100"));

    // A second init without --force refuses to overwrite
    let output = folio(&["--src-dir", src, "init"]);
    assert!(!output.status.success());

    let output = folio(&["--src-dir", src, "init", "--force"]);
    assert!(output.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let config_content = r#"
out_dir = "public"

[watch]
debounce_ms = 250
"#;
    std::fs::write(temp_dir.path().join("folio.toml"), config_content).unwrap();

    let output = folio(&[
        "--src-dir",
        temp_dir.path().to_str().unwrap(),
        "--theme",
        "blog",
        "config",
    ]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("out_dir = \"public\""));
    assert!(stdout.contains("debounce_ms = 250"));
    // CLI wins over the file
    assert!(stdout.contains("theme = \"blog\""));
}

#[test]
fn test_build_command() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join("blog")).unwrap();
    std::fs::write(root.join("folio.toml"), "").unwrap();
    std::fs::write(root.join("index.md"), "# home").unwrap();
    std::fs::write(root.join("blog/post1.md"), "# post").unwrap();
    std::fs::write(root.join("_layout.tsx"), "").unwrap();

    let out = root.join("dist");
    let output = folio(&[
        "--src-dir",
        root.to_str().unwrap(),
        "--out-dir",
        out.to_str().unwrap(),
        "build",
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert!(out.join("index.md").exists());
    assert!(out.join("blog/post1.md").exists());
    assert!(!out.join("_layout.tsx").exists());
    assert!(!out.join("folio.toml").exists());
}

#[test]
fn test_unknown_plugin_fails_build() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    std::fs::write(root.join("folio.toml"), "plugins = [\"clean\", \"md\"]\n").unwrap();
    std::fs::write(root.join("index.md"), "# home").unwrap();

    let out = root.join("dist");
    let output = folio(&[
        "--src-dir",
        root.to_str().unwrap(),
        "--out-dir",
        out.to_str().unwrap(),
        "build",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown plugin 'md'"));
}
