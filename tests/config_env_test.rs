use folio::config::{CONFIG_FILE_NAME, CliOverrides, Settings};
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_env_locates_project_and_overrides() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "theme = \"blog\"\n[watch]\ndebounce_ms = 300\n",
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("FOLIO_SRC_DIR", temp_dir.path());
        env::set_var("FOLIO_WATCH__DEBOUNCE_MS", "50");
    }

    let settings = Settings::load(&CliOverrides::default()).unwrap();

    // The file was found through FOLIO_SRC_DIR
    assert_eq!(settings.theme, "blog");
    assert_eq!(settings.src_dir, temp_dir.path());
    // Env wins over the file
    assert_eq!(settings.watch.debounce_ms, 50);

    // CLI wins over env
    let overrides = CliOverrides {
        src_dir: Some(PathBuf::from("elsewhere")),
        ..Default::default()
    };
    assert_eq!(
        Settings::config_path(&overrides),
        PathBuf::from("elsewhere").join(CONFIG_FILE_NAME)
    );
    let settings = Settings::load(&overrides).unwrap();
    assert_eq!(settings.src_dir, PathBuf::from("elsewhere"));
    assert_eq!(settings.theme, "default");

    unsafe {
        env::remove_var("FOLIO_SRC_DIR");
        env::remove_var("FOLIO_WATCH__DEBOUNCE_MS");
    }
}
