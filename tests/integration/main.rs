//! Integration tests for nodemap

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use serde_json::{json, Value};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Command isolated from any user config and data directory
    fn nodemap(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("nodemap");
        cmd.env("NODEMAP_CONFIG", dir.path().join("config.toml"))
            .env("NODEMAP_DATA_DIR", dir.path().join("data"))
            .env_remove("RUST_LOG");
        cmd
    }

    fn write_json(path: &Path, value: &Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn cache_fixture() -> Value {
        let seen = "2025-01-01T00:00:00Z";
        json!({
            "cached_at": seen,
            "package_count": 2,
            "version_count": 3,
            "metadata_entries": 3,
            "packages": {
                "math-nodes": {
                    "metadata": {
                        "id": "math-nodes",
                        "name": "Math Nodes",
                        "repository": "https://github.com/acme/math-nodes.git",
                        "downloads": 10000,
                        "github_stars": 500
                    },
                    "versions": {
                        "1.0.0": {
                            "metadata": {"version": "1.0.0", "createdAt": "2024-01-01T00:00:00Z"},
                            "first_seen": seen,
                            "node_definitions": [
                                {"comfy_node_name": "Add", "input_types": {"required": {"a": ["INT"], "b": ["INT"]}}}
                            ]
                        },
                        "0.9.0": {
                            "metadata": {"version": "0.9.0", "deprecated": true},
                            "first_seen": seen,
                            "node_definitions": [{"comfy_node_name": "OldAdd"}]
                        }
                    },
                    "first_seen": seen
                },
                "image-io": {
                    "metadata": {
                        "id": "image-io",
                        "repository": "https://github.com/acme/image-io",
                        "downloads": 50
                    },
                    "versions": {
                        "2.1.0": {
                            "metadata": {"version": "2.1.0", "createdAt": "2025-01-01T00:00:00Z"},
                            "first_seen": seen,
                            "node_definitions": [{"comfy_node_name": "LoadImage"}]
                        }
                    },
                    "first_seen": seen
                }
            }
        })
    }

    fn community_fixture() -> Value {
        json!({
            "https://raw.githubusercontent.com/acme/math-nodes/main/nodes.py": [["Add", "Multiply"], {}],
            "https://github.com/acme/image-io.git": [["LoadImage"], {}],
            "https://github.com/someone/extra": [["Multiply"], {"title_aux": "Extra Nodes"}]
        })
    }

    fn setup(dir: &TempDir) {
        let data = dir.path().join("data");
        write_json(&data.join("registry_cache.json"), &cache_fixture());
        write_json(&data.join("extension-node-map.json"), &community_fixture());
    }

    fn read_mappings(dir: &TempDir) -> Value {
        let text = fs::read_to_string(dir.path().join("data").join("node_mappings.json")).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        nodemap(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("node to package index builder"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        nodemap(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("nodemap"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        nodemap(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        nodemap(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[registry]"))
            .stdout(predicate::str::contains("[scoring]"));
    }

    #[test]
    fn config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        nodemap(&dir).args(["config", "init"]).assert().success();
        let written = fs::read_to_string(dir.path().join("config.toml")).unwrap();
        assert!(written.contains("fresh_days"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), "[registry\nbroken").unwrap();
        nodemap(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn build_without_cache_fails_with_hint() {
        let dir = TempDir::new().unwrap();
        nodemap(&dir)
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cache file not found"))
            .stderr(predicate::str::contains("nodemap fetch"));
    }

    #[test]
    fn build_merges_community_data() {
        let dir = TempDir::new().unwrap();
        setup(&dir);

        nodemap(&dir).arg("build").assert().success();
        let doc = read_mappings(&dir);
        let mappings = doc["mappings"].as_object().unwrap();

        let add_key = mappings
            .keys()
            .find(|k| k.starts_with("Add::") && k.as_str() != "Add::_")
            .unwrap();
        assert_eq!(mappings[add_key][0]["package_id"], "math-nodes");
        assert_eq!(mappings[add_key][0]["versions"], json!(["1.0.0"]));
        assert!(mappings[add_key][0].get("source").is_none());

        // Deprecated versions contribute nothing
        assert!(!mappings.keys().any(|k| k.starts_with("OldAdd::")));

        let multiply = mappings["Multiply::_"].as_array().unwrap();
        assert_eq!(multiply.len(), 2);
        assert_eq!(multiply[0]["package_id"], "math-nodes");
        assert_eq!(multiply[0]["rank"], 1);
        assert_eq!(multiply[0]["source"], "community");
        assert_eq!(multiply[1]["package_id"], "community:someone_extra");
        assert_eq!(multiply[1]["rank"], 2);

        // Registry entry already provides this key
        let load = mappings["LoadImage::_"].as_array().unwrap();
        assert_eq!(load.len(), 1);
        assert!(load[0].get("source").is_none());

        let extra = &doc["packages"]["community:someone_extra"];
        assert_eq!(extra["synthetic"], true);
        assert_eq!(extra["display_name"], "Extra Nodes");
        assert_eq!(doc["stats"]["augmentation"]["synthetic_packages"], 1);
    }

    #[test]
    fn build_no_augment_is_registry_only() {
        let dir = TempDir::new().unwrap();
        setup(&dir);

        nodemap(&dir).args(["build", "--no-augment"]).assert().success();
        let doc = read_mappings(&dir);
        assert!(doc["stats"].get("augmentation").is_none());
        assert!(doc["mappings"].get("Multiply::_").is_none());
        assert_eq!(doc["stats"]["packages"], 2);
    }

    #[test]
    fn build_applies_schema() {
        let dir = TempDir::new().unwrap();
        setup(&dir);
        let schema = dir.path().join("schema.toml");
        fs::write(&schema, "[packages]\nversions = false\n").unwrap();

        nodemap(&dir)
            .args(["build", "--schema"])
            .arg(&schema)
            .assert()
            .success();
        let doc = read_mappings(&dir);
        assert!(doc["packages"]["math-nodes"].get("versions").is_none());
        assert_eq!(doc["packages"]["math-nodes"]["display_name"], "Math Nodes");
    }

    #[test]
    fn built_mappings_validate() {
        let dir = TempDir::new().unwrap();
        setup(&dir);

        nodemap(&dir).arg("build").assert().success();
        nodemap(&dir)
            .arg("validate")
            .assert()
            .success()
            .stdout(predicate::str::contains("All checks passed"));
    }

    #[test]
    fn validate_rejects_broken_ranks() {
        let dir = TempDir::new().unwrap();
        setup(&dir);
        nodemap(&dir).arg("build").assert().success();

        let path = dir.path().join("data").join("node_mappings.json");
        let mut doc = read_mappings(&dir);
        doc["mappings"]["Multiply::_"][1]["rank"] = json!(5);
        write_json(&path, &doc);

        nodemap(&dir)
            .arg("validate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Validation failed"));
    }

    #[test]
    fn corrupt_cache_fails_validation_load() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("broken.json");
        fs::write(&cache, "{ not json").unwrap();

        nodemap(&dir)
            .args(["validate", "--cache"])
            .arg(&cache)
            .assert()
            .failure()
            .stderr(predicate::str::contains("is corrupt"));
    }
}
