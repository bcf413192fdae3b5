use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn inci_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("inci");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(
        data_dir.join("incidencias.csv"),
        "Proyecto,Descripción,Estado\n\
         Atlas,caída del servidor de correo corporativo,Abierta\n\
         Borealis,impresora de planta sin tóner desde el lunes,Cerrada\n\
         Atlas,lentitud extrema en el acceso a la intranet,Abierta\n",
    )
    .unwrap();

    // The embedding endpoint is deliberately unreachable: every vector
    // degrades to zeros, which must never fail ingestion.
    let config_content = format!(
        r#"[store]
path = "{}/store"

[embedding]
provider = "remote"
dims = 8
url = "http://127.0.0.1:9"
timeout_secs = 1

[ingest]
data_dir = "{}/data"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("inci.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_inci(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = inci_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run inci binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn run_json(config_path: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, success) = run_inci(config_path, args);
    assert!(
        success,
        "inci {:?} failed: stdout={}, stderr={}",
        args, stdout, stderr
    );
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("non-JSON output for {:?}: {} ({})", args, stdout, e))
}

#[test]
fn test_init_creates_collection() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_inci(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_inci(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_inci(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_reports_loaded_count() {
    let (_tmp, config_path) = setup_test_env();

    run_inci(&config_path, &["init"]);
    let report = run_json(&config_path, &["ingest", "incidencias.csv"]);
    assert_eq!(report["success"], true);
    assert_eq!(report["incidents_loaded"], 3);
    assert_eq!(report["source_type"], "file");
}

#[test]
fn test_reingest_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    run_inci(&config_path, &["init"]);
    run_json(&config_path, &["ingest", "incidencias.csv"]);
    run_json(&config_path, &["ingest", "incidencias.csv"]);

    let stats = run_json(&config_path, &["stats"]);
    assert_eq!(stats["total_incidents"], 3);
    assert_eq!(stats["has_data"], true);
}

#[test]
fn test_ingest_missing_file_is_error_envelope() {
    let (_tmp, config_path) = setup_test_env();

    run_inci(&config_path, &["init"]);
    let report = run_json(&config_path, &["ingest", "no-existe.csv"]);
    assert!(report.get("success").is_none());
    assert!(report["error"].as_str().unwrap().contains("no-existe.csv"));
}

#[test]
fn test_search_with_degraded_vectors_finds_nothing() {
    let (_tmp, config_path) = setup_test_env();

    run_inci(&config_path, &["init"]);
    run_json(&config_path, &["ingest", "incidencias.csv"]);

    // Zero-vector query against zero-vector entries: similarity 0 for all,
    // strictly below the relevance threshold.
    let response = run_json(&config_path, &["search", "fallo de correo"]);
    assert_eq!(response["total_found"], 0);
    assert_eq!(response["similar_incidents"].as_array().unwrap().len(), 0);
    assert!(response.get("error").is_none());
}

#[test]
fn test_galaxy_groups_projects() {
    let (_tmp, config_path) = setup_test_env();

    run_inci(&config_path, &["init"]);
    run_json(&config_path, &["ingest", "incidencias.csv"]);

    let galaxy = run_json(&config_path, &["galaxy"]);
    assert_eq!(galaxy["success"], true);
    assert_eq!(galaxy["total_incidents"], 3);
    assert_eq!(galaxy["total_projects"], 2);

    let suns = galaxy["suns"].as_array().unwrap();
    let atlas = suns
        .iter()
        .find(|s| s["name"] == "Atlas")
        .expect("Atlas sun missing");
    assert_eq!(atlas["incident_count"], 2);
    assert_eq!(atlas["has_more"], false);
}

#[test]
fn test_galaxy_cache_regenerates_after_new_ingest() {
    let (tmp, config_path) = setup_test_env();

    run_inci(&config_path, &["init"]);
    run_json(&config_path, &["ingest", "incidencias.csv"]);
    let first = run_json(&config_path, &["galaxy"]);
    assert_eq!(first["total_incidents"], 3);

    fs::write(
        tmp.path().join("data").join("extra.csv"),
        "id,Proyecto,Descripción\nnuevo-1,Cetus,fallo aislado en la centralita\n",
    )
    .unwrap();
    run_json(&config_path, &["ingest", "extra.csv"]);

    let second = run_json(&config_path, &["galaxy"]);
    assert_eq!(second["total_incidents"], 4);
    assert_eq!(second["total_projects"], 3);
}

#[test]
fn test_clear_empties_collection() {
    let (_tmp, config_path) = setup_test_env();

    run_inci(&config_path, &["init"]);
    run_json(&config_path, &["ingest", "incidencias.csv"]);

    let cleared = run_json(&config_path, &["clear"]);
    assert_eq!(cleared["success"], true);

    let stats = run_json(&config_path, &["stats"]);
    assert_eq!(stats["total_incidents"], 0);
    assert_eq!(stats["has_data"], false);
}
