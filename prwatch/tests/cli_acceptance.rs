use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const SEEDED_TABLE: &str = "\
date,agent,total,merged
2025-06-01,codex,421000,360000
2025-06-01,copilot,900,350
2025-06-02,codex,421223,360271
2025-06-02,copilot,1000,400
";

struct CliTestEnv {
    _temp_dir: TempDir,
    site: PathBuf,
    xdg_state: PathBuf,
    xdg_runtime: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let site = base.join("site");
        let xdg_state = base.join("xdg-state");
        let xdg_runtime = base.join("xdg-runtime");

        fs::create_dir_all(&site).expect("failed to create site dir");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");
        fs::create_dir_all(&xdg_runtime).expect("failed to create XDG_RUNTIME_DIR");

        Self {
            _temp_dir: temp_dir,
            site,
            xdg_state,
            xdg_runtime,
        }
    }

    fn seeded() -> Self {
        let env = Self::new();
        fs::write(env.site.join("data.csv"), SEEDED_TABLE).expect("failed to seed data table");
        env
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.site.join(relative)
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    run_bin_in(env, &env.site, args)
}

fn run_bin_in(env: &CliTestEnv, cwd: &Path, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("prwatch"));

    Command::new(bin_path)
        .args(args)
        .current_dir(cwd)
        .env("HOME", env.site.parent().expect("temp base"))
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env("XDG_RUNTIME_DIR", &env.xdg_runtime)
        .env_remove("GITHUB_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute prwatch: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    assert!(
        output.status.success(),
        "command failed: prwatch {}\nstatus: {:?}\nstdout:\n{}\nstderr:\n{}",
        args.join(" "),
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn render_writes_all_artifacts_from_seeded_table() {
    let env = CliTestEnv::seeded();
    let args = ["render"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(stdout(&output).contains("Rendered artifacts: 4 changed"));

    let readme = fs::read_to_string(env.path("README.md")).expect("README.md missing");
    assert!(readme.contains("| Copilot | 1,000 | 400 | 40.0% |"));
    assert!(readme.contains("| Codex | 421,223 | 360,271 | 85.5% |"));
    assert!(readme.contains("_Last updated: June 02, 2025_"));

    let index = fs::read_to_string(env.path("docs/index.html")).expect("index.html missing");
    assert!(index.contains("<meta http-equiv=\"refresh\" content=\"3600\">"));
    assert!(index.contains("<canvas id=\"prChart\""));

    let chart: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(env.path("docs/chart-data.json")).expect("chart data missing"),
    )
    .expect("chart data is not JSON");
    assert_eq!(chart["labels"], serde_json::json!(["2025-06-01", "2025-06-02"]));

    let png = fs::read(env.path("docs/chart.png")).expect("chart image missing");
    assert_eq!(&png[..4], b"\x89PNG");

    // The table itself is never rewritten by render.
    assert_eq!(
        fs::read_to_string(env.path("data.csv")).unwrap(),
        SEEDED_TABLE
    );
}

#[test]
fn render_twice_reports_no_changes() {
    let env = CliTestEnv::seeded();
    assert_success(&["render"], &run_bin(&env, &["render"]));
    let readme = fs::read(env.path("README.md")).unwrap();

    let output = run_bin(&env, &["render"]);
    assert_success(&["render"], &output);
    assert!(stdout(&output).contains("Rendered artifacts: 0 changed"));
    assert_eq!(fs::read(env.path("README.md")).unwrap(), readme);
}

#[test]
fn status_prints_latest_snapshot() {
    let env = CliTestEnv::seeded();
    let args = ["status"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let text = stdout(&output);
    assert!(text.contains("PR stats as of June 02, 2025"));
    assert!(text.contains("GitHub Copilot"));
    assert!(text.contains("85.5%"));
    assert!(text.contains("(no data)"));
    // Status is read-only.
    assert!(!env.path("README.md").exists());
}

#[test]
fn status_json_is_machine_readable() {
    let env = CliTestEnv::seeded();
    let args = ["status", "--json"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("status --json is not JSON");
    assert_eq!(value["as_of"], "2025-06-02");
    let agents = value["agents"].as_array().expect("agents array");
    assert_eq!(agents.len(), 5);
    assert_eq!(agents[0]["key"], "copilot");
    assert_eq!(agents[1]["key"], "codex");
    assert_eq!(agents[1]["rate"], 85.53);
    assert_eq!(agents[1]["stale"], false);
    assert_eq!(agents[2]["as_of"], serde_json::Value::Null);
}

#[test]
fn config_flag_resolves_paths_against_config_dir() {
    let env = CliTestEnv::new();
    let project = env.path("project");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("stats.csv"), SEEDED_TABLE).unwrap();
    fs::write(
        project.join("prwatch.toml"),
        "[output]\ndata_file = \"stats.csv\"\nchart_image = \"docs/chart.svg\"\n\n[dashboard]\nrefresh_secs = 600\n",
    )
    .unwrap();

    // Run from an unrelated directory.
    let config = project.join("prwatch.toml");
    let args = ["--config", config.to_str().unwrap(), "render"];
    let output = run_bin_in(&env, &env.site, &args);
    assert_success(&args, &output);

    assert!(project.join("docs/chart.svg").exists());
    let index = fs::read_to_string(project.join("docs/index.html")).unwrap();
    assert!(index.contains("content=\"600\""));
    assert!(!env.path("README.md").exists());
}

#[test]
fn malformed_table_fails_with_line_number() {
    let env = CliTestEnv::new();
    fs::write(
        env.path("data.csv"),
        "date,agent,total,merged\n2025-06-01,codex,10,20\n",
    )
    .unwrap();

    let output = run_bin(&env, &["status"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("data.csv:2"), "stderr:\n{stderr}");
}

#[test]
fn invalid_config_fails_at_startup() {
    let env = CliTestEnv::new();
    fs::write(
        env.path("prwatch.toml"),
        "[[agents]]\nkey = \"codex\"\nname = \"Codex\"\ndisplay_name = \"Codex\"\ncolor = \"red\"\ninfo_url = \"https://example.com\"\ntotal_query = \"is:pr\"\nmerged_query = \"is:pr is:merged\"\n",
    )
    .unwrap();

    let output = run_bin(&env, &["status"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid color"), "stderr:\n{stderr}");
}
