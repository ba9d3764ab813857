use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::Arc;

use dendrite_core::types::{CallStatus, RequestContext, ScopeFilter};
use dendrite_core::{ChatService, Config, Database, ToolRegistry};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("dendrite/threads.db")
    }

    /// Open the same store the binary uses, for seeding and inspection.
    fn service(&self) -> (Arc<Database>, ChatService) {
        let db = Arc::new(Database::open(&self.db_path()).expect("failed to open db"));
        db.migrate().expect("failed to migrate db");
        let registry = Arc::new(ToolRegistry::with_default_tools());
        let svc = ChatService::new(db.clone(), registry, &Config::default())
            .expect("failed to build service");
        (db, svc)
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("dendrite"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute dendrite: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "dendrite {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn init_creates_database_and_listings_read_it() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["init"]);
    assert_success(&["init"], &output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Database ready:"));

    let db_path = env.db_path();
    assert!(
        db_path.exists(),
        "database file should exist at {}",
        db_path.display()
    );

    // The binary's default acting user is "local"
    let thread_id = {
        let (_db, svc) = env.service();
        let ctx = RequestContext::new("local");
        let thread = svc
            .create_thread(&ctx, ScopeFilter::default())
            .expect("failed to create thread");
        svc.update_thread_title(&ctx, &thread.id, "thalamus deep dive")
            .expect("failed to set title");
        svc.append_user_message(&ctx, &thread.id, "what does the thalamus do")
            .expect("failed to append message");
        thread.id
    };

    let threads_output = run_bin(&env, &["threads"]);
    assert_success(&["threads"], &threads_output);
    let threads_stdout = String::from_utf8_lossy(&threads_output.stdout);
    assert!(threads_stdout.contains("Page 1/1"));
    assert!(
        threads_stdout.contains("thalamus deep dive"),
        "expected seeded thread in listing, got:\n{threads_stdout}"
    );

    let messages_output = run_bin(&env, &["messages", &thread_id]);
    assert_success(&["messages", &thread_id], &messages_output);
    let messages_stdout = String::from_utf8_lossy(&messages_output.stdout);
    assert!(messages_stdout.contains("what does the thalamus do"));
}

#[test]
fn tools_search_and_decide_work_on_seeded_database() {
    let env = CliTestEnv::new();

    let init_output = run_bin(&env, &["init"]);
    assert_success(&["init"], &init_output);

    let tools_output = run_bin(&env, &["tools"]);
    assert_success(&["tools"], &tools_output);
    let tools_stdout = String::from_utf8_lossy(&tools_output.stdout);
    assert!(tools_stdout.contains("resolve_brain_region"));
    assert!(tools_stdout.contains("literature_search"));
    assert!(tools_stdout.contains("run_simulation"));

    let (thread_id, call_id) = {
        let (_db, svc) = env.service();
        let ctx = RequestContext::new("local");
        let thread = svc
            .create_thread(&ctx, ScopeFilter::default())
            .expect("failed to create thread");
        svc.append_user_message(&ctx, &thread.id, "granule cell connectivity")
            .expect("failed to append message");
        let (_, calls) = svc
            .propose_tool_calls(
                &ctx,
                &thread.id,
                vec![dendrite_core::ProposedCall {
                    tool_name: "run_simulation".to_string(),
                    arguments: serde_json::json!({
                        "circuit_id": "5a3f1a66-46b1-4e9e-8e8c-3f86f54be0e1"
                    }),
                    partial: false,
                }],
            )
            .expect("failed to propose call");
        (thread.id, calls[0].call_id.clone())
    };

    let search_output = run_bin(&env, &["search", "granule"]);
    assert_success(&["search", "granule"], &search_output);
    let search_stdout = String::from_utf8_lossy(&search_output.stdout);
    assert!(
        search_stdout.contains(&thread_id),
        "expected a hit for the seeded thread, got:\n{search_stdout}"
    );

    let decide_args = ["decide", thread_id.as_str(), call_id.as_str()];
    let decide_output = run_bin(&env, &decide_args);
    assert_success(&decide_args, &decide_output);
    let decide_stdout = String::from_utf8_lossy(&decide_output.stdout);
    assert!(decide_stdout.contains("Decision recorded"));

    let (db, _svc) = env.service();
    let call = db
        .get_tool_call(&call_id)
        .expect("failed to read call")
        .expect("call missing after decision");
    assert_eq!(call.status, CallStatus::Rejected);
}
