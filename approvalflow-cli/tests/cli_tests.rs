use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

struct Sandbox {
    _dir: TempDir,
    config: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.toml");
        let store = dir.path().join("approvalworkflow.json");
        write_config(&config, &store);
        Self { _dir: dir, config }
    }

    fn run(&self, args: &[&str]) -> Result<String, String> {
        let output = Command::new(env!("CARGO_BIN_EXE_approvalflow"))
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .env("RUST_LOG", "off")
            .output()
            .map_err(|e| format!("Failed to run approvalflow: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("Command failed: {}", stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_json(&self, args: &[&str]) -> Value {
        let mut with_json = vec!["--json"];
        with_json.extend_from_slice(args);
        let stdout = self.run(&with_json).unwrap();
        serde_json::from_str(&stdout).unwrap()
    }
}

fn write_config(config: &Path, store: &Path) {
    let content = format!(
        r#"log_level = "warn"
store_path = "{}"

[[roles]]
name = "Admin"
system = true

[[roles]]
name = "PropertyManager"

[[roles]]
name = "EstatesOfficer"

[[hierarchy]]
parent = "Admin"
child = "PropertyManager"

[[hierarchy]]
parent = "PropertyManager"
child = "EstatesOfficer"
"#,
        store.display().to_string().replace('\\', "\\\\")
    );
    std::fs::write(config, content).unwrap();
}

#[test]
fn test_help_lists_commands() {
    let sandbox = Sandbox::new();
    let help = sandbox.run(&["--help"]).unwrap();
    for command in ["roles", "create", "decide", "cancel", "pending", "audit"] {
        assert!(help.contains(command), "help is missing '{}'", command);
    }
}

#[test]
fn test_can_satisfy_follows_hierarchy() {
    let sandbox = Sandbox::new();
    assert_eq!(
        sandbox
            .run(&["roles", "can-satisfy", "Admin", "EstatesOfficer"])
            .unwrap(),
        "true"
    );
    assert_eq!(
        sandbox
            .run(&["roles", "can-satisfy", "EstatesOfficer", "Admin"])
            .unwrap(),
        "false"
    );
}

#[test]
fn test_workflow_lifecycle() {
    let sandbox = Sandbox::new();
    let created = sandbox.run_json(&[
        "create",
        "--module",
        "Lease",
        "--entity-id",
        "L-42",
        "--entity-type",
        "LeaseTermination",
        "--created-by",
        "clerk",
        "--stage",
        "PropertyManager",
        "--stage",
        "EstatesOfficer:optional",
        "--meta",
        "amount=1200",
    ]);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "pending");
    assert_eq!(created["metadata"]["amount"], 1200);

    let pending = sandbox.run_json(&["pending", "--module", "Lease", "--role", "Admin"]);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    // Stage 2 waits for stage 1
    assert!(sandbox
        .run(&["decide", &id, "2", "--role", "Admin", "--actor", "a", "--approve"])
        .is_err());

    let decided = sandbox.run_json(&[
        "decide", &id, "1", "--role", "Admin", "--actor", "admin-1", "--approve",
    ]);
    assert_eq!(decided["status"], "pending");

    let decided = sandbox.run_json(&[
        "decide",
        &id,
        "2",
        "--role",
        "EstatesOfficer",
        "--actor",
        "eo-1",
        "--reject",
        "--comments",
        "not needed",
    ]);
    // Nothing follows a rejected final stage, and only approving it approves
    assert_eq!(decided["status"], "rejected");

    let audit = sandbox.run_json(&["audit", &id]);
    let actions: Vec<&str> = audit
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["create", "approve", "reject", "status_change"]);

    let rejected = sandbox.run_json(&["list", "--module", "Lease", "--status", "rejected"]);
    assert_eq!(rejected.as_array().unwrap().len(), 1);
    let approved = sandbox.run_json(&["list", "--module", "Lease", "--status", "approved"]);
    assert!(approved.as_array().unwrap().is_empty());
}

#[test]
fn test_cancel_blocks_decisions() {
    let sandbox = Sandbox::new();
    let created = sandbox.run_json(&[
        "create",
        "--module",
        "Billing",
        "--entity-id",
        "INV-7",
        "--entity-type",
        "InvoiceCancellation",
        "--created-by",
        "clerk",
        "--stage",
        "Admin",
    ]);
    let id = created["id"].as_str().unwrap().to_string();

    let cancelled = sandbox.run_json(&["cancel", &id, "--actor", "clerk", "--reason", "duplicate"]);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["comments"], "duplicate");

    assert!(sandbox
        .run(&["decide", &id, "1", "--role", "Admin", "--actor", "admin-1", "--approve"])
        .is_err());

    sandbox.run(&["delete", &id, "--actor", "admin-1"]).unwrap();
    assert!(sandbox.run(&["show", &id]).is_err());
}

#[test]
fn test_add_edge_persists_and_rejects_cycles() {
    let sandbox = Sandbox::new();
    sandbox
        .run(&["roles", "add", "Caretaker", "--description", "On-site"])
        .unwrap();
    sandbox
        .run(&["roles", "add-edge", "EstatesOfficer", "Caretaker"])
        .unwrap();

    // A fresh process sees the new delegation
    assert_eq!(
        sandbox
            .run(&["roles", "can-satisfy", "Admin", "Caretaker"])
            .unwrap(),
        "true"
    );
    assert!(sandbox
        .run(&["roles", "add-edge", "Caretaker", "Admin"])
        .is_err());
}

#[test]
fn test_role_history_survives_restart() {
    let sandbox = Sandbox::new();
    let added = sandbox.run_json(&[
        "roles",
        "add",
        "Caretaker",
        "--actor",
        "admin-1",
    ]);
    sandbox
        .run(&["roles", "add-edge", "EstatesOfficer", "Caretaker", "--actor", "admin-1"])
        .unwrap();

    let listed = sandbox.run_json(&["roles", "list"]);
    let caretaker = listed["roles"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "Caretaker")
        .unwrap();
    assert_eq!(caretaker["id"], added["id"]);

    let history = sandbox.run_json(&["roles", "history", "Caretaker"]);
    let actions: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["create", "assign"]);
    assert!(history
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["performed_by"] == "admin-1"));
}

#[test]
fn test_seeded_role_ids_are_stable() {
    let sandbox = Sandbox::new();
    let ids = |listing: &Value, key: &str| -> Vec<String> {
        let mut ids: Vec<String> = listing[key]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["id"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        ids
    };

    let first = sandbox.run_json(&["roles", "list"]);
    let second = sandbox.run_json(&["roles", "list"]);
    assert_eq!(ids(&first, "roles"), ids(&second, "roles"));
    assert_eq!(ids(&first, "hierarchy"), ids(&second, "hierarchy"));
}

#[test]
fn test_metadata_that_would_lose_information_stays_text() {
    let sandbox = Sandbox::new();
    let created = sandbox.run_json(&[
        "create",
        "--module",
        "Billing",
        "--entity-id",
        "INV-8",
        "--entity-type",
        "InvoiceCancellation",
        "--created-by",
        "clerk",
        "--stage",
        "Admin",
        "--meta",
        "ref=NaN",
        "--meta",
        "code=007",
    ]);
    assert_eq!(created["metadata"]["ref"], "NaN");
    assert_eq!(created["metadata"]["code"], "007");

    // The store is still readable afterwards
    let id = created["id"].as_str().unwrap();
    let shown = sandbox.run_json(&["show", id]);
    assert_eq!(shown["metadata"]["code"], "007");
}
