use std::fs;
use std::process::ExitCode;

use confshift_cli::{run_with, Output};
use confshift_core::{ConfShiftConfig, UnitRegistry};
use confshift_test_utils::*;
use pretty_assertions::assert_eq;

fn succeeded(code: ExitCode) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::SUCCESS)
}

fn workspace(units: &[&str]) -> Workspace {
    let ws = Workspace::with_units(units);
    ConfShiftConfig::write_template(ws.root().join("confshift.yaml")).unwrap();
    ws
}

fn confshift(ws: &Workspace, registry: &UnitRegistry, args: &[&str]) -> (bool, String) {
    let config = ws.root().join("confshift.yaml");
    let mut argv = vec![
        "confshift".to_string(),
        "-n".to_string(),
        "-c".to_string(),
        config.display().to_string(),
    ];
    argv.extend(args.iter().map(ToString::to_string));

    let out = Output::buffer();
    let code = run_with(argv, registry, out.clone());
    (succeeded(code), out.contents())
}

#[test]
fn test_init_writes_template_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("confshift.yaml");
    let registry = UnitRegistry::new();
    let args = ["confshift", "-n", "-c", config.to_str().unwrap(), "init"];

    let out = Output::buffer();
    assert!(succeeded(run_with(args, &registry, out.clone())));
    assert!(out.contents().starts_with("Created config file"));
    assert!(ConfShiftConfig::load(&config).is_ok());

    let out = Output::buffer();
    assert!(!succeeded(run_with(args, &registry, out.clone())));
    assert!(out.contents().contains("already exists"));
}

#[test]
fn test_init_into_directory() {
    let dir = tempfile::tempdir().unwrap();
    let registry = UnitRegistry::new();
    let target = dir.path().join("project");
    let args = ["confshift", "-n", "init", "--path", target.to_str().unwrap()];

    assert!(succeeded(run_with(args, &registry, Output::buffer())));
    assert!(target.join("confshift.yaml").exists());
}

#[test]
fn test_migrate_then_history() {
    let ws = workspace(&[SET_FOO_BAR, SET_FOO_BAZ]);
    let registry = foo_registry();

    let (ok, out) = confshift(&ws, &registry, &["migrate"]);
    assert!(ok, "{out}");
    assert!(out.contains("Warning, no environment specified; defaulting to 'default'"));
    assert!(out.contains("Batch id: 1\n"));
    assert!(out.contains("2 migration(s) found"));
    assert!(out.contains(&format!("Migrating {SET_FOO_BAR}... done")));
    assert!(out.contains("Completed in"));
    assert_eq!(ws.document(), yaml("foo: baz"));

    let (ok, out) = confshift(&ws, &registry, &["-e", "default", "history"]);
    assert!(ok, "{out}");
    assert!(out.contains("Using environment: default"));
    let rows: Vec<&str> = out.lines().filter(|l| l.contains(" | 1.")).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].ends_with(&format!("| 1.2      | {SET_FOO_BAZ}")));
    assert!(rows[1].ends_with(&format!("| 1.1      | {SET_FOO_BAR}")));
}

#[test]
fn test_history_empty() {
    let ws = workspace(&[]);
    let (ok, out) = confshift(&ws, &UnitRegistry::new(), &["history"]);
    assert!(ok);
    assert!(out.contains("No migrations found."));
}

#[test]
fn test_rollback_step() {
    let ws = workspace(&[SET_FOO_BAR, SET_FOO_BAZ]);
    let registry = foo_registry();
    assert!(confshift(&ws, &registry, &["migrate"]).0);

    let (ok, out) = confshift(&ws, &registry, &["rollback", "--step", "1"]);
    assert!(ok, "{out}");
    assert!(out.contains("Rolling back steps: 1"));
    assert!(out.contains(&format!("Rolling back {SET_FOO_BAZ}... done")));
    assert_eq!(ws.document(), yaml("foo: bar"));
    assert_eq!(ws.records().len(), 1);
}

#[test]
fn test_dry_run_prints_diff() {
    let ws = workspace(&[SET_FOO_BAR]);
    ws.write_document("other: 1\n");
    let registry = foo_registry();

    let (ok, out) = confshift(&ws, &registry, &["migrate", "--dry-run"]);
    assert!(ok, "{out}");
    assert!(out.contains("+foo: bar"));
    assert_eq!(ws.document_text(), "other: 1\n");
    assert!(ws.records().is_empty());
}

#[test]
fn test_failed_migrate_reports_error_and_time() {
    let ws = workspace(&[BROKEN]);
    let registry = UnitRegistry::new().with(BROKEN, failing_unit("boom"));

    let (ok, out) = confshift(&ws, &registry, &["migrate"]);
    assert!(!ok);
    assert!(out.contains(&format!(">> migration {BROKEN} failed: boom")));
    assert!(out.contains("Completed in"));
    assert!(ws.records().is_empty());
}

#[test]
fn test_stock_binary_explains_missing_registry() {
    let ws = workspace(&[SET_FOO_BAR]);

    let (ok, out) = confshift(&ws, &UnitRegistry::new(), &["migrate"]);
    assert!(!ok);
    assert!(out.contains(&format!(">> migration {SET_FOO_BAR} is not registered")));
    assert!(out.contains("This binary has no migrations compiled in"));

    let registry = UnitRegistry::new().with(SET_FOO_BAZ, failing_unit("unused"));
    let (ok, out) = confshift(&ws, &registry, &["migrate"]);
    assert!(!ok);
    assert!(out.contains("is not registered"));
    assert!(!out.contains("no migrations compiled in"));
}

#[test]
fn test_unknown_environment() {
    let ws = workspace(&[]);
    let (ok, out) = confshift(&ws, &UnitRegistry::new(), &["-e", "qa", "migrate"]);
    assert!(!ok);
    assert!(out.contains("environment `qa` is not configured"));
}

#[test]
fn test_create_scaffolds_unit() {
    let ws = workspace(&[]);
    let (ok, out) = confshift(&ws, &UnitRegistry::new(), &["create", "--name", "AddDatabase"]);
    assert!(ok, "{out}");

    let files: Vec<String> = fs::read_dir(ws.migrations_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("_add_database.rs"));

    let (ok, out) = confshift(&ws, &UnitRegistry::new(), &["create", "--name", "add-database"]);
    assert!(!ok);
    assert!(out.contains("is not valid"));
}

#[test]
fn test_mask() {
    let ws = workspace(&[]);
    ws.write_document("db:\n  user: admin\n  port: 5432\n");

    let (ok, out) = confshift(&ws, &UnitRegistry::new(), &["mask", "--dry-run"]);
    assert!(ok, "{out}");
    assert!(out.contains("(masked)"));
    assert!(!out.contains("admin"));
    assert_eq!(ws.document_text(), "db:\n  user: admin\n  port: 5432\n");

    let (ok, out) = confshift(&ws, &UnitRegistry::new(), &["mask"]);
    assert!(ok, "{out}");
    assert!(out.contains("The original has been backed up as"));
    assert_eq!(ws.document(), yaml("db: {user: (masked), port: (masked)}"));

    let backups = fs::read_dir(ws.root())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("config_"))
        .count();
    assert_eq!(backups, 1);
}
