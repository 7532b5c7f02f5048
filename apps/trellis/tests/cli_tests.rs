//! End-to-end tests of the CLI commands against a temporary redb database.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use trellis::cli::{self, Cli, open_session};
use trellis::config::load_settings;
use trellis::demo::MISSION;
use trellis::render::render_object;
use trellis_core::{Settings, TrellisError};

fn database() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("trellis.db");
    (dir, path)
}

fn run(db: &Path, args: &[&str]) -> Result<(), TrellisError> {
    let mut argv = vec!["trellis", "--quiet", "--database", db.to_str().expect("utf-8 path")];
    argv.extend_from_slice(args);
    cli::execute(Cli::try_parse_from(argv).expect("parse arguments"))
}

fn seeded() -> (TempDir, PathBuf) {
    let (dir, db) = database();
    run(&db, &["init"]).expect("init");
    run(&db, &["demo"]).expect("demo");
    (dir, db)
}

// =============================================================================
// INIT
// =============================================================================

#[test]
fn init_refuses_existing_database_without_force() {
    let (_dir, db) = database();
    run(&db, &["init"]).expect("first init");

    let err = run(&db, &["init"]).unwrap_err();
    assert!(matches!(err, TrellisError::Config(_)));

    run(&db, &["init", "--force"]).expect("forced init");
}

#[test]
fn forced_init_empties_the_database() {
    let (_dir, db) = seeded();
    run(&db, &["init", "--force"]).expect("forced init");

    let session = open_session(&db, &Settings::default()).expect("open");
    assert!(session.backend().is_empty().expect("len"));
}

// =============================================================================
// DEMO
// =============================================================================

#[test]
fn demo_writes_mission_and_ships() {
    let (_dir, db) = seeded();
    let session = open_session(&db, &Settings::default()).expect("open");
    // Pilots are embedded in the mission record.
    assert_eq!(session.backend().len().expect("len"), 3);
}

#[test]
fn demo_twice_overwrites_by_name() {
    let (_dir, db) = seeded();
    run(&db, &["demo"]).expect("second demo");
    let session = open_session(&db, &Settings::default()).expect("open");
    assert_eq!(session.backend().len().expect("len"), 3);
}

#[test]
fn records_command_dumps_in_both_modes() {
    let (_dir, db) = seeded();
    run(&db, &["records"]).expect("records");
    run(&db, &["records", "--json-mode"]).expect("records json");
    run(&db, &["status", "--json-mode"]).expect("status");
}

// =============================================================================
// LOAD
// =============================================================================

#[test]
fn depth_zero_stubs_referenced_ships() {
    let (_dir, db) = seeded();
    let mut session = open_session(&db, &Settings::default()).expect("open");
    session.set_activation_depth(0);
    let mission = session.require("Mission", MISSION, None).expect("load");

    let json = render_object(&session, mission).expect("render");
    assert_eq!(json["name"], MISSION);
    assert_eq!(json["pilots"][0]["name"], "bob");
    let ship = &json["pilots"][0]["ship"];
    assert_eq!(ship["$activated"], false);
    assert_eq!(ship["name"], "hawk");
    assert!(ship["dest"].is_null());
}

#[test]
fn unbounded_load_closes_the_escort_cycle() {
    let (_dir, db) = seeded();
    let mut session = open_session(&db, &Settings::default()).expect("open");
    let mission = session.require("Mission", MISSION, None).expect("load");

    let json = render_object(&session, mission).expect("render");
    let hawk = &json["pilots"][0]["ship"];
    assert_eq!(hawk["dest"], "MARS");
    assert_eq!(hawk["escort"]["name"], "kite");
    assert_eq!(hawk["escort"]["dest"], "VENUS");
    assert!(hawk["escort"]["escort"].get("$ref").is_some());
    assert!(json["pilots"][1]["ship"].get("$ref").is_some());
}

#[test]
fn load_command_accepts_depth() {
    let (_dir, db) = seeded();
    run(&db, &["load", "-t", "Mission", "-i", MISSION, "--depth", "1"]).expect("load");
    run(&db, &["load", "-t", "RocketShip", "-i", "kite", "--json-mode"]).expect("load ship");
}

#[test]
fn loading_a_missing_entity_fails() {
    let (_dir, db) = seeded();
    let err = run(&db, &["load", "-t", "Mission", "-i", "apollo"]).unwrap_err();
    assert!(matches!(err, TrellisError::NotFound(_)));
}

#[test]
fn loading_an_unknown_type_fails() {
    let (_dir, db) = seeded();
    let err = run(&db, &["load", "-t", "Comet", "-i", "1"]).unwrap_err();
    assert!(matches!(err, TrellisError::UnknownType(_)));
}

// =============================================================================
// DELETE
// =============================================================================

#[test]
fn delete_removes_only_the_named_record() {
    let (_dir, db) = seeded();
    run(&db, &["delete", "-t", "Mission", "-i", MISSION]).expect("delete");

    let mut session = open_session(&db, &Settings::default()).expect("open");
    assert_eq!(session.backend().len().expect("len"), 2);
    assert!(session.load("Mission", MISSION, None).expect("load").is_none());
    assert!(session.load("RocketShip", "hawk", None).expect("load").is_some());
}

// =============================================================================
// SETTINGS
// =============================================================================

#[test]
fn settings_file_sets_session_depth() {
    let (dir, db) = seeded();
    let config = dir.path().join("trellis.toml");
    std::fs::write(&config, "activation_depth = 0\n").expect("write settings");

    let settings = load_settings(Some(&config)).expect("settings");
    {
        let session = open_session(&db, &settings).expect("open");
        assert_eq!(session.activation_depth(), 0);
    }

    let config = config.to_str().expect("utf-8 path");
    run(&db, &["--config", config, "load", "-t", "Mission", "-i", MISSION]).expect("load");
}

#[test]
fn malformed_settings_file_is_rejected() {
    let (dir, db) = database();
    let config = dir.path().join("trellis.toml");
    std::fs::write(&config, "activation_depth = [").expect("write settings");

    let config = config.to_str().expect("utf-8 path");
    let err = run(&db, &["--config", config, "status"]).unwrap_err();
    assert!(matches!(err, TrellisError::Config(_)));
}
