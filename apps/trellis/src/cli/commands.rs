//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands. Every
//! command opens the redb database at the given path, builds a session with
//! the demonstration schema and the loaded settings, and releases the
//! database again on return.

use crate::demo;
use crate::render::{render_object, render_record};
use std::path::Path;
use std::sync::Arc;
use trellis_core::{KeyId, RedbStore, Session, Settings, StoreError, TrellisError};

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new empty database.
pub fn cmd_init(db_path: &Path, settings: &Settings, force: bool) -> Result<(), TrellisError> {
    if db_path.exists() {
        if !force {
            return Err(TrellisError::Config(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| StoreError::Io(format!("Remove {}: {e}", db_path.display())))?;
    }

    let _store = RedbStore::open_with_group_limit(db_path, settings.transaction_group_limit)?;
    println!("Initialized new redb database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show database status and the effective settings.
pub fn cmd_status(db_path: &Path, settings: &Settings, json_mode: bool) -> Result<(), TrellisError> {
    let session = open_session(db_path, settings)?;
    let records = session.backend().len()?;

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "records": records,
            "settings": settings,
        });
        print_json(&output)?;
        return Ok(());
    }

    println!("Trellis Database Status");
    println!("=======================");
    println!("Database: {:?}", db_path);
    println!();
    println!("Records:          {}", records);
    match settings.activation_depth {
        Some(depth) => println!("Activation depth: {}", depth),
        None => println!("Activation depth: unbounded"),
    }
    println!("Index by default: {}", settings.index_by_default);
    println!("Group limit:      {}", settings.transaction_group_limit);

    Ok(())
}

// =============================================================================
// DEMO COMMAND
// =============================================================================

/// Store the demonstration mission.
pub fn cmd_demo(db_path: &Path, settings: &Settings, json_mode: bool) -> Result<(), TrellisError> {
    let mut session = open_session(db_path, settings)?;
    let key = demo::seed(&mut session)?;
    let records = session.backend().len()?;
    tracing::info!(%key, records, "stored demonstration mission");

    if json_mode {
        let output = serde_json::json!({
            "key": key.to_string(),
            "records": records,
        });
        print_json(&output)?;
    } else {
        println!("Stored {}", key);
        println!("Records: {}", records);
    }
    Ok(())
}

// =============================================================================
// RECORDS COMMAND
// =============================================================================

/// Dump every stored record.
pub fn cmd_records(db_path: &Path, settings: &Settings, json_mode: bool) -> Result<(), TrellisError> {
    let session = open_session(db_path, settings)?;
    let records = session.backend().records()?;

    if json_mode {
        let rendered = records
            .iter()
            .map(render_record)
            .collect::<Result<Vec<_>, _>>()?;
        print_json(&serde_json::Value::Array(rendered))?;
        return Ok(());
    }

    for record in &records {
        println!("{}", record.key);
        for (name, property) in record.properties.iter() {
            let marker = if property.indexed { "" } else { " (unindexed)" };
            println!("  {} = {:?}{}", name, property.value, marker);
        }
    }
    println!("{} record(s)", records.len());
    Ok(())
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Load an entity and print its object graph.
pub fn cmd_load(
    db_path: &Path,
    settings: &Settings,
    json_mode: bool,
    type_name: &str,
    id: &str,
    depth: Option<u32>,
) -> Result<(), TrellisError> {
    let mut session = open_session(db_path, settings)?;
    if let Some(depth) = depth {
        session.set_activation_depth(depth);
    }

    let object = session.require(type_name, parse_id(id), None)?;
    let rendered = render_object(&session, object)?;

    if !json_mode {
        println!(
            "Loaded {} object(s) at depth {}",
            session.key_cache().len(),
            session.activation_depth()
        );
    }
    print_json(&rendered)?;
    Ok(())
}

// =============================================================================
// DELETE COMMAND
// =============================================================================

/// Delete an entity's record. Referenced entities are left in place.
pub fn cmd_delete(
    db_path: &Path,
    settings: &Settings,
    json_mode: bool,
    type_name: &str,
    id: &str,
) -> Result<(), TrellisError> {
    let mut session = open_session(db_path, settings)?;
    session.set_activation_depth(0);
    let object = session.require(type_name, parse_id(id), None)?;
    let key = session.delete(object)?;

    if json_mode {
        print_json(&serde_json::json!({ "deleted": key.to_string() }))?;
    } else {
        println!("Deleted {}", key);
    }
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the database and build a session over it.
pub fn open_session(db_path: &Path, settings: &Settings) -> Result<Session<RedbStore>, TrellisError> {
    let store = RedbStore::open_with_group_limit(db_path, settings.transaction_group_limit)?;
    Session::builder(Arc::new(store))
        .schema(demo::schema())
        .settings(settings.clone())
        .build()
}

/// A numeric id when `id` parses as one, otherwise a name.
#[must_use]
pub fn parse_id(id: &str) -> KeyId {
    id.parse::<u64>()
        .map_or_else(|_| KeyId::from(id), KeyId::Id)
}

fn print_json(value: &serde_json::Value) -> Result<(), TrellisError> {
    println!("{}", json_text(value)?);
    Ok(())
}

fn json_text(value: &serde_json::Value) -> Result<String, TrellisError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::Serialization(format!("JSON output: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_parse_as_ids() {
        assert_eq!(parse_id("42"), KeyId::Id(42));
        assert_eq!(parse_id("hawk"), KeyId::Name("hawk".into()));
        assert_eq!(parse_id("-1"), KeyId::Name("-1".into()));
    }

    #[test]
    fn json_output_is_pretty_printed() {
        let text = json_text(&serde_json::json!({ "deleted": "Pilot(1)" }))
            .expect("serializable");
        assert_eq!(text, "{\n  \"deleted\": \"Pilot(1)\"\n}");
    }
}
