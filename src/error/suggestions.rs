//! Context-aware error suggestions.
//!
//! Complements the static suggestions in the `codes` module with hints that
//! name the concrete change or lock involved.

use serde_json::Value;

use super::codes::ErrorCode;

/// Generate a context-aware suggestion for an error.
///
/// Falls back to [`ErrorCode::suggestion`] when the context does not carry
/// the fields a richer hint needs.
pub fn suggest_for_error(code: ErrorCode, context: Option<&Value>) -> String {
    match code {
        ErrorCode::ChangeNotFound => suggest_change_not_found(context),
        ErrorCode::ChangeOrphaned => suggest_orphaned(context),
        ErrorCode::ChangeNotApplied => suggest_not_applied(context),
        ErrorCode::LockHeld => suggest_lock_held(context),
        ErrorCode::ManifestReferenceMissing => suggest_manifest_reference(context),
        _ => code.suggestion().to_string(),
    }
}

fn str_field<'a>(context: Option<&'a Value>, key: &str) -> Option<&'a str> {
    context.and_then(|c| c.get(key)).and_then(Value::as_str)
}

fn suggest_change_not_found(context: Option<&Value>) -> String {
    match str_field(context, "change") {
        Some(name) => format!(
            "Change '{name}' not found. Try:\n  - `shift list` to see known changes\n  - `shift new \"{name}\"` to create it"
        ),
        None => ErrorCode::ChangeNotFound.suggestion().to_string(),
    }
}

fn suggest_orphaned(context: Option<&Value>) -> String {
    match str_field(context, "change") {
        Some(name) => format!(
            "The folder for '{name}' is gone but its history remains. Restore the folder, or run `shift remove {name} --db`"
        ),
        None => ErrorCode::ChangeOrphaned.suggestion().to_string(),
    }
}

fn suggest_not_applied(context: Option<&Value>) -> String {
    match str_field(context, "change") {
        Some(name) => format!("'{name}' has nothing to revert. Apply it with `shift run {name}`"),
        None => ErrorCode::ChangeNotApplied.suggestion().to_string(),
    }
}

fn suggest_lock_held(context: Option<&Value>) -> String {
    let holder = str_field(context, "holder");
    let target = str_field(context, "target");
    match (holder, target) {
        (Some(holder), Some(target)) => format!(
            "'{target}' is locked by {holder}. Retry with `--wait`, or if the holder is gone run `shift lock force-release`"
        ),
        _ => ErrorCode::LockHeld.suggestion().to_string(),
    }
}

fn suggest_manifest_reference(context: Option<&Value>) -> String {
    match str_field(context, "reference") {
        Some(reference) => format!(
            "Create '{reference}' under the schema directory or remove it from the manifest"
        ),
        None => ErrorCode::ManifestReferenceMissing.suggestion().to_string(),
    }
}
