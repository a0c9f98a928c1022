/// Edit scripts: a JSON description of fields and a sequence of editor
/// steps, replayed against an in-memory host.
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use richpad_history::{
    Command, CursorSnapshot, EditSessionTracker, FieldId, HistoryConfig, MemoryFieldHost,
    UndoRedoManager,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct Script {
    /// Placeholder text treated as blank content.
    #[serde(default)]
    pub placeholder: Option<String>,
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct FieldSpec {
    pub id: FieldId,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Replace a field's content as if typed.
    Edit {
        field: FieldId,
        content: String,
        #[serde(default)]
        cursor: Option<CursorSnapshot>,
    },
    /// Let the field's debounce timer elapse.
    Settle { field: FieldId },
    Blur { field: FieldId },
    Undo,
    Redo,
    ClearHistory,
    Enable { field: FieldId },
    Disable { field: FieldId },
}

/// Final state after a replay.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Report {
    pub fields: BTreeMap<String, String>,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub pending_actions: usize,
    pub action_in_progress: bool,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("Invalid script {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse edit script")
    }
}

/// Replays `script` and reports where the fields and history ended up.
///
/// Undo and redo steps let every pending change settle afterwards, so each
/// restore finishes before the next step runs.
pub fn run(script: &Script, config: HistoryConfig) -> Result<Report> {
    let host = Rc::new(match &script.placeholder {
        Some(placeholder) => MemoryFieldHost::with_placeholder(placeholder.as_str()),
        None => MemoryFieldHost::new(),
    });
    for field in &script.fields {
        host.add_field(field.id.clone(), &field.content);
    }

    let manager = UndoRedoManager::new(config);
    let tracker = EditSessionTracker::new(manager.clone(), host.clone());
    for field in &script.fields {
        tracker.enable(&field.id);
    }

    for (index, step) in script.steps.iter().enumerate() {
        tracing::debug!("Step {index}: {step:?}");
        let known = |field: &FieldId| -> Result<()> {
            if !host.has_field(field) {
                bail!("Step {index} refers to unknown field {field}");
            }
            Ok(())
        };
        match step {
            Step::Edit {
                field,
                content,
                cursor,
            } => {
                known(field)?;
                host.edit(field, content, *cursor);
            }
            Step::Settle { field } => {
                known(field)?;
                host.settle(field);
            }
            Step::Blur { field } => {
                known(field)?;
                host.blur(field);
            }
            Step::Undo => {
                tracker.exec_command(Command::Undo);
                host.settle_all();
            }
            Step::Redo => {
                tracker.exec_command(Command::Redo);
                host.settle_all();
            }
            Step::ClearHistory => tracker.clear_history(),
            Step::Enable { field } => {
                known(field)?;
                tracker.enable(field);
            }
            Step::Disable { field } => {
                known(field)?;
                tracker.disable(field);
            }
        }
    }

    let fields = script
        .fields
        .iter()
        .map(|f| {
            let content = host.content(&f.id).unwrap_or_default();
            (f.id.to_string(), content)
        })
        .collect();
    let report = Report {
        fields,
        undo_depth: manager.undo_depth(),
        redo_depth: manager.redo_depth(),
        pending_actions: manager.pending_action_count(),
        action_in_progress: manager.is_action_in_progress(),
    };
    tracing::info!(
        "Replayed {} steps: {} undo, {} redo",
        script.steps.len(),
        report.undo_depth,
        report.redo_depth
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(json: &str) -> Report {
        let script = Script::from_json(json).expect("parse");
        run(&script, HistoryConfig::default()).expect("run")
    }

    #[test]
    fn test_typing_then_undo() {
        let report = replay(
            r#"{
                "fields": [{"id": "body"}],
                "steps": [
                    {"op": "edit", "field": "body", "content": "hello"},
                    {"op": "edit", "field": "body", "content": "hello world"},
                    {"op": "settle", "field": "body"},
                    {"op": "undo"}
                ]
            }"#,
        );
        assert_eq!(report.fields["body"], "");
        assert_eq!(report.undo_depth, 0);
        assert_eq!(report.redo_depth, 1);
        assert!(!report.action_in_progress);
    }

    #[test]
    fn test_undo_redo_with_cursor() {
        let report = replay(
            r#"{
                "fields": [{"id": "body", "content": "a"}],
                "steps": [
                    {"op": "edit", "field": "body", "content": "ab", "cursor": {"anchor": 2, "focus": 2}},
                    {"op": "blur", "field": "body"},
                    {"op": "undo"},
                    {"op": "redo"}
                ]
            }"#,
        );
        assert_eq!(report.fields["body"], "ab");
        assert_eq!(report.undo_depth, 1);
        assert_eq!(report.redo_depth, 0);
    }

    #[test]
    fn test_placeholder_and_clear_history() {
        let report = replay(
            r#"{
                "placeholder": "Write something",
                "fields": [{"id": "body"}],
                "steps": [
                    {"op": "edit", "field": "body", "content": "Write something"},
                    {"op": "settle", "field": "body"},
                    {"op": "edit", "field": "body", "content": "draft"},
                    {"op": "settle", "field": "body"},
                    {"op": "clear_history"}
                ]
            }"#,
        );
        assert_eq!(report.fields["body"], "draft");
        assert_eq!(report.undo_depth, 0);
    }

    #[test]
    fn test_disable_and_enable() {
        let report = replay(
            r#"{
                "fields": [{"id": "body"}],
                "steps": [
                    {"op": "disable", "field": "body"},
                    {"op": "edit", "field": "body", "content": "ignored"},
                    {"op": "settle", "field": "body"},
                    {"op": "enable", "field": "body"},
                    {"op": "edit", "field": "body", "content": "ignored!"},
                    {"op": "settle", "field": "body"},
                    {"op": "undo"}
                ]
            }"#,
        );
        assert_eq!(report.fields["body"], "ignored");
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let script = Script::from_json(
            r#"{"fields": [], "steps": [{"op": "settle", "field": "nope"}]}"#,
        )
        .expect("parse");
        let err = run(&script, HistoryConfig::default()).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        assert!(Script::from_json(r#"{"fields": [], "steps": [{"op": "paste"}]}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("script.json");
        std::fs::write(&path, r#"{"fields": [{"id": "t", "content": "x"}]}"#).expect("write");

        let script = Script::load(&path).expect("load");
        assert_eq!(script.fields.len(), 1);
        assert!(script.steps.is_empty());

        assert!(Script::load(&dir.path().join("missing.json")).is_err());
    }
}
