//! Tool Registry (§4.1): the canonical tool list offered to backends, and the
//! rename/normalisation pass applied to arguments the backend returns.

use serde_json::{Value, json};
use std::collections::HashMap;
use thiserror::Error;

use crate::os_family::OsFamily;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("tool '{tool}' call is missing required property '{property}' after normalisation")]
    InvalidArgs { tool: String, property: String },
}

/// One entry in the registry: public name, schema, and the rename map applied
/// in reverse to arguments the backend returns.
#[derive(Debug, Clone)]
pub struct ToolRegistryEntry {
    pub name: &'static str,
    pub description: String,
    pub schema: Value,
    pub required: Vec<&'static str>,
    /// `{incoming_name_from_backend -> canonical_name}`.
    pub rename_map: &'static [(&'static str, &'static str)],
}

/// Per-tool row driving both the forward (to-backend) schema and the reverse
/// (from-backend) argument normalisation. One source of truth, built once.
struct ToolSpec {
    name: &'static str,
    describe: fn(OsFamily) -> String,
    schema: fn() -> Value,
    required: &'static [&'static str],
    rename_map: &'static [(&'static str, &'static str)],
}

fn simple_object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn tool_specs() -> &'static [ToolSpec] {
    const SPECS: &[ToolSpec] = &[
        ToolSpec {
            name: "read_file",
            describe: |_os| "Reads the contents of a file at the given path.".to_string(),
            schema: || {
                simple_object_schema(
                    json!({"file_path": {"type": "string"}}),
                    &["file_path"],
                )
            },
            required: &["file_path"],
            rename_map: &[("path", "file_path")],
        },
        ToolSpec {
            name: "write_file",
            describe: |_os| "Writes content to a file, creating it if absent.".to_string(),
            schema: || {
                simple_object_schema(
                    json!({"file_path": {"type": "string"}, "content": {"type": "string"}}),
                    &["file_path", "content"],
                )
            },
            required: &["file_path", "content"],
            rename_map: &[("path", "file_path"), ("description", "content")],
        },
        ToolSpec {
            name: "edit_file",
            describe: |_os| "Replaces one occurrence of old_string with new_string in a file.".to_string(),
            schema: || {
                simple_object_schema(
                    json!({
                        "file_path": {"type": "string"},
                        "old_string": {"type": "string"},
                        "new_string": {"type": "string"},
                    }),
                    &["file_path", "old_string", "new_string"],
                )
            },
            required: &["file_path", "old_string", "new_string"],
            rename_map: &[("path", "file_path")],
        },
        ToolSpec {
            name: "multi_edit_file",
            describe: |_os| "Applies a sequence of old_string/new_string replacements to a file.".to_string(),
            schema: || {
                simple_object_schema(
                    json!({
                        "file_path": {"type": "string"},
                        "edits": {"type": "array", "items": {"type": "string"}},
                    }),
                    &["file_path", "edits"],
                )
            },
            required: &["file_path", "edits"],
            rename_map: &[("path", "file_path")],
        },
        ToolSpec {
            name: "run_bash",
            describe: |os| format!("Runs a shell command, e.g. `{}`.", os.shell_example()),
            schema: || {
                simple_object_schema(
                    json!({"command": {"type": "string"}, "timeout_ms": {"type": "number"}}),
                    &["command"],
                )
            },
            required: &["command"],
            rename_map: &[],
        },
        ToolSpec {
            name: "grep_search",
            describe: |_os| "Searches file contents for a regular expression.".to_string(),
            schema: || {
                simple_object_schema(
                    json!({"pattern": {"type": "string"}, "path": {"type": "string"}}),
                    &["pattern"],
                )
            },
            required: &["pattern"],
            rename_map: &[],
        },
        ToolSpec {
            name: "search_files",
            describe: |_os| "Finds files by name glob under a directory.".to_string(),
            schema: || {
                simple_object_schema(
                    json!({"glob": {"type": "string"}, "path": {"type": "string"}}),
                    &["glob"],
                )
            },
            required: &["glob"],
            rename_map: &[],
        },
        ToolSpec {
            name: "web_fetch",
            describe: |_os| "Fetches the text content of a URL.".to_string(),
            schema: || simple_object_schema(json!({"url": {"type": "string"}}), &["url"]),
            required: &["url"],
            rename_map: &[],
        },
        ToolSpec {
            name: "web_search",
            describe: |_os| "Searches the web for a query and returns a text summary.".to_string(),
            schema: || simple_object_schema(json!({"query": {"type": "string"}}), &["query"]),
            required: &["query"],
            rename_map: &[],
        },
        ToolSpec {
            name: "manage_todos",
            describe: |_os| "Replaces the current task list with the given todos.".to_string(),
            schema: || {
                simple_object_schema(
                    json!({
                        "todos": {
                            "type": "array",
                            "items": {"type": "string"},
                        },
                    }),
                    &["todos"],
                )
            },
            required: &["todos"],
            rename_map: &[("tasks", "todos")],
        },
        ToolSpec {
            name: "edit_notebook",
            describe: |_os| "Edits a single cell of a Jupyter notebook.".to_string(),
            schema: || {
                simple_object_schema(
                    json!({
                        "notebook_path": {"type": "string"},
                        "cell_index": {"type": "number"},
                        "new_source": {"type": "string"},
                    }),
                    &["notebook_path", "cell_index", "new_source"],
                )
            },
            required: &["notebook_path", "cell_index", "new_source"],
            rename_map: &[("path", "notebook_path")],
        },
        ToolSpec {
            name: "get_bash_output",
            describe: |_os| "Reads output accumulated so far from a backgrounded shell.".to_string(),
            schema: || {
                simple_object_schema(json!({"shell_id": {"type": "string"}}), &["shell_id"])
            },
            required: &["shell_id"],
            rename_map: &[("id", "shell_id")],
        },
        ToolSpec {
            name: "kill_bash_shell",
            describe: |_os| "Terminates a backgrounded shell by id.".to_string(),
            schema: || {
                simple_object_schema(json!({"shell_id": {"type": "string"}}), &["shell_id"])
            },
            required: &["shell_id"],
            rename_map: &[("id", "shell_id")],
        },
        ToolSpec {
            name: "delegate_task",
            describe: |_os| "Delegates a self-contained sub-task description to a worker.".to_string(),
            schema: || {
                simple_object_schema(
                    json!({"description": {"type": "string"}, "prompt": {"type": "string"}}),
                    &["description", "prompt"],
                )
            },
            required: &["description", "prompt"],
            rename_map: &[],
        },
        ToolSpec {
            name: "exit_plan_mode",
            describe: |_os| "Signals the plan is ready for the user to approve.".to_string(),
            schema: || simple_object_schema(json!({"plan": {"type": "string"}}), &["plan"]),
            required: &["plan"],
            rename_map: &[],
        },
    ];
    SPECS
}

/// Produces tool descriptors for the backend, and normalises tool-call
/// arguments coming back. Stateless and immutable after construction.
#[derive(Clone)]
pub struct ToolRegistry {
    reverse_names: HashMap<&'static str, &'static str>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        // Registry names are one-to-one with client names in this repository
        // (no namespace prefixing), so the reverse map is the identity — built
        // once, from the same source table as the forward list, so it can
        // never drift out of sync (§9 "cyclic references" note).
        let reverse_names = tool_specs().iter().map(|s| (s.name, s.name)).collect();
        Self { reverse_names }
    }

    /// Deterministic, stable-order tool descriptor list for the given OS family.
    pub fn tools_for(&self, os: OsFamily) -> Vec<ToolRegistryEntry> {
        tool_specs()
            .iter()
            .map(|spec| ToolRegistryEntry {
                name: spec.name,
                description: (spec.describe)(os),
                schema: (spec.schema)(),
                required: spec.required.to_vec(),
                rename_map: spec.rename_map,
            })
            .collect()
    }

    fn spec(&self, tool_name: &str) -> Option<&'static ToolSpec> {
        tool_specs().iter().find(|s| s.name == tool_name)
    }

    /// Applies the tool's rename map, drops explicit nulls, and (for list-of-object
    /// arguments the model flattened into a list of strings) wraps bare strings into
    /// minimal objects. Fails if a required property is still missing afterward.
    pub fn canonical_args(
        &self,
        tool_name: &str,
        raw_args: &Value,
    ) -> Result<(String, Value), RegistryError> {
        let Some(spec) = self.spec(tool_name) else {
            // Unknown tool: pass through unchanged, no renaming to apply.
            return Ok((tool_name.to_string(), raw_args.clone()));
        };

        let mut obj = raw_args.as_object().cloned().unwrap_or_default();

        for (incoming, canonical) in spec.rename_map {
            if let Some(value) = obj.remove(*incoming) {
                obj.insert((*canonical).to_string(), value);
            }
        }

        obj.retain(|_, v| !v.is_null());

        if tool_name == "manage_todos"
            && let Some(Value::Array(items)) = obj.get_mut("todos")
        {
            for item in items.iter_mut() {
                if let Some(task) = item.as_str() {
                    *item = synthesize_todo(task);
                }
            }
        }

        for required in &spec.required {
            if !obj.contains_key(*required) {
                return Err(RegistryError::InvalidArgs {
                    tool: tool_name.to_string(),
                    property: (*required).to_string(),
                });
            }
        }

        Ok((spec.name.to_string(), Value::Object(obj)))
    }

    /// Maps a backend-returned tool name back to the client's tool name.
    /// Injective; unknown names pass through unchanged.
    pub fn reverse_tool_name(&self, backend_tool_name: &str) -> String {
        self.reverse_names
            .get(backend_tool_name)
            .map(|s| s.to_string())
            .unwrap_or_else(|| backend_tool_name.to_string())
    }

    pub fn len(&self) -> usize {
        tool_specs().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a bare task string into `{content, status: "pending", activeForm}`,
/// synthesising a present-continuous form by appending "ing" to the first verb.
fn synthesize_todo(task: &str) -> Value {
    let first_word = task.split_whitespace().next().unwrap_or("");
    let active_form = if first_word.is_empty() {
        task.to_string()
    } else {
        let rest = &task[first_word.len()..];
        format!("{}{}", present_continuous(first_word), rest)
    };
    json!({
        "content": task,
        "status": "pending",
        "activeForm": active_form,
    })
}

fn present_continuous(verb: &str) -> String {
    if let Some(stem) = verb.strip_suffix('e')
        && !stem.ends_with('e')
    {
        return format!("{stem}ing");
    }
    format!("{verb}ing")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_for_is_stable_order() {
        let registry = ToolRegistry::new();
        let a = registry.tools_for(OsFamily::Unix);
        let b = registry.tools_for(OsFamily::Unix);
        let names_a: Vec<_> = a.iter().map(|e| e.name).collect();
        let names_b: Vec<_> = b.iter().map(|e| e.name).collect();
        assert_eq!(names_a, names_b);
        assert_eq!(names_a.first(), Some(&"read_file"));
    }

    #[test]
    fn tools_for_count_matches_registry_len() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.tools_for(OsFamily::Unix).len(), registry.len());
        assert_eq!(registry.len(), 15);
    }

    #[test]
    fn schema_policy_has_no_additional_properties_or_unions() {
        let registry = ToolRegistry::new();
        for entry in registry.tools_for(OsFamily::Unix) {
            assert!(entry.schema.get("additionalProperties").is_none());
            assert!(entry.schema.get("oneOf").is_none());
            assert!(entry.schema.get("anyOf").is_none());
            let props = entry.schema["properties"].as_object().unwrap();
            for (_, prop) in props {
                assert!(prop.get("format").is_none());
                assert!(prop.get("default").is_none());
            }
        }
    }

    #[test]
    fn canonical_args_applies_rename_map() {
        let registry = ToolRegistry::new();
        let (name, args) = registry
            .canonical_args("read_file", &json!({"path": "/tmp/x"}))
            .unwrap();
        assert_eq!(name, "read_file");
        assert_eq!(args, json!({"file_path": "/tmp/x"}));
    }

    #[test]
    fn canonical_args_drops_explicit_nulls() {
        let registry = ToolRegistry::new();
        let (_, args) = registry
            .canonical_args("run_bash", &json!({"command": "ls", "timeout_ms": null}))
            .unwrap();
        assert_eq!(args, json!({"command": "ls"}));
    }

    #[test]
    fn canonical_args_synthesizes_todo_objects() {
        let registry = ToolRegistry::new();
        let (name, args) = registry
            .canonical_args("manage_todos", &json!({"tasks": ["write spec", "review"]}))
            .unwrap();
        assert_eq!(name, "manage_todos");
        assert_eq!(
            args,
            json!({"todos": [
                {"content": "write spec", "status": "pending", "activeForm": "writing spec"},
                {"content": "review", "status": "pending", "activeForm": "reviewing"},
            ]})
        );
    }

    #[test]
    fn canonical_args_fails_when_required_missing() {
        let registry = ToolRegistry::new();
        let err = registry.canonical_args("read_file", &json!({})).unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidArgs {
                tool: "read_file".into(),
                property: "file_path".into(),
            }
        );
    }

    #[test]
    fn reverse_tool_name_passes_through_unknown() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.reverse_tool_name("read_file"), "read_file");
        assert_eq!(registry.reverse_tool_name("some_new_tool"), "some_new_tool");
    }

    #[test]
    fn every_entry_schema_round_trips_after_rename() {
        let registry = ToolRegistry::new();
        for entry in registry.tools_for(OsFamily::Unix) {
            // Build a sample satisfying the schema's required set directly
            // (registry entries are already canonical on the forward path).
            let mut sample = serde_json::Map::new();
            for req in &entry.required {
                sample.insert((*req).to_string(), json!("x"));
            }
            let (_, args) = registry
                .canonical_args(entry.name, &Value::Object(sample))
                .unwrap();
            for req in &entry.required {
                assert!(args.get(*req).is_some(), "{} missing {}", entry.name, req);
            }
        }
    }
}
