//! Serializable snapshots of the clause tree.
//!
//! Models are pure data: they carry no behaviour beyond derived summary
//! strings, are constructed on demand, and never feed back into live parsing.
//! Their serialized form is the wire contract consumed by plugin authors, so
//! the field names here are load-bearing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Snapshot of a single flag declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagModel {
    /// Long name, without dashes.
    pub name: String,
    /// Help text.
    pub help: String,
    /// Single-character short form, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<char>,
    /// Declared default values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default: Vec<String>,
    /// Bound environment variable name, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub envar: String,
    /// Display placeholder for the value.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub place_holder: String,
    /// Whether the flag must be satisfied.
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    /// Whether the flag is omitted from help output.
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    /// Whether the flag is a toggle taking no value token.
    #[serde(default)]
    pub boolean: bool,
    /// Whether the toggle accepts the `--no-NAME` form.
    #[serde(default, skip_serializing_if = "is_false")]
    pub negatable: bool,
    /// Whether repetition accumulates values.
    #[serde(default)]
    pub cumulative: bool,
    /// Rendered current value; never serialized.
    #[serde(skip)]
    pub value: String,
}

impl FlagModel {
    /// The placeholder shown next to the flag in usage text: the declared
    /// placeholder, else the default (quoted for strings, with an ellipsis
    /// when there are several), else the upper-cased name.
    pub fn format_place_holder(&self) -> String {
        if !self.place_holder.is_empty() {
            return self.place_holder.clone();
        }
        if let Some(first) = self.default.first() {
            let ellipsis = if self.default.len() > 1 { "..." } else { "" };
            return format!("{first}{ellipsis}");
        }
        self.name.to_uppercase()
    }

    /// Help text with the bound environment variable appended, if any.
    pub fn help_with_envar(&self) -> String {
        let mut help = self.help.clone();
        if self.boolean {
            if let Some(first) = self.default.first() {
                help = format!("{help} (default: {first})");
            }
        }
        if self.envar.is_empty() {
            help
        } else {
            format!("{help} (${})", self.envar)
        }
    }
}

/// Snapshot of a single positional argument declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgModel {
    /// Argument name.
    pub name: String,
    /// Help text.
    pub help: String,
    /// Declared default values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default: Vec<String>,
    /// Bound environment variable name, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub envar: String,
    /// Display placeholder.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub place_holder: String,
    /// Whether the argument must be satisfied.
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    /// Whether the argument is omitted from help output.
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    /// Whether the argument consumes all remaining tokens.
    #[serde(default)]
    pub cumulative: bool,
    /// Rendered current value; never serialized.
    #[serde(skip)]
    pub value: String,
}

impl ArgModel {
    /// Help text with the bound environment variable appended, if any.
    pub fn help_with_envar(&self) -> String {
        if self.envar.is_empty() {
            self.help.clone()
        } else {
            format!("{} (${})", self.help, self.envar)
        }
    }
}

/// Snapshot of a command node, recursively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CmdModel {
    /// Command name.
    pub name: String,
    /// Alternative names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Help text.
    pub help: String,
    /// Long-form help text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help_long: String,
    /// Whether the command is omitted from help output.
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    /// Whether the command is auto-selected among its siblings.
    #[serde(default, skip_serializing_if = "is_false")]
    pub default: bool,
    /// The command's flags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagModel>,
    /// The command's positional arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgModel>,
    /// Nested subcommands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CmdModel>,
    /// Space-joined path from the application root; never serialized.
    #[serde(skip)]
    pub full_command: String,
}

impl CmdModel {
    /// Depth-first leaves of the subtree, for flattened command listings.
    pub fn flattened_commands(&self) -> Vec<&CmdModel> {
        let mut out = Vec::default();
        for cmd in &self.commands {
            if cmd.commands.is_empty() {
                out.push(cmd);
            }
            out.extend(cmd.flattened_commands());
        }
        out
    }
}

/// Snapshot of the whole application declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationModel {
    /// Application name.
    pub name: String,
    /// Application help text.
    pub help: String,
    /// Declared version, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Declared author, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    /// Cheat-sheet texts by name; carried for wire compatibility only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cheats: BTreeMap<String, String>,
    /// Cheat-sheet tags; carried for wire compatibility only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cheat_tags: Vec<String>,
    /// Application-level flags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagModel>,
    /// Application-level positional arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgModel>,
    /// Top-level commands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CmdModel>,
}

// Flags that count as machinery rather than user surface when composing the
// flag summary.
pub(crate) fn machinery_flag(name: &str) -> bool {
    name == "help" || name.starts_with("help-") || name.starts_with("completion-") || name.starts_with("argot-")
}

/// Compose the one-line flag summary for a usage line: required flags are
/// spelled out, and a trailing `[<flags>]` stands in for the optional rest.
pub(crate) fn flag_summary(flags: &[FlagModel]) -> String {
    let mut out: Vec<String> = Vec::default();
    let mut count = 0;

    for flag in flags {
        if !machinery_flag(&flag.name) {
            count += 1;
        }
        if flag.required {
            if flag.boolean {
                if flag.negatable {
                    out.push(format!("--[no-]{}", flag.name));
                } else {
                    out.push(format!("--{}", flag.name));
                }
            } else {
                out.push(format!("--{}={}", flag.name, flag.format_place_holder()));
            }
        }
    }

    if count != out.len() {
        out.push("[<flags>]".to_string());
    }

    out.join(" ")
}

/// Compose the one-line argument summary for a usage line, with optional
/// arguments bracketed.
pub(crate) fn arg_summary(args: &[ArgModel]) -> String {
    if args.is_empty() {
        return String::default();
    }

    let mut depth = 0;
    let mut out: Vec<String> = Vec::default();

    for arg in args {
        let mut h = if arg.place_holder.is_empty() {
            format!("<{}>", arg.name)
        } else {
            arg.place_holder.clone()
        };
        if arg.cumulative {
            h = format!("{h} ...");
        }
        if !arg.required {
            h = format!("[{h}");
            depth += 1;
        }
        out.push(h);
    }

    let last = out
        .last_mut()
        .expect("internal error - the argument summary cannot be empty here");
    last.push_str(&"]".repeat(depth));
    out.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn flag(name: &str, required: bool, boolean: bool, negatable: bool) -> FlagModel {
        FlagModel {
            name: name.to_string(),
            required,
            boolean,
            negatable,
            ..FlagModel::default()
        }
    }

    fn arg(name: &str, required: bool, cumulative: bool) -> ArgModel {
        ArgModel {
            name: name.to_string(),
            required,
            cumulative,
            ..ArgModel::default()
        }
    }

    #[test]
    fn flag_summary_optional_only() {
        let flags = vec![flag("alpha", false, false, false)];
        assert_eq!(flag_summary(&flags), "[<flags>]");
    }

    #[test]
    fn flag_summary_machinery_only() {
        let flags = vec![flag("help", false, true, false)];
        assert_eq!(flag_summary(&flags), "");
    }

    #[test]
    fn flag_summary_required_forms() {
        let flags = vec![
            flag("toggle", true, true, true),
            flag("plain", true, true, false),
            flag("key", true, false, false),
            flag("extra", false, false, false),
        ];
        assert_eq!(
            flag_summary(&flags),
            "--[no-]toggle --plain --key=KEY [<flags>]"
        );
    }

    #[rstest]
    #[case(vec![], "")]
    #[case(vec![arg("a", true, false)], "<a>")]
    #[case(vec![arg("a", true, false), arg("b", false, false)], "<a> [<b>]")]
    #[case(
        vec![arg("a", false, false), arg("b", false, false)],
        "[<a> [<b>]]"
    )]
    #[case(vec![arg("rest", false, true)], "[<rest> ...]")]
    fn arg_summaries(#[case] args: Vec<ArgModel>, #[case] expected: &str) {
        assert_eq!(arg_summary(&args), expected);
    }

    #[test]
    fn place_holder_precedence() {
        let mut f = flag("key", false, false, false);
        assert_eq!(f.format_place_holder(), "KEY");
        f.default = vec!["one".to_string(), "two".to_string()];
        assert_eq!(f.format_place_holder(), "one...");
        f.place_holder = "VALUE".to_string();
        assert_eq!(f.format_place_holder(), "VALUE");
    }

    #[test]
    fn help_with_envar() {
        let mut f = flag("key", false, false, false);
        f.help = "A key.".to_string();
        assert_eq!(f.help_with_envar(), "A key.");
        f.envar = "APP_KEY".to_string();
        assert_eq!(f.help_with_envar(), "A key. ($APP_KEY)");
    }

    #[test]
    fn wire_field_names() {
        let model = ApplicationModel {
            name: "plug".to_string(),
            help: "A plugin.".to_string(),
            flags: vec![FlagModel {
                name: "verbose".to_string(),
                help: "Noise.".to_string(),
                short: Some('v'),
                place_holder: "LEVEL".to_string(),
                boolean: true,
                ..FlagModel::default()
            }],
            args: vec![ArgModel {
                name: "path".to_string(),
                help: "A path.".to_string(),
                cumulative: true,
                ..ArgModel::default()
            }],
            commands: vec![CmdModel {
                name: "sub".to_string(),
                help: "A sub.".to_string(),
                help_long: "Longer.".to_string(),
                ..CmdModel::default()
            }],
            ..ApplicationModel::default()
        };

        let json = serde_json::to_string(&model).unwrap();
        for key in [
            "\"name\"",
            "\"help\"",
            "\"short\"",
            "\"place_holder\"",
            "\"boolean\"",
            "\"cumulative\"",
            "\"help_long\"",
            "\"flags\"",
            "\"args\"",
            "\"commands\"",
        ] {
            assert!(json.contains(key), "'{json}' does not contain '{key}'");
        }
        // Unset optional fields stay off the wire entirely.
        assert!(!json.contains("\"envar\""));
        assert!(!json.contains("\"hidden\""));
        assert!(!json.contains("\"value\""));
    }

    #[test]
    fn wire_round_trip() {
        let json = r#"{
            "name": "plug",
            "help": "A plugin.",
            "version": "1.2.3",
            "commands": [
                {"name": "leaf", "help": "Leaf.", "aliases": ["l"],
                 "flags": [{"name": "level", "help": "Level.", "default": ["3"]}],
                 "args": [{"name": "path", "help": "Path.", "cumulative": true}]}
            ]
        }"#;
        let model: ApplicationModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.name, "plug");
        assert_eq!(model.version, "1.2.3");
        assert_eq!(model.commands.len(), 1);
        let leaf = &model.commands[0];
        assert_eq!(leaf.aliases, vec!["l".to_string()]);
        assert_eq!(leaf.flags[0].default, vec!["3".to_string()]);
        assert!(leaf.args[0].cumulative);
    }

    #[test]
    fn flattened_commands() {
        let model = CmdModel {
            name: "root".to_string(),
            commands: vec![
                CmdModel {
                    name: "leaf".to_string(),
                    ..CmdModel::default()
                },
                CmdModel {
                    name: "branch".to_string(),
                    commands: vec![CmdModel {
                        name: "deep".to_string(),
                        ..CmdModel::default()
                    }],
                    ..CmdModel::default()
                },
            ],
            ..CmdModel::default()
        };

        let names: Vec<&str> = model
            .flattened_commands()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["leaf", "deep"]);
    }
}
