//! Plugin delegation.
//!
//! A plugin is an external program that exports its own declaration tree as
//! model JSON (the host side of `--argot-introspect`). Grafting that model
//! onto a hosting [`Application`] produces an equivalent command subtree
//! whose leaves, when selected, rebuild the child process's argument vector
//! from the values the user actually set and execute it with inherited
//! standard streams.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::api::cmd::CmdClause;
use crate::api::flag::FlagClause;
use crate::api::Application;
use crate::error::Error;
use crate::model::{ApplicationModel, ArgModel, CmdModel, FlagModel};
use crate::value::Binding;

/// The delegation context shared by every command of one grafted subtree.
///
/// Flag registrations across the subtree record their bindings here, keyed by
/// name, together with one shared "was this set by the user" cell per name.
/// The cells are handed down by reference everywhere, never duplicated, so a
/// flag observed at any depth (or proxied to a host global) reports through
/// the same cell.
struct Delegation {
    command: String,
    cells: RefCell<HashMap<String, Rc<Cell<bool>>>>,
    strings: RefCell<Vec<(String, Binding<String>)>>,
    cumulative: RefCell<Vec<(String, Binding<Vec<String>>)>>,
    negatable: RefCell<Vec<(String, Binding<bool>)>>,
    plain: RefCell<Vec<(String, Binding<bool>)>>,
    proxies: RefCell<Vec<String>>,
}

impl Delegation {
    fn new(command: String) -> Self {
        Self {
            command,
            cells: RefCell::new(HashMap::default()),
            strings: RefCell::new(Vec::default()),
            cumulative: RefCell::new(Vec::default()),
            negatable: RefCell::new(Vec::default()),
            plain: RefCell::new(Vec::default()),
            proxies: RefCell::new(Vec::default()),
        }
    }

    /// The shared per-name cell, created on first use.
    fn cell(&self, name: &str) -> Rc<Cell<bool>> {
        Rc::clone(
            self.cells
                .borrow_mut()
                .entry(name.to_string())
                .or_insert_with(|| Rc::new(Cell::new(false))),
        )
    }

    fn user_set(&self, name: &str) -> bool {
        self.cells
            .borrow()
            .get(name)
            .map_or(false, |cell| cell.get())
    }

    /// Rebuild the child argument vector. The order is part of the plugin
    /// contract: path segments, scalar positionals, plain flags, cumulative
    /// flags, negatable toggles, plain toggles, proxied host globals, and
    /// remainder positionals last. Only values the user explicitly set are
    /// forwarded; host-side defaults never leak into the child.
    fn build_argv(
        &self,
        app: &Application,
        path: &[String],
        scalars: &[(String, Binding<String>)],
        remainders: &[(String, Binding<Vec<String>>)],
    ) -> Vec<String> {
        let mut argv: Vec<String> = path.to_vec();

        for (_, binding) in scalars {
            let value = binding.get();
            if !value.is_empty() {
                argv.push(value);
            }
        }
        for (name, binding) in self.strings.borrow().iter() {
            if self.user_set(name) {
                argv.push(format!("--{name}={}", binding.get()));
            }
        }
        for (name, binding) in self.cumulative.borrow().iter() {
            if self.user_set(name) {
                for value in binding.get() {
                    argv.push(format!("--{name}={value}"));
                }
            }
        }
        for (name, binding) in self.negatable.borrow().iter() {
            if self.user_set(name) {
                if binding.get() {
                    argv.push(format!("--{name}"));
                } else {
                    argv.push(format!("--no-{name}"));
                }
            }
        }
        for (name, binding) in self.plain.borrow().iter() {
            if self.user_set(name) && binding.get() {
                argv.push(format!("--{name}"));
            }
        }
        for name in self.proxies.borrow().iter() {
            if self.user_set(name) {
                if let Some(value) = app.flags.find(name).and_then(FlagClause::render) {
                    argv.push(format!("--{name}={value}"));
                }
            }
        }
        for (_, binding) in remainders {
            for value in binding.get() {
                if !value.is_empty() {
                    argv.push(value);
                }
            }
        }

        argv
    }
}

fn record<T>(list: &RefCell<Vec<(String, Binding<T>)>>, name: &str, binding: Binding<T>) {
    let mut list = list.borrow_mut();
    match list.iter_mut().find(|(n, _)| n == name) {
        // A repeated registration (the same flag on a sibling command)
        // replaces the binding; the shared cell already covers both.
        Some(entry) => entry.1 = binding,
        None => list.push((name.to_string(), binding)),
    }
}

impl Application {
    /// Extend the application with a command subtree declared by an external
    /// plugin's model JSON. `command` is the executable to delegate to.
    ///
    /// Plugin flags whose names collide with application-level flags are not
    /// duplicated; they become proxies reading the host flag's storage at
    /// execution time. A model without a name or help text is a
    /// construction-time error.
    pub fn external_plugin_json(
        &mut self,
        command: impl Into<String>,
        model: &str,
    ) -> Result<(), Error> {
        let model: ApplicationModel = serde_json::from_str(model)
            .map_err(|error| Error::config(format!("invalid plugin model: {error}")))?;
        if model.name.is_empty() {
            return Err(Error::config("plugin declared no name"));
        }
        if model.help.is_empty() {
            return Err(Error::config("plugin declared no help"));
        }

        let host_globals: HashSet<String> = self.flags.iter().map(|f| f.name.clone()).collect();
        let delegation = Rc::new(Delegation::new(command.into()));

        let cmd = self.commands.command(&model.name, &model.help, &[]);
        graft_node(
            cmd,
            &model.flags,
            &model.args,
            &model.commands,
            &delegation,
            &host_globals,
            Vec::default(),
        );

        // The proxied globals observe the host flag through the same shared
        // cells the subtree uses.
        for name in delegation.proxies.borrow().iter() {
            if let Some(flag) = self.flags.find_mut(name) {
                flag.set_by_user(delegation.cell(name));
            }
        }

        Ok(())
    }
}

fn graft_node(
    cmd: &mut CmdClause,
    flags: &[FlagModel],
    args: &[ArgModel],
    commands: &[CmdModel],
    delegation: &Rc<Delegation>,
    host_globals: &HashSet<String>,
    path: Vec<String>,
) {
    let (scalars, remainders) = graft_args(cmd, args);
    graft_flags(cmd, flags, delegation, host_globals);
    // Only leaves execute; selecting an intermediate command without
    // descending further is already a subcommand-required error.
    if commands.is_empty() {
        install_exec_action(cmd, delegation, path.clone(), scalars, remainders);
    }

    for model in commands {
        let sub = cmd.command(&model.name, &model.help);
        for alias in &model.aliases {
            sub.alias(alias);
        }
        if !model.help_long.is_empty() {
            sub.help_long(&model.help_long);
        }
        if model.hidden {
            sub.hidden();
        }
        if model.default {
            sub.default();
        }
        let mut sub_path = path.clone();
        sub_path.push(model.name.clone());
        graft_node(
            sub,
            &model.flags,
            &model.args,
            &model.commands,
            delegation,
            host_globals,
            sub_path,
        );
    }
}

type ScalarArgs = Vec<(String, Binding<String>)>;
type RemainderArgs = Vec<(String, Binding<Vec<String>>)>;

fn graft_args(cmd: &mut CmdClause, args: &[ArgModel]) -> (ScalarArgs, RemainderArgs) {
    let mut scalars = ScalarArgs::default();
    let mut remainders = RemainderArgs::default();

    for model in args {
        let arg = cmd.arg(&model.name, &model.help);
        if !model.place_holder.is_empty() {
            arg.place_holder(&model.place_holder);
        }
        if model.required {
            arg.required();
        }
        if model.hidden {
            arg.hidden();
        }
        for default in &model.default {
            arg.default(default);
        }
        if !model.envar.is_empty() {
            arg.envar(&model.envar);
        }
        if model.cumulative {
            remainders.push((model.name.clone(), arg.strings()));
        } else {
            scalars.push((model.name.clone(), arg.string()));
        }
    }

    (scalars, remainders)
}

fn graft_flags(
    cmd: &mut CmdClause,
    flags: &[FlagModel],
    delegation: &Rc<Delegation>,
    host_globals: &HashSet<String>,
) {
    for model in flags {
        let cell = delegation.cell(&model.name);

        if host_globals.contains(&model.name) {
            let mut proxies = delegation.proxies.borrow_mut();
            if !proxies.contains(&model.name) {
                proxies.push(model.name.clone());
            }
            continue;
        }

        let flag = cmd.flag(&model.name, &model.help);
        if let Some(short) = model.short {
            flag.short(short);
        }
        for default in &model.default {
            flag.default(default);
        }
        if !model.envar.is_empty() {
            flag.envar(&model.envar);
        }
        if !model.place_holder.is_empty() {
            flag.place_holder(&model.place_holder);
        }
        if model.required {
            flag.required();
        }
        if model.hidden {
            flag.hidden();
        }
        flag.set_by_user(cell);

        if model.boolean && model.negatable {
            record(&delegation.negatable, &model.name, flag.boolean());
        } else if model.boolean {
            record(&delegation.plain, &model.name, flag.unnegatable_bool());
        } else if model.cumulative {
            record(&delegation.cumulative, &model.name, flag.strings());
        } else {
            record(&delegation.strings, &model.name, flag.string());
        }
    }
}

fn install_exec_action(
    cmd: &mut CmdClause,
    delegation: &Rc<Delegation>,
    path: Vec<String>,
    scalars: ScalarArgs,
    remainders: RemainderArgs,
) {
    let delegation = Rc::clone(delegation);
    cmd.action(move |app, _context| {
        let argv = delegation.build_argv(app, &path, &scalars, &remainders);

        if let Some(runner) = &app.plugin_runner {
            return (runner.as_ref())(&delegation.command, &argv);
        }

        // The child inherits stdin/stdout/stderr unchanged.
        let status = std::process::Command::new(&delegation.command)
            .args(&argv)
            .status()
            .map_err(|error| {
                Error::custom(format!(
                    "cannot run plugin '{}': {error}",
                    delegation.command
                ))
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::custom(format!(
                "plugin '{}' failed: {status}",
                delegation.command
            )))
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn capture_runner(app: &mut Application) -> Rc<RefCell<Vec<(String, Vec<String>)>>> {
        let captured: Rc<RefCell<Vec<(String, Vec<String>)>>> =
            Rc::new(RefCell::new(Vec::default()));
        let sink = Rc::clone(&captured);
        app.plugin_runner = Some(Rc::new(move |command: &str, argv: &[String]| {
            sink.borrow_mut().push((command.to_string(), argv.to_vec()));
            Ok(())
        }));
        captured
    }

    fn new_test_app() -> Application {
        let mut app = Application::new("host", "");
        app.terminate(|_| {});
        app
    }

    const MODEL: &str = r#"{
        "name": "plug",
        "help": "A plugin.",
        "flags": [
            {"name": "level", "help": "Level.", "default": ["5"]},
            {"name": "tag", "help": "Tags.", "cumulative": true},
            {"name": "verbose", "help": "Noise.", "boolean": true, "negatable": true},
            {"name": "force", "help": "Force.", "boolean": true},
            {"name": "context", "help": "Context."}
        ],
        "commands": [
            {"name": "sub", "help": "Sub.",
             "args": [
                {"name": "pos", "help": "Positional."},
                {"name": "rest", "help": "Rest.", "cumulative": true}
             ]}
        ]
    }"#;

    #[test]
    fn rejects_model_without_name() {
        let mut app = new_test_app();
        let error = app
            .external_plugin_json("plug-bin", r#"{"name": "", "help": "x"}"#)
            .unwrap_err();
        assert_matches!(error, Error::Config(message) => {
            assert_eq!(message, "plugin declared no name");
        });
    }

    #[test]
    fn rejects_model_without_help() {
        let mut app = new_test_app();
        let error = app
            .external_plugin_json("plug-bin", r#"{"name": "plug", "help": ""}"#)
            .unwrap_err();
        assert_matches!(error, Error::Config(message) => {
            assert_eq!(message, "plugin declared no help");
        });
    }

    #[test]
    fn rejects_invalid_json() {
        let mut app = new_test_app();
        let error = app.external_plugin_json("plug-bin", "{nope").unwrap_err();
        assert_matches!(error, Error::Config(_));
    }

    #[test]
    fn rebuilds_argv_in_contract_order() {
        let mut app = new_test_app();
        // "context" collides with this host global and becomes a proxy.
        app.flag("context", "Host context.").string();
        app.external_plugin_json("plug-bin", MODEL).unwrap();
        let captured = capture_runner(&mut app);

        let selected = app
            .parse([
                "plug",
                "sub",
                "--level=3",
                "--tag=a",
                "--tag=b",
                "--verbose",
                "--force",
                "--context=prod",
                "posv",
                "r1",
                "r2",
            ])
            .unwrap();
        assert_eq!(selected, "plug sub");

        let calls = captured.borrow();
        assert_eq!(calls.len(), 1);
        let (command, argv) = &calls[0];
        assert_eq!(command, "plug-bin");
        assert_eq!(
            argv,
            &vec![
                "sub".to_string(),
                "posv".to_string(),
                "--level=3".to_string(),
                "--tag=a".to_string(),
                "--tag=b".to_string(),
                "--verbose".to_string(),
                "--force".to_string(),
                "--context=prod".to_string(),
                "r1".to_string(),
                "r2".to_string(),
            ]
        );
    }

    #[test]
    fn unset_flags_and_defaults_do_not_leak() {
        let mut app = new_test_app();
        app.flag("context", "Host context.").default("dev").string();
        app.external_plugin_json("plug-bin", MODEL).unwrap();
        let captured = capture_runner(&mut app);

        app.parse(["plug", "sub", "posv"]).unwrap();

        let calls = captured.borrow();
        let (_, argv) = &calls[0];
        // "level" resolved its default of 5 on the host side, but the user
        // never set it, so it must not be forwarded. Same for the host
        // global's default.
        assert_eq!(argv, &vec!["sub".to_string(), "posv".to_string()]);
    }

    #[test]
    fn negated_toggle_forwards_no_form() {
        let mut app = new_test_app();
        app.external_plugin_json("plug-bin", MODEL).unwrap();
        let captured = capture_runner(&mut app);

        app.parse(["plug", "sub", "--no-verbose"]).unwrap();

        let calls = captured.borrow();
        let (_, argv) = &calls[0];
        assert_eq!(argv, &vec!["sub".to_string(), "--no-verbose".to_string()]);
    }

    #[test]
    fn subprocess_failure_surfaces_as_action_error() {
        let mut app = new_test_app();
        app.external_plugin_json("plug-bin", MODEL).unwrap();
        app.plugin_runner = Some(Rc::new(|_: &str, _: &[String]| {
            Err(Error::custom("exit status 3"))
        }));

        let error = app.parse(["plug", "sub"]).unwrap_err();
        assert_eq!(error, Error::Custom("exit status 3".to_string()));
    }

    #[test]
    fn proxy_global_reads_host_storage() {
        let mut app = new_test_app();
        app.flag("context", "Host context.").string();
        app.external_plugin_json("plug-bin", MODEL).unwrap();
        let captured = capture_runner(&mut app);

        // The proxied flag resolves against the host declaration even though
        // the plugin subtree never re-declared it.
        app.parse(["plug", "sub", "--context=staging"]).unwrap();

        let calls = captured.borrow();
        let (_, argv) = &calls[0];
        assert_eq!(
            argv,
            &vec!["sub".to_string(), "--context=staging".to_string()]
        );
    }
}
