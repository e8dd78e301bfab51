use std::collections::HashSet;
use std::fmt::Display;
use std::rc::Rc;

use crate::api::arg::{ArgClause, ArgGroup};
use crate::api::cmd::{CmdClause, CmdGroup};
use crate::api::flag::{FlagClause, FlagGroup};
use crate::api::Action;
use crate::error::Error;
use crate::model::{machinery_flag, ApplicationModel, CmdModel};
use crate::parser::engine;
use crate::parser::{ElementClause, ParseContext};
use crate::usage::{render, ConsoleInterface, UsageStyle, UserInterface};
use crate::value::Binding;

pub(crate) type AppValidator = Rc<dyn Fn(&Application) -> Result<(), Error>>;
pub(crate) type PluginRunner = Rc<dyn Fn(&str, &[String]) -> Result<(), Error>>;

/// The root of a command line declaration: flags, positional arguments, and
/// commands, plus the ambient configuration (output interface, termination
/// strategy, environment defaults).
///
/// ### Example
/// ```no_run
/// use argot::Application;
///
/// let mut app = Application::new("ping", "Ping an address.");
/// let ttl = app.flag("ttl", "TTL for packets.").short('t').default("5s").duration();
/// let count = app.flag("count", "Packets to send.").short('c').default("3").int();
/// let target = app.arg("target", "Address to ping.").required().string();
///
/// let args: Vec<String> = std::env::args().skip(1).collect();
/// app.parse_with_usage(args);
/// println!("pinging {} x{} ttl={:?}", target.get(), count.get(), ttl.get());
/// ```
pub struct Application {
    pub(crate) name: String,
    pub(crate) help: String,
    version: Option<String>,
    author: Option<String>,
    initialized: bool,
    pub(crate) no_interspersed: bool,
    default_envars: bool,
    terminate: Box<dyn Fn(i32)>,
    pub(crate) interface: Box<dyn UserInterface>,
    validator: Option<AppValidator>,
    actions: Vec<Action>,
    pre_actions: Vec<Action>,
    pub(crate) flags: FlagGroup,
    pub(crate) args: ArgGroup,
    pub(crate) commands: CmdGroup,
    completion: Binding<bool>,
    pub(crate) plugin_runner: Option<PluginRunner>,
}

impl Application {
    /// Create an application. The help flag, the hidden completion flag, and
    /// the hidden introspection flag are registered up front.
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        let mut flags = FlagGroup::default();
        flags
            .flag("help", "Show context-sensitive help.")
            .unnegatable_bool();
        let completion = flags
            .flag(
                "completion-bash",
                "Output possible completions for the given args.",
            )
            .hidden()
            .unnegatable_bool();
        flags
            .flag("argot-introspect", "Output the application model as JSON.")
            .hidden()
            .pre_action(|app, _context| {
                let json =
                    serde_json::to_string(&app.introspect_model()).map_err(Error::custom)?;
                app.interface.print(json);
                app.terminate_with(0);
                Ok(())
            })
            .unnegatable_bool();

        Self {
            name: name.into(),
            help: help.into(),
            version: None,
            author: None,
            initialized: false,
            no_interspersed: false,
            default_envars: false,
            terminate: Box::new(|status| std::process::exit(status)),
            interface: Box::new(ConsoleInterface::default()),
            validator: None,
            actions: Vec::default(),
            pre_actions: Vec::default(),
            flags,
            args: ArgGroup::default(),
            commands: CmdGroup::default(),
            completion,
            plugin_runner: None,
        }
    }

    /// Add an application-level flag.
    pub fn flag(&mut self, name: impl Into<String>, help: impl Into<String>) -> &mut FlagClause {
        self.flags.flag(name, help)
    }

    /// Add an application-level positional argument. Positional arguments
    /// cannot be mixed with commands.
    pub fn arg(&mut self, name: impl Into<String>, help: impl Into<String>) -> &mut ArgClause {
        self.args.arg(name, help)
    }

    /// Add a top-level command.
    pub fn command(&mut self, name: impl Into<String>, help: impl Into<String>) -> &mut CmdClause {
        self.commands.command(name, help, &[])
    }

    /// Fetch a previously declared application-level flag.
    pub fn get_flag(&mut self, name: &str) -> Option<&mut FlagClause> {
        self.flags.find_mut(name)
    }

    /// Register `--version`, which prints the version and terminates with 0.
    pub fn version(&mut self, version: impl Into<String>) -> &mut Self {
        let version = version.into();
        self.version = Some(version.clone());
        self.flags
            .flag("version", "Show application version.")
            .pre_action(move |app, _context| {
                app.interface.print(version.clone());
                app.terminate_with(0);
                Ok(())
            })
            .unnegatable_bool();
        self
    }

    /// Record the author, surfaced through the model.
    pub fn author(&mut self, author: impl Into<String>) -> &mut Self {
        self.author = Some(author.into());
        self
    }

    /// Control whether flags may be interspersed with positional arguments
    /// (the default). When disabled, everything after the first positional
    /// token is positional, dashes or not.
    pub fn interspersed(&mut self, interspersed: bool) -> &mut Self {
        self.no_interspersed = !interspersed;
        self
    }

    /// Bind every flag without an explicit envar to `APPNAME_FLAG_NAME`
    /// (upper-cased, non-alphanumeric runs collapsed to `_`). Individual
    /// flags opt out with [`FlagClause::no_envar`].
    pub fn default_envars(&mut self) -> &mut Self {
        self.default_envars = true;
        self
    }

    /// Replace the termination strategy. Defaults to
    /// [`std::process::exit`]; tests and embedders substitute a no-op to
    /// observe exit codes without terminating.
    pub fn terminate(&mut self, terminate: impl Fn(i32) + 'static) -> &mut Self {
        self.terminate = Box::new(terminate);
        self
    }

    /// Replace the output interface. Defaults to [`ConsoleInterface`].
    pub fn interface(&mut self, interface: impl UserInterface + 'static) -> &mut Self {
        self.interface = Box::new(interface);
        self
    }

    /// Set a validation function run after every parse.
    pub fn validate(&mut self, f: impl Fn(&Application) -> Result<(), Error> + 'static) -> &mut Self {
        self.validator = Some(Rc::new(f));
        self
    }

    /// Run after a successful parse, before any clause actions.
    pub fn action(
        &mut self,
        f: impl Fn(&Application, &ParseContext) -> Result<(), Error> + 'static,
    ) -> &mut Self {
        self.actions.push(Rc::new(f));
        self
    }

    /// Run after value assignment but before validation and actions.
    pub fn pre_action(
        &mut self,
        f: impl Fn(&Application, &ParseContext) -> Result<(), Error> + 'static,
    ) -> &mut Self {
        self.pre_actions.push(Rc::new(f));
        self
    }

    pub(crate) fn terminate_with(&self, status: i32) {
        (self.terminate)(status);
    }

    /// Print an error in the `name: error: message` format.
    pub fn errorf(&self, message: impl Display) {
        self.interface
            .print_error(format!("{}: error: {message}", self.name));
    }

    /// A pure-data snapshot of the declaration tree.
    pub fn model(&self) -> ApplicationModel {
        ApplicationModel {
            name: self.name.clone(),
            help: self.help.clone(),
            version: self.version.clone().unwrap_or_default(),
            author: self.author.clone().unwrap_or_default(),
            cheats: Default::default(),
            cheat_tags: Vec::default(),
            flags: self.flags.iter().map(FlagClause::model).collect(),
            args: self.args.iter().map(ArgClause::model).collect(),
            commands: self.commands.iter().map(CmdClause::model).collect(),
        }
    }

    /// The model with the help/completion/introspection machinery filtered
    /// out, as exported for plugin delegation.
    pub fn introspect_model(&self) -> ApplicationModel {
        let mut model = self.model();
        model.flags.retain(|flag| !machinery_flag(&flag.name));
        model.commands.retain(|cmd| cmd.name != "help");
        model
    }

    /// Structural validation, run once before the first parse and cached.
    pub(crate) fn init(&mut self) -> Result<(), Error> {
        if self.initialized {
            return Ok(());
        }
        if self.commands.have() && self.args.have() {
            return Err(Error::config("can't mix top-level args with commands"));
        }

        if self.commands.have() {
            let help_cmd = self.commands.command_first("help", "Show help.", &[]);
            let command_path = help_cmd.arg("command", "Show help on command.").strings();
            help_cmd.pre_action(move |app, _context| {
                let model = app.model();
                let path = command_path.get();
                let chain = chain_models(&model, &path);
                app.interface.print(render(&model, &chain, UsageStyle::Full));
                app.terminate_with(0);
                Ok(())
            });
        }

        let envar_prefix = if self.default_envars {
            self.name.clone()
        } else {
            String::default()
        };
        self.flags.init(&envar_prefix)?;
        self.args.init()?;
        self.commands.init(&envar_prefix)?;

        let root = vec![&self.flags];
        for cmd in self.commands.iter() {
            check_duplicate_flags(cmd, &root)?;
        }

        self.initialized = true;
        Ok(())
    }

    pub(crate) fn parse_with_context(
        &mut self,
        ignore_default: bool,
        args: Vec<String>,
    ) -> Result<(ParseContext, Option<Error>), Error> {
        self.init()?;
        let mut context = ParseContext::new(args, ignore_default);
        let error = engine::parse(&mut context, self).err();
        Ok((context, error))
    }

    /// Parse the given command line and return the fully populated context,
    /// without dispatching defaults, validators, or actions.
    pub fn parse_context<I>(&mut self, args: I) -> Result<ParseContext, Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args = collect_args(args);
        let (context, error) = self.parse_with_context(false, args)?;
        match error {
            Some(error) => Err(error),
            None => Ok(context),
        }
    }

    /// Parse the command line: match tokens, resolve defaults and envars,
    /// assign typed values, run validators and callbacks. Returns the
    /// space-joined path of the selected command ("" without commands).
    pub fn parse<I>(&mut self, args: I) -> Result<String, Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args = collect_args(args);
        let (mut context, parse_error) = self.parse_with_context(false, args)?;

        self.set_defaults(&context)?;
        let (selected, set_values_error) = self.set_values(&context);
        self.apply_pre_actions(&context, !self.completion.get())?;

        if self.completion.get() {
            let options = self.completion_options(&context);
            self.interface.print(options.join("\n"));
            self.terminate_with(0);
            return Ok(String::default());
        }

        if let Some(error) = parse_error {
            return Err(error);
        }
        self.maybe_help(&context)?;
        if !context.eol() {
            return Err(Error::UnexpectedArgument(context.peek_display()));
        }
        if let Some(error) = set_values_error {
            return Err(error);
        }

        self.validate_required(&context)?;
        self.apply_validators(&context)?;
        self.apply_actions(&context)?;

        let command = selected.join(" ");
        if command.is_empty() && self.commands.have() {
            self.write_usage_for_context(&context, UsageStyle::Full, false);
            self.terminate_with(0);
            return Err(Error::CommandNotSpecified);
        }
        Ok(command)
    }

    /// Parse, rendering usage on command-selection and flag/argument errors:
    /// command-selection errors get a notice plus the compact command
    /// listing, token errors get the one-line error plus full usage, and
    /// anything else is fatal with the error alone. Terminates with 1 on any
    /// error.
    pub fn parse_with_usage<I>(&mut self, args: I) -> String
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args = collect_args(args);
        let error = match self.parse(args.clone()) {
            Ok(command) => return command,
            Err(error) => error,
        };

        let style = match &error {
            Error::SubCommandRequired(_) => {
                self.interface.print_error(
                    "error: a subcommand is required, use --help for full help including flags and arguments\n"
                        .to_string(),
                );
                UsageStyle::Compact
            }
            Error::ExpectedKnownCommand(_) => {
                self.interface.print_error(format!(
                    "error: {error}, use --help for full help including flags and arguments\n"
                ));
                UsageStyle::Compact
            }
            Error::RequiredArgument(_)
            | Error::RequiredFlag(_)
            | Error::UnknownLongFlag(_)
            | Error::UnknownShortFlag(_)
            | Error::ExpectedFlagArgument(_)
            | Error::FlagCannotRepeat(_)
            | Error::UnexpectedArgument(_) => {
                self.interface.print_error(format!("error: {error}\n"));
                UsageStyle::Full
            }
            _ => {
                self.errorf(&error);
                self.terminate_with(1);
                return String::default();
            }
        };

        if let Ok((context, _)) = self.parse_with_context(true, args) {
            self.write_usage_for_context(&context, style, true);
        }
        self.terminate_with(1);
        String::default()
    }

    /// Print usage for the given command path (empty for the application).
    pub fn usage(&mut self, command: &[&str]) {
        if let Err(error) = self.init() {
            self.errorf(&error);
            self.terminate_with(1);
            return;
        }
        let model = self.model();
        let path: Vec<String> = command.iter().map(|s| s.to_string()).collect();
        let chain = chain_models(&model, &path);
        self.interface.print(render(&model, &chain, UsageStyle::Full));
    }

    fn write_usage_for_context(&self, context: &ParseContext, style: UsageStyle, to_error: bool) {
        let model = self.model();
        let selected = context.selected.clone().unwrap_or_default();
        let chain = chain_models(&model, &selected);
        let text = render(&model, &chain, style);
        if to_error {
            self.interface.print_error(text);
        } else {
            self.interface.print(text);
        }
    }

    /// Re-parse ignoring defaults and render context-sensitive usage when
    /// the help flag was matched. The re-parse is display-only: it assigns
    /// no values and dispatches no callbacks.
    fn maybe_help(&mut self, context: &ParseContext) -> Result<(), Error> {
        if context.help_requested() {
            let (display, _) = self.parse_with_context(true, context.raw_args.clone())?;
            self.write_usage_for_context(&display, UsageStyle::Full, false);
            self.terminate_with(0);
        }
        Ok(())
    }

    /// Resolve defaults (envar first, then declared values) for every active
    /// clause that matched no element. Skipped entirely when help was
    /// requested, so help output reflects the bare declaration.
    fn set_defaults(&mut self, context: &ParseContext) -> Result<(), Error> {
        let mut matched_flags: HashSet<String> = HashSet::default();
        let mut matched_args: HashSet<String> = HashSet::default();
        for element in &context.elements {
            match &element.clause {
                ElementClause::Flag { name, .. } => {
                    if name == "help" {
                        return Ok(());
                    }
                    matched_flags.insert(name.clone());
                }
                ElementClause::Arg { name, .. } => {
                    matched_args.insert(name.clone());
                }
                ElementClause::Cmd { .. } => {}
            }
        }

        let selected = context.selected.clone().unwrap_or_default();
        self.with_active_groups_mut(&selected, &mut |flags, args| {
            for flag in flags.iter_mut() {
                if !matched_flags.contains(&flag.name) {
                    flag.set_default()?;
                }
            }
            for arg in args.iter_mut() {
                if !matched_args.contains(&arg.name) {
                    arg.set_default()?;
                }
            }
            Ok(())
        })
    }

    /// Report required clauses that matched no element and cannot be
    /// satisfied by a default or envar. Defaults were already resolved; the
    /// two passes are independent, not short-circuiting.
    fn validate_required(&self, context: &ParseContext) -> Result<(), Error> {
        let mut matched_flags: HashSet<String> = HashSet::default();
        let mut matched_args: HashSet<String> = HashSet::default();
        for element in &context.elements {
            match &element.clause {
                ElementClause::Flag { name, .. } => {
                    matched_flags.insert(name.clone());
                }
                ElementClause::Arg { name, .. } => {
                    matched_args.insert(name.clone());
                }
                ElementClause::Cmd { .. } => {}
            }
        }

        let selected = context.selected.clone().unwrap_or_default();
        self.with_active_groups(&selected, &mut |flags, args| {
            for flag in flags.iter() {
                if !matched_flags.contains(&flag.name) && flag.needs_value() {
                    return Err(Error::RequiredFlag(flag.name.clone()));
                }
            }
            for arg in args.iter() {
                if !matched_args.contains(&arg.name) && arg.needs_value() {
                    return Err(Error::RequiredArgument(arg.name.clone()));
                }
            }
            Ok(())
        })
    }

    /// Assign every matched element's raw value through its converter, in
    /// strict encounter order. Returns the selected command path alongside
    /// the first error, since completion needs values populated even for
    /// erroring command lines.
    fn set_values(&mut self, context: &ParseContext) -> (Vec<String>, Option<Error>) {
        let mut selected: Vec<String> = Vec::default();
        let mut last_cmd: Option<Vec<String>> = None;
        let mut seen: HashSet<String> = HashSet::default();

        for element in &context.elements {
            let result = match &element.clause {
                ElementClause::Flag { owner, name } => {
                    let Some(flag) = self.flag_by_owner_mut(owner, name) else {
                        unreachable!("internal error - a matched flag must resolve");
                    };
                    if !seen.insert(name.clone()) && !flag.is_cumulative() {
                        return (selected, Some(Error::FlagCannotRepeat(name.clone())));
                    }
                    match &element.value {
                        Some(value) => flag.accept(value),
                        None => Ok(()),
                    }
                }
                ElementClause::Arg { owner, name } => {
                    let Some(arg) = self.arg_by_owner_mut(owner, name) else {
                        unreachable!("internal error - a matched argument must resolve");
                    };
                    match &element.value {
                        Some(value) => arg.accept(value),
                        None => Ok(()),
                    }
                }
                ElementClause::Cmd { path } => {
                    selected = path.clone();
                    last_cmd = Some(path.clone());
                    Ok(())
                }
            };
            if let Err(error) = result {
                return (selected, Some(error));
            }
        }

        if let Some(path) = last_cmd {
            let cmd = self
                .cmd_by_path(&path)
                .expect("internal error - the selected path must resolve");
            if cmd.commands.have() {
                return (selected, Some(Error::SubCommandRequired(cmd.full_command())));
            }
        }

        (selected, None)
    }

    fn apply_validators(&self, context: &ParseContext) -> Result<(), Error> {
        for element in &context.elements {
            if let ElementClause::Cmd { path } = &element.clause {
                let Some(cmd) = self.cmd_by_path(path) else {
                    continue;
                };
                if let Some(validator) = cmd.validator.clone() {
                    (validator.as_ref())(cmd)?;
                }
            }
        }
        if let Some(validator) = self.validator.clone() {
            (validator.as_ref())(self)?;
        }
        Ok(())
    }

    /// Application-level pre-actions always run; per-element dispatch is
    /// suppressed in completion mode so display parses stay side-effect
    /// free.
    fn apply_pre_actions(&self, context: &ParseContext, dispatch: bool) -> Result<(), Error> {
        for action in &self.pre_actions {
            (action.as_ref())(self, context)?;
        }
        if dispatch {
            for element in &context.elements {
                for action in self.clause_actions(&element.clause, true) {
                    (action.as_ref())(self, context)?;
                }
            }
        }
        Ok(())
    }

    fn apply_actions(&self, context: &ParseContext) -> Result<(), Error> {
        for action in &self.actions {
            (action.as_ref())(self, context)?;
        }
        for element in &context.elements {
            for action in self.clause_actions(&element.clause, false) {
                (action.as_ref())(self, context)?;
            }
        }
        Ok(())
    }

    fn clause_actions(&self, clause: &ElementClause, pre: bool) -> Vec<Action> {
        match clause {
            ElementClause::Flag { owner, name } => self
                .flag_by_owner(owner, name)
                .map(|f| if pre { f.pre_actions.clone() } else { f.actions.clone() })
                .unwrap_or_default(),
            ElementClause::Arg { owner, name } => self
                .arg_by_owner(owner, name)
                .map(|a| if pre { a.pre_actions.clone() } else { a.actions.clone() })
                .unwrap_or_default(),
            ElementClause::Cmd { path } => self
                .cmd_by_path(path)
                .map(|c| if pre { c.pre_actions.clone() } else { c.actions.clone() })
                .unwrap_or_default(),
        }
    }

    pub(crate) fn cmd_by_path(&self, path: &[String]) -> Option<&CmdClause> {
        let (first, rest) = path.split_first()?;
        let mut current = self.commands.get_named(first)?;
        for name in rest {
            current = current.commands.get_named(name)?;
        }
        Some(current)
    }

    fn flag_by_owner(&self, owner: &[String], name: &str) -> Option<&FlagClause> {
        if owner.is_empty() {
            self.flags.find(name)
        } else {
            self.cmd_by_path(owner)?.flags.find(name)
        }
    }

    fn flag_by_owner_mut(&mut self, owner: &[String], name: &str) -> Option<&mut FlagClause> {
        if owner.is_empty() {
            self.flags.find_mut(name)
        } else {
            self.cmd_by_path_mut(owner)?.flags.find_mut(name)
        }
    }

    fn arg_by_owner(&self, owner: &[String], name: &str) -> Option<&ArgClause> {
        if owner.is_empty() {
            self.args.find(name)
        } else {
            self.cmd_by_path(owner)?.args.find(name)
        }
    }

    fn arg_by_owner_mut(&mut self, owner: &[String], name: &str) -> Option<&mut ArgClause> {
        if owner.is_empty() {
            self.args.find_mut(name)
        } else {
            self.cmd_by_path_mut(owner)?.args.find_mut(name)
        }
    }

    fn cmd_by_path_mut(&mut self, path: &[String]) -> Option<&mut CmdClause> {
        let (first, rest) = path.split_first()?;
        let mut current = self.commands.get_named_mut(first)?;
        for name in rest {
            current = current.commands.get_named_mut(name)?;
        }
        Some(current)
    }

    fn with_active_groups(
        &self,
        selected: &[String],
        f: &mut dyn FnMut(&FlagGroup, &ArgGroup) -> Result<(), Error>,
    ) -> Result<(), Error> {
        f(&self.flags, &self.args)?;
        let mut cmds = &self.commands;
        for name in selected {
            let cmd = cmds
                .get_named(name)
                .expect("internal error - the selected path must resolve");
            f(&cmd.flags, &cmd.args)?;
            cmds = &cmd.commands;
        }
        Ok(())
    }

    fn with_active_groups_mut(
        &mut self,
        selected: &[String],
        f: &mut dyn FnMut(&mut FlagGroup, &mut ArgGroup) -> Result<(), Error>,
    ) -> Result<(), Error> {
        f(&mut self.flags, &mut self.args)?;
        let mut cmds = &mut self.commands;
        for name in selected {
            let cmd = cmds
                .get_named_mut(name)
                .expect("internal error - the selected path must resolve");
            f(&mut cmd.flags, &mut cmd.args)?;
            cmds = &mut cmd.commands;
        }
        Ok(())
    }

    /// Candidate next tokens for shell completion, computed from the primary
    /// parse's context.
    pub(crate) fn completion_options(&self, context: &ParseContext) -> Vec<String> {
        let raw = &context.raw_args;
        let mut curr = "";
        let mut prev = "";
        if raw.len() > 1 {
            curr = raw[raw.len() - 1].as_str();
        }
        if raw.len() > 2 {
            prev = raw[raw.len() - 2].as_str();
        }

        let selected = context.selected.clone().unwrap_or_default();
        let target = self.groups_at(&selected);

        if (!curr.is_empty() && curr.starts_with("--")) || prev.starts_with("--") {
            // Nothing flag-like is offered beyond an explicit `--`.
            if context.args_only() {
                return Vec::default();
            }

            let (flag_name, flag_value) = if prev.starts_with("--") && !curr.starts_with("--") {
                (&prev[2..], curr)
            } else {
                (&curr[2..], "")
            };

            let (mut options, flag_matched, value_matched) =
                flag_completion(target.0, flag_name, flag_value);
            if value_matched {
                return self.cmd_completion(target, context);
            }

            // Inside a command, the application's own flags are offered too.
            if !selected.is_empty() && !flag_matched {
                let (top_options, top_flag_matched, top_value_matched) =
                    flag_completion(&self.flags, flag_name, flag_value);
                if top_value_matched {
                    return self.cmd_completion(target, context);
                }
                if top_flag_matched {
                    options = top_options;
                } else {
                    options.extend(top_options);
                }
            }
            return options;
        }

        self.cmd_completion(target, context)
    }

    fn groups_at(&self, path: &[String]) -> (&FlagGroup, &ArgGroup, &CmdGroup) {
        if let Some(cmd) = self.cmd_by_path(path) {
            (&cmd.flags, &cmd.args, &cmd.commands)
        } else {
            (&self.flags, &self.args, &self.commands)
        }
    }

    /// Subcommand names when the target has subcommands; otherwise the hints
    /// of the first positional argument not yet satisfied by a non-empty
    /// token.
    fn cmd_completion(
        &self,
        target: (&FlagGroup, &ArgGroup, &CmdGroup),
        context: &ParseContext,
    ) -> Vec<String> {
        let (_, args, cmds) = target;
        let mut options = Vec::default();

        if cmds.have() {
            for cmd in cmds.iter() {
                if !cmd.hidden {
                    options.push(cmd.name.clone());
                }
            }
            return options;
        }

        let mut satisfied = 0;
        let mut all_satisfied = false;
        for element in &context.elements {
            if let ElementClause::Arg { owner, name } = &element.clause {
                if element.value.as_deref().map_or(false, |v| !v.is_empty()) {
                    let remainder = self
                        .arg_by_owner(owner, name)
                        .map_or(false, ArgClause::is_remainder);
                    if remainder {
                        all_satisfied = true;
                        break;
                    }
                    satisfied += 1;
                }
            }
        }

        if !all_satisfied && satisfied < args.len() {
            if let Some(arg) = args.get(satisfied) {
                options.extend(arg.resolve_completions());
            }
        }
        options
    }
}

fn collect_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    args.into_iter().map(|arg| arg.as_ref().to_string()).collect()
}

/// Resolve the model nodes along a command path, stopping at the first miss.
pub(crate) fn chain_models<'m>(model: &'m ApplicationModel, path: &[String]) -> Vec<&'m CmdModel> {
    let mut out = Vec::default();
    let mut commands = &model.commands;
    for name in path {
        match commands.iter().find(|cmd| &cmd.name == name) {
            Some(cmd) => {
                out.push(cmd);
                commands = &cmd.commands;
            }
            None => break,
        }
    }
    out
}

/// Reject long/short flag names repeated anywhere along a command chain.
fn check_duplicate_flags(cmd: &CmdClause, ancestors: &[&FlagGroup]) -> Result<(), Error> {
    for flag in cmd.flags.iter() {
        for group in ancestors {
            if group.find(&flag.name).is_some() {
                return Err(Error::config(format!("duplicate long flag --{}", flag.name)));
            }
            if let Some(short) = flag.short {
                if group.iter().any(|f| f.short == Some(short)) {
                    return Err(Error::config(format!("duplicate short flag -{short}")));
                }
            }
        }
    }

    let mut next: Vec<&FlagGroup> = ancestors.to_vec();
    next.push(&cmd.flags);
    for sub in cmd.commands.iter() {
        check_duplicate_flags(sub, &next)?;
    }
    Ok(())
}

fn flag_completion(
    flags: &FlagGroup,
    flag_name: &str,
    flag_value: &str,
) -> (Vec<String>, bool, bool) {
    let mut options = Vec::default();

    for flag in flags.iter() {
        if flag.name == flag_name {
            let candidates = flag.resolve_completions();
            if candidates.is_empty() {
                // Nothing to offer for the value; the caller falls back to
                // command completion.
                return (candidates, true, true);
            }

            let mut matched = false;
            let mut is_prefix = false;
            for candidate in &candidates {
                if candidate == flag_value {
                    matched = true;
                } else if !flag_value.is_empty() && candidate.starts_with(flag_value) {
                    is_prefix = true;
                }
            }

            if matched && !is_prefix {
                return (candidates, true, true);
            }
            return (candidates, true, false);
        } else if !flag.hidden {
            options.push(format!("--{}", flag.name));
        }
    }

    (options, false, false)
}
