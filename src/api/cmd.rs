use std::collections::HashSet;
use std::rc::Rc;

use crate::api::arg::{ArgClause, ArgGroup};
use crate::api::flag::{FlagClause, FlagGroup};
use crate::api::Action;
use crate::error::Error;
use crate::model::CmdModel;

pub(crate) type CmdValidator = Rc<dyn Fn(&CmdClause) -> Result<(), Error>>;

/// A declared command node, owning its own flags, arguments, and nested
/// subcommands.
///
/// Commands are registered before the first parse and are structurally
/// immutable thereafter; their bound values are re-resolved on every parse.
pub struct CmdClause {
    pub(crate) name: String,
    pub(crate) help: String,
    pub(crate) help_long: Option<String>,
    pub(crate) aliases: Vec<String>,
    pub(crate) hidden: bool,
    pub(crate) is_default: bool,
    pub(crate) path: Vec<String>,
    pub(crate) validator: Option<CmdValidator>,
    pub(crate) actions: Vec<Action>,
    pub(crate) pre_actions: Vec<Action>,
    pub(crate) flags: FlagGroup,
    pub(crate) args: ArgGroup,
    pub(crate) commands: CmdGroup,
}

impl CmdClause {
    pub(crate) fn new(name: impl Into<String>, help: impl Into<String>, parent: &[String]) -> Self {
        let name = name.into();
        let mut path = parent.to_vec();
        path.push(name.clone());
        Self {
            name,
            help: help.into(),
            help_long: None,
            aliases: Vec::default(),
            hidden: false,
            is_default: false,
            path,
            validator: None,
            actions: Vec::default(),
            pre_actions: Vec::default(),
            flags: FlagGroup::default(),
            args: ArgGroup::default(),
            commands: CmdGroup::default(),
        }
    }

    /// Add a flag to this command.
    pub fn flag(&mut self, name: impl Into<String>, help: impl Into<String>) -> &mut FlagClause {
        self.flags.flag(name, help)
    }

    /// Add a positional argument to this command.
    pub fn arg(&mut self, name: impl Into<String>, help: impl Into<String>) -> &mut ArgClause {
        self.args.arg(name, help)
    }

    /// Add a nested subcommand.
    pub fn command(&mut self, name: impl Into<String>, help: impl Into<String>) -> &mut CmdClause {
        let path = self.path.clone();
        self.commands.command(name, help, &path)
    }

    /// Add an alternative name for this command.
    pub fn alias(&mut self, alias: impl Into<String>) -> &mut Self {
        self.aliases.push(alias.into());
        self
    }

    /// Set the long-form help shown in full help output.
    pub fn help_long(&mut self, help_long: impl Into<String>) -> &mut Self {
        self.help_long = Some(help_long.into());
        self
    }

    /// Omit the command from usage text.
    pub fn hidden(&mut self) -> &mut Self {
        self.hidden = true;
        self
    }

    /// Select this command automatically when its parent is parsed without
    /// an explicit subcommand token. At most one sibling may be the default.
    pub fn default(&mut self) -> &mut Self {
        self.is_default = true;
        self
    }

    /// Validate the command after values are assigned.
    pub fn validate(&mut self, f: impl Fn(&CmdClause) -> Result<(), Error> + 'static) -> &mut Self {
        self.validator = Some(Rc::new(f));
        self
    }

    /// Run after a successful parse that selected this command.
    pub fn action(
        &mut self,
        f: impl Fn(&crate::Application, &crate::ParseContext) -> Result<(), Error> + 'static,
    ) -> &mut Self {
        self.actions.push(Rc::new(f));
        self
    }

    /// Run after value assignment but before required-validation and actions.
    pub fn pre_action(
        &mut self,
        f: impl Fn(&crate::Application, &crate::ParseContext) -> Result<(), Error> + 'static,
    ) -> &mut Self {
        self.pre_actions.push(Rc::new(f));
        self
    }

    /// The space-joined path of this command from the application root.
    pub fn full_command(&self) -> String {
        self.path.join(" ")
    }

    pub(crate) fn init(&mut self, envar_prefix: &str) -> Result<(), Error> {
        if self.args.have() && self.commands.have() {
            return Err(Error::config(format!(
                "can't mix args with commands in '{}'",
                self.full_command()
            )));
        }
        self.flags.init(envar_prefix)?;
        self.args.init()?;
        self.commands.init(envar_prefix)?;
        Ok(())
    }

    pub(crate) fn model(&self) -> CmdModel {
        CmdModel {
            name: self.name.clone(),
            aliases: self.aliases.clone(),
            help: self.help.clone(),
            help_long: self.help_long.clone().unwrap_or_default(),
            hidden: self.hidden,
            default: self.is_default,
            flags: self.flags.iter().map(FlagClause::model).collect(),
            args: self.args.iter().map(ArgClause::model).collect(),
            commands: self.commands.iter().map(CmdClause::model).collect(),
            full_command: self.full_command(),
        }
    }
}

/// The ordered collection of subcommands on one node.
#[derive(Default)]
pub(crate) struct CmdGroup {
    commands: Vec<CmdClause>,
}

impl CmdGroup {
    pub(crate) fn command(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        parent: &[String],
    ) -> &mut CmdClause {
        self.commands.push(CmdClause::new(name, help, parent));
        self.commands
            .last_mut()
            .expect("internal error - the command was just pushed")
    }

    /// Re-register a command at the front of the ordering (used for the
    /// auto-generated help command).
    pub(crate) fn command_first(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        parent: &[String],
    ) -> &mut CmdClause {
        self.commands.insert(0, CmdClause::new(name, help, parent));
        &mut self.commands[0]
    }

    pub(crate) fn have(&self) -> bool {
        !self.commands.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &CmdClause> {
        self.commands.iter()
    }

    /// Lookup by canonical name or alias.
    pub(crate) fn get(&self, token: &str) -> Option<&CmdClause> {
        self.commands
            .iter()
            .find(|c| c.name == token || c.aliases.iter().any(|a| a == token))
    }

    /// Lookup by canonical name only; used to walk a selected path.
    pub(crate) fn get_named(&self, name: &str) -> Option<&CmdClause> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub(crate) fn get_named_mut(&mut self, name: &str) -> Option<&mut CmdClause> {
        self.commands.iter_mut().find(|c| c.name == name)
    }

    /// The sibling marked as default, if any.
    pub(crate) fn default_child(&self) -> Option<&CmdClause> {
        self.commands.iter().find(|c| c.is_default)
    }

    pub(crate) fn init(&mut self, envar_prefix: &str) -> Result<(), Error> {
        let mut seen: HashSet<String> = HashSet::default();
        let mut defaults = 0;

        for cmd in self.commands.iter_mut() {
            for key in std::iter::once(&cmd.name).chain(cmd.aliases.iter()) {
                if !seen.insert(key.clone()) {
                    return Err(Error::config(format!("duplicate command '{key}'")));
                }
            }
            if cmd.is_default {
                defaults += 1;
            }
            cmd.init(envar_prefix)?;
        }

        if defaults > 1 {
            return Err(Error::config(
                "more than one default command in a sibling set".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_command_paths() {
        let mut root = CmdClause::new("c0", "", &[]);
        let child = root.command("c1", "");
        assert_eq!(child.full_command(), "c0 c1");
        assert_eq!(root.full_command(), "c0");
    }

    #[test]
    fn lookup_by_alias() {
        let mut group = CmdGroup::default();
        group.command("remove", "", &[]).alias("rm").alias("del");
        assert_eq!(group.get("remove").unwrap().name, "remove");
        assert_eq!(group.get("rm").unwrap().name, "remove");
        assert_eq!(group.get("del").unwrap().name, "remove");
        assert!(group.get("delete").is_none());
    }

    #[test]
    fn init_rejects_duplicate_name() {
        let mut group = CmdGroup::default();
        group.command("a", "", &[]);
        group.command("a", "", &[]);
        assert_matches!(group.init("").unwrap_err(), Error::Config(message) => {
            assert_eq!(message, "duplicate command 'a'");
        });
    }

    #[test]
    fn init_rejects_alias_collision() {
        let mut group = CmdGroup::default();
        group.command("a", "", &[]);
        group.command("b", "", &[]).alias("a");
        assert_matches!(group.init("").unwrap_err(), Error::Config(_));
    }

    #[test]
    fn init_rejects_multiple_defaults() {
        let mut group = CmdGroup::default();
        group.command("a", "", &[]).default();
        group.command("b", "", &[]).default();
        assert_matches!(group.init("").unwrap_err(), Error::Config(message) => {
            assert_eq!(message, "more than one default command in a sibling set");
        });
    }

    #[test]
    fn init_rejects_mixed_args_and_commands() {
        let mut root = CmdClause::new("c0", "", &[]);
        root.arg("a", "").string();
        root.command("c1", "");
        assert_matches!(root.init("").unwrap_err(), Error::Config(message) => {
            assert_eq!(message, "can't mix args with commands in 'c0'");
        });
    }
}
