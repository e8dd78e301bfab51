use std::cell::Cell;
use std::collections::HashMap;
use std::fmt::Display;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use crate::api::Action;
use crate::error::Error;
use crate::model::FlagModel;
use crate::value::{Binding, BoolValue, DurationValue, EnumValue, ScalarValue, Value, VecValue};

pub(crate) type ClauseValidator = Rc<dyn Fn(&str) -> Result<(), Error>>;

pub(crate) enum HintSource {
    Options(Vec<String>),
    Action(Rc<dyn Fn() -> Vec<String>>),
}

/// Derive an environment variable name from a flag or application name:
/// upper-cased, with runs of non-alphanumeric characters collapsed to `_`.
pub(crate) fn envar_transform(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut gap = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if gap && !out.is_empty() {
                out.push('_');
            }
            gap = false;
            out.push(c.to_ascii_uppercase());
        } else {
            gap = true;
        }
    }
    out
}

/// A declared flag.
///
/// Created through [`Application::flag`](crate::Application::flag) or
/// [`CmdClause::flag`](crate::CmdClause::flag). Configuration methods chain on
/// `&mut Self`; a terminal type method (for example [`FlagClause::string`])
/// installs the value converter and hands back the typed [`Binding`].
pub struct FlagClause {
    pub(crate) name: String,
    pub(crate) help: String,
    pub(crate) short: Option<char>,
    pub(crate) place_holder: Option<String>,
    pub(crate) hidden: bool,
    pub(crate) required: bool,
    pub(crate) default_values: Vec<String>,
    pub(crate) envar: Option<String>,
    no_envar: bool,
    pub(crate) validator: Option<ClauseValidator>,
    hints: Vec<HintSource>,
    builtin_hints: Vec<String>,
    pub(crate) value: Option<Box<dyn Value>>,
    pub(crate) actions: Vec<Action>,
    pub(crate) pre_actions: Vec<Action>,
    set_by_user: Vec<Rc<Cell<bool>>>,
}

impl FlagClause {
    pub(crate) fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            short: None,
            place_holder: None,
            hidden: false,
            required: false,
            default_values: Vec::default(),
            envar: None,
            no_envar: false,
            validator: None,
            hints: Vec::default(),
            builtin_hints: Vec::default(),
            value: None,
            actions: Vec::default(),
            pre_actions: Vec::default(),
            set_by_user: Vec::default(),
        }
    }

    /// Set the single-character short form (any single Unicode scalar).
    pub fn short(&mut self, short: char) -> &mut Self {
        self.short = Some(short);
        self
    }

    /// Set the placeholder shown for the value in usage text.
    pub fn place_holder(&mut self, place_holder: impl Into<String>) -> &mut Self {
        self.place_holder = Some(place_holder.into());
        self
    }

    /// Omit the flag from usage text.
    pub fn hidden(&mut self) -> &mut Self {
        self.hidden = true;
        self
    }

    /// Require the flag to be satisfied by a token, an envar, or a default.
    pub fn required(&mut self) -> &mut Self {
        self.required = true;
        self
    }

    /// Append a default value, applied when no token matches the flag.
    /// Repeat for multi-value defaults on cumulative flags.
    ///
    /// Defaults pass through the same converter as user input, so an invalid
    /// default surfaces as an error on parse.
    pub fn default(&mut self, value: impl Into<String>) -> &mut Self {
        self.default_values.push(value.into());
        self
    }

    /// Bind an environment variable as a default-value source. For
    /// cumulative flags the variable is split per line, tolerating `\r\n`.
    pub fn envar(&mut self, name: impl Into<String>) -> &mut Self {
        self.envar = Some(name.into());
        self
    }

    /// Opt out of [`Application::default_envars`](crate::Application::default_envars)
    /// auto-binding.
    pub fn no_envar(&mut self) -> &mut Self {
        self.no_envar = true;
        self.envar = None;
        self
    }

    /// Validate the raw token before conversion.
    pub fn validator(&mut self, f: impl Fn(&str) -> Result<(), Error> + 'static) -> &mut Self {
        self.validator = Some(Rc::new(f));
        self
    }

    /// Add static completion candidates for the flag's value.
    pub fn hint_options<I>(&mut self, options: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.hints
            .push(HintSource::Options(options.into_iter().map(Into::into).collect()));
        self
    }

    /// Add a callback producing completion candidates for the flag's value.
    pub fn hint_action(&mut self, f: impl Fn() -> Vec<String> + 'static) -> &mut Self {
        self.hints.push(HintSource::Action(Rc::new(f)));
        self
    }

    /// Run after a successful parse, in encounter order.
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

    /// Observe whether the user explicitly supplied this flag. The cell is
    /// set to `true` when a token matches; it is never reset by the parse.
    pub fn set_by_user(&mut self, cell: Rc<Cell<bool>>) -> &mut Self {
        self.set_by_user.push(cell);
        self
    }

    fn install<V: Value + 'static, T>(&mut self, pair: (V, Binding<T>)) -> Binding<T> {
        let (value, binding) = pair;
        self.value = Some(Box::new(value));
        binding
    }

    /// Bind any [`FromStr`] type as the flag's value.
    pub fn of<T>(&mut self) -> Binding<T>
    where
        T: FromStr + Display + Default + 'static,
    {
        self.install(ScalarValue::<T>::new())
    }

    /// Bind a cumulative sequence of any [`FromStr`] type.
    pub fn values_of<T>(&mut self) -> Binding<Vec<T>>
    where
        T: FromStr + Display + 'static,
    {
        self.install(VecValue::<T>::new())
    }

    /// Bind a string value.
    pub fn string(&mut self) -> Binding<String> {
        self.of::<String>()
    }

    /// Bind a cumulative sequence of strings.
    pub fn strings(&mut self) -> Binding<Vec<String>> {
        self.values_of::<String>()
    }

    /// Bind a signed integer value.
    pub fn int(&mut self) -> Binding<i64> {
        self.of::<i64>()
    }

    /// Bind an unsigned integer value.
    pub fn unsigned(&mut self) -> Binding<u64> {
        self.of::<u64>()
    }

    /// Bind a floating point value.
    pub fn float(&mut self) -> Binding<f64> {
        self.of::<f64>()
    }

    /// Bind a negatable boolean: `--NAME` sets true, `--no-NAME` sets false,
    /// and no value token is consumed.
    pub fn boolean(&mut self) -> Binding<bool> {
        self.install(BoolValue::new(true))
    }

    /// Bind a boolean without the `--no-NAME` form.
    pub fn unnegatable_bool(&mut self) -> Binding<bool> {
        self.install(BoolValue::new(false))
    }

    /// Bind a duration value; see [`parse_duration`](crate::parse_duration)
    /// for the accepted units.
    pub fn duration(&mut self) -> Binding<Duration> {
        self.install(DurationValue::new())
    }

    /// Bind a string restricted to the given choices. The choices double as
    /// completion candidates when no explicit hints are declared.
    pub fn enumeration<I>(&mut self, choices: I) -> Binding<String>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let choices: Vec<String> = choices.into_iter().map(Into::into).collect();
        self.builtin_hints = choices.clone();
        self.install(EnumValue::new(choices))
    }

    pub(crate) fn is_boolean(&self) -> bool {
        self.value
            .as_ref()
            .map_or(false, |v| v.as_boolean().is_some())
    }

    pub(crate) fn is_negatable(&self) -> bool {
        self.value
            .as_ref()
            .and_then(|v| v.as_boolean())
            .map_or(false, |b| b.negatable())
    }

    pub(crate) fn is_cumulative(&self) -> bool {
        self.value
            .as_ref()
            .map_or(false, |v| v.as_cumulative().is_some())
    }

    pub(crate) fn render(&self) -> Option<String> {
        self.value.as_ref().map(|v| v.render())
    }

    /// Apply a user-supplied token: validator, converter, observers.
    pub(crate) fn accept(&mut self, token: &str) -> Result<(), Error> {
        if let Some(validator) = &self.validator {
            (validator.as_ref())(token)?;
        }
        self.value
            .as_mut()
            .expect("internal error - an initialized clause must carry a converter")
            .set(token)?;
        for cell in &self.set_by_user {
            cell.set(true);
        }
        Ok(())
    }

    pub(crate) fn envar_value(&self) -> Option<String> {
        self.envar
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.is_empty())
    }

    /// Resolve the envar (first) or declared defaults into the converter.
    pub(crate) fn set_default(&mut self) -> Result<(), Error> {
        let cumulative = self.is_cumulative();
        let value = self
            .value
            .as_mut()
            .expect("internal error - an initialized clause must carry a converter");

        if let Some(envar_value) = self
            .envar
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|v| !v.is_empty())
        {
            if cumulative {
                for line in envar_value.lines() {
                    value.set(line)?;
                }
            } else {
                value.set(&envar_value)?;
            }
            return Ok(());
        }

        for default in &self.default_values {
            value.set(default)?;
        }
        Ok(())
    }

    /// Whether a missing element is an error: required, and satisfiable by
    /// neither declared defaults nor a non-empty envar.
    pub(crate) fn needs_value(&self) -> bool {
        self.required && self.default_values.is_empty() && self.envar_value().is_none()
    }

    /// Completion candidates for the flag's value: declared hints in
    /// registration order, else the enumeration choices.
    pub(crate) fn resolve_completions(&self) -> Vec<String> {
        let mut out = Vec::default();
        for hint in &self.hints {
            match hint {
                HintSource::Options(options) => out.extend(options.iter().cloned()),
                HintSource::Action(action) => out.extend((action.as_ref())()),
            }
        }
        if out.is_empty() {
            out.extend(self.builtin_hints.iter().cloned());
        }
        out
    }

    pub(crate) fn init(&mut self, envar_prefix: &str) -> Result<(), Error> {
        if self.value.is_none() {
            return Err(Error::config(format!(
                "no type defined for --{} (eg. .string())",
                self.name
            )));
        }
        if self.required && !self.default_values.is_empty() {
            return Err(Error::config(format!(
                "required flag '--{}' has a default value that would never be used",
                self.name
            )));
        }
        if self.default_values.len() > 1 && !self.is_cumulative() {
            return Err(Error::config(format!(
                "invalid default for '--{}', expecting a single value",
                self.name
            )));
        }
        if !envar_prefix.is_empty() && !self.no_envar && self.envar.is_none() {
            self.envar = Some(envar_transform(&format!("{}_{}", envar_prefix, self.name)));
        }
        Ok(())
    }

    pub(crate) fn model(&self) -> FlagModel {
        FlagModel {
            name: self.name.clone(),
            help: self.help.clone(),
            short: self.short,
            default: self.default_values.clone(),
            envar: self.envar.clone().unwrap_or_default(),
            place_holder: self.place_holder.clone().unwrap_or_default(),
            required: self.required,
            hidden: self.hidden,
            boolean: self.is_boolean(),
            negatable: self.is_negatable(),
            cumulative: self.is_cumulative(),
            value: self.render().unwrap_or_default(),
        }
    }
}

/// The insertion-ordered collection of flags on one node, with long and
/// short lookup tables built at init.
#[derive(Default)]
pub(crate) struct FlagGroup {
    flags: Vec<FlagClause>,
    long: HashMap<String, usize>,
    short: HashMap<char, usize>,
}

impl FlagGroup {
    pub(crate) fn flag(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
    ) -> &mut FlagClause {
        self.flags.push(FlagClause::new(name, help));
        self.flags
            .last_mut()
            .expect("internal error - the flag was just pushed")
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &FlagClause> {
        self.flags.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FlagClause> {
        self.flags.iter_mut()
    }

    /// Lookup by long name; valid after init.
    pub(crate) fn get_long(&self, name: &str) -> Option<&FlagClause> {
        self.long.get(name).map(|i| &self.flags[*i])
    }

    /// Lookup by short character; valid after init.
    pub(crate) fn get_short(&self, short: char) -> Option<&FlagClause> {
        self.short.get(&short).map(|i| &self.flags[*i])
    }

    /// Linear lookup by long name; safe before init.
    pub(crate) fn find_mut(&mut self, name: &str) -> Option<&mut FlagClause> {
        self.flags.iter_mut().find(|f| f.name == name)
    }

    pub(crate) fn find(&self, name: &str) -> Option<&FlagClause> {
        self.flags.iter().find(|f| f.name == name)
    }

    pub(crate) fn init(&mut self, envar_prefix: &str) -> Result<(), Error> {
        self.long.clear();
        self.short.clear();

        for flag in self.flags.iter_mut() {
            flag.init(envar_prefix)?;
        }

        for (index, flag) in self.flags.iter().enumerate() {
            if self.long.insert(flag.name.clone(), index).is_some() {
                return Err(Error::config(format!("duplicate long flag --{}", flag.name)));
            }
            if let Some(short) = flag.short {
                if self.short.insert(short, index).is_some() {
                    return Err(Error::config(format!("duplicate short flag -{short}")));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("some-flag", "SOME_FLAG")]
    #[case("a-1-flag", "A_1_FLAG")]
    #[case("flag", "FLAG")]
    #[case("weird..name", "WEIRD_NAME")]
    fn transform(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(envar_transform(name), expected);
    }

    #[test]
    fn init_requires_converter() {
        let mut flag = FlagClause::new("a", "");
        assert_matches!(flag.init("").unwrap_err(), Error::Config(message) => {
            assert_eq!(message, "no type defined for --a (eg. .string())");
        });
    }

    #[test]
    fn init_rejects_required_with_default() {
        let mut flag = FlagClause::new("a", "");
        flag.required().default("x").string();
        assert_matches!(flag.init("").unwrap_err(), Error::Config(_));
    }

    #[test]
    fn init_rejects_multiple_defaults_on_scalar() {
        let mut flag = FlagClause::new("a", "");
        flag.default("x").default("y").string();
        assert_matches!(flag.init("").unwrap_err(), Error::Config(message) => {
            assert_eq!(message, "invalid default for '--a', expecting a single value");
        });
    }

    #[test]
    fn init_allows_multiple_defaults_on_cumulative() {
        let mut flag = FlagClause::new("a", "");
        flag.default("x").default("y").strings();
        flag.init("").unwrap();
    }

    #[test]
    fn init_derives_envar() {
        let mut flag = FlagClause::new("some-flag", "");
        flag.string();
        flag.init("some-app").unwrap();
        assert_eq!(flag.envar.as_deref(), Some("SOME_APP_SOME_FLAG"));
    }

    #[test]
    fn init_envar_opt_out() {
        let mut flag = FlagClause::new("some-flag", "");
        flag.no_envar().string();
        flag.init("some-app").unwrap();
        assert_eq!(flag.envar, None);
    }

    #[test]
    fn init_envar_explicit_wins() {
        let mut flag = FlagClause::new("some-flag", "");
        flag.envar("OTHER").string();
        flag.init("some-app").unwrap();
        assert_eq!(flag.envar.as_deref(), Some("OTHER"));
    }

    #[test]
    fn group_duplicate_long() {
        let mut group = FlagGroup::default();
        group.flag("a", "").string();
        group.flag("a", "").string();
        assert_matches!(group.init("").unwrap_err(), Error::Config(message) => {
            assert_eq!(message, "duplicate long flag --a");
        });
    }

    #[test]
    fn group_duplicate_short() {
        let mut group = FlagGroup::default();
        group.flag("a", "").short('a').string();
        group.flag("b", "").short('a').string();
        assert_matches!(group.init("").unwrap_err(), Error::Config(message) => {
            assert_eq!(message, "duplicate short flag -a");
        });
    }

    #[test]
    fn hints_concatenate_in_registration_order() {
        let mut flag = FlagClause::new("foo", "");
        flag.hint_action(|| vec!["opt1".to_string()])
            .hint_options(["opt2"])
            .string();
        assert_eq!(
            flag.resolve_completions(),
            vec!["opt1".to_string(), "opt2".to_string()]
        );
    }

    #[test]
    fn hints_override_enumeration() {
        let mut flag = FlagClause::new("foo", "");
        flag.hint_options(["opt1", "opt2"]);
        flag.enumeration(["opt3", "opt4"]);
        assert_eq!(
            flag.resolve_completions(),
            vec!["opt1".to_string(), "opt2".to_string()]
        );

        let mut bare = FlagClause::new("bar", "");
        bare.enumeration(["opt3", "opt4"]);
        assert_eq!(
            bare.resolve_completions(),
            vec!["opt3".to_string(), "opt4".to_string()]
        );
    }
}
