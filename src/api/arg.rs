use std::cell::Cell;
use std::fmt::Display;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use crate::api::flag::{ClauseValidator, HintSource};
use crate::api::Action;
use crate::error::Error;
use crate::model::ArgModel;
use crate::value::{Binding, BoolValue, DurationValue, EnumValue, ScalarValue, Value, VecValue};

/// A declared positional argument.
///
/// Created through [`Application::arg`](crate::Application::arg) or
/// [`CmdClause::arg`](crate::CmdClause::arg), and configured the same way as
/// a [`FlagClause`](crate::FlagClause): chain on `&mut Self`, finish with a
/// terminal type method.
pub struct ArgClause {
    pub(crate) name: String,
    pub(crate) help: String,
    pub(crate) place_holder: Option<String>,
    pub(crate) hidden: bool,
    pub(crate) required: bool,
    pub(crate) default_values: Vec<String>,
    pub(crate) envar: Option<String>,
    pub(crate) validator: Option<ClauseValidator>,
    hints: Vec<HintSource>,
    builtin_hints: Vec<String>,
    pub(crate) value: Option<Box<dyn Value>>,
    pub(crate) actions: Vec<Action>,
    pub(crate) pre_actions: Vec<Action>,
    set_by_user: Vec<Rc<Cell<bool>>>,
}

impl ArgClause {
    pub(crate) fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            place_holder: None,
            hidden: false,
            required: false,
            default_values: Vec::default(),
            envar: None,
            validator: None,
            hints: Vec::default(),
            builtin_hints: Vec::default(),
            value: None,
            actions: Vec::default(),
            pre_actions: Vec::default(),
            set_by_user: Vec::default(),
        }
    }

    /// Set the placeholder shown for the argument in usage text.
    pub fn place_holder(&mut self, place_holder: impl Into<String>) -> &mut Self {
        self.place_holder = Some(place_holder.into());
        self
    }

    /// Omit the argument from usage text.
    pub fn hidden(&mut self) -> &mut Self {
        self.hidden = true;
        self
    }

    /// Require the argument to be satisfied by a token, an envar, or a
    /// default.
    pub fn required(&mut self) -> &mut Self {
        self.required = true;
        self
    }

    /// Append a default value; see
    /// [`FlagClause::default`](crate::FlagClause::default).
    pub fn default(&mut self, value: impl Into<String>) -> &mut Self {
        self.default_values.push(value.into());
        self
    }

    /// Bind an environment variable as a default-value source.
    pub fn envar(&mut self, name: impl Into<String>) -> &mut Self {
        self.envar = Some(name.into());
        self
    }

    /// Validate the raw token before conversion.
    pub fn validator(&mut self, f: impl Fn(&str) -> Result<(), Error> + 'static) -> &mut Self {
        self.validator = Some(Rc::new(f));
        self
    }

    /// Add static completion candidates for the argument.
    pub fn hint_options<I>(&mut self, options: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.hints
            .push(HintSource::Options(options.into_iter().map(Into::into).collect()));
        self
    }

    /// Add a callback producing completion candidates for the argument.
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

    /// Observe whether the user explicitly supplied this argument.
    pub fn set_by_user(&mut self, cell: Rc<Cell<bool>>) -> &mut Self {
        self.set_by_user.push(cell);
        self
    }

    fn install<V: Value + 'static, T>(&mut self, pair: (V, Binding<T>)) -> Binding<T> {
        let (value, binding) = pair;
        self.value = Some(Box::new(value));
        binding
    }

    /// Bind any [`FromStr`] type as the argument's value.
    pub fn of<T>(&mut self) -> Binding<T>
    where
        T: FromStr + Display + Default + 'static,
    {
        self.install(ScalarValue::<T>::new())
    }

    /// Bind a cumulative sequence; as the trailing argument this consumes
    /// every remaining token.
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

    /// Bind a boolean value parsed from the token (`true`/`false`).
    pub fn boolean(&mut self) -> Binding<bool> {
        self.install(BoolValue::new(false))
    }

    /// Bind a duration value.
    pub fn duration(&mut self) -> Binding<Duration> {
        self.install(DurationValue::new())
    }

    /// Bind a string restricted to the given choices.
    pub fn enumeration<I>(&mut self, choices: I) -> Binding<String>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let choices: Vec<String> = choices.into_iter().map(Into::into).collect();
        self.builtin_hints = choices.clone();
        self.install(EnumValue::new(choices))
    }

    pub(crate) fn is_remainder(&self) -> bool {
        self.value
            .as_ref()
            .map_or(false, |v| v.as_remainder().is_some())
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

    pub(crate) fn needs_value(&self) -> bool {
        self.required && self.default_values.is_empty() && self.envar_value().is_none()
    }

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

    pub(crate) fn init(&mut self) -> Result<(), Error> {
        if self.value.is_none() {
            return Err(Error::config(format!(
                "no type defined for '{}' (eg. .string())",
                self.name
            )));
        }
        if self.required && !self.default_values.is_empty() {
            return Err(Error::config(format!(
                "required argument '{}' has a default value that would never be used",
                self.name
            )));
        }
        if self.default_values.len() > 1 && !self.is_cumulative() {
            return Err(Error::config(format!(
                "invalid default for '{}', expecting a single value",
                self.name
            )));
        }
        Ok(())
    }

    pub(crate) fn model(&self) -> ArgModel {
        ArgModel {
            name: self.name.clone(),
            help: self.help.clone(),
            default: self.default_values.clone(),
            envar: self.envar.clone().unwrap_or_default(),
            place_holder: self.place_holder.clone().unwrap_or_default(),
            required: self.required,
            hidden: self.hidden,
            cumulative: self.is_cumulative(),
            value: self.render().unwrap_or_default(),
        }
    }
}

/// The ordered sequence of positional arguments on one node.
#[derive(Default)]
pub(crate) struct ArgGroup {
    args: Vec<ArgClause>,
}

impl ArgGroup {
    pub(crate) fn arg(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
    ) -> &mut ArgClause {
        self.args.push(ArgClause::new(name, help));
        self.args
            .last_mut()
            .expect("internal error - the argument was just pushed")
    }

    pub(crate) fn have(&self) -> bool {
        !self.args.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.args.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&ArgClause> {
        self.args.get(index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ArgClause> {
        self.args.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ArgClause> {
        self.args.iter_mut()
    }

    pub(crate) fn find(&self, name: &str) -> Option<&ArgClause> {
        self.args.iter().find(|a| a.name == name)
    }

    pub(crate) fn find_mut(&mut self, name: &str) -> Option<&mut ArgClause> {
        self.args.iter_mut().find(|a| a.name == name)
    }

    /// Structural validation: a required argument may not follow an optional
    /// one (except a lone trailing remainder), and only the last argument may
    /// consume the remainder.
    pub(crate) fn init(&mut self) -> Result<(), Error> {
        let count = self.args.len();
        let mut seen_optional = false;

        for (index, arg) in self.args.iter_mut().enumerate() {
            arg.init()?;
            let last = index + 1 == count;

            if arg.is_remainder() && !last {
                return Err(Error::config(format!(
                    "argument '{}' consumes remaining tokens but is not last",
                    arg.name
                )));
            }
            if arg.required {
                if seen_optional && !(last && arg.is_remainder()) {
                    return Err(Error::config(format!(
                        "required argument '{}' follows an optional argument",
                        arg.name
                    )));
                }
            } else {
                seen_optional = true;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_rejects_remainder_not_last() {
        let mut group = ArgGroup::default();
        group.arg("test", "").strings();
        group.arg("test2", "").string();
        assert_matches!(group.init().unwrap_err(), Error::Config(message) => {
            assert_eq!(message, "argument 'test' consumes remaining tokens but is not last");
        });
    }

    #[test]
    fn init_rejects_required_after_optional() {
        let mut group = ArgGroup::default();
        group.arg("a", "").string();
        group.arg("b", "").required().string();
        assert_matches!(group.init().unwrap_err(), Error::Config(message) => {
            assert_eq!(message, "required argument 'b' follows an optional argument");
        });
    }

    #[test]
    fn init_allows_trailing_required_remainder() {
        let mut group = ArgGroup::default();
        group.arg("a", "").string();
        group.arg("rest", "").required().strings();
        group.init().unwrap();
    }

    #[test]
    fn init_allows_required_then_optional() {
        let mut group = ArgGroup::default();
        group.arg("a", "").required().string();
        group.arg("b", "").required().string();
        group.arg("c", "").string();
        group.arg("d", "").string();
        group.init().unwrap();
    }
}
