//! The token-walking state machine.
//!
//! The walk resolves each token against the *active* group chain: the
//! application's own groups, extended by the groups of every command matched
//! so far. Flags are inherited downward through the chain; arguments and
//! subcommands are not. The walk stops at the first structural error.

use crate::api::arg::ArgClause;
use crate::api::flag::{FlagClause, FlagGroup};
use crate::api::Application;
use crate::error::Error;
use crate::parser::context::ParseContext;
use crate::tokens::Token;

#[cfg(feature = "tracing_debug")]
use tracing::debug;

struct Level<'a> {
    path: Vec<String>,
    flags: &'a FlagGroup,
}

fn lookup_long<'a>(levels: &[Level<'a>], name: &str) -> Option<(Vec<String>, &'a FlagClause)> {
    levels.iter().rev().find_map(|level| {
        level
            .flags
            .get_long(name)
            .map(|flag| (level.path.clone(), flag))
    })
}

fn lookup_short<'a>(levels: &[Level<'a>], short: char) -> Option<(Vec<String>, &'a FlagClause)> {
    levels.iter().rev().find_map(|level| {
        level
            .flags
            .get_short(short)
            .map(|flag| (level.path.clone(), flag))
    })
}

pub(crate) fn parse(context: &mut ParseContext, app: &Application) -> Result<(), Error> {
    let mut ignore_default = context.ignore_default();
    let mut levels: Vec<Level> = vec![Level {
        path: Vec::default(),
        flags: &app.flags,
    }];
    let mut pending_args: Vec<(Vec<String>, &ArgClause)> = app
        .args
        .iter()
        .map(|arg| (Vec::default(), arg))
        .collect();
    let mut next_arg = 0;
    let mut commands = &app.commands;

    loop {
        match context.tokens.peek() {
            Token::Eol => break,

            Token::EndOfFlags => {
                context.tokens.next();
            }

            Token::Long { .. } | Token::Short(_) => {
                let token = context.tokens.next();
                match match_flag(token, &levels, context) {
                    Ok(help) => {
                        if help {
                            ignore_default = true;
                        }
                    }
                    Err(error) => {
                        // Display re-parses tolerate unresolvable flags.
                        if !ignore_default {
                            return Err(error);
                        }
                    }
                }
            }

            Token::Arg(value) => {
                if commands.have() {
                    let (cmd, consume) = match commands.get(&value) {
                        Some(cmd) => (cmd, true),
                        None => match commands.default_child().filter(|_| !ignore_default) {
                            // The token is re-examined against the default
                            // command's own groups.
                            Some(cmd) => (cmd, false),
                            None => return Err(Error::ExpectedKnownCommand(value)),
                        },
                    };
                    if consume {
                        context.tokens.next();
                    }
                    #[cfg(feature = "tracing_debug")]
                    debug!(command = %cmd.full_command(), "descending into command");
                    if cmd.path == ["help"] {
                        ignore_default = true;
                    }
                    context.push_cmd(cmd.path.clone());
                    levels.push(Level {
                        path: cmd.path.clone(),
                        flags: &cmd.flags,
                    });
                    for arg in cmd.args.iter() {
                        pending_args.push((cmd.path.clone(), arg));
                    }
                    commands = &cmd.commands;
                } else if next_arg < pending_args.len() {
                    context.tokens.next();
                    if app.no_interspersed {
                        context.tokens.force_args_only();
                    }
                    let (owner, arg) = &pending_args[next_arg];
                    // A remainder argument keeps matching until the stream
                    // ends.
                    if !arg.is_remainder() {
                        next_arg += 1;
                    }
                    context.push_arg(owner.clone(), arg.name.clone(), value);
                } else {
                    // Leave the token for the caller's trailing-token check.
                    break;
                }
            }
        }
    }

    if !ignore_default {
        // Descend through any trailing chain of default commands.
        while let Some(cmd) = commands.default_child() {
            context.push_cmd(cmd.path.clone());
            commands = &cmd.commands;
        }
    }

    Ok(())
}

fn match_flag(token: Token, levels: &[Level], context: &mut ParseContext) -> Result<bool, Error> {
    match token {
        Token::Long { name, value } => match_long(name, value, levels, context),
        Token::Short(run) => match_short(run, levels, context),
        _ => unreachable!("internal error - only flag tokens are dispatched here"),
    }
}

fn match_long(
    name: String,
    attached: Option<String>,
    levels: &[Level],
    context: &mut ParseContext,
) -> Result<bool, Error> {
    // A flag literally registered with a `no-` prefix takes precedence over
    // negation parsing.
    let (owner, flag, negated) = match lookup_long(levels, &name) {
        Some((owner, flag)) => (owner, flag, false),
        None => {
            let negation = name
                .strip_prefix("no-")
                .and_then(|base| lookup_long(levels, base));
            match negation {
                Some((owner, flag)) if flag.is_negatable() && attached.is_none() => {
                    (owner, flag, true)
                }
                _ => return Err(Error::UnknownLongFlag(name)),
            }
        }
    };

    let value = if negated {
        "false".to_string()
    } else if flag.is_boolean() {
        attached.unwrap_or_else(|| "true".to_string())
    } else {
        match attached {
            Some(value) => value,
            None => match context.tokens.peek() {
                Token::Arg(value) => {
                    context.tokens.next();
                    value
                }
                _ => return Err(Error::ExpectedFlagArgument(flag.name.clone())),
            },
        }
    };

    #[cfg(feature = "tracing_debug")]
    debug!(flag = %flag.name, %value, "matched long flag");

    let help = owner.is_empty() && flag.name == "help";
    context.push_flag(owner, flag.name.clone(), value);
    Ok(help)
}

fn match_short(run: String, levels: &[Level], context: &mut ParseContext) -> Result<bool, Error> {
    let mut chars = run.chars();
    let Some(short) = chars.next() else {
        // A lone "-" token.
        return Err(Error::UnknownShortFlag('-'));
    };
    let rest = chars.as_str();

    let Some((owner, flag)) = lookup_short(levels, short) else {
        return Err(Error::UnknownShortFlag(short));
    };

    if flag.is_boolean() {
        let help = owner.is_empty() && flag.name == "help";
        context.push_flag(owner, flag.name.clone(), "true".to_string());
        // The remaining characters form their own run: `-abc` is `-a -bc`.
        if !rest.is_empty() {
            context.tokens.push(Token::Short(rest.to_string()));
        }
        return Ok(help);
    }

    // Only the last value-taking flag of a run may consume the attached
    // remainder: `-c10` is `-c=10`.
    let value = if !rest.is_empty() {
        rest.strip_prefix('=').unwrap_or(rest).to_string()
    } else {
        match context.tokens.peek() {
            Token::Arg(value) => {
                context.tokens.next();
                value
            }
            _ => return Err(Error::ExpectedFlagArgument(flag.name.clone())),
        }
    };

    #[cfg(feature = "tracing_debug")]
    debug!(flag = %flag.name, %value, "matched short flag");

    context.push_flag(owner, flag.name.clone(), value);
    Ok(false)
}
