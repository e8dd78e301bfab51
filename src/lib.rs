//! `argot` is a declarative command line parser.
//!
//! Applications describe their flags, positional arguments, and nested
//! commands up front through fluent builders; one parse call then tokenizes
//! the argument vector, matches it against that declaration, resolves
//! defaults (including environment variables), assigns typed values, and
//! dispatches callbacks. The same declaration drives help rendering, shell
//! completion, introspection, and plugin delegation.
//!
//! # Usage
//! ```
//! use argot::Application;
//!
//! let mut app = Application::new("greet", "Greets people.");
//! app.terminate(|_| {});
//! let name = app.flag("name", "Who to greet.").short('n').default("world").string();
//! let shout = app.flag("shout", "Greet loudly.").boolean();
//!
//! app.parse(["--name=sam", "--shout"]).unwrap();
//! assert_eq!(name.get(), "sam");
//! assert!(shout.get());
//! ```
//!
//! Declarations are *typed*: the terminal builder method (`string()`,
//! `int()`, `duration()`, ...) installs a [`Value`] converter and hands back
//! a [`Binding`] onto the converter's storage. Anything implementing
//! [`std::str::FromStr`] works through [`FlagClause::of`].
//!
//! # Commands
//! Commands nest arbitrarily and may carry their own flags and arguments.
//! Flags are inherited downward: a flag declared on the application resolves
//! inside every command. The parse returns the space-joined selected path.
//!
//! ```
//! use argot::Application;
//!
//! let mut app = Application::new("repo", "Manage repositories.");
//! app.terminate(|_| {});
//! let clone = app.command("clone", "Clone a repository.");
//! let url = clone.arg("url", "Repository URL.").required().string();
//!
//! let selected = app.parse(["clone", "https://example.com/x.git"]).unwrap();
//! assert_eq!(selected, "clone");
//! assert_eq!(url.get(), "https://example.com/x.git");
//! ```
//!
//! # Defaults and environment variables
//! A clause resolves, in order: the user's token, the bound environment
//! variable, the declared defaults, the converter's zero value. Required
//! clauses satisfied by an envar or default do not error. Defaults pass
//! through the same converter as user input, so a bad default surfaces
//! rather than being silently trusted.
//!
//! # Plugins
//! [`Application::external_plugin_json`] grafts a command subtree declared by
//! another program's exported model; selecting one of its leaves re-builds
//! the child's argument vector from the values the user actually set and
//! executes it. See the module documentation of the model types for the wire
//! contract.
#![deny(missing_docs)]
mod api;
mod duration;
mod error;
mod model;
mod parser;
mod plugin;
mod tokens;
mod usage;
mod value;

pub use api::{Action, Application, ArgClause, CmdClause, FlagClause};
pub use duration::parse_duration;
pub use error::Error;
pub use model::{ApplicationModel, ArgModel, CmdModel, FlagModel};
pub use parser::{ElementClause, ParseContext, ParseElement};
pub use tokens::{Token, TokenStream};
pub use usage::{ConsoleInterface, UserInterface};
pub use value::{Binding, BooleanCapable, CumulativeCapable, RemainderCapable, Value};

#[cfg(test)]
#[macro_use]
extern crate assert_matches;
