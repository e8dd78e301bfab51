mod application;
pub(crate) mod arg;
pub(crate) mod cmd;
pub(crate) mod flag;

use std::rc::Rc;

use crate::error::Error;
use crate::parser::ParseContext;

pub use application::Application;
pub use arg::ArgClause;
pub use cmd::CmdClause;
pub use flag::FlagClause;

/// A callback dispatched for a matched clause after parsing. Actions run
/// only after the whole pipeline succeeds; pre-actions run right after value
/// assignment.
pub type Action = Rc<dyn Fn(&Application, &ParseContext) -> Result<(), Error>>;
