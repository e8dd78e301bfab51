use crate::tokens::{tokenize, Token, TokenStream};

/// Which clause a [`ParseElement`] matched, addressed by the owning command
/// path (empty for the application level) and the clause name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementClause {
    /// A matched flag.
    Flag {
        /// Path of the command owning the flag; empty at application level.
        owner: Vec<String>,
        /// The flag's long name.
        name: String,
    },
    /// A matched positional argument.
    Arg {
        /// Path of the command owning the argument; empty at application
        /// level.
        owner: Vec<String>,
        /// The argument's name.
        name: String,
    },
    /// A matched command.
    Cmd {
        /// Full path of the command from the application root.
        path: Vec<String>,
    },
}

/// One matched clause with the raw string value it captured, in encounter
/// order. Commands carry no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseElement {
    /// The matched clause.
    pub clause: ElementClause,
    /// The raw captured token, before conversion. Boolean flags capture
    /// `"true"` or `"false"`.
    pub value: Option<String>,
}

/// The per-invocation record of one parse: the ordered matched elements, the
/// deepest selected command, and the (partially consumed) token stream.
///
/// Owned exclusively by one parse call; the internal re-parse used for help
/// rendering builds a fresh context rather than reusing this one.
pub struct ParseContext {
    pub(crate) elements: Vec<ParseElement>,
    pub(crate) selected: Option<Vec<String>>,
    pub(crate) raw_args: Vec<String>,
    pub(crate) tokens: TokenStream,
}

impl ParseContext {
    pub(crate) fn new(args: Vec<String>, ignore_default: bool) -> Self {
        Self {
            elements: Vec::default(),
            selected: None,
            raw_args: args.clone(),
            tokens: tokenize(args, ignore_default),
        }
    }

    /// The matched elements, in encounter order.
    pub fn elements(&self) -> &[ParseElement] {
        &self.elements
    }

    /// The deepest matched command as a space-joined path, if any.
    pub fn selected_command(&self) -> Option<String> {
        self.selected.as_ref().map(|path| path.join(" "))
    }

    /// The raw argument vector this context was built from.
    pub fn raw_args(&self) -> &[String] {
        &self.raw_args
    }

    /// Whether every token was consumed.
    pub fn eol(&mut self) -> bool {
        self.tokens.eol()
    }

    pub(crate) fn ignore_default(&self) -> bool {
        self.tokens.ignore_default
    }

    pub(crate) fn args_only(&self) -> bool {
        self.tokens.args_only()
    }

    pub(crate) fn peek_display(&mut self) -> String {
        match self.tokens.peek() {
            Token::Eol => "<EOL>".to_string(),
            token => token.to_string(),
        }
    }

    pub(crate) fn push_flag(&mut self, owner: Vec<String>, name: String, value: String) {
        self.elements.push(ParseElement {
            clause: ElementClause::Flag { owner, name },
            value: Some(value),
        });
    }

    pub(crate) fn push_arg(&mut self, owner: Vec<String>, name: String, value: String) {
        self.elements.push(ParseElement {
            clause: ElementClause::Arg { owner, name },
            value: Some(value),
        });
    }

    pub(crate) fn push_cmd(&mut self, path: Vec<String>) {
        self.selected = Some(path.clone());
        self.elements.push(ParseElement {
            clause: ElementClause::Cmd { path },
            value: None,
        });
    }

    /// Whether the application-level help flag was matched.
    pub(crate) fn help_requested(&self) -> bool {
        self.elements.iter().any(|element| {
            matches!(
                &element.clause,
                ElementClause::Flag { owner, name } if owner.is_empty() && name == "help"
            )
        })
    }
}
