use std::collections::VecDeque;
use std::fmt;

/// A syntactically classified command line token.
///
/// Classification here is purely lexical: a token that *looks* like a flag is
/// a flag token, whether or not any such flag is declared. Resolving it
/// against the clause tree is the parser's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `--NAME` or `--NAME=VALUE`, split at the first `=`.
    Long {
        /// The flag name, without the leading dashes.
        name: String,
        /// The attached value, when the `=` form was used.
        value: Option<String>,
    },
    /// `-abc`: one or more short flags, possibly with an attached value for
    /// the last one. Carried verbatim; the parser decomposes the run.
    Short(String),
    /// A positional token.
    Arg(String),
    /// The literal `--` separator; all subsequent tokens are positional.
    EndOfFlags,
    /// End of the token stream.
    Eol,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Long { name, value: None } => write!(f, "--{name}"),
            Token::Long {
                name,
                value: Some(value),
            } => write!(f, "--{name}={value}"),
            Token::Short(run) => write!(f, "-{run}"),
            Token::Arg(value) => write!(f, "{value}"),
            Token::EndOfFlags => write!(f, "--"),
            Token::Eol => write!(f, "<EOL>"),
        }
    }
}

/// Convert a raw argument vector into a [`TokenStream`].
///
/// `ignore_default` is carried on the stream for the parse walk: it is set on
/// the internal re-parses used for help and completion, where default
/// commands must not be selected and unresolvable flags are skipped.
pub(crate) fn tokenize(args: Vec<String>, ignore_default: bool) -> TokenStream {
    TokenStream {
        args: args.into(),
        pushed: None,
        args_only: false,
        ignore_default,
    }
}

/// A lazy, peekable token stream with a single push-back slot.
#[derive(Debug)]
pub struct TokenStream {
    args: VecDeque<String>,
    pushed: Option<Token>,
    args_only: bool,
    pub(crate) ignore_default: bool,
}

impl TokenStream {
    /// Consume and return the next token.
    pub fn next(&mut self) -> Token {
        if let Some(token) = self.pushed.take() {
            return token;
        }

        let Some(arg) = self.args.pop_front() else {
            return Token::Eol;
        };

        if self.args_only {
            return Token::Arg(arg);
        }

        if arg == "--" {
            // A trailing separator is dropped without entering args-only
            // mode, so shell completion can still offer flags for it.
            if self.args.is_empty() {
                return Token::Eol;
            }
            self.args_only = true;
            return Token::EndOfFlags;
        }

        if let Some(rest) = arg.strip_prefix("--") {
            return match rest.split_once('=') {
                Some((name, value)) => Token::Long {
                    name: name.to_string(),
                    value: Some(value.to_string()),
                },
                None => Token::Long {
                    name: rest.to_string(),
                    value: None,
                },
            };
        }

        if let Some(run) = arg.strip_prefix('-') {
            // A lone "-" surfaces as an empty run; the parser rejects it.
            return Token::Short(run.to_string());
        }

        Token::Arg(arg)
    }

    /// Return the next token without consuming it.
    pub fn peek(&mut self) -> Token {
        let token = self.next();
        self.push(token.clone());
        token
    }

    /// Push a single token back onto the stream.
    pub fn push(&mut self, token: Token) {
        debug_assert!(self.pushed.is_none(), "push-back slot already occupied");
        self.pushed = Some(token);
    }

    /// Whether the stream is exhausted.
    pub fn eol(&mut self) -> bool {
        matches!(self.peek(), Token::Eol)
    }

    /// Treat every remaining token as positional, as after the `--`
    /// separator. Used for non-interspersed parsing.
    pub(crate) fn force_args_only(&mut self) {
        self.args_only = true;
    }

    pub(crate) fn args_only(&self) -> bool {
        self.args_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn stream(args: &[&str]) -> TokenStream {
        tokenize(args.iter().map(|a| a.to_string()).collect(), false)
    }

    #[rstest]
    #[case("--verbose", Token::Long { name: "verbose".to_string(), value: None })]
    #[case("--key=value", Token::Long { name: "key".to_string(), value: Some("value".to_string()) })]
    #[case("--key=a=b", Token::Long { name: "key".to_string(), value: Some("a=b".to_string()) })]
    #[case("--key=", Token::Long { name: "key".to_string(), value: Some("".to_string()) })]
    #[case("-v", Token::Short("v".to_string()))]
    #[case("-abc10", Token::Short("abc10".to_string()))]
    #[case("-", Token::Short("".to_string()))]
    #[case("value", Token::Arg("value".to_string()))]
    #[case("", Token::Arg("".to_string()))]
    fn classify(#[case] arg: &str, #[case] expected: Token) {
        let mut ts = stream(&[arg]);
        assert_eq!(ts.next(), expected);
        assert_eq!(ts.next(), Token::Eol);
    }

    #[test]
    fn separator_flips_to_positional() {
        let mut ts = stream(&["a", "--", "--flag", "-x"]);
        assert_eq!(ts.next(), Token::Arg("a".to_string()));
        assert_eq!(ts.next(), Token::EndOfFlags);
        assert_eq!(ts.next(), Token::Arg("--flag".to_string()));
        assert_eq!(ts.next(), Token::Arg("-x".to_string()));
        assert_eq!(ts.next(), Token::Eol);
    }

    #[test]
    fn trailing_separator_is_dropped() {
        let mut ts = stream(&["a", "--"]);
        assert_eq!(ts.next(), Token::Arg("a".to_string()));
        assert_eq!(ts.next(), Token::Eol);
        assert!(!ts.args_only());
    }

    #[test]
    fn forced_args_only() {
        let mut ts = stream(&["a1", "--flag=flag"]);
        assert_eq!(ts.next(), Token::Arg("a1".to_string()));
        ts.force_args_only();
        assert_eq!(ts.next(), Token::Arg("--flag=flag".to_string()));
    }

    #[test]
    fn peek_and_push_back() {
        let mut ts = stream(&["a", "b"]);
        assert_eq!(ts.peek(), Token::Arg("a".to_string()));
        assert_eq!(ts.next(), Token::Arg("a".to_string()));
        ts.push(Token::Short("xy".to_string()));
        assert_eq!(ts.next(), Token::Short("xy".to_string()));
        assert_eq!(ts.next(), Token::Arg("b".to_string()));
        assert!(ts.eol());
    }
}
