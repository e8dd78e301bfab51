//! Output seam and usage rendering.
//!
//! The core never writes to process streams directly; everything user-visible
//! funnels through a [`UserInterface`], so embedders and tests can capture or
//! redirect it.

use terminal_size::{terminal_size, Width};

use crate::model::{arg_summary, flag_summary, ApplicationModel, ArgModel, CmdModel, FlagModel};

/// Where usage text, errors, and completion candidates are written.
pub trait UserInterface {
    /// Display output (usage text, versions, completion candidates).
    fn print(&self, message: String);

    /// Error output (parse errors, error-path usage).
    fn print_error(&self, message: String);
}

/// The default interface: `print` to stdout, `print_error` to stderr.
#[derive(Default)]
pub struct ConsoleInterface {}

impl UserInterface for ConsoleInterface {
    fn print(&self, message: String) {
        println!("{message}");
    }

    fn print_error(&self, message: String) {
        eprintln!("{message}");
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum UsageStyle {
    /// Usage line, commands, flags, and arguments.
    Full,
    /// Usage line and command listing only; used after command-selection
    /// errors to keep the next step obvious.
    Compact,
}

const PADDING: usize = 2;
const MAX_LEFT: usize = 28;
const DEFAULT_WIDTH: usize = 80;

fn output_width() -> usize {
    match terminal_size() {
        Some((Width(w), _)) => w as usize,
        None => DEFAULT_WIDTH,
    }
}

/// Greedy word wrap, hard-splitting words longer than `width`.
fn chunk(paragraph: &str, width: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::default();
    let mut current = String::default();

    for word in paragraph.split(' ') {
        if word.is_empty() {
            continue;
        }
        let mut word = word;
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let (head, tail) = word.split_at(width);
            lines.push(head.to_string());
            word = tail;
        }
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + word.len() + 1 <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// Render rows as an indented two-column table, wrapping the right column.
fn two_columns(out: &mut String, rows: &[(String, String)], total_width: usize) {
    let left_width = rows
        .iter()
        .map(|(left, _)| left.len())
        .filter(|len| *len <= MAX_LEFT)
        .max()
        .unwrap_or(0);
    let right_width = total_width.saturating_sub(left_width + PADDING + 2).max(20);

    for (left, right) in rows {
        let parts = chunk(right, right_width);
        if left.len() > MAX_LEFT {
            // Overlong labels get their own line.
            out.push_str(&format!("  {left}\n"));
            for part in &parts {
                out.push_str(&format!("  {:left_width$}{:PADDING$}{part}\n", "", ""));
            }
            continue;
        }
        match parts.split_first() {
            None => out.push_str(&format!("  {left}\n")),
            Some((first, others)) => {
                out.push_str(&format!("  {left:left_width$}{:PADDING$}{first}\n", ""));
                for part in others {
                    out.push_str(&format!("  {:left_width$}{:PADDING$}{part}\n", "", ""));
                }
            }
        }
    }
}

fn format_flag(flag: &FlagModel, have_short: bool) -> String {
    let name = if flag.negatable {
        format!("[no-]{}", flag.name)
    } else {
        flag.name.clone()
    };

    let mut out = match flag.short {
        Some(short) => format!("-{short}, --{name}"),
        None if have_short => format!("    --{name}"),
        None => format!("--{name}"),
    };

    if !flag.boolean {
        out.push_str(&format!("={}", flag.format_place_holder()));
    }
    if flag.cumulative {
        out.push_str(" ...");
    }
    out
}

fn format_arg(arg: &ArgModel) -> String {
    if arg.place_holder.is_empty() {
        format!("<{}>", arg.name)
    } else {
        arg.place_holder.clone()
    }
}

/// Render usage for the application, or for the command chain selected by a
/// parse, composed from the model's derived summaries.
pub(crate) fn render(app: &ApplicationModel, chain: &[&CmdModel], style: UsageStyle) -> String {
    let width = output_width();
    let target_flags = chain.last().map(|cmd| &cmd.flags).unwrap_or(&app.flags);
    let target_args = chain.last().map(|cmd| &cmd.args).unwrap_or(&app.args);
    let target_cmds = chain.last().map(|cmd| &cmd.commands).unwrap_or(&app.commands);

    let mut usage = format!("usage: {}", app.name);
    if let Some(target) = chain.last() {
        usage.push_str(&format!(" {}", target.full_command));
    }
    let flags = flag_summary(target_flags);
    if !flags.is_empty() {
        usage.push_str(&format!(" {flags}"));
    }
    let args = arg_summary(
        &target_args
            .iter()
            .filter(|arg| !arg.hidden)
            .cloned()
            .collect::<Vec<_>>(),
    );
    if !args.is_empty() {
        usage.push_str(&format!(" {args}"));
    }
    if target_cmds.iter().any(|cmd| !cmd.hidden) {
        usage.push_str(" <command> [<args> ...]");
    }

    let mut out = usage;
    out.push('\n');

    let help = match chain.last() {
        Some(target) if !target.help_long.is_empty() => &target.help_long,
        Some(target) if !target.help.is_empty() => &target.help,
        _ => &app.help,
    };
    if !help.is_empty() {
        out.push('\n');
        for line in chunk(help, width.saturating_sub(2).max(20)) {
            out.push_str(&line);
            out.push('\n');
        }
    }

    let visible_cmds: Vec<&CmdModel> = target_cmds.iter().filter(|cmd| !cmd.hidden).collect();
    if !visible_cmds.is_empty() {
        out.push_str("\nCommands:\n");
        let rows: Vec<(String, String)> = visible_cmds
            .iter()
            .map(|cmd| {
                let mut left = cmd.name.clone();
                if !cmd.aliases.is_empty() {
                    left.push_str(&format!(" ({})", cmd.aliases.join(", ")));
                }
                (left, cmd.help.clone())
            })
            .collect();
        two_columns(&mut out, &rows, width);
    }

    if style == UsageStyle::Compact {
        return out;
    }

    let mut visible_flags: Vec<&FlagModel> = app.flags.iter().filter(|f| !f.hidden).collect();
    if !chain.is_empty() {
        for cmd in chain {
            visible_flags.extend(cmd.flags.iter().filter(|f| !f.hidden));
        }
    }
    if !visible_flags.is_empty() {
        let have_short = visible_flags.iter().any(|f| f.short.is_some());
        out.push_str("\nFlags:\n");
        let rows: Vec<(String, String)> = visible_flags
            .iter()
            .map(|flag| (format_flag(flag, have_short), flag.help_with_envar()))
            .collect();
        two_columns(&mut out, &rows, width);
    }

    let visible_args: Vec<&ArgModel> = target_args.iter().filter(|a| !a.hidden).collect();
    if !visible_args.is_empty() {
        out.push_str("\nArgs:\n");
        let rows: Vec<(String, String)> = visible_args
            .iter()
            .map(|arg| (format_arg(arg), arg.help_with_envar()))
            .collect();
        two_columns(&mut out, &rows, width);
    }

    out
}

#[cfg(test)]
pub(crate) mod util {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::UserInterface;

    /// A capturing interface for tests; the handle reads what was printed.
    pub(crate) fn capture_interface() -> (CaptureInterface, CaptureHandle) {
        let output = Rc::new(RefCell::new(String::default()));
        let errors = Rc::new(RefCell::new(String::default()));
        (
            CaptureInterface {
                output: Rc::clone(&output),
                errors: Rc::clone(&errors),
            },
            CaptureHandle { output, errors },
        )
    }

    pub(crate) struct CaptureInterface {
        output: Rc<RefCell<String>>,
        errors: Rc<RefCell<String>>,
    }

    impl UserInterface for CaptureInterface {
        fn print(&self, message: String) {
            let mut output = self.output.borrow_mut();
            output.push_str(&message);
            output.push('\n');
        }

        fn print_error(&self, message: String) {
            let mut errors = self.errors.borrow_mut();
            errors.push_str(&message);
            errors.push('\n');
        }
    }

    pub(crate) struct CaptureHandle {
        output: Rc<RefCell<String>>,
        errors: Rc<RefCell<String>>,
    }

    impl CaptureHandle {
        pub(crate) fn output(&self) -> String {
            self.output.borrow().clone()
        }

        pub(crate) fn errors(&self) -> String {
            self.errors.borrow().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::assert_contains;

    #[test]
    fn chunk_wraps_words() {
        assert_eq!(
            chunk("one two three four", 9),
            vec!["one two".to_string(), "three".to_string(), "four".to_string()]
        );
    }

    #[test]
    fn chunk_splits_long_words() {
        assert_eq!(
            chunk("abcdefghij", 4),
            vec!["abcd".to_string(), "efgh".to_string(), "ij".to_string()]
        );
    }

    #[test]
    fn format_flag_forms() {
        let mut flag = FlagModel {
            name: "yes".to_string(),
            boolean: true,
            negatable: true,
            ..FlagModel::default()
        };
        assert_eq!(format_flag(&flag, false), "--[no-]yes");

        flag.negatable = false;
        assert_eq!(format_flag(&flag, false), "--yes");

        flag.boolean = false;
        flag.short = Some('y');
        assert_eq!(format_flag(&flag, true), "-y, --yes=YES");

        flag.short = None;
        assert_eq!(format_flag(&flag, true), "    --yes=YES");
    }

    #[test]
    fn render_full_and_compact() {
        let app = ApplicationModel {
            name: "tool".to_string(),
            help: "A tool.".to_string(),
            flags: vec![FlagModel {
                name: "verbose".to_string(),
                help: "Say more.".to_string(),
                boolean: true,
                negatable: true,
                ..FlagModel::default()
            }],
            commands: vec![
                CmdModel {
                    name: "run".to_string(),
                    help: "Run it.".to_string(),
                    ..CmdModel::default()
                },
                CmdModel {
                    name: "secret".to_string(),
                    hidden: true,
                    ..CmdModel::default()
                },
            ],
            ..ApplicationModel::default()
        };

        let full = render(&app, &[], UsageStyle::Full);
        assert_contains!(full, "usage: tool");
        assert_contains!(full, "<command> [<args> ...]");
        assert_contains!(full, "Commands:");
        assert_contains!(full, "run");
        assert_contains!(full, "Flags:");
        assert_contains!(full, "--[no-]verbose");
        assert!(!full.contains("secret"));

        let compact = render(&app, &[], UsageStyle::Compact);
        assert_contains!(compact, "Commands:");
        assert!(!compact.contains("Flags:"));
    }

    #[test]
    fn render_command_chain() {
        let app = ApplicationModel {
            name: "tool".to_string(),
            help: "A tool.".to_string(),
            ..ApplicationModel::default()
        };
        let cmd = CmdModel {
            name: "run".to_string(),
            help: "Run it.".to_string(),
            full_command: "run".to_string(),
            args: vec![ArgModel {
                name: "target".to_string(),
                help: "What to run.".to_string(),
                required: true,
                ..ArgModel::default()
            }],
            ..CmdModel::default()
        };

        let out = render(&app, &[&cmd], UsageStyle::Full);
        assert_contains!(out, "usage: tool run <target>");
        assert_contains!(out, "Args:");
        assert_contains!(out, "<target>");
        assert_contains!(out, "What to run.");
    }
}
