//! Argument quoting/parsing collaborators: [`WindowsQuoter`] and [`UnixQuoter`].
//!
//! Declared out of scope for the runtime (§1: "command-line argument quoting ... specified
//! only at interface level"), but kept in the crate as the concrete collaborator the
//! interface names, grounded on the teacher's own `spawn.rs::assemble_cmdline`/
//! `append_quoted` (a direct translation of the MSVC `ArgvQuote` algorithm) and
//! `tests/escape-args.rs`.

/// Which argument-quoting convention a command line follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentSyntax {
    /// MSVC C runtime argv rules.
    Windows,
    /// Bourne-shell single-word rules (GLib's `g_shell_quote`/`g_shell_unquote`).
    Unix,
}

impl ArgumentSyntax {
    /// The syntax that matches the platform this crate is actually compiled for.
    pub fn native() -> Self {
        if cfg!(windows) {
            ArgumentSyntax::Windows
        } else {
            ArgumentSyntax::Unix
        }
    }

    /// Renders `args` as one quoted command-line string under this syntax.
    pub fn quote(self, args: &[String]) -> String {
        match self {
            ArgumentSyntax::Windows => WindowsQuoter::quote(args),
            ArgumentSyntax::Unix => UnixQuoter::quote(args),
        }
    }
}

/// Quotes/parses argument lists the way the MSVC C runtime's argv parser does.
///
/// Backslash runs only matter immediately before a `"`: every backslash is doubled, and the
/// `"` itself is escaped as `\"`. A run of backslashes that isn't followed by a `"` (e.g. at
/// the end of the argument) is passed through unchanged.
pub struct WindowsQuoter;

impl WindowsQuoter {
    /// Quotes a full argument list into one command-line string, space-separated.
    pub fn quote(args: &[String]) -> String {
        args.iter()
            .map(|a| Self::quote_one(a))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Quotes a single argument. Arguments with no characters that need escaping are passed
    /// through bare, matching `append_quoted`'s fast path.
    pub fn quote_one(arg: &str) -> String {
        if !arg.is_empty()
            && !arg
                .chars()
                .any(|c| matches!(c, ' ' | '\t' | '\n' | '\x0b' | '"'))
        {
            return arg.to_string();
        }

        let mut out = String::with_capacity(arg.len() + 2);
        out.push('"');
        let chars: Vec<char> = arg.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let mut backslashes = 0;
            while i < chars.len() && chars[i] == '\\' {
                backslashes += 1;
                i += 1;
            }
            if i == chars.len() {
                out.extend(std::iter::repeat_n('\\', backslashes * 2));
                break;
            } else if chars[i] == '"' {
                out.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                out.push('"');
            } else {
                out.extend(std::iter::repeat_n('\\', backslashes));
                out.push(chars[i]);
            }
            i += 1;
        }
        out.push('"');
        out
    }

    /// Parses a command line produced by [`quote`](Self::quote) back into its argument list.
    /// The inverse of `CommandLineToArgvW`.
    pub fn parse(cmdline: &str) -> Vec<String> {
        let chars: Vec<char> = cmdline.chars().collect();
        let mut args = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            while i < chars.len() && chars[i] == ' ' {
                i += 1;
            }
            if i == chars.len() {
                break;
            }
            let mut arg = String::new();
            let mut in_quotes = false;
            while i < chars.len() && (in_quotes || chars[i] != ' ') {
                if chars[i] == '\\' {
                    let mut backslashes = 0;
                    while i < chars.len() && chars[i] == '\\' {
                        backslashes += 1;
                        i += 1;
                    }
                    if i < chars.len() && chars[i] == '"' {
                        arg.extend(std::iter::repeat_n('\\', backslashes / 2));
                        if backslashes % 2 == 1 {
                            arg.push('"');
                        } else {
                            in_quotes = !in_quotes;
                        }
                        i += 1;
                    } else {
                        arg.extend(std::iter::repeat_n('\\', backslashes));
                    }
                } else if chars[i] == '"' {
                    in_quotes = !in_quotes;
                    i += 1;
                } else {
                    arg.push(chars[i]);
                    i += 1;
                }
            }
            args.push(arg);
        }
        args
    }
}

/// Quotes/parses argument lists following Bourne-shell single-word rules, as documented by
/// GLib's `g_shell_quote`/`g_shell_unquote`: every argument becomes one single-quoted word,
/// with embedded `'` escaped as `'\''` (close the quote, emit a literal backslash-quote,
/// reopen the quote).
pub struct UnixQuoter;

impl UnixQuoter {
    /// Quotes a full argument list into one command-line string, space-separated.
    pub fn quote(args: &[String]) -> String {
        args.iter()
            .map(|a| Self::quote_one(a))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Quotes a single argument.
    pub fn quote_one(arg: &str) -> String {
        let mut out = String::with_capacity(arg.len() + 2);
        out.push('\'');
        for c in arg.chars() {
            if c == '\'' {
                out.push_str("'\\''");
            } else {
                out.push(c);
            }
        }
        out.push('\'');
        out
    }

    /// Parses a command line produced by [`quote`](Self::quote) back into its argument list.
    pub fn parse(cmdline: &str) -> Vec<String> {
        let mut args = Vec::new();
        let mut chars = cmdline.chars().peekable();
        loop {
            while chars.peek() == Some(&' ') {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }
            let mut arg = String::new();
            let mut in_quotes = false;
            while let Some(&c) = chars.peek() {
                if !in_quotes && c == ' ' {
                    break;
                }
                chars.next();
                match c {
                    '\'' => in_quotes = !in_quotes,
                    '\\' if !in_quotes => {
                        if let Some(escaped) = chars.next() {
                            arg.push(escaped);
                        }
                    }
                    _ => arg.push(c),
                }
            }
            args.push(arg);
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ARGS: &[&str] = &[
        "x", "", " ", "  ", r" \ ", r" \\ ", r" \\\ ", r#"""#, r#""""#, r#"\"\\""#, "æ÷", "šđ",
        "本", "❤", "☃",
    ];

    #[test]
    fn windows_quoter_round_trips_every_sample_argument() {
        for &arg in SAMPLE_ARGS {
            let args = vec![arg.to_string()];
            let quoted = WindowsQuoter::quote(&args);
            assert_eq!(WindowsQuoter::parse(&quoted), args, "arg = {arg:?}");
        }
    }

    #[test]
    fn windows_quoter_round_trips_a_full_argument_list() {
        let args: Vec<String> = SAMPLE_ARGS.iter().map(|s| s.to_string()).collect();
        let quoted = WindowsQuoter::quote(&args);
        assert_eq!(WindowsQuoter::parse(&quoted), args);
    }

    #[test]
    fn windows_quoter_leaves_plain_arguments_bare() {
        assert_eq!(WindowsQuoter::quote_one("plain"), "plain");
    }

    #[test]
    fn unix_quoter_round_trips_every_sample_argument() {
        for &arg in SAMPLE_ARGS {
            let args = vec![arg.to_string()];
            let quoted = UnixQuoter::quote(&args);
            assert_eq!(UnixQuoter::parse(&quoted), args, "arg = {arg:?}");
        }
    }

    #[test]
    fn unix_quoter_round_trips_a_full_argument_list() {
        let args: Vec<String> = SAMPLE_ARGS.iter().map(|s| s.to_string()).collect();
        let quoted = UnixQuoter::quote(&args);
        assert_eq!(UnixQuoter::parse(&quoted), args);
    }

    #[test]
    fn zero_length_argument_list_quotes_to_empty_string() {
        assert_eq!(WindowsQuoter::quote(&[]), "");
        assert_eq!(UnixQuoter::quote(&[]), "");
    }
}
