//! Shell quoting utilities, used to render OS commands for logs and to split
//! command listings back into argument vectors.

/// Quote a string for display as a shell word.
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars().all(is_plain) {
        return s.to_string();
    }

    // abc's -> 'abc'"'"'s'
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

/// Characters that never need quoting in a rendered firewall command.
fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '-' | '_' | '=' | '.' | ',' | ':' | '/' | '@' | '%' | '+')
}

/// Render a program and its arguments as a single quoted command line.
pub fn command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    std::iter::once(quote(program))
        .chain(args.iter().map(|a| quote(a.as_ref())))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a shell command string into arguments.
pub fn split_args(s: &str) -> Result<Vec<String>, shell_words::ParseError> {
    shell_words::split(s)
}
