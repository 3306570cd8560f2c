//! Minimal POSIX shell quoting

/// Characters that force an argument to be quoted
const SHELL_META: &str = "\"'\\$`!*?<>|&;()[]{}#~=%";

/// Quote a string for safe inclusion in a POSIX shell command line.
///
/// Strings without whitespace or shell metacharacters are returned unchanged.
/// Everything else is wrapped in single quotes, with embedded single quotes
/// written as `'\''`. The empty string becomes `''`.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.contains(|c: char| c.is_whitespace() || SHELL_META.contains(c)) {
        format!("'{}'", s.replace('\'', r"'\''"))
    } else {
        s.to_string()
    }
}

/// Quote every argument and join them with spaces
pub fn shell_join<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|a| shell_quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
