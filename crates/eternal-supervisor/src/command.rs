// ABOUTME: Splits a service's exec string into a program and its arguments.
// ABOUTME: Words are split with shell quoting rules via shlex; nothing is expanded.

use crate::error::CommandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Parse a command line with POSIX shell quoting rules. No expansion is
    /// performed: `$VAR`, globs and pipes are passed through literally.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = shlex::split(line).ok_or(CommandError::Unbalanced)?.into_iter();
        let program = words.next().ok_or(CommandError::Empty)?;
        if program.is_empty() {
            return Err(CommandError::Empty);
        }
        Ok(Self {
            program,
            args: words.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> (String, Vec<String>) {
        let cmd = CommandLine::parse(line).unwrap();
        (cmd.program, cmd.args)
    }

    #[test]
    fn test_plain_words() {
        let (program, args) = parse("  sleep   100 ");
        assert_eq!(program, "sleep");
        assert_eq!(args, vec!["100"]);
    }

    #[test]
    fn test_quoted_arguments() {
        let (program, args) = parse(r#"sh -c 'echo "hi there"; exit 3'"#);
        assert_eq!(program, "sh");
        assert_eq!(args, vec!["-c", r#"echo "hi there"; exit 3"#]);

        let (_, args) = parse(r#"printf "%s\n" "a \"b\"" """#);
        assert_eq!(args, vec![r"%s\n", r#"a "b""#, ""]);
    }

    #[test]
    fn test_backslash_escapes_space() {
        let (program, args) = parse(r"/opt/my\ app/run --flag");
        assert_eq!(program, "/opt/my app/run");
        assert_eq!(args, vec!["--flag"]);
    }

    #[test]
    fn test_adjacent_quotes_join() {
        let (_, args) = parse(r#"echo pre'fix'"post""#);
        assert_eq!(args, vec!["prefixpost"]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(CommandLine::parse(""), Err(CommandError::Empty));
        assert_eq!(CommandLine::parse("   \t"), Err(CommandError::Empty));
        assert_eq!(CommandLine::parse("''"), Err(CommandError::Empty));
        assert_eq!(
            CommandLine::parse("sh -c 'oops"),
            Err(CommandError::Unbalanced)
        );
        assert_eq!(
            CommandLine::parse("echo \"oops"),
            Err(CommandError::Unbalanced)
        );
        assert_eq!(
            CommandLine::parse("echo oops\\"),
            Err(CommandError::Unbalanced)
        );
    }
}
