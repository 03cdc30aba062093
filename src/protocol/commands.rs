//! Command parsing
//!
//! Represents one client command as a tagged enum, re-parsed from each
//! control-channel line. Verbs match case-insensitively; the argument is
//! the raw remainder of the line and may be empty.

use std::fmt;

/// A parsed FTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    Quit,
    Syst,
    Noop,
    Pwd,
    Type(String),
    Cwd(String),
    Pasv,
    List,
    Nlst,
    Size(String),
    Mdtm(String),
    Retr(String),
    Stor(String),
    Feat,
    Auth(String),
    /// Anything else, carried as the whitespace-collapsed original line.
    Unknown(String),
}

impl Command {
    /// Parses one control-channel line into a command.
    ///
    /// A line with no recognizable verb, including the empty line, parses
    /// to `Unknown` rather than failing.
    pub fn parse(line: &str) -> Command {
        let trimmed = line.trim();
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let verb = parts.next().unwrap_or("").to_ascii_uppercase();
        let arg = parts.next().unwrap_or("").trim().to_string();

        match verb.as_str() {
            "USER" => Command::User(arg),
            "PASS" => Command::Pass(arg),
            "QUIT" => Command::Quit,
            "SYST" => Command::Syst,
            "NOOP" => Command::Noop,
            "PWD" => Command::Pwd,
            "TYPE" => Command::Type(arg),
            "CWD" => Command::Cwd(arg),
            "PASV" => Command::Pasv,
            "LIST" => Command::List,
            "NLST" => Command::Nlst,
            "SIZE" => Command::Size(arg),
            "MDTM" => Command::Mdtm(arg),
            "RETR" => Command::Retr(arg),
            "STOR" => Command::Stor(arg),
            "FEAT" => Command::Feat,
            "AUTH" => Command::Auth(arg),
            _ => Command::Unknown(collapse_whitespace(trimmed)),
        }
    }

    /// USER, PASS and QUIT are the only verbs accepted before login.
    pub fn allowed_before_login(&self) -> bool {
        matches!(
            self,
            Command::User(_) | Command::Pass(_) | Command::Quit
        )
    }
}

/// Loggable rendering; never exposes the password.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::User(name) => write!(f, "USER {name}"),
            Command::Pass(_) => write!(f, "PASS ****"),
            Command::Quit => write!(f, "QUIT"),
            Command::Syst => write!(f, "SYST"),
            Command::Noop => write!(f, "NOOP"),
            Command::Pwd => write!(f, "PWD"),
            Command::Type(code) => write!(f, "TYPE {code}"),
            Command::Cwd(path) => write!(f, "CWD {path}"),
            Command::Pasv => write!(f, "PASV"),
            Command::List => write!(f, "LIST"),
            Command::Nlst => write!(f, "NLST"),
            Command::Size(name) => write!(f, "SIZE {name}"),
            Command::Mdtm(name) => write!(f, "MDTM {name}"),
            Command::Retr(name) => write!(f, "RETR {name}"),
            Command::Stor(name) => write!(f, "STOR {name}"),
            Command::Feat => write!(f, "FEAT"),
            Command::Auth(arg) => write!(f, "AUTH {arg}"),
            Command::Unknown(raw) => write!(f, "? {raw}"),
        }
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_match_case_insensitively() {
        assert_eq!(Command::parse("user bob"), Command::User("bob".into()));
        assert_eq!(Command::parse("UsEr bob"), Command::User("bob".into()));
        assert_eq!(Command::parse("QUIT"), Command::Quit);
        assert_eq!(Command::parse("quit"), Command::Quit);
    }

    #[test]
    fn argument_is_raw_remainder() {
        assert_eq!(
            Command::parse("RETR my file.txt"),
            Command::Retr("my file.txt".into())
        );
        assert_eq!(Command::parse("TYPE L 8"), Command::Type("L 8".into()));
    }

    #[test]
    fn missing_argument_parses_to_empty() {
        assert_eq!(Command::parse("USER"), Command::User(String::new()));
        assert_eq!(Command::parse("CWD"), Command::Cwd(String::new()));
    }

    #[test]
    fn blank_and_garbage_lines_are_unknown() {
        assert_eq!(Command::parse(""), Command::Unknown(String::new()));
        assert_eq!(Command::parse("   "), Command::Unknown(String::new()));
        assert_eq!(
            Command::parse("FOOBAR  one   two"),
            Command::Unknown("FOOBAR one two".into())
        );
    }

    #[test]
    fn only_user_pass_quit_precede_login() {
        assert!(Command::parse("USER a").allowed_before_login());
        assert!(Command::parse("PASS a").allowed_before_login());
        assert!(Command::parse("QUIT").allowed_before_login());
        assert!(!Command::parse("LIST").allowed_before_login());
        assert!(!Command::parse("PWD").allowed_before_login());
        assert!(!Command::parse("FOOBAR").allowed_before_login());
    }

    #[test]
    fn password_never_renders_in_logs() {
        let rendered = Command::parse("PASS hunter2").to_string();
        assert!(!rendered.contains("hunter2"));
    }
}
