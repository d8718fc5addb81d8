use std::fmt;

use crate::common::{DbError, Key, Result};

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `i <key> <value>`
    Insert { key: Key, value: String },
    /// `d <key>`
    Delete { key: Key },
    /// `f <key>`
    Find { key: Key },
    /// `r <lo> <hi>`
    Range { lo: Key, hi: Key },
    /// `q`
    Quit,
}

impl Command {
    /// Parses one line. Tokens are separated by whitespace, so values cannot
    /// contain any.
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let op = tokens
            .next()
            .ok_or_else(|| DbError::Parse("empty command".to_string()))?;

        let command = match op {
            "i" => {
                let key = parse_key(tokens.next())?;
                let value = tokens
                    .next()
                    .ok_or_else(|| DbError::Parse("insert needs a value".to_string()))?;
                Command::Insert {
                    key,
                    value: value.to_string(),
                }
            }
            "d" => Command::Delete {
                key: parse_key(tokens.next())?,
            },
            "f" => Command::Find {
                key: parse_key(tokens.next())?,
            },
            "r" => Command::Range {
                lo: parse_key(tokens.next())?,
                hi: parse_key(tokens.next())?,
            },
            "q" => Command::Quit,
            other => return Err(DbError::Parse(format!("unknown command '{}'", other))),
        };

        if let Some(extra) = tokens.next() {
            return Err(DbError::Parse(format!("unexpected token '{}'", extra)));
        }

        Ok(command)
    }
}

fn parse_key(token: Option<&str>) -> Result<Key> {
    let token = token.ok_or_else(|| DbError::Parse("missing key".to_string()))?;
    token
        .parse()
        .map_err(|_| DbError::Parse(format!("invalid key '{}'", token)))
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Insert { key, value } => write!(f, "i {} {}", key, value),
            Command::Delete { key } => write!(f, "d {}", key),
            Command::Find { key } => write!(f, "f {}", key),
            Command::Range { lo, hi } => write!(f, "r {} {}", lo, hi),
            Command::Quit => write!(f, "q"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("i 5 a5").unwrap(),
            Command::Insert {
                key: 5,
                value: "a5".to_string()
            }
        );
        assert_eq!(Command::parse("d -12").unwrap(), Command::Delete { key: -12 });
        assert_eq!(Command::parse("  f 7\r").unwrap(), Command::Find { key: 7 });
        assert_eq!(
            Command::parse("r 10 1").unwrap(),
            Command::Range { lo: 10, hi: 1 }
        );
        assert_eq!(Command::parse("q").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        for line in ["", "x 1", "i 1", "i abc v", "f", "d 1 2", "q now", "r 1"] {
            assert!(
                matches!(Command::parse(line), Err(DbError::Parse(_))),
                "accepted {:?}",
                line
            );
        }
    }

    #[test]
    fn test_parse_rejects_value_with_spaces() {
        let err = Command::parse("i 5 hello world").unwrap_err();
        assert_eq!(err.to_string(), "Parse error: unexpected token 'world'");
    }

    #[test]
    fn test_display_round_trips() {
        let command = Command::Insert {
            key: i64::MIN,
            value: "v".to_string(),
        };
        assert_eq!(Command::parse(&command.to_string()).unwrap(), command);
    }
}
