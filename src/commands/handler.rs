//! Command Handler Module
//!
//! This module implements the line commands understood by kayvee. A line is
//! split on whitespace, the first word is the verb (case-insensitive), the
//! rest are arguments. Values are single tokens; there is no quoting.
//!
//! ## Supported Commands
//!
//! - `SET key value [ttlSeconds]` - Set a key, optionally expiring
//! - `GET key` - Get a key's value
//! - `DEL key` - Delete a key
//! - `OUT` - List every live key with its remaining TTL
//! - `STOP` - Flush and shut down
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │   parse()   │───>│  execute()  │───>│   Reply     │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                            │                                │
//! │                            ▼                                │
//! │                          Store                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Malformed lines are rejected by [`Command::parse`] and never reach the
//! store.

use crate::storage::{SnapshotEntry, Store, StoreError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

const SET_USAGE: &str = "usage: SET key value [ttlSec]";
const GET_USAGE: &str = "usage: GET key";
const DEL_USAGE: &str = "usage: DEL key";
const OUT_USAGE: &str = "usage: OUT";
const STOP_USAGE: &str = "usage: STOP";

/// Errors produced while parsing a command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Empty line or unknown verb
    #[error("invalid command")]
    InvalidCommand,

    /// Wrong number of arguments for a known verb
    #[error("{0}")]
    Usage(&'static str),

    /// The TTL argument is not an integer
    #[error("invalid ttl")]
    InvalidTtl(String),
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set {
        key: String,
        value: String,
        ttl_secs: i64,
    },
    Get {
        key: String,
    },
    Del {
        key: String,
    },
    Out,
    Stop,
}

impl Command {
    /// Parses one input line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((verb, args)) = words.split_first() else {
            return Err(CommandError::InvalidCommand);
        };

        match verb.to_uppercase().as_str() {
            "SET" => match args {
                [key, value] => Ok(Command::Set {
                    key: key.to_string(),
                    value: value.to_string(),
                    ttl_secs: 0,
                }),
                [key, value, ttl] => {
                    let ttl_secs = ttl
                        .parse::<i64>()
                        .map_err(|_| CommandError::InvalidTtl(ttl.to_string()))?;
                    Ok(Command::Set {
                        key: key.to_string(),
                        value: value.to_string(),
                        ttl_secs,
                    })
                }
                _ => Err(CommandError::Usage(SET_USAGE)),
            },
            "GET" => match args {
                [key] => Ok(Command::Get {
                    key: key.to_string(),
                }),
                _ => Err(CommandError::Usage(GET_USAGE)),
            },
            "DEL" => match args {
                [key] => Ok(Command::Del {
                    key: key.to_string(),
                }),
                _ => Err(CommandError::Usage(DEL_USAGE)),
            },
            "OUT" if args.is_empty() => Ok(Command::Out),
            "OUT" => Err(CommandError::Usage(OUT_USAGE)),
            "STOP" if args.is_empty() => Ok(Command::Stop),
            "STOP" => Err(CommandError::Usage(STOP_USAGE)),
            _ => Err(CommandError::InvalidCommand),
        }
    }
}

/// The result of executing a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Value(String),
    NotFound,
    Deleted,
    Entries(Vec<SnapshotEntry>),
    /// The caller should shut the store down and stop reading input
    Stop,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Value(value) => write!(f, "{}", value),
            Reply::NotFound => write!(f, "no such key"),
            Reply::Deleted => write!(f, "deleted"),
            Reply::Entries(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", entry)?;
                }
                Ok(())
            }
            Reply::Stop => write!(f, "bye"),
        }
    }
}

/// Executes commands against a shared [`Store`].
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    /// Creates a new command handler for the given store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The store commands run against.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Executes a command.
    ///
    /// `STOP` is not acted on here: it returns [`Reply::Stop`] and the caller
    /// runs the async [`Store::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns the store's error when a mutation could not be persisted. The
    /// mutation itself has still happened.
    pub fn execute(&self, command: Command) -> Result<Reply, StoreError> {
        match command {
            Command::Set {
                key,
                value,
                ttl_secs,
            } => {
                self.store.set(key, value, ttl_secs)?;
                Ok(Reply::Ok)
            }
            Command::Get { key } => Ok(match self.store.get(&key) {
                Some(value) => Reply::Value(value),
                None => Reply::NotFound,
            }),
            Command::Del { key } => Ok(if self.store.delete(&key)? {
                Reply::Deleted
            } else {
                Reply::NotFound
            }),
            Command::Out => Ok(Reply::Entries(self.store.snapshot())),
            Command::Stop => Ok(Reply::Stop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersister;
    use crate::storage::StoreConfig;

    fn create_handler() -> CommandHandler {
        let store = Arc::new(Store::open(StoreConfig::default()).unwrap());
        CommandHandler::new(store)
    }

    #[test]
    fn test_parse_set() {
        assert_eq!(
            Command::parse("SET k v"),
            Ok(Command::Set {
                key: "k".to_string(),
                value: "v".to_string(),
                ttl_secs: 0
            })
        );
        assert_eq!(
            Command::parse("  set   k   v   30 "),
            Ok(Command::Set {
                key: "k".to_string(),
                value: "v".to_string(),
                ttl_secs: 30
            })
        );
    }

    #[test]
    fn test_parse_verbs_case_insensitive() {
        assert_eq!(
            Command::parse("gEt name"),
            Ok(Command::Get {
                key: "name".to_string()
            })
        );
        assert_eq!(
            Command::parse("Del name"),
            Ok(Command::Del {
                key: "name".to_string()
            })
        );
        assert_eq!(Command::parse("out"), Ok(Command::Out));
        assert_eq!(Command::parse("Stop"), Ok(Command::Stop));
    }

    #[test]
    fn test_parse_keys_are_case_sensitive() {
        assert_eq!(
            Command::parse("GET Name"),
            Ok(Command::Get {
                key: "Name".to_string()
            })
        );
    }

    #[test]
    fn test_parse_usage_errors() {
        assert_eq!(Command::parse("SET k"), Err(CommandError::Usage(SET_USAGE)));
        assert_eq!(
            Command::parse("SET k v 1 extra"),
            Err(CommandError::Usage(SET_USAGE))
        );
        assert_eq!(Command::parse("GET"), Err(CommandError::Usage(GET_USAGE)));
        assert_eq!(Command::parse("GET a b"), Err(CommandError::Usage(GET_USAGE)));
        assert_eq!(Command::parse("DEL"), Err(CommandError::Usage(DEL_USAGE)));
        assert_eq!(Command::parse("OUT now"), Err(CommandError::Usage(OUT_USAGE)));
        assert_eq!(
            Command::parse("STOP now"),
            Err(CommandError::Usage(STOP_USAGE))
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(Command::parse(""), Err(CommandError::InvalidCommand));
        assert_eq!(Command::parse("   "), Err(CommandError::InvalidCommand));
        assert_eq!(Command::parse("PING"), Err(CommandError::InvalidCommand));

        let err = Command::parse("SET k v soon").unwrap_err();
        assert_eq!(err, CommandError::InvalidTtl("soon".to_string()));
        assert_eq!(err.to_string(), "invalid ttl");
    }

    #[tokio::test]
    async fn test_set_get() {
        let handler = create_handler();

        let reply = handler.execute(Command::parse("SET key value").unwrap());
        assert_eq!(reply.unwrap(), Reply::Ok);

        let reply = handler.execute(Command::parse("GET key").unwrap()).unwrap();
        assert_eq!(reply, Reply::Value("value".to_string()));
        assert_eq!(reply.to_string(), "value");
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let handler = create_handler();

        let reply = handler.execute(Command::parse("GET nope").unwrap()).unwrap();
        assert_eq!(reply, Reply::NotFound);
        assert_eq!(reply.to_string(), "no such key");
    }

    #[tokio::test]
    async fn test_del() {
        let handler = create_handler();
        handler.execute(Command::parse("SET k v").unwrap()).unwrap();

        let reply = handler.execute(Command::parse("DEL k").unwrap()).unwrap();
        assert_eq!(reply, Reply::Deleted);

        let reply = handler.execute(Command::parse("DEL k").unwrap()).unwrap();
        assert_eq!(reply, Reply::NotFound);
    }

    #[tokio::test]
    async fn test_out_lists_sorted_entries() {
        let handler = create_handler();
        handler.execute(Command::parse("SET b 2").unwrap()).unwrap();
        handler.execute(Command::parse("SET a 1").unwrap()).unwrap();

        let reply = handler.execute(Command::Out).unwrap();
        assert_eq!(reply.to_string(), "a: 1\nb: 2");
    }

    #[tokio::test]
    async fn test_out_empty() {
        let handler = create_handler();
        let reply = handler.execute(Command::Out).unwrap();
        assert_eq!(reply, Reply::Entries(vec![]));
        assert_eq!(reply.to_string(), "");
    }

    #[tokio::test]
    async fn test_stop_does_not_shut_down() {
        let handler = create_handler();
        let reply = handler.execute(Command::Stop).unwrap();
        assert_eq!(reply, Reply::Stop);
        assert_eq!(reply.to_string(), "bye");
        handler.store().shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_persist_failure_surfaces_error() {
        let persister = Arc::new(MemoryPersister::new());
        let store = Store::open(StoreConfig::default().with_persister(persister.clone())).unwrap();
        let handler = CommandHandler::new(Arc::new(store));

        persister.set_fail_saves(true);
        assert!(handler.execute(Command::parse("SET k v").unwrap()).is_err());

        // The value is still there
        let reply = handler.execute(Command::parse("GET k").unwrap()).unwrap();
        assert_eq!(reply, Reply::Value("v".to_string()));
    }
}
