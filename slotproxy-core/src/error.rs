use thiserror::Error;

/// Error taxonomy for the proxy core. Variants map 1:1 onto the error kinds
/// in spec.md §7: validation, type, auth, availability, upstream I/O and
/// internal invariant violations.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("ERR {0}")]
    Io(#[from] std::io::Error),

    #[error("ERR {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR {0}")]
    SyntaxMsg(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("NOAUTH Authentication required")]
    NoAuth,

    #[error("ERR invalid password")]
    BadAuth,

    #[error("ERR sentinel mode not available")]
    SentinelNotAvailable,

    #[error("ERR sentinel mode not online")]
    SentinelNotOnline,

    #[error("ERR command not supported")]
    NotSupported,

    #[error("ERR {0}")]
    StorageRedis(String),

    #[error("ERR command execute error")]
    Internal,

    #[error("ERR {0}")]
    Other(String),
}

impl ProxyError {
    /// Render the error the way the dispatcher converts caught failures into
    /// RESP error replies (spec.md §7): known messages keep their own text,
    /// with an `ERR ` prefix added if missing; everything else collapses to
    /// the generic internal message.
    pub fn to_resp_message(&self) -> String {
        let msg = self.to_string();
        if msg.starts_with("ERR ")
            || msg.starts_with("WRONGTYPE ")
            || msg.starts_with("NOAUTH ")
        {
            msg
        } else {
            format!("ERR {msg}")
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
