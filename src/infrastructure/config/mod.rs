mod settings;

pub use settings::{
    RedisConfig, ServerConfig, SessionConfig, Settings, DEFAULT_SESSION_EXPIRE_SECONDS,
};
