//! Session data model: keys, values, cookie options and the session itself.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use cookie::time::{Duration, OffsetDateTime};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

use crate::config::{SessionConfig, DEFAULT_SESSION_EXPIRE_SECONDS};

/// Payload entry holding the creation stamp mirrored in the cookie envelope
pub const CREATED_TIME_KEY: &str = "created_time";

/// Sortable creation stamp format (`YYYYMMDDHHMMSS`, UTC)
pub const CREATED_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Bare key/value mapping persisted through `SessionStore::store`
pub type DataMap = HashMap<String, Value>;

/// Session map key.
///
/// Only string keys survive the JSON serializer; the MessagePack serializer
/// accepts all of them. Displays as the bare key text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(i) => write!(f, "{}", i),
            Key::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Key::Bool(value)
    }
}

/// Session value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<Key, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

/// Cookie attributes, copied from the store defaults into every session.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    /// Seconds. 0 writes a browser-session cookie and uses the store's
    /// default record TTL; negative deletes the session on save.
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: DEFAULT_SESSION_EXPIRE_SECONDS,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

impl From<&SessionConfig> for CookieOptions {
    fn from(config: &SessionConfig) -> Self {
        let same_site = match config.cookie_same_site.to_ascii_lowercase().as_str() {
            "strict" => SameSite::Strict,
            "none" => SameSite::None,
            _ => SameSite::Lax,
        };

        Self {
            path: config.cookie_path.clone(),
            domain: config.cookie_domain.clone(),
            max_age: config.max_age,
            secure: config.cookie_secure,
            http_only: config.cookie_http_only,
            same_site,
        }
    }
}

impl CookieOptions {
    /// Build a `Set-Cookie` value for `name` carrying `value`.
    pub fn to_cookie(&self, name: &str, value: String) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_string(), value))
            .path(self.path.clone())
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(self.same_site);

        if let Some(ref domain) = self.domain {
            builder = builder.domain(domain.clone());
        }
        if self.max_age != 0 {
            builder = builder.max_age(Duration::seconds(self.max_age));
        }
        if self.max_age < 0 {
            builder = builder.expires(OffsetDateTime::UNIX_EPOCH);
        }

        builder.build()
    }
}

/// Per-request session.
///
/// Built fresh by `SessionStore::new_session` for every request and owned by
/// that request; persisted (or deleted) once through `SessionStore::save`.
#[derive(Debug, Clone)]
pub struct Session {
    name: String,
    /// Empty until the first save assigns one
    pub id: String,
    pub values: HashMap<Key, Value>,
    pub options: CookieOptions,
    /// True unless the record was loaded and matched the cookie's stamp
    pub is_new: bool,
}

impl Session {
    pub fn new(name: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            name: name.into(),
            id: String::new(),
            values: HashMap::new(),
            options,
            is_new: true,
        }
    }

    /// Cookie name this session is bound to
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<&Value> {
        self.values.get(&key.into())
    }

    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: impl Into<Key>) -> Option<Value> {
        self.values.remove(&key.into())
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Creation stamp in canonical textual form.
    ///
    /// Strings are taken as is and integers rendered in decimal, so a stamp
    /// that came back from a serializer as a number still compares equal to
    /// the cookie's string.
    pub fn created_time(&self) -> Option<String> {
        match self.values.get(&Key::from(CREATED_TIME_KEY))? {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// Drop the payload and mark the session as new
    pub(crate) fn reset(&mut self) {
        self.values.clear();
        self.is_new = true;
    }
}

/// Current time as a creation stamp
pub fn created_time_now() -> String {
    chrono::Utc::now().format(CREATED_TIME_FORMAT).to_string()
}
