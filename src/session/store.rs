//! Session lifecycle orchestration.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cookie::Cookie;

use crate::config::{SessionConfig, DEFAULT_SESSION_EXPIRE_SECONDS};
use crate::metrics::{LoadOutcome, SaveOutcome, SessionMetrics};

use super::codec::{CodecSet, Envelope};
use super::error::{SessionError, SessionLoadError};
use super::record_store::RecordStore;
use super::serializer::{create_serializer, SerializerError, SerializerKind, SessionSerializer};
use super::types::{created_time_now, CookieOptions, DataMap, Session, CREATED_TIME_KEY};

const DEFAULT_KEY_PREFIX: &str = "session_";
const DEFAULT_MAX_LENGTH: usize = 4096;
const DEFAULT_MAX_AGE: i64 = 60 * 20;

/// New random session id: 32 bytes, URL-safe base64 without padding
pub fn generate_session_id() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

/// Session store shared by every request handler.
///
/// Holds configuration only; each call works on the caller's own
/// [`Session`], so one instance can serve concurrent requests without
/// locking. Concurrent saves of the same session id are last-writer-wins.
pub struct SessionStore {
    records: Arc<dyn RecordStore>,
    codecs: CodecSet,
    /// Cookie attribute template. Its `max_age` is superseded by the codec
    /// set's max-age, the single source for cookie and token lifetime.
    cookie_options: CookieOptions,
    /// Record TTL for sessions saved with max-age 0
    default_max_age: i64,
    max_length: usize,
    key_prefix: String,
    serializer: Arc<dyn SessionSerializer>,
    /// TTL for records written by `store`
    data_ttl: i64,
}

impl SessionStore {
    /// Create a store with default settings, signing cookies with `secrets`
    /// (newest first).
    pub fn new<S: AsRef<[u8]>>(records: Arc<dyn RecordStore>, secrets: &[S]) -> Self {
        Self {
            records,
            codecs: CodecSet::from_secrets(secrets, DEFAULT_SESSION_EXPIRE_SECONDS),
            cookie_options: CookieOptions::default(),
            default_max_age: DEFAULT_MAX_AGE,
            max_length: DEFAULT_MAX_LENGTH,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            serializer: create_serializer(SerializerKind::Json),
            data_ttl: DEFAULT_SESSION_EXPIRE_SECONDS,
        }
    }

    /// Create a store from the `session` configuration section
    pub fn from_config(
        config: &SessionConfig,
        records: Arc<dyn RecordStore>,
    ) -> Result<Self, SerializerError> {
        let kind: SerializerKind = config.serializer.parse()?;

        Ok(Self::new(records, config.secrets.as_slice())
            .with_cookie_options(CookieOptions::from(config))
            .with_default_max_age(config.default_max_age)
            .with_max_length(config.max_length)
            .with_key_prefix(config.key_prefix.clone())
            .with_serializer(create_serializer(kind))
            .with_data_ttl(config.data_ttl_seconds))
    }

    /// Limit serialized records to `max_length` bytes, 0 for no limit
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn SessionSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_default_max_age(mut self, seconds: i64) -> Self {
        self.default_max_age = seconds;
        self
    }

    pub fn with_data_ttl(mut self, seconds: i64) -> Self {
        self.data_ttl = seconds;
        self
    }

    /// Replace the cookie defaults; their `max_age` becomes the store max-age
    pub fn with_cookie_options(mut self, options: CookieOptions) -> Self {
        self.codecs.set_max_age(options.max_age);
        self.cookie_options = options;
        self
    }

    /// Change the store-wide max-age.
    ///
    /// Applies to the cookie defaults of sessions created afterwards and to
    /// token validation in every codec at once.
    pub fn set_max_age(&self, seconds: i64) {
        self.codecs.set_max_age(seconds);
        tracing::info!(max_age = seconds, codecs = self.codecs.len(), "Session max-age updated");
    }

    pub fn max_age(&self) -> i64 {
        self.codecs.max_age()
    }

    pub fn codecs(&self) -> &CodecSet {
        &self.codecs
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn serializer_kind(&self) -> SerializerKind {
        self.serializer.kind()
    }

    pub fn record_store(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Cookie options copied into each new session
    pub fn default_options(&self) -> CookieOptions {
        CookieOptions {
            max_age: self.codecs.max_age(),
            ..self.cookie_options.clone()
        }
    }

    pub fn record_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// Same as [`new_session`](Self::new_session); registering the session
    /// with a per-request registry is left to the web layer.
    pub async fn get(&self, headers: &HeaderMap, name: &str) -> Result<Session, SessionLoadError> {
        self.new_session(headers, name).await
    }

    /// Build the session for a request from its `name` cookie.
    ///
    /// A missing, forged or expired cookie yields a new empty session and no
    /// error. A record that is gone, or whose creation stamp differs from the
    /// cookie's, also yields a new empty session. Only backend and decoding
    /// failures are reported, together with a usable fresh session.
    pub async fn new_session(
        &self,
        headers: &HeaderMap,
        name: &str,
    ) -> Result<Session, SessionLoadError> {
        let mut session = Session::new(name, self.default_options());

        let Some(token) = find_cookie(headers, name) else {
            SessionMetrics::record_load(LoadOutcome::Fresh);
            return Ok(session);
        };

        let envelope = match self.codecs.decode(name, &token) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(cookie = %name, error = %e, "Ignoring undecodable session cookie");
                SessionMetrics::record_load(LoadOutcome::InvalidCookie);
                return Ok(session);
            }
        };

        session.id = envelope.id;
        match self.load_record(&mut session).await {
            Ok(false) => {
                SessionMetrics::record_load(LoadOutcome::Fresh);
            }
            Ok(true) if session.created_time().as_deref() == Some(envelope.created.as_str()) => {
                session.is_new = false;
                SessionMetrics::record_load(LoadOutcome::Resumed);
            }
            Ok(true) => {
                tracing::debug!(
                    session_id = %session.id,
                    cookie_created = %envelope.created,
                    "Session record does not match cookie, starting over"
                );
                session.reset();
                // The id now belongs to another incarnation; never write over it
                session.id.clear();
                SessionMetrics::record_load(LoadOutcome::Stale);
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Failed to load session");
                session.reset();
                SessionMetrics::record_load(LoadOutcome::Error);
                return Err(SessionLoadError { session, source: e });
            }
        }

        Ok(session)
    }

    /// Persist the session and attach its cookie to `response`.
    ///
    /// A negative max-age deletes the record and expires the cookie instead.
    /// Nothing is written to `response` when persisting fails.
    pub async fn save(&self, response: &mut HeaderMap, session: &mut Session) -> Result<(), SessionError> {
        let result = if session.options.max_age < 0 {
            self.save_deletion(response, session).await
        } else {
            self.save_record(response, session).await
        };

        match &result {
            Ok(outcome) => SessionMetrics::record_save(*outcome),
            Err(SessionError::TooLarge { .. }) => SessionMetrics::record_save(SaveOutcome::TooLarge),
            Err(_) => SessionMetrics::record_save(SaveOutcome::Error),
        }
        result.map(|_| ())
    }

    async fn save_deletion(
        &self,
        response: &mut HeaderMap,
        session: &mut Session,
    ) -> Result<SaveOutcome, SessionError> {
        self.delete_record(&session.id).await?;
        append_cookie(response, session.options.to_cookie(session.name(), String::new()))?;
        Ok(SaveOutcome::Deleted)
    }

    async fn save_record(
        &self,
        response: &mut HeaderMap,
        session: &mut Session,
    ) -> Result<SaveOutcome, SessionError> {
        let assigned_id = session.id.is_empty();
        if assigned_id {
            session.id = generate_session_id();
        }

        // Stored as a string on every save so the freshness check compares
        // like with like
        let created = session.created_time().unwrap_or_else(created_time_now);
        let previous = session.insert(CREATED_TIME_KEY, created.clone());

        let data = match self.encode_checked(session) {
            Ok(data) => data,
            Err(e) => {
                // Rejected payloads are handed back exactly as they came in
                match previous {
                    Some(value) => session.insert(CREATED_TIME_KEY, value),
                    None => session.remove(CREATED_TIME_KEY),
                };
                if assigned_id {
                    session.id.clear();
                }
                return Err(e);
            }
        };

        let ttl = match session.options.max_age {
            0 => self.default_max_age,
            max_age => max_age,
        };
        self.records
            .set(&self.record_key(&session.id), &data, ttl)
            .await?;

        let token = self.codecs.encode(
            session.name(),
            &Envelope {
                id: session.id.clone(),
                created,
            },
        )?;
        append_cookie(response, session.options.to_cookie(session.name(), token))?;

        tracing::debug!(
            session_id = %session.id,
            bytes = data.len(),
            ttl_seconds = ttl,
            "Session saved"
        );
        Ok(SaveOutcome::Saved)
    }

    /// Delete the record, expire the cookie and empty the session.
    ///
    /// The cookie is expired and the payload cleared even if the backend
    /// delete fails; that failure is still returned.
    pub async fn delete(&self, response: &mut HeaderMap, session: &mut Session) -> Result<(), SessionError> {
        let deleted = self.delete_record(&session.id).await;

        let options = CookieOptions {
            max_age: -1,
            ..session.options.clone()
        };
        let cookie = append_cookie(response, options.to_cookie(session.name(), String::new()));
        session.clear();

        deleted?;
        cookie
    }

    /// Persist a bare key/value map under `<prefix><id>`, bypassing cookies
    pub async fn store(&self, id: &str, data: &DataMap) -> Result<(), SessionError> {
        let bytes = self.serializer.serialize_data(data)?;
        self.check_length(bytes.len())?;
        self.records
            .set(&self.record_key(id), &bytes, self.data_ttl)
            .await?;
        Ok(())
    }

    /// Read a map written by [`store`](Self::store); `Ok(None)` when absent
    pub async fn load(&self, id: &str) -> Result<Option<DataMap>, SessionError> {
        match self.records.get(&self.record_key(id)).await? {
            Some(bytes) => Ok(Some(self.serializer.deserialize_data(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns whether a record existed
    async fn load_record(&self, session: &mut Session) -> Result<bool, SessionError> {
        let Some(data) = self.records.get(&self.record_key(&session.id)).await? else {
            return Ok(false);
        };
        self.serializer.deserialize(&data, session)?;
        Ok(true)
    }

    async fn delete_record(&self, id: &str) -> Result<(), SessionError> {
        // A session that was never saved has no record
        if id.is_empty() {
            return Ok(());
        }
        self.records.delete(&self.record_key(id)).await?;
        Ok(())
    }

    fn encode_checked(&self, session: &Session) -> Result<Vec<u8>, SessionError> {
        let data = self.serializer.serialize(session)?;
        self.check_length(data.len())?;
        Ok(data)
    }

    fn check_length(&self, size: usize) -> Result<(), SessionError> {
        SessionMetrics::record_size(size);
        if self.max_length != 0 && size > self.max_length {
            return Err(SessionError::TooLarge {
                size,
                max: self.max_length,
            });
        }
        Ok(())
    }
}

fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

fn append_cookie(response: &mut HeaderMap, cookie: Cookie<'static>) -> Result<(), SessionError> {
    response.append(header::SET_COOKIE, HeaderValue::from_str(&cookie.to_string())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::record_store::MemoryRecordStore;
    use crate::session::types::Value;

    fn memory_store() -> (Arc<MemoryRecordStore>, SessionStore) {
        let records = Arc::new(MemoryRecordStore::new(60));
        let store = SessionStore::new(records.clone(), &["test-secret"]);
        (records, store)
    }

    fn request_with(response: &HeaderMap) -> HeaderMap {
        let mut request = HeaderMap::new();
        for value in response.get_all(header::SET_COOKIE) {
            let cookie = Cookie::parse(value.to_str().unwrap().to_string()).unwrap();
            let pair = format!("{}={}", cookie.name(), cookie.value());
            request.append(header::COOKIE, HeaderValue::from_str(&pair).unwrap());
        }
        request
    }

    #[test]
    fn test_generated_ids_are_url_safe_and_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_find_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; sid=token; b=2"));
        assert_eq!(find_cookie(&headers, "sid").as_deref(), Some("token"));
        assert_eq!(find_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_defaults() {
        let (_, store) = memory_store();
        assert_eq!(store.key_prefix(), "session_");
        assert_eq!(store.max_age(), DEFAULT_SESSION_EXPIRE_SECONDS);
        assert_eq!(store.serializer_kind(), SerializerKind::Json);
        assert_eq!(store.record_key("abc"), "session_abc");
        assert_eq!(store.default_options().path, "/");
    }

    #[test]
    fn test_from_config() {
        let config = SessionConfig {
            secrets: vec!["one".to_string(), "two".to_string()],
            serializer: "msgpack".to_string(),
            key_prefix: "app_".to_string(),
            max_age: 900,
            ..SessionConfig::default()
        };
        let store =
            SessionStore::from_config(&config, Arc::new(MemoryRecordStore::new(60))).unwrap();

        assert_eq!(store.codecs().len(), 2);
        assert_eq!(store.serializer_kind(), SerializerKind::MessagePack);
        assert_eq!(store.record_key("x"), "app_x");
        assert_eq!(store.default_options().max_age, 900);

        let bad = SessionConfig {
            serializer: "gob".to_string(),
            ..SessionConfig::default()
        };
        assert!(SessionStore::from_config(&bad, Arc::new(MemoryRecordStore::new(60))).is_err());
    }

    #[tokio::test]
    async fn test_save_stamps_and_resumes() {
        let (records, store) = memory_store();

        let mut session = store.new_session(&HeaderMap::new(), "sid").await.unwrap();
        session.insert("user", "alice");
        let mut response = HeaderMap::new();
        store.save(&mut response, &mut session).await.unwrap();

        assert!(!session.id.is_empty());
        assert!(session.created_time().is_some());
        assert_eq!(records.len(), 1);

        let resumed = store
            .new_session(&request_with(&response), "sid")
            .await
            .unwrap();
        assert!(!resumed.is_new);
        assert_eq!(resumed.id, session.id);
        assert_eq!(resumed.get("user"), Some(&Value::from("alice")));
    }

    #[tokio::test]
    async fn test_stale_record_resets_session() {
        let (_, store) = memory_store();

        let mut session = store.new_session(&HeaderMap::new(), "sid").await.unwrap();
        session.insert("user", "alice");
        let mut response = HeaderMap::new();
        store.save(&mut response, &mut session).await.unwrap();

        // Record recreated under the same id by someone else
        let mut imposter = session.clone();
        imposter.insert(CREATED_TIME_KEY, "19990101000000");
        store.save(&mut HeaderMap::new(), &mut imposter).await.unwrap();

        let loaded = store
            .new_session(&request_with(&response), "sid")
            .await
            .unwrap();
        assert!(loaded.is_new);
        assert!(loaded.values.is_empty());
        assert!(loaded.id.is_empty());
    }

    #[tokio::test]
    async fn test_numeric_created_time_still_matches() {
        let (_, store) = memory_store();

        let mut session = store.new_session(&HeaderMap::new(), "sid").await.unwrap();
        session.insert(CREATED_TIME_KEY, 20240102030405_i64);
        let mut response = HeaderMap::new();
        store.save(&mut response, &mut session).await.unwrap();
        assert_eq!(
            session.get(CREATED_TIME_KEY),
            Some(&Value::from("20240102030405"))
        );

        let loaded = store
            .new_session(&request_with(&response), "sid")
            .await
            .unwrap();
        assert!(!loaded.is_new);
    }

    #[tokio::test]
    async fn test_zero_max_age_uses_default_ttl() {
        let records = Arc::new(MemoryRecordStore::new(60));
        let store =
            SessionStore::new(records.clone(), &["secret"]).with_default_max_age(300);

        let mut session = store.new_session(&HeaderMap::new(), "sid").await.unwrap();
        session.options.max_age = 0;
        let mut response = HeaderMap::new();
        store.save(&mut response, &mut session).await.unwrap();

        let ttl = records.ttl(&store.record_key(&session.id)).unwrap();
        assert!(ttl.as_secs() > 290 && ttl.as_secs() <= 300);

        let header = response.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(!header.contains("Max-Age"));
    }

    #[tokio::test]
    async fn test_oversized_store_rejected() {
        let (records, store) = memory_store();
        let store = store.with_max_length(16);

        let data = DataMap::from([("blob".to_string(), Value::from("x".repeat(64)))]);
        let err = store.store("aux", &data).await.unwrap_err();
        assert!(matches!(err, SessionError::TooLarge { max: 16, .. }));
        assert!(err.to_string().contains("the value to store is too big"));
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_store_and_load_data() {
        let (_, store) = memory_store();
        let data = DataMap::from([("count".to_string(), Value::Int(2))]);

        store.store("cart-1", &data).await.unwrap();
        assert_eq!(store.load("cart-1").await.unwrap(), Some(data));
        assert_eq!(store.load("cart-2").await.unwrap(), None);
    }
}
