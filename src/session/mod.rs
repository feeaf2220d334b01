//! Server-side sessions bound to signed cookies.
//!
//! The payload lives in a remote record store under `<prefix><id>`; the
//! cookie carries only a signed `{id, creation stamp}` envelope. A session is
//! resumed only when the stored payload's creation stamp matches the one in
//! the cookie.

mod codec;
mod error;
mod record_store;
mod serializer;
mod store;
mod types;

pub use codec::{CodecError, CodecSet, CookieCodec, Envelope, MAX_TOKEN_LENGTH};
pub use error::{SessionError, SessionLoadError};
pub use record_store::{
    create_record_store, MemoryRecordStore, RecordStore, RecordStoreBackend, RedisRecordStore,
    StoreError, MEMORY_CLEANUP_INTERVAL,
};
pub use serializer::{
    create_serializer, JsonSerializer, MessagePackSerializer, SerializerError, SerializerKind,
    SessionSerializer,
};
pub use store::{generate_session_id, SessionStore};
pub use types::{
    created_time_now, CookieOptions, DataMap, Key, Session, Value, CREATED_TIME_FORMAT,
    CREATED_TIME_KEY,
};
