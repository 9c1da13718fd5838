//! Redis-backed session store.
//!
//! `apply_chunk` must be serialized per upload even though the callers
//! are spread across replicas that share no memory. Redis executes Lua
//! scripts as single atomic steps, so the entire read-mutate-write of a
//! chunk receipt runs inside one `EVALSHA` and two scripts for the same
//! key can never interleave. The scripts manipulate the same JSON
//! document that `UploadSession` serializes to; the mutation logic
//! mirrors `UploadSession::record_chunk`.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use super::{session_key, ChunkOutcome, SessionStore};
use crate::config::SessionStoreConfig;
use crate::error::{ServerError, ServerResult};
use reel::file_id::FileId;
use reel::session::{SessionStatus, UploadSession};

/// Outcome codes shared with the scripts below.
const APPLY_OK: i64 = 0;
const APPLY_NOT_FOUND: i64 = 1;
const APPLY_NOT_WRITABLE: i64 = 2;
const APPLY_INDEX_OUT_OF_RANGE: i64 = 3;
const APPLY_SIZE_OVERFLOW: i64 = 4;

/// Atomic chunk receipt.
///
/// KEYS[1] = session key, ARGV = chunk index, chunk length, now, TTL.
/// Returns `{code, session_json, just_completed}`.
const APPLY_CHUNK_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return {1, '', 0}
end

local session = cjson.decode(raw)
if session.status == 'completed' or session.status == 'failed' then
  return {2, '', 0}
end

local index = tonumber(ARGV[1])
local len = tonumber(ARGV[2])
if index >= session.total_chunks then
  return {3, '', 0}
end

local pos = index + 1
if string.sub(session.chunk_status, pos, pos) == '1' then
  return {0, raw, 0}
end

if session.uploaded_size + len > session.total_size then
  return {4, '', 0}
end

session.chunk_status = string.sub(session.chunk_status, 1, pos - 1)
  .. '1' .. string.sub(session.chunk_status, pos + 1)
session.uploaded_chunks = session.uploaded_chunks + 1
session.uploaded_size = session.uploaded_size + len
session.updated_at = tonumber(ARGV[3])

local just_completed = 0
if session.uploaded_chunks == session.total_chunks then
  session.status = 'finalizing'
  just_completed = 1
else
  session.status = 'uploading'
end

local encoded = cjson.encode(session)
redis.call('SET', KEYS[1], encoded)
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[4]))
return {0, encoded, just_completed}
"#;

/// Atomic status overwrite.
///
/// KEYS[1] = session key, ARGV = status, now, TTL.
/// Returns 0 on success, 1 if the session does not exist.
const SET_STATUS_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return 1
end

local session = cjson.decode(raw)
session.status = ARGV[1]
session.updated_at = tonumber(ARGV[2])
redis.call('SET', KEYS[1], cjson.encode(session))
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[3]))
return 0
"#;

pub struct RedisSessionStore {
    manager: ConnectionManager,
    ttl: u64,
    apply_chunk: Script,
    set_status: Script,
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RedisSessionStore {
    pub async fn new(config: &SessionStoreConfig) -> ServerResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(ServerError::session_error)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(ServerError::session_error)?;

        Ok(Self {
            manager,
            ttl: config.ttl.as_secs(),
            apply_chunk: Script::new(APPLY_CHUNK_SCRIPT),
            set_status: Script::new(SET_STATUS_SCRIPT),
        })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, session: &UploadSession) -> ServerResult<()> {
        let payload = serde_json::to_string(session).map_err(ServerError::session_error)?;
        let mut conn = self.manager.clone();

        // SET NX so that a file ID collision surfaces instead of
        // clobbering a live upload
        let reply: Option<String> = redis::cmd("SET")
            .arg(session_key(&session.file_id))
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl)
            .query_async(&mut conn)
            .await
            .map_err(ServerError::session_error)?;

        if reply.is_none() {
            return Err(ServerError::SessionAlreadyExists);
        }

        Ok(())
    }

    async fn load(&self, file_id: &FileId) -> ServerResult<UploadSession> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(session_key(file_id))
            .await
            .map_err(ServerError::session_error)?;

        let raw = raw.ok_or(ServerError::InvalidSession)?;
        serde_json::from_str(&raw).map_err(|e| ServerError::CorruptSession(e.into()))
    }

    async fn apply_chunk(
        &self,
        file_id: &FileId,
        chunk_index: u32,
        chunk_len: u64,
    ) -> ServerResult<ChunkOutcome> {
        let now = Utc::now().timestamp();
        let mut conn = self.manager.clone();

        let (code, payload, just_completed): (i64, String, i64) = self
            .apply_chunk
            .key(session_key(file_id))
            .arg(chunk_index)
            .arg(chunk_len)
            .arg(now)
            .arg(self.ttl)
            .invoke_async(&mut conn)
            .await
            .map_err(ServerError::session_error)?;

        match code {
            APPLY_OK => {
                let session = serde_json::from_str(&payload)
                    .map_err(|e| ServerError::CorruptSession(e.into()))?;
                Ok(ChunkOutcome {
                    session,
                    just_completed: just_completed == 1,
                })
            }
            APPLY_NOT_FOUND => Err(ServerError::InvalidSession),
            APPLY_NOT_WRITABLE => Err(ServerError::InvalidRequestBody(anyhow!(
                "the session is already finished and can no longer accept chunks"
            ))),
            APPLY_INDEX_OUT_OF_RANGE => Err(ServerError::InvalidRequestBody(anyhow!(
                "chunk index {} is out of range",
                chunk_index
            ))),
            APPLY_SIZE_OVERFLOW => Err(ServerError::InvalidRequestBody(anyhow!(
                "chunk {} would exceed the declared file size",
                chunk_index
            ))),
            other => Err(ServerError::SessionStoreError(anyhow!(
                "unexpected apply_chunk result code {}",
                other
            ))),
        }
    }

    async fn set_status(&self, file_id: &FileId, status: SessionStatus) -> ServerResult<()> {
        let now = Utc::now().timestamp();
        let mut conn = self.manager.clone();

        let code: i64 = self
            .set_status
            .key(session_key(file_id))
            .arg(status.as_str())
            .arg(now)
            .arg(self.ttl)
            .invoke_async(&mut conn)
            .await
            .map_err(ServerError::session_error)?;

        if code != 0 {
            return Err(ServerError::InvalidSession);
        }

        Ok(())
    }

    async fn delete(&self, file_id: &FileId) -> ServerResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .del(session_key(file_id))
            .await
            .map_err(ServerError::session_error)?;

        Ok(())
    }
}
