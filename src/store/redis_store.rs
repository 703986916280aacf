//! Redis-backed `VoteStore`.
//!
//! `SADD` and the conditional `HINCRBY` run as a
//! single `EVAL` of a Lua script, so the increment only happens when the set-add reports a newly
//! added member. There is no window in which the voter set can move ahead of the tally.

use super::{StoreError, StoreResult, VoteStore};
use crate::model::{Tally, Vote};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

/// Atomically adds `ARGV[1]` to the set at `KEYS[1]`; increments `ARGV[2]` in the hash at
/// `KEYS[2]` only if the set-add reported a new member. Returns the number of newly added
/// members (0 or 1), matching `SADD`'s own return value.
const REGISTER_VOTE_SCRIPT: &str = r#"
local added = redis.call('SADD', KEYS[1], ARGV[1])
if added == 1 then
    redis.call('HINCRBY', KEYS[2], ARGV[2], 1)
end
return added
"#;

pub struct RedisStore {
    conn: ConnectionManager,
    script: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            conn,
            script: Script::new(REGISTER_VOTE_SCRIPT),
        })
    }

    fn votes_key(poll_id: &str) -> String {
        format!("poll:{poll_id}:votes")
    }

    fn results_key(poll_id: &str) -> String {
        format!("poll:{poll_id}:results")
    }
}

#[async_trait]
impl VoteStore for RedisStore {
    async fn register_vote(&self, vote: &Vote) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = self
            .script
            .key(Self::votes_key(&vote.poll_id))
            .key(Self::results_key(&vote.poll_id))
            .arg(&vote.user_id)
            .arg(&vote.option_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(added == 1)
    }

    async fn get_results(&self, poll_id: &str) -> StoreResult<Tally> {
        let mut conn = self.conn.clone();
        let raw: std::collections::HashMap<String, String> = conn
            .hgetall(Self::results_key(poll_id))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut tally = Tally::new();
        for (option_id, count_str) in raw {
            let count = count_str
                .parse::<u64>()
                .map_err(|e| StoreError::Protocol(format!("non-numeric tally field: {e}")))?;
            tally.insert(option_id, count);
        }
        Ok(tally)
    }

    async fn close(&self) -> StoreResult<()> {
        // `ConnectionManager` has no explicit close; dropping the clone releases this handle's
        // reference, and the underlying connection is reclaimed when the last clone is dropped.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_naming_matches_the_external_store_contract() {
        assert_eq!(RedisStore::votes_key("p1"), "poll:p1:votes");
        assert_eq!(RedisStore::results_key("p1"), "poll:p1:results");
    }
}
