//! Redis-backed geo-index store.
//!
//! Riders and cabs are hashes, memberships are sets. Seat reservation,
//! cab creation, seat release, cancellation and heartbeats run as Lua
//! scripts so that each one is a single atomic step on the server.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::geo::Position;
use crate::rides::{Cab, CabId, CabStatus, RiderId, RiderRecord, RiderStatus, RiderTicket};
use crate::store::{keys, scripts, AssignOutcome, GeoStore, StoreError, StoreResult};

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// [`GeoStore`] over a shared multiplexed redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    assign_seat: Script,
    create_cab: Script,
    release_seat: Script,
    mark_cancelled: Script,
    heartbeat_cab: Script,
}

impl RedisStore {
    /// Open a client for `redis_url` and establish the shared connection.
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!(url = redis_url, "Store connection established");

        Ok(Self {
            conn,
            assign_seat: Script::new(scripts::ASSIGN_SEAT),
            create_cab: Script::new(scripts::CREATE_CAB),
            release_seat: Script::new(scripts::RELEASE_SEAT),
            mark_cancelled: Script::new(scripts::MARK_CANCELLED),
            heartbeat_cab: Script::new(scripts::HEARTBEAT_CAB),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

fn field<'a>(hash: &'a HashMap<String, String>, key: &str, name: &str) -> StoreResult<&'a str> {
    hash.get(name)
        .map(String::as_str)
        .ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("missing field '{name}'"),
        })
}

fn number<T: FromStr>(hash: &HashMap<String, String>, key: &str, name: &str) -> StoreResult<T> {
    let raw = field(hash, key, name)?;
    raw.parse().map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("field '{name}' is not a number: '{raw}'"),
    })
}

fn parse_rider(rider_id: RiderId, key: &str, hash: &HashMap<String, String>) -> StoreResult<RiderRecord> {
    let status = field(hash, key, "status")?;
    let status = RiderStatus::parse(status).ok_or_else(|| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("unknown rider status '{status}'"),
    })?;

    Ok(RiderRecord {
        id: rider_id,
        position: Position::new(number(hash, key, "lat")?, number(hash, key, "lng")?),
        cell: field(hash, key, "cell")?.to_string(),
        luggage: number(hash, key, "luggage")?,
        detour_factor: number(hash, key, "detour_factor")?,
        status,
        cab_id: hash.get("cab_id").filter(|c| !c.is_empty()).cloned(),
        last_update_ts: number(hash, key, "last_update_ts")?,
    })
}

fn parse_cab(cab_id: &str, key: &str, hash: &HashMap<String, String>) -> StoreResult<Cab> {
    let status = field(hash, key, "status")?;
    let status = CabStatus::parse(status).ok_or_else(|| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("unknown cab status '{status}'"),
    })?;
    let min_tolerance_km = match hash.get("min_tolerance").filter(|t| !t.is_empty()) {
        Some(_) => Some(number(hash, key, "min_tolerance")?),
        None => None,
    };

    Ok(Cab {
        id: cab_id.to_string(),
        position: Position::new(number(hash, key, "lat")?, number(hash, key, "lng")?),
        capacity: number(hash, key, "capacity")?,
        passenger_count: number(hash, key, "passenger_count")?,
        luggage_count: number(hash, key, "luggage_count")?,
        min_tolerance_km,
        status,
        last_update_ts: number(hash, key, "last_update_ts")?,
    })
}

fn cab_fields(cab: &Cab) -> Vec<(&'static str, String)> {
    vec![
        ("lat", cab.position.lat.to_string()),
        ("lng", cab.position.lng.to_string()),
        ("capacity", cab.capacity.to_string()),
        ("passenger_count", cab.passenger_count.to_string()),
        ("luggage_count", cab.luggage_count.to_string()),
        (
            "min_tolerance",
            cab.min_tolerance_km.map(|t| t.to_string()).unwrap_or_default(),
        ),
        ("status", cab.status.as_str().to_string()),
        ("last_update_ts", cab.last_update_ts.to_string()),
    ]
}

#[async_trait]
impl GeoStore for RedisStore {
    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn register_presence(&self, rider: &RiderRecord) -> StoreResult<()> {
        let mut conn = self.conn();
        let key = keys::rider(rider.id);
        let fields = [
            ("lat", rider.position.lat.to_string()),
            ("lng", rider.position.lng.to_string()),
            ("cell", rider.cell.clone()),
            ("luggage", rider.luggage.to_string()),
            ("detour_factor", rider.detour_factor.to_string()),
            ("status", RiderStatus::Pending.as_str().to_string()),
            ("last_update_ts", rider.last_update_ts.to_string()),
        ];

        let _: () = redis::pipe()
            .atomic()
            .hdel(&key, "cab_id")
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore()
            .sadd(keys::waiting_pool(&rider.cell), rider.id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn rider(&self, rider_id: RiderId) -> StoreResult<Option<RiderRecord>> {
        let mut conn = self.conn();
        let key = keys::rider(rider_id);
        let hash: HashMap<String, String> = conn.hgetall(&key).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        parse_rider(rider_id, &key, &hash).map(Some)
    }

    async fn mark_rider_cancelled(&self, rider_id: RiderId, now: i64) -> StoreResult<bool> {
        let mut conn = self.conn();
        let reply: i64 = self
            .mark_cancelled
            .key(keys::rider(rider_id))
            .arg(now)
            .invoke_async(&mut conn)
            .await?;
        Ok(reply == 1)
    }

    async fn remove_from_waiting_pool(&self, rider_id: RiderId, cell: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.srem(keys::waiting_pool(cell), rider_id).await?;
        Ok(())
    }

    async fn delete_rider(&self, rider_id: RiderId) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.del(keys::rider(rider_id)).await?;
        Ok(())
    }

    async fn waiting_riders(&self, cell: &str) -> StoreResult<BTreeSet<RiderId>> {
        let mut conn = self.conn();
        let members: Vec<RiderId> = conn.smembers(keys::waiting_pool(cell)).await?;
        Ok(members.into_iter().collect())
    }

    async fn waiting_count(&self, cell: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let count: u64 = conn.scard(keys::waiting_pool(cell)).await?;
        Ok(count)
    }

    async fn register_cab(&self, cab: &Cab, cell: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let key = keys::cab(&cab.id);
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &cab_fields(cab))
            .ignore()
            .sadd(keys::cell_cabs(cell), &cab.id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn cab(&self, cab_id: &str) -> StoreResult<Option<Cab>> {
        let mut conn = self.conn();
        let key = keys::cab(cab_id);
        let hash: HashMap<String, String> = conn.hgetall(&key).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        parse_cab(cab_id, &key, &hash).map(Some)
    }

    async fn cab_riders(&self, cab_id: &str) -> StoreResult<BTreeSet<RiderId>> {
        let mut conn = self.conn();
        let members: Vec<RiderId> = conn.smembers(keys::cab_riders(cab_id)).await?;
        Ok(members.into_iter().collect())
    }

    async fn cabs_in_cells(&self, cells: &[String]) -> StoreResult<BTreeSet<CabId>> {
        if cells.is_empty() {
            return Ok(BTreeSet::new());
        }
        let mut conn = self.conn();
        let set_keys: Vec<String> = cells.iter().map(|c| keys::cell_cabs(c)).collect();
        let members: Vec<CabId> = conn.sunion(set_keys).await?;
        Ok(members.into_iter().collect())
    }

    async fn heartbeat_cab(
        &self,
        cab_id: &str,
        position: Position,
        now: i64,
    ) -> StoreResult<bool> {
        let mut conn = self.conn();
        let reply: i64 = self
            .heartbeat_cab
            .key(keys::cab(cab_id))
            .arg(position.lat)
            .arg(position.lng)
            .arg(now)
            .invoke_async(&mut conn)
            .await?;
        Ok(reply == 1)
    }

    async fn try_assign(
        &self,
        cab_id: &str,
        rider: &RiderTicket,
        now: i64,
    ) -> StoreResult<AssignOutcome> {
        let mut conn = self.conn();
        let reply: i64 = self
            .assign_seat
            .key(keys::cab(cab_id))
            .key(keys::cab_riders(cab_id))
            .key(keys::rider(rider.rider_id))
            .key(keys::waiting_pool(&rider.cell))
            .arg(rider.rider_id)
            .arg(rider.luggage)
            .arg(rider.tolerance_km)
            .arg(cab_id)
            .arg(now)
            .invoke_async(&mut conn)
            .await?;
        AssignOutcome::from_reply("assign_seat", reply)
    }

    async fn create_cab(&self, cab: &Cab, rider: &RiderTicket) -> StoreResult<AssignOutcome> {
        let mut conn = self.conn();
        let reply: i64 = self
            .create_cab
            .key(keys::cab(&cab.id))
            .key(keys::cab_riders(&cab.id))
            .key(keys::rider(rider.rider_id))
            .key(keys::waiting_pool(&rider.cell))
            .key(keys::cell_cabs(&rider.cell))
            .arg(rider.rider_id)
            .arg(&cab.id)
            .arg(cab.position.lat)
            .arg(cab.position.lng)
            .arg(cab.capacity)
            .arg(cab.passenger_count)
            .arg(cab.luggage_count)
            .arg(cab.min_tolerance_km.map(|t| t.to_string()).unwrap_or_default())
            .arg(cab.status.as_str())
            .arg(cab.last_update_ts)
            .invoke_async(&mut conn)
            .await?;
        AssignOutcome::from_reply("create_cab", reply)
    }

    async fn release_seat(&self, cab_id: &str, rider_id: RiderId) -> StoreResult<bool> {
        let mut conn = self.conn();
        let reply: i64 = self
            .release_seat
            .key(keys::cab(cab_id))
            .key(keys::cab_riders(cab_id))
            .key(keys::rider(rider_id))
            .arg(rider_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(reply == 1)
    }

    async fn cached_fare(&self, key: &str) -> StoreResult<Option<f64>> {
        let mut conn = self.conn();
        let amount: Option<f64> = conn.get(key).await?;
        Ok(amount)
    }

    async fn cache_fare(&self, key: &str, amount: f64, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.set_ex(key, amount, ttl.as_secs().max(1)).await?;
        Ok(())
    }
}
