//! Lua scripts run server-side by the redis backend.
//!
//! Each script executes atomically, so the read-check-write inside it
//! cannot interleave with another worker's. Replies: 1 assigned,
//! 0 cab no longer compatible, -1 rider not PENDING.

/// KEYS: cab hash, cab rider set, rider hash, waiting pool.
/// ARGV: rider id, rider luggage, rider tolerance km, cab id, now.
pub const ASSIGN_SEAT: &str = r#"
if redis.call('HGET', KEYS[3], 'status') ~= 'PENDING' then
  return -1
end
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
local cab = redis.call('HMGET', KEYS[1], 'status', 'capacity', 'passenger_count', 'luggage_count', 'min_tolerance')
if cab[1] ~= 'AVAILABLE' then
  return 0
end
local capacity = tonumber(cab[2]) or 0
local passengers = tonumber(cab[3]) or 0
local luggage = tonumber(cab[4]) or 0
local rider_luggage = tonumber(ARGV[2])
if passengers + luggage + 1 + rider_luggage > capacity then
  return 0
end
passengers = passengers + 1
luggage = luggage + rider_luggage
local tolerance = tonumber(ARGV[3])
local current = tonumber(cab[5])
if current ~= nil and current < tolerance then
  tolerance = current
end
local status = 'AVAILABLE'
if passengers + luggage >= capacity then
  status = 'FULL'
end
redis.call('HSET', KEYS[1],
  'passenger_count', passengers,
  'luggage_count', luggage,
  'min_tolerance', tostring(tolerance),
  'status', status)
redis.call('SADD', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[3], 'status', 'MATCHED', 'cab_id', ARGV[4], 'last_update_ts', ARGV[5])
redis.call('SREM', KEYS[4], ARGV[1])
return 1
"#;

/// KEYS: cab hash, cab rider set, rider hash, waiting pool, cell cab set.
/// ARGV: rider id, cab id, lat, lng, capacity, passenger count,
/// luggage count, min tolerance, status, now.
pub const CREATE_CAB: &str = r#"
if redis.call('HGET', KEYS[3], 'status') ~= 'PENDING' then
  return -1
end
redis.call('HSET', KEYS[1],
  'lat', ARGV[3],
  'lng', ARGV[4],
  'capacity', ARGV[5],
  'passenger_count', ARGV[6],
  'luggage_count', ARGV[7],
  'min_tolerance', ARGV[8],
  'status', ARGV[9],
  'last_update_ts', ARGV[10])
redis.call('SADD', KEYS[2], ARGV[1])
redis.call('SADD', KEYS[5], ARGV[2])
redis.call('HSET', KEYS[3], 'status', 'MATCHED', 'cab_id', ARGV[2], 'last_update_ts', ARGV[10])
redis.call('SREM', KEYS[4], ARGV[1])
return 1
"#;

/// KEYS: cab hash, cab rider set, rider hash. ARGV: rider id.
/// Returns 1 when a seat was given back, 0 when the rider held none.
pub const RELEASE_SEAT: &str = r#"
if redis.call('SREM', KEYS[2], ARGV[1]) == 0 then
  return 0
end
local rider_luggage = tonumber(redis.call('HGET', KEYS[3], 'luggage')) or 0
local cab = redis.call('HMGET', KEYS[1], 'capacity', 'passenger_count', 'luggage_count')
local capacity = tonumber(cab[1]) or 0
local passengers = math.max((tonumber(cab[2]) or 0) - 1, 0)
local luggage = math.max((tonumber(cab[3]) or 0) - rider_luggage, 0)
redis.call('HSET', KEYS[1], 'passenger_count', passengers, 'luggage_count', luggage)
if passengers + luggage < capacity then
  redis.call('HSET', KEYS[1], 'status', 'AVAILABLE')
end
return 1
"#;

/// KEYS: rider hash. ARGV: now. Returns 0 when the record is gone.
pub const MARK_CANCELLED: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], 'status', 'CANCELLED', 'last_update_ts', ARGV[1])
return 1
"#;

/// KEYS: cab hash. ARGV: lat, lng, now. Returns 0 for unknown cabs.
pub const HEARTBEAT_CAB: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], 'lat', ARGV[1], 'lng', ARGV[2], 'last_update_ts', ARGV[3])
return 1
"#;
