//! Lua programs for the Redis-backed executor
//!
//! Redis runs a script without interleaving other commands, which is what
//! makes the compare step and the mutation one atomic unit.

/// KEYS[1] = lock key, ARGV[1] = expected owner. Returns 1 when deleted.
pub const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// KEYS[1] = lock key, ARGV[1] = expected owner, ARGV[2] = ttl in milliseconds.
/// Returns 1 when the key now holds ARGV[1] with a fresh ttl.
pub const COMPARE_AND_RESET_TTL: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2]) then
        return 1
    end
    return 0
end
if current == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;
