//! Cache key prefixes and glob matching

/// Prefix for revoked bearer tokens
pub const BLACKLIST_PREFIX: &str = "blacklist";

/// Prefix for rate limit counters
pub const RATE_LIMIT_PREFIX: &str = "rate_limit";

/// Default prefix for cached HTTP responses
pub const RESPONSE_CACHE_PREFIX: &str = "cache";

/// Prefix for keys written through the key-value API, keeping them apart
/// from the service's own keys
pub const KV_PREFIX: &str = "kv";

/// Storage key for a key-value API key
pub fn kv(key: &str) -> String {
    format!("{}:{}", KV_PREFIX, key)
}

/// Blacklist key for a token
pub fn blacklist(token: &str) -> String {
    format!("{}:{}", BLACKLIST_PREFIX, token)
}

/// Rate limit key for a client IP
pub fn rate_limit_ip(ip: &str) -> String {
    format!("{}:ip:{}", RATE_LIMIT_PREFIX, ip)
}

/// Rate limit key for an authenticated bearer token
pub fn rate_limit_token(token: &str) -> String {
    format!("{}:token:{}", RATE_LIMIT_PREFIX, token)
}

/// Response cache key for a request path (including query string)
pub fn response(prefix: &str, path_and_query: &str) -> String {
    format!("{}:{}", prefix, path_and_query)
}

/// Matches `text` against a Redis-style glob with `*` and `?` wildcards.
///
/// Bracket classes are not supported and match literally.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // position of the last `*` and the text index it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(c) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
