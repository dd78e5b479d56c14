/*!
 * # Coupon validation rate limiting
 *
 * Fixed-window counters keyed by the caller: the user id for signed-in
 * shoppers, the client address for guests. Guests get a tighter budget since
 * addresses are shared and cheap to rotate.
 *
 * The client address is the socket peer. Forwarding headers are only read
 * when that peer is one of the configured trusted proxies.
 */

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;
use uuid::Uuid;

use super::AuthUser;
use crate::config::AppConfig;

const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

#[derive(Clone, Debug)]
pub struct CouponRateLimitConfig {
    pub authenticated_max: u32,
    pub guest_max: u32,
    pub window: Duration,
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for CouponRateLimitConfig {
    fn default() -> Self {
        Self {
            authenticated_max: 10,
            guest_max: 5,
            window: Duration::from_secs(60),
            trusted_proxies: Vec::new(),
        }
    }
}

impl From<&AppConfig> for CouponRateLimitConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            authenticated_max: cfg.coupon_rate_limit_authenticated,
            guest_max: cfg.coupon_rate_limit_guest,
            window: cfg.coupon_rate_limit_window(),
            trusted_proxies: cfg.trusted_proxy_list(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    User(Uuid),
    Client(String),
}

impl RateLimitKey {
    /// Picks the key for a caller: user id when signed in, otherwise the
    /// client address. Behind a trusted proxy that is the nearest
    /// `x-forwarded-for` hop not itself a trusted proxy, then `x-real-ip`.
    /// Any other peer is keyed by its socket address.
    pub fn for_caller(
        principal: Option<&AuthUser>,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trusted_proxies: &[IpAddr],
    ) -> Self {
        if let Some(user) = principal {
            return RateLimitKey::User(user.user_id);
        }

        let peer_ip = peer.map(|addr| addr.ip());
        let client = match peer_ip {
            Some(ip) if trusted_proxies.contains(&ip) => {
                forwarded_client(headers, trusted_proxies).unwrap_or(ip)
            }
            Some(ip) => ip,
            None => return RateLimitKey::Client("unknown".to_string()),
        };

        RateLimitKey::Client(client.to_string())
    }

    fn is_guest(&self) -> bool {
        matches!(self, RateLimitKey::Client(_))
    }
}

fn forwarded_client(headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> Option<IpAddr> {
    // walk right to left: the rightmost hops were appended by our own proxies
    let forwarded = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .collect::<Vec<_>>();
    for hop in forwarded.into_iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) if trusted_proxies.contains(&ip) => continue,
            Ok(ip) => return Some(ip),
            Err(_) => return None,
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Outcome of a single check, carried to the response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl RateLimitDecision {
    pub fn reset_after_secs(&self) -> u64 {
        // round up so clients never retry a moment too early
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let pairs = [
            (X_RATELIMIT_LIMIT, self.limit as u64),
            (X_RATELIMIT_REMAINING, self.remaining as u64),
            (X_RATELIMIT_RESET, self.reset_after_secs()),
        ];
        for (name, value) in pairs {
            headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
        }
        if !self.allowed {
            headers.insert(
                axum::http::header::RETRY_AFTER,
                HeaderValue::from(self.reset_after_secs()),
            );
        }
    }
}

#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Clone)]
pub struct CouponRateLimiter {
    config: CouponRateLimitConfig,
    entries: Arc<Mutex<HashMap<RateLimitKey, WindowEntry>>>,
}

impl CouponRateLimiter {
    pub fn new(config: CouponRateLimitConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Rate-limit key for a request, using the configured trusted proxies.
    pub fn key_for(
        &self,
        principal: Option<&AuthUser>,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> RateLimitKey {
        RateLimitKey::for_caller(principal, headers, peer, &self.config.trusted_proxies)
    }

    fn limit_for(&self, key: &RateLimitKey) -> u32 {
        if key.is_guest() {
            self.config.guest_max
        } else {
            self.config.authenticated_max
        }
    }

    /// Counts one attempt for `key` and reports whether it is allowed.
    pub async fn check(&self, key: &RateLimitKey) -> RateLimitDecision {
        let limit = self.limit_for(key);
        let window = self.config.window;
        let now = Instant::now();

        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.clone()).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }

        let reset_after = window.saturating_sub(now.duration_since(entry.window_start));
        if entry.count >= limit {
            debug!(?key, limit, "coupon validation rate limited");
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_after,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit - entry.count,
            reset_after,
        }
    }

    /// Drops entries whose window ended.
    pub async fn cleanup(&self) {
        let window = self.config.window;
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.window_start.elapsed() < window);
    }
}

impl Default for CouponRateLimiter {
    fn default() -> Self {
        Self::new(CouponRateLimitConfig::default())
    }
}

/// Background task that periodically prunes expired windows.
pub async fn cleanup_rate_limits(rate_limiter: CouponRateLimiter) {
    loop {
        sleep(Duration::from_secs(300)).await;
        rate_limiter.cleanup().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest(ip: &str) -> RateLimitKey {
        RateLimitKey::Client(ip.to_string())
    }

    #[tokio::test]
    async fn guests_get_the_smaller_budget() {
        let limiter = CouponRateLimiter::default();
        let key = guest("203.0.113.9");
        for expected_remaining in (0..5).rev() {
            let decision = limiter.check(&key).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
        let denied = limiter.check(&key).await;
        assert!(!denied.allowed);
        assert_eq!(denied.limit, 5);

        let user = RateLimitKey::User(Uuid::new_v4());
        assert_eq!(limiter.check(&user).await.limit, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_it_elapses() {
        let limiter = CouponRateLimiter::new(CouponRateLimitConfig {
            authenticated_max: 1,
            guest_max: 1,
            window: Duration::from_secs(60),
            ..Default::default()
        });
        let key = guest("198.51.100.1");
        assert!(limiter.check(&key).await.allowed);
        assert!(!limiter.check(&key).await.allowed);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check(&key).await.allowed);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = CouponRateLimiter::new(CouponRateLimitConfig {
            authenticated_max: 1,
            guest_max: 1,
            window: Duration::from_secs(60),
            ..Default::default()
        });
        assert!(limiter.check(&guest("a")).await.allowed);
        assert!(limiter.check(&guest("b")).await.allowed);
        assert!(!limiter.check(&guest("a")).await.allowed);
    }

    fn ip(addr: &str) -> IpAddr {
        addr.parse().unwrap()
    }

    #[test]
    fn caller_key_prefers_user_then_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        let peer: SocketAddr = "192.0.2.50:5000".parse().unwrap();

        // untrusted peer: forwarding headers are ignored
        assert_eq!(
            RateLimitKey::for_caller(None, &headers, Some(peer), &[]),
            guest("192.0.2.50")
        );

        let user = AuthUser {
            user_id: Uuid::new_v4(),
            email: None,
            email_verified: false,
            roles: vec![],
        };
        assert_eq!(
            RateLimitKey::for_caller(Some(&user), &headers, Some(peer), &[]),
            RateLimitKey::User(user.user_id)
        );

        assert_eq!(
            RateLimitKey::for_caller(None, &HeaderMap::new(), None, &[]),
            guest("unknown")
        );
    }

    #[test]
    fn trusted_proxy_hops_are_skipped() {
        let proxies = [ip("10.0.0.1"), ip("10.0.0.9")];
        let peer: SocketAddr = "10.0.0.9:443".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "198.51.100.1, 203.0.113.7, 10.0.0.1".parse().unwrap(),
        );
        // the spoofable leftmost entry loses to the nearest untrusted hop
        assert_eq!(
            RateLimitKey::for_caller(None, &headers, Some(peer), &proxies),
            guest("203.0.113.7")
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.8".parse().unwrap());
        assert_eq!(
            RateLimitKey::for_caller(None, &headers, Some(peer), &proxies),
            guest("203.0.113.8")
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        assert_eq!(
            RateLimitKey::for_caller(None, &headers, Some(peer), &proxies),
            guest("10.0.0.9")
        );
    }

    #[test]
    fn denied_decision_sets_retry_after() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_after: Duration::from_millis(12_500),
        };
        let mut headers = HeaderMap::new();
        decision.apply_headers(&mut headers);
        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
        assert_eq!(headers.get("x-ratelimit-reset").unwrap(), "13");
        assert_eq!(headers.get("retry-after").unwrap(), "13");
    }
}
