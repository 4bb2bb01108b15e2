//! TinyLFU Cache demo driver
//!
//! Caches signature verification timestamps keyed by
//! `policy_id;rule;image_ref`, reads them back and prints cache statistics.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tinylfu_cache::{Cache, CacheConfig};

/// One verification result the demo caches.
struct Verification {
    policy_id: &'static str,
    rule: &'static str,
    image_ref: &'static str,
}

impl Verification {
    fn key(&self) -> String {
        [self.policy_id, self.rule, self.image_ref].join(";")
    }
}

const VERIFICATIONS: [Verification; 4] = [
    Verification {
        policy_id: "1234tty5",
        rule: "Verify-Signature",
        image_ref: "ghcr.io/example/app:1",
    },
    Verification {
        policy_id: "12eterter3456",
        rule: "Verify-Signature",
        image_ref: "ghcr.io/example/worker:1",
    },
    Verification {
        policy_id: "12345",
        rule: "Verify-Provenance",
        image_ref: "ghcr.io/example/app:1",
    },
    Verification {
        policy_id: "12345",
        rule: "Verify-Signature",
        image_ref: "ghcr.io/example/app:2",
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tinylfu_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = CacheConfig::from_env();
    if config.default_ttl.is_zero() {
        config.default_ttl = Duration::from_secs(30);
    }
    info!(
        "Configuration loaded: max_cost={}, default_ttl={}ms, shards={}",
        config.max_cost,
        config.default_ttl.as_millis(),
        config.shard_count
    );

    let cache: Cache<DateTime<Utc>> = Cache::with_listener(config, |evicted| {
        info!(
            key = %String::from_utf8_lossy(&evicted.key),
            reason = ?evicted.reason,
            "entry left the cache"
        );
    })
    .context("failed to create cache")?;

    for verification in &VERIFICATIONS {
        let key = verification.key();
        let admitted = cache.set(&key, Utc::now(), 1)?;
        info!(%key, admitted, "stored verification");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for verification in &VERIFICATIONS {
        let key = verification.key();
        match cache.get(&key)? {
            Some(verified_at) => info!(%key, verified_at = %verified_at.to_rfc3339(), "cache hit"),
            None => info!(%key, "cache miss"),
        }
    }

    let stats = serde_json::to_string_pretty(&cache.stats())?;
    println!("{}", stats);

    cache.close().await?;
    info!("Demo complete");
    Ok(())
}
