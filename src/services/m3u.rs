use anyhow::{anyhow, bail, Result};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::io::StreamReader;

use crate::metrics::{M3U_REFRESH_FAILURES, M3U_REFRESH_TOTAL};
use crate::models::Channel;

// Defensive limits for streamed parsing
const MAX_LINE_BYTES: usize = 32 * 1024;
const READ_LINE_TIMEOUT: Duration = Duration::from_secs(10);

lazy_static! {
    /// Strict EXTINF attribute pattern: all four tvg/group attributes in
    /// order, then the display title after the comma.
    static ref EXTINF_FULL: Regex = Regex::new(
        r#"tvg-id="([^"]*)"\s*tvg-name="([^"]*)"\s*tvg-logo="([^"]*)"\s*group-title="([^"]*)"\s*,(.+)"#
    )
    .unwrap();

    /// Fallback pattern tolerating missing attributes.
    static ref EXTINF_LOOSE: Regex = Regex::new(
        r#"-1\s+(?:tvg-id="([^"]*)"\s*)?(?:tvg-name="([^"]*)"\s*)?(?:tvg-logo="([^"]*)"\s*)?(?:group-title="([^"]*)"\s*)?,(.+)"#
    )
    .unwrap();
}

/// tvg-name wins, then the display title, then a synthesized placeholder.
fn resolve_name(tvg_name: &str, title: &str, index: usize) -> String {
    let name = tvg_name.trim();
    if !name.is_empty() {
        return name.to_string();
    }
    let title = title.trim();
    if !title.is_empty() {
        return title.to_string();
    }
    format!("Channel_{index}")
}

/// Parse a single `#EXTINF:` line into a channel with an empty URL. `index`
/// feeds the synthesized name when neither tvg-name nor a title is present.
fn parse_extinf(line: &str, index: usize) -> Option<Channel> {
    let caps = EXTINF_FULL
        .captures(line)
        .or_else(|| EXTINF_LOOSE.captures(line))?;
    let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");

    let title = field(5).trim().to_string();
    let name = resolve_name(field(2), &title, index);

    let group = match field(4) {
        "" => "Outros".to_string(),
        g => g.to_string(),
    };
    let tvg_id = match field(1) {
        "" => name.clone(),
        id => id.to_string(),
    };

    Some(Channel {
        tvg_id,
        name,
        logo: field(3).to_string(),
        group,
        title,
        url: String::new(),
    })
}

/// Line-oriented M3U parse. A `#EXTINF:` line opens a pending channel; the
/// next line starting with `http` finalizes it. A pending channel with no
/// URL line is dropped. Channels come back in file order, no deduplication.
pub async fn parse_channels<R: AsyncBufRead + Unpin>(mut reader: R) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut pending: Option<Channel> = None;
    let mut index = 0usize;
    let mut line = String::new();

    loop {
        line.clear();
        match tokio::time::timeout(READ_LINE_TIMEOUT, reader.read_line(&mut line)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!("playlist read error after {} channels: {}", channels.len(), e);
                break;
            }
            Err(_) => {
                tracing::warn!("playlist read stalled after {} channels", channels.len());
                break;
            }
        }
        if line.len() > MAX_LINE_BYTES {
            tracing::warn!("playlist line over {MAX_LINE_BYTES} bytes, stopping parse");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("#EXTM3U") {
            continue;
        }

        if trimmed.starts_with("#EXTINF:") {
            if let Some(channel) = parse_extinf(trimmed, index) {
                pending = Some(channel);
                index += 1;
            }
            continue;
        }

        if trimmed.starts_with("http") {
            if let Some(mut channel) = pending.take() {
                channel.url = trimmed.to_string();
                channels.push(channel);
            }
        }
    }

    channels
}

/// Render channels back into an M3U document. Group order is first-seen,
/// order within a group is input order.
pub fn render_playlist(channels: &[Channel]) -> String {
    let mut out = String::from("#EXTM3U\n");

    let mut order: Vec<&str> = Vec::new();
    let mut grouped: HashMap<&str, Vec<&Channel>> = HashMap::new();
    for channel in channels {
        let entry = grouped.entry(channel.group.as_str()).or_default();
        if entry.is_empty() {
            order.push(channel.group.as_str());
        }
        entry.push(channel);
    }

    for group in order {
        for channel in &grouped[group] {
            let _ = writeln!(
                out,
                "#EXTINF:-1 tvg-id=\"{}\" tvg-name=\"{}\" tvg-logo=\"{}\" group-title=\"{}\",{}",
                channel.tvg_id, channel.name, channel.logo, group, channel.title
            );
            let _ = writeln!(out, "{}", channel.url);
        }
    }

    out
}

#[derive(Debug)]
struct CacheSlot {
    channels: Arc<Vec<Channel>>,
    last_refreshed: Option<Instant>,
}

impl CacheSlot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        !self.channels.is_empty()
            && self
                .last_refreshed
                .map(|at| at.elapsed() <= ttl)
                .unwrap_or(false)
    }
}

/// Single process-wide channel snapshot with single-flight refresh:
/// concurrent stale readers coalesce on one fetch, the losers observe the
/// winner's result (even when that refresh came back empty).
#[derive(Debug)]
pub struct ChannelCache {
    slot: RwLock<CacheSlot>,
    refresh: Mutex<()>,
}

impl ChannelCache {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(CacheSlot {
                channels: Arc::new(Vec::new()),
                last_refreshed: None,
            }),
            refresh: Mutex::new(()),
        }
    }

    pub async fn get_or_refresh<F, Fut>(&self, ttl: Duration, fetch: F) -> Arc<Vec<Channel>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Vec<Channel>>,
    {
        let observed = {
            let slot = self.slot.read().await;
            if slot.is_fresh(ttl) {
                return slot.channels.clone();
            }
            slot.last_refreshed
        };

        let _guard = self.refresh.lock().await;
        {
            let slot = self.slot.read().await;
            // A refresh completed while we waited on the lock; take its
            // result even if it failed, rather than fetching again.
            if slot.last_refreshed != observed {
                return slot.channels.clone();
            }
        }

        let channels = Arc::new(fetch().await);
        let mut slot = self.slot.write().await;
        slot.channels = channels.clone();
        slot.last_refreshed = Some(Instant::now());
        channels
    }

    pub async fn stats(&self) -> (usize, Option<u64>) {
        let slot = self.slot.read().await;
        (
            slot.channels.len(),
            slot.last_refreshed.map(|at| at.elapsed().as_secs()),
        )
    }
}

/// Playlist ingestion engine: fetches the configured upstream M3U with
/// retry/backoff and serves the cached channel set.
pub struct M3uService {
    client: Client,
    source_url: String,
    cache: ChannelCache,
    ttl: Duration,
    max_attempts: u32,
}

impl M3uService {
    pub fn new(
        source_url: &str,
        user_agent: &str,
        timeout_ms: u64,
        cache_ttl_secs: u64,
        max_attempts: u32,
    ) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .gzip(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            source_url: source_url.to_string(),
            cache: ChannelCache::new(),
            ttl: Duration::from_secs(cache_ttl_secs),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Current channel set, refreshing through the cache when empty or
    /// older than the TTL.
    pub async fn channels(&self) -> Arc<Vec<Channel>> {
        self.cache
            .get_or_refresh(self.ttl, || self.fetch_and_parse(&self.source_url))
            .await
    }

    pub async fn cache_stats(&self) -> (usize, Option<u64>) {
        self.cache.stats().await
    }

    /// Fetch and parse an upstream playlist. Failure is non-fatal: it is
    /// logged and counted, and the caller gets an empty set.
    pub async fn fetch_and_parse(&self, url: &str) -> Vec<Channel> {
        M3U_REFRESH_TOTAL.inc();
        match self.try_fetch(url).await {
            Ok(channels) => {
                tracing::info!("fetched {} channels from upstream", channels.len());
                channels
            }
            Err(e) => {
                M3U_REFRESH_FAILURES.inc();
                tracing::warn!("failed to fetch M3U: {e:#}");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Vec<Channel>> {
        if url.is_empty() {
            bail!("no upstream M3U URL configured");
        }
        let response = self.fetch_with_retry(url).await?;

        let stream = response.bytes_stream().map(|result| {
            result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        });
        let reader = BufReader::new(StreamReader::new(stream));
        Ok(parse_channels(reader).await)
    }

    /// GET with up to `max_attempts` tries. Only transport failures and
    /// HTTP 500/502/503/504 are retried; anything else fails immediately.
    async fn fetch_with_retry(&self, url: &str) -> Result<Response> {
        let mut last_err = None;

        for attempt in 1..=self.max_attempts {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    if !is_retryable(status.as_u16()) {
                        bail!("upstream returned HTTP {}", status.as_u16());
                    }
                    last_err = Some(anyhow!("upstream returned HTTP {}", status.as_u16()));
                }
                Err(err) => {
                    last_err = Some(err.into());
                }
            }

            if attempt < self.max_attempts {
                let backoff_ms = (1u64 << (attempt - 1)).saturating_mul(1000).min(10_000);
                tracing::warn!(attempt, backoff_ms, "retrying upstream fetch");
                sleep(Duration::from_millis(backoff_ms)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("upstream fetch failed")))
    }
}

fn is_retryable(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn parse_str(input: &str) -> Vec<Channel> {
        parse_channels(BufReader::new(input.as_bytes())).await
    }

    fn sample(name: &str, group: &str) -> Channel {
        Channel {
            tvg_id: name.to_string(),
            name: name.to_string(),
            logo: String::new(),
            group: group.to_string(),
            title: name.to_string(),
            url: format!("http://stream/{name}"),
        }
    }

    #[tokio::test]
    async fn parses_well_formed_pairs_in_order() {
        let input = "#EXTM3U\n\
            #EXTINF:-1 tvg-id=\"globo\" tvg-name=\"Globo HD\" tvg-logo=\"http://logo/g.png\" group-title=\"TV\",Globo HD\n\
            http://stream/globo\n\
            #EXTINF:-1 tvg-id=\"sbt\" tvg-name=\"SBT\" tvg-logo=\"\" group-title=\"TV\",SBT\n\
            http://stream/sbt\n";
        let channels = parse_str(input).await;

        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "Globo HD");
        assert_eq!(channels[0].tvg_id, "globo");
        assert_eq!(channels[0].group, "TV");
        assert_eq!(channels[0].url, "http://stream/globo");
        assert_eq!(channels[1].name, "SBT");
    }

    #[tokio::test]
    async fn metadata_without_url_is_dropped() {
        let input = "#EXTM3U\n\
            #EXTINF:-1 tvg-id=\"a\" tvg-name=\"A\" tvg-logo=\"\" group-title=\"TV\",A\n\
            http://stream/a\n\
            #EXTINF:-1 tvg-id=\"b\" tvg-name=\"B\" tvg-logo=\"\" group-title=\"TV\",B\n";
        let channels = parse_str(input).await;

        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "A");
    }

    #[tokio::test]
    async fn consecutive_metadata_lines_keep_only_last() {
        let input = "#EXTINF:-1 tvg-id=\"a\" tvg-name=\"A\" tvg-logo=\"\" group-title=\"TV\",A\n\
            #EXTINF:-1 tvg-id=\"b\" tvg-name=\"B\" tvg-logo=\"\" group-title=\"TV\",B\n\
            http://stream/x\n";
        let channels = parse_str(input).await;

        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "B");
        assert_eq!(channels[0].url, "http://stream/x");
    }

    #[tokio::test]
    async fn loose_pattern_fills_defaults() {
        let input = "#EXTINF:-1 tvg-logo=\"http://logo/c.png\" group-title=\"News\",CNN\n\
            http://stream/cnn\n\
            #EXTINF:-1 tvg-name=\"Solo\",Ignored Title\n\
            http://stream/solo\n";
        let channels = parse_str(input).await;

        assert_eq!(channels.len(), 2);
        // Name falls back to the display title, tvg-id to the name.
        assert_eq!(channels[0].name, "CNN");
        assert_eq!(channels[0].tvg_id, "CNN");
        assert_eq!(channels[0].group, "News");
        // Missing group-title defaults to "Outros".
        assert_eq!(channels[1].name, "Solo");
        assert_eq!(channels[1].group, "Outros");
    }

    #[test]
    fn name_resolution_falls_back_to_synthesized() {
        assert_eq!(resolve_name("Globo", "Globo HD", 0), "Globo");
        assert_eq!(resolve_name("", "Globo HD", 0), "Globo HD");
        assert_eq!(resolve_name("", "  ", 7), "Channel_7");
    }

    #[tokio::test]
    async fn empty_attributes_fall_back_to_title() {
        let input = "#EXTINF:-1 tvg-id=\"\" tvg-name=\"\" tvg-logo=\"\" group-title=\"\",Avulso\n\
            http://stream/x\n";
        let channels = parse_str(input).await;

        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Avulso");
        assert_eq!(channels[0].tvg_id, "Avulso");
        assert_eq!(channels[0].group, "Outros");
    }

    #[tokio::test]
    async fn url_without_metadata_is_ignored() {
        let channels = parse_str("#EXTM3U\nhttp://stream/orphan\n").await;
        assert!(channels.is_empty());
    }

    #[test]
    fn render_groups_in_first_seen_order() {
        let channels = vec![
            sample("A", "TV"),
            sample("B", "News"),
            sample("C", "TV"),
        ];
        let out = render_playlist(&channels);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "#EXTM3U");
        // TV group first (A then C), then News.
        assert!(lines[1].contains("tvg-name=\"A\""));
        assert_eq!(lines[2], "http://stream/A");
        assert!(lines[3].contains("tvg-name=\"C\""));
        assert!(lines[5].contains("tvg-name=\"B\""));
        assert!(lines[5].contains("group-title=\"News\""));
    }

    #[tokio::test]
    async fn cache_fetches_once_within_ttl() {
        let cache = ChannelCache::new();
        let count = AtomicUsize::new(0);
        let ttl = Duration::from_secs(3600);

        for _ in 0..3 {
            let got = cache
                .get_or_refresh(ttl, || async {
                    count.fetch_add(1, Ordering::SeqCst);
                    vec![sample("A", "TV")]
                })
                .await;
            assert_eq!(got.len(), 1);
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_cache_refreshes_again() {
        let cache = ChannelCache::new();
        let count = AtomicUsize::new(0);
        let ttl = Duration::from_secs(3600);

        for _ in 0..2 {
            let got = cache
                .get_or_refresh(ttl, || async {
                    count.fetch_add(1, Ordering::SeqCst);
                    Vec::new()
                })
                .await;
            assert!(got.is_empty());
        }

        // A failed refresh leaves the slot empty, so the next call tries again.
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_refresh_coalesces_to_one_fetch() {
        let cache = ChannelCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(3600);

        let fetch = |count: Arc<AtomicUsize>| async move {
            count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            vec![sample("A", "TV")]
        };

        let (a, b) = tokio::join!(
            cache.get_or_refresh(ttl, || fetch(count.clone())),
            cache.get_or_refresh(ttl, || fetch(count.clone())),
        );

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
