//! Wayback Machine 快照抓取策略
//!
//! 直接访问被拒时，从 Internet Archive 拉取近期快照。流程：
//!
//! 1. 查询 CDX 索引，找时间窗口内最新的 200 快照
//! 2. 用 `id_` 原样模式取快照正文（不带存档工具条注入）
//!
//! CDX 和快照端点同样会有瞬时故障，整个流程带自己的退避重试；
//! 窗口内无快照是确定性结果，不消耗重试次数。
//!
//! 窗口外的快照一律拒绝：过期职位信息比没有信息更糟。
//! 本策略对封锁敏感（`skip_on_block`）：快照源存的就是被拦截
//! 前的同一响应，上游挑战页意味着快照大概率也是挑战页。

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::config::Config;
use crate::error::ScrapeError;

use super::{antibot, extract_checked, with_retries, JobScraper};

/// CDX 索引查询端点
const CDX_ENDPOINT: &str = "https://web.archive.org/cdx/search/cdx";

/// Wayback Machine 快照抓取
pub struct WaybackScraper {
    client: reqwest::Client,
    max_retries: u32,
    max_age_days: i64,
    min_text_length: usize,
}

impl WaybackScraper {
    /// 客户端构建失败直接上抛，不降级成无超时客户端
    pub fn new(config: &Config) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.scraper_wayback_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_retries: config.scraper_wayback_max_retries,
            max_age_days: config.scraper_wayback_max_age_days,
            min_text_length: config.scraper_min_text_length,
        })
    }

    /// 查询时间窗口内最新的快照时间戳
    async fn lookup_snapshot(&self, url: &str) -> Result<String, ScrapeError> {
        let from = (Utc::now() - chrono::Duration::days(self.max_age_days))
            .format("%Y%m%d")
            .to_string();
        debug!("查询 CDX 索引: {} (起始 {})", url, from);

        let rows: Vec<Vec<String>> = self
            .client
            .get(CDX_ENDPOINT)
            .query(&[
                ("url", url),
                ("output", "json"),
                ("from", from.as_str()),
                ("filter", "statuscode:200"),
                // 负数 limit 表示取最新的 N 条
                ("limit", "-1"),
            ])
            .send()
            .await?
            .json()
            .await?;

        newest_timestamp(&rows)
            .map(str::to_string)
            .ok_or(ScrapeError::NoSnapshot {
                window_days: self.max_age_days,
            })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, ScrapeError> {
        let timestamp = self.lookup_snapshot(url).await?;
        let snapshot = snapshot_url(&timestamp, url);
        debug!("拉取快照: {}", snapshot);

        let resp = self.client.get(&snapshot).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::BadStatus {
                status: status.as_u16(),
            });
        }
        let html = resp.text().await?;

        // 存档的也可能是当时的挑战页
        if antibot::is_challenge_page(&html) {
            return Err(ScrapeError::Blocked { scraper: "archive" });
        }
        extract_checked(&html, self.min_text_length)
    }
}

#[async_trait]
impl JobScraper for WaybackScraper {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn skip_on_block(&self) -> bool {
        true
    }

    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        with_retries(self.max_retries, || self.fetch_once(url)).await
    }
}

/// 从 CDX 结果行中取最新快照的时间戳
///
/// CDX JSON 的第一行是表头（urlkey, timestamp, original, ...），
/// 数据行按时间升序排列，取最后一行。
fn newest_timestamp(rows: &[Vec<String>]) -> Option<&str> {
    if rows.len() < 2 {
        return None;
    }
    rows.last()?.get(1).map(String::as_str)
}

/// 拼接快照原文 URL（`id_` 后缀 = 不注入存档工具条）
fn snapshot_url(timestamp: &str, url: &str) -> String {
    format!("https://web.archive.org/web/{timestamp}id_/{url}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_newest_timestamp_takes_last_row() {
        let rows = vec![
            row(&["urlkey", "timestamp", "original", "mimetype", "statuscode"]),
            row(&["com,example)/job", "20250701000000", "https://example.com/job", "text/html", "200"]),
            row(&["com,example)/job", "20250810120000", "https://example.com/job", "text/html", "200"]),
        ];
        assert_eq!(newest_timestamp(&rows), Some("20250810120000"));
    }

    #[test]
    fn test_newest_timestamp_header_only_means_no_snapshot() {
        let rows = vec![row(&["urlkey", "timestamp", "original"])];
        assert_eq!(newest_timestamp(&rows), None);
        assert_eq!(newest_timestamp(&[]), None);
    }

    #[test]
    fn test_snapshot_url_uses_raw_mode() {
        assert_eq!(
            snapshot_url("20250810120000", "https://example.com/job"),
            "https://web.archive.org/web/20250810120000id_/https://example.com/job"
        );
    }

    #[test]
    fn test_client_builds_with_defaults() {
        let scraper = WaybackScraper::new(&Config::default()).expect("构建应成功");
        assert_eq!(scraper.max_retries, Config::default().scraper_wayback_max_retries);
    }

    /// 冒烟测试：需要外网连接
    #[tokio::test]
    #[ignore]
    async fn test_wayback_fetch_smoke() {
        let _ = tracing_subscriber::fmt::try_init();

        let mut config = Config::default();
        config.scraper_wayback_max_age_days = 3650;
        config.scraper_min_text_length = 10;
        let scraper = WaybackScraper::new(&config).expect("构建应成功");

        match scraper.fetch("https://example.com/").await {
            Ok(text) => {
                println!("快照正文 {} 字符", text.chars().count());
                assert!(!text.contains('<'));
            }
            Err(ScrapeError::NoSnapshot { .. }) => {
                println!("时间窗口内无快照（可接受）");
            }
            Err(e) => panic!("快照抓取失败: {}", e),
        }
    }
}
