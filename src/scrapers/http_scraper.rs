//! 直接 HTTP 抓取策略
//!
//! 带桌面浏览器 UA 的普通 GET 请求。瞬时错误（5xx、网络抖动）
//! 走指数退避重试；挑战页和"正文过短"是确定性结果，立即放弃
//! 交给下一个策略。

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::error::ScrapeError;

use super::{antibot, extract_checked, with_retries, JobScraper};

/// 伪装的桌面浏览器 UA（不带 UA 的请求几乎必被拦截）
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 直接 HTTP 抓取
pub struct HttpScraper {
    client: reqwest::Client,
    max_retries: u32,
    min_text_length: usize,
}

impl HttpScraper {
    /// 客户端构建失败直接上抛：超时与 UA 是本策略的前提，不能静默丢弃
    pub fn new(config: &Config) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.scraper_http_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            max_retries: config.scraper_http_max_retries,
            min_text_length: config.scraper_min_text_length,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, ScrapeError> {
        debug!("GET {}", url);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let html = resp.text().await?;

        // 挑战页经常伴随 403/503，先于状态码检查
        if antibot::is_challenge_page(&html) {
            return Err(ScrapeError::Blocked { scraper: "direct" });
        }
        if !status.is_success() {
            return Err(ScrapeError::BadStatus {
                status: status.as_u16(),
            });
        }
        extract_checked(&html, self.min_text_length)
    }
}

#[async_trait]
impl JobScraper for HttpScraper {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        with_retries(self.max_retries, || self.fetch_once(url)).await
    }
}
