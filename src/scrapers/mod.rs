//! 抓取策略层
//!
//! ## 职责
//!
//! 以统一的 [`JobScraper`] 接口封装三种获取职位页面的策略：
//!
//! 1. **direct** - 带浏览器 UA 的直接 HTTP 请求（最快，最常被拦）
//! 2. **archive** - Wayback Machine 快照回退（绕过封锁，但可能过期）
//! 3. **browser** - 无头浏览器渲染（最慢，能执行 JS 和过挑战页）
//!
//! 策略的产出是提取后的正文纯文本，不是原始标记：每个策略在内部
//! 完成挑战页检测、正文提取与最小长度校验，下游拿到即可用的文本。
//!
//! [`ScrapeCoordinator`] 按上述顺序依次尝试，拿到首个成功结果即停。
//! 检测到反爬挑战页后，对封锁敏感的策略（快照源存的也是挑战页）直接跳过。

pub mod antibot;
pub mod browser_scraper;
pub mod extract;
pub mod http_scraper;
pub mod wayback_scraper;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ScrapeAttempt, ScrapeError};

pub use browser_scraper::BrowserScraper;
pub use http_scraper::HttpScraper;
pub use wayback_scraper::WaybackScraper;

/// 指数退避基数
const BACKOFF_BASE_MS: u64 = 500;
/// 单次退避上限
const BACKOFF_MAX_MS: u64 = 8_000;

/// 职位页面抓取策略
#[async_trait]
pub trait JobScraper: Send + Sync {
    /// 策略标识（direct / archive / browser）
    fn name(&self) -> &'static str;

    /// 上游被反爬拦截时是否跳过本策略
    ///
    /// 快照源存档的是与直接访问相同的响应，封锁时尝试它没有意义；
    /// 浏览器渲染反而是唯一可能过挑战页的路径。
    fn skip_on_block(&self) -> bool {
        false
    }

    /// 抓取页面，返回提取后的正文纯文本
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError>;
}

/// 策略成功路径的统一出口：提取正文并校验最小长度
///
/// 正文过短通常意味着前端渲染页或空壳页面，按策略级致命处理。
pub(crate) fn extract_checked(html: &str, min_len: usize) -> Result<String, ScrapeError> {
    let text = extract::extract_job_text(html);
    let len = text.chars().count();
    if len < min_len {
        return Err(ScrapeError::TooShort { len, min: min_len });
    }
    Ok(text)
}

/// 抓取协调器：持有按优先级排列的策略列表
pub struct ScrapeCoordinator {
    scrapers: Vec<Box<dyn JobScraper>>,
}

impl ScrapeCoordinator {
    /// 按配置装配策略链
    ///
    /// HTTP 客户端构建失败是装配错误，立即上抛而不是降级成无 UA 客户端。
    pub fn from_config(config: &Config) -> Result<Self, ScrapeError> {
        let mut scrapers: Vec<Box<dyn JobScraper>> = vec![Box::new(HttpScraper::new(config)?)];
        if config.scraper_use_wayback {
            scrapers.push(Box::new(WaybackScraper::new(config)?));
        }
        if config.scraper_use_browser {
            scrapers.push(Box::new(BrowserScraper::new(config)));
        }
        Ok(Self { scrapers })
    }

    pub fn new(scrapers: Vec<Box<dyn JobScraper>>) -> Self {
        Self { scrapers }
    }

    /// 依次尝试各策略，返回首个成功提取的正文文本
    ///
    /// 全部失败时返回 [`ScrapeError::AllFailed`]，其中只记录实际尝试过的
    /// 策略；因封锁被跳过的策略不出现在失败列表里。
    pub async fn scrape(&self, url: &str) -> Result<String, ScrapeError> {
        info!("🔍 开始抓取职位页面: {}", url);

        let mut blocked = false;
        let mut attempts: Vec<ScrapeAttempt> = Vec::new();

        for scraper in &self.scrapers {
            if blocked && scraper.skip_on_block() {
                info!("⏭️ 上游已被拦截，跳过策略 {}", scraper.name());
                continue;
            }
            info!("尝试策略: {}", scraper.name());
            match scraper.fetch(url).await {
                Ok(text) => {
                    info!(
                        "✓ 策略 {} 抓取成功 (正文 {} 字符)",
                        scraper.name(),
                        text.chars().count()
                    );
                    return Ok(text);
                }
                Err(e) => {
                    if e.is_blocked() {
                        blocked = true;
                    }
                    warn!("⚠️ 策略 {} 失败: {}", scraper.name(), e);
                    attempts.push(ScrapeAttempt {
                        scraper: scraper.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(ScrapeError::AllFailed {
            url: url.to_string(),
            attempts,
        })
    }
}

/// 第 `attempt` 次重试前的等待时长（500ms 起指数增长，封顶 8s）
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let ms = BACKOFF_BASE_MS
        .saturating_mul(1u64 << attempt.min(10))
        .min(BACKOFF_MAX_MS);
    Duration::from_millis(ms)
}

/// 带指数退避的策略内重试
///
/// 策略级致命错误（封锁、快照缺失、正文过短）立即终止，不消耗剩余次数。
pub(crate) async fn with_retries<T, F, Fut>(
    max_attempts: u32,
    mut op: F,
) -> Result<T, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let mut last: Option<ScrapeError> = None;
    for attempt in 0..max_attempts.max(1) {
        if attempt > 0 {
            let delay = backoff_delay(attempt - 1);
            debug!("第 {} 次重试，等待 {:?}", attempt, delay);
            tokio::time::sleep(delay).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_strategy_fatal() => return Err(e),
            Err(e) => last = Some(e),
        }
    }
    Err(ScrapeError::RetriesExhausted {
        attempts: max_attempts.max(1),
        last: last.map(|e| e.to_string()).unwrap_or_default(),
    })
}
