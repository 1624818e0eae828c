//! 无头浏览器抓取策略
//!
//! 最后的兜底：启动无头 Chrome 真实渲染页面，能执行前端 JS、
//! 通过多数反爬挑战。代价是慢（秒级）且依赖本机 Chromium，
//! 所以整个流程包一层总超时。

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tracing::debug;

use crate::config::Config;
use crate::error::ScrapeError;

use super::{antibot, extract_checked, with_retries, JobScraper};

/// 导航完成后等待前端渲染落定的时长
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// 无头浏览器抓取
pub struct BrowserScraper {
    max_retries: u32,
    timeout_ms: u64,
    min_text_length: usize,
}

impl BrowserScraper {
    pub fn new(config: &Config) -> Self {
        Self {
            max_retries: config.scraper_browser_max_retries,
            timeout_ms: config.scraper_browser_timeout_ms,
            min_text_length: config.scraper_min_text_length,
        }
    }

    async fn render(&self, url: &str) -> Result<String, ScrapeError> {
        let config = BrowserConfig::builder()
            .new_headless_mode()
            .args(vec![
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--remote-debugging-port=0",
            ])
            .build()
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        debug!("启动无头浏览器");
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        // 事件处理循环必须持续消费，否则 CDP 连接会阻塞
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = async {
            let page = browser
                .new_page(url)
                .await
                .map_err(|e| ScrapeError::Browser(e.to_string()))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| ScrapeError::Browser(e.to_string()))?;
            tokio::time::sleep(SETTLE_DELAY).await;
            page.content()
                .await
                .map_err(|e| ScrapeError::Browser(e.to_string()))
        }
        .await;

        let _ = browser.close().await;
        handler_task.abort();

        let html = result?;
        if antibot::is_challenge_page(&html) {
            return Err(ScrapeError::Blocked { scraper: "browser" });
        }
        extract_checked(&html, self.min_text_length)
    }

    /// 单次带总超时的渲染尝试
    async fn render_once(&self, url: &str) -> Result<String, ScrapeError> {
        tokio::time::timeout(Duration::from_millis(self.timeout_ms), self.render(url))
            .await
            .map_err(|_| ScrapeError::Timeout {
                timeout_ms: self.timeout_ms,
            })?
    }
}

#[async_trait]
impl JobScraper for BrowserScraper {
    fn name(&self) -> &'static str {
        "browser"
    }

    // 浏览器启动偶发失败（端口占用、进程崩溃），同样走策略内重试
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        with_retries(self.max_retries, || self.render_once(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 冒烟测试：需要本机安装 Chromium/Chrome 且有外网连接
    ///
    /// 运行方式：
    /// ```bash
    /// cargo test test_browser_fetch_smoke -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_browser_fetch_smoke() {
        let _ = tracing_subscriber::fmt::try_init();

        let mut config = Config::default();
        config.scraper_min_text_length = 10;
        let scraper = BrowserScraper::new(&config);

        let text = scraper
            .fetch("https://example.com/")
            .await
            .expect("浏览器抓取应成功");
        println!("渲染正文 {} 字符", text.chars().count());
        assert!(text.contains("Example Domain"));
        assert!(!text.contains('<'));
    }
}
