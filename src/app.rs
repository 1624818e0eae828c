//! 应用装配与主流程
//!
//! ## 核心流程
//!
//! 1. 抓取职位页面（direct → archive → browser 依次回退）
//! 2. LLM 解析结构化职位信息
//! 3. 读取待校验的简历文件
//! 4. 运行过滤器链，输出校验结论

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::agents::parse_job_posting;
use crate::clients::RotatingLlmClient;
use crate::config::Config;
use crate::filters::FilterSet;
use crate::keys::mask_keys;
use crate::models::{OptimizedResume, ResumeSource, ValidationResult};
use crate::orchestration::run_filters;
use crate::scrapers::ScrapeCoordinator;

/// 应用实例：持有装配好的全部组件
pub struct App {
    config: Arc<Config>,
    llm: Arc<RotatingLlmClient>,
    coordinator: ScrapeCoordinator,
    filters: FilterSet,
}

impl App {
    /// 加载配置并装配组件
    pub fn initialize() -> anyhow::Result<Self> {
        let config = Arc::new(Config::load().context("配置加载失败")?);

        info!("🚀 初始化简历校验服务");
        info!("  对话模型: {}", config.llm_model_name);
        if let Some(base) = &config.llm_api_base_url {
            info!("  API 端点: {}", base);
        }
        if config.llm_api_keys.is_empty() {
            warn!("  API Key 池为空，按本地无凭证服务处理");
        } else {
            info!("  API Key 池: {:?}", mask_keys(&config.llm_api_keys));
        }

        let llm = Arc::new(RotatingLlmClient::new(&config));
        let coordinator = ScrapeCoordinator::from_config(&config)?;
        let filters = FilterSet::build(config.clone(), llm.clone())?;

        Ok(Self {
            config,
            llm,
            coordinator,
            filters,
        })
    }

    /// 对一份简历执行完整校验流程
    pub async fn run(
        &self,
        job_url: &str,
        resume_path: &Path,
    ) -> anyhow::Result<ValidationResult> {
        // ========== 1. 抓取职位页面（产出即正文纯文本） ==========
        let page_text = self.coordinator.scrape(job_url).await?;

        // ========== 2. 解析职位信息 ==========
        info!("📋 解析职位信息");
        let job = parse_job_posting(&self.llm, &page_text).await?;

        // ========== 3. 读取简历 ==========
        let raw = tokio::fs::read_to_string(resume_path)
            .await
            .with_context(|| format!("读取简历文件失败: {}", resume_path.display()))?;
        let resume = Arc::new(OptimizedResume {
            html: raw.clone(),
            pdf_text: None,
        });
        let source = Arc::new(ResumeSource { content: raw });

        // ========== 4. 运行过滤器链 ==========
        info!("🔍 开始校验简历 ({} 个过滤器)", self.filters.filters().len());
        let result = run_filters(&self.filters, &self.config, resume, source, Arc::new(job)).await;

        print_verdict(&result);
        Ok(result)
    }
}

/// 输出校验结论摘要
fn print_verdict(result: &ValidationResult) {
    for r in &result.results {
        let mark = if r.passed { "✓" } else { "❌" };
        info!(
            "{} {} 得分 {:.2} (阈值 {:.2})",
            mark, r.filter_name, r.score, r.threshold
        );
        for issue in &r.issues {
            info!("    - {}", issue);
        }
        for suggestion in &r.suggestions {
            info!("    💡 {}", suggestion);
        }
    }
    if result.passed() {
        info!("📤 校验通过 ({} 项全部通过)", result.results.len());
    } else {
        warn!(
            "❌ 校验未通过 ({}/{} 项失败)",
            result.failures().len(),
            result.results.len()
        );
    }
}
