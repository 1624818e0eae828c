//! 简历校验过滤器
//!
//! ## 职责
//!
//! 每个过滤器从一个维度评估优化后的简历：
//!
//! | 过滤器            | 优先级 | 维度                         |
//! |-------------------|--------|------------------------------|
//! | content_length    | 0      | 长度约束（门控，快速失败）   |
//! | keyword_matcher   | 3      | 职位关键词覆盖率             |
//! | llm_checker       | 5      | LLM 综合评审（真实性/相关性）|
//! | vector_similarity | 6      | 语义相似度                   |
//!
//! 优先级同时决定执行顺序与结果排序；低于门控线的过滤器串行执行，
//! 失败立即终止。调度逻辑见 [`crate::orchestration`]。

pub mod content_length;
pub mod keyword_matcher;
pub mod llm_checker;
pub mod vector_similarity;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::RotatingLlmClient;
use crate::config::Config;
use crate::error::ConfigError;
use crate::models::{FilterResult, JobPosting, OptimizedResume, ResumeSource};

pub use content_length::ContentLengthFilter;
pub use keyword_matcher::KeywordMatcherFilter;
pub use llm_checker::LlmCheckerFilter;
pub use vector_similarity::VectorSimilarityFilter;

/// 简历校验过滤器
///
/// `evaluate` 返回 `Err` 表示过滤器自身故障（网络、解析等），
/// 由调度层转换为失败结论；业务上的"不通过"用 `passed: false` 表达。
#[async_trait]
pub trait Filter: Send + Sync {
    /// 过滤器标识，用于结果展示与冲突检查
    fn name(&self) -> &'static str;

    /// 优先级，越小越先执行；同一 [`FilterSet`] 内不允许重复
    fn priority(&self) -> i32;

    /// 通过阈值，仅供展示（通过与否以 `passed` 为准）
    fn threshold(&self) -> f32;

    async fn evaluate(
        &self,
        resume: &OptimizedResume,
        source: &ResumeSource,
        job: &JobPosting,
    ) -> anyhow::Result<FilterResult>;
}

/// 按优先级排序的过滤器集合
pub struct FilterSet {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterSet {
    /// 装配标准过滤器链
    pub fn build(config: Arc<Config>, llm: Arc<RotatingLlmClient>) -> Result<Self, ConfigError> {
        Self::from_filters(vec![
            Arc::new(ContentLengthFilter::new(config.clone())),
            Arc::new(KeywordMatcherFilter::new(config.clone())),
            Arc::new(LlmCheckerFilter::new(config.clone(), llm.clone())),
            Arc::new(VectorSimilarityFilter::new(config, llm)),
        ])
    }

    /// 校验名称/优先级唯一后按优先级排序
    ///
    /// 冲突是装配错误，启动期即失败。
    pub fn from_filters(mut filters: Vec<Arc<dyn Filter>>) -> Result<Self, ConfigError> {
        let mut by_priority: HashMap<i32, &'static str> = HashMap::new();
        let mut names: HashSet<&'static str> = HashSet::new();
        for filter in &filters {
            if let Some(first) = by_priority.insert(filter.priority(), filter.name()) {
                return Err(ConfigError::DuplicateFilterPriority {
                    priority: filter.priority(),
                    first: first.to_string(),
                    second: filter.name().to_string(),
                });
            }
            if !names.insert(filter.name()) {
                return Err(ConfigError::DuplicateFilterName {
                    name: filter.name().to_string(),
                });
            }
        }
        filters.sort_by_key(|f| f.priority());
        Ok(Self { filters })
    }

    /// 按优先级升序排列的过滤器
    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// 构造测试用简历/职位三元组
    pub fn fixtures(resume_text: &str, keywords: &[&str]) -> (OptimizedResume, ResumeSource, JobPosting) {
        let resume = OptimizedResume {
            html: format!("<div>{resume_text}</div>"),
            pdf_text: Some(resume_text.to_string()),
        };
        let source = ResumeSource {
            content: resume_text.to_string(),
        };
        let job = JobPosting {
            title: "Rust 工程师".to_string(),
            company: "示例科技".to_string(),
            description: "负责后端服务开发".to_string(),
            requirements: vec!["三年以上后端经验".to_string()],
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
        };
        (resume, source, job)
    }
}
