//! 关键词覆盖率过滤器
//!
//! 检查职位关键词在简历文本中的出现比例。ATS 系统的第一道筛选
//! 就是关键词命中，覆盖率过低的简历大概率直接被机器淘汰。
//! 匹配不区分大小写，纯文本层面做包含判断。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::models::{FilterResult, JobPosting, OptimizedResume, ResumeSource};

use super::Filter;

/// 关键词覆盖率过滤器
pub struct KeywordMatcherFilter {
    config: Arc<Config>,
}

impl KeywordMatcherFilter {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

/// 计算覆盖率，返回 (覆盖率, 缺失关键词)
fn keyword_coverage(text: &str, keywords: &[String]) -> (f32, Vec<String>) {
    if keywords.is_empty() {
        return (1.0, Vec::new());
    }
    let lower = text.to_lowercase();
    let missing: Vec<String> = keywords
        .iter()
        .filter(|kw| !lower.contains(&kw.to_lowercase()))
        .cloned()
        .collect();
    let matched = keywords.len() - missing.len();
    (matched as f32 / keywords.len() as f32, missing)
}

#[async_trait]
impl Filter for KeywordMatcherFilter {
    fn name(&self) -> &'static str {
        "keyword_matcher"
    }

    fn priority(&self) -> i32 {
        3
    }

    fn threshold(&self) -> f32 {
        self.config.filter_keyword_threshold
    }

    async fn evaluate(
        &self,
        resume: &OptimizedResume,
        _source: &ResumeSource,
        job: &JobPosting,
    ) -> anyhow::Result<FilterResult> {
        let text = resume.effective_text().unwrap_or_default();
        let (coverage, missing) = keyword_coverage(&text, &job.keywords);
        debug!(
            "关键词覆盖率: {:.0}% ({}/{} 命中)",
            coverage * 100.0,
            job.keywords.len() - missing.len(),
            job.keywords.len()
        );

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();
        if !missing.is_empty() {
            let shown: Vec<&str> = missing
                .iter()
                .take(self.config.keyword_max_missing_display)
                .map(String::as_str)
                .collect();
            let suffix = if missing.len() > shown.len() {
                format!(" 等 {} 个", missing.len())
            } else {
                String::new()
            };
            issues.push(format!("缺失关键词: {}{}", shown.join(", "), suffix));
            suggestions.push("在真实经历允许的范围内补充缺失的技能关键词".to_string());
        }

        Ok(FilterResult {
            filter_name: self.name().to_string(),
            passed: coverage >= self.threshold(),
            score: coverage,
            threshold: self.threshold(),
            issues,
            suggestions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::fixtures;

    fn filter_with(threshold: f32, max_display: usize) -> KeywordMatcherFilter {
        let mut config = Config::default();
        config.filter_keyword_threshold = threshold;
        config.keyword_max_missing_display = max_display;
        KeywordMatcherFilter::new(Arc::new(config))
    }

    #[test]
    fn test_coverage_case_insensitive() {
        let (coverage, missing) = keyword_coverage(
            "精通 Rust 与 Tokio 异步编程",
            &["rust".to_string(), "TOKIO".to_string(), "kafka".to_string()],
        );
        assert!((coverage - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(missing, vec!["kafka"]);
    }

    #[test]
    fn test_no_keywords_is_vacuous_pass() {
        let (coverage, missing) = keyword_coverage("任意文本", &[]);
        assert_eq!(coverage, 1.0);
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_coverage_above_threshold_passes() {
        let (resume, source, job) = fixtures("熟悉 rust 和 tokio", &["rust", "tokio", "kafka", "redis"]);
        let result = filter_with(0.25, 10)
            .evaluate(&resume, &source, &job)
            .await
            .expect("评估不应出错");
        assert!(result.passed);
        assert_eq!(result.score, 0.5);
        assert!(result.issues[0].contains("kafka"));
    }

    #[tokio::test]
    async fn test_coverage_below_threshold_fails() {
        let (resume, source, job) = fixtures("与职位无关的文本", &["rust", "tokio"]);
        let result = filter_with(0.25, 10)
            .evaluate(&resume, &source, &job)
            .await
            .expect("评估不应出错");
        assert!(!result.passed);
        assert_eq!(result.score, 0.0);
    }

    #[tokio::test]
    async fn test_missing_list_is_capped() {
        let keywords: Vec<&str> = vec!["a1", "b2", "c3", "d4", "e5"];
        let (resume, source, job) = fixtures("无命中", &keywords);
        let result = filter_with(0.25, 2)
            .evaluate(&resume, &source, &job)
            .await
            .expect("评估不应出错");
        assert!(result.issues[0].contains("a1, b2"));
        assert!(result.issues[0].contains("等 5 个"));
        assert!(!result.issues[0].contains("c3"));
    }
}
