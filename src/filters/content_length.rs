//! 长度约束过滤器（门控）
//!
//! 优化后的简历必须能排进一页：字符数与词数都有硬上限。
//! 这是最便宜的检查，作为门控过滤器最先执行，超限时直接
//! 终止后续（昂贵的）评估。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::models::{FilterResult, JobPosting, OptimizedResume, ResumeSource};

use super::Filter;

/// 长度约束过滤器
pub struct ContentLengthFilter {
    config: Arc<Config>,
}

impl ContentLengthFilter {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Filter for ContentLengthFilter {
    fn name(&self) -> &'static str {
        "content_length"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn threshold(&self) -> f32 {
        1.0
    }

    async fn evaluate(
        &self,
        resume: &OptimizedResume,
        _source: &ResumeSource,
        _job: &JobPosting,
    ) -> anyhow::Result<FilterResult> {
        let Some(text) = resume.effective_text() else {
            // 拿不到可评估文本：必须失败而不是跳过
            return Ok(FilterResult {
                filter_name: self.name().to_string(),
                passed: false,
                score: 0.0,
                threshold: self.threshold(),
                issues: vec!["无法从简历中提取文本内容".to_string()],
                suggestions: vec!["检查简历文件是否为有效的 HTML/文本".to_string()],
            });
        };

        let max_chars = self.config.resume_max_chars;
        let max_words = self.config.resume_max_words;
        let chars = text.chars().count();
        let words = text.split_whitespace().count();
        debug!("简历长度: {} 字符 / {} 词 (上限 {} / {})", chars, words, max_chars, max_words);

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();
        if chars > max_chars {
            issues.push(format!("字符数超限: {chars} > {max_chars}"));
            suggestions.push("精简经历描述，删去与职位无关的内容".to_string());
        }
        if words > max_words {
            issues.push(format!("词数超限: {words} > {max_words}"));
            suggestions.push("合并重复表述，控制在一页以内".to_string());
        }

        // 得分取两个维度中更差的占用率
        let char_ratio = (max_chars as f32 / chars.max(1) as f32).min(1.0);
        let word_ratio = (max_words as f32 / words.max(1) as f32).min(1.0);

        Ok(FilterResult {
            filter_name: self.name().to_string(),
            passed: issues.is_empty(),
            score: char_ratio.min(word_ratio),
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

    fn filter_with(max_chars: usize, max_words: usize) -> ContentLengthFilter {
        let mut config = Config::default();
        config.resume_max_chars = max_chars;
        config.resume_max_words = max_words;
        ContentLengthFilter::new(Arc::new(config))
    }

    #[tokio::test]
    async fn test_within_limits_passes() {
        let (resume, source, job) = fixtures("rust tokio backend engineer", &[]);
        let result = filter_with(100, 10)
            .evaluate(&resume, &source, &job)
            .await
            .expect("评估不应出错");
        assert!(result.passed);
        assert_eq!(result.score, 1.0);
        assert!(result.issues.is_empty());
    }

    #[tokio::test]
    async fn test_too_many_chars_fails() {
        let (resume, source, job) = fixtures("这是一段明显超过限制的简历文本", &[]);
        let result = filter_with(5, 100)
            .evaluate(&resume, &source, &job)
            .await
            .expect("评估不应出错");
        assert!(!result.passed);
        assert!(result.score < 1.0);
        assert!(result.issues[0].contains("字符数超限"));
    }

    #[tokio::test]
    async fn test_too_many_words_fails() {
        let (resume, source, job) = fixtures("one two three four five six", &[]);
        let result = filter_with(1000, 3)
            .evaluate(&resume, &source, &job)
            .await
            .expect("评估不应出错");
        assert!(!result.passed);
        assert!(result.issues[0].contains("词数超限"));
    }

    #[tokio::test]
    async fn test_missing_text_fails_not_skips() {
        let (_, source, job) = fixtures("x", &[]);
        let resume = OptimizedResume {
            html: String::new(),
            pdf_text: None,
        };
        let result = filter_with(1000, 100)
            .evaluate(&resume, &source, &job)
            .await
            .expect("评估不应出错");
        assert!(!result.passed);
        assert_eq!(result.score, 0.0);
        assert!(!result.issues.is_empty());
    }
}
