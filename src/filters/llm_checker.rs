//! LLM 综合评审过滤器
//!
//! 把原始简历、优化后简历与职位信息一起交给 LLM，从四个维度打分：
//!
//! - 真实性（优化稿没有编造原始简历中不存在的经历）
//! - 相关性（内容与职位要求对口）
//! - 完整性（关键信息没有在优化中丢失）
//! - ATS 友好度（结构与措辞适合机器筛选）
//!
//! 加权总分过线即通过，但"编造经历"是一票否决：即便总分再高，
//! `disqualified` 为真就直接失败。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::clients::RotatingLlmClient;
use crate::config::Config;
use crate::models::{FilterResult, JobPosting, OptimizedResume, ResumeSource};
use crate::utils::{strip_json_fences, truncate_text};

use super::Filter;

/// 各维度权重：真实性 / 相关性 / 完整性 / ATS
const WEIGHT_AUTHENTICITY: f32 = 0.25;
const WEIGHT_RELEVANCE: f32 = 0.30;
const WEIGHT_COMPLETENESS: f32 = 0.15;
const WEIGHT_ATS: f32 = 0.30;

/// 送入提示词的单段文本上限
const MAX_SECTION_CHARS: usize = 4_000;

const SYSTEM_PROMPT: &str = "你是一个严格的简历评审专家。只输出 JSON，不要输出任何解释文字。";

/// LLM 返回的评审结论
#[derive(Debug, Deserialize)]
pub(crate) struct CombinedReview {
    #[serde(default)]
    pub authenticity_score: f32,
    #[serde(default)]
    pub relevance_score: f32,
    #[serde(default)]
    pub completeness_score: f32,
    #[serde(default)]
    pub ats_score: f32,
    /// 发现编造经历等一票否决问题
    #[serde(default)]
    pub disqualified: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// 兼容 0-100 打分的模型：大于 1 的分数按百分制归一
fn normalize_score(score: f32) -> f32 {
    let score = if score > 1.0 { score / 100.0 } else { score };
    score.clamp(0.0, 1.0)
}

fn weighted_score(review: &CombinedReview) -> f32 {
    normalize_score(review.authenticity_score) * WEIGHT_AUTHENTICITY
        + normalize_score(review.relevance_score) * WEIGHT_RELEVANCE
        + normalize_score(review.completeness_score) * WEIGHT_COMPLETENESS
        + normalize_score(review.ats_score) * WEIGHT_ATS
}

/// 从评审结论生成过滤器结论
///
/// `passed` 在此处与 `score >= threshold` 解耦：一票否决时高分也失败。
pub(crate) fn verdict_from_review(
    name: &str,
    review: CombinedReview,
    threshold: f32,
) -> FilterResult {
    let score = weighted_score(&review);
    let mut issues = review.issues;
    if review.disqualified {
        issues.push("评审判定存在编造内容，一票否决".to_string());
    }
    FilterResult {
        filter_name: name.to_string(),
        passed: !review.disqualified && score >= threshold,
        score,
        threshold,
        issues,
        suggestions: review.suggestions,
    }
}

/// LLM 综合评审过滤器
pub struct LlmCheckerFilter {
    config: Arc<Config>,
    llm: Arc<RotatingLlmClient>,
}

impl LlmCheckerFilter {
    pub fn new(config: Arc<Config>, llm: Arc<RotatingLlmClient>) -> Self {
        Self { config, llm }
    }

    fn build_prompt(
        &self,
        resume_text: &str,
        source: &ResumeSource,
        job: &JobPosting,
    ) -> String {
        format!(
            r#"对比评审下面的简历，输出严格符合此结构的 JSON（分数为 0 到 1 的小数）：

{{
  "authenticity_score": 0.0,
  "relevance_score": 0.0,
  "completeness_score": 0.0,
  "ats_score": 0.0,
  "disqualified": false,
  "issues": ["发现的问题"],
  "suggestions": ["改进建议"]
}}

评分标准：
- authenticity_score：优化稿相对原始简历的真实性；发现编造的经历、技能或头衔时把 disqualified 置为 true
- relevance_score：与职位要求的匹配程度
- completeness_score：原始简历关键信息的保留程度
- ats_score：结构与措辞对机器筛选的友好程度

【职位信息】
{} @ {}
{}
要求: {}

【原始简历】
{}

【优化后简历】
{}"#,
            job.title,
            job.company,
            truncate_text(&job.description, MAX_SECTION_CHARS),
            job.requirements.join("; "),
            truncate_text(&source.content, MAX_SECTION_CHARS),
            truncate_text(resume_text, MAX_SECTION_CHARS),
        )
    }
}

#[async_trait]
impl Filter for LlmCheckerFilter {
    fn name(&self) -> &'static str {
        "llm_checker"
    }

    fn priority(&self) -> i32 {
        5
    }

    fn threshold(&self) -> f32 {
        self.config.filter_llm_threshold
    }

    async fn evaluate(
        &self,
        resume: &OptimizedResume,
        source: &ResumeSource,
        job: &JobPosting,
    ) -> anyhow::Result<FilterResult> {
        let Some(text) = resume.effective_text() else {
            return Ok(FilterResult {
                filter_name: self.name().to_string(),
                passed: false,
                score: 0.0,
                threshold: self.threshold(),
                issues: vec!["无法从简历中提取文本内容".to_string()],
                suggestions: vec![],
            });
        };

        let prompt = self.build_prompt(&text, source, job);
        let response = self.llm.chat(&prompt, Some(SYSTEM_PROMPT)).await?;
        let review: CombinedReview = serde_json::from_str(strip_json_fences(&response))?;
        debug!(
            "评审分数: 真实性 {:.2} / 相关性 {:.2} / 完整性 {:.2} / ATS {:.2}",
            review.authenticity_score,
            review.relevance_score,
            review.completeness_score,
            review.ats_score
        );

        Ok(verdict_from_review(self.name(), review, self.threshold()))
    }
}
