//! 语义相似度过滤器
//!
//! 用嵌入向量的余弦相似度衡量简历与职位描述的语义贴合程度，
//! 能发现关键词覆盖之外的"答非所问"。
//!
//! 嵌入服务是可选后端：未配置或调用失败时给出带备注的低置信度
//! 通过，而不是阻断整个校验流程。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::RotatingLlmClient;
use crate::config::Config;
use crate::models::{FilterResult, JobPosting, OptimizedResume, ResumeSource};

use super::Filter;

/// 语义相似度过滤器
pub struct VectorSimilarityFilter {
    config: Arc<Config>,
    llm: Arc<RotatingLlmClient>,
}

impl VectorSimilarityFilter {
    pub fn new(config: Arc<Config>, llm: Arc<RotatingLlmClient>) -> Self {
        Self { config, llm }
    }

    fn degraded_pass(&self, note: String) -> FilterResult {
        FilterResult {
            filter_name: self.name().to_string(),
            passed: true,
            score: self.threshold(),
            threshold: self.threshold(),
            issues: vec![note],
            suggestions: vec![],
        }
    }
}

/// 余弦相似度，零向量时返回 0
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// 把 [-1, 1] 的余弦相似度映射到 [0, 1] 得分
fn similarity_score(similarity: f32) -> f32 {
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[async_trait]
impl Filter for VectorSimilarityFilter {
    fn name(&self) -> &'static str {
        "vector_similarity"
    }

    fn priority(&self) -> i32 {
        6
    }

    fn threshold(&self) -> f32 {
        self.config.filter_vector_threshold
    }

    async fn evaluate(
        &self,
        resume: &OptimizedResume,
        _source: &ResumeSource,
        job: &JobPosting,
    ) -> anyhow::Result<FilterResult> {
        if !self.llm.has_backend() {
            return Ok(self.degraded_pass("未配置嵌入服务，跳过语义相似度检查".to_string()));
        }
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

        let inputs = vec![text, job.combined_text()];
        let embeddings = match self.llm.embed(&inputs).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                // 可选后端故障降级为低置信度通过，不阻断流程
                warn!("⚠️ 嵌入服务调用失败，降级跳过: {}", e);
                return Ok(self.degraded_pass(format!("嵌入服务不可用，结论不含语义相似度: {e}")));
            }
        };
        let [resume_vec, job_vec] = embeddings.as_slice() else {
            warn!("⚠️ 嵌入服务返回向量数量异常: {}", embeddings.len());
            return Ok(self.degraded_pass("嵌入服务返回异常，结论不含语义相似度".to_string()));
        };

        let similarity = cosine_similarity(resume_vec, job_vec);
        let score = similarity_score(similarity);
        debug!("语义相似度: {:.3} (得分 {:.3})", similarity, score);

        let passed = score >= self.threshold();
        Ok(FilterResult {
            filter_name: self.name().to_string(),
            passed,
            score,
            threshold: self.threshold(),
            issues: if passed {
                vec![]
            } else {
                vec![format!("简历与职位描述语义相似度过低 ({score:.2})")]
            },
            suggestions: if passed {
                vec![]
            } else {
                vec!["围绕职位描述的核心职责改写经历部分".to_string()]
            },
        })
    }
}
