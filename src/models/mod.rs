//! 数据模型
//!
//! 所有模型都是不可变的值对象：校验流程中各过滤器只拿到只读引用或克隆，
//! 不存在跨并发评估的共享可变状态。

use serde::{Deserialize, Serialize};

/// 原始简历（优化器的输入，过滤器用它做事实核对）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeSource {
    /// 简历原文（Markdown 或纯文本）
    pub content: String,
}

/// 职位描述的结构化表示
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobPosting {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl JobPosting {
    /// 拼接用于语义比对的完整职位文本
    pub fn combined_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title,
            self.description,
            self.requirements.join(" ")
        )
    }
}

/// 待校验的候选简历
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedResume {
    /// 渲染用的 HTML 内容
    pub html: String,
    /// 从渲染结果中提取的纯文本；渲染/提取由外部协作方完成，可能缺失
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_text: Option<String>,
}

impl OptimizedResume {
    /// 过滤器实际评估的文本：优先 PDF 提取文本，缺失时回落到 HTML 去标签
    pub fn effective_text(&self) -> Option<String> {
        match &self.pdf_text {
            Some(text) if !text.trim().is_empty() => Some(text.clone()),
            _ => {
                let text = crate::scrapers::extract::html_to_text(&self.html);
                if text.trim().is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
        }
    }
}

/// 单个过滤器的评估结论
///
/// `passed` 是唯一权威字段。`score` 与 `threshold` 仅供参考，二者的比较结果
/// 允许与 `passed` 背离（例如高分但因一票否决条件失败），调用方必须分支在
/// `passed` 上，绝不能用 `score >= threshold` 重新推导。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub filter_name: String,
    pub passed: bool,
    /// 归一化得分，区间 [0, 1]
    pub score: f32,
    pub threshold: f32,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// 全部过滤器的聚合结论
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// 按优先级升序排列的各过滤器结论
    pub results: Vec<FilterResult>,
}

impl ValidationResult {
    /// 全部通过才算通过；空列表视为通过
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// 未通过的过滤器结论
    pub fn failures(&self) -> Vec<&FilterResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }
}
