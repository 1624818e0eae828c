//! 职位信息解析 Agent
//!
//! 把抓取到的页面纯文本交给 LLM，抽取为结构化的 [`JobPosting`]。
//! LLM 输出经常带 Markdown 代码围栏，解析前先剥掉。

use tracing::{debug, info};

use crate::clients::RotatingLlmClient;
use crate::error::LlmError;
use crate::models::JobPosting;
use crate::utils::{strip_json_fences, truncate_text};

/// 页面文本超过此长度时截断（超长正文里职位信息早已出现）
const MAX_PAGE_TEXT_CHARS: usize = 8_000;

const SYSTEM_PROMPT: &str = "你是一个职位信息抽取助手。只输出 JSON，不要输出任何解释文字。";

/// 从职位页面文本中解析结构化职位信息
pub async fn parse_job_posting(
    llm: &RotatingLlmClient,
    page_text: &str,
) -> Result<JobPosting, LlmError> {
    let page_text = truncate_text(page_text, MAX_PAGE_TEXT_CHARS);
    debug!("解析职位页面，文本长度: {} 字符", page_text.chars().count());

    let prompt = format!(
        r#"从下面的职位页面文本中抽取职位信息，输出严格符合此结构的 JSON：

{{
  "title": "职位名称",
  "company": "公司名称",
  "description": "职位描述摘要",
  "requirements": ["任职要求条目"],
  "keywords": ["简历中应出现的技能关键词"]
}}

页面文本：
{page_text}"#
    );

    let response = llm.chat(&prompt, Some(SYSTEM_PROMPT)).await?;
    let posting: JobPosting = serde_json::from_str(strip_json_fences(&response))?;

    info!(
        "✓ 职位解析完成: {} @ {} ({} 个关键词)",
        posting.title,
        posting.company,
        posting.keywords.len()
    );
    Ok(posting)
}
