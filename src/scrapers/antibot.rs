//! 反爬挑战页识别
//!
//! 挑战页（Cloudflare 等）会以 200 或 403 返回一个"正常"的 HTML，
//! 内容却是人机验证脚本。把它当正文处理会污染下游解析，
//! 必须在抓取层识别并立即换用浏览器渲染策略。

/// 挑战页特征串，全部小写
///
/// 前几条是 Cloudflare 的固定标记，后几条覆盖常见的通用验证页文案。
const CHALLENGE_SIGNATURES: [&str; 9] = [
    "just a moment...",
    "checking your browser",
    "cf-browser-verification",
    "_cf_chl_opt",
    "/cdn-cgi/challenge-platform",
    "attention required! | cloudflare",
    "challenge-error-text",
    "ddos protection by",
    "verify you are human",
];

/// 判断 HTML 是否为反爬挑战页
pub fn is_challenge_page(html: &str) -> bool {
    let lower = html.to_ascii_lowercase();
    CHALLENGE_SIGNATURES.iter().any(|sig| lower.contains(sig))
}
