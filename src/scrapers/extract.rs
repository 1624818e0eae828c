//! HTML 正文提取
//!
//! 职位页面的有效内容通常集中在 `<article>` 或带 job/posting 类名的
//! 容器里，周围是导航、页脚和脚本噪音。提取分两步：
//!
//! 1. 剥掉噪音块（script/style/nav/header/footer/aside）
//! 2. 定位正文容器（标签嵌套平衡扫描），找不到就退回整页
//!
//! 纯文本化（去标签、实体解码、空白归一）由 [`html_to_text`] 完成，
//! 简历 HTML 的回落提取也复用它。

use std::sync::OnceLock;

use regex::Regex;

/// 整块移除的噪音标签
const NOISE_TAGS: [&str; 6] = ["script", "style", "nav", "header", "footer", "aside"];

/// 容器类名/ID 中指向职位正文的线索词
const CONTAINER_HINTS: &str = "job|posting|descri|vacanc|position";

fn regex_of(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("内置正则模式不合法"))
}

fn noise_regexes() -> &'static Vec<Regex> {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        NOISE_TAGS
            .iter()
            .map(|tag| {
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                    .expect("内置正则模式不合法")
            })
            .collect()
    })
}

fn article_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex_of(&RE, r"(?i)<article\b[^>]*>")
}

fn container_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex_of(
        &RE,
        &format!(
            r#"(?is)<(div|section)\b[^>]*\b(?:class|id)\s*=\s*["'][^"']*(?:{CONTAINER_HINTS})[^"']*["'][^>]*>"#
        ),
    )
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex_of(&RE, r"(?s)<[^>]*>")
}

fn block_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex_of(
        &RE,
        r"(?i)<br\s*/?>|</(?:p|div|li|tr|h[1-6]|section|article|ul|ol|table)\s*>",
    )
}

fn numeric_entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex_of(&RE, r"&#(x?[0-9a-fA-F]+);")
}

/// 提取职位页面正文的纯文本
pub fn extract_job_text(html: &str) -> String {
    let mut cleaned = html.to_string();
    for re in noise_regexes() {
        cleaned = re.replace_all(&cleaned, " ").into_owned();
    }
    let container = find_container(&cleaned).unwrap_or(cleaned.as_str());
    html_to_text(container)
}

/// 把任意 HTML 转换为纯文本
///
/// 块级闭合标签转换行，其余标签去除，解码常见实体并归一空白。
pub fn html_to_text(html: &str) -> String {
    let no_scripts = noise_regexes()[0].replace_all(html, " ");
    let no_styles = noise_regexes()[1].replace_all(&no_scripts, " ");
    let with_breaks = block_break_regex().replace_all(&no_styles, "\n");
    let no_tags = tag_regex().replace_all(&with_breaks, " ");
    collapse_whitespace(&decode_entities(&no_tags))
}

/// 定位职位正文容器
///
/// 优先 `<article>`，其次类名/ID 带职位线索词的 div/section。
fn find_container(html: &str) -> Option<&str> {
    let lower = html.to_ascii_lowercase();

    if let Some(m) = article_regex().find(html) {
        if let Some(block) = balanced_block(html, &lower, "article", m.start()) {
            return Some(block);
        }
    }
    if let Some(caps) = container_regex().captures(html) {
        let whole = caps.get(0)?;
        let tag = caps.get(1)?.as_str().to_ascii_lowercase();
        if let Some(block) = balanced_block(html, &lower, &tag, whole.start()) {
            return Some(block);
        }
    }
    None
}

/// 从 `open_start` 处的开标签起，按嵌套深度找到配对的闭标签
///
/// `lower` 必须是 `html` 的 ASCII 小写副本（字节下标一一对应）。
fn balanced_block<'a>(
    html: &'a str,
    lower: &str,
    tag: &str,
    open_start: usize,
) -> Option<&'a str> {
    let open_pat = format!("<{tag}");
    let close_pat = format!("</{tag}");
    let mut depth = 0usize;
    let mut pos = open_start;

    loop {
        let next_open = find_tag_at(lower, &open_pat, pos, &['>', '/']);
        let next_close = find_tag_at(lower, &close_pat, pos, &['>']);
        match (next_open, next_close) {
            (Some(o), Some(c)) if o < c => {
                depth += 1;
                pos = o + open_pat.len();
            }
            (_, Some(c)) => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    let end = lower[c..].find('>').map(|i| c + i + 1)?;
                    return Some(&html[open_start..end]);
                }
                pos = c + close_pat.len();
            }
            _ => return None,
        }
    }
}

/// 在 `from` 之后找下一个以 `pat` 开头且后随合法边界字符的位置
///
/// 边界检查避免 `<div` 误配 `<divider` 这类前缀标签。
fn find_tag_at(lower: &str, pat: &str, from: usize, extra: &[char]) -> Option<usize> {
    let mut pos = from;
    while let Some(i) = lower[pos..].find(pat) {
        let at = pos + i;
        let after = lower[at + pat.len()..].chars().next();
        match after {
            Some(c) if c.is_ascii_whitespace() || extra.contains(&c) => return Some(at),
            None => return None,
            _ => pos = at + pat.len(),
        }
    }
    None
}

fn decode_entities(text: &str) -> String {
    let text = numeric_entity_regex().replace_all(text, |caps: &regex::Captures| {
        let body = &caps[1];
        let parsed = if let Some(hex) = body.strip_prefix('x') {
            u32::from_str_radix(hex, 16)
        } else {
            body.parse::<u32>()
        };
        parsed
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// 空白归一：含换行的空白段折叠为单个换行，其余折叠为单个空格
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending: Option<bool> = None;
    for c in text.chars() {
        if c.is_whitespace() {
            let is_newline = c == '\n' || c == '\r';
            pending = Some(pending.map_or(is_newline, |p| p || is_newline));
        } else {
            if let Some(saw_newline) = pending.take() {
                if !out.is_empty() {
                    out.push(if saw_newline { '\n' } else { ' ' });
                }
            }
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_strips_tags_and_entities() {
        let html = "<p>Rust &amp; Tokio &lt;异步&gt;&nbsp;开发</p>";
        assert_eq!(html_to_text(html), "Rust & Tokio <异步> 开发");
    }

    #[test]
    fn test_html_to_text_decodes_numeric_entities() {
        assert_eq!(html_to_text("A&#65;&#x42;"), "AAB");
    }

    #[test]
    fn test_html_to_text_drops_scripts_and_styles() {
        let html = "<style>body { color: red }</style><p>正文</p><script>alert(1)</script>";
        assert_eq!(html_to_text(html), "正文");
    }

    #[test]
    fn test_html_to_text_block_tags_become_newlines() {
        let html = "<h1>标题</h1><p>第一段</p><p>第二段</p>";
        assert_eq!(html_to_text(html), "标题\n第一段\n第二段");
    }

    #[test]
    fn test_extract_prefers_article() {
        let html = r#"<html><body>
<nav>首页 | 职位 | 关于</nav>
<article><h1>Rust 工程师</h1><p>负责后端服务开发</p></article>
<footer>版权所有</footer>
</body></html>"#;
        let text = extract_job_text(html);
        assert!(text.contains("Rust 工程师"));
        assert!(!text.contains("首页"));
        assert!(!text.contains("版权所有"));
    }

    #[test]
    fn test_extract_finds_job_container_by_class() {
        let html = r#"<body>
<div class="sidebar">推荐职位列表</div>
<div class="job-description"><h2>岗位职责</h2><p>维护抓取服务</p></div>
</body>"#;
        let text = extract_job_text(html);
        assert!(text.contains("岗位职责"));
        assert!(!text.contains("推荐职位列表"));
    }

    #[test]
    fn test_extract_balances_nested_containers() {
        let html = r#"<div id="job-posting"><div><p>内层内容</p></div><p>外层尾部</p></div><p>容器之外</p>"#;
        let text = extract_job_text(html);
        assert!(text.contains("内层内容"));
        assert!(text.contains("外层尾部"));
        assert!(!text.contains("容器之外"));
    }

    #[test]
    fn test_extract_falls_back_to_whole_page() {
        let html = "<body><p>没有任何容器标记的页面</p></body>";
        assert_eq!(extract_job_text(html), "没有任何容器标记的页面");
    }

    #[test]
    fn test_prefix_tag_not_confused() {
        // <divider> 不应被当作 <div> 的嵌套层
        let html = r#"<div class="job"><divider/><p>内容</p></div>"#;
        let text = extract_job_text(html);
        assert!(text.contains("内容"));
    }
}
