//! 程序配置
//!
//! 配置在启动时构建一次，之后以 `Arc<Config>` 只读传入各组件。
//! 加载顺序：内置默认值 → `config.toml`（如果存在）→ 环境变量覆盖。
//! API Key 池额外走 [`crate::keys::load_api_keys`] 的多来源合并逻辑。

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::keys;

/// 默认配置文件路径
const CONFIG_FILE: &str = "config.toml";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    /// API Key 池（有序，去重）
    pub llm_api_keys: Vec<String>,
    /// OpenAI 兼容服务的基础 URL，留空使用官方端点
    pub llm_api_base_url: Option<String>,
    /// 对话模型
    pub llm_model_name: String,
    /// 嵌入模型
    pub embedding_model_name: String,

    // --- 抓取配置 ---
    /// 直接抓取的请求超时（秒）
    pub scraper_http_timeout_secs: u64,
    /// 直接抓取的最大尝试次数
    pub scraper_http_max_retries: u32,
    /// 快照抓取的请求超时（秒）
    pub scraper_wayback_timeout_secs: u64,
    /// 快照抓取的最大尝试次数
    pub scraper_wayback_max_retries: u32,
    /// 快照的最大可接受年龄（天）
    pub scraper_wayback_max_age_days: i64,
    /// 浏览器渲染抓取的总超时（毫秒）
    pub scraper_browser_timeout_ms: u64,
    /// 浏览器渲染抓取的最大尝试次数
    pub scraper_browser_max_retries: u32,
    /// 正文最小长度，低于此值视为无效页面
    pub scraper_min_text_length: usize,
    /// 是否启用快照回退
    pub scraper_use_wayback: bool,
    /// 是否启用浏览器渲染回退
    pub scraper_use_browser: bool,

    // --- 过滤器配置 ---
    /// 关键词覆盖率阈值
    pub filter_keyword_threshold: f32,
    /// LLM 综合评审阈值
    pub filter_llm_threshold: f32,
    /// 向量相似度阈值
    pub filter_vector_threshold: f32,
    /// 门控优先级：低于此值的过滤器串行执行并在失败时快速终止
    pub filter_gate_priority: i32,
    /// 并发过滤器的总超时（秒），0 表示不限时
    pub filter_timeout_secs: u64,
    /// 非门控过滤器是否并发执行
    pub parallel_filters: bool,
    /// 缺失关键词最多展示几个
    pub keyword_max_missing_display: usize,

    // --- 简历长度限制 ---
    pub resume_max_chars: usize,
    pub resume_max_words: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_keys: Vec::new(),
            llm_api_base_url: None,
            llm_model_name: "gpt-4o".to_string(),
            embedding_model_name: "text-embedding-3-small".to_string(),
            scraper_http_timeout_secs: 15,
            scraper_http_max_retries: 3,
            scraper_wayback_timeout_secs: 10,
            scraper_wayback_max_retries: 2,
            scraper_wayback_max_age_days: 30,
            scraper_browser_timeout_ms: 30_000,
            scraper_browser_max_retries: 1,
            scraper_min_text_length: 200,
            scraper_use_wayback: true,
            scraper_use_browser: true,
            filter_keyword_threshold: 0.25,
            filter_llm_threshold: 0.7,
            filter_vector_threshold: 0.7,
            filter_gate_priority: 1,
            filter_timeout_secs: 0,
            parallel_filters: true,
            keyword_max_missing_display: 10,
            resume_max_chars: 4500,
            resume_max_words: 520,
        }
    }
}

impl Config {
    /// 加载完整配置：默认值 → config.toml → 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if Path::new(CONFIG_FILE).exists() {
            let raw = std::fs::read_to_string(CONFIG_FILE).map_err(|e| ConfigError::ReadFailed {
                path: CONFIG_FILE.to_string(),
                source: e,
            })?;
            Self::from_toml_str(&raw, CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// 从 TOML 文本解析配置（缺省字段回落到默认值）
    pub fn from_toml_str(raw: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::TomlParse {
            path: path.to_string(),
            source: e,
        })
    }

    /// 用环境变量覆盖配置
    ///
    /// 解析失败的值静默回落到现有值，环境变量只做覆盖不做校验。
    pub fn apply_env(&mut self) {
        let env = keys::env_snapshot();
        let env_keys = keys::load_api_keys(&env);
        if !env_keys.is_empty() {
            self.llm_api_keys = env_keys;
        }

        if let Ok(v) = std::env::var("LLM_API_BASE_URL") {
            if !v.is_empty() {
                self.llm_api_base_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("LLM_MODEL_NAME") {
            self.llm_model_name = v;
        }
        if let Ok(v) = std::env::var("EMBEDDING_MODEL_NAME") {
            self.embedding_model_name = v;
        }

        self.scraper_http_timeout_secs = env_parse("SCRAPER_HTTP_TIMEOUT_SECS", self.scraper_http_timeout_secs);
        self.scraper_http_max_retries = env_parse("SCRAPER_HTTP_MAX_RETRIES", self.scraper_http_max_retries);
        self.scraper_wayback_timeout_secs = env_parse("SCRAPER_WAYBACK_TIMEOUT_SECS", self.scraper_wayback_timeout_secs);
        self.scraper_wayback_max_retries = env_parse("SCRAPER_WAYBACK_MAX_RETRIES", self.scraper_wayback_max_retries);
        self.scraper_wayback_max_age_days = env_parse("SCRAPER_WAYBACK_MAX_AGE_DAYS", self.scraper_wayback_max_age_days);
        self.scraper_browser_timeout_ms = env_parse("SCRAPER_BROWSER_TIMEOUT_MS", self.scraper_browser_timeout_ms);
        self.scraper_browser_max_retries = env_parse("SCRAPER_BROWSER_MAX_RETRIES", self.scraper_browser_max_retries);
        self.scraper_min_text_length = env_parse("SCRAPER_MIN_TEXT_LENGTH", self.scraper_min_text_length);
        self.scraper_use_wayback = env_parse("SCRAPER_USE_WAYBACK", self.scraper_use_wayback);
        self.scraper_use_browser = env_parse("SCRAPER_USE_BROWSER", self.scraper_use_browser);

        self.filter_keyword_threshold = env_parse("FILTER_KEYWORD_THRESHOLD", self.filter_keyword_threshold);
        self.filter_llm_threshold = env_parse("FILTER_LLM_THRESHOLD", self.filter_llm_threshold);
        self.filter_vector_threshold = env_parse("FILTER_VECTOR_THRESHOLD", self.filter_vector_threshold);
        self.filter_gate_priority = env_parse("FILTER_GATE_PRIORITY", self.filter_gate_priority);
        self.filter_timeout_secs = env_parse("FILTER_TIMEOUT_SECS", self.filter_timeout_secs);
        self.parallel_filters = env_parse("PARALLEL_FILTERS", self.parallel_filters);
        self.keyword_max_missing_display = env_parse("KEYWORD_MAX_MISSING_DISPLAY", self.keyword_max_missing_display);

        self.resume_max_chars = env_parse("RESUME_MAX_CHARS", self.resume_max_chars);
        self.resume_max_words = env_parse("RESUME_MAX_WORDS", self.resume_max_words);
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.scraper_http_max_retries, 3);
        // 每个抓取策略都有自己的重试上限
        assert_eq!(config.scraper_wayback_max_retries, 2);
        assert_eq!(config.scraper_browser_max_retries, 1);
        assert_eq!(config.scraper_min_text_length, 200);
        assert_eq!(config.filter_gate_priority, 1);
        assert!(config.parallel_filters);
        assert!(config.llm_api_keys.is_empty());
    }

    #[test]
    fn test_from_toml_str_partial_overlay() {
        let raw = r#"
llm_model_name = "qwen2.5:14b"
llm_api_base_url = "http://localhost:11434/v1"
scraper_min_text_length = 300
scraper_use_browser = false
"#;
        let config = Config::from_toml_str(raw, "config.toml").expect("解析应成功");
        assert_eq!(config.llm_model_name, "qwen2.5:14b");
        assert_eq!(config.scraper_min_text_length, 300);
        assert!(!config.scraper_use_browser);
        // 未出现的字段保持默认值
        assert_eq!(config.scraper_http_max_retries, 3);
        assert_eq!(config.filter_keyword_threshold, 0.25);
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let err = Config::from_toml_str("scraper_min_text_length = \"abc\"", "config.toml");
        assert!(err.is_err());
    }
}
