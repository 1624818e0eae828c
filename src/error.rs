//! 错误分类体系
//!
//! 所有错误按来源分类，重试/回退决策基于显式的分类值而不是字符串匹配：
//!
//! - `ScrapeError::Blocked` 是策略级致命错误，协调器据此跳过对封锁敏感的回退策略
//! - `LlmError` 中可通过轮转 API Key 恢复的错误由 `clients::rotating` 内部消化
//! - `ConfigError` 在启动期即为致命错误，不在运行期掩盖

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 抓取相关错误
    #[error("抓取错误: {0}")]
    Scrape(#[from] ScrapeError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 单个抓取策略的一次失败记录
///
/// 聚合失败 (`ScrapeError::AllFailed`) 中按尝试顺序保存，
/// 被跳过的策略不会出现在列表里。
#[derive(Debug, Clone)]
pub struct ScrapeAttempt {
    /// 策略标识（direct / archive / browser）
    pub scraper: String,
    /// 失败原因描述
    pub reason: String,
}

/// 抓取相关错误
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// 检测到反爬挑战页，策略内不再重试
    #[error("检测到反爬挑战页 ({scraper})")]
    Blocked { scraper: &'static str },
    /// 网络请求失败（超时、连接被重置等）
    #[error("请求失败: {0}")]
    Request(#[from] reqwest::Error),
    /// HTTP 状态码错误
    #[error("HTTP 状态错误 (状态码 {status})")]
    BadStatus { status: u16 },
    /// 瞬时错误重试耗尽
    #[error("重试 {attempts} 次后仍然失败: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    /// 快照索引中没有时间窗口内的存档
    #[error("快照索引中没有 {window_days} 天内的存档")]
    NoSnapshot { window_days: i64 },
    /// 提取的正文过短，视为无效页面
    #[error("提取的正文过短 ({len} < {min} 字符)")]
    TooShort { len: usize, min: usize },
    /// 浏览器渲染抓取失败
    #[error("浏览器抓取失败: {0}")]
    Browser(String),
    /// 页面加载超时
    #[error("页面加载超时 ({timeout_ms} ms)")]
    Timeout { timeout_ms: u64 },
    /// 所有策略均已尝试且失败
    #[error("所有抓取策略均失败 ({url}): {}", format_attempts(.attempts))]
    AllFailed {
        url: String,
        attempts: Vec<ScrapeAttempt>,
    },
}

impl ScrapeError {
    /// 是否为反爬封锁信号
    pub fn is_blocked(&self) -> bool {
        matches!(self, ScrapeError::Blocked { .. })
    }

    /// 策略内重试是否无意义
    ///
    /// 封锁页、快照缺失、正文过短都是确定性结果，重复请求不会改变。
    pub fn is_strategy_fatal(&self) -> bool {
        matches!(
            self,
            ScrapeError::Blocked { .. }
                | ScrapeError::NoSnapshot { .. }
                | ScrapeError::TooShort { .. }
        )
    }
}

fn format_attempts(attempts: &[ScrapeAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.scraper, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 单次 API 调用失败（不可通过轮转恢复）
    #[error("LLM API 调用失败 (模型: {model}): {message}")]
    Api { model: String, message: String },
    /// 整个 Key 池轮转一遍后仍然失败
    #[error("所有 API Key 均尝试失败 (共 {tried} 个, 模型: {model})，最后错误: {message}")]
    KeysExhausted {
        model: String,
        tried: usize,
        message: String,
    },
    /// LLM 返回内容为空
    #[error("LLM 返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 无法解析 LLM 返回的 JSON
    #[error("无法解析 LLM 返回的 JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
    /// 嵌入接口网络请求失败
    #[error("嵌入接口请求失败: {0}")]
    Http(#[from] reqwest::Error),
    /// 嵌入接口返回错误状态码
    #[error("嵌入接口返回错误 (状态码 {status}): {body}")]
    BadStatus { status: u16, body: String },
}

/// 配置错误
///
/// 配置错误在启动/测试期暴露，绝不留到运行期。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 过滤器优先级冲突
    #[error("过滤器优先级重复: {priority} ({first} 与 {second})")]
    DuplicateFilterPriority {
        priority: i32,
        first: String,
        second: String,
    },
    /// 过滤器名称冲突
    #[error("过滤器名称重复: {name}")]
    DuplicateFilterName { name: String },
    /// 配置文件读取失败
    #[error("配置文件读取失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 应用程序结果类型
pub type Result<T> = std::result::Result<T, AppError>;
