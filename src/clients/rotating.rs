//! 轮转 LLM 客户端 - 基础设施层
//!
//! ## 职责
//!
//! 把一次逻辑上的 LLM 调用变成对整个 API Key 池的顺序尝试：
//!
//! 1. 每次逻辑调用从轮转计数器取一个起始 Key（调用间公平轮转）
//! 2. 单次调用内按旋转顺序逐个尝试，**严格串行**，前一个凭证明确失败后
//!    才尝试下一个（并发尝试会在部分成功的服务端产生重复计费/副作用）
//! 3. 只有分类为"换 Key 可能解决"的错误（认证、限流、欠费）才触发轮转；
//!    请求本身非法（其他 4xx）立即上抛，不浪费剩余凭证
//! 4. 全部耗尽后上抛最后一个可轮转错误
//!
//! 流式调用的轮转只发生在首个数据块之前：一旦有内容落到消费者手里，
//! 中途的错误直接传递（此时换 Key 重来会产生重复输出）。
//! 值得轮转的错误（认证/配额/计费）总是在首字节前出现。

use std::future::Future;
use std::pin::Pin;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionStreamResponse,
};
use async_openai::Client;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::LlmError;
use crate::keys::{self, KeyRotation};

/// OpenAI 官方端点（未配置 base_url 时嵌入接口使用）
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// 错误体中明确指向凭证问题的 code / type 值
const ROTATABLE_CODES: [&str; 5] = [
    "billing_not_active",
    "insufficient_quota",
    "rate_limit_exceeded",
    "invalid_api_key",
    "account_deactivated",
];

/// 单次尝试错误的分类结果
///
/// 轮转循环只在这个分类值上分支，不做异常类型匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorClass {
    /// 换一个凭证可能解决（认证失败、限流、欠费）
    RotateKey,
    /// 换凭证无济于事，立即上抛
    Fatal,
}

/// 轮转循环的失败结果
#[derive(Debug)]
pub(crate) enum RotationError<E> {
    /// 某次尝试出现不可轮转错误
    Fatal(E),
    /// 所有凭证尝试完仍未成功，携带最后一个可轮转错误
    Exhausted { tried: usize, last: E },
}

/// 按凭证顺序执行操作，直到成功或耗尽
///
/// `ordered_keys` 必须非空（[`keys::rotated`] 对空池也会产出一个 `None` 成员）。
pub(crate) async fn run_with_rotation<T, E, F, Fut, C>(
    ordered_keys: Vec<Option<String>>,
    op: F,
    classify: C,
) -> Result<T, RotationError<E>>
where
    E: std::fmt::Display,
    F: Fn(Option<String>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> ErrorClass,
{
    let tried = ordered_keys.len();
    let mut last_err: Option<E> = None;

    for key in ordered_keys {
        let masked = key
            .as_deref()
            .map(keys::mask_key)
            .unwrap_or_else(|| "<无凭证>".to_string());
        match op(key).await {
            Ok(value) => return Ok(value),
            Err(e) => match classify(&e) {
                ErrorClass::RotateKey => {
                    warn!("⚠️ 凭证 {} 调用失败，轮转到下一个: {}", masked, e);
                    last_err = Some(e);
                }
                ErrorClass::Fatal => return Err(RotationError::Fatal(e)),
            },
        }
    }

    match last_err {
        Some(last) => Err(RotationError::Exhausted { tried, last }),
        None => unreachable!("轮转凭证列表不能为空"),
    }
}

/// 对话 API 错误分类
pub(crate) fn classify_openai_error(err: &OpenAIError) -> ErrorClass {
    if let OpenAIError::ApiError(api) = err {
        if let Some(t) = api.r#type.as_deref() {
            if ROTATABLE_CODES.contains(&t) {
                return ErrorClass::RotateKey;
            }
        }
        // 部分服务把错误码放在 code 字段；字符串或数字形态统一按文本比对
        if let Some(code) = api.code.as_ref().map(|c| c.to_string()) {
            if ROTATABLE_CODES.contains(&code.trim_matches('"')) {
                return ErrorClass::RotateKey;
            }
        }
        if message_suggests_bad_key(&api.message) {
            return ErrorClass::RotateKey;
        }
        // 明确的请求错误：轮转无济于事
        return ErrorClass::Fatal;
    }

    // 传输层错误：状态码体现在错误文本里
    let text = err.to_string().to_lowercase();
    if text.contains("401")
        || text.contains("403")
        || text.contains("429")
        || text.contains("unauthorized")
        || text.contains("too many requests")
    {
        return ErrorClass::RotateKey;
    }
    ErrorClass::Fatal
}

/// 嵌入接口错误分类（状态码 + 错误体）
pub(crate) fn classify_embed_error(err: &LlmError) -> ErrorClass {
    let LlmError::BadStatus { status, body } = err else {
        return ErrorClass::Fatal;
    };
    if matches!(status, 401 | 403 | 429) {
        return ErrorClass::RotateKey;
    }

    // 部分服务在 400 里携带配额/计费错误码
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let error = value.get("error").unwrap_or(&value);
        for field in ["code", "type"] {
            if let Some(code) = error.get(field).and_then(|v| v.as_str()) {
                if ROTATABLE_CODES.contains(&code) {
                    return ErrorClass::RotateKey;
                }
            }
        }
        if let Some(message) = error.get("message").and_then(|v| v.as_str()) {
            if message_suggests_bad_key(message) {
                return ErrorClass::RotateKey;
            }
        }
    }
    ErrorClass::Fatal
}

fn message_suggests_bad_key(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("billing")
        || msg.contains("quota")
        || msg.contains("rate limit")
        || msg.contains("api key")
}

/// 轮转 LLM 客户端
///
/// 对外表现为一个普通的 OpenAI 兼容客户端，调用方感知不到轮转的存在。
pub struct RotatingLlmClient {
    api_keys: Vec<String>,
    base_url: Option<String>,
    model_name: String,
    embedding_model: String,
    rotation: KeyRotation,
    http: reqwest::Client,
}

impl RotatingLlmClient {
    /// 从配置创建客户端
    pub fn new(config: &Config) -> Self {
        Self {
            api_keys: config.llm_api_keys.clone(),
            base_url: config.llm_api_base_url.clone(),
            model_name: config.llm_model_name.clone(),
            embedding_model: config.embedding_model_name.clone(),
            rotation: KeyRotation::new(),
            http: reqwest::Client::new(),
        }
    }

    /// 池中凭证数量（0 表示走"无凭证"模式）
    pub fn pool_size(&self) -> usize {
        self.api_keys.len()
    }

    /// 是否配置了可用的后端（有凭证，或指向本地兼容服务）
    pub fn has_backend(&self) -> bool {
        !self.api_keys.is_empty() || self.base_url.is_some()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn make_client(&self, api_key: Option<&str>) -> Client<OpenAIConfig> {
        let mut config = OpenAIConfig::new();
        if let Some(base) = &self.base_url {
            config = config.with_api_base(base);
        }
        // 空池时使用占位 Key：本地兼容服务不校验凭证
        config = config.with_api_key(api_key.unwrap_or("local"));
        Client::with_config(config)
    }

    fn ordered_keys(&self) -> Vec<Option<String>> {
        keys::rotated(&self.api_keys, self.rotation.next_start(self.api_keys.len()))
    }

    fn build_request(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| api_error(&self.model_name, &e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| api_error(&self.model_name, &e))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.2)
            .max_tokens(2048u32)
            .build()
            .map_err(|e| api_error(&self.model_name, &e))
    }

    /// 发送一次对话请求
    ///
    /// 单个凭证失败时自动轮转，调用方拿到的要么是内容，要么是整个池
    /// 都救不回来的最终错误。
    pub async fn chat(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<String, LlmError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let request = self.build_request(user_message, system_message)?;

        let result = run_with_rotation(
            self.ordered_keys(),
            |key| {
                let request = request.clone();
                async move {
                    let client = self.make_client(key.as_deref());
                    client.chat().create(request).await
                }
            },
            classify_openai_error,
        )
        .await;

        let response = match result {
            Ok(response) => response,
            Err(RotationError::Fatal(e)) => return Err(api_error(&self.model_name, &e)),
            Err(RotationError::Exhausted { tried, last }) => {
                return Err(LlmError::KeysExhausted {
                    model: self.model_name.clone(),
                    tried,
                    message: last.to_string(),
                })
            }
        };

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }

    /// 发送一次流式对话请求
    ///
    /// 轮转只发生在首个数据块之前；之后的错误原样传给消费者。
    pub async fn chat_stream(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>, LlmError> {
        debug!("调用 LLM 流式 API，模型: {}", self.model_name);

        let request = self.build_request(user_message, system_message)?;
        let ordered = self.ordered_keys();
        let tried = ordered.len();
        let mut last_err: Option<OpenAIError> = None;

        for key in ordered {
            let masked = key
                .as_deref()
                .map(keys::mask_key)
                .unwrap_or_else(|| "<无凭证>".to_string());
            let client = self.make_client(key.as_deref());

            let mut stream = match client.chat().create_stream(request.clone()).await {
                Ok(stream) => stream,
                Err(e) => match classify_openai_error(&e) {
                    ErrorClass::RotateKey => {
                        warn!("⚠️ 凭证 {} 建立流失败，轮转到下一个: {}", masked, e);
                        last_err = Some(e);
                        continue;
                    }
                    ErrorClass::Fatal => return Err(api_error(&self.model_name, &e)),
                },
            };

            // 首块落地前仍可轮转
            match stream.next().await {
                None => return Ok(Box::pin(futures::stream::empty())),
                Some(Err(e)) => match classify_openai_error(&e) {
                    ErrorClass::RotateKey => {
                        warn!("⚠️ 凭证 {} 首块失败，轮转到下一个: {}", masked, e);
                        last_err = Some(e);
                        continue;
                    }
                    ErrorClass::Fatal => return Err(api_error(&self.model_name, &e)),
                },
                Some(Ok(first)) => {
                    let model = self.model_name.clone();
                    let mapped = futures::stream::once(async move { Ok(first) })
                        .chain(stream)
                        .map(move |item| {
                            item.map(extract_delta).map_err(|e| LlmError::Api {
                                model: model.clone(),
                                message: e.to_string(),
                            })
                        });
                    return Ok(Box::pin(mapped));
                }
            }
        }

        Err(LlmError::KeysExhausted {
            model: self.model_name.clone(),
            tried,
            message: last_err.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// 计算一批文本的嵌入向量
    ///
    /// 走 OpenAI 兼容的 `/embeddings` 接口，轮转语义与对话请求一致。
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        debug!("调用嵌入 API，模型: {}，文本数: {}", self.embedding_model, texts.len());

        let base = self
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let url = format!("{}/embeddings", base.trim_end_matches('/'));

        let result = run_with_rotation(
            self.ordered_keys(),
            |key| {
                let url = url.clone();
                async move {
                    let mut req = self.http.post(&url).json(&json!({
                        "model": self.embedding_model,
                        "input": texts,
                    }));
                    if let Some(k) = key {
                        req = req.bearer_auth(k);
                    }
                    let resp = req.send().await.map_err(LlmError::Http)?;
                    let status = resp.status();
                    if !status.is_success() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(LlmError::BadStatus {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    let parsed: EmbeddingResponse = resp.json().await.map_err(LlmError::Http)?;
                    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
                }
            },
            classify_embed_error,
        )
        .await;

        match result {
            Ok(embeddings) => Ok(embeddings),
            Err(RotationError::Fatal(e)) => Err(e),
            Err(RotationError::Exhausted { tried, last }) => Err(LlmError::KeysExhausted {
                model: self.embedding_model.clone(),
                tried,
                message: last.to_string(),
            }),
        }
    }
}

fn api_error(model: &str, err: &OpenAIError) -> LlmError {
    LlmError::Api {
        model: model.to_string(),
        message: err.to_string(),
    }
}

fn extract_delta(chunk: CreateChatCompletionStreamResponse) -> String {
    chunk
        .choices
        .first()
        .and_then(|choice| choice.delta.content.clone())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keys_of(n: usize) -> Vec<Option<String>> {
        (0..n).map(|i| Some(format!("k{}", i))).collect()
    }

    #[test]
    fn test_rotation_tries_next_key_on_rotatable_error() {
        let calls = AtomicUsize::new(0);
        let result = tokio_test::block_on(run_with_rotation(
            keys_of(3),
            |_key| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(format!("e{}", attempt))
                    } else {
                        Ok("成功")
                    }
                }
            },
            |_e| ErrorClass::RotateKey,
        ));

        assert_eq!(result.ok(), Some("成功"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_rotation_stops_immediately_on_fatal() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = tokio_test::block_on(run_with_rotation(
            keys_of(3),
            |_key| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err("请求非法".to_string()) }
            },
            |_e| ErrorClass::Fatal,
        ));

        assert!(matches!(result, Err(RotationError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rotation_exhausted_carries_last_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = tokio_test::block_on(run_with_rotation(
            keys_of(3),
            |_key| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("e{}", attempt)) }
            },
            |_e| ErrorClass::RotateKey,
        ));

        match result {
            Err(RotationError::Exhausted { tried, last }) => {
                assert_eq!(tried, 3);
                assert_eq!(last, "e2");
            }
            other => panic!("期望 Exhausted，实际: {:?}", other),
        }
    }

    #[test]
    fn test_rotation_success_skips_remaining_keys() {
        let calls = AtomicUsize::new(0);
        let result = tokio_test::block_on(run_with_rotation(
            keys_of(3),
            |_key| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, String>(42) }
            },
            |_e| ErrorClass::RotateKey,
        ));

        assert_eq!(result.ok(), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_classify_embed_429_rotates() {
        let err = LlmError::BadStatus {
            status: 429,
            body: "{}".to_string(),
        };
        assert_eq!(classify_embed_error(&err), ErrorClass::RotateKey);
    }

    #[test]
    fn test_classify_embed_400_other_code_is_fatal() {
        let err = LlmError::BadStatus {
            status: 400,
            body: r#"{"error": {"code": "some_other_error"}}"#.to_string(),
        };
        assert_eq!(classify_embed_error(&err), ErrorClass::Fatal);
    }

    #[test]
    fn test_classify_embed_400_quota_code_rotates() {
        let err = LlmError::BadStatus {
            status: 400,
            body: r#"{"error": {"code": "insufficient_quota"}}"#.to_string(),
        };
        assert_eq!(classify_embed_error(&err), ErrorClass::RotateKey);

        let err = LlmError::BadStatus {
            status: 400,
            body: r#"{"error": {"message": "Billing hard limit reached"}}"#.to_string(),
        };
        assert_eq!(classify_embed_error(&err), ErrorClass::RotateKey);
    }

    #[test]
    fn test_classify_embed_transport_is_fatal() {
        let err = LlmError::EmptyContent {
            model: "m".to_string(),
        };
        assert_eq!(classify_embed_error(&err), ErrorClass::Fatal);
    }

    #[test]
    fn test_classify_openai_quota_type_rotates() {
        let err = OpenAIError::ApiError(ApiError {
            message: "You exceeded your current quota".to_string(),
            r#type: Some("insufficient_quota".to_string()),
            param: None,
            code: None,
        });
        assert_eq!(classify_openai_error(&err), ErrorClass::RotateKey);
    }

    #[test]
    fn test_classify_openai_invalid_request_is_fatal() {
        let err = OpenAIError::ApiError(ApiError {
            message: "Unknown parameter: foobar".to_string(),
            r#type: Some("invalid_request_error".to_string()),
            param: None,
            code: None,
        });
        assert_eq!(classify_openai_error(&err), ErrorClass::Fatal);
    }

    #[test]
    fn test_classify_openai_quota_code_rotates() {
        // 400 + 泛化 type，错误码却在 code 字段里
        let err = OpenAIError::ApiError(ApiError {
            message: "The request failed.".to_string(),
            r#type: Some("invalid_request_error".to_string()),
            param: None,
            code: Some("insufficient_quota".into()),
        });
        assert_eq!(classify_openai_error(&err), ErrorClass::RotateKey);
    }

    #[test]
    fn test_classify_openai_bad_key_message_rotates() {
        let err = OpenAIError::ApiError(ApiError {
            message: "Incorrect API key provided".to_string(),
            r#type: None,
            param: None,
            code: None,
        });
        assert_eq!(classify_openai_error(&err), ErrorClass::RotateKey);
    }

    /// 冒烟测试：需要可用的 LLM 服务
    ///
    /// 运行方式：
    /// ```bash
    /// cargo test test_chat_smoke -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_chat_smoke() {
        let _ = tracing_subscriber::fmt::try_init();

        let mut config = crate::config::Config::default();
        config.apply_env();
        let client = RotatingLlmClient::new(&config);

        let result = client.chat("用一句话介绍你自己", None).await;
        match result {
            Ok(response) => {
                println!("LLM 响应: {}", response);
                assert!(!response.is_empty());
            }
            Err(e) => panic!("LLM 调用失败: {}", e),
        }
    }

    /// 流式冒烟测试：需要可用的 LLM 服务
    #[tokio::test]
    #[ignore]
    async fn test_chat_stream_smoke() {
        let _ = tracing_subscriber::fmt::try_init();

        let mut config = crate::config::Config::default();
        config.apply_env();
        let client = RotatingLlmClient::new(&config);

        let mut stream = client
            .chat_stream("从 1 数到 5", None)
            .await
            .expect("建立流失败");

        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk.expect("流中不应有错误"));
        }
        println!("流式响应: {}", collected);
        assert!(!collected.is_empty());
    }
}
