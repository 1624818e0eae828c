//! # jobproof - 简历校验服务
//!
//! 对"优化后"的简历做多维度自动校验：抓取目标职位页面、解析职位要求，
//! 然后用一组按优先级调度的过滤器评估简历的长度、关键词覆盖、
//! 真实性与语义贴合度。
//!
//! ## 架构分层
//!
//! ```text
//! app / main          应用装配与 CLI 入口
//!   ├── scrapers      抓取策略链 (direct → archive → browser)
//!   ├── agents        LLM 职位信息抽取
//!   ├── filters       校验过滤器 (长度/关键词/LLM 评审/语义相似度)
//!   ├── orchestration 过滤器调度 (门控串行 + 并发梯队)
//!   └── clients       轮转 LLM 客户端 (API Key 池)
//! 基础设施: config / keys / logger / error / models / utils
//! ```

pub mod agents;
pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod filters;
pub mod keys;
pub mod logger;
pub mod models;
pub mod orchestration;
pub mod scrapers;
pub mod utils;

pub use clients::RotatingLlmClient;
pub use config::Config;
pub use error::{AppError, Result};
pub use models::{FilterResult, JobPosting, OptimizedResume, ResumeSource, ValidationResult};
