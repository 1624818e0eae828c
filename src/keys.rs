//! API Key 池 - 基础设施层
//!
//! ## 职责
//!
//! 1. **加载**：从环境变量中按固定顺序收集 API Key（编号变量 → 列表变量 → 单个变量），
//!    跨来源去重，保留首次出现的位置
//! 2. **掩码**：Key 永远不以明文出现在日志里，只输出掩码形式
//! 3. **轮转**：进程级单调递增计数器，为每次逻辑调用分配不同的起始 Key
//!
//! Key 池在进程启动时构建一次，之后只读。轮转计数器是整个应用中
//! 唯一的全局可变状态，必须在并发调用下保持单调且无碰撞。

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 编号变量前缀：LLM_API_KEY_1 / LLM_API_KEY_2 / ...
const NUMBERED_PREFIX: &str = "LLM_API_KEY_";
/// 列表变量：逗号/分号/空白分隔的多个 Key
const LIST_VAR: &str = "LLM_API_KEYS";
/// 单个 Key 变量（兜底）
const SINGLE_VAR: &str = "LLM_API_KEY";

/// 把分隔符混写的 Key 列表切分成有序去重的 Key 数组
pub fn split_keys(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(|c: char| matches!(c, ',' | ';' | '\t' | '\n' | '\r' | ' '))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter(|p| seen.insert(p.to_string()))
        .map(str::to_string)
        .collect()
}

/// 从环境变量快照中加载 API Key 池
///
/// 支持的格式：
/// - `LLM_API_KEY_1` / `LLM_API_KEY_2` / ...（按编号排序）
/// - `LLM_API_KEYS="k1,k2,k3"`（逗号/空白/分号分隔）
/// - `LLM_API_KEY="k1"`（单个 Key 兜底）
///
/// 跨来源重复的 Key 只保留首次出现。
pub fn load_api_keys(env: &BTreeMap<String, String>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();

    // 编号变量，按后缀数字排序
    let mut numbered: Vec<(usize, &String)> = Vec::new();
    for (name, value) in env {
        let Some(suffix) = name.strip_prefix(NUMBERED_PREFIX) else {
            continue;
        };
        let Ok(index) = suffix.parse::<usize>() else {
            continue;
        };
        if !value.is_empty() {
            numbered.push((index, value));
        }
    }
    numbered.sort_by_key(|(index, _)| *index);
    keys.extend(numbered.into_iter().map(|(_, v)| v.clone()));

    // 列表变量
    if let Some(raw) = env.get(LIST_VAR) {
        keys.extend(split_keys(raw));
    }

    // 单个 Key 兜底
    if let Some(single) = env.get(SINGLE_VAR) {
        if !single.is_empty() {
            keys.push(single.clone());
        }
    }

    // 跨来源再去重一次，保留首次出现
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

/// 获取当前进程环境变量的快照
pub fn env_snapshot() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

/// 返回 Key 的安全展示形式
pub fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let len = key.chars().count();
    if len <= 10 {
        return "*".repeat(len);
    }
    let head: String = key.chars().take(7).collect();
    let tail: String = key.chars().skip(len - 4).collect();
    format!("{}{}{}", head, "*".repeat(len - 11), tail)
}

/// 批量掩码
pub fn mask_keys(keys: &[String]) -> Vec<String> {
    keys.iter().map(|k| mask_key(k)).collect()
}

/// 轮转计数器
///
/// 每次逻辑调用取一个起始下标，保证相邻调用从不同的 Key 开始
/// （调用间公平轮转；单次调用内部的重试顺序由 [`rotated`] 决定）。
#[derive(Debug, Default)]
pub struct KeyRotation {
    counter: AtomicUsize,
}

impl KeyRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取下一个起始下标，对池大小取模
    ///
    /// 计数器严格递增，并发调用下不会出现相同的计数值。
    pub fn next_start(&self, pool_size: usize) -> usize {
        if pool_size == 0 {
            return 0;
        }
        self.counter.fetch_add(1, Ordering::Relaxed) % pool_size
    }
}

/// 按起始下标旋转 Key 池，每个 Key 恰好出现一次
///
/// 空池返回单个 `None` 凭证：本地部署的兼容服务不校验 Key，
/// “无凭证”本身就是一个合法的轮转成员。
pub fn rotated(keys: &[String], start: usize) -> Vec<Option<String>> {
    if keys.is_empty() {
        return vec![None];
    }
    let n = keys.len();
    (0..n).map(|i| Some(keys[(start + i) % n].clone())).collect()
}
