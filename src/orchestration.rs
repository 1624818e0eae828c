//! 过滤器调度
//!
//! ## 职责
//!
//! 把 [`FilterSet`] 分成两个梯队执行：
//!
//! 1. **门控梯队**（优先级低于 `filter_gate_priority`）：串行执行，
//!    任一失败立即返回部分结果，不再启动昂贵的后续评估
//! 2. **并发梯队**（其余过滤器）：`tokio::spawn` 并发执行，可配置
//!    总超时；超时后未完成的过滤器被中止，已有结果构成部分结论
//!
//! 无论完成顺序如何，结果始终按优先级升序排列。过滤器自身故障
//! （`Err` 或任务崩溃）转换为失败结论，绝不拖垮整个调度。

use std::sync::Arc;

use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::filters::{Filter, FilterSet};
use crate::models::{FilterResult, JobPosting, OptimizedResume, ResumeSource, ValidationResult};

/// 过滤器故障时的兜底结论
fn internal_fault_result(name: &str, threshold: f32, message: &str) -> FilterResult {
    FilterResult {
        filter_name: name.to_string(),
        passed: false,
        score: 0.0,
        threshold,
        issues: vec![format!("过滤器内部错误: {message}")],
        suggestions: vec![],
    }
}

async fn evaluate_one(
    filter: Arc<dyn Filter>,
    resume: Arc<OptimizedResume>,
    source: Arc<ResumeSource>,
    job: Arc<JobPosting>,
) -> FilterResult {
    match filter.evaluate(&resume, &source, &job).await {
        Ok(result) => result,
        Err(e) => {
            warn!("⚠️ 过滤器 {} 执行出错: {:#}", filter.name(), e);
            internal_fault_result(filter.name(), filter.threshold(), &e.to_string())
        }
    }
}

/// 执行全部过滤器，返回按优先级排序的结论
pub async fn run_filters(
    set: &FilterSet,
    config: &Config,
    resume: Arc<OptimizedResume>,
    source: Arc<ResumeSource>,
    job: Arc<JobPosting>,
) -> ValidationResult {
    let mut results: Vec<FilterResult> = Vec::with_capacity(set.filters().len());

    // ========== 门控梯队：串行 + 快速失败 ==========
    let (gate, rest): (Vec<_>, Vec<_>) = set
        .filters()
        .iter()
        .cloned()
        .partition(|f| f.priority() < config.filter_gate_priority);

    for filter in gate {
        debug!("执行门控过滤器: {}", filter.name());
        let result =
            evaluate_one(filter.clone(), resume.clone(), source.clone(), job.clone()).await;
        let passed = result.passed;
        results.push(result);
        if !passed {
            info!("❌ 门控过滤器 {} 未通过，终止后续评估", filter.name());
            return ValidationResult { results };
        }
    }

    if rest.is_empty() {
        return ValidationResult { results };
    }

    // ========== 并发梯队 ==========
    if !config.parallel_filters {
        for filter in rest {
            let result =
                evaluate_one(filter.clone(), resume.clone(), source.clone(), job.clone()).await;
            results.push(result);
        }
        return ValidationResult { results };
    }

    let deadline = (config.filter_timeout_secs > 0)
        .then(|| Instant::now() + Duration::from_secs(config.filter_timeout_secs));

    let handles: Vec<_> = rest
        .iter()
        .map(|filter| {
            let filter = filter.clone();
            let resume = resume.clone();
            let source = source.clone();
            let job = job.clone();
            tokio::spawn(evaluate_one(filter, resume, source, job))
        })
        .collect();

    // 过滤器与句柄同序，按序收割即保持优先级顺序
    let mut timed_out = false;
    for (filter, mut handle) in rest.iter().zip(handles) {
        if timed_out {
            handle.abort();
            continue;
        }
        let joined = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("⚠️ 过滤器评估超时 ({}s)，放弃未完成的结果", config.filter_timeout_secs);
                    handle.abort();
                    timed_out = true;
                    continue;
                }
            },
            None => handle.await,
        };
        match joined {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!("⚠️ 过滤器 {} 任务异常终止: {}", filter.name(), e);
                results.push(internal_fault_result(
                    filter.name(),
                    filter.threshold(),
                    &e.to_string(),
                ));
            }
        }
    }

    ValidationResult { results }
}
