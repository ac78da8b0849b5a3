//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集。
//! 未安装 recorder 时，`record_*` 函数是空操作。

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// 获取结果计数，标签 scope / mode / outcome
pub const LOCK_ACQUIRE_TOTAL: &str = "advisory_lock_acquire_total";
/// 获取耗时（秒），标签 scope / mode
pub const LOCK_ACQUIRE_DURATION_SECONDS: &str = "advisory_lock_acquire_duration_seconds";
/// 释放结果计数，标签 mode / outcome
pub const LOCK_RELEASE_TOTAL: &str = "advisory_lock_release_total";

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 安装 Prometheus recorder
///
/// 进程内只安装一次，重复调用返回已安装的 handle。
pub fn init(service_name: &str) -> Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_lock_metrics(service_name);

    Ok(handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// 注册咨询锁相关指标的描述
fn register_lock_metrics(service_name: &str) {
    metrics::describe_counter!(LOCK_ACQUIRE_TOTAL, "Total number of advisory lock acquisitions");
    metrics::describe_histogram!(
        LOCK_ACQUIRE_DURATION_SECONDS,
        "Advisory lock acquisition duration in seconds"
    );
    metrics::describe_counter!(LOCK_RELEASE_TOTAL, "Total number of advisory lock releases");

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 记录一次获取
///
/// `outcome` 取值：acquired / not_acquired / error
#[inline]
pub fn record_lock_acquire(scope: &str, mode: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        LOCK_ACQUIRE_TOTAL,
        "scope" => scope.to_string(),
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        LOCK_ACQUIRE_DURATION_SECONDS,
        "scope" => scope.to_string(),
        "mode" => mode.to_string()
    )
    .record(duration_secs);
}

/// 记录一次释放
///
/// `outcome` 取值：released / not_held / error
#[inline]
pub fn record_lock_release(mode: &str, outcome: &str) {
    metrics::counter!(
        LOCK_RELEASE_TOTAL,
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_lock_acquire("session", "exclusive", "acquired", 0.002);
        record_lock_acquire("transaction", "share", "not_acquired", 0.5);
        record_lock_release("exclusive", "released");
        record_lock_release("share", "not_held");
    }
}
