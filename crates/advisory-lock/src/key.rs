//! 锁键
//!
//! PostgreSQL 咨询锁使用 `(int4, int4)` 两段式键。键可以由可读的
//! `(namespace, value)` 派生，也可以直接使用外部系统算好的 id 对。

use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{AdvisoryLockError, Result};

/// 咨询锁键
///
/// 构造后不可变。`label` 只用于日志关联，会以注释形式追加到
/// 每条发出的 SQL 语句末尾，因此构造时总会去掉所有控制字符。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    class_id: i32,
    object_id: i32,
    label: String,
}

impl LockKey {
    /// 由 `(namespace, value)` 派生键
    ///
    /// 对 `namespace + NUL + value` 做 SHA-256，取前 8 字节作为 64 位整数，
    /// 高 32 位作为 `class_id`，低 32 位作为 `object_id`。
    /// NUL 分隔符保证 `("ab", "cd")` 与 `("a", "bcd")` 不会落到同一个键。
    ///
    /// 相同输入在任何进程、任何机器上都得到相同的键，
    /// 独立进程无需注册中心即可在同一逻辑键上协调。
    pub fn derive(namespace: &str, value: &str) -> Result<Self> {
        Self::derive_with_label(namespace, value, None)
    }

    /// 由 `(namespace, value)` 派生键，并可覆盖默认标签 `[namespace:value]`
    pub fn derive_with_label(namespace: &str, value: &str, label: Option<&str>) -> Result<Self> {
        if namespace.is_empty() {
            return Err(AdvisoryLockError::invalid_argument(
                "namespace",
                "锁键的命名空间不能为空",
            ));
        }
        if value.is_empty() {
            return Err(AdvisoryLockError::invalid_argument(
                "value",
                "锁键的值不能为空",
            ));
        }

        let (class_id, object_id) = split_hash(namespace, value);
        let label = match label {
            Some(label) => label.to_string(),
            None => format!("[{}:{}]", namespace, value),
        };

        Self::from_ids_with_label(class_id.into(), object_id.into(), Some(&label))
    }

    /// 直接使用 `(class_id, object_id)` 构造键
    ///
    /// 两个 id 都必须落在 int32 范围内，否则返回 `InvalidArgument`，
    /// 错误信息会指明越界的字段和取值。
    pub fn from_ids(class_id: i64, object_id: i64) -> Result<Self> {
        Self::from_ids_with_label(class_id, object_id, None)
    }

    /// 直接使用 id 对构造键，并指定标签
    ///
    /// 未指定标签时使用 `[class_id:object_id]`。
    pub fn from_ids_with_label(class_id: i64, object_id: i64, label: Option<&str>) -> Result<Self> {
        let class_id = checked_int32("class_id", class_id)?;
        let object_id = checked_int32("object_id", object_id)?;
        let label = match label {
            Some(label) => sanitize_label(label),
            None => format!("[{}:{}]", class_id, object_id),
        };

        Ok(Self {
            class_id,
            object_id,
            label,
        })
    }

    pub fn class_id(&self) -> i32 {
        self.class_id
    }

    pub fn object_id(&self) -> i32 {
        self.object_id
    }

    /// 已清洗的可读标签
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

fn checked_int32(field: &str, value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        AdvisoryLockError::invalid_argument(
            field,
            format!(
                "取值 {} 超出 int32 范围 [{}, {}]",
                value,
                i32::MIN,
                i32::MAX
            ),
        )
    })
}

fn split_hash(namespace: &str, value: &str) -> (i32, i32) {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0u8]);
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(head);

    ((hash >> 32) as u32 as i32, hash as u32 as i32)
}

/// 去掉 ASCII 控制字符（0x00-0x1F 与 0x7F）
///
/// 标签以 `-- label` 行注释的形式追加在 SQL 末尾，换行等字符会让注释提前结束。
fn sanitize_label(label: &str) -> String {
    label.chars().filter(|c| !c.is_ascii_control()).collect()
}
