//! SDK 版本与运行时元信息
//!
//! - **SDK Version** → Cargo.toml（唯一权威源）
//! - **Storage Layout Version** → 本地存储 key 的 `_v1` 后缀
//! - **Build Metadata** → build.rs（vergen）

/// SDK semver，来自 Cargo.toml
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// git commit（由 vergen 在 build.rs 中生成，非 git 构建时为 "unknown"）
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// build time（由 vergen 在 build.rs 中生成）
pub const BUILD_TIME: &str = match option_env!("VERGEN_BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => "unknown",
};

/// 本地存储布局版本，与 `storage::keys` 中的后缀保持一致
pub const STORAGE_LAYOUT_VERSION: u32 = 1;

/// 版本摘要（用于日志打印和 User-Agent）
pub fn version_string() -> String {
    format!("drillsync-sdk/{} ({})", SDK_VERSION, GIT_SHA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_contains_semver() {
        assert!(version_string().starts_with("drillsync-sdk/"));
        assert!(version_string().contains(SDK_VERSION));
    }
}
