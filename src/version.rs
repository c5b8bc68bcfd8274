//! Build metadata embedded by vergen.

use serde::Serialize;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git branch at build time, or "unknown" if unavailable.
pub const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => "unknown",
};

/// Git commit SHA at build time, or "unknown" if unavailable.
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// RFC 3339 build timestamp, or "unknown".
pub const BUILD_TIMESTAMP: &str = match option_env!("VERGEN_BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => "unknown",
};

pub fn git_dirty() -> bool {
    option_env!("VERGEN_GIT_DIRTY") == Some("true")
}

fn short_sha() -> &'static str {
    GIT_SHA.get(..7).unwrap_or(GIT_SHA)
}

/// `{version}+{branch}.{sha}`, with `.dirty` appended for a dirty tree.
///
/// e.g. `0.1.0+main.abc1234`
pub fn version_string() -> String {
    let dirty_suffix = if git_dirty() { ".dirty" } else { "" };
    format!("{PKG_VERSION}+{GIT_BRANCH}.{}{dirty_suffix}", short_sha())
}

/// Build metadata as one serializable record, for `--version --json` style
/// output and startup logs.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub sha: &'static str,
    pub dirty: bool,
    pub built_at: &'static str,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: PKG_VERSION,
        branch: GIT_BRANCH,
        sha: short_sha(),
        dirty: git_dirty(),
        built_at: BUILD_TIMESTAMP,
    }
}
