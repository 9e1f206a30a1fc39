//! Version strings and the startup banner.

use std::sync::LazyLock;

pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Stamped in by release builds through `PROCPOOL_GIT_REV`.
const GIT_REV: Option<&str> = option_env!("PROCPOOL_GIT_REV");

static LONG_VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{}\nworker protocol: one JSON document per line over stdin/stdout",
        full_version()
    )
});

/// `X.Y.Z`, or `X.Y.Z (rev)` when a git revision was stamped in.
pub fn full_version() -> String {
    match GIT_REV {
        Some(rev) if !rev.is_empty() => format!("{} ({})", PKG_VERSION, rev),
        _ => PKG_VERSION.to_string(),
    }
}

/// Text for `--version` long form.
pub fn long_version() -> &'static str {
    LONG_VERSION.as_str()
}

/// Lines logged when a pool starts, unless `silent_start` is set.
pub fn banner(pool_size: usize, trace: bool) -> [String; 3] {
    [
        format!("procpool {}", full_version()),
        format!("{} worker processes running", pool_size),
        format!("Trace mode is {}", if trace { "on" } else { "off" }),
    ]
}
