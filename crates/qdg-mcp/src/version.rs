/// Package version plus the git build metadata captured by `build.rs`.
pub const FULL: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+git.",
    env!("QDG_GIT_COUNT"),
    ".",
    env!("QDG_GIT_SHA"),
    env!("QDG_GIT_DIRTY")
);

#[cfg(test)]
mod tests {
    use super::FULL;

    #[test]
    fn full_version_starts_with_package_version() {
        let prefix = format!("{}+git.", env!("CARGO_PKG_VERSION"));
        assert!(FULL.starts_with(&prefix), "unexpected version string: {FULL}");
    }
}
