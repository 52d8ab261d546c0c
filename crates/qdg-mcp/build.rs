use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    Some(text.trim().to_string())
}

fn watch(path: &str) {
    let path = std::path::Path::new(path);
    // `--git-path` answers relative to the build script's cwd (the crate dir).
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    println!("cargo:rerun-if-changed={}", abs.display());
}

fn main() {
    for name in ["HEAD", "packed-refs", "index"] {
        if let Some(path) = git(&["rev-parse", "--git-path", name]) {
            watch(&path);
        }
    }
    if let Some(head_ref) = git(&["symbolic-ref", "-q", "HEAD"]) {
        if let Some(path) = git(&["rev-parse", "--git-path", &head_ref]) {
            watch(&path);
        }
    }

    let sha = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "nogit".to_string());
    let count = git(&["rev-list", "--count", "HEAD"]).unwrap_or_else(|| "0".to_string());
    let dirty = match git(&["status", "--porcelain"]) {
        Some(status) if status.is_empty() => "",
        _ => ".dirty",
    };

    println!("cargo:rustc-env=QDG_GIT_SHA={}", sha);
    println!("cargo:rustc-env=QDG_GIT_COUNT={}", count);
    println!("cargo:rustc-env=QDG_GIT_DIRTY={}", dirty);
}
