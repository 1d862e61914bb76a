use std::process::Command;

/// Commit shown by `plughost --version`. Release builds outside a git
/// checkout can pass it in through PLUGHOST_GIT_SHA.
fn commit_sha() -> String {
    if let Ok(sha) = std::env::var("PLUGHOST_GIT_SHA") {
        if !sha.trim().is_empty() {
            return sha.trim().to_string();
        }
    }
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!("cargo:rustc-env=PLUGHOST_GIT_SHA={}", commit_sha());
    println!("cargo:rerun-if-env-changed=PLUGHOST_GIT_SHA");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
