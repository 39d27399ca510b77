use std::process::Command;

fn output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }

    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn main() {
    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version = output(&rustc, &["--version"]).unwrap_or_else(|| "unknown".to_string());
    let git_hash = output("git", &["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=KVROCKS_EXPORTER_RUSTC_VERSION={rustc_version}");
    println!("cargo:rustc-env=KVROCKS_EXPORTER_GIT_HASH={git_hash}");
    println!("cargo:rerun-if-env-changed=KVROCKS_EXPORTER_BUILD_DATE");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
