use std::process::Command;

fn main() {
    // Release builds outside a checkout can pin the hash explicitly.
    println!("cargo:rerun-if-env-changed=BOXMAN_GIT_HASH");
    let git_hash = std::env::var("BOXMAN_GIT_HASH").unwrap_or_else(|_| {
        match Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            _ => String::from("unknown"),
        }
    });

    println!("cargo:rustc-env=GIT_HASH={git_hash}");
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=../.git/refs/heads/");
}
