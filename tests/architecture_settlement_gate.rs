use std::fs;
use std::path::{Path, PathBuf};

/// Files allowed to invoke a settlement trigger. The settlement module itself
/// only calls it from its own unit tests.
const ALLOWED_SETTLE_CALLERS: &[&str] = &["src/engine/commit.rs", "src/settlement.rs"];

fn collect_rust_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, out);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

fn relative(repo_root: &Path, file: &Path) -> String {
    file.strip_prefix(repo_root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

#[test]
fn settlement_calls_are_limited_to_commit() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    collect_rust_files(&repo_root.join("src"), &mut files);
    assert!(!files.is_empty(), "no sources found under src/");

    let mut offenders = Vec::new();
    for file in files {
        let rel = relative(repo_root, &file);
        if ALLOWED_SETTLE_CALLERS.iter().any(|allowed| *allowed == rel) {
            continue;
        }
        let content = fs::read_to_string(&file).unwrap_or_default();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.contains(".settle(") {
                offenders.push(format!("{rel}:{}: {}", idx + 1, trimmed));
            }
        }
    }

    assert!(
        offenders.is_empty(),
        "settlement invoked outside the commit path:\n{}",
        offenders.join("\n")
    );
}

#[test]
fn engine_state_is_not_exported() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let engine_mod = fs::read_to_string(repo_root.join("src/engine/mod.rs")).unwrap();

    // slots, active player and used tags are only reachable through the engine
    assert!(engine_mod.contains("mod state;"));
    assert!(!engine_mod.contains("pub mod state"));
    assert!(!engine_mod.contains("pub use state::GameState"));
}
