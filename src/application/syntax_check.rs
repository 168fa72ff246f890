//! Per-file and whole-workspace syntax gates (C5 step 6, C6 syntax sweep),
//! grounded on the worker's `syntax_check` (per-extension dispatch) and the
//! reconciler's `check_syntax` (directory-wide `compileall`).

use crate::domain::ports::errors::SyntaxCheckError;
use std::path::Path;
use tokio::process::Command;

/// Check a single written file's syntax using whatever interpreter its
/// extension implies. Extensions this crate doesn't recognize are treated
/// as always valid — the original only gates `.py`/`.js`/`.ts`/`.sh`.
pub async fn check_file(workspace: &Path, relative_path: &str) -> Result<(), SyntaxCheckError> {
    let ext = Path::new(relative_path).extension().and_then(|e| e.to_str()).unwrap_or("");

    let (program, args): (&str, Vec<&str>) = match ext {
        "py" => ("python3", vec!["-m", "py_compile", relative_path]),
        "js" | "ts" | "jsx" | "tsx" => ("node", vec!["--check", relative_path]),
        "sh" => ("bash", vec!["-n", relative_path]),
        _ => return Ok(()),
    };

    let output = Command::new(program)
        .args(&args)
        .current_dir(workspace)
        .output()
        .await
        .map_err(|e| SyntaxCheckError::Invalid { path: relative_path.to_string(), detail: e.to_string() })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(SyntaxCheckError::Invalid {
            path: relative_path.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Outcome of a workspace-wide sweep (reconciler's `check_syntax`).
pub struct SweepReport {
    pub ok: bool,
    pub output: String,
}

/// Directory-wide Python syntax sweep over the whole workspace, used by the
/// reconciler between claim cycles so errors surface even when a worker's
/// per-file check at write time missed something (e.g. a cross-file issue).
pub async fn check_workspace(workspace: &Path) -> SweepReport {
    let result = Command::new("python3")
        .args(["-m", "compileall", &workspace.to_string_lossy(), "-q"])
        .output()
        .await;

    match result {
        Ok(output) => SweepReport {
            ok: output.status.success(),
            output: String::from_utf8_lossy(&output.stderr).to_string(),
        },
        Err(e) => SweepReport { ok: false, output: e.to_string() },
    }
}
