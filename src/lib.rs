pub mod assets;
pub mod codegen;
pub mod config;
pub mod convert;
pub mod error;
pub mod metadata;
pub mod names;
pub mod project;
pub mod slot;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(all(target_arch = "wasm32", feature = "wasm-bindings"))]
pub mod wasm;

pub use convert::{convert, convert_project_json, ConvertOptions, ConvertedProject};
pub use error::{DecodeError, GenerateError};

#[cfg(not(target_arch = "wasm32"))]
use anyhow::Result;
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};

#[cfg(not(target_arch = "wasm32"))]
pub fn run_cli(args: &cli::Args) -> Result<()> {
    let progress = CliProgress::new("Convert", 5);
    progress.emit(1, "Resolving input path");
    let input = canonicalize_file(&args.input)?;

    let options = ConvertOptions {
        output_dir: args.output.clone(),
        write_config: !args.no_config,
        write_postprocess: !args.no_postprocess,
        ..ConvertOptions::default()
    };
    let mut stage_cb = |step: usize, total: usize, label: &str| {
        progress.emit_with_total(1 + step, 1 + total, label);
    };
    let project_dir = convert::convert_project_with_progress(&input, &options, Some(&mut stage_cb))?;
    eprintln!("Saved project to '{}'.", pretty_path(&project_dir));
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub fn canonicalize_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!("Input file not found: '{}'.", path.display()));
    }
    Ok(path.canonicalize()?)
}

#[cfg(not(target_arch = "wasm32"))]
fn pretty_path(path: &Path) -> String {
    let raw = path.display().to_string();
    match raw.strip_prefix(r"\\?\") {
        Some(stripped) => stripped.to_string(),
        None => raw,
    }
}

#[cfg(not(target_arch = "wasm32"))]
struct CliProgress {
    prefix: &'static str,
    total: usize,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliProgress {
    fn new(prefix: &'static str, total: usize) -> Self {
        Self {
            prefix,
            total: total.max(1),
        }
    }

    fn emit(&self, step: usize, label: &str) {
        self.emit_with_total(step, self.total, label);
    }

    fn emit_with_total(&self, step: usize, total: usize, label: &str) {
        let total = total.max(1);
        let step = step.clamp(1, total);
        eprintln!(
            "[{}] {}... ({}/{}) {}",
            self.prefix,
            label,
            step,
            total,
            progress_bar(step, total, 14)
        );
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn progress_bar(step: usize, total: usize, width: usize) -> String {
    let width = width.max(1);
    let filled = (step * width + total / 2) / total;
    format!("[{}{}]", "=".repeat(filled), "-".repeat(width - filled.min(width)))
}
