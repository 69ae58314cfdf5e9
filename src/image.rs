//! External compilation and rendering services
//!
//! Thin wrappers around the `pdflatex` and `pdf2svg` command-line tools,
//! located through `which`. Both are opaque collaborators: nonzero exit means
//! failure, and every failure is fatal to the run. Compilation additionally
//! runs under a bounded timeout; expiry kills the child and aborts.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::WrapError;
use crate::gift;

/// How often a running compilation is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// `id="…"` attributes inside an SVG document
static SVG_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"id="([\w-]+)""#).unwrap());

/// Compiles a TeX file, returning the compiler's exit status.
///
/// The compiler runs in the source's directory so relative inputs resolve.
/// `options` are passed as `-<option>` flags.
pub fn compile_tex(
    source_file: &Path,
    timeout: Option<Duration>,
    options: &[&str],
) -> Result<i32, WrapError> {
    let compiler =
        which::which("pdflatex").map_err(|_| WrapError::MissingTool("pdflatex".to_string()))?;

    let file_name = source_file
        .file_name()
        .ok_or_else(|| WrapError::MissingFile(source_file.to_path_buf()))?;

    let mut command = Command::new(compiler);
    for option in options {
        command.arg(format!("-{}", option));
    }
    command.arg(file_name);
    if let Some(parent) = source_file.parent() {
        if !parent.as_os_str().is_empty() {
            command.current_dir(parent);
        }
    }
    command.stdout(Stdio::null()).stderr(Stdio::null());

    let mut child = command.spawn()?;

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let started = Instant::now();
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if started.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(WrapError::CompilationTimeout {
                        path: source_file.to_path_buf(),
                        seconds: limit.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    };

    Ok(status.code().unwrap_or(-1))
}

/// Turns a TeX file into a PDF; fatal on nonzero exit or timeout.
pub fn tex_to_pdf(source_file: &Path, timeout: Duration) -> Result<PathBuf, WrapError> {
    let status = compile_tex(source_file, Some(timeout), &["halt-on-error"])?;
    if status != 0 {
        return Err(WrapError::CompilationFailed {
            path: source_file.to_path_buf(),
            status: Some(status),
        });
    }
    Ok(source_file.with_extension("pdf"))
}

/// Converts a PDF into an SVG next to it; fatal on nonzero exit.
pub fn pdf_to_svg(input_file: &Path) -> Result<PathBuf, WrapError> {
    let output_file = input_file.with_extension("svg");

    let converter =
        which::which("pdf2svg").map_err(|_| WrapError::MissingTool("pdf2svg".to_string()))?;

    let input_name = input_file
        .file_name()
        .ok_or_else(|| WrapError::MissingFile(input_file.to_path_buf()))?;
    let output_name = output_file
        .file_name()
        .ok_or_else(|| WrapError::MissingFile(output_file.to_path_buf()))?;

    let mut command = Command::new(converter);
    command.arg(input_name).arg(output_name);
    if let Some(parent) = input_file.parent() {
        if !parent.as_os_str().is_empty() {
            command.current_dir(parent);
        }
    }
    command.stdout(Stdio::null()).stderr(Stdio::null());

    let status = command.status()?;
    if !status.success() {
        return Err(WrapError::ConversionFailed {
            path: input_file.to_path_buf(),
        });
    }
    Ok(output_file)
}

/// Reads an SVG file and prepares it for inline inclusion in a GIFT body.
///
/// `id` attributes are prefixed with `id_prefix` so repeated inclusions don't
/// collide, GIFT reserved characters are escaped, and the whole document is
/// wrapped in a `<body>` marker.
pub fn svg_to_html(input_file: &Path, id_prefix: &str) -> Result<String, WrapError> {
    let content = std::fs::read_to_string(input_file)
        .map_err(|_| WrapError::MissingFile(input_file.to_path_buf()))?;

    let content = SVG_ID
        .replace_all(&content, |caps: &regex::Captures| {
            format!("id=\"{}-{}\"", id_prefix, &caps[1])
        })
        .into_owned();

    let escaped = gift::escape_reserved(&content, &[':', '~', '=', '#', '{', '}']);

    Ok(format!("<body>\n{}</body>", escaped))
}
