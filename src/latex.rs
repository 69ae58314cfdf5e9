//! LaTeX formula handling
//!
//! Two concerns live here:
//!
//! - the formula-span grammar (`$…$`, non-nested, leftmost non-overlapping)
//!   and [`replace_scoped`], which applies one rewrite across the whole text
//!   and another one only inside the spans;
//! - the compliance check, which wraps a naked formula in a minimal
//!   `standalone` document and hands it to the external compiler.

use std::fs;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::WrapError;
use crate::image;

/// A formula span: the minimal text between two `$` delimiters, with the
/// naked formula in the first capture group.
pub static FORMULA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([^$]*)\$").unwrap());

/// Applies `global_re → global_repl` across the whole text, then re-scans the
/// result for formula spans and applies `formula_re → formula_repl` inside
/// each span only.
///
/// An odd number of delimiters means some formula is left open; that is a
/// formatting error in the input, not something to paper over.
pub fn replace_scoped(
    global_re: &Regex,
    global_repl: &str,
    formula_re: &Regex,
    formula_repl: &str,
    text: &str,
) -> Result<String, WrapError> {
    ensure_balanced(text)?;
    let pass = global_re.replace_all(text, global_repl);
    let res = FORMULA.replace_all(&pass, |caps: &regex::Captures| {
        formula_re.replace_all(&caps[0], formula_repl).into_owned()
    });
    Ok(res.into_owned())
}

/// Rejects text with an odd number of `$` delimiters.
pub fn ensure_balanced(text: &str) -> Result<(), WrapError> {
    if text.matches('$').count() % 2 != 0 {
        return Err(WrapError::UnbalancedFormula(text.to_string()));
    }
    Ok(())
}

/// Minimal document wrapping a naked formula for a compilation check.
fn document_for(formula: &str) -> String {
    format!(
        "\\documentclass{{standalone}}\n\
         \n\
         \\usepackage{{amsmath}}\n\
         \n\
         \\begin{{document}}\n\
         \n\
         $\n\
         {}\n\
         $\n\
         \n\
         \\end{{document}}\n",
        formula
    )
}

/// Checks whether a naked formula compiles with the minimal template.
///
/// The template is written to `auxiliary_file` and compiled in draft mode.
/// A nonzero exit status means "not compliant" (`Ok(false)`); a missing
/// compiler or an expired timeout is an error in its own right.
pub fn formula_can_be_compiled(
    formula: &str,
    auxiliary_file: &Path,
    timeout: Duration,
) -> Result<bool, WrapError> {
    fs::write(auxiliary_file, document_for(formula))?;
    let status = image::compile_tex(
        auxiliary_file,
        Some(timeout),
        &["halt-on-error", "draftmode"],
    )?;
    Ok(status == 0)
}
