//! Transform pipeline infrastructure
//!
//! A question's text is produced by folding it through an ordered list of
//! rewriting stages: run-wide pre-stages (reference rewriting), a per-question
//! custom stage (URL-to-image markup, parameterized by that question's image
//! size) and run-wide post-stages (line breaks, in-text LaTeX commands,
//! formula escaping, optional inlining). Any stage may fail with a typed
//! error, which short-circuits the remaining stages for that text.
//!
//! Stages that trigger external work (compilation, upload) memoize it in the
//! run-scoped [`TransformHistory`]: the side effect happens at most once per
//! distinct reference across the whole run, while the textual rewrite is
//! applied to every occurrence.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::{Captures, Match, Regex};

use crate::error::WrapError;
use crate::gift;
use crate::image;
use crate::latex;
use crate::remote::Connection;

/// A source-diagram reference: a path-like token ending in `.tex`
static TEX_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S+)\.tex").unwrap());

/// A rendered-image reference candidate; boundary checks reject candidates
/// embedded in longer paths or URLs (see [`is_standalone_reference`]).
static SVG_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-/\w]+\.svg").unwrap());

/// An `http…` URL, maximal run of URL characters
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"http[-/\w:.~]+").unwrap());

static NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n").unwrap());
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"<br>").unwrap());

/// Run-scoped memo of which references have already triggered their one-time
/// external action. Created once per run, shared across all questions, never
/// reset mid-run.
#[derive(Debug, Default)]
pub struct TransformHistory {
    compiled: HashSet<String>,
    transferred: HashSet<String>,
}

impl TransformHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn already_compiled(&self, reference: &str) -> bool {
        self.compiled.contains(reference)
    }

    /// Marked strictly after the external action succeeds, so a failed action
    /// never leaves a reference looking processed.
    pub fn mark_compiled(&mut self, reference: &str) {
        self.compiled.insert(reference.to_string());
    }

    pub fn already_transferred(&self, reference: &str) -> bool {
        self.transferred.contains(reference)
    }

    pub fn mark_transferred(&mut self, reference: &str) {
        self.transferred.insert(reference.to_string());
    }
}

/// Shared mutable state for one full run: the history, the upload connection
/// (when images are hosted remotely) and a sequence for fresh inline-SVG id
/// prefixes. Single-threaded by design, so a plain `&mut` suffices.
pub struct RunContext {
    pub history: TransformHistory,
    pub connection: Option<Box<dyn Connection>>,
    svg_sequence: usize,
}

impl RunContext {
    pub fn new(connection: Option<Box<dyn Connection>>) -> Self {
        Self {
            history: TransformHistory::new(),
            connection,
            svg_sequence: 0,
        }
    }

    /// A fresh prefix for the ids of the next inlined SVG
    pub fn next_svg_prefix(&mut self) -> String {
        let prefix = format!("svg{}", self.svg_sequence);
        self.svg_sequence += 1;
        prefix
    }

    fn connection_mut(&mut self) -> Result<&mut dyn Connection, WrapError> {
        match self.connection.as_deref_mut() {
            Some(connection) => Ok(connection),
            None => Err(WrapError::Validation(
                "remote image hosting requested but no connection is configured".to_string(),
            )),
        }
    }
}

/// A named text → text rewriting pass
pub trait Transform {
    fn name(&self) -> &'static str;

    fn apply(&self, text: &str, ctx: &mut RunContext) -> Result<String, WrapError>;
}

/// Ordered list of passes: `pre ++ custom ++ post`, folded left to right.
pub struct Pipeline {
    pre: Vec<Box<dyn Transform>>,
    post: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new(pre: Vec<Box<dyn Transform>>, post: Vec<Box<dyn Transform>>) -> Self {
        Self { pre, post }
    }

    /// Folds `text` through every stage in order. The first error aborts the
    /// fold; the pipeline does not catch and continue.
    pub fn process(
        &self,
        text: &str,
        custom: &[&dyn Transform],
        ctx: &mut RunContext,
    ) -> Result<String, WrapError> {
        let mut out = text.to_string();
        let stages = self
            .pre
            .iter()
            .map(|stage| stage.as_ref())
            .chain(custom.iter().copied())
            .chain(self.post.iter().map(|stage| stage.as_ref()));
        for stage in stages {
            out = stage.apply(&out, ctx)?;
        }
        Ok(out)
    }
}

/// Convenience wrapper binding a pipeline, a question's custom stages and the
/// run context together for repeated `process` calls on one question.
pub struct TextProcessor<'a> {
    pipeline: &'a Pipeline,
    custom: &'a [&'a dyn Transform],
    ctx: &'a mut RunContext,
}

impl<'a> TextProcessor<'a> {
    pub fn new(
        pipeline: &'a Pipeline,
        custom: &'a [&'a dyn Transform],
        ctx: &'a mut RunContext,
    ) -> Self {
        Self {
            pipeline,
            custom,
            ctx,
        }
    }

    pub fn process(&mut self, text: &str) -> Result<String, WrapError> {
        self.pipeline.process(text, self.custom, self.ctx)
    }
}

/// Rewrites every match of `re` in `text` through a fallible replacement.
///
/// The replacement may return `Ok(None)` to leave a particular match
/// untouched (used by the boundary-checked reference stages). Errors abort
/// the whole rewrite.
fn rewrite_all<F>(re: &Regex, text: &str, mut replacement: F) -> Result<String, WrapError>
where
    F: FnMut(&Captures) -> Result<Option<String>, WrapError>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        if let Some(repl) = replacement(&caps)? {
            out.push_str(&text[last..whole.start()]);
            out.push_str(&repl);
            last = whole.end();
        }
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn is_path_char(c: char) -> bool {
    c == '-' || c == '/' || c == '_' || c.is_alphanumeric()
}

/// A reference token must be whitespace-delimited on its own: not glued to
/// surrounding path characters, and not the tail of a URL.
fn is_standalone_reference(text: &str, m: &Match) -> bool {
    if let Some(before) = text[..m.start()].chars().next_back() {
        if is_path_char(before) {
            return false;
        }
    }
    if let Some(after) = text[m.end()..].chars().next() {
        if is_path_char(after) {
            return false;
        }
    }
    let token_start = text[..m.start()]
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let token_end = text[m.end()..]
        .find(char::is_whitespace)
        .map(|i| m.end() + i)
        .unwrap_or(text.len());
    url::Url::parse(&text[token_start..token_end]).is_err()
}

/// Pre-stage: compile `.tex` diagram references and rewrite them to the
/// rendered `.svg` name. Compilation and rasterization happen once per
/// distinct source across the run; rewritten tokens no longer match the
/// pattern, so the stage is idempotent.
pub struct TexToSvg {
    timeout: Duration,
}

impl TexToSvg {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Transform for TexToSvg {
    fn name(&self) -> &'static str {
        "tex-to-svg"
    }

    fn apply(&self, text: &str, ctx: &mut RunContext) -> Result<String, WrapError> {
        rewrite_all(&TEX_REFERENCE, text, |caps| {
            let whole = match caps.get(0) {
                Some(m) => m,
                None => return Ok(None),
            };
            let source = whole.as_str();
            if !ctx.history.already_compiled(source) {
                let pdf = image::tex_to_pdf(Path::new(source), self.timeout)?;
                image::pdf_to_svg(&pdf)?;
                ctx.history.mark_compiled(source);
            }
            Ok(Some(format!("{}.svg", &caps[1])))
        })
    }
}

/// Pre-stage (remote mode): upload `.svg` references and rewrite them to
/// their public URL. Uploads happen once per distinct file across the run.
pub struct SvgToHttp {
    remote_subdirectory: PathBuf,
    pictures_base_directory: String,
    public_url: String,
}

impl SvgToHttp {
    pub fn new(
        public_filesystem_root: &str,
        pictures_base_directory: &str,
        public_url: &str,
    ) -> Self {
        Self {
            remote_subdirectory: Path::new(public_filesystem_root).join(pictures_base_directory),
            pictures_base_directory: pictures_base_directory.to_string(),
            public_url: public_url.to_string(),
        }
    }
}

impl Transform for SvgToHttp {
    fn name(&self) -> &'static str {
        "svg-to-http"
    }

    fn apply(&self, text: &str, ctx: &mut RunContext) -> Result<String, WrapError> {
        rewrite_all(&SVG_REFERENCE, text, |caps| {
            let whole = match caps.get(0) {
                Some(m) => m,
                None => return Ok(None),
            };
            if !is_standalone_reference(text, &whole) {
                return Ok(None);
            }
            let file = whole.as_str();
            if !ctx.history.already_transferred(file) {
                let local = Path::new(file);
                let remote_directory = self
                    .remote_subdirectory
                    .join(local.parent().unwrap_or_else(|| Path::new("")));
                ctx.connection_mut()?.copy(local, &remote_directory)?;
                ctx.history.mark_transferred(file);
            }
            Ok(Some(format!(
                "{}{}/{}",
                self.public_url, self.pictures_base_directory, file
            )))
        })
    }
}

/// Post-stage (inline mode): splice `.svg` file contents directly into the
/// text, with ids made globally unique. Runs last so the inlined XML is not
/// re-processed by earlier stages.
pub struct SvgToInline;

impl Transform for SvgToInline {
    fn name(&self) -> &'static str {
        "svg-to-inline"
    }

    fn apply(&self, text: &str, ctx: &mut RunContext) -> Result<String, WrapError> {
        rewrite_all(&SVG_REFERENCE, text, |caps| {
            let whole = match caps.get(0) {
                Some(m) => m,
                None => return Ok(None),
            };
            if !is_standalone_reference(text, &whole) {
                return Ok(None);
            }
            let prefix = ctx.next_svg_prefix();
            let html = image::svg_to_html(Path::new(whole.as_str()), &prefix)?;
            Ok(Some(html))
        })
    }
}

/// Per-question custom stage: arrange URLs into GIFT-ready `<img>` markup,
/// sized by the question's declared image settings.
pub struct UrlImages {
    size: Option<(u32, u32)>,
}

impl UrlImages {
    pub fn new(size: Option<(u32, u32)>) -> Self {
        Self { size }
    }
}

impl Transform for UrlImages {
    fn name(&self) -> &'static str {
        "url-images"
    }

    fn apply(&self, text: &str, _ctx: &mut RunContext) -> Result<String, WrapError> {
        let res = URL.replace_all(text, |caps: &Captures| {
            format!("<p>{}<br></p>", gift::from_image_url(&caps[0], self.size))
        });
        Ok(res.into_owned())
    }
}

/// Post-stage: newlines become `<br>` in prose, a single space inside
/// formulas (line breaks are not meaningful in math mode).
pub struct NewLines;

impl Transform for NewLines {
    fn name(&self) -> &'static str {
        "new-lines"
    }

    fn apply(&self, text: &str, _ctx: &mut RunContext) -> Result<String, WrapError> {
        latex::replace_scoped(&NEWLINE, "<br>", &LINE_BREAK, " ", text)
    }
}

struct ScopedRule {
    global: Regex,
    global_repl: &'static str,
    formula: Regex,
    formula_repl: &'static str,
}

/// `\textbf` / `\textit` become HTML in prose but stay LaTeX inside formulas,
/// where a separate engine renders them.
static TEXT_COMMANDS: Lazy<Vec<ScopedRule>> = Lazy::new(|| {
    vec![
        ScopedRule {
            global: Regex::new(r"\\textbf\{([^}]+)\}").unwrap(),
            global_repl: "<b>${1}</b>",
            formula: Regex::new(r"<b>([^<]*)</b>").unwrap(),
            formula_repl: r"\textbf{${1}}",
        },
        ScopedRule {
            global: Regex::new(r"\\textit\{([^}]+)\}").unwrap(),
            global_repl: "<i>${1}</i>",
            formula: Regex::new(r"<i>([^<]*)</i>").unwrap(),
            formula_repl: r"\textit{${1}}",
        },
    ]
});

/// Post-stage applying [`TEXT_COMMANDS`]. Must run while `$` spans still
/// exist, i.e. before [`LatexFormulas`] strips the delimiters.
pub struct LatexInText;

impl Transform for LatexInText {
    fn name(&self) -> &'static str {
        "latex-in-text"
    }

    fn apply(&self, text: &str, _ctx: &mut RunContext) -> Result<String, WrapError> {
        let mut res = text.to_string();
        for rule in TEXT_COMMANDS.iter() {
            res = latex::replace_scoped(
                &rule.global,
                rule.global_repl,
                &rule.formula,
                rule.formula_repl,
                &res,
            )?;
        }
        Ok(res)
    }
}

/// Optional compilation check for [`LatexFormulas`]
pub struct FormulaCheck {
    pub auxiliary_file: PathBuf,
    pub timeout: Duration,
}

/// Post-stage: each formula span is optionally verified against the external
/// compiler, then escaped and wrapped in the GIFT math delimiters. A formula
/// that does not compile aborts the current question with
/// [`WrapError::NotCompliantFormula`].
pub struct LatexFormulas {
    check: Option<FormulaCheck>,
}

impl LatexFormulas {
    pub fn new(check: Option<FormulaCheck>) -> Self {
        Self { check }
    }
}

impl Transform for LatexFormulas {
    fn name(&self) -> &'static str {
        "latex-formulas"
    }

    fn apply(&self, text: &str, _ctx: &mut RunContext) -> Result<String, WrapError> {
        latex::ensure_balanced(text)?;
        rewrite_all(&latex::FORMULA, text, |caps| {
            let naked = &caps[1];
            if let Some(check) = &self.check {
                if !latex::formula_can_be_compiled(naked, &check.auxiliary_file, check.timeout)? {
                    return Err(WrapError::NotCompliantFormula(naked.to_string()));
                }
            }
            Ok(Some(gift::from_latex_formula(naked)))
        })
    }
}
