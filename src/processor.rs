//! Run orchestration
//!
//! [`wrap`] drives a whole conversion: load and validate the bank, load the
//! optional parameters, set up the connection and the pipeline according to
//! the requested mode, fold every question through it and write the GIFT
//! output next to the input. The output is buffered and written in one go so
//! a failed run leaves no half-written file behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bank::Bank;
use crate::config::Parameters;
use crate::error::WrapError;
use crate::gift;
use crate::remote::{Auth, Connection, FakeConnection, SshConnection};
use crate::transform::{
    FormulaCheck, LatexFormulas, LatexInText, NewLines, Pipeline, RunContext, SvgToHttp,
    SvgToInline, TexToSvg, Transform,
};

/// Budget for each external compilation (diagrams and formula checks)
const COMPILE_TIMEOUT: Duration = Duration::from_secs(10);

/// Knobs of a single run
#[derive(Debug, Clone)]
pub struct WrapOptions {
    /// Record uploads instead of performing them
    pub local_run: bool,
    /// Skip the per-formula compilation check
    pub no_checks: bool,
    /// Splice SVG contents into the output instead of hosting them
    pub embed_images: bool,
    /// Scratch file the formula checks compile
    pub latex_auxiliary_file: PathBuf,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            local_run: false,
            no_checks: false,
            embed_images: false,
            latex_auxiliary_file: PathBuf::from("__latex__.tex"),
        }
    }
}

/// Converts a YAML question bank into a GIFT file, returning its path.
///
/// The output file has the same name as the input with the `.gift.txt`
/// extension. Every failure is fatal: nothing is retried and no partial
/// output is written.
pub fn wrap(
    questions_file: &Path,
    parameters_file: &Path,
    options: &WrapOptions,
) -> Result<PathBuf, WrapError> {
    let bank = Bank::load(questions_file)?;
    bank.validate()?;

    let parameters = Parameters::load(parameters_file)?;

    let mut embed_images = options.embed_images;
    if parameters.is_none() && !embed_images {
        tracing::info!(
            file = %parameters_file.display(),
            "no parameters file: embedding the images"
        );
        embed_images = true;
    }

    let mut pre: Vec<Box<dyn Transform>> = vec![Box::new(TexToSvg::new(COMPILE_TIMEOUT))];
    let mut post: Vec<Box<dyn Transform>> = vec![
        Box::new(NewLines),
        Box::new(LatexInText),
        Box::new(LatexFormulas::new(if options.no_checks {
            None
        } else {
            Some(FormulaCheck {
                auxiliary_file: options.latex_auxiliary_file.clone(),
                timeout: COMPILE_TIMEOUT,
            })
        })),
    ];

    let connection: Option<Box<dyn Connection>> = if embed_images {
        post.push(Box::new(SvgToInline));
        None
    } else {
        let hosting = match &parameters {
            Some(parameters) => &parameters.images_hosting,
            None => {
                return Err(WrapError::Validation(
                    "remote image hosting requires a parameters file".to_string(),
                ))
            }
        };
        pre.push(Box::new(SvgToHttp::new(
            &hosting.copy.public_filesystem_root,
            &bank.pictures_base_directory,
            &hosting.public_url,
        )));
        if options.local_run {
            Some(Box::new(FakeConnection::new(&hosting.copy.host)))
        } else {
            let auth = Auth::from_settings(&hosting.ssh)?;
            Some(Box::new(SshConnection::connect(
                &hosting.copy.host,
                &hosting.ssh.user,
                auth,
            )?))
        }
    };

    let pipeline = Pipeline::new(pre, post);
    let mut ctx = RunContext::new(connection);

    let mut output = String::new();
    for category in &bank.categories {
        if let Some(name) = &category.name {
            for segment in name.segments() {
                output.push_str(&gift::from_category(segment, true));
            }
        }
        for question in &category.questions {
            let block = question.to_gift(&pipeline, &mut ctx).map_err(|err| {
                tracing::error!(question = %question.name, error = %err, "question failed");
                err
            })?;
            output.push_str(&block);
            output.push_str("\n\n");
        }
    }

    let output_file = questions_file.with_extension("gift.txt");
    fs::write(&output_file, output)?;
    tracing::info!(file = %output_file.display(), "output written");

    if let Some(connection) = &ctx.connection {
        for transfer in connection.pending_transfers() {
            tracing::info!(
                source = %transfer.source.display(),
                destination = %transfer.remote_directory.display(),
                host = %connection.host(),
                "file still to copy"
            );
        }
    }

    Ok(output_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const BANK: &str = "\
pictures base directory: quiz/pics
categories:
  - name: Algebra
    questions:
      - class: Numerical
        name: Q1
        statement: How much is 2+2?
        solution:
          value: 4
";

    fn options() -> WrapOptions {
        WrapOptions {
            no_checks: true,
            embed_images: true,
            ..WrapOptions::default()
        }
    }

    #[test]
    fn output_lands_next_to_the_input() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("bank.yaml");
        fs::write(&input, BANK).unwrap();

        let output = wrap(&input, &dir.path().join("parameters.yaml"), &options()).unwrap();
        assert_eq!(output, dir.path().join("bank.gift.txt"));

        let content = fs::read_to_string(output).unwrap();
        assert!(content.starts_with("$CATEGORY: $course$/Algebra\n\n"));
        assert!(content.contains("::Q1::[html]How much is 2+2?{\n#\t=%100%4#\n}\n\n"));
    }

    #[test]
    fn missing_parameters_fall_back_to_embedding() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("bank.yaml");
        fs::write(&input, BANK).unwrap();

        // no parameters file, no -e: the run still succeeds by embedding
        let opts = WrapOptions {
            no_checks: true,
            ..WrapOptions::default()
        };
        assert!(wrap(&input, &dir.path().join("parameters.yaml"), &opts).is_ok());
    }

    #[test]
    fn a_failing_question_leaves_no_output_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("bank.yaml");
        fs::write(
            &input,
            "\
pictures base directory: pics
categories:
  - name: A
    questions:
      - class: Numerical
        name: Q1
        statement: unbalanced $ formula
        solution: {value: 1}
",
        )
        .unwrap();

        let err = wrap(&input, &dir.path().join("parameters.yaml"), &options()).unwrap_err();
        assert!(matches!(err, WrapError::UnbalancedFormula(_)));
        assert!(!dir.path().join("bank.gift.txt").exists());
    }

    #[test]
    fn duplicate_names_abort_before_any_formatting() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("bank.yaml");
        fs::write(
            &input,
            "\
pictures base directory: pics
categories:
  - name: A
    questions:
      - {class: Numerical, name: Q1, statement: a, solution: {value: 1}}
      - {class: Numerical, name: Q1, statement: b, solution: {value: 2}}
",
        )
        .unwrap();

        let err = wrap(&input, &dir.path().join("parameters.yaml"), &options()).unwrap_err();
        assert!(matches!(err, WrapError::Validation(_)));
    }
}
