//! Command-line interface for giftsmith
//!
//! Usage:
//!   giftsmith [-i <bank.yaml>] [-p <parameters.yaml>] [-l] [-n] [-e]

use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, Command};
use tracing_subscriber::EnvFilter;

use giftsmith::{wrap, WrapOptions};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("giftsmith")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Turns a YAML question bank into a Moodle-ready GIFT file")
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .help("File with the questions")
                .default_value("bank.yaml"),
        )
        .arg(
            Arg::new("parameters")
                .long("parameters")
                .short('p')
                .help("Settings for images hosting")
                .default_value("parameters.yaml"),
        )
        .arg(
            Arg::new("local")
                .long("local")
                .short('l')
                .help("Don't copy the images to the server, just record what should be copied")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-checks")
                .long("no-checks")
                .short('n')
                .help("Don't check whether LaTeX formulas compile")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("embed-images")
                .long("embed-images")
                .short('e')
                .help("Embed the images directly in the output instead of hosting them")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let input = matches
        .get_one::<String>("input")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bank.yaml"));
    let parameters = matches
        .get_one::<String>("parameters")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("parameters.yaml"));

    let options = WrapOptions {
        local_run: matches.get_flag("local"),
        no_checks: matches.get_flag("no-checks"),
        embed_images: matches.get_flag("embed-images"),
        ..WrapOptions::default()
    };

    match wrap(Path::new(&input), Path::new(&parameters), &options) {
        Ok(output) => {
            println!("file \"{}\" created", output.display());
        }
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    }
}
