//! Minimal CLI: load bundle → (schema | check | echo)
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;

use crate::fragment::FragmentBundle;
use crate::mapper::{decode, encode, Mapper};
use crate::scalar::default_registry;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// decode/encode token payloads against a fragment bundle
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// validate a bundle and print its normalized descriptor tables
    Schema(SchemaOut),
    /// decode every input document and report per-document results
    Check(CheckRun),
    /// decode then re-encode each document (canonical token form)
    Echo(EchoOut),
}

#[derive(Args, Debug, Clone)]
struct BundleSettings {
    /// fragment bundle file (JSON: name, root, types)
    #[arg(long, short = 'f')]
    fragment: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/hero)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug)]
struct SchemaOut {
    #[command(flatten)]
    bundle_settings: BundleSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(Args, Debug)]
struct CheckRun {
    #[command(flatten)]
    bundle_settings: BundleSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(Args, Debug)]
struct EchoOut {
    #[command(flatten)]
    bundle_settings: BundleSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl BundleSettings {
    fn load(&self) -> (FragmentBundle, Arc<Mapper>) {
        let path_str = self.fragment.to_string_lossy().to_string();
        let source = std::fs::read_to_string(&self.fragment);
        let source = match source {
            Ok(x) => x,
            Err(error) => {
                panic!("Failed to read fragment bundle ({path_str}): {error}");
            }
        };
        let bundle = crate::input::from_str_with_path::<FragmentBundle>(&source);
        let bundle = match bundle {
            Ok(x) => x,
            Err(error) => {
                panic!("Failed to parse fragment bundle ({path_str}): {error}");
            }
        };
        let mapper = match bundle.build() {
            Ok(x) => x,
            Err(error) => {
                panic!("Invalid fragment bundle ({path_str}): {error}");
            }
        };
        (bundle, mapper)
    }
}

impl InputSettings {
    fn resolve_paths(&self) -> Vec<PathBuf> {
        resolve_file_path_patterns(&self.input).expect("failed to resolve input file paths")
    }

    /// All documents held by one input file, labeled `path[#index]`.
    /// Read/parse problems are fatal, matching the rest of the tool.
    fn documents_from(&self, source_path: &Path) -> Vec<(String, serde_json::Value)> {
        let source_path_str = source_path.to_string_lossy().to_string();
        let source = std::fs::read_to_string(source_path);
        let source = match source {
            Ok(x) => x,
            Err(error) => {
                panic!("Failed to read source file ({source_path_str}): {error}");
            }
        };

        let mut documents = Vec::<serde_json::Value>::new();
        if self.ndjson {
            for line in source.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<serde_json::Value>(line) {
                    Ok(v) => documents.push(v),
                    Err(error) => {
                        panic!("Failed to parse NDJSON line ({source_path_str}): {error}");
                    }
                }
            }
        } else {
            match serde_json::from_str::<serde_json::Value>(&source) {
                Ok(v) => documents.push(v),
                Err(error) => {
                    panic!("Failed to parse JSON source file ({source_path_str}): {error}");
                }
            }
        }

        if let Some(pointer) = self.json_pointer.as_ref() {
            documents = documents
                .into_iter()
                .map(|doc| match doc.pointer(pointer) {
                    Some(sub) => sub.clone(),
                    None => {
                        panic!("JSON pointer `{pointer}` matched nothing in {source_path_str}");
                    }
                })
                .collect();
        }

        if let Some(jq_expr) = self.jq_expr.as_ref() {
            let mut filtered = Vec::new();
            for doc in &documents {
                let result = crate::jq_exec::run_jaq(jq_expr, doc);
                match result {
                    Ok(values) => filtered.extend(values),
                    Err(error) => {
                        panic!("Failed to apply jq expression ({source_path_str}): {error}");
                    }
                }
            }
            documents = filtered;
        }

        documents
            .into_iter()
            .enumerate()
            .map(|(i, v)| (format!("{source_path_str}[#{i}]"), v))
            .collect()
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) {
        match &self.cmd {
            Command::Schema(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return;
                }

                let (bundle, _mapper) = target.bundle_settings.load();
                let schema_src = serde_json::to_string_pretty(&bundle).unwrap();
                if let Some(out) = target.out.as_ref() {
                    if let Some(parent) = out.parent() {
                        std::fs::create_dir_all(parent).unwrap();
                    }
                    std::fs::write(out, &schema_src).unwrap();
                } else {
                    println!("{schema_src}");
                }
            }
            Command::Check(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return;
                }

                let (_bundle, mapper) = target.bundle_settings.load();
                let registry = default_registry();
                let paths = target.input_settings.resolve_paths();

                // mapper graph and registry are read-only; fan out per file
                let reports: Vec<(String, Option<String>)> = paths
                    .par_iter()
                    .flat_map(|path| {
                        target
                            .input_settings
                            .documents_from(path)
                            .into_iter()
                            .map(|(label, doc)| {
                                let outcome = decode(&doc, &mapper, registry)
                                    .err()
                                    .map(|e| e.to_string());
                                (label, outcome)
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect();

                let mut failures = 0usize;
                for (label, outcome) in &reports {
                    match outcome {
                        None => println!("{} {label}", "ok".green()),
                        Some(error) => {
                            failures += 1;
                            eprintln!("{} {label}: {error}", "FAIL".red().bold());
                        }
                    }
                }
                eprintln!(
                    "{} document(s), {} failure(s)",
                    reports.len(),
                    if failures == 0 {
                        failures.to_string().green()
                    } else {
                        failures.to_string().red()
                    }
                );
                if failures > 0 {
                    std::process::exit(1);
                }
            }
            Command::Echo(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return;
                }

                let (_bundle, mapper) = target.bundle_settings.load();
                let registry = default_registry();
                let paths = target.input_settings.resolve_paths();

                let mut rendered = Vec::<String>::new();
                for path in &paths {
                    for (label, doc) in target.input_settings.documents_from(path) {
                        let node = match decode(&doc, &mapper, registry) {
                            Ok(x) => x,
                            Err(error) => {
                                panic!("Failed to decode {label}: {error}");
                            }
                        };
                        let token = encode(&node, &mapper, registry);
                        rendered.push(serde_json::to_string_pretty(&token).unwrap());
                    }
                }

                let output = rendered.join("\n");
                if let Some(out) = target.out.as_ref() {
                    if let Some(parent) = out.parent() {
                        std::fs::create_dir_all(parent).unwrap();
                    }
                    std::fs::write(out, &output).unwrap();
                } else {
                    println!("{output}");
                }
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            // Treat as a glob pattern
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                match entry {
                    Ok(p) => {
                        matched_any = true;
                        out.push(p);
                    }
                    Err(e) => return Err(Box::new(e)),
                }
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                return Err(format!("glob pattern matched no files: {pattern}").into());
            }
        } else {
            // Treat as a literal path
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
