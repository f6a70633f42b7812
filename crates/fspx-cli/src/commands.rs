//! Batch-mode compilation and analyses.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use fspx_compiler::{Diagnostics, Driver, Error};
use fspx_lts::CompiledImage;

use crate::shell::Shell;

pub struct BatchParams {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub deadlock: bool,
    pub progress: bool,
    pub graphviz: bool,
    pub json: bool,
    pub shell: bool,
    pub script: Option<PathBuf>,
    pub max_depth: usize,
}

pub fn run(params: BatchParams) -> ExitCode {
    let interactive = params.shell || params.script.is_some();

    let driver = if params.input.extension().is_some_and(|e| e == "ltsx") {
        match load_image(&params.input, params.max_depth) {
            Ok(driver) => driver,
            Err(msg) => {
                eprintln!("error: {msg}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        let source = match std::fs::read_to_string(&params.input) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {}: {e}", params.input.display());
                return ExitCode::FAILURE;
            }
        };
        match fspx_compiler::compile(&source, params.max_depth, interactive) {
            Ok(driver) => driver,
            Err(Error::Parse(diags)) => {
                eprint!(
                    "{}",
                    diags
                        .printer()
                        .source(&source)
                        .path(&params.input.display().to_string())
                        .render()
                );
                eprintln!();
                return ExitCode::FAILURE;
            }
            Err(Error::Semantic(err)) => {
                let mut diags = Diagnostics::new();
                diags.error(err.to_string(), err.span).emit();
                eprint!(
                    "{}",
                    diags
                        .printer()
                        .source(&source)
                        .path(&params.input.display().to_string())
                        .render()
                );
                eprintln!();
                return ExitCode::FAILURE;
            }
        }
    };

    let mut driver = driver;
    let mut report = String::new();
    let mut deadlocks = 0usize;
    let mut violations = 0usize;

    if params.deadlock || params.graphviz {
        for (name, lts) in &driver.processes {
            if params.deadlock {
                deadlocks += lts.deadlock_analysis(&driver.actions, &mut report);
            }
            if params.graphviz {
                let path = format!("{name}.gv");
                if let Err(e) = std::fs::write(&path, lts.graphviz(&driver.actions)) {
                    eprintln!("error: {path}: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    if params.progress {
        let properties: Vec<(String, fspx_core::ProgressSpec)> = driver
            .progresses
            .iter()
            .map(|(n, p)| (n.to_owned(), p.clone()))
            .collect();
        let names: Vec<String> = driver.processes.keys().cloned().collect();
        for name in &names {
            let rc = driver.processes.get_mut(name).expect("known process");
            let lts = Rc::make_mut(rc);
            for (prop_name, prop) in &properties {
                violations += lts.progress(prop_name, prop, &driver.actions, &mut report);
            }
        }
    }

    print!("{report}");

    if params.json {
        let summary = serde_json::json!({
            "processes": driver.processes.len(),
            "deadlocks": deadlocks,
            "progress_violations": violations,
        });
        println!("{summary}");
    }

    if let Some(path) = &params.output {
        let image = CompiledImage {
            actions: driver.actions.clone(),
            processes: driver.processes.values().map(|rc| (**rc).clone()).collect(),
            progresses: driver
                .progresses
                .iter()
                .map(|(n, p)| (n.to_owned(), p.clone()))
                .collect(),
        };
        let bytes = match image.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = std::fs::write(path, bytes) {
            eprintln!("error: {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    }

    if let Some(script) = &params.script {
        let file = match std::fs::File::open(script) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("error: {}: {e}", script.display());
                return ExitCode::FAILURE;
            }
        };
        let mut shell = Shell::new(driver, Box::new(std::io::BufReader::new(file)), false);
        let code = shell.run();
        return exit_code_from(code);
    }

    if params.shell {
        let stdin = std::io::stdin();
        let mut shell = Shell::new(driver, Box::new(std::io::BufReader::new(stdin)), true);
        let code = shell.run();
        return exit_code_from(code);
    }

    ExitCode::SUCCESS
}

fn exit_code_from(code: i64) -> ExitCode {
    if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from((code as u8).max(1))
    }
}

fn load_image(path: &Path, max_depth: usize) -> Result<Driver, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let image = CompiledImage::from_bytes(&bytes).map_err(|e| e.to_string())?;

    let mut driver = Driver::new(max_depth, false);
    driver.actions = image.actions;
    for lts in image.processes {
        driver.processes.insert(lts.name.clone(), Rc::new(lts));
    }
    for (name, progress) in image.progresses {
        driver.progresses.insert(name, progress);
    }
    Ok(driver)
}
