use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use scenegen::{compile_game_file, CompileOptions, CompileReport, PROJECT_ROOT_ENV_VAR};
use tracing::error;
use tracing_subscriber::EnvFilter;

const EXIT_SCENES_ABORTED: u8 = 2;

#[derive(Debug)]
struct CliArgs {
    spec: PathBuf,
    project: PathBuf,
    assets_fallback: Option<PathBuf>,
    prefer: Vec<String>,
    json: bool,
}

fn main() -> ExitCode {
    init_tracing();
    let args = match parse_args(env::args().skip(1).collect()) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{}", usage_text());
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("{message}\n\n{}", usage_text());
            return ExitCode::from(1);
        }
    };

    let mut options = CompileOptions::new(&args.project);
    options.secondary_asset_root = args.assets_fallback.clone();
    options.precedence = args.prefer.clone();

    match compile_game_file(&args.spec, &options) {
        Ok(report) => {
            if let Err(message) = print_report(&report, args.json) {
                eprintln!("{message}");
                return ExitCode::from(1);
            }
            if report.aborted.is_empty() && !report.cancelled {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_SCENES_ABORTED)
            }
        }
        Err(err) => {
            error!(error = %err, spec = %args.spec.display(), "compile_failed");
            eprintln!("scenegen: {err}");
            ExitCode::from(1)
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<Option<CliArgs>, String> {
    let mut spec = None;
    let mut project = None;
    let mut assets_fallback = None;
    let mut prefer = Vec::new();
    let mut json = false;

    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => return Ok(None),
            "--spec" => {
                spec = Some(PathBuf::from(flag_value(&args, index, "--spec")?));
                index += 2;
            }
            "--project" => {
                project = Some(PathBuf::from(flag_value(&args, index, "--project")?));
                index += 2;
            }
            "--assets-fallback" => {
                assets_fallback = Some(PathBuf::from(flag_value(&args, index, "--assets-fallback")?));
                index += 2;
            }
            "--prefer" => {
                prefer.push(flag_value(&args, index, "--prefer")?.to_string());
                index += 2;
            }
            "--json" => {
                json = true;
                index += 1;
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    let spec = spec.ok_or_else(|| "missing required --spec <file>".to_string())?;
    let project = project
        .or_else(|| env::var_os(PROJECT_ROOT_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(Some(CliArgs {
        spec,
        project,
        assets_fallback,
        prefer,
        json,
    }))
}

fn flag_value<'a>(args: &'a [String], index: usize, flag: &str) -> Result<&'a str, String> {
    args.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("missing value for {flag}"))
}

fn print_report(report: &CompileReport, json: bool) -> Result<(), String> {
    if json {
        let encoded = serde_json::to_string_pretty(report)
            .map_err(|err| format!("failed to encode report: {err}"))?;
        println!("{encoded}");
        return Ok(());
    }

    println!("{}", report.title);
    for scene in &report.saved {
        let marker = if scene.added_to_build { " (added to build)" } else { "" };
        println!("  saved   {} -> {}{marker}", scene.name, scene.relative_path);
    }
    for scene in &report.aborted {
        println!("  aborted {} (#{}): {}", scene.name, scene.index, scene.reason);
    }
    for diagnostic in &report.diagnostics {
        println!("  {diagnostic}");
    }
    if report.cancelled {
        println!("  cancelled before all scenes were compiled");
    }
    println!(
        "{} saved, {} aborted, {} warnings, {} errors",
        report.saved.len(),
        report.aborted.len(),
        report.warning_count(),
        report.error_count()
    );
    Ok(())
}

fn usage_text() -> String {
    [
        "scenegen - compile a declarative game spec into scene artifacts",
        "",
        "Usage:",
        "  scenegen --spec <file> [--project <dir>] [--assets-fallback <dir>] [--prefer <module>]... [--json]",
        "",
        "Defaults:",
        "  --project $SCENEGEN_PROJECT_ROOT, else the current directory",
        "",
        "Exit codes:",
        "  0 all scenes saved, 1 fatal error, 2 some scenes aborted or run cancelled",
    ]
    .join("\n")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
