//! Main CLI application

use crate::cli::signal;
use crate::config::{load_project, load_project_auto, validate_project};
use crate::error::{is_fatal, ExecutionError, TaskforgeError};
use crate::project::Project;
use crate::runner::{BuiltinRegistry, CancelToken, Context, Outcome, Runtime, Verbosity};
use crate::task::Task;
use clap::{Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use colored::Colorize;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive
const LOG_ENV: &str = "TASKFORGE_LOG";

/// CLI application
pub struct App {
    /// The clap command
    command: Command,
    /// Loaded project
    project: Project,
    /// Project file path
    config_path: PathBuf,
}

impl App {
    /// Create a new app, discovering the project file
    pub fn new() -> Result<Self, TaskforgeError> {
        let (project, config_path) = load_project_auto()?;
        Self::from_project(project, config_path)
    }

    /// Create app with a specific project file or manifest
    pub fn with_config_file(path: PathBuf) -> Result<Self, TaskforgeError> {
        let project = load_project(&path)?;
        Self::from_project(project, path)
    }

    fn from_project(project: Project, config_path: PathBuf) -> Result<Self, TaskforgeError> {
        validate_project(&project)?;
        let command = build_command(&project);

        Ok(App {
            command,
            project,
            config_path,
        })
    }

    /// Run the application with the process arguments
    pub fn run(self) -> Result<i32, TaskforgeError> {
        self.run_from(std::env::args_os())
    }

    /// Run the application and return the process exit code
    pub fn run_from<I, T>(mut self, args: I) -> Result<i32, TaskforgeError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command.clone().get_matches_from(args);

        // Handle global flags first
        let verbosity = get_verbosity(&matches);
        init_tracing(verbosity);
        tracing::debug!(config = %self.config_path.display(), "loaded project");

        if let Some(shell) = matches.get_one::<Shell>("completions") {
            let mut out = io::stdout();
            clap_complete::generate(*shell, &mut self.command, "taskforge", &mut out);
            return Ok(0);
        }

        if matches.get_flag("list") {
            print_task_list(&self.project);
            return Ok(0);
        }

        if let Some(task_name) = matches.get_one::<String>("inspect") {
            let task = self
                .project
                .tasks()
                .try_find(task_name)
                .ok_or_else(|| ExecutionError::UnknownTask(task_name.clone()))?;
            print_task_details(task);
            return Ok(0);
        }

        if matches.get_flag("synth") {
            self.project.synth()?;
            if verbosity >= Verbosity::Normal {
                println!(
                    "{} {}",
                    "Synthesized".green(),
                    self.project.outdir().display()
                );
            }
            return Ok(0);
        }

        // Check if a task was specified
        let (task_name, task_matches) = match matches.subcommand() {
            Some((name, sub_matches)) => (name.to_string(), sub_matches),
            None => {
                // No task specified, show help
                self.command.print_help()?;
                println!();
                return Ok(0);
            }
        };

        let extra_args: Vec<String> = if self.project.tasks().contains(&task_name) {
            task_matches
                .get_many::<String>("args")
                .map(|values| values.cloned().collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(self.run_task(&task_name, &extra_args, verbosity))
    }

    fn run_task(&self, task_name: &str, extra_args: &[String], verbosity: Verbosity) -> i32 {
        let cancel = CancelToken::new();
        signal::install(&cancel);

        let mut ctx = Context::new()
            .with_working_dir(self.project.outdir().to_path_buf())
            .with_verbosity(verbosity)
            .with_cancel_token(cancel);

        // Set interpreter if specified in the project
        if let Some(interpreter) = self.project.interpreter() {
            ctx = ctx.with_interpreter(interpreter.to_vec());
        }

        let builtins = BuiltinRegistry::with_defaults();
        let mut runtime = Runtime::new(&self.project, &builtins, ctx);

        match runtime.run(task_name, extra_args).and_then(Outcome::into_result) {
            Ok(_) => 0,
            Err(e) => {
                if is_fatal(&e) {
                    runtime.context().print_error(&e.to_string());
                } else {
                    // The failing command already reported on stderr
                    tracing::info!(error = %e, "task failed");
                }
                e.exit_code()
            }
        }
    }
}

/// Build the clap command from the project
fn build_command(project: &Project) -> Command {
    let about = project
        .description()
        .map(str::to_string)
        .unwrap_or_else(|| "Composable project tasks".to_string());

    let mut cmd = Command::new(project.name().to_string())
        .version(env!("CARGO_PKG_VERSION"))
        .about(about)
        .allow_external_subcommands(true)
        .disable_help_subcommand(true)
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to taskforge.yml or an exported tasks.json"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help("List tasks and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("inspect")
                .short('i')
                .long("inspect")
                .value_name("TASK")
                .help("Print a task's steps without running it"),
        )
        .arg(
            Arg::new("synth")
                .long("synth")
                .help("Export the task manifest and write generated files")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("completions")
                .long("completions")
                .value_name("SHELL")
                .help("Print a shell completion script")
                .value_parser(clap::value_parser!(Shell)),
        );

    // Add subcommands for each task
    for task in project.tasks().iter() {
        let task_cmd = Command::new(task.name().to_string())
            .about(task.description().unwrap_or_default().to_string())
            .arg(
                Arg::new("args")
                    .value_name("ARGS")
                    .help("Passed to steps that receive arguments")
                    .num_args(0..)
                    .trailing_var_arg(true)
                    .allow_hyphen_values(true),
            );

        cmd = cmd.subcommand(task_cmd);
    }

    cmd
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// `TASKFORGE_LOG` wins; otherwise the level follows the verbosity flags
fn log_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(match verbosity {
            Verbosity::Silent => "off",
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "debug",
        })
    })
}

fn init_tracing(verbosity: Verbosity) {
    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbosity))
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn print_task_list(project: &Project) {
    let width = project
        .tasks()
        .iter()
        .map(|task| task.name().len())
        .max()
        .unwrap_or(0);

    for task in project.tasks().iter() {
        println!(
            "  {:<width$}  {}",
            task.name().bold(),
            task.description().unwrap_or_default(),
            width = width
        );
    }
}

fn print_task_details(task: &Task) {
    println!("{}", task.name().bold());
    if let Some(description) = task.description() {
        println!("  {}", description);
    }
    if let Some(condition) = task.condition() {
        println!("  condition: {}", condition);
    }
    if let Some(cwd) = task.cwd() {
        println!("  cwd: {}", cwd);
    }
    for (key, value) in task.env() {
        match value {
            Some(value) => println!("  env {}={}", key, value),
            None => println!("  env {} (unset)", key),
        }
    }
    if !task.required_env().is_empty() {
        println!("  requires: {}", task.required_env().join(", "));
    }
    for (index, step) in task.steps().iter().enumerate() {
        println!("  {}. {}", index + 1, step.label());
    }
}

/// Run the CLI application and return the process exit code
pub fn run() -> Result<i32, TaskforgeError> {
    // Check if --file flag is provided first
    let args: Vec<String> = std::env::args().collect();
    let file_path = extract_file_arg(&args);

    let app = if let Some(path) = file_path {
        App::with_config_file(path)?
    } else {
        App::new()?
    };

    app.run()
}

/// Extract --file argument before clap parsing
///
/// Only the root command's flags are scanned: everything from the task
/// subcommand or `--` on belongs to the task.
fn extract_file_arg(args: &[String]) -> Option<PathBuf> {
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--" => return None,
            "-f" | "--file" => return rest.next().map(PathBuf::from),
            "-i" | "--inspect" | "--completions" => {
                rest.next();
            }
            _ => {
                if let Some(path) = arg.strip_prefix("--file=") {
                    return Some(PathBuf::from(path));
                }
                if !arg.starts_with('-') {
                    return None;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project() -> Project {
        let mut project = Project::new("demo", "/work/demo");
        project
            .add_task("build")
            .unwrap()
            .set_description("Build everything")
            .exec("cargo build");
        project.add_task("test").unwrap().exec("cargo test");
        project
    }

    #[test]
    fn test_get_verbosity_normal() {
        let cmd = Command::new("test")
            .arg(Arg::new("quiet").long("quiet").action(ArgAction::SetTrue))
            .arg(Arg::new("silent").long("silent").action(ArgAction::SetTrue))
            .arg(Arg::new("verbose").long("verbose").action(ArgAction::SetTrue));
        let matches = cmd.get_matches_from(vec!["test"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Normal);
    }

    #[test]
    fn test_get_verbosity_silent_wins() {
        let cmd = build_command(&sample_project());
        let matches = cmd.get_matches_from(vec!["demo", "-s", "-v"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Silent);
    }

    #[test]
    fn test_extract_file_arg() {
        let args = vec![
            "taskforge".to_string(),
            "--file".to_string(),
            "test.yml".to_string(),
        ];
        let path = extract_file_arg(&args);
        assert_eq!(path, Some(PathBuf::from("test.yml")));
    }

    #[test]
    fn test_extract_file_arg_short() {
        let args = vec!["taskforge".to_string(), "-f".to_string(), "test.yml".to_string()];
        assert_eq!(extract_file_arg(&args), Some(PathBuf::from("test.yml")));

        let args = vec!["taskforge".to_string(), "--file=other.yml".to_string()];
        assert_eq!(extract_file_arg(&args), Some(PathBuf::from("other.yml")));
    }

    #[test]
    fn test_extract_file_arg_stops_at_task() {
        let to_args = |args: &[&str]| args.iter().map(|a| a.to_string()).collect::<Vec<_>>();

        let forwarded = to_args(&["taskforge", "grep", "--", "-f", "patterns.txt"]);
        assert_eq!(extract_file_arg(&forwarded), None);

        let after_task = to_args(&["taskforge", "args", "-f", "x"]);
        assert_eq!(extract_file_arg(&after_task), None);

        let after_flags = to_args(&["taskforge", "-v", "-i", "build", "-f", "x.yml"]);
        assert_eq!(extract_file_arg(&after_flags), Some(PathBuf::from("x.yml")));
    }

    #[test]
    fn test_subcommand_per_task_with_trailing_args() {
        let cmd = build_command(&sample_project());
        let names: Vec<&str> = cmd.get_subcommands().map(|c| c.get_name()).collect();
        assert_eq!(names, vec!["build", "test"]);

        let matches = cmd.get_matches_from(vec!["demo", "test", "--", "--nocapture", "x"]);
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "test");
        let args: Vec<&String> = sub.get_many::<String>("args").unwrap().collect();
        assert_eq!(args, vec!["--nocapture", "x"]);
    }

    #[test]
    fn test_task_description_is_subcommand_about() {
        let cmd = build_command(&sample_project());
        let build = cmd.find_subcommand("build").unwrap();
        let about = build.get_about().map(|s| s.to_string());
        assert_eq!(about, Some("Build everything".to_string()));
    }

    #[test]
    fn test_task_named_help_is_a_subcommand() {
        let mut project = Project::new("demo", "/work/demo");
        project.add_task("help").unwrap().exec("echo help");

        let cmd = build_command(&project);
        cmd.clone().debug_assert();

        let matches = cmd.get_matches_from(vec!["demo", "help"]);
        assert_eq!(matches.subcommand_name(), Some("help"));
    }

    #[test]
    fn test_unknown_task_exits_one() {
        let app = App::from_project(sample_project(), PathBuf::from("taskforge.yml")).unwrap();
        let code = app.run_from(vec!["demo", "deploy"]).unwrap();
        assert_eq!(code, 1);
    }
}
