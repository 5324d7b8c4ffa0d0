use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use looper::config::{Config, Strategy};
use looper::core::{DependencyGraph, TaskFile, TaskStatus};
use looper::orchestration::{
    AgentRegistry, RunReport, Scheduler, SchedulerEvent, SchedulerSettings, StrategyRegistry,
    TaskExecutor, TaskSelector,
};
use looper::prompts::TemplateRenderer;
use looper::{Error, Result};

/// Looper - runs a task file to completion through coding agents
#[derive(Parser, Debug)]
#[command(name = "looper")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    LOOPER_DEBUG=1  Enable debug logging (alternative to --debug)\n    RUST_LOG        Override the log filter")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.looper/looper.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Project directory (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    pub dir: Option<PathBuf>,

    /// Task file to use instead of the configured one
    #[arg(long, global = true)]
    pub todo: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Work through the task file (the default)
    Run(RunArgs),

    /// Show the task a sequential run would pick next
    Next,

    /// List tasks whose dependencies are done, in strategy order
    Ready {
        /// Maximum number of tasks to list (0 lists all)
        #[arg(short = 'n', long, default_value_t = 0)]
        limit: i64,

        /// Selection strategy (priority, dependency, mixed)
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Check the task file structure and its dependency graph
    Validate,

    /// Print tasks in dependency order with their dependents
    Graph,

    /// Print the effective configuration
    Config {
        /// Also write it to ~/.looper/config.toml
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    /// Run ready tasks concurrently in batches
    #[arg(short = 'p', long)]
    pub parallel: bool,

    /// Tasks per batch (0 means every ready task)
    #[arg(long)]
    pub max_tasks: Option<usize>,

    /// Agents per task; more than one enables consensus
    #[arg(long)]
    pub agents_per_task: Option<usize>,

    /// Batch ordering strategy (priority, dependency, mixed)
    #[arg(long)]
    pub strategy: Option<String>,

    /// Stop at the first failed task
    #[arg(long)]
    pub fail_fast: bool,

    /// Agent type to run (claude, codex, or one from the config)
    #[arg(short = 'a', long)]
    pub agent: Option<String>,

    /// Iteration cap for sequential runs
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = looper::log::init(cli.debug) {
        if looper::log::is_debug() {
            eprintln!("Debug log: {}", path.display());
        }
    }

    let work_dir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let config = Config::load(&work_dir)?;
    let todo_path = cli
        .todo
        .unwrap_or_else(|| config.todo_path(&work_dir));

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run_loop(config, &work_dir, todo_path, args),
        Command::Next => run_next(&todo_path),
        Command::Ready { limit, strategy } => {
            let name = match strategy {
                Some(name) => name.parse::<Strategy>()?.to_string(),
                None => config.parallel.strategy.clone(),
            };
            run_ready(&todo_path, &name, limit)
        }
        Command::Validate => run_validate(&todo_path),
        Command::Graph => run_graph(&todo_path),
        Command::Config { write } => run_config(&config, write),
    }
}

/// Fold command line overrides into the loaded configuration.
///
/// A `--strategy` value must name a built-in strategy; config-file names
/// still fall back to priority when unknown.
fn apply_overrides(config: &mut Config, args: &RunArgs) -> Result<()> {
    if args.parallel {
        config.parallel.enabled = true;
    }
    if let Some(n) = args.max_tasks {
        config.parallel.max_tasks = n;
    }
    if let Some(n) = args.agents_per_task {
        config.parallel.max_agents_per_task = n;
    }
    if let Some(name) = &args.strategy {
        config.parallel.strategy = name.parse::<Strategy>()?.to_string();
    }
    if args.fail_fast {
        config.parallel.fail_fast = true;
    }
    if let Some(agent) = &args.agent {
        config.agent = agent.clone();
    }
    if let Some(n) = args.max_iterations {
        config.max_iterations = n;
    }
    Ok(())
}

fn run_loop(mut config: Config, work_dir: &Path, todo_path: PathBuf, args: RunArgs) -> Result<()> {
    apply_overrides(&mut config, &args)?;

    let file = TaskFile::load(&todo_path)?;
    file.validate().into_result()?;

    let agents = AgentRegistry::with_builtins();
    let strategies = StrategyRegistry::with_builtins();
    let agent = agents.create(&config.agent, &config.agent_settings(&config.agent, work_dir))?;
    let renderer = Arc::new(TemplateRenderer::load(&config.prompt_dir(work_dir))?);

    let parallel = config.parallel.enabled;
    let agents_per_task = if parallel {
        config.parallel.max_agents_per_task
    } else {
        1
    };
    let executor = Arc::new(TaskExecutor::new(agent, renderer, agents_per_task));
    let settings = SchedulerSettings {
        work_dir: work_dir.to_path_buf(),
        max_tasks: config.parallel.max_tasks,
        fail_fast: config.parallel.fail_fast,
        max_iterations: config.max_iterations,
        loop_delay: Duration::from_secs(config.loop_delay_secs),
    };
    let strategy = strategies.resolve(&config.parallel.strategy);

    info!(
        todo = %todo_path.display(),
        agent = %config.agent,
        parallel,
        "starting run"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                interrupt.cancel();
            }
        });

        let (tx, rx) = mpsc::channel(64);
        let printer = tokio::spawn(print_events(rx));

        let mut scheduler =
            Scheduler::new(file, todo_path, settings, strategy, executor).with_events(tx);
        let outcome = if parallel {
            scheduler.run_parallel(&cancel).await
        } else {
            scheduler.run_sequential(&cancel).await
        };
        // Closes the event channel so the printer drains and exits.
        drop(scheduler);
        let _ = printer.await;
        outcome
    })?;

    print_report(&report);
    report.into_result().map(|_| ())
}

async fn print_events(mut rx: mpsc::Receiver<SchedulerEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SchedulerEvent::TaskStarted { task_id, iteration } => {
                println!("[{}] {} started", iteration, task_id);
            }
            SchedulerEvent::TaskCompleted { task_id, .. } => println!("  {} done", task_id),
            SchedulerEvent::TaskBlocked { task_id, blockers } => {
                println!("  {} blocked", task_id);
                for blocker in blockers {
                    println!("    - {}", blocker);
                }
            }
            SchedulerEvent::TaskFailed { task_id, error } => {
                println!("  {} failed: {}", task_id, error);
            }
            SchedulerEvent::BatchFinished {
                batch,
                ran,
                failed,
                not_run,
            } => {
                println!(
                    "Batch {}: {} ran, {} failed, {} not run",
                    batch, ran, failed, not_run
                );
            }
            SchedulerEvent::AllTasksComplete => println!("All tasks complete."),
        }
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("Run {}", report.run_id);
    println!("  Rounds:    {}", report.rounds);
    println!("  Completed: {}", report.completed.len());
    println!("  Blocked:   {}", report.blocked.len());
    println!("  Skipped:   {}", report.skipped.len());
    println!("  Failed:    {}", report.failures.len());
    if report.not_run > 0 {
        println!("  Not run:   {}", report.not_run);
    }
}

fn run_next(todo_path: &Path) -> Result<()> {
    let file = TaskFile::load(todo_path)?;
    match file.select_task() {
        Some(task) => println!("{} [{}] p{} {}", task.id, task.status, task.priority, task.title),
        None if file.all_done() => println!("All tasks complete."),
        None => println!("No eligible task."),
    }
    Ok(())
}

fn run_ready(todo_path: &Path, strategy: &str, limit: i64) -> Result<()> {
    let file = TaskFile::load(todo_path)?;
    let strategy = StrategyRegistry::with_builtins().resolve(strategy);
    let selector = TaskSelector::new(&file, strategy);
    let tasks = selector.select_tasks(limit);
    println!(
        "{} of {} ready task(s) by {}:",
        tasks.len(),
        selector.count_ready(),
        selector.strategy_name()
    );
    for task in tasks {
        println!("  {} [{}] p{} {}", task.id, task.status, task.priority, task.title);
    }
    Ok(())
}

fn run_validate(todo_path: &Path) -> Result<()> {
    let file = TaskFile::load(todo_path)?;
    let report = file.validate();
    for issue in &report.issues {
        println!("  {}", issue);
    }
    report.into_result()?;
    file.validate_dependencies()?;

    println!(
        "{}: {} task(s), {} done, {} todo, {} blocked",
        todo_path.display(),
        file.tasks.len(),
        file.count_by_status(TaskStatus::Done),
        file.count_by_status(TaskStatus::Todo),
        file.count_by_status(TaskStatus::Blocked)
    );
    Ok(())
}

fn run_graph(todo_path: &Path) -> Result<()> {
    let file = TaskFile::load(todo_path)?;
    let graph = DependencyGraph::build(&file);
    graph.validate()?;
    for id in graph.topological_order()? {
        let status = file
            .get_task(id)
            .map(|t| t.status)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        let dependents = graph.dependents_of(id);
        if dependents.is_empty() {
            println!("{} [{}]", id, status);
        } else {
            println!("{} [{}] -> {}", id, status, dependents.join(", "));
        }
    }
    Ok(())
}

fn run_config(config: &Config, write: bool) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    if write {
        let path = Config::user_config_path()?;
        config.save(&path)?;
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}
