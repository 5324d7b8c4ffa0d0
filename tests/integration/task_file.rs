//! Task file persistence, validation and selection against files on disk.

use looper::core::{DependencyGraph, TaskFile, TaskStatus, SCHEMA_VERSION};
use looper::orchestration::{StrategyRegistry, TaskSelector};
use looper::Error;

use crate::fixtures::{chain_tasks, diamond_tasks, test_task, TestProject};

const HAND_WRITTEN: &str = r#"{
  "schema_version": 1,
  "project": { "name": "demo" },
  "source_files": ["PLAN.md"],
  "tasks": [
    { "id": "T10", "title": "Ten", "priority": 2, "status": "todo" },
    { "id": "T2", "title": "Two", "priority": 2, "status": "todo", "tags": ["core"] },
    { "id": "T3", "title": "Three", "priority": 1, "status": "blocked", "blockers": ["flaky"] },
    { "id": "T4", "title": "Four", "priority": 1, "status": "todo", "depends_on": ["T3"] }
  ]
}"#;

fn write_raw(project: &TestProject, contents: &str) -> TaskFile {
    std::fs::write(&project.todo_path, contents).unwrap();
    project.load()
}

#[test]
fn test_saved_format_is_two_space_indented_with_newline() {
    let project = TestProject::new(chain_tasks());
    let raw = project.raw();

    assert!(raw.starts_with("{\n  \"schema_version\": 1,\n"));
    assert!(raw.ends_with("}\n"));
    assert!(!raw.ends_with("}\n\n"));
    assert!(raw.contains("\n    {\n      \"id\": \"T1\""));
}

#[test]
fn test_hand_written_file_survives_save() {
    let project = TestProject::new(Vec::new());
    let file = write_raw(&project, HAND_WRITTEN);

    assert_eq!(file.schema_version, SCHEMA_VERSION);
    assert_eq!(file.project.as_ref().and_then(|p| p.name.as_deref()), Some("demo"));
    assert_eq!(file.source_files, vec!["PLAN.md"]);

    file.save(&project.todo_path).unwrap();
    let reloaded = project.load();
    assert_eq!(reloaded, file);
    assert_eq!(reloaded.get_task("T2").unwrap().tags, vec!["core"]);
    // Empty optional fields are omitted.
    assert!(!project.raw().contains("\"details\""));
}

#[test]
fn test_select_task_numeric_ids_and_tiers() {
    let project = TestProject::new(Vec::new());
    let mut file = write_raw(&project, HAND_WRITTEN);

    // T4 waits on blocked T3; T2 sorts before T10 at equal priority.
    assert_eq!(file.select_task().map(|t| t.id.as_str()), Some("T2"));

    file.set_task_status("T2", TaskStatus::Done).unwrap();
    file.set_task_status("T10", TaskStatus::Done).unwrap();
    // Only the blocked tier is left.
    assert_eq!(file.select_task().map(|t| t.id.as_str()), Some("T3"));

    file.set_task_status("T10", TaskStatus::Doing).unwrap();
    assert_eq!(file.select_task().map(|t| t.id.as_str()), Some("T10"));
}

#[test]
fn test_select_task_none_when_all_done() {
    let mut file = TaskFile::new(chain_tasks());
    for id in ["T1", "T2", "T3"] {
        file.set_task_status(id, TaskStatus::Done).unwrap();
    }
    assert!(file.all_done());
    assert!(file.select_task().is_none());
}

#[test]
fn test_validate_reports_every_issue() {
    let project = TestProject::new(Vec::new());
    let file = write_raw(
        &project,
        r#"{
  "schema_version": 2,
  "tasks": [
    { "id": "T1", "title": "", "priority": 9, "status": "todo" },
    { "id": "T1", "title": "again", "priority": 1, "status": "todo" }
  ]
}"#,
    );

    let report = file.validate();
    let paths: Vec<&str> = report.issues.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["schema_version", "tasks[0].title", "tasks[0].priority", "tasks[1].id"]
    );
    assert!(matches!(report.into_result(), Err(Error::Validation(_))));
}

#[test]
fn test_unknown_status_rejected_on_load() {
    let project = TestProject::new(Vec::new());
    std::fs::write(
        &project.todo_path,
        r#"{"schema_version": 1, "tasks": [{"id": "T1", "title": "x", "priority": 1, "status": "paused"}]}"#,
    )
    .unwrap();
    assert!(matches!(
        TaskFile::load(&project.todo_path),
        Err(Error::Json(_))
    ));
}

#[test]
fn test_cycle_path_reported() {
    let file = TaskFile::new(vec![
        test_task("T1").depends_on(["T3"]),
        test_task("T2").depends_on(["T1"]),
        test_task("T3").depends_on(["T2"]),
    ]);
    match file.validate_dependencies() {
        Err(Error::DependencyCycle { cycle }) => {
            assert_eq!(cycle.first(), cycle.last());
            assert_eq!(cycle.len(), 4);
        }
        other => panic!("expected DependencyCycle, got {:?}", other),
    }
}

#[test]
fn test_graph_order_and_dependents() {
    let file = TaskFile::new(diamond_tasks());
    let graph = DependencyGraph::build(&file);
    graph.validate().unwrap();

    let order = graph.topological_order().unwrap();
    let pos = |id: &str| order.iter().position(|o| *o == id).unwrap();
    assert!(pos("T1") < pos("T2"));
    assert!(pos("T3") < pos("T4"));

    let mut dependents = graph.dependents_of("T1");
    dependents.sort();
    assert_eq!(dependents, vec!["T2", "T3"]);
}

#[test]
fn test_ready_selection_by_strategy_name() {
    let file = TaskFile::new(diamond_tasks());
    let registry = StrategyRegistry::with_builtins();

    for name in ["priority", "dependency", "mixed", "no-such-strategy"] {
        let selector = TaskSelector::new(&file, registry.resolve(name));
        let ids: Vec<&str> = selector.select_tasks(0).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["T1"], "strategy {}", name);
    }
    // Unknown names fall back to priority.
    assert_eq!(
        TaskSelector::new(&file, registry.resolve("no-such-strategy")).strategy_name(),
        "priority"
    );
}
