//! Integration tests for configuration-driven setup and the command surface

use super::test_utils::{seed_books, settle};
use std::path::Path;
use strata::cli::{Commands, RunContext};
use strata::config::ConfigLoader;
use strata::error::CommandError;
use strata::Stack;
use tempfile::TempDir;

const LIBRARY_SCHEMA: &str = r#"
name = "Library"
version = 1

[[entities]]
name = "Book"

[[entities.attributes]]
name = "title"
kind = "string"

[[entities.attributes]]
name = "pages"
kind = "integer"
optional = true
"#;

/// Workspace with a schema bundle and a config file pointing at a disk store
fn workspace() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("schemas")).unwrap();
    std::fs::write(root.join("schemas").join("Library.schema.toml"), LIBRARY_SCHEMA).unwrap();

    let config_file = root.join("strata.toml");
    std::fs::write(
        &config_file,
        format!(
            "[store]\nmodel = \"Library\"\npath = \"{}\"\n",
            root.join("Library.store").display()
        ),
    )
    .unwrap();
    (dir, config_file)
}

fn stack_from_config(root: &Path, config_file: &Path) -> Stack {
    let config = ConfigLoader::load_from_file(config_file).unwrap();
    let schema = config.store.schema_bundle(root).load(&config.store.model).unwrap();
    Stack::open(schema, config.store.location().unwrap(), config.store.options()).unwrap()
}

#[test]
fn test_stack_from_config_file() {
    let (dir, config_file) = workspace();
    let stack = stack_from_config(dir.path(), &config_file);

    assert_eq!(stack.schema().name, "Library");
    assert_eq!(stack.location().path(), Some(dir.path().join("Library.store").as_path()));
}

#[test]
fn test_info_list_and_reset_commands() {
    let (dir, config_file) = workspace();
    {
        let stack = stack_from_config(dir.path(), &config_file);
        seed_books(&stack, &["Kindred", "Beloved"]);
        settle(&stack);
    }
    strata::queue::main_queue().barrier();

    let run = RunContext::new(dir.path().to_path_buf(), Some(config_file.clone())).unwrap();

    let info = run.execute(&Commands::Info).unwrap();
    assert!(info.contains("Library v1"), "{}", info);
    assert!(info.contains("WAL"), "{}", info);

    let list = run
        .execute(&Commands::List {
            entity: "Book".to_string(),
            sort: Some("title".to_string()),
            desc: false,
            limit: Some(1),
        })
        .unwrap();
    assert!(list.contains("Beloved"), "{}", list);
    assert!(!list.contains("Kindred"), "{}", list);

    let reset = run.execute(&Commands::Reset { yes: true }).unwrap();
    assert!(reset.contains("reset"));

    let list = run
        .execute(&Commands::List {
            entity: "Book".to_string(),
            sort: None,
            desc: false,
            limit: None,
        })
        .unwrap();
    assert_eq!(list, "No Book objects");
}

#[test]
fn test_list_unknown_entity() {
    let (dir, config_file) = workspace();
    let run = RunContext::new(dir.path().to_path_buf(), Some(config_file)).unwrap();
    let err = run
        .execute(&Commands::List {
            entity: "Magazine".to_string(),
            sort: None,
            desc: false,
            limit: None,
        })
        .unwrap_err();
    assert!(matches!(err, CommandError::UnknownEntity(ref name) if name == "Magazine"));
}

#[test]
fn test_missing_schema_is_reported() {
    let (dir, config_file) = workspace();
    std::fs::remove_file(dir.path().join("schemas").join("Library.schema.toml")).unwrap();
    assert!(matches!(
        RunContext::new(dir.path().to_path_buf(), Some(config_file)),
        Err(CommandError::Schema(_))
    ));
}
