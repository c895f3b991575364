use super::*;

use pulse_core::Stage;

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["pulse"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_enrich_defaults() {
    let cli = Cli::try_parse_from(["pulse", "enrich"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Enrich {
            ref stages,
            limit: 100,
            ref records,
            chained: false,
            reprocess: false,
        }) if stages == "sentiment,location,entity,keyword" && records.is_empty()
    ));
}

#[test]
fn parses_enrich_with_stage_list_and_limit() {
    let cli = Cli::try_parse_from([
        "pulse", "enrich", "--stages", "sentiment,keyword", "--limit", "25",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Enrich {
            ref stages,
            limit: 25,
            ..
        }) if stages == "sentiment,keyword"
    ));
}

#[test]
fn parses_enrich_with_repeated_records() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let cli = Cli::try_parse_from([
        "pulse",
        "enrich",
        "--record",
        &a.to_string(),
        "--record",
        &b.to_string(),
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Enrich { ref records, .. }) if *records == vec![a, b]
    ));
}

#[test]
fn parses_enrich_chained_reprocess_flags() {
    let cli = Cli::try_parse_from(["pulse", "enrich", "--chained", "--reprocess"])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Enrich {
            chained: true,
            reprocess: true,
            ..
        })
    ));
}

#[test]
fn rejects_malformed_record_id() {
    assert!(Cli::try_parse_from(["pulse", "enrich", "--record", "not-a-uuid"]).is_err());
}

#[test]
fn parses_job_list_default_limit() {
    let cli = Cli::try_parse_from(["pulse", "job", "list"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Job {
            command: JobCommands::List { limit: 20 }
        })
    ));
}

#[test]
fn parses_job_status_with_id() {
    let id = Uuid::new_v4();
    let cli = Cli::try_parse_from(["pulse", "job", "status", &id.to_string()])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Job {
            command: JobCommands::Status { id: parsed }
        }) if parsed == id
    ));
}

#[test]
fn parses_record_status_with_stage_filter() {
    let id = Uuid::new_v4();
    let cli = Cli::try_parse_from(["pulse", "record", "status", &id.to_string(), "--stage", "entity"])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Record {
            command: RecordCommands::Status {
                stage: Some(Stage::Entity),
                ..
            }
        })
    ));
}

#[test]
fn record_result_requires_a_stage() {
    let id = Uuid::new_v4();
    assert!(Cli::try_parse_from(["pulse", "record", "result", &id.to_string()]).is_err());

    let cli = Cli::try_parse_from([
        "pulse",
        "record",
        "result",
        &id.to_string(),
        "--stage",
        "keyword",
    ])
    .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Record {
            command: RecordCommands::Result {
                stage: Stage::Keyword,
                ..
            }
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli = Cli::try_parse_from(["pulse", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["pulse", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}
