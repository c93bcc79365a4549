//! End-to-end polling cycles against the mock driver.

use std::sync::Arc;
use std::time::Duration;

use pgmon_core::collector::mock::{MockConnector, MockResultSet, RecordingSink};
use pgmon_core::collector::ThreadExecutor;
use pgmon_core::metrics::{HEART_BEAT, MetricWriter};
use pgmon_core::{MetricRecord, Monitor, MonitorConfig};
use pretty_assertions::assert_eq;

const STATS: &str = "SELECT datname, numbackends FROM pg_stat_database";
const SIZES: &str = "SELECT datname, pg_database_size(datname) / 1024 AS size FROM pg_database";

const CONFIG: &str = r#"
metricPrefix: "Custom Metrics|PostgreSQL"
numberOfThreads: 2
servers:
  - displayName: "Local"
    host: "localhost"
    port: "5432"
    user: "postgres"
    password: "secret"
    databases:
      - dbName: "Test DB"
        queries:
          - name: "stats"
            serverLvlQuery: "false"
            queryStmt: "SELECT datname, numbackends FROM pg_stat_database"
            columns:
              - name: "datname"
                type: "metricPath"
              - name: "numbackends"
                type: "metricValue"
                alias: "Connections"
      - dbName: "postgres"
        queries:
          - serverLvlQuery: true
            queryStmt: "SELECT datname, pg_database_size(datname) / 1024 AS size FROM pg_database"
            columns:
              - name: "datname"
                type: "metricPath"
              - name: "size"
                type: "metricValue"
                alias: "Database Size (KB)"
  - displayName: "Broken"
    host: "db.example.com"
    user: "postgres"
    databases:
      - dbName: "postgres"
"#;

fn pool(threads: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .unwrap()
}

fn sorted_paths(records: &[MetricRecord]) -> Vec<String> {
    let mut paths: Vec<String> = records.iter().map(MetricRecord::path).collect();
    paths.sort();
    paths
}

#[test]
fn single_row_yields_one_metric_under_database_and_query() {
    let config = MonitorConfig::from_yaml(CONFIG).unwrap();
    let connector = MockConnector::new()
        .with_result(
            STATS,
            MockResultSet::new(&["datname", "numbackends"]).row(&[Some("Test DB"), Some("20")]),
        )
        .with_result(SIZES, MockResultSet::new(&["datname", "size"]));
    let sink = Arc::new(RecordingSink::new());
    let monitor = Monitor::new(Arc::new(connector), sink.clone(), Arc::new(pool(2)))
        .with_metric_prefix(&config.metric_prefix);

    let summary = monitor.run_cycle(config.server_specs());

    // "Broken" has no port.
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.servers.len(), 1);
    assert!(summary.servers[0].alive);

    let data: Vec<MetricRecord> = sink
        .records()
        .into_iter()
        .filter(|m| m.name() != HEART_BEAT)
        .collect();
    assert_eq!(data.len(), 1);
    // metricPath values are appended after the query name, so the `datname`
    // column repeats the database name in the path.
    assert_eq!(
        data[0].tokens(),
        &["Local", "Test DB", "stats", "Test DB", "Connections"]
    );
    assert_eq!(data[0].value(), "20");
    assert_eq!(data[0].column(), "numbackends");
}

#[test]
fn two_databases_with_two_rows_each_complete_before_heart_beat() {
    let config = MonitorConfig::from_yaml(CONFIG).unwrap();
    let connector = MockConnector::new()
        .with_result(
            STATS,
            MockResultSet::new(&["datname", "numbackends"])
                .row(&[Some("a"), Some("1")])
                .row(&[Some("b"), Some("2")]),
        )
        .with_result(
            SIZES,
            MockResultSet::new(&["datname", "size"])
                .row(&[Some("a"), Some("100")])
                .row(&[Some("b"), Some("200")]),
        )
        .with_delay("Test DB", Duration::from_millis(80));
    let sink = Arc::new(RecordingSink::new());
    let monitor = Monitor::new(Arc::new(connector), sink.clone(), Arc::new(pool(2)));

    let summary = monitor.run_cycle(config.server_specs());
    assert_eq!(summary.servers[0].submitted, 2);
    assert!(summary.servers[0].completed);

    let batches = sink.batches();
    assert_eq!(batches.len(), 3);
    let heart_beat = &batches[2];
    assert_eq!(heart_beat.len(), 1);
    assert_eq!(heart_beat[0].path(), "Custom Metrics|PostgreSQL|Local|HEART_BEAT");
    assert_eq!(heart_beat[0].value(), "1");

    let all = sink.records();
    assert_eq!(
        sorted_paths(&all),
        vec![
            "Custom Metrics|PostgreSQL|Local|HEART_BEAT",
            "Custom Metrics|PostgreSQL|Local|Test DB|stats|a|Connections",
            "Custom Metrics|PostgreSQL|Local|Test DB|stats|b|Connections",
            "Custom Metrics|PostgreSQL|Local|a|Database Size (KB)",
            "Custom Metrics|PostgreSQL|Local|b|Database Size (KB)",
        ]
    );
    assert_eq!(sink.completed_cycles(), 1);
}

#[test]
fn metric_count_equals_non_null_value_cells() {
    let config = MonitorConfig::from_yaml(CONFIG).unwrap();
    let connector = MockConnector::new()
        .with_result(
            STATS,
            MockResultSet::new(&["datname", "numbackends"])
                .row(&[Some("a"), Some("1")])
                .row(&[Some("b"), None])
                .row(&[None, Some("3")]),
        )
        .with_result(
            SIZES,
            MockResultSet::new(&["datname", "size"]).row(&[Some("a"), None]),
        );
    let sink = Arc::new(RecordingSink::new());
    let monitor = Monitor::new(Arc::new(connector), sink.clone(), Arc::new(ThreadExecutor));

    monitor.run_cycle(config.server_specs());

    let data = sink
        .records()
        .into_iter()
        .filter(|m| m.name() != HEART_BEAT)
        .count();
    assert_eq!(data, 2);
}

#[test]
fn unreachable_databases_report_dead_server() {
    let config = MonitorConfig::from_yaml(CONFIG).unwrap();
    let connector = MockConnector::new().refuse("Test DB").invalid("postgres");
    let sink = Arc::new(RecordingSink::new());
    let monitor = Monitor::new(Arc::new(connector), sink.clone(), Arc::new(pool(1)));

    let summary = monitor.run_cycle(config.server_specs());

    assert_eq!(summary.alive(), 0);
    let batches = sink.batches();
    // Each database still publishes its (empty) batch.
    assert_eq!(batches.len(), 3);
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value(), "0");
}

#[test]
fn connections_carry_credentials_and_read_only_session() {
    let config = MonitorConfig::from_yaml(CONFIG).unwrap();
    let connector = Arc::new(MockConnector::new());
    let monitor = Monitor::new(connector.clone(), Arc::new(RecordingSink::new()), Arc::new(pool(2)));

    monitor.run_cycle(config.server_specs());

    let mut descriptors = connector.descriptors();
    descriptors.sort_by(|a, b| a.database().cmp(b.database()));
    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[0].url(), "postgresql://localhost:5432/Test DB");
    assert_eq!(descriptors[1].url(), "postgresql://localhost:5432/postgres");
    let props = descriptors[0].properties();
    assert_eq!(props.get("user").map(String::as_str), Some("postgres"));
    assert_eq!(props.get("password").map(String::as_str), Some("secret"));
    assert_eq!(props.get("application_name").map(String::as_str), Some("pgmond"));
    assert!(!format!("{:?}", descriptors[0]).contains("secret"));
    assert_eq!(connector.open(), 0);
}

#[test]
fn writer_sink_renders_machine_agent_lines() {
    let config = MonitorConfig::from_yaml(CONFIG).unwrap();
    let connector = MockConnector::new()
        .with_result(
            STATS,
            MockResultSet::new(&["datname", "numbackends"]).row(&[Some("x"), Some("7")]),
        )
        .with_result(SIZES, MockResultSet::new(&["datname", "size"]));
    let writer = Arc::new(MetricWriter::new(Vec::<u8>::new()));
    let monitor = Monitor::new(Arc::new(connector), writer.clone(), Arc::new(ThreadExecutor));

    monitor.run_cycle(config.server_specs());
    drop(monitor);

    let writer = Arc::try_unwrap(writer).ok().unwrap();
    let output = String::from_utf8(writer.into_inner()).unwrap();
    let mut lines: Vec<&str> = output.lines().collect();
    lines.sort();
    assert_eq!(
        lines,
        vec![
            "name=Custom Metrics|PostgreSQL|Local|HEART_BEAT,value=1,aggregator=AVERAGE,time-rollup=AVERAGE,cluster-rollup=INDIVIDUAL",
            "name=Custom Metrics|PostgreSQL|Local|Test DB|stats|x|Connections,value=7,aggregator=AVERAGE,time-rollup=AVERAGE,cluster-rollup=INDIVIDUAL",
        ]
    );
}
