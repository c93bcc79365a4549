//! Fan-out of one server poll into per-database tasks.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::Monitor;
use super::context::PollContext;
use super::database_task::DatabaseTask;
use super::join::DynamicJoin;
use crate::config::ServerSpec;
use crate::connection::ConnectionDescriptor;
use crate::error::ConfigError;
use crate::metrics::MetricRecord;

/// Outcome of polling one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub server: String,
    /// Database tasks submitted to the executor.
    pub submitted: usize,
    /// Whether any connection passed its validity probe.
    pub alive: bool,
    /// `false` if the poll deadline expired with tasks still running.
    pub completed: bool,
}

impl Monitor {
    /// Polls every database of `server` concurrently and blocks until all
    /// of them have finished (or the poll deadline, if any, expires).
    ///
    /// Afterwards publishes the server's heart-beat metric.
    pub fn poll_server(&self, server: &ServerSpec) -> Result<PollSummary, ConfigError> {
        info!(server = %server.display_name, "starting metric collection");

        let password = server
            .credential
            .resolve(&server.display_name, self.decryptor.as_deref())?;
        let context = Arc::new(PollContext::new(
            server.display_name.clone(),
            Arc::clone(&self.metric_prefix),
        ));

        let join = DynamicJoin::new();
        let coordinator = join.register();
        let mut submitted = 0;

        debug!(
            server = %server.display_name,
            databases = server.databases.len(),
            "scheduling database tasks"
        );
        for database in &server.databases {
            if database.db_name.trim().is_empty() {
                warn!(server = %server.display_name, "database entry without dbName, skipping");
                continue;
            }

            let descriptor =
                ConnectionDescriptor::for_database(server, &database.db_name, password.as_deref());
            let task = DatabaseTask::new(
                Arc::clone(&context),
                database.clone(),
                descriptor,
                Arc::clone(&self.connector),
                Arc::clone(&self.sink),
                &join,
            );
            let name = format!("pgmon db task - {}", task.db_name());
            self.executor.execute(name, Box::new(move || task.run()));
            submitted += 1;
        }

        let completed = match self.poll_timeout {
            Some(timeout) => coordinator.arrive_and_await_timeout(timeout),
            None => {
                coordinator.arrive_and_await();
                true
            }
        };
        if !completed {
            warn!(
                server = %server.display_name,
                outstanding = join.outstanding(),
                "poll deadline expired with database tasks still running"
            );
        }

        let alive = context.liveness().is_alive();
        self.sink.publish(vec![MetricRecord::heart_beat(
            Arc::clone(&self.metric_prefix),
            &server.display_name,
            alive,
        )]);

        debug!(server = %server.display_name, submitted, alive, "finished metric collection");
        Ok(PollSummary {
            server: server.display_name.clone(),
            submitted,
            alive,
            completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::executor::{InlineExecutor, ThreadExecutor};
    use crate::collector::mock::{MockConnector, MockResultSet, RecordingSink};
    use crate::config::{ColumnDescriptor, Credential, DatabaseSpec, PasswordDecryptor, QuerySpec};
    use crate::connection::PASSWORD;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};

    const STMT: &str = "SELECT datname, numbackends FROM pg_stat_database";

    fn stats_query() -> QuerySpec {
        let columns: Vec<ColumnDescriptor> = serde_yml::from_str(
            "- {name: datname, type: metricPath}\n- {name: numbackends, type: metricValue, alias: Connections}\n",
        )
        .unwrap();
        QuerySpec {
            name: Some("stats".to_string()),
            server_level: false,
            statement: Some(STMT.to_string()),
            columns,
        }
    }

    fn server(databases: &[&str]) -> ServerSpec {
        ServerSpec {
            display_name: "Local".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            credential: Credential::None,
            use_ipv6: false,
            application_name: "test".to_string(),
            properties: BTreeMap::new(),
            databases: databases
                .iter()
                .map(|db| DatabaseSpec {
                    db_name: db.to_string(),
                    queries: vec![stats_query()],
                })
                .collect(),
        }
    }

    fn two_rows() -> MockResultSet {
        MockResultSet::new(&["datname", "numbackends"])
            .row(&[Some("x"), Some("1")])
            .row(&[Some("y"), Some("2")])
    }

    #[test]
    fn waits_for_all_databases_regardless_of_finish_order() {
        let connector = MockConnector::new()
            .with_result(STMT, two_rows())
            .with_delay("slow", Duration::from_millis(100));
        let sink = Arc::new(RecordingSink::new());
        let monitor = Monitor::new(Arc::new(connector), sink.clone(), Arc::new(ThreadExecutor));

        let summary = monitor.poll_server(&server(&["slow", "fast"])).unwrap();

        assert_eq!(summary.submitted, 2);
        assert!(summary.completed);
        assert!(summary.alive);
        // Two database batches then the heart-beat, which is always last.
        let batches = sink.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len() + batches[1].len(), 4);
        assert_eq!(batches[2][0].path(), "Custom Metrics|PostgreSQL|Local|HEART_BEAT");
        assert_eq!(batches[2][0].value(), "1");
    }

    #[test]
    fn inline_executor_does_not_end_the_join_early() {
        let connector = MockConnector::new().with_result(STMT, two_rows());
        let sink = Arc::new(RecordingSink::new());
        let monitor = Monitor::new(Arc::new(connector), sink.clone(), Arc::new(InlineExecutor));

        let summary = monitor.poll_server(&server(&["a", "b", "c"])).unwrap();
        assert_eq!(summary.submitted, 3);
        assert_eq!(sink.batches().len(), 4);
    }

    #[test]
    fn no_valid_databases_completes_without_deadlock() {
        let sink = Arc::new(RecordingSink::new());
        let monitor = Monitor::new(Arc::new(MockConnector::new()), sink.clone(), Arc::new(ThreadExecutor));

        let summary = monitor.poll_server(&server(&["", "  "])).unwrap();

        assert_eq!(summary.submitted, 0);
        assert!(summary.completed);
        assert!(!summary.alive);
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].value(), "0");
    }

    #[test]
    fn one_failing_database_does_not_affect_siblings() {
        let connector = MockConnector::new().with_result(STMT, two_rows()).refuse("down");
        let sink = Arc::new(RecordingSink::new());
        let monitor = Monitor::new(Arc::new(connector), sink.clone(), Arc::new(ThreadExecutor));

        let summary = monitor.poll_server(&server(&["down", "up"])).unwrap();

        assert!(summary.alive);
        let records = sink.records();
        let data: Vec<_> = records.iter().filter(|m| m.name() != "HEART_BEAT").collect();
        assert_eq!(data.len(), 2);
        assert!(data.iter().all(|m| m.tokens()[1] == "up"));
    }

    #[test]
    fn unreachable_server_reports_dead_heart_beat() {
        let connector = MockConnector::new().refuse("a").invalid("b");
        let sink = Arc::new(RecordingSink::new());
        let monitor = Monitor::new(Arc::new(connector), sink.clone(), Arc::new(ThreadExecutor));

        let summary = monitor.poll_server(&server(&["a", "b"])).unwrap();
        assert!(!summary.alive);
        let last = sink.batches().pop().unwrap();
        assert_eq!(last[0].name(), "HEART_BEAT");
        assert_eq!(last[0].value(), "0");
    }

    #[test]
    fn deadline_bounds_the_wait() {
        let connector = MockConnector::new()
            .with_result(STMT, two_rows())
            .with_delay("stuck", Duration::from_millis(500));
        let sink = Arc::new(RecordingSink::new());
        let monitor = Monitor::new(Arc::new(connector), sink.clone(), Arc::new(ThreadExecutor))
            .with_poll_timeout(Some(Duration::from_millis(50)));

        let started = Instant::now();
        let summary = monitor.poll_server(&server(&["stuck"])).unwrap();

        assert!(!summary.completed);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    struct Upper;

    impl PasswordDecryptor for Upper {
        fn decrypt(&self, encrypted: &str, _key: &str) -> Result<String, String> {
            Ok(encrypted.to_uppercase())
        }
    }

    #[test]
    fn decrypted_password_reaches_the_connector() {
        let connector = Arc::new(MockConnector::new().with_result(STMT, two_rows()));
        let sink = Arc::new(RecordingSink::new());
        let monitor = Monitor::new(connector.clone(), sink, Arc::new(InlineExecutor))
            .with_decryptor(Arc::new(Upper));
        let mut spec = server(&["db"]);
        spec.credential = Credential::Encrypted {
            password: "secret".to_string(),
            key: "k".to_string(),
        };

        monitor.poll_server(&spec).unwrap();

        let descriptors = connector.descriptors();
        assert_eq!(
            descriptors[0].properties().get(PASSWORD).map(String::as_str),
            Some("SECRET")
        );
    }

    #[test]
    fn unresolvable_credentials_abort_the_server() {
        let connector = Arc::new(MockConnector::new());
        let sink = Arc::new(RecordingSink::new());
        let monitor = Monitor::new(connector.clone(), sink.clone(), Arc::new(InlineExecutor));
        let mut spec = server(&["db"]);
        spec.credential = Credential::Encrypted {
            password: "secret".to_string(),
            key: "k".to_string(),
        };

        assert!(matches!(monitor.poll_server(&spec), Err(ConfigError::Credentials { .. })));
        assert_eq!(connector.opened(), 0);
        assert!(sink.batches().is_empty());
    }
}
