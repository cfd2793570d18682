use super::*;
use crate::error::{PlanError, PlanResult};
use crate::exec::Executor;
use crate::plan::QueryKind;
use crate::render::RenderedQuery;
use crate::row::Row;
use crate::testing::MockExecutor;
use crate::value::Params;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn rendered(kind: QueryKind, sql: &str) -> RenderedQuery {
    RenderedQuery {
        sql: sql.to_string(),
        params: vec!["id".to_string()],
        table: "users".to_string(),
        kind,
    }
}

fn ctx(kind: QueryKind, sql: &str) -> QueryContext {
    QueryContext::new(&rendered(kind, sql))
}

/// Records event names in order.
#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl EventLog {
    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl QueryMonitor for EventLog {
    fn on_query_start(&self, ctx: &QueryContext) {
        self.0.lock().unwrap().push(format!("start {}", ctx.kind));
    }
    fn on_query_complete(&self, _: &QueryContext, _: Duration, result: &QueryResult) {
        self.0.lock().unwrap().push(format!("complete {result}"));
    }
    fn on_query_failed(&self, _: &QueryContext, _: Duration, _: &PlanError) {
        self.0.lock().unwrap().push("failed".to_string());
    }
    fn on_slow_query(&self, _: &QueryContext, _: Duration) {
        self.0.lock().unwrap().push("slow".to_string());
    }
}

struct SleepyExecutor(Duration);

impl Executor for SleepyExecutor {
    async fn query(&self, _: &RenderedQuery, _: &Params) -> PlanResult<Vec<Row>> {
        tokio::time::sleep(self.0).await;
        Ok(vec![])
    }
    async fn execute(&self, _: &RenderedQuery, _: &Params) -> PlanResult<u64> {
        tokio::time::sleep(self.0).await;
        Ok(1)
    }
}

#[test]
fn context_carries_plan_metadata() {
    let c = ctx(QueryKind::Update, "UPDATE \"users\" SET \"name\" = :name WHERE \"id\" = :id")
        .with_tag("rename");
    assert_eq!(c.table, "users");
    assert_eq!(c.kind, QueryKind::Update);
    assert_eq!(c.param_count, 1);
    assert_eq!(c.tag.as_deref(), Some("rename"));
}

#[test]
fn truncation_respects_char_boundaries() {
    assert_eq!(truncate_sql_bytes("SELECT 1", 100), "SELECT 1");
    assert_eq!(truncate_sql_bytes("SELECT * FROM users", 10), "SELECT * F");
    // 'é' is two bytes; cutting inside it backs off.
    assert_eq!(truncate_sql_bytes("café", 4), "caf");
}

#[test]
fn stats_monitor_counts_kinds_and_failures() {
    let monitor = StatsMonitor::new();
    monitor.on_query_complete(
        &ctx(QueryKind::Select, "SELECT 1"),
        Duration::from_millis(10),
        &QueryResult::Rows(5),
    );
    monitor.on_query_complete(
        &ctx(QueryKind::Insert, "INSERT"),
        Duration::from_millis(30),
        &QueryResult::Affected(1),
    );
    monitor.on_query_failed(
        &ctx(QueryKind::Delete, "DELETE"),
        Duration::from_millis(5),
        &PlanError::Other("boom".into()),
    );
    monitor.on_slow_query(&ctx(QueryKind::Insert, "INSERT"), Duration::from_millis(30));

    let stats = monitor.stats();
    assert_eq!(stats.total_queries, 3);
    assert_eq!(stats.failed_queries, 1);
    assert_eq!(stats.slow_queries, 1);
    assert_eq!(stats.select_count, 1);
    assert_eq!(stats.insert_count, 1);
    assert_eq!(stats.delete_count, 1);
    assert_eq!(stats.update_count, 0);
    assert_eq!(stats.total_duration, Duration::from_millis(45));
    assert_eq!(stats.max_duration, Duration::from_millis(30));
    assert_eq!(stats.slowest_query.as_deref(), Some("INSERT"));

    monitor.reset();
    assert_eq!(monitor.stats(), QueryStats::default());
}

#[test]
fn stats_monitor_saturates_total_duration() {
    let monitor = StatsMonitor::new();
    let c = ctx(QueryKind::Select, "SELECT 1");
    monitor.on_query_complete(&c, Duration::MAX, &QueryResult::Rows(0));
    monitor.on_query_complete(&c, Duration::from_secs(1), &QueryResult::Rows(0));
    assert_eq!(
        monitor.stats().total_duration,
        Duration::from_nanos(u64::MAX)
    );
}

#[test]
fn composite_monitor_fans_out_in_order() {
    let a = Arc::new(EventLog::default());
    let b = Arc::new(EventLog::default());
    let composite = CompositeMonitor::new().add_arc(a.clone()).add_arc(b.clone());
    assert_eq!(composite.len(), 2);

    let c = ctx(QueryKind::Select, "SELECT 1");
    composite.on_query_start(&c);
    composite.on_query_complete(&c, Duration::ZERO, &QueryResult::Rows(2));

    assert_eq!(a.events(), vec!["start SELECT", "complete 2 rows"]);
    assert_eq!(a.events(), b.events());
}

#[tokio::test]
async fn instrumented_reports_start_and_complete() {
    let log = Arc::new(EventLog::default());
    let exec = InstrumentedExecutor::new(MockExecutor::new().with_affected(3))
        .with_config(MonitorConfig::new().enable_monitoring())
        .with_monitor_arc(log.clone());

    let n = exec
        .execute(&rendered(QueryKind::Update, "UPDATE"), &Params::new())
        .await
        .unwrap();
    assert_eq!(n, 3);
    assert_eq!(log.events(), vec!["start UPDATE", "complete 3 affected"]);
}

#[tokio::test]
async fn instrumented_reports_failures() {
    let log = Arc::new(EventLog::default());
    let exec = InstrumentedExecutor::new(
        MockExecutor::new().with_error(PlanError::UniqueViolation("users_email_key".into())),
    )
    .with_config(MonitorConfig::new().enable_monitoring())
    .with_monitor_arc(log.clone());

    let err = exec
        .query(&rendered(QueryKind::Insert, "INSERT"), &Params::new())
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(log.events(), vec!["start INSERT", "failed"]);
}

#[tokio::test]
async fn tagged_statements_reach_monitor_and_inner_executor() {
    #[derive(Default)]
    struct TagCapture(Mutex<Option<String>>);

    impl QueryMonitor for TagCapture {
        fn on_query_complete(&self, ctx: &QueryContext, _: Duration, _: &QueryResult) {
            *self.0.lock().unwrap() = ctx.tag.clone();
        }
    }

    let capture = Arc::new(TagCapture::default());
    let exec = InstrumentedExecutor::new(MockExecutor::new())
        .with_config(MonitorConfig::new().enable_monitoring())
        .with_monitor_arc(capture.clone());

    exec.query_tagged("active-users", &rendered(QueryKind::Select, "SELECT 1"), &Params::new())
        .await
        .unwrap();

    assert_eq!(capture.0.lock().unwrap().as_deref(), Some("active-users"));
    assert_eq!(exec.inner().calls()[0].tag.as_deref(), Some("active-users"));
}

#[tokio::test]
async fn disabled_monitoring_skips_monitor() {
    struct FailMonitor;
    impl QueryMonitor for FailMonitor {
        fn on_query_start(&self, _: &QueryContext) {
            panic!("should not be called when monitoring is disabled");
        }
        fn on_query_complete(&self, _: &QueryContext, _: Duration, _: &QueryResult) {
            panic!("should not be called when monitoring is disabled");
        }
    }

    let exec = InstrumentedExecutor::new(MockExecutor::new()).with_monitor(FailMonitor);
    assert!(!exec.config().monitoring_enabled);
    exec.query(&rendered(QueryKind::Select, "SELECT 1"), &Params::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn timeout_fails_with_timeout_error() {
    let log = Arc::new(EventLog::default());
    let exec = InstrumentedExecutor::new(SleepyExecutor(Duration::from_secs(60)))
        .with_config(
            MonitorConfig::new()
                .with_query_timeout(Duration::from_millis(10))
                .enable_monitoring(),
        )
        .with_monitor_arc(log.clone());

    let err = exec
        .query(&rendered(QueryKind::Select, "SELECT pg_sleep(60)"), &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::Timeout(d) if d == Duration::from_millis(10)));
    assert!(err.is_timeout());
    assert_eq!(log.events(), vec!["start SELECT", "failed"]);
}

#[tokio::test]
async fn slow_statements_trigger_on_slow_query() {
    let log = Arc::new(EventLog::default());
    let exec = InstrumentedExecutor::new(SleepyExecutor(Duration::from_millis(50)))
        .with_config(
            MonitorConfig::new()
                .with_slow_query_threshold(Duration::from_millis(10))
                .enable_monitoring(),
        )
        .with_monitor_arc(log.clone());

    exec.execute(&rendered(QueryKind::Delete, "DELETE"), &Params::new())
        .await
        .unwrap();
    assert_eq!(
        log.events(),
        vec!["start DELETE", "complete 1 affected", "slow"]
    );
}
