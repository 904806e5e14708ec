use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{span, Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        level TEXT NOT NULL,
        target TEXT NOT NULL,
        message TEXT NOT NULL,
        fields TEXT,
        span_id TEXT,
        conversation_id TEXT,
        stage TEXT,
        tag TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_logs_conversation ON logs(conversation_id, stage);
    CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);
    CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);";

const COLUMNS: &str =
    "id, timestamp, level, target, message, fields, span_id, conversation_id, stage, tag";

/// A persisted warn-or-worse event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    /// Remaining event fields as a JSON object.
    pub fields: Option<String>,
    pub span_id: Option<String>,
    pub conversation_id: Option<String>,
    pub stage: Option<String>,
    pub tag: Option<String>,
}

impl LogRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            level: row.get(2)?,
            target: row.get(3)?,
            message: row.get(4)?,
            fields: row.get(5)?,
            span_id: row.get(6)?,
            conversation_id: row.get(7)?,
            stage: row.get(8)?,
            tag: row.get(9)?,
        })
    }
}

/// Filters for [`SqliteLogSink::query`]. `target` is a substring match,
/// `since` an inclusive RFC 3339 lower bound.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub target: Option<String>,
    pub conversation_id: Option<String>,
    pub stage: Option<String>,
    pub since: Option<String>,
    pub limit: Option<u32>,
}

impl LogQuery {
    fn to_sql(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clauses = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        let mut filter = |clause: &str, value: String| {
            values.push(Box::new(value));
            clauses.push(format!("{clause} ?{}", values.len()));
        };

        if let Some(level) = &self.level {
            filter("level =", level.clone());
        }
        if let Some(target) = &self.target {
            filter("target LIKE", format!("%{target}%"));
        }
        if let Some(conversation_id) = &self.conversation_id {
            filter("conversation_id =", conversation_id.clone());
        }
        if let Some(stage) = &self.stage {
            filter("stage =", stage.clone());
        }
        if let Some(since) = &self.since {
            filter("timestamp >=", since.clone());
        }

        let mut sql = format!("SELECT {COLUMNS} FROM logs");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", self.limit.unwrap_or(100)));
        (sql, values)
    }
}

/// SQLite table of warn+ events, queryable by conversation and stage.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    /// Open (or create) the database, creating parent directories as needed.
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn write(&self, entry: &PendingLog) {
        let result = self.conn.lock().execute(
            "INSERT INTO logs (timestamp, level, target, message, fields, span_id, conversation_id, stage, tag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.timestamp,
                entry.level,
                entry.target,
                entry.message,
                entry.fields,
                entry.span_id,
                entry.correlation.conversation_id,
                entry.correlation.stage,
                entry.correlation.tag,
            ],
        );
        // Logging from inside the layer would recurse.
        if let Err(e) = result {
            eprintln!("recap-telemetry: dropped log row: {e}");
        }
    }

    /// Matching rows, newest first. Defaults to 100 rows.
    pub fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let (sql, values) = query.to_sql();
        let bound: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(bound.as_slice(), LogRecord::from_row)?;
        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
    }
}

/// A row about to be written.
#[derive(Default)]
struct PendingLog {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Option<String>,
    span_id: Option<String>,
    correlation: Correlation,
}

/// Fields that get their own column instead of living in the JSON blob.
#[derive(Clone, Debug, Default)]
struct Correlation {
    conversation_id: Option<String>,
    stage: Option<String>,
    tag: Option<String>,
}

impl Correlation {
    fn slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "conversation_id" => Some(&mut self.conversation_id),
            "stage" => Some(&mut self.stage),
            "tag" => Some(&mut self.tag),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        self.conversation_id.is_none() && self.stage.is_none() && self.tag.is_none()
    }

    /// Keep our values and take the rest from `outer`.
    fn or(mut self, outer: &Correlation) -> Self {
        self.conversation_id = self.conversation_id.or_else(|| outer.conversation_id.clone());
        self.stage = self.stage.or_else(|| outer.stage.clone());
        self.tag = self.tag.or_else(|| outer.tag.clone());
        self
    }
}

/// Collects an event's (or span's) fields.
#[derive(Default)]
struct Collected {
    message: Option<String>,
    extra: Map<String, Value>,
    correlation: Correlation,
}

impl Collected {
    fn text(&mut self, field: &Field, text: String) {
        let name = field.name();
        if name == "message" {
            self.message = Some(text);
        } else if let Some(slot) = self.correlation.slot(name) {
            *slot = Some(text);
        } else {
            self.extra.insert(name.to_string(), Value::String(text));
        }
    }

    fn value(&mut self, field: &Field, value: Value) {
        self.extra.insert(field.name().to_string(), value);
    }
}

impl Visit for Collected {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `%display` values arrive here too; strip the quotes Debug adds to strings.
        let rendered = format!("{value:?}");
        let text = rendered
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .map(str::to_string)
            .unwrap_or(rendered);
        self.text(field, text);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.text(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.value(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = Number::from_f64(value) {
            self.value(field, Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.value(field, Value::Bool(value));
    }
}

/// Span extension carrying correlation fields down to child events.
struct SpanCorrelation(Correlation);

/// Layer that persists WARN and ERROR events, tagged with the
/// conversation, stage and processor tag of the enclosing spans.
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut collected = Collected::default();
        attrs.record(&mut collected);
        if collected.correlation.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanCorrelation(collected.correlation));
        }
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let mut collected = Collected::default();
        values.record(&mut collected);
        if collected.correlation.is_empty() {
            return;
        }
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        let merged = match extensions.remove::<SpanCorrelation>() {
            Some(SpanCorrelation(existing)) => collected.correlation.or(&existing),
            None => collected.correlation,
        };
        extensions.insert(SpanCorrelation(merged));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }

        let mut collected = Collected::default();
        event.record(&mut collected);

        let mut correlation = collected.correlation;
        let mut span_id = None;
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                span_id.get_or_insert_with(|| format!("{:?}", span.id()));
                if let Some(SpanCorrelation(outer)) = span.extensions().get::<SpanCorrelation>() {
                    correlation = correlation.or(outer);
                }
            }
        }

        let fields = (!collected.extra.is_empty())
            .then(|| serde_json::to_string(&collected.extra).ok())
            .flatten();

        self.sink.write(&PendingLog {
            timestamp: Utc::now().to_rfc3339(),
            level: level.as_str().to_string(),
            target: event.metadata().target().to_string(),
            message: collected.message.unwrap_or_default(),
            fields,
            span_id,
            correlation,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn open() -> (tempfile::TempDir, Arc<SqliteLogSink>) {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteLogSink::new(&dir.path().join("database/logs.db")).unwrap();
        (dir, Arc::new(sink))
    }

    fn warning(timestamp: &str, message: &str) -> PendingLog {
        PendingLog {
            timestamp: timestamp.into(),
            level: "WARN".into(),
            target: "recap_engine".into(),
            message: message.into(),
            ..Default::default()
        }
    }

    fn in_conversation(conversation_id: &str, stage: &str, entry: PendingLog) -> PendingLog {
        PendingLog {
            correlation: Correlation {
                conversation_id: Some(conversation_id.into()),
                stage: Some(stage.into()),
                tag: None,
            },
            ..entry
        }
    }

    #[test]
    fn open_creates_parent_directories() {
        let (dir, sink) = open();
        assert!(dir.path().join("database").is_dir());
        assert_eq!(sink.count().unwrap(), 0);
    }

    #[test]
    fn filters_by_level() {
        let (_dir, sink) = open();
        sink.write(&warning("2026-02-14T12:00:00Z", "retrying"));
        sink.write(&PendingLog {
            level: "ERROR".into(),
            ..warning("2026-02-14T12:00:01Z", "generation failed")
        });

        let errors = sink
            .query(&LogQuery {
                level: Some("ERROR".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "generation failed");
    }

    #[test]
    fn filters_by_conversation_and_stage() {
        let (_dir, sink) = open();
        sink.write(&in_conversation(
            "chat_a",
            "dispatching",
            warning("2026-02-14T12:00:00Z", "processor timed out"),
        ));
        sink.write(&in_conversation(
            "chat_a",
            "generating",
            warning("2026-02-14T12:00:01Z", "retrying"),
        ));
        sink.write(&in_conversation(
            "chat_b",
            "dispatching",
            warning("2026-02-14T12:00:02Z", "other chat"),
        ));

        let chat_a = LogQuery {
            conversation_id: Some("chat_a".into()),
            ..Default::default()
        };
        assert_eq!(sink.query(&chat_a).unwrap().len(), 2);

        let dispatching = sink
            .query(&LogQuery {
                stage: Some("dispatching".into()),
                ..chat_a
            })
            .unwrap();
        assert_eq!(dispatching.len(), 1);
        assert_eq!(dispatching[0].message, "processor timed out");
    }

    #[test]
    fn target_is_a_substring_match() {
        let (_dir, sink) = open();
        sink.write(&PendingLog {
            target: "recap_llm::reliable".into(),
            ..warning("2026-02-14T12:00:00Z", "backing off")
        });
        sink.write(&warning("2026-02-14T12:00:01Z", "out of order"));

        let rows = sink
            .query(&LogQuery {
                target: Some("llm".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "backing off");
    }

    #[test]
    fn newest_first_with_limit_and_since() {
        let (_dir, sink) = open();
        for i in 0..10 {
            sink.write(&warning(&format!("2026-02-14T12:00:{i:02}Z"), &format!("msg {i}")));
        }

        let latest = sink
            .query(&LogQuery {
                limit: Some(3),
                ..Default::default()
            })
            .unwrap();
        let messages: Vec<_> = latest.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["msg 9", "msg 8", "msg 7"]);

        let recent = sink
            .query(&LogQuery {
                since: Some("2026-02-14T12:00:08Z".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn query_without_filters_has_no_where_clause() {
        let (sql, values) = LogQuery::default().to_sql();
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with("LIMIT 100"));
        assert!(values.is_empty());
    }

    #[test]
    fn layer_persists_warn_with_span_correlation() {
        let (_dir, sink) = open();
        let subscriber = tracing_subscriber::registry().with(SqliteLogLayer::new(sink.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let outer = tracing::info_span!("summarize", conversation_id = "chat_42");
            let _outer = outer.enter();
            tracing::info!("not persisted");

            let inner = tracing::info_span!("dispatch", stage = "dispatching");
            let _inner = inner.enter();
            tracing::warn!(tag = "sports_reference", elapsed_ms = 31u64, "processor unavailable");
        });

        let rows = sink.query(&LogQuery::default()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.level, "WARN");
        assert_eq!(row.message, "processor unavailable");
        assert_eq!(row.conversation_id.as_deref(), Some("chat_42"));
        assert_eq!(row.stage.as_deref(), Some("dispatching"));
        assert_eq!(row.tag.as_deref(), Some("sports_reference"));
        assert_eq!(row.fields.as_deref(), Some(r#"{"elapsed_ms":31}"#));
        assert!(row.span_id.is_some());
    }

    #[test]
    fn layer_picks_up_recorded_span_fields() {
        let (_dir, sink) = open();
        let subscriber = tracing_subscriber::registry().with(SqliteLogLayer::new(sink.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!(
                "summarize",
                conversation_id = "chat_7",
                stage = tracing::field::Empty
            );
            let _guard = span.enter();
            span.record("stage", "generating");
            tracing::error!("generation failed");
        });

        let rows = sink.query(&LogQuery::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].level, "ERROR");
        assert_eq!(rows[0].conversation_id.as_deref(), Some("chat_7"));
        assert_eq!(rows[0].stage.as_deref(), Some("generating"));
    }

    #[test]
    fn display_fields_lose_debug_quotes() {
        let (_dir, sink) = open();
        let subscriber = tracing_subscriber::registry().with(SqliteLogLayer::new(sink.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let conversation = String::from("-100123");
            tracing::warn!(conversation_id = ?conversation, "out of order");
        });

        let rows = sink.query(&LogQuery::default()).unwrap();
        assert_eq!(rows[0].conversation_id.as_deref(), Some("-100123"));
    }
}
