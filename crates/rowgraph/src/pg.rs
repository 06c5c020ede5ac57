//! Postgres driver over `tokio-postgres`.
//!
//! Each [`PgConnection`] owns a current-thread tokio runtime and blocks the calling
//! thread on it for every call, so the rest of the crate stays synchronous.

use crate::client::{ColumnMeta, Connection, ConnectionFactory, Cursor, ResultSet};
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::transaction::TransactionOptions;
use crate::value::Value;
use bytes::BytesMut;
use std::error::Error;
use tokio::runtime::{Builder, Runtime};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls, Row, Statement};

/// Opens Postgres connections from a parsed configuration.
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: tokio_postgres::Config,
}

impl PgConnector {
    pub fn new(config: &DatabaseConfig) -> OrmResult<Self> {
        let mut pg: tokio_postgres::Config = config
            .url
            .parse()
            .map_err(|e| OrmError::Config(format!("invalid database url: {e}")))?;
        if let Some(name) = &config.application_name {
            pg.application_name(name);
        }
        if let Some(timeout) = config.connect_timeout_duration() {
            pg.connect_timeout(timeout);
        }
        Ok(Self { config: pg })
    }

    pub fn from_url(url: &str) -> OrmResult<Self> {
        Self::new(&DatabaseConfig::new(url))
    }

    /// Open one blocking connection.
    pub fn open(&self) -> OrmResult<PgConnection> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| OrmError::Connection(format!("failed to start runtime: {e}")))?;
        let (client, connection) = runtime
            .block_on(self.config.connect(NoTls))
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres connection closed with error");
            }
        });
        Ok(PgConnection { client, runtime })
    }
}

impl ConnectionFactory for PgConnector {
    fn connect(&self) -> OrmResult<Box<dyn Connection>> {
        Ok(Box::new(self.open()?))
    }
}

/// One blocking Postgres connection.
pub struct PgConnection {
    // Dropped before the runtime that drives it.
    client: Client,
    runtime: Runtime,
}

fn as_params(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

fn has_returning(sql: &str) -> bool {
    sql.to_ascii_uppercase().contains("RETURNING")
}

impl PgConnection {
    fn prepare(&self, sql: &str) -> OrmResult<Statement> {
        self.runtime
            .block_on(self.client.prepare(sql))
            .map_err(OrmError::from_db_error)
    }

    fn run(&self, sql: &str) -> OrmResult<()> {
        self.runtime
            .block_on(self.client.batch_execute(sql))
            .map_err(OrmError::from_db_error)
    }
}

impl Connection for PgConnection {
    fn begin(&mut self, options: &TransactionOptions) -> OrmResult<()> {
        self.run(&options.begin_sql())
    }

    fn commit(&mut self) -> OrmResult<()> {
        self.run("COMMIT")
    }

    fn rollback(&mut self) -> OrmResult<()> {
        self.run("ROLLBACK")
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> OrmResult<Box<dyn Cursor>> {
        let stmt = self.prepare(sql)?;
        let columns: Vec<ColumnMeta> = stmt
            .columns()
            .iter()
            .map(|c| ColumnMeta::new(c.name(), c.type_().name()))
            .collect();
        let rows = self
            .runtime
            .block_on(self.client.query(&stmt, &as_params(params)))
            .map_err(OrmError::from_db_error)?;
        let values = rows
            .iter()
            .map(decode_row)
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Box::new(ResultSet::new(columns, values)))
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let stmt = self.prepare(sql)?;
        self.runtime
            .block_on(self.client.execute(&stmt, &as_params(params)))
            .map_err(OrmError::from_db_error)
    }

    fn execute_returning(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Value>> {
        if !has_returning(sql) {
            self.execute(sql, params)?;
            return Ok(Vec::new());
        }
        let stmt = self.prepare(sql)?;
        let rows = self
            .runtime
            .block_on(self.client.query(&stmt, &as_params(params)))
            .map_err(OrmError::from_db_error)?;
        rows.iter()
            .map(|row| decode_cell(row, 0))
            .collect()
    }

    fn execute_batch(&mut self, sql: &str, batches: &[Vec<Value>]) -> OrmResult<Vec<u64>> {
        let stmt = self.prepare(sql)?;
        batches
            .iter()
            .map(|params| {
                self.runtime
                    .block_on(self.client.execute(&stmt, &as_params(params)))
                    .map_err(OrmError::from_db_error)
            })
            .collect()
    }
}

fn decode_row(row: &Row) -> OrmResult<Vec<Value>> {
    (0..row.len()).map(|idx| decode_cell(row, idx)).collect()
}

fn get<'a, T>(row: &'a Row, idx: usize) -> OrmResult<Option<T>>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        let column = row.columns()[idx].name();
        OrmError::decode(column, e.to_string())
    })
}

fn decode_cell(row: &Row, idx: usize) -> OrmResult<Value> {
    let ty = row.columns()[idx].type_().clone();
    let value = match ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::Int),
        Type::OID => get::<u32>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Value::Float),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, idx)?.map(Value::Text)
        }
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        Type::DATE => get::<chrono::NaiveDate>(row, idx)?.map(Value::Date),
        Type::TIME => get::<chrono::NaiveTime>(row, idx)?.map(Value::Time),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => {
            get::<chrono::DateTime<chrono::Utc>>(row, idx)?.map(Value::TimestampTz)
        }
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(Value::Uuid),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx)?.map(Value::Json),
        other => {
            return Err(OrmError::decode(
                row.columns()[idx].name(),
                format!("unsupported column type {}; cast it in SQL", other.name()),
            ));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::OID => u32::try_from(*v)?.to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Text(v) => v.to_sql(ty, out),
            Value::Bytes(v) => v.as_slice().to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::Time(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => v.to_sql(ty, out),
            Value::TimestampTz(v) => v.to_sql(ty, out),
            Value::Uuid(v) => v.to_sql(ty, out),
            Value::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_returning_clause() {
        assert!(has_returning("INSERT INTO t (a) VALUES ($1) returning id"));
        assert!(!has_returning("UPDATE t SET a = $1"));
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(PgConnector::from_url("postgres://user@host:notaport/db").is_err());
        assert!(PgConnector::from_url("postgres://localhost/app").is_ok());
    }

    #[test]
    fn narrows_ints_to_column_type() {
        let mut out = BytesMut::new();
        Value::Int(7).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(&out[..], &7_i32.to_be_bytes());

        let mut out = BytesMut::new();
        assert!(Value::Int(i64::MAX).to_sql(&Type::INT2, &mut out).is_err());

        let mut out = BytesMut::new();
        assert!(matches!(
            Value::Null.to_sql(&Type::TEXT, &mut out).unwrap(),
            IsNull::Yes
        ));
    }
}
