use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{
    AuthSource, DefaultServerParameterProvider, LoginInfo, Password, StartupHandler,
};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::debug;

use crate::engine::{Engine, EngineError, nights};
use crate::model::*;
use crate::observability::{self, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, BookingFilter, Command, SqlError, Table};
use crate::tenant::TenantManager;

// ── Auth ─────────────────────────────────────────────────────────

/// Single shared password for every user and tenant.
#[derive(Debug)]
pub struct InnkeepAuthSource {
    password: String,
}

impl InnkeepAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for InnkeepAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

// ── Query handler ────────────────────────────────────────────────

pub struct InnkeepHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<InnkeepQueryParser>,
}

impl InnkeepHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(InnkeepQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Execute one command, recording its latency and outcome.
    async fn run(&self, engine: &Engine, cmd: Command) -> PgWireResult<Response> {
        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = execute_command(engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }
}

async fn execute_command(engine: &Engine, cmd: Command) -> PgWireResult<Response> {
    match cmd {
        Command::InsertRoom(new_room) => {
            let room = engine.create_room(new_room).await.map_err(engine_err)?;
            room_rows(vec![room])
        }
        Command::UpdateRoom { id, patch } => {
            let room = engine.update_room(id, patch).await.map_err(engine_err)?;
            room_rows(vec![room])
        }
        Command::DeleteRoom { id } => {
            engine.delete_room(id).await.map_err(engine_err)?;
            Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
        }
        Command::SelectRooms { id: Some(id), .. } => {
            let rooms = not_found_as_empty(engine.find_room(id).await.map(|r| vec![r]))?;
            room_rows(rooms)
        }
        Command::SelectRooms { id: None, sort } => room_rows(engine.list_rooms(sort).await),

        Command::InsertBooking(request) => {
            let info = engine.create_booking(request).await.map_err(engine_err)?;
            booking_rows(vec![info])
        }
        Command::UpdateBookingStatus { id, status } => {
            let info = engine.transition_booking(id, status).await.map_err(engine_err)?;
            booking_rows(vec![info])
        }
        Command::DeleteBooking { id } => {
            engine.cancel_booking(id).await.map_err(engine_err)?;
            Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
        }
        Command::SelectBookings(filter) => booking_rows(select_bookings(engine, filter).await?),

        Command::InsertCatalog(record) => {
            let kind = record.kind();
            let record = engine.create_catalog_item(record).await.map_err(engine_err)?;
            catalog_rows(kind, vec![record])
        }
        Command::UpdateCatalog { id, patch } => {
            let kind = patch.kind();
            let record = engine.update_catalog_item(id, patch).await.map_err(engine_err)?;
            catalog_rows(kind, vec![record])
        }
        Command::DeleteCatalog { kind, id } => {
            engine.delete_catalog_item(kind, id).await.map_err(engine_err)?;
            Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
        }
        Command::SelectCatalog { kind, id: Some(id) } => {
            let records =
                not_found_as_empty(engine.get_catalog_item(kind, id).map(|r| vec![r]))?;
            catalog_rows(kind, records)
        }
        Command::SelectCatalog { kind, id: None } => catalog_rows(kind, engine.list_catalog(kind)),
    }
}

async fn select_bookings(engine: &Engine, filter: BookingFilter) -> PgWireResult<Vec<BookingInfo>> {
    match filter {
        BookingFilter::All => Ok(engine.list_bookings().await),
        BookingFilter::ById(id) => not_found_as_empty(engine.get_booking(id).await.map(|b| vec![b])),
        BookingFilter::ByRoom(room_id) => not_found_as_empty(engine.list_room_bookings(room_id).await),
        BookingFilter::Overlapping { room_id, start, end } => {
            let bookings = engine
                .find_overlapping_bookings(room_id, start, end)
                .await
                .map_err(engine_err)?;
            let Some(rs) = engine.get_room_state(&room_id) else {
                return Ok(vec![]);
            };
            let room = rs.read().await.room.clone();
            Ok(bookings
                .into_iter()
                .map(|booking| BookingInfo {
                    booking,
                    room: room.clone(),
                })
                .collect())
        }
    }
}

/// A lookup by key that finds nothing is an empty result set, not an error.
fn not_found_as_empty<T>(result: Result<Vec<T>, EngineError>) -> PgWireResult<Vec<T>> {
    match result {
        Ok(rows) => Ok(rows),
        Err(EngineError::RoomNotFound(_) | EngineError::NotFound { .. }) => Ok(vec![]),
        Err(e) => Err(engine_err(e)),
    }
}

// ── Result schemas ───────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn room_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("room_number", Type::VARCHAR),
        field("type", Type::VARCHAR),
        field("price", Type::FLOAT8),
        field("status", Type::VARCHAR),
    ]
}

fn booking_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("guest_name", Type::VARCHAR),
        field("room_id", Type::INT8),
        field("room_number", Type::VARCHAR),
        field("room_type", Type::VARCHAR),
        field("check_in", Type::VARCHAR),
        field("check_out", Type::VARCHAR),
        field("nights", Type::FLOAT8),
        field("total", Type::FLOAT8),
        field("status", Type::VARCHAR),
    ]
}

fn catalog_schema(kind: CatalogKind) -> Vec<FieldInfo> {
    match kind {
        CatalogKind::MenuItem => vec![
            field("id", Type::INT8),
            field("name", Type::VARCHAR),
            field("category", Type::VARCHAR),
            field("price", Type::FLOAT8),
        ],
        CatalogKind::InventoryItem => vec![
            field("id", Type::INT8),
            field("sku", Type::VARCHAR),
            field("name", Type::VARCHAR),
            field("quantity", Type::INT8),
            field("unit_cost", Type::FLOAT8),
        ],
        CatalogKind::User => vec![
            field("id", Type::INT8),
            field("username", Type::VARCHAR),
            field("role", Type::VARCHAR),
        ],
    }
}

fn table_schema(table: Table) -> Vec<FieldInfo> {
    match table {
        Table::Rooms => room_schema(),
        Table::Bookings => booking_schema(),
        Table::Catalog(kind) => catalog_schema(kind),
    }
}

/// Result columns for a statement that has not been executed yet.
fn describe_schema(sql: &str) -> Vec<FieldInfo> {
    sql::result_table(sql).map(table_schema).unwrap_or_default()
}

/// Ids are small per-tenant sequences; the wire type is INT8.
fn wire_id(id: Id) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

fn room_rows(rooms: Vec<Room>) -> PgWireResult<Response> {
    let schema = Arc::new(room_schema());
    let rows: Vec<PgWireResult<_>> = rooms
        .into_iter()
        .map(|room| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&wire_id(room.id))?;
            encoder.encode_field(&room.room_number)?;
            encoder.encode_field(&room.room_type)?;
            encoder.encode_field(&room.price)?;
            encoder.encode_field(&room.status.to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn booking_rows(bookings: Vec<BookingInfo>) -> PgWireResult<Response> {
    let schema = Arc::new(booking_schema());
    let rows: Vec<PgWireResult<_>> = bookings
        .into_iter()
        .map(|BookingInfo { booking, room }| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&wire_id(booking.id))?;
            encoder.encode_field(&booking.guest_name)?;
            encoder.encode_field(&wire_id(booking.room_id))?;
            encoder.encode_field(&room.room_number)?;
            encoder.encode_field(&room.room_type)?;
            encoder.encode_field(&format_timestamp(booking.check_in()))?;
            encoder.encode_field(&format_timestamp(booking.check_out()))?;
            encoder.encode_field(&nights(&booking.span))?;
            encoder.encode_field(&booking.total)?;
            encoder.encode_field(&booking.status.to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn catalog_rows(kind: CatalogKind, records: Vec<CatalogRecord>) -> PgWireResult<Response> {
    let schema = Arc::new(catalog_schema(kind));
    let rows: Vec<PgWireResult<_>> = records
        .into_iter()
        .map(|record| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            match record {
                CatalogRecord::MenuItem(m) => {
                    encoder.encode_field(&wire_id(m.id))?;
                    encoder.encode_field(&m.name)?;
                    encoder.encode_field(&m.category)?;
                    encoder.encode_field(&m.price)?;
                }
                CatalogRecord::InventoryItem(i) => {
                    encoder.encode_field(&wire_id(i.id))?;
                    encoder.encode_field(&i.sku)?;
                    encoder.encode_field(&i.name)?;
                    encoder.encode_field(&i.quantity)?;
                    encoder.encode_field(&i.unit_cost)?;
                }
                CatalogRecord::User(u) => {
                    encoder.encode_field(&wire_id(u.id))?;
                    encoder.encode_field(&u.username)?;
                    encoder.encode_field(&u.role)?;
                }
            }
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

// ── Simple Query Protocol ────────────────────────────────────────

#[async_trait]
impl SimpleQueryHandler for InnkeepHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let commands = sql::parse_sql(query).map_err(sql_err)?;

        // Statements run in order; the first failure ends the batch and is
        // reported in place of the remaining results.
        let mut responses = Vec::with_capacity(commands.len());
        for cmd in commands {
            match self.run(&engine, cmd).await {
                Ok(response) => responses.push(response),
                Err(PgWireError::UserError(info)) => {
                    debug!("statement failed: {info:?}");
                    responses.push(Response::Error(info));
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(responses)
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct InnkeepQueryParser;

#[async_trait]
impl QueryParser for InnkeepQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(describe_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for InnkeepHandler {
    type Statement = String;
    type QueryParser = InnkeepQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let mut commands = sql::parse_sql(&sql).map_err(sql_err)?;
        if commands.len() != 1 {
            return Err(sql_err(SqlError::Unsupported(
                "multiple statements in a prepared statement".into(),
            )));
        }
        self.run(&engine, commands.remove(0)).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            describe_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(describe_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if let Ok(n) = sql[start..i].parse::<usize>() {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Inline bound parameters (text format) as SQL literals.
///
/// One left-to-right pass over the statement: `$N` inside a quoted literal or
/// identifier is left alone, and substituted text is never scanned again.
fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<u8> = None;
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            // A doubled quote closes and reopens, which leaves us inside.
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'$' => {
                let digits_end = bytes[i + 1..]
                    .iter()
                    .position(|c| !c.is_ascii_digit())
                    .map_or(bytes.len(), |n| i + 1 + n);
                let param = sql[i + 1..digits_end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| params.get(idx));
                if let Some(param) = param {
                    out.push_str(&sql[copied..i]);
                    match param {
                        Some(value) => {
                            let text = String::from_utf8_lossy(value.as_ref());
                            out.push('\'');
                            out.push_str(&text.replace('\'', "''"));
                            out.push('\'');
                        }
                        None => out.push_str("NULL"),
                    }
                    copied = digits_end;
                    i = digits_end;
                    continue;
                }
            }
            None => {}
        }
        i += 1;
    }
    out.push_str(&sql[copied..]);
    out
}

// ── Connection ───────────────────────────────────────────────────

pub struct InnkeepFactory {
    handler: Arc<InnkeepHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<InnkeepAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl InnkeepFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        Self {
            handler: Arc::new(InnkeepHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                InnkeepAuthSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for InnkeepFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = InnkeepFactory::new(tenant_manager, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::InvalidInput(_) => "22023",
        EngineError::InvalidDateRange { .. } => "22008",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::BookingConflict(_) => "23P01",
        EngineError::AlreadyExists { .. } => "23505",
        EngineError::RoomInUse(_) => "23503",
        EngineError::InvalidTransition { .. } => "55000",
        EngineError::RoomNotFound(_) | EngineError::NotFound { .. } => "P0002",
        EngineError::Persistence(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match &e {
        SqlError::UnknownTable(_) => "42P01",
        SqlError::UnknownColumn { .. } => "42703",
        SqlError::Unsupported(_) => "0A000",
        _ => "42601",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}
