use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, ObjectNamePart, OrderByKind, SetExpr,
    Statement, TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::model::*;

/// Parsed command from SQL input. One command per statement.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRoom(NewRoom),
    UpdateRoom { id: Id, patch: RoomPatch },
    DeleteRoom { id: Id },
    SelectRooms { id: Option<Id>, sort: Option<RoomSort> },
    InsertBooking(BookingRequest),
    UpdateBookingStatus { id: Id, status: BookingStatus },
    DeleteBooking { id: Id },
    SelectBookings(BookingFilter),
    InsertCatalog(CatalogRecord),
    UpdateCatalog { id: Id, patch: CatalogPatch },
    DeleteCatalog { kind: CatalogKind, id: Id },
    SelectCatalog { kind: CatalogKind, id: Option<Id> },
}

/// Which bookings a `SELECT ... FROM bookings` wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingFilter {
    All,
    ById(Id),
    ByRoom(Id),
    /// `room_id = r AND check_in < end AND check_out > start`
    Overlapping { room_id: Id, start: Ms, end: Ms },
}

/// A table of the SQL surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Rooms,
    Bookings,
    Catalog(CatalogKind),
}

impl Table {
    fn resolve(name: String) -> Result<Self, SqlError> {
        match name.as_str() {
            "rooms" => Ok(Table::Rooms),
            "bookings" => Ok(Table::Bookings),
            "menu_items" | "menu" => Ok(Table::Catalog(CatalogKind::MenuItem)),
            "inventory" | "inventory_items" => Ok(Table::Catalog(CatalogKind::InventoryItem)),
            "users" => Ok(Table::Catalog(CatalogKind::User)),
            _ => Err(SqlError::UnknownTable(name)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Table::Rooms => "rooms",
            Table::Bookings => "bookings",
            Table::Catalog(kind) => kind.table(),
        }
    }

    /// Writable columns, in positional order for `INSERT` without a column list.
    fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Rooms => &["room_number", "type", "price", "status"],
            Table::Bookings => &["guest_name", "room_id", "check_in", "check_out", "status"],
            Table::Catalog(CatalogKind::MenuItem) => &["name", "category", "price"],
            Table::Catalog(CatalogKind::InventoryItem) => &["sku", "name", "quantity", "unit_cost"],
            Table::Catalog(CatalogKind::User) => &["username", "role"],
        }
    }

    fn canonical_column(&self, column: &str) -> Option<&'static str> {
        let aliased = match (self, column) {
            (Table::Rooms, "number") => "room_number",
            (Table::Rooms, "room_type") => "type",
            (Table::Rooms, "rate") => "price",
            (Table::Bookings, "guest") => "guest_name",
            (Table::Catalog(CatalogKind::InventoryItem), "cost") => "unit_cost",
            _ => column,
        };
        self.columns().iter().copied().find(|c| *c == aliased)
    }
}

pub fn parse_sql(sql: &str) -> Result<Vec<Command>, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    stmts.iter().map(parse_statement).collect()
}

/// The table whose rows a single statement returns: `SELECT`, `INSERT` and
/// `UPDATE` all answer with rows, `DELETE` only with a tag. Used to describe
/// result columns of a prepared statement before its parameters are bound.
pub fn result_table(sql: &str) -> Option<Table> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql).ok()?;
    let name = match stmts.as_slice() {
        [Statement::Query(query)] => {
            let SetExpr::Select(select) = query.body.as_ref() else {
                return None;
            };
            table_factor_name(&select.from.first()?.relation).ok()?
        }
        [Statement::Insert(insert)] => insert_table_name(insert).ok()?,
        [Statement::Update { table, .. }] => table_factor_name(&table.relation).ok()?,
        _ => return None,
    };
    Table::resolve(name).ok()
}

pub fn parse_statement(stmt: &Statement) -> Result<Command, SqlError> {
    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection.as_ref()),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = Table::resolve(insert_table_name(insert)?)?;
    let rows = extract_insert_rows(insert)?;
    let [values] = rows else {
        return Err(SqlError::Unsupported("multi-row INSERT".into()));
    };
    let row = bind_insert_row(table, &insert.columns, values)?;

    match table {
        Table::Rooms => Ok(Command::InsertRoom(NewRoom {
            room_number: row.text("room_number")?.unwrap_or_default(),
            room_type: row.text("type")?.unwrap_or_default(),
            price: row.f64("price")?.unwrap_or(0.0),
            status: row.room_status("status")?.unwrap_or(RoomStatus::Available),
        })),
        Table::Bookings => {
            if row.get("status").is_some() {
                return Err(SqlError::Unsupported(
                    "status is assigned on creation".into(),
                ));
            }
            Ok(Command::InsertBooking(BookingRequest {
                guest_name: row.text("guest_name")?.unwrap_or_default(),
                room_id: row.id("room_id")?,
                check_in: row.timestamp("check_in")?,
                check_out: row.timestamp("check_out")?,
            }))
        }
        Table::Catalog(kind) => Ok(Command::InsertCatalog(catalog_record(kind, &row)?)),
    }
}

fn catalog_record(kind: CatalogKind, row: &Row<'_>) -> Result<CatalogRecord, SqlError> {
    Ok(match kind {
        CatalogKind::MenuItem => CatalogRecord::MenuItem(MenuItem {
            id: 0,
            name: row.text("name")?.unwrap_or_default(),
            category: row.text("category")?.unwrap_or_default(),
            price: row.f64("price")?.unwrap_or(0.0),
        }),
        CatalogKind::InventoryItem => CatalogRecord::InventoryItem(InventoryItem {
            id: 0,
            sku: row.text("sku")?.unwrap_or_default(),
            name: row.text("name")?.unwrap_or_default(),
            quantity: row.i64("quantity")?.unwrap_or(0),
            unit_cost: row.f64("unit_cost")?.unwrap_or(0.0),
        }),
        CatalogKind::User => CatalogRecord::User(User {
            id: 0,
            username: row.text("username")?.unwrap_or_default(),
            role: row.text("role")?.unwrap_or_default(),
        }),
    })
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: Option<&Expr>,
) -> Result<Command, SqlError> {
    let table = Table::resolve(table_factor_name(&table.relation)?)?;
    let id = where_id(selection)?.ok_or(SqlError::MissingFilter("id"))?;

    let mut row = Row { table, cells: Vec::with_capacity(assignments.len()) };
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name)
                .ok_or_else(|| SqlError::Parse("empty column name".into()))?,
            AssignmentTarget::Tuple(_) => {
                return Err(SqlError::Unsupported("tuple assignment".into()));
            }
        };
        row.push(column, &assignment.value)?;
    }

    match table {
        Table::Rooms => Ok(Command::UpdateRoom {
            id,
            patch: RoomPatch {
                room_number: row.text("room_number")?,
                room_type: row.text("type")?,
                price: row.f64("price")?,
                status: row.room_status("status")?,
            },
        }),
        Table::Bookings => {
            if row.cells.iter().any(|(c, _)| *c != "status") {
                return Err(SqlError::Unsupported(
                    "only status can change on a booking; cancel and rebook to move dates".into(),
                ));
            }
            let status = row
                .booking_status("status")?
                .ok_or(SqlError::MissingFilter("status"))?;
            Ok(Command::UpdateBookingStatus { id, status })
        }
        Table::Catalog(kind) => Ok(Command::UpdateCatalog {
            id,
            patch: catalog_patch(kind, &row)?,
        }),
    }
}

fn catalog_patch(kind: CatalogKind, row: &Row<'_>) -> Result<CatalogPatch, SqlError> {
    Ok(match kind {
        CatalogKind::MenuItem => CatalogPatch::MenuItem(MenuItemPatch {
            name: row.text("name")?,
            category: row.text("category")?,
            price: row.f64("price")?,
        }),
        CatalogKind::InventoryItem => CatalogPatch::InventoryItem(InventoryItemPatch {
            sku: row.text("sku")?,
            name: row.text("name")?,
            quantity: row.i64("quantity")?,
            unit_cost: row.f64("unit_cost")?,
        }),
        CatalogKind::User => CatalogPatch::User(UserPatch {
            username: row.text("username")?,
            role: row.text("role")?,
        }),
    })
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = Table::resolve(delete_table_name(delete)?)?;
    let id = where_id(delete.selection.as_ref())?.ok_or(SqlError::MissingFilter("id"))?;

    Ok(match table {
        Table::Rooms => Command::DeleteRoom { id },
        Table::Bookings => Command::DeleteBooking { id },
        Table::Catalog(kind) => Command::DeleteCatalog { kind, id },
    })
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Err(SqlError::Unsupported("non-SELECT query".into()));
    };
    let from = select
        .from
        .first()
        .ok_or_else(|| SqlError::Parse("SELECT without FROM".into()))?;
    let table = Table::resolve(table_factor_name(&from.relation)?)?;

    if table != Table::Rooms && query.order_by.is_some() {
        return Err(SqlError::Unsupported(format!(
            "ORDER BY on {}",
            table.name()
        )));
    }

    match table {
        Table::Rooms => Ok(Command::SelectRooms {
            id: where_id(select.selection.as_ref())?,
            sort: room_sort(query)?,
        }),
        Table::Bookings => Ok(Command::SelectBookings(booking_filter(
            select.selection.as_ref(),
        )?)),
        Table::Catalog(kind) => Ok(Command::SelectCatalog {
            kind,
            id: where_id(select.selection.as_ref())?,
        }),
    }
}

fn booking_filter(selection: Option<&Expr>) -> Result<BookingFilter, SqlError> {
    let mut conditions = Vec::new();
    if let Some(expr) = selection {
        collect_conditions(expr, &mut conditions)?;
    }

    let (mut id, mut room_id, mut before, mut after) = (None, None, None, None);
    for cond in &conditions {
        match (cond.column.as_str(), cond.op) {
            ("id", CmpOp::Eq) => id = as_id(cond.value)?,
            ("room_id", CmpOp::Eq) => room_id = as_id(cond.value)?,
            ("check_in", CmpOp::Lt) => before = as_timestamp(cond.value)?,
            ("check_out", CmpOp::Gt) => after = as_timestamp(cond.value)?,
            (column, _) => {
                return Err(SqlError::Unsupported(format!("bookings filter on {column}")));
            }
        }
    }

    match (id, room_id, after, before) {
        (Some(id), None, None, None) => Ok(BookingFilter::ById(id)),
        (Some(_), ..) => Err(SqlError::Unsupported(
            "id filter cannot be combined with other filters".into(),
        )),
        (None, None, None, None) => Ok(BookingFilter::All),
        (None, Some(room_id), None, None) => Ok(BookingFilter::ByRoom(room_id)),
        (None, Some(room_id), Some(start), Some(end)) => Ok(BookingFilter::Overlapping {
            room_id,
            start,
            end,
        }),
        (None, None, _, _) => Err(SqlError::MissingFilter("room_id")),
        (None, Some(_), None, Some(_)) => Err(SqlError::MissingFilter("check_out")),
        (None, Some(_), Some(_), None) => Err(SqlError::MissingFilter("check_in")),
    }
}

fn room_sort(query: &ast::Query) -> Result<Option<RoomSort>, SqlError> {
    let Some(order_by) = &query.order_by else {
        return Ok(None);
    };
    let OrderByKind::Expressions(exprs) = &order_by.kind else {
        return Err(SqlError::Unsupported("ORDER BY ALL".into()));
    };
    let [order] = exprs.as_slice() else {
        return Err(SqlError::Unsupported("ORDER BY with several keys".into()));
    };
    let column = expr_column_name(&order.expr)
        .ok_or_else(|| SqlError::Unsupported(format!("ORDER BY {}", order.expr)))?;
    let key = match column.as_str() {
        "id" => RoomSortKey::Id,
        "room_number" | "number" => RoomSortKey::RoomNumber,
        "price" | "rate" => RoomSortKey::Price,
        other => return Err(SqlError::Unsupported(format!("ORDER BY {other}"))),
    };
    Ok(Some(RoomSort {
        key,
        descending: order.options.asc == Some(false),
    }))
}

// ── WHERE ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Lt,
    Gt,
}

struct Condition<'a> {
    column: String,
    op: CmpOp,
    value: &'a Expr,
}

/// Flatten an AND-chain of `column <op> literal` comparisons.
fn collect_conditions<'a>(expr: &'a Expr, out: &mut Vec<Condition<'a>>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_conditions(inner, out),
        Expr::BinaryOp { left, op, right } => {
            let op = match op {
                BinaryOperator::And => {
                    collect_conditions(left, out)?;
                    return collect_conditions(right, out);
                }
                BinaryOperator::Eq => CmpOp::Eq,
                BinaryOperator::Lt => CmpOp::Lt,
                BinaryOperator::Gt => CmpOp::Gt,
                _ => return Err(SqlError::Unsupported(format!("filter {expr}"))),
            };
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
            out.push(Condition { column, op, value: right });
            Ok(())
        }
        _ => Err(SqlError::Unsupported(format!("filter {expr}"))),
    }
}

/// `WHERE id = N` or no WHERE at all.
fn where_id(selection: Option<&Expr>) -> Result<Option<Id>, SqlError> {
    let Some(expr) = selection else {
        return Ok(None);
    };
    let mut conditions = Vec::new();
    collect_conditions(expr, &mut conditions)?;
    match conditions.as_slice() {
        [Condition { column, op: CmpOp::Eq, value }] if column == "id" => {
            as_id(value)?.map(Some).ok_or(SqlError::MissingFilter("id"))
        }
        _ => Err(SqlError::Unsupported(format!("filter {expr}"))),
    }
}

// ── Column binding ────────────────────────────────────────────

/// Canonical column name → value expression for one row of input.
struct Row<'a> {
    table: Table,
    cells: Vec<(&'static str, &'a Expr)>,
}

impl<'a> Row<'a> {
    fn push(&mut self, column: String, value: &'a Expr) -> Result<(), SqlError> {
        let canonical = self
            .table
            .canonical_column(&column)
            .ok_or_else(|| SqlError::UnknownColumn {
                table: self.table.name(),
                column: column.clone(),
            })?;
        if self.get(canonical).is_some() {
            return Err(SqlError::Parse(format!("column {column} given twice")));
        }
        self.cells.push((canonical, value));
        Ok(())
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.cells.iter().find(|(c, _)| *c == column).map(|(_, e)| *e)
    }

    fn text(&self, column: &str) -> Result<Option<String>, SqlError> {
        self.get(column).map_or(Ok(None), as_text)
    }

    fn f64(&self, column: &str) -> Result<Option<f64>, SqlError> {
        self.get(column).map_or(Ok(None), as_f64)
    }

    fn i64(&self, column: &str) -> Result<Option<i64>, SqlError> {
        self.get(column).map_or(Ok(None), as_i64)
    }

    fn id(&self, column: &str) -> Result<Option<Id>, SqlError> {
        self.get(column).map_or(Ok(None), as_id)
    }

    fn timestamp(&self, column: &str) -> Result<Option<Ms>, SqlError> {
        self.get(column).map_or(Ok(None), as_timestamp)
    }

    fn room_status(&self, column: &str) -> Result<Option<RoomStatus>, SqlError> {
        self.text(column)?
            .map(|s| s.parse().map_err(SqlError::Parse))
            .transpose()
    }

    fn booking_status(&self, column: &str) -> Result<Option<BookingStatus>, SqlError> {
        self.text(column)?
            .map(|s| s.parse().map_err(SqlError::Parse))
            .transpose()
    }
}

/// Bind one VALUES row to column names: the explicit column list if there
/// is one, otherwise the table's positional order.
fn bind_insert_row<'a>(
    table: Table,
    columns: &[ast::Ident],
    values: &'a [Expr],
) -> Result<Row<'a>, SqlError> {
    let mut row = Row { table, cells: Vec::with_capacity(values.len()) };
    if columns.is_empty() {
        let positional = table.columns();
        if values.len() > positional.len() {
            return Err(SqlError::WrongArity(table.name(), positional.len(), values.len()));
        }
        for (column, value) in positional.iter().zip(values) {
            row.push((*column).to_string(), value)?;
        }
    } else {
        if columns.len() != values.len() {
            return Err(SqlError::WrongArity(table.name(), columns.len(), values.len()));
        }
        for (ident, value) in columns.iter().zip(values) {
            row.push(ident.value.to_lowercase(), value)?;
        }
    }
    Ok(row)
}

// ── Literals ──────────────────────────────────────────────────

enum Literal {
    Text(String),
    Number(String),
    Bool(bool),
}

/// A literal with NULL folded to `None`. `-(number)` folds into one number.
fn literal(expr: &Expr) -> Result<Option<Literal>, SqlError> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => match value {
            Value::Null => Ok(None),
            Value::SingleQuotedString(s) => Ok(Some(Literal::Text(s.clone()))),
            Value::Number(n, _) => Ok(Some(Literal::Number(n.clone()))),
            Value::Boolean(b) => Ok(Some(Literal::Bool(*b))),
            other => Err(SqlError::Parse(format!("unsupported literal {other}"))),
        },
        Expr::UnaryOp {
            op: ast::UnaryOperator::Minus,
            expr: inner,
        } => match literal(inner)? {
            Some(Literal::Number(n)) => Ok(Some(Literal::Number(format!("-{n}")))),
            _ => Err(SqlError::Parse(format!("expected number, got {expr}"))),
        },
        Expr::Nested(inner) => literal(inner),
        other => Err(SqlError::Parse(format!("expected literal, got {other}"))),
    }
}

fn as_text(expr: &Expr) -> Result<Option<String>, SqlError> {
    Ok(literal(expr)?.map(|lit| match lit {
        Literal::Text(s) | Literal::Number(s) => s,
        Literal::Bool(b) => b.to_string(),
    }))
}

fn as_numeric_text(expr: &Expr) -> Result<Option<String>, SqlError> {
    match literal(expr)? {
        None => Ok(None),
        Some(Literal::Text(s) | Literal::Number(s)) => Ok(Some(s.trim().to_string())),
        Some(Literal::Bool(_)) => Err(SqlError::Parse(format!("expected number, got {expr}"))),
    }
}

fn as_f64(expr: &Expr) -> Result<Option<f64>, SqlError> {
    as_numeric_text(expr)?
        .map(|s| s.parse::<f64>().map_err(|e| SqlError::Parse(format!("bad number {s}: {e}"))))
        .transpose()
}

fn as_i64(expr: &Expr) -> Result<Option<i64>, SqlError> {
    as_numeric_text(expr)?
        .map(|s| s.parse::<i64>().map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))))
        .transpose()
}

fn as_id(expr: &Expr) -> Result<Option<Id>, SqlError> {
    as_i64(expr)?
        .map(|v| Id::try_from(v).map_err(|_| SqlError::Parse(format!("bad id: {v}"))))
        .transpose()
}

fn as_timestamp(expr: &Expr) -> Result<Option<Ms>, SqlError> {
    match literal(expr)? {
        None => Ok(None),
        Some(Literal::Number(n)) => n
            .parse::<Ms>()
            .map(Some)
            .map_err(|e| SqlError::Parse(format!("bad timestamp {n}: {e}"))),
        Some(Literal::Text(s)) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| SqlError::Parse(format!("bad timestamp: {s}"))),
        Some(Literal::Bool(_)) => Err(SqlError::Parse(format!("expected timestamp, got {expr}"))),
    }
}

// ── AST helpers ───────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or_else(|| SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) if !values.rows.is_empty() => Ok(&values.rows),
        SetExpr::Values(_) => Err(SqlError::Parse("empty VALUES".into())),
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{table}: unknown column {column}")]
    UnknownColumn { table: &'static str, column: String },
    #[error("{0}: expected {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(sql: &str) -> Command {
        let mut cmds = parse_sql(sql).unwrap();
        assert_eq!(cmds.len(), 1, "expected one statement in {sql}");
        cmds.remove(0)
    }

    #[test]
    fn parse_insert_room_with_columns() {
        let cmd = parse_one("INSERT INTO rooms (room_number, type, price) VALUES ('101', 'double', 100.0)");
        assert_eq!(
            cmd,
            Command::InsertRoom(NewRoom {
                room_number: "101".into(),
                room_type: "double".into(),
                price: 100.0,
                status: RoomStatus::Available,
            })
        );
    }

    #[test]
    fn parse_insert_room_positional_with_status() {
        let cmd = parse_one("INSERT INTO rooms VALUES ('7B', 'suite', 250, 'booked')");
        match cmd {
            Command::InsertRoom(room) => {
                assert_eq!(room.room_number, "7B");
                assert_eq!(room.price, 250.0);
                assert_eq!(room.status, RoomStatus::Booked);
            }
            _ => panic!("expected InsertRoom, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_room_aliases_and_missing_fields() {
        let cmd = parse_one("INSERT INTO rooms (number, rate) VALUES ('12', 80)");
        match cmd {
            Command::InsertRoom(room) => {
                assert_eq!(room.room_number, "12");
                assert_eq!(room.room_type, "");
                assert_eq!(room.price, 80.0);
            }
            _ => panic!("expected InsertRoom, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_with_dates() {
        let cmd = parse_one(
            "INSERT INTO bookings (guest_name, room_id, check_in, check_out) \
             VALUES ('Alice', 1, '2024-06-01', '2024-06-03T11:00:00Z')",
        );
        assert_eq!(
            cmd,
            Command::InsertBooking(BookingRequest {
                guest_name: "Alice".into(),
                room_id: Some(1),
                check_in: Some(1_717_200_000_000),
                check_out: Some(1_717_200_000_000 + 2 * 86_400_000 + 11 * 3_600_000),
            })
        );
    }

    #[test]
    fn parse_insert_booking_column_order_and_nulls() {
        let cmd = parse_one(
            "INSERT INTO bookings (check_out, check_in, room_id, guest_name) VALUES (2000, 1000, NULL, 'Bob')",
        );
        assert_eq!(
            cmd,
            Command::InsertBooking(BookingRequest {
                guest_name: "Bob".into(),
                room_id: None,
                check_in: Some(1000),
                check_out: Some(2000),
            })
        );
    }

    #[test]
    fn parse_insert_booking_rejects_status() {
        let result = parse_sql(
            "INSERT INTO bookings (guest_name, room_id, check_in, check_out, status) VALUES ('A', 1, 1, 2, 'CheckedIn')",
        );
        assert!(matches!(result, Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_insert_unknown_column() {
        let result = parse_sql("INSERT INTO rooms (room_number, floor) VALUES ('1', 3)");
        assert!(matches!(result, Err(SqlError::UnknownColumn { table: "rooms", .. })));
    }

    #[test]
    fn parse_insert_arity_mismatch() {
        let result = parse_sql("INSERT INTO rooms (room_number, type) VALUES ('1')");
        assert!(matches!(result, Err(SqlError::WrongArity("rooms", 2, 1))));
    }

    #[test]
    fn parse_multi_row_insert_unsupported() {
        let result = parse_sql("INSERT INTO users VALUES ('a', 'admin'), ('b', 'staff')");
        assert!(matches!(result, Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_update_room_partial() {
        let cmd = parse_one("UPDATE rooms SET price = 120.5 WHERE id = 3");
        assert_eq!(
            cmd,
            Command::UpdateRoom {
                id: 3,
                patch: RoomPatch {
                    price: Some(120.5),
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn parse_update_without_where_is_rejected() {
        let result = parse_sql("UPDATE rooms SET price = 1");
        assert!(matches!(result, Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_update_booking_status() {
        let cmd = parse_one("UPDATE bookings SET status = 'checked_in' WHERE id = 9");
        assert_eq!(
            cmd,
            Command::UpdateBookingStatus {
                id: 9,
                status: BookingStatus::CheckedIn,
            }
        );
    }

    #[test]
    fn parse_update_booking_dates_rejected() {
        let result = parse_sql("UPDATE bookings SET check_in = '2024-01-01' WHERE id = 9");
        assert!(matches!(result, Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_update_inventory_patch() {
        let cmd = parse_one("UPDATE inventory SET quantity = -2, cost = 1.25 WHERE id = 4");
        assert_eq!(
            cmd,
            Command::UpdateCatalog {
                id: 4,
                patch: CatalogPatch::InventoryItem(InventoryItemPatch {
                    quantity: Some(-2),
                    unit_cost: Some(1.25),
                    ..Default::default()
                }),
            }
        );
    }

    #[test]
    fn parse_deletes() {
        assert_eq!(parse_one("DELETE FROM rooms WHERE id = 1"), Command::DeleteRoom { id: 1 });
        assert_eq!(parse_one("DELETE FROM bookings WHERE id = 2"), Command::DeleteBooking { id: 2 });
        assert_eq!(
            parse_one("DELETE FROM users WHERE id = 3"),
            Command::DeleteCatalog {
                kind: CatalogKind::User,
                id: 3,
            }
        );
        assert!(matches!(
            parse_sql("DELETE FROM rooms"),
            Err(SqlError::MissingFilter("id"))
        ));
    }

    #[test]
    fn parse_select_rooms_sorted() {
        let cmd = parse_one("SELECT * FROM rooms ORDER BY price DESC");
        assert_eq!(
            cmd,
            Command::SelectRooms {
                id: None,
                sort: Some(RoomSort {
                    key: RoomSortKey::Price,
                    descending: true,
                }),
            }
        );
        let cmd = parse_one("SELECT * FROM rooms WHERE id = 5");
        assert_eq!(cmd, Command::SelectRooms { id: Some(5), sort: None });
    }

    #[test]
    fn parse_select_bookings_filters() {
        assert_eq!(
            parse_one("SELECT * FROM bookings"),
            Command::SelectBookings(BookingFilter::All)
        );
        assert_eq!(
            parse_one("SELECT * FROM bookings WHERE id = 3"),
            Command::SelectBookings(BookingFilter::ById(3))
        );
        assert_eq!(
            parse_one("SELECT * FROM bookings WHERE room_id = 1"),
            Command::SelectBookings(BookingFilter::ByRoom(1))
        );
        assert_eq!(
            parse_one(
                "SELECT * FROM bookings WHERE room_id = 1 AND check_in < '2024-06-04' AND check_out > '2024-06-02'"
            ),
            Command::SelectBookings(BookingFilter::Overlapping {
                room_id: 1,
                start: 1_717_286_400_000,
                end: 1_717_459_200_000,
            })
        );
    }

    #[test]
    fn parse_select_bookings_half_window_rejected() {
        let result = parse_sql("SELECT * FROM bookings WHERE room_id = 1 AND check_in < 5");
        assert!(matches!(result, Err(SqlError::MissingFilter("check_out"))));
        let result = parse_sql("SELECT * FROM bookings WHERE check_in < 5 AND check_out > 1");
        assert!(matches!(result, Err(SqlError::MissingFilter("room_id"))));
    }

    #[test]
    fn parse_select_catalog() {
        assert_eq!(
            parse_one("SELECT * FROM menu_items"),
            Command::SelectCatalog {
                kind: CatalogKind::MenuItem,
                id: None,
            }
        );
    }

    #[test]
    fn parse_multiple_statements() {
        let cmds = parse_sql(
            "INSERT INTO users VALUES ('alice', 'admin'); INSERT INTO users VALUES ('bob', 'staff')",
        )
        .unwrap();
        assert_eq!(cmds.len(), 2);
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("INSERT INTO foobar (id) VALUES (1)"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn result_table_for_describe() {
        assert_eq!(
            result_table("SELECT * FROM bookings WHERE room_id = $1"),
            Some(Table::Bookings)
        );
        assert_eq!(
            result_table("SELECT * FROM inventory"),
            Some(Table::Catalog(CatalogKind::InventoryItem))
        );
        assert_eq!(
            result_table("INSERT INTO users (username, role) VALUES ($1, $2)"),
            Some(Table::Catalog(CatalogKind::User))
        );
        assert_eq!(
            result_table("UPDATE rooms SET price = $1 WHERE id = $2"),
            Some(Table::Rooms)
        );
        assert_eq!(result_table("DELETE FROM rooms WHERE id = $1"), None);
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
