use chrono::NaiveDate;
use serde::Serialize;
use sqlx::mysql::MySqlArguments;
use sqlx::{Arguments, MySqlPool};
use utoipa::ToSchema;

use crate::auth::rbac::ListScope;
use crate::error::{ApiError, FieldErrors};
use crate::model::{
    attendance::Attendance, department::Department, employee::Employee,
    performance::Performance,
};

pub const PAGE_SIZE: u32 = 20;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    I64(i64),
    Date(NaiveDate),
}

/// ===============================
/// WHERE clause builder
/// ===============================
/// Column names passed here are compile-time constants; user input only ever
/// reaches the query as a bound value.
#[derive(Debug, Default)]
pub struct Conditions {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(&mut self, column: &str, value: Option<SqlValue>) -> &mut Self {
        self.cmp(column, "=", value)
    }

    pub fn gte(&mut self, column: &str, value: Option<SqlValue>) -> &mut Self {
        self.cmp(column, ">=", value)
    }

    pub fn lte(&mut self, column: &str, value: Option<SqlValue>) -> &mut Self {
        self.cmp(column, "<=", value)
    }

    fn cmp(&mut self, column: &str, op: &str, value: Option<SqlValue>) -> &mut Self {
        if let Some(value) = value {
            self.clauses.push(format!("{column} {op} ?"));
            self.values.push(value);
        }
        self
    }

    /// Case-insensitive substring match across `columns`, OR-ed together.
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        if columns.is_empty() {
            return self;
        }
        let pattern = like_pattern(term);
        let ors = columns
            .iter()
            .map(|c| format!("LOWER({c}) LIKE ?"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.clauses.push(format!("({ors})"));
        for _ in columns {
            self.values.push(SqlValue::String(pattern.clone()));
        }
        self
    }

    /// Restricts rows to those owned by the principal's employee profile.
    pub fn scope(&mut self, owner_column: &str, scope: ListScope) -> &mut Self {
        match scope {
            ListScope::All => {}
            ListScope::OwnedBy(id) => {
                self.eq(owner_column, Some(SqlValue::U64(id)));
            }
            ListScope::Nothing => self.clauses.push("1 = 0".to_string()),
        }
        self
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Fresh argument list holding every bound value, in clause order.
    pub fn arguments(&self) -> MySqlArguments {
        let mut args = MySqlArguments::default();
        for value in &self.values {
            push_arg(&mut args, value.clone());
        }
        args
    }
}

fn push_arg(args: &mut MySqlArguments, value: SqlValue) {
    match value {
        SqlValue::String(v) => args.add(v),
        SqlValue::U64(v) => args.add(v),
        SqlValue::I64(v) => args.add(v),
        SqlValue::Date(v) => args.add(v),
    }
}

/// Lower-cased LIKE pattern with `\`, `%` and `_` escaped.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.to_lowercase().chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// ===============================
/// ORDER BY from an allow-list
/// ===============================
/// `raw` is a comma separated list such as `-date,employee`. Fields outside
/// `allowed` (API name → SQL expression) are ignored; when nothing usable
/// remains `default` is used. `tiebreak` is always appended so paging is stable.
pub fn order_by(
    raw: Option<&str>,
    allowed: &[(&str, &str)],
    default: &str,
    tiebreak: &str,
) -> String {
    let parse = |spec: &str| -> Vec<String> {
        spec.split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .filter_map(|field| {
                let (name, dir) = match field.strip_prefix('-') {
                    Some(name) => (name, "DESC"),
                    None => (field, "ASC"),
                };
                allowed
                    .iter()
                    .find(|(api, _)| *api == name)
                    .map(|(_, column)| format!("{column} {dir}"))
            })
            .collect()
    };

    let mut terms = raw.map(parse).unwrap_or_default();
    if terms.is_empty() {
        terms = parse(default);
    }
    terms.push(format!("{tiebreak} ASC"));
    format!("ORDER BY {}", terms.join(", "))
}

/// ===============================
/// Fixed-size page-number pagination
/// ===============================
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
}

impl Page {
    pub fn from_query(page: Option<i64>) -> Result<Self, ApiError> {
        match page {
            None => Ok(Self { number: 1 }),
            Some(n) if n >= 1 && n <= u32::MAX as i64 => Ok(Self { number: n as u32 }),
            Some(_) => Err(ApiError::validation(FieldErrors::single(
                "page",
                "A valid page number is required.",
            ))),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.number as u64 - 1) * PAGE_SIZE as u64
    }

    /// Page 1 always exists; any later page must start inside the result set.
    pub fn check_in_range(&self, total: i64) -> Result<(), ApiError> {
        if self.number > 1 && self.offset() >= total.max(0) as u64 {
            return Err(ApiError::NotFound("Invalid page.".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    DepartmentPage = Paginated<Department>,
    EmployeePage = Paginated<Employee>,
    AttendancePage = Paginated<Attendance>,
    PerformancePage = Paginated<Performance>
)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 57)]
    pub total: i64,
}

/// Runs the count and the page query for a list endpoint.
///
/// `from` is everything between `SELECT` columns and `WHERE` (table plus joins).
pub async fn fetch_page<T>(
    pool: &MySqlPool,
    columns: &str,
    from: &str,
    conditions: &Conditions,
    order: &str,
    page: Page,
) -> Result<Paginated<T>, ApiError>
where
    T: for<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> + Send + Unpin,
{
    let where_clause = conditions.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM {from} {where_clause}");
    tracing::debug!(sql = %count_sql, bindings = ?conditions.values(), "Counting rows");
    let total: i64 = sqlx::query_scalar_with(&count_sql, conditions.arguments())
        .fetch_one(pool)
        .await?;

    page.check_in_range(total)?;

    let data_sql =
        format!("SELECT {columns} FROM {from} {where_clause} {order} LIMIT ? OFFSET ?");
    tracing::debug!(sql = %data_sql, page = page.number, "Fetching rows");
    let mut args = conditions.arguments();
    args.add(PAGE_SIZE as u64);
    args.add(page.offset());

    let data = sqlx::query_as_with::<_, T, _>(&data_sql, args)
        .fetch_all(pool)
        .await?;

    Ok(Paginated {
        data,
        page: page.number,
        per_page: PAGE_SIZE,
        total,
    })
}

/// True when a row with this primary key exists in `table`.
pub async fn exists(pool: &MySqlPool, table: &str, id: u64) -> Result<bool, ApiError> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?)");
    let found: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(pool).await?;
    Ok(found != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_conditions_produce_no_where() {
        let c = Conditions::new();
        assert_eq!(c.where_clause(), "");
        assert!(c.values().is_empty());
    }

    #[test]
    fn absent_filters_are_skipped() {
        let mut c = Conditions::new();
        c.eq("e.department_id", None)
            .gte("e.date_of_joining", Some(SqlValue::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())))
            .lte("e.date_of_joining", None);

        assert_eq!(c.where_clause(), "WHERE e.date_of_joining >= ?");
        assert_eq!(c.values().len(), 1);
    }

    #[test]
    fn search_ors_every_column_with_one_binding_each() {
        let mut c = Conditions::new();
        c.eq("a.status", Some(SqlValue::String("Present".into())))
            .search(&["e.name", "e.email"], Some("  Ann "));

        assert_eq!(
            c.where_clause(),
            "WHERE a.status = ? AND (LOWER(e.name) LIKE ? OR LOWER(e.email) LIKE ?)"
        );
        assert_eq!(
            c.values()[1..],
            [SqlValue::String("%ann%".into()), SqlValue::String("%ann%".into())]
        );
    }

    #[test]
    fn blank_search_is_ignored() {
        let mut c = Conditions::new();
        c.search(&["name"], Some("   "));
        assert_eq!(c.where_clause(), "");
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(like_pattern("50%_A\\b"), "%50\\%\\_a\\\\b%");
    }

    #[test]
    fn scope_restricts_to_owner_or_nothing() {
        let mut owned = Conditions::new();
        owned.scope("p.employee_id", ListScope::OwnedBy(4));
        assert_eq!(owned.where_clause(), "WHERE p.employee_id = ?");
        assert_eq!(owned.values(), [SqlValue::U64(4)]);

        let mut none = Conditions::new();
        none.scope("p.employee_id", ListScope::Nothing);
        assert_eq!(none.where_clause(), "WHERE 1 = 0");

        let mut all = Conditions::new();
        all.scope("p.employee_id", ListScope::All);
        assert_eq!(all.where_clause(), "");
    }

    const ALLOWED: &[(&str, &str)] = &[("date", "a.date"), ("employee", "a.employee_id")];

    #[test]
    fn ordering_honours_direction_and_tiebreak() {
        assert_eq!(
            order_by(Some("-date,employee"), ALLOWED, "-date", "a.id"),
            "ORDER BY a.date DESC, a.employee_id ASC, a.id ASC"
        );
    }

    #[test]
    fn unknown_ordering_fields_fall_back_to_default() {
        assert_eq!(
            order_by(Some("salary; DROP TABLE x"), ALLOWED, "-date", "a.id"),
            "ORDER BY a.date DESC, a.id ASC"
        );
        assert_eq!(
            order_by(None, ALLOWED, "-date", "a.id"),
            "ORDER BY a.date DESC, a.id ASC"
        );
    }

    #[test]
    fn page_numbers_start_at_one() {
        assert_eq!(Page::from_query(None).unwrap().number, 1);
        assert_eq!(Page::from_query(Some(3)).unwrap().offset(), 40);
        assert!(Page::from_query(Some(0)).is_err());
        assert!(Page::from_query(Some(-2)).is_err());
    }

    #[test]
    fn pages_past_the_end_are_not_found() {
        let first = Page { number: 1 };
        assert!(first.check_in_range(0).is_ok());

        let second = Page { number: 2 };
        assert!(second.check_in_range(21).is_ok());
        assert!(second.check_in_range(20).is_err());
    }
}
