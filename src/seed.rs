//! Demo data generator behind `hrm seed`.
//!
//! Generation is pure (driven by any `Rng`) so it can be tested without a
//! database; [`apply`] writes a plan inside one transaction.

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use rand::Rng;
use rand::seq::SliceRandom;
use sqlx::{MySql, MySqlPool, QueryBuilder, Transaction};
use tracing::info;

use crate::model::attendance::AttendanceStatus;

pub const DEPARTMENTS: [&str; 7] = [
    "Engineering",
    "Research",
    "HR",
    "Finance",
    "Marketing",
    "Sales",
    "Support",
];

const FIRST_NAMES: &[&str] = &[
    "Amina", "Ben", "Carla", "Dev", "Elena", "Farid", "Grace", "Hiro", "Ines", "Jonas", "Kemi",
    "Luca", "Maya", "Nikhil", "Olga", "Pedro", "Quinn", "Rosa", "Sami", "Tara",
];

const LAST_NAMES: &[&str] = &[
    "Adeyemi", "Berg", "Costa", "Dubois", "Eriksen", "Fischer", "Garcia", "Haddad", "Ito",
    "Jensen", "Kowalski", "Laurent", "Moreau", "Novak", "Okafor", "Patel", "Rossi", "Silva",
];

const STREETS: &[&str] = &["Oak Street", "Mill Road", "Harbour Lane", "Station Avenue", "Park Row"];
const CITIES: &[&str] = &["Springfield", "Riverton", "Lakeside", "Fairview", "Brookfield"];

const INSERT_CHUNK: usize = 500;

#[derive(Debug, Clone)]
pub struct EmployeeSeed {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub address: String,
    pub date_of_joining: NaiveDate,
    /// Index into [`DEPARTMENTS`].
    pub department: usize,
    pub attendance: Vec<(NaiveDate, AttendanceStatus)>,
    pub reviews: Vec<(u8, NaiveDate)>,
}

#[derive(Debug, Clone)]
pub struct SeedPlan {
    pub employees: Vec<EmployeeSeed>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub skipped: bool,
    pub departments: usize,
    pub employees: usize,
    pub attendance: usize,
    pub reviews: usize,
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// 85% present, 7% absent, 8% late.
fn pick_status<R: Rng>(rng: &mut R) -> AttendanceStatus {
    match rng.gen_range(0..100) {
        0..=84 => AttendanceStatus::Present,
        85..=91 => AttendanceStatus::Absent,
        _ => AttendanceStatus::Late,
    }
}

fn pick<'a, R: Rng>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

/// Builds `employees` employees with weekday attendance over the `days` days
/// ending on `today` and two to five reviews each.
pub fn plan<R: Rng>(rng: &mut R, employees: u32, days: u32, today: NaiveDate) -> SeedPlan {
    let start = today - Duration::days(i64::from(days));

    let employees = (0..employees)
        .map(|i| {
            let first = pick(rng, FIRST_NAMES);
            let last = pick(rng, LAST_NAMES);

            let attendance = start
                .iter_days()
                .take_while(|d| *d <= today)
                .filter(|d| is_weekday(*d))
                .map(|d| (d, pick_status(rng)))
                .collect();

            let reviews = (0..rng.gen_range(2..=5))
                .map(|_| {
                    let offset = rng.gen_range(0..=i64::from(days));
                    (rng.gen_range(1..=5u8), start + Duration::days(offset))
                })
                .collect();

            EmployeeSeed {
                name: format!("{first} {last}"),
                // index suffix keeps emails unique across the batch
                email: format!("{}.{}{}@example.com", first.to_lowercase(), last.to_lowercase(), i + 1),
                phone_number: format!("{:010}", rng.gen_range(1_000_000_000u64..10_000_000_000)),
                address: format!(
                    "{} {}\n{}",
                    rng.gen_range(1..=999),
                    pick(rng, STREETS),
                    pick(rng, CITIES)
                ),
                date_of_joining: today - Duration::days(rng.gen_range(0..=365)),
                department: rng.gen_range(0..DEPARTMENTS.len()),
                attendance,
                reviews,
            }
        })
        .collect();

    SeedPlan { employees }
}

async fn department_ids(tx: &mut Transaction<'_, MySql>) -> Result<Vec<u64>> {
    let mut ids = Vec::with_capacity(DEPARTMENTS.len());
    for name in DEPARTMENTS {
        sqlx::query("INSERT IGNORE INTO departments (name) VALUES (?)")
            .bind(name)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("Failed to create department {name}"))?;
        let id: u64 = sqlx::query_scalar("SELECT id FROM departments WHERE name = ?")
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;
        ids.push(id);
    }
    Ok(ids)
}

/// Writes `plan` in one transaction. Existing employees make this a no-op
/// unless `force` is set, which first clears employees, attendance and reviews.
pub async fn apply(pool: &MySqlPool, plan: &SeedPlan, force: bool) -> Result<SeedReport> {
    let mut tx = pool.begin().await.context("Failed to start transaction")?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employees")
        .fetch_one(&mut *tx)
        .await?;
    if existing > 0 && !force {
        info!(existing, "Employees already present, skipping seed");
        return Ok(SeedReport {
            skipped: true,
            ..SeedReport::default()
        });
    }

    if force {
        for table in ["attendance", "performance", "employees"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to clear {table}"))?;
        }
        info!("Cleared employees, attendance and performance");
    }

    let departments = department_ids(&mut tx).await?;
    let mut report = SeedReport {
        departments: departments.len(),
        ..SeedReport::default()
    };

    let mut attendance_rows: Vec<(u64, NaiveDate, AttendanceStatus)> = Vec::new();
    let mut review_rows: Vec<(u64, u8, NaiveDate)> = Vec::new();

    for emp in &plan.employees {
        let result = sqlx::query(
            r#"
            INSERT INTO employees
                (name, email, phone_number, address, date_of_joining, department_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&emp.name)
        .bind(&emp.email)
        .bind(&emp.phone_number)
        .bind(&emp.address)
        .bind(emp.date_of_joining)
        .bind(departments.get(emp.department).copied())
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert employee {}", emp.email))?;

        let id = result.last_insert_id();
        report.employees += 1;
        attendance_rows.extend(emp.attendance.iter().map(|(d, s)| (id, *d, *s)));
        review_rows.extend(emp.reviews.iter().map(|(r, d)| (id, *r, *d)));
    }

    for chunk in attendance_rows.chunks(INSERT_CHUNK) {
        let mut qb = QueryBuilder::<MySql>::new("INSERT INTO attendance (employee_id, date, status) ");
        qb.push_values(chunk, |mut b, (employee_id, date, status)| {
            b.push_bind(*employee_id)
                .push_bind(*date)
                .push_bind(status.as_ref().to_string());
        });
        qb.build().execute(&mut *tx).await.context("Failed to insert attendance")?;
    }
    report.attendance = attendance_rows.len();

    for chunk in review_rows.chunks(INSERT_CHUNK) {
        let mut qb =
            QueryBuilder::<MySql>::new("INSERT INTO performance (employee_id, rating, review_date) ");
        qb.push_values(chunk, |mut b, (employee_id, rating, review_date)| {
            b.push_bind(*employee_id).push_bind(*rating).push_bind(*review_date);
        });
        qb.build().execute(&mut *tx).await.context("Failed to insert performance reviews")?;
    }
    report.reviews = review_rows.len();

    tx.commit().await.context("Failed to commit seed data")?;

    info!(
        departments = report.departments,
        employees = report.employees,
        attendance = report.attendance,
        reviews = report.reviews,
        "Seeding complete"
    );
    Ok(report)
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn sample(employees: u32, days: u32) -> (SeedPlan, NaiveDate) {
        let today = NaiveDate::from_ymd_opt(2026, 3, 13).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        (plan(&mut rng, employees, days, today), today)
    }

    #[test]
    fn generates_requested_headcount_with_unique_emails() {
        let (plan, _) = sample(50, 90);
        assert_eq!(plan.employees.len(), 50);
        let emails: HashSet<_> = plan.employees.iter().map(|e| e.email.as_str()).collect();
        assert_eq!(emails.len(), 50);
        assert!(plan.employees.iter().all(|e| e.department < DEPARTMENTS.len()));
    }

    #[test]
    fn attendance_covers_weekdays_only() {
        let (plan, today) = sample(3, 14);
        let start = today - Duration::days(14);
        for emp in &plan.employees {
            // 2026-02-27 (Fri) through 2026-03-13 (Fri): 11 weekdays
            assert_eq!(emp.attendance.len(), 11);
            assert!(emp.attendance.iter().all(|(d, _)| is_weekday(*d)));
            assert!(emp.attendance.iter().all(|(d, _)| *d >= start && *d <= today));
            let dates: HashSet<_> = emp.attendance.iter().map(|(d, _)| *d).collect();
            assert_eq!(dates.len(), emp.attendance.len());
        }
    }

    #[test]
    fn reviews_and_joining_dates_in_range() {
        let (plan, today) = sample(20, 90);
        let start = today - Duration::days(90);
        for emp in &plan.employees {
            assert!((2..=5).contains(&emp.reviews.len()));
            for (rating, date) in &emp.reviews {
                assert!((1..=5).contains(rating));
                assert!(*date >= start && *date <= today);
            }
            assert!(emp.date_of_joining <= today);
            assert!(emp.date_of_joining >= today - Duration::days(365));
            assert_eq!(emp.phone_number.len(), 10);
        }
    }

    #[test]
    fn status_mix_is_mostly_present() {
        let mut rng = StdRng::seed_from_u64(42);
        let n = 10_000;
        let present = (0..n)
            .filter(|_| pick_status(&mut rng) == AttendanceStatus::Present)
            .count();
        let share = present as f64 / n as f64;
        assert!((0.80..0.90).contains(&share), "present share {share}");
    }
}
