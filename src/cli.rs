use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::role::Role;

pub const DEFAULT_SEED_EMPLOYEES: u32 = 50;
pub const DEFAULT_SEED_DAYS: u32 = 90;

#[derive(Parser)]
#[command(author, version, about = "HR management backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run migrations, then serve the HTTP API (default)
    Serve,
    /// Apply pending schema migrations and exit
    Migrate,
    /// Fill the database with demo departments, employees, attendance and reviews
    Seed(SeedArgs),
    /// Create a superuser account
    CreateAdmin(AdminArgs),
    /// Create an HR or employee account
    CreateUser(UserArgs),
}

#[derive(Args, Clone, Debug)]
pub struct SeedArgs {
    /// Number of employees to generate
    #[arg(long, default_value_t = DEFAULT_SEED_EMPLOYEES)]
    pub employees: u32,
    /// Days of attendance history, ending today
    #[arg(long, default_value_t = DEFAULT_SEED_DAYS)]
    pub days: u32,
    /// Replace existing employees, attendance and reviews
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Clone, Debug)]
pub struct AdminArgs {
    #[arg(long)]
    pub username: String,
    #[arg(long)]
    pub password: String,
}

#[derive(Args, Clone, Debug)]
pub struct UserArgs {
    #[arg(long)]
    pub username: String,
    #[arg(long)]
    pub password: String,
    #[arg(long, value_enum)]
    pub role: UserRole,
    /// Employee profile to link; required for the employee role
    #[arg(long)]
    pub employee_id: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserRole {
    Hr,
    Employee,
}

impl From<UserRole> for Role {
    fn from(role: UserRole) -> Self {
        match role {
            UserRole::Hr => Role::Hr,
            UserRole::Employee => Role::Employee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["hrm"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn seed_defaults() {
        let cli = Cli::try_parse_from(["hrm", "seed"]).unwrap();
        match cli.command {
            Some(Command::Seed(args)) => {
                assert_eq!((args.employees, args.days, args.force), (50, 90, false));
            }
            _ => panic!("expected seed"),
        }
    }

    #[test]
    fn create_user_parses_role() {
        let cli = Cli::try_parse_from([
            "hrm",
            "create-user",
            "--username",
            "jdoe",
            "--password",
            "secret123",
            "--role",
            "employee",
            "--employee-id",
            "4",
        ])
        .unwrap();
        match cli.command {
            Some(Command::CreateUser(args)) => {
                assert_eq!(Role::from(args.role), Role::Employee);
                assert_eq!(args.employee_id, Some(4));
            }
            _ => panic!("expected create-user"),
        }
    }

    #[test]
    fn admin_role_is_not_a_user_role() {
        assert!(
            Cli::try_parse_from([
                "hrm", "create-user", "--username", "x", "--password", "y", "--role", "admin",
            ])
            .is_err()
        );
    }
}
