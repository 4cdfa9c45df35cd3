use conspect_api::{Config, init_tracing, migrations};

fn print_usage(bin_name: &str) {
    eprintln!("Usage: {bin_name} <up | down [steps] | status>");
}

enum Action {
    Up,
    Down(usize),
    Status,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Action> {
    let action = match args.next().as_deref() {
        None | Some("up") => Action::Up,
        Some("down") => match args.next() {
            Some(steps) => Action::Down(steps.parse().ok().filter(|s| *s > 0)?),
            None => Action::Down(1),
        },
        Some("status") => Action::Status,
        Some(_) => return None,
    };

    if args.next().is_some() {
        return None;
    }
    Some(action)
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let mut args = std::env::args();
    let bin_name = args.next().unwrap_or_else(|| "migrate".to_string());
    let Some(action) = parse_args(args) else {
        print_usage(&bin_name);
        std::process::exit(2);
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level, config.logging.json_format);

    let pool = match migrations::init_pool(&config.database).await {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("Failed to connect to database: {err}");
            std::process::exit(1);
        }
    };

    let outcome = match action {
        Action::Up => migrations::run_migrations(&pool).await.map(|()| println!("Migrations completed successfully")),
        Action::Down(steps) => migrations::rollback_migrations(&pool, steps).await.map(|reverted| {
            if reverted.is_empty() {
                println!("No migrations to roll back");
            }
            for version in reverted {
                println!("Rolled back {version}");
            }
        }),
        Action::Status => migrations::migration_status(&pool).await.map(|statuses| {
            for status in statuses {
                let state = if status.applied { "applied" } else { "pending" };
                println!("{:>16}  {:<8} {}", status.version, state, status.description);
            }
        }),
    };

    pool.close().await;

    if let Err(err) = outcome {
        eprintln!("Migration failed: {err}");
        std::process::exit(1);
    }
}
