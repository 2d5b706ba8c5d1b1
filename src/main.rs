mod db;
mod error;
mod import;
mod models;
mod scheduler;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use db::Database;
use error::Error;
use models::{Difficulty, ImportReport, Item, JsonOutput, StatsReport};

const DEFAULT_DB_NAME: &str = "qdrill.db";

#[derive(Parser)]
#[command(name = "qdrill")]
#[command(about = "A spaced-repetition CLI for drilling question/answer pairs")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Add a new question
    Add {
        /// The question text
        prompt: String,

        /// Reference answer
        #[arg(long, short)]
        answer: Option<String>,

        /// Free-text category label
        #[arg(long, short)]
        category: Option<String>,

        /// Difficulty: easy/medium/hard (defaults to medium)
        #[arg(long, short)]
        difficulty: Option<String>,
    },

    /// Bulk-import questions from a CSV file
    Import {
        /// Path to a CSV file with a 'prompt' column
        file: PathBuf,
    },

    /// List all questions
    List,

    /// Show the next question due for review
    Next,

    /// Record a review for a question
    Review {
        /// Question ID
        id: i64,

        /// Self-rating 1-5 (5 = fully mastered)
        #[arg(long, short)]
        rating: i32,

        /// The answer you gave
        #[arg(long, short)]
        answer: Option<String>,

        /// Seconds spent answering
        #[arg(long, short)]
        duration: Option<i64>,

        /// Attribute the review to this user
        #[arg(long, short)]
        user: Option<String>,
    },

    /// Run an interactive drill session
    Drill {
        /// Review as this user (password read from stdin)
        #[arg(long, short)]
        user: Option<String>,
    },

    /// Show learning statistics
    Stats {
        /// Scope review statistics to this user
        #[arg(long, short)]
        user: Option<String>,
    },

    /// Manage users
    #[command(subcommand)]
    User(UserCommands),
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a new user
    Add {
        /// Username
        username: String,

        /// Password (prompted on stdin if omitted)
        #[arg(long, short)]
        password: Option<String>,
    },
}

fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("QDRILL_DB") {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qdrill");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            let payload = serde_json::to_string(&JsonOutput::<()>::err(e.to_string()))
                .unwrap_or_default();
            println!("{}", payload);
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = get_db_path();
    let db = Database::open(&db_path)?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Add {
            prompt,
            answer,
            category,
            difficulty,
        } => {
            let difficulty = difficulty
                .as_deref()
                .map(Difficulty::from_str_or_default)
                .unwrap_or_default();
            let id = db.add_item(&prompt, answer.as_deref(), category.as_deref(), difficulty)?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "id": id,
                        "prompt": prompt
                    })))?
                );
            } else {
                println!("Added question with ID: {}", id);
            }
        }

        Commands::Import { file } => {
            let report = import::import_from_csv(&db, &file)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&report))?);
            } else {
                print_import_report(&report);
            }
        }

        Commands::List => {
            let items = db.list_items()?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&items))?);
            } else if items.is_empty() {
                println!("No questions found.");
            } else {
                println!("{:<5} {:<50} {:<15} {:<6} DUE", "ID", "PROMPT", "CATEGORY", "LEVEL");
                println!("{}", "-".repeat(95));
                for item in items {
                    let due = match (&item.next_due, item.level) {
                        (Some(due), _) => due.clone(),
                        (None, 5) => "mastered".to_string(),
                        (None, _) => "new".to_string(),
                    };
                    println!(
                        "{:<5} {:<50} {:<15} {:<6} {}",
                        item.id,
                        truncate(&item.prompt, 48),
                        item.category.as_deref().unwrap_or("-"),
                        item.level,
                        due
                    );
                }
            }
        }

        Commands::Next => {
            if let Some(item) = db.next_due_item()? {
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&item))?);
                } else {
                    print_item(&item);
                    println!();
                    println!("After answering, record the outcome with:");
                    println!("  qdrill review {} --rating <1-5>", item.id);
                }
            } else if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("All caught up - nothing due for review.");
            }
        }

        Commands::Review {
            id,
            rating,
            answer,
            duration,
            user,
        } => {
            let user_id = match user {
                Some(name) => Some(resolve_user_id(&db, &name)?),
                None => None,
            };
            let event_id = db.record_review(id, answer.as_deref(), rating, user_id, duration)?;

            if cli.json {
                let event = db.get_review_event(event_id)?;
                println!("{}", serde_json::to_string(&JsonOutput::ok(&event))?);
            } else {
                println!("Review recorded for question {}.", id);
                if let Some(item) = db.get_item(id)? {
                    println!("New level: {}/5 ({})", item.level, item.level_label());
                    match &item.next_due {
                        Some(due) => println!("Next review due: {}", due),
                        None => println!("Fully mastered - removed from the rotation."),
                    }
                }
            }
        }

        Commands::Drill { user } => {
            let user_id = match user {
                Some(name) => Some(login(&db, &name)?),
                None => None,
            };
            run_drill(&db, user_id)?;
        }

        Commands::Stats { user } => {
            let user_id = match user {
                Some(name) => Some(resolve_user_id(&db, &name)?),
                None => None,
            };
            let stats = fetch_stats(&db, user_id);
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&stats))?);
            } else {
                print_stats(&stats);
            }
        }

        Commands::User(UserCommands::Add { username, password }) => {
            let password = match password {
                Some(p) => p,
                None => prompt_line("Password: ")?,
            };
            let id = db.create_user(&username, &password)?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "id": id,
                        "username": username
                    })))?
                );
            } else {
                println!("User '{}' created with ID: {}", username, id);
            }
        }
    }

    Ok(())
}

fn resolve_user_id(db: &Database, username: &str) -> Result<i64, Error> {
    db.find_user(username)?
        .map(|u| u.id)
        .ok_or_else(|| Error::UserNotFound(username.to_string()))
}

fn login(db: &Database, username: &str) -> Result<i64, Box<dyn std::error::Error>> {
    let password = prompt_line(&format!("Password for {}: ", username))?;
    match db.verify_user(username, &password)? {
        Some(user) => {
            println!("Welcome, {}.", user.username);
            Ok(user.id)
        }
        None => Err(Box::new(Error::validation("invalid username or password"))),
    }
}

// Stats are advisory: a storage failure degrades to an empty report
// instead of killing the session.
fn fetch_stats(db: &Database, user_id: Option<i64>) -> StatsReport {
    match db.overall_stats(user_id) {
        Ok(stats) => stats,
        Err(e) => {
            log::warn!("stats aggregation failed, reporting empty: {}", e);
            StatsReport::empty(user_id)
        }
    }
}

fn run_drill(db: &Database, user_id: Option<i64>) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== qdrill ===");
    println!("Press Enter to answer; 's' shows stats, 'a' adds a question, 'q' quits.");

    let session_start = Instant::now();
    let mut reviewed = 0usize;

    loop {
        let item = match db.next_due_item()? {
            Some(item) => item,
            None => {
                println!("\nAll caught up - nothing due for review.");
                break;
            }
        };

        println!();
        print_item(&item);
        let question_start = Instant::now();

        let input = prompt_line("\nYour answer ('s' stats, 'a' add, 'q' quit): ")?;
        match input.as_str() {
            "q" => break,
            "s" => {
                print_stats(&fetch_stats(db, user_id));
                continue;
            }
            "a" => {
                add_question_interactive(db)?;
                continue;
            }
            _ => {}
        }

        println!(
            "\nReference answer: {}",
            item.reference_answer.as_deref().unwrap_or("(none recorded)")
        );

        let rating = loop {
            let raw = prompt_line("Rate yourself 1-5 (5 = fully mastered): ")?;
            match raw.parse::<i32>() {
                Ok(r) if (1..=5).contains(&r) => break r,
                _ => println!("Please enter a number between 1 and 5."),
            }
        };

        let duration = question_start.elapsed().as_secs() as i64;
        db.record_review(item.id, Some(&input), rating, user_id, Some(duration))?;
        reviewed += 1;
        println!("Recorded.");
    }

    let minutes = session_start.elapsed().as_secs() / 60;
    let today = fetch_stats(db, user_id).today_review_count();
    println!("\n=== Session summary ===");
    println!("Questions reviewed: {}", reviewed);
    println!("Session length: {} min", minutes);
    println!("Reviewed today in total: {}", today);

    Ok(())
}

fn add_question_interactive(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    println!("\nAdd a new question:");
    let prompt = prompt_line("Question: ")?;
    let answer = prompt_line("Reference answer (optional): ")?;
    let category = prompt_line("Category (optional): ")?;
    let difficulty =
        Difficulty::from_str_or_default(&prompt_line("Difficulty (easy/medium/hard): ")?);

    match db.add_item(&prompt, Some(&answer), Some(&category), difficulty) {
        Ok(id) => println!("Added question with ID: {}", id),
        Err(Error::Validation(msg)) => println!("Not added: {}", msg),
        Err(Error::Duplicate(_)) => println!("Not added: that question already exists."),
        Err(e) => return Err(Box::new(e)),
    }
    Ok(())
}

fn prompt_line(message: &str) -> io::Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_item(item: &Item) {
    println!(
        "[{}] [{}] (level {}/5, ID {})",
        item.category.as_deref().unwrap_or("uncategorized"),
        item.difficulty.label(),
        item.level,
        item.id
    );
    println!("Q: {}", truncate(&item.prompt, 200));
}

fn print_import_report(report: &ImportReport) {
    println!(
        "Import finished: {} created, {} skipped as duplicates, {} failed.",
        report.created,
        report.skipped,
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  line {}: {}", failure.line, failure.reason);
    }
}

fn print_stats(stats: &StatsReport) {
    println!("\n=== Learning statistics ===");
    println!("Reviews today: {}", stats.today_review_count());

    println!("\nMastery distribution:");
    for (level, count) in stats.level_distribution() {
        let stars = "*".repeat(*level as usize) + &".".repeat(5 - *level as usize);
        println!("  [{}] level {}: {}", stars, level, count);
    }

    let (categories, difficulties) = match stats {
        StatsReport::Global(g) => (&g.category_stats, &g.difficulty_stats),
        StatsReport::User(u) => (&u.category_stats, &u.difficulty_stats),
    };

    if !categories.is_empty() {
        println!("\nBy category:");
        for (name, bucket) in categories {
            println!(
                "  {}: {} reviews (avg {:.0}s)",
                name, bucket.count, bucket.avg_duration_seconds
            );
        }
    }
    if !difficulties.is_empty() {
        println!("\nBy difficulty:");
        for (name, bucket) in difficulties {
            println!(
                "  {}: {} reviews (avg {:.0}s)",
                name, bucket.count, bucket.avg_duration_seconds
            );
        }
    }

    if let StatsReport::User(u) = stats {
        println!("\nTime spent today: {}s", u.total_duration_seconds_today);
        println!(
            "Average time per answer: {:.0}s",
            u.avg_duration_seconds_overall
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    // Cut on a char boundary so multibyte prompts cannot panic the slice
    let limit = max_len.saturating_sub(3);
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= limit)
        .last()
        .unwrap_or(0);
    format!("{}...", &s[..cut])
}
