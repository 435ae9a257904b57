//! Pesta CLI
//!
//! Command-line console for the learning platform:
//! - Chat with the tutor and generate quizzes through the AI server
//! - Check which provider models are available
//! - Sign in or create an account on the managed database
//! - Browse the roster, catalog, leaderboard and course steps
//! - Follow row changes made by other clients

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pesta::ai::GeminiClient;
use pesta::backend::{AuthClient, Backend, FeedMessage, MemoryBackend, RestBackend, Table};
use pesta::classroom::{Advance, Classroom};
use pesta::config::{generate_default_config, BackendConfig, Config};
use pesta::gamification::{badge_summary, rank_of};
use pesta::models::{Profile, Role};
use pesta::placement::{needs_placement, Phase, PlacementTest};
use pesta::store::DataStore;
use pesta::tutor::{ProxyClient, TutorApi, TutorSession, DEFAULT_API_URL};
use pesta::AiService;

#[derive(Parser)]
#[command(name = "pesta")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Console for the Pesta learning platform")]
#[command(long_about = "Pesta is an AI-assisted learning platform.\nChat with the tutor, generate quizzes and browse classroom data.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// AI server URL (default: $PESTA_API_URL or http://localhost:3001/api/ai)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Use built-in sample data instead of the managed database
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chat with the tutor (interactive when no message is given)
    Chat {
        /// Message to send
        message: Option<String>,
        /// Lesson text the tutor should focus on
        #[arg(short, long)]
        context: Option<String>,
        /// Call the provider directly instead of the AI server
        #[arg(long)]
        local: bool,
    },

    /// Generate a diagnostic pre-test
    Diagnostic {
        /// Topic to test
        topic: String,
    },

    /// Classify a student from a JSON performance record
    Classify {
        /// Performance record, e.g. '{"score": 7, "total": 10}'
        performance: String,
    },

    /// Fetch the placement assessment
    Placement {
        /// Take the test interactively
        #[arg(long)]
        take: bool,
        /// Save the result to this user's profile
        #[arg(long, requires = "take")]
        user: Option<String>,
    },

    /// List provider models that support content generation
    Models {
        /// Also send a test prompt to the configured model
        #[arg(long)]
        ping: bool,
        /// Model to test instead of the configured one (repeatable)
        #[arg(long = "model", requires = "ping")]
        models: Vec<String>,
    },

    /// Sign in and show the profile, welcome video and access token
    Login {
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account and its profile
    Signup {
        #[arg(long)]
        email: String,
        /// Full name shown on the roster
        #[arg(long)]
        name: String,
        /// student or teacher
        #[arg(long, default_value = "student")]
        role: Role,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Print row changes as other clients make them
    Watch {
        /// Tables to follow
        #[arg(long, value_delimiter = ',', default_value = "profiles,content")]
        tables: Vec<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List students
    Students {
        /// Filter by name or email
        #[arg(short, long)]
        search: Option<String>,
    },

    /// List content
    Catalog {
        /// Filter by title
        #[arg(short, long)]
        search: Option<String>,
        /// Include drafts
        #[arg(long)]
        all: bool,
    },

    /// Show the points leaderboard
    Leaderboard {
        /// Number of students to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Highlight this student's rank
        #[arg(long)]
        me: Option<String>,
    },

    /// Show the steps of a course
    Steps {
        /// Course (content) id
        course_id: i64,
        /// Walk through the course, answering quizzes
        #[arg(long)]
        walk: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pesta=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load_default();
    let api_url = cli
        .api_url
        .clone()
        .or_else(|| std::env::var("PESTA_API_URL").ok())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let json = cli.format.eq_ignore_ascii_case("json");

    match cli.command {
        Commands::Chat {
            message,
            context,
            local,
        } => {
            if local {
                let service = AiService::from_config(&config.ai);
                chat(TutorSession::new(service), message, context).await?;
            } else {
                chat(TutorSession::new(ProxyClient::new(&api_url)?), message, context).await?;
            }
        }

        Commands::Diagnostic { topic } => {
            let questions = ProxyClient::new(&api_url)?.diagnostic(&topic).await;
            if questions.is_empty() {
                bail!("No questions returned; is the AI server running at {}?", api_url);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&questions)?);
            } else {
                for (i, q) in questions.iter().enumerate() {
                    println!("{}. {}", i + 1, q.question);
                    for (j, option) in q.options.iter().enumerate() {
                        let mark = if j == q.answer { "*" } else { " " };
                        println!("   {} {}) {}", mark, option_label(j), option);
                    }
                }
            }
        }

        Commands::Classify { performance } => {
            let performance: serde_json::Value =
                serde_json::from_str(&performance).context("Performance must be valid JSON")?;
            match ProxyClient::new(&api_url)?.classify(&performance).await {
                Some(c) if json => println!("{}", serde_json::to_string_pretty(&c)?),
                Some(c) => println!("{}: {}", c.level, c.reason),
                None => bail!("Classification failed; is the AI server running at {}?", api_url),
            }
        }

        Commands::Placement { take, user } => {
            let questions = ProxyClient::new(&api_url)?.placement().await;
            if !take {
                println!("{}", serde_json::to_string_pretty(&questions)?);
                return Ok(());
            }

            let mut test = PlacementTest::new();
            test.begin(questions)
                .context("Failed to load placement test")?;
            let mut input = stdin_lines();
            let result = take_placement(&mut test, &mut input).await?;
            println!();
            println!("Score: {}/{}", result.score, test.len());
            println!("Level: {}", result.level);
            println!("{}", result.reason);

            if let Some(user_id) = user {
                let store = DataStore::new(Arc::new(RestBackend::new(&config.backend)?));
                store.load_session(&user_id).await;
                store.record_placement(&result).await?;
                println!("Saved to profile {}", user_id);
            }
        }

        Commands::Models { ping, models } => {
            let client = GeminiClient::new(&config.ai).context("AI_API_KEY is not set")?;
            let available = client.list_models().await?;
            let usable: Vec<_> = available
                .iter()
                .filter(|m| m.supports_generate_content())
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&usable)?);
            } else {
                println!("{:<40} {}", "Model", "Display name");
                println!("{}", "-".repeat(70));
                for m in &usable {
                    println!(
                        "{:<40} {}",
                        m.short_name(),
                        m.display_name.as_deref().unwrap_or("-")
                    );
                }
            }

            if ping {
                let candidates = if models.is_empty() {
                    vec![config.ai.model.clone()]
                } else {
                    models
                };

                println!();
                let mut answered = 0;
                for name in &candidates {
                    match client.with_model(name.as_str()).ping().await {
                        Ok(()) => {
                            answered += 1;
                            println!("{:<40} ok", name);
                        }
                        Err(e) => println!("{:<40} failed: {}", name, e),
                    }
                }
                if answered == 0 {
                    bail!("None of the models answered");
                }
            }
        }

        Commands::Login { email, password } => {
            let password = read_password(password).await?;
            let auth = AuthClient::new(&config.backend).context(BACKEND_HINT)?;
            let session = auth.sign_in(&email, &password).await?;

            let store = DataStore::new(Arc::new(signed_in_backend(
                &config.backend,
                Some(session.access_token.as_str()),
            )?));
            let profile = store.load_session(&session.user.id).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                println!("Signed in as {} ({})", profile.display_name(), profile.id);
            }
            if let Some(url) = store.welcome_video().await {
                println!("Welcome video: {}", url);
                if let Err(e) = store.mark_welcome_seen().await {
                    tracing::warn!(error = %e, "Failed to mark welcome video as seen");
                }
            }
            if needs_placement(&profile) {
                println!("Take the placement test: pesta placement --take --user {}", profile.id);
            }
            if !json {
                println!("\nexport SUPABASE_ACCESS_TOKEN={}", session.access_token);
            }
        }

        Commands::Signup {
            email,
            name,
            role,
            password,
        } => {
            let password = read_password(password).await?;
            let auth = AuthClient::new(&config.backend).context(BACKEND_HINT)?;
            let (user, session) = auth.sign_up(&email, &password, &name, role).await?;

            let token = session.as_ref().map(|s| s.access_token.as_str());
            let store = DataStore::new(Arc::new(signed_in_backend(&config.backend, token)?));
            let profile = Profile::student(user.id.as_str(), name.as_str())
                .role(role)
                .email(email.as_str());
            match store.create_profile(profile).await {
                Ok(profile) => println!("Created {} account for {}", profile.role, profile.display_name()),
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Profile row not created");
                    println!("Created account {}", user.id);
                }
            }

            match session {
                Some(session) => println!("\nexport SUPABASE_ACCESS_TOKEN={}", session.access_token),
                None => println!("Confirm the address sent to {}, then run `pesta login`", email),
            }
        }

        Commands::Watch { tables } => {
            let tables = tables
                .iter()
                .map(|t| Table::from_name(t.trim()).with_context(|| format!("Unknown table: {}", t)))
                .collect::<Result<Vec<_>>>()?;
            let backend = RestBackend::new(&config.backend).context(BACKEND_HINT)?;
            let mut changes = backend.changes();
            let listener = backend.listen(&tables);
            eprintln!("Watching row changes, Ctrl+C to stop");

            loop {
                tokio::select! {
                    message = changes.recv() => match message {
                        Some(FeedMessage::Change(event)) if json => {
                            println!("{}", serde_json::to_string(&event)?)
                        }
                        Some(FeedMessage::Change(event)) => {
                            println!("{:<8} {:<16} {}", format!("{:?}", event.kind), event.table.name(), event.id)
                        }
                        Some(FeedMessage::Resync) => eprintln!("Some changes were missed"),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            listener.abort();
        }

        Commands::Config { output } => {
            let config = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }

        command => {
            if cli.offline {
                let store = DataStore::new(Arc::new(MemoryBackend::demo()));
                console(&store, command, json, &api_url).await?;
            } else {
                let backend = RestBackend::new(&config.backend)
                    .context("Set SUPABASE_URL and SUPABASE_ANON_KEY, or pass --offline")?;
                let store = DataStore::new(Arc::new(backend));
                console(&store, command, json, &api_url).await?;
            }
        }
    }

    Ok(())
}

const BACKEND_HINT: &str = "Set SUPABASE_URL and SUPABASE_ANON_KEY";

/// REST backend acting as `token`'s user, or anonymously
fn signed_in_backend(config: &BackendConfig, token: Option<&str>) -> Result<RestBackend> {
    let backend = RestBackend::new(config).context(BACKEND_HINT)?;
    Ok(match token {
        Some(token) => backend.with_access_token(token),
        None => backend,
    })
}

async fn read_password(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut input = stdin_lines();
    prompt(&mut input, "Password: ")
        .await?
        .filter(|p| !p.is_empty())
        .context("Password is required")
}

/// Roster, catalog and course commands
async fn console<B: Backend + 'static>(
    store: &DataStore<B>,
    command: Commands,
    json: bool,
    api_url: &str,
) -> Result<()> {
    match command {
        Commands::Students { search } => {
            store.refresh_students().await?;
            let students = match search {
                Some(term) => store.search_students(&term).await,
                None => store.students().await,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else {
                println!("{:<24} {:<28} {:<9} {:>7}  {}", "Name", "Email", "Status", "Points", "Badges");
                println!("{}", "-".repeat(90));
                for s in &students {
                    println!(
                        "{:<24} {:<28} {:<9} {:>7}  {}",
                        s.display_name(),
                        s.email.as_deref().unwrap_or("-"),
                        format!("{:?}", s.status),
                        s.points,
                        format_badges(s)
                    );
                }
                let analytics = store.analytics().await;
                println!();
                println!(
                    "{} students, {} active, {} points awarded",
                    analytics.total_students, analytics.active_students, analytics.total_points
                );
            }
        }

        Commands::Catalog { search, all } => {
            store.refresh_content().await?;
            let term = search.unwrap_or_default();
            let items = if all {
                store.search_content(&term).await
            } else {
                store.published_catalog(&term).await
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                println!("{:>5}  {:<36} {:<8} {:<10} {}", "ID", "Title", "Type", "Status", "Created");
                println!("{}", "-".repeat(75));
                for item in &items {
                    let created = item
                        .created_at
                        .map(|dt| dt.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:>5}  {:<36} {:<8} {:<10} {}",
                        item.id,
                        item.title,
                        item.content_type.to_string(),
                        format!("{:?}", item.status),
                        created
                    );
                }
            }
        }

        Commands::Leaderboard { limit, me } => {
            store.refresh_students().await?;
            let mut ranked = store.leaderboard().await;
            ranked.truncate(limit);

            if json {
                println!("{}", serde_json::to_string_pretty(&ranked)?);
            } else {
                println!("{:>4}  {:<24} {:>7}  {}", "Rank", "Name", "Points", "Badges");
                println!("{}", "-".repeat(60));
                for (i, s) in ranked.iter().enumerate() {
                    let marker = if me.as_deref() == Some(s.id.as_str()) { ">" } else { " " };
                    println!(
                        "{}{:>3}  {:<24} {:>7}  {}",
                        marker,
                        i + 1,
                        s.display_name(),
                        s.points,
                        format_badges(s)
                    );
                }
            }

            if let Some(id) = me {
                match rank_of(&store.students().await, &id) {
                    Some(rank) => println!("\nYour rank: #{}", rank),
                    None => println!("\n{} is not on the leaderboard", id),
                }
            }
        }

        Commands::Steps { course_id, walk } => {
            let steps = store.fetch_steps(course_id).await;
            if steps.is_empty() {
                bail!("Course {} has no steps", course_id);
            }

            if json && !walk {
                println!("{}", serde_json::to_string_pretty(&steps)?);
                return Ok(());
            }

            let mut room = Classroom::new(steps);
            if walk {
                let mut tutor = TutorSession::new(ProxyClient::new(api_url)?);
                let mut input = stdin_lines();
                walk_course(&mut room, &mut tutor, &mut input).await?;
            } else {
                for (i, step) in room.steps().iter().enumerate() {
                    let quiz = if step.has_quiz() { " [quiz]" } else { "" };
                    println!("{:>3}. {}{}", i + 1, step.title, quiz);
                }
            }
        }

        _ => unreachable!("handled in main"),
    }
    Ok(())
}

type Input = Lines<BufReader<Stdin>>;

fn stdin_lines() -> Input {
    BufReader::new(tokio::io::stdin()).lines()
}

async fn prompt(input: &mut Input, label: &str) -> Result<Option<String>> {
    print!("{}", label);
    std::io::stdout().flush()?;
    Ok(input.next_line().await?)
}

/// "a" to "z", then 1-based numbers for longer lists
fn option_label(index: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if i < 26 => char::from(b'a' + i).to_string(),
        _ => (index + 1).to_string(),
    }
}

/// Parse "b" or "2" into a zero-based option index
fn parse_choice(answer: &str, options: usize) -> Option<usize> {
    let answer = answer.trim().to_lowercase();
    let index = match answer.chars().next()? {
        c @ 'a'..='z' if answer.len() == 1 => c as usize - 'a' as usize,
        _ => answer.parse::<usize>().ok()?.checked_sub(1)?,
    };
    (index < options).then_some(index)
}

fn format_badges(profile: &pesta::Profile) -> String {
    let summary = badge_summary(profile);
    let mut names: Vec<String> = summary.shown.iter().map(|b| b.to_string()).collect();
    if summary.overflow > 0 {
        names.push(format!("+{}", summary.overflow));
    }
    names.join(", ")
}

async fn chat<T: TutorApi>(
    mut session: TutorSession<T>,
    message: Option<String>,
    context: Option<String>,
) -> Result<()> {
    if let Some(context) = context {
        session.update_context(context);
    }

    if let Some(message) = message {
        println!("{}", session.send(&message).await);
        return Ok(());
    }

    println!("Pesta: {}", session.messages()[0].text);
    let mut input = stdin_lines();
    while let Some(line) = prompt(&mut input, "\nYou: ").await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        println!("Pesta: {}", session.send(line).await);
    }
    Ok(())
}

async fn take_placement(
    test: &mut PlacementTest,
    input: &mut Input,
) -> Result<pesta::PlacementResult> {
    loop {
        if let Phase::Result(result) = test.phase() {
            return Ok(result.clone());
        }
        let Some(question) = test.current_question().cloned() else {
            bail!("Placement test is not in progress");
        };

        println!("\nQuestion {}/{}", test.current_index() + 1, test.len());
        println!("{}", question.question);
        for (i, option) in question.options.iter().enumerate() {
            println!("  {}) {}", option_label(i), option);
        }

        let Some(answer) = prompt(input, "> ").await? else {
            return Ok(test.finish()?);
        };
        match parse_choice(&answer, question.options.len()) {
            Some(choice) => {
                test.answer(choice)?;
                if let Some(result) = test.next()? {
                    return Ok(result);
                }
            }
            None => println!("Pick one of the listed options"),
        }
    }
}

/// Lines starting with `?` go to the tutor, with the current step as context
async fn walk_course<T: TutorApi>(
    room: &mut Classroom,
    tutor: &mut TutorSession<T>,
    input: &mut Input,
) -> Result<()> {
    println!("Type ?<question> at any prompt to ask Pesta about the step");
    loop {
        tutor.follow(room);
        let Some(step) = room.current_step() else {
            return Ok(());
        };
        println!(
            "\n[{}/{}] {}  ({}% complete)",
            room.current_index() + 1,
            room.steps().len(),
            step.title,
            room.progress_percent()
        );
        println!("{}", step.body.as_deref().unwrap_or("No text content"));

        loop {
            let Some(line) = prompt(input, "\nPress Enter to continue ").await? else {
                return Ok(());
            };
            match tutor_question(&line) {
                Some(question) => println!("Pesta: {}", tutor.send(question).await),
                None => break,
            }
        }

        let mut outcome = room.advance()?;
        while outcome == Advance::QuizRequired || outcome == Advance::Retry {
            if outcome == Advance::Retry {
                println!("Incorrect. Try again!");
            }
            let Some(quiz) = room.quiz_question().cloned() else {
                break;
            };
            println!("\nQuiz: {}", quiz.question);
            for (i, option) in quiz.options.iter().enumerate() {
                println!("  {}) {}", option_label(i), option);
            }
            let Some(answer) = prompt(input, "> ").await? else {
                return Ok(());
            };
            if let Some(question) = tutor_question(&answer) {
                println!("Pesta: {}", tutor.send(question).await);
                outcome = Advance::QuizRequired;
                continue;
            }
            outcome = match parse_choice(&answer, quiz.options.len()) {
                Some(choice) => room.submit_answer(choice)?,
                None => Advance::Retry,
            };
        }

        if outcome == Advance::CourseComplete {
            println!("\nCongratulations! You've completed the course.");
            return Ok(());
        }
    }
}

/// The question in a `?question` line
fn tutor_question(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix('?')
        .map(str::trim)
        .filter(|q| !q.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("b", 4), Some(1));
        assert_eq!(parse_choice(" C ", 4), Some(2));
        assert_eq!(parse_choice("1", 4), Some(0));
        assert_eq!(parse_choice("0", 4), None);
        assert_eq!(parse_choice("e", 4), None);
        assert_eq!(parse_choice("", 4), None);
    }

    #[test]
    fn test_option_labels_past_the_alphabet() {
        assert_eq!(option_label(0), "a");
        assert_eq!(option_label(25), "z");
        assert_eq!(option_label(26), "27");
        assert_eq!(option_label(300), "301");
        assert_eq!(parse_choice(&option_label(30), 40), Some(30));
        assert_eq!(parse_choice(&option_label(2), 40), Some(2));
    }

    #[test]
    fn test_tutor_question() {
        assert_eq!(tutor_question(" ? What is a loop? "), Some("What is a loop?"));
        assert_eq!(tutor_question("?"), None);
        assert_eq!(tutor_question(""), None);
        assert_eq!(tutor_question("b"), None);
    }

    #[test]
    fn test_cli_parses_account_commands() {
        let cli = Cli::parse_from([
            "pesta", "signup", "--email", "a@example.com", "--name", "Alice", "--role", "teacher",
        ]);
        assert!(matches!(cli.command, Commands::Signup { role: Role::Teacher, .. }));

        let cli = Cli::parse_from(["pesta", "models", "--ping", "--model", "a", "--model", "b"]);
        assert!(matches!(cli.command, Commands::Models { ping: true, ref models } if models.len() == 2));

        let cli = Cli::parse_from(["pesta", "watch"]);
        assert!(matches!(cli.command, Commands::Watch { ref tables } if tables == &["profiles", "content"]));

        assert!(Cli::try_parse_from(["pesta", "models", "--model", "a"]).is_err());
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::parse_from(["pesta", "catalog", "--all", "--offline", "-f", "json"]);
        assert!(cli.offline);
        assert_eq!(cli.format, "json");
        assert!(matches!(cli.command, Commands::Catalog { all: true, .. }));
    }
}
